#![no_std]
//! Block-device driver for Winbond W25Q-series serial NOR flash chips.
//!
//! Presents the chip as a fixed-size, uniformly 512-byte-blocked device
//! suitable as the backing store of a FAT filesystem: [`Device::readblocks`],
//! [`Device::writeblocks`] and [`Device::count`] are the whole upward
//! interface. Sector erase, page program and address-width selection are
//! handled internally; see [`Device::write_block`] for the read-modify-erase-
//! write emulation that lets 512-byte blocks live on top of 4096-byte
//! sectors.

// Tests exercise a simulated chip built on std's `Vec`/`Rc`/`RefCell`; the
// crate itself stays no_std.
#[cfg(test)]
#[macro_use]
extern crate std;

use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

mod block;
mod command;
mod error;
mod transport;

pub use error::Error;

use transport::Transport;

/// Largest unit programmable in a single Page Program command.
pub const PAGE_SIZE: u32 = 256;
/// Smallest unit that can be erased. Holds 16 pages / 8 blocks.
pub const SECTOR_SIZE: u32 = 4096;
/// Unit exposed by the block-device façade.
pub const BLOCK_SIZE: u32 = 512;

pub(crate) const PAGES_PER_SECTOR: u32 = SECTOR_SIZE / PAGE_SIZE;
pub(crate) const BLOCKS_PER_SECTOR: u32 = SECTOR_SIZE / BLOCK_SIZE;

/// A Winbond W25Q-series flash chip, identified and ready to serve as a
/// block device.
///
/// `SPI` and `CS` are the host SPI bus and chip-select GPIO, consumed as
/// abstract `embedded-hal` capabilities; `DELAY` is the sleep primitive used
/// for BUSY polling and the post-reset idle.
pub struct Device<SPI, CS, DELAY> {
    transport: Transport<SPI, CS>,
    delay: DELAY,
    manufacturer: u8,
    mem_type: u8,
    capacity_class: u8,
    capacity: u64,
    address_width: u8,
    baud: u32,
    cache: [u8; SECTOR_SIZE as usize],
}

impl<SPI, CS, DELAY, S, P> Device<SPI, CS, DELAY>
where
    SPI: SpiBus<Error = S>,
    CS: OutputPin<Error = P>,
    DELAY: DelayNs,
    S: Debug,
    P: Debug,
{
    /// Constructs a new `Device`, identifying the chip and selecting its
    /// address width before returning.
    ///
    /// `baud` is recorded as metadata only (`embedded-hal`'s [`SpiBus`]
    /// exposes no baud-rate knob); the caller is responsible for having
    /// configured the SPI peripheral for SPI mode 3 at the desired rate
    /// before constructing a `Device`.
    ///
    /// If `software_reset` is set, the Enable-Reset/Reset command pair is
    /// issued and the driver idles for the chip's reset recovery time before
    /// identification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotResponding`] if Read JEDEC ID returns any zero
    /// byte (no chip attached, or wiring fault).
    pub fn new(
        spi: SPI,
        cs: CS,
        mut delay: DELAY,
        baud: u32,
        software_reset: bool,
    ) -> Result<Self, Error<S, P>> {
        let transport = Transport::new(spi, cs)?;

        let mut device = Self {
            transport,
            delay,
            manufacturer: 0,
            mem_type: 0,
            capacity_class: 0,
            capacity: 0,
            address_width: 3,
            baud,
            cache: [0; SECTOR_SIZE as usize],
        };

        if software_reset {
            device.reset()?;
        }

        device.identify()?;
        device.select_address_mode()?;

        Ok(device)
    }

    fn identify(&mut self) -> Result<(), Error<S, P>> {
        let (mf, mem_type, cap) = self.read_jedec_id()?;

        if mf == 0 || mem_type == 0 || cap == 0 {
            return Err(Error::NotResponding {
                manufacturer: mf,
                mem_type,
                capacity_class: cap,
            });
        }

        if mf != 0xEF || !matches!(mem_type, 0x40 | 0x60 | 0x70) {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "unverified chip: manufacturer {:#04x}, memory type {:#04x} (only manufacturer 0xEF and memory type 0x40 have been tested)",
                mf,
                mem_type
            );
        }

        self.manufacturer = mf;
        self.mem_type = mem_type;
        self.capacity_class = cap;
        self.capacity = 1u64 << cap;

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "identified flash: manufacturer {:#04x}, memory type {:#04x}, capacity {} bytes",
            mf,
            mem_type,
            self.capacity
        );

        Ok(())
    }

    fn select_address_mode(&mut self) -> Result<(), Error<S, P>> {
        self.address_width = if self.capacity > (1u64 << 24) { 4 } else { 3 };

        if self.address_width == 4 {
            let four_byte_mode = self.read_status_bit(16)?;
            if !four_byte_mode {
                self.await_ready()?;
                self.enter_4_byte_mode()?;
            }
        }

        Ok(())
    }

    /// Storage capacity of the flash chip, in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// JEDEC manufacturer ID byte (`0xEF` for Winbond).
    pub fn manufacturer(&self) -> u8 {
        self.manufacturer
    }

    /// JEDEC memory-type ID byte.
    pub fn mem_type(&self) -> u8 {
        self.mem_type
    }

    /// Combined device-type word, `mem_type << 8 | capacity_class`, matching
    /// the original driver's `device_type` property.
    pub fn device(&self) -> u16 {
        (self.mem_type as u16) << 8 | self.capacity_class as u16
    }

    /// Address width, in bytes, selected for this chip: 3 for parts up to
    /// 16 MB, 4 for larger parts.
    pub fn address_width(&self) -> u8 {
        self.address_width
    }

    /// The SCK clock rate this `Device` was constructed with, in Hz.
    ///
    /// Recorded as metadata only; the driver does not configure the bus
    /// itself.
    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Format the whole chip: every byte reads `0xFF` afterwards.
    ///
    /// Blocks until the chip-erase completes, which can take tens of
    /// seconds on multi-megabyte parts.
    pub fn format(&mut self) -> Result<(), Error<S, P>> {
        self.chip_erase()
    }

    /// Releases the SPI bus, chip-select pin and delay capability back to
    /// the caller.
    pub fn release(self) -> (SPI, CS, DELAY) {
        let (spi, cs) = self.transport.release();
        (spi, cs, self.delay)
    }
}
