use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::error::Error;
use crate::Device;

/// Opcodes this driver issues. Naming follows the datasheet command names,
/// not the register they happen to touch.
#[repr(u8)]
enum Command {
    ReadJedecId = 0x9F,
    ReadStatusRegister1 = 0x05,
    ReadStatusRegister2 = 0x35,
    ReadStatusRegister3 = 0x15,
    WriteEnable = 0x06,
    SectorErase = 0x20,
    ChipErase = 0xC7,
    PageProgram = 0x02,
    FastRead3Byte = 0x0B,
    FastRead4Byte = 0x0C,
    Enter4ByteMode = 0xB7,
    EnableReset = 0x66,
    Reset = 0x99,
}

/// Number of `await_ready` polls before giving up with [`Error::DeviceStuckBusy`].
const BUSY_RETRIES: u32 = 20;
/// Sleep between BUSY polls.
const BUSY_POLL_DELAY_US: u32 = 100_000;
/// Idle time required after the Enable-Reset/Reset command pair.
const RESET_IDLE_US: u32 = 30;

impl<SPI, CS, DELAY, S, P> Device<SPI, CS, DELAY>
where
    SPI: SpiBus<Error = S>,
    CS: OutputPin<Error = P>,
    DELAY: DelayNs,
    S: Debug,
    P: Debug,
{
    /// Reads a single status-register bit, selecting register `05`/`35`/`15`
    /// by `nr / 8` and the bit within it by `nr % 8`; bit 0 of SR1 is BUSY,
    /// bit 16 (SR3 bit 0) is the 4-byte-address-mode indicator. This indexing
    /// is preserved exactly as in the source driver.
    pub(crate) fn read_status_bit(&mut self, nr: u8) -> Result<bool, Error<S, P>> {
        let (reg, bit) = (nr / 8, nr % 8);
        let opcode = match reg {
            0 => Command::ReadStatusRegister1 as u8,
            1 => Command::ReadStatusRegister2 as u8,
            2 => Command::ReadStatusRegister3 as u8,
            _ => unreachable!("status register index out of range"),
        };

        // SR1 is what `await_ready` itself polls; pre-waiting here would be
        // circular. SR2/SR3 reads pre-wait for BUSY like every other command.
        if reg != 0 {
            self.await_ready()?;
        }

        self.transport.begin()?;
        self.transport.write(&[opcode])?;
        let mut byte = [0u8; 1];
        self.transport.read_into(&mut byte, 0xFF)?;
        self.transport.end()?;

        Ok(byte[0] & (1 << bit) != 0)
    }

    /// Polls SR1.BUSY until it clears, sleeping ~100ms between attempts.
    /// Fails with [`Error::DeviceStuckBusy`] after [`BUSY_RETRIES`] retries
    /// (~2s accumulated sleep). The transaction stays open (CS low) across
    /// every poll and is only closed once BUSY has cleared.
    pub(crate) fn await_ready(&mut self) -> Result<(), Error<S, P>> {
        self.transport.begin()?;
        self.transport.write(&[Command::ReadStatusRegister1 as u8])?;

        let mut retries = 0;
        loop {
            let mut byte = [0u8; 1];
            self.transport.read_into(&mut byte, 0xFF)?;

            if byte[0] & 0x01 == 0 {
                break;
            }

            if retries > BUSY_RETRIES {
                let _ = self.transport.end();
                return Err(Error::DeviceStuckBusy);
            }

            self.delay.delay_us(BUSY_POLL_DELAY_US);
            retries += 1;
        }

        self.transport.end()
    }

    /// Sets the Write Enable Latch. Must immediately precede every erase or
    /// program command; the chip clears it automatically on completion.
    pub(crate) fn write_enable(&mut self) -> Result<(), Error<S, P>> {
        self.await_ready()?;
        self.transport.begin()?;
        self.transport.write(&[Command::WriteEnable as u8])?;
        self.transport.end()
    }

    /// Issues the Enable-Reset/Reset command pair and idles for the chip's
    /// reset recovery time.
    pub(crate) fn reset(&mut self) -> Result<(), Error<S, P>> {
        self.transport.begin()?;
        self.transport.write(&[Command::EnableReset as u8])?;
        self.transport.end()?;

        self.transport.begin()?;
        self.transport.write(&[Command::Reset as u8])?;
        self.transport.end()?;

        self.delay.delay_us(RESET_IDLE_US);
        Ok(())
    }

    /// Reads the JEDEC ID: manufacturer, memory type, capacity class.
    pub(crate) fn read_jedec_id(&mut self) -> Result<(u8, u8, u8), Error<S, P>> {
        self.await_ready()?;
        self.transport.begin()?;
        self.transport.write(&[Command::ReadJedecId as u8])?;
        let mut id = [0u8; 3];
        self.transport.read_into(&mut id, 0x00)?;
        self.transport.end()?;
        Ok((id[0], id[1], id[2]))
    }

    /// Switches the chip into 4-byte address mode. Issued once during
    /// construction for parts that require it; never revisited afterwards.
    pub(crate) fn enter_4_byte_mode(&mut self) -> Result<(), Error<S, P>> {
        self.transport.begin()?;
        self.transport.write(&[Command::Enter4ByteMode as u8])?;
        self.transport.end()
    }

    /// Encodes `addr` in the chip's selected address width, big-endian.
    fn encode_address(&self, addr: u32) -> [u8; 4] {
        let be = addr.to_be_bytes();
        if self.address_width == 4 {
            be
        } else {
            [be[1], be[2], be[3], 0]
        }
    }

    fn address_bytes(&self, addr: u32) -> ([u8; 4], usize) {
        (self.encode_address(addr), self.address_width as usize)
    }

    /// Erases the 4096-byte sector starting at `addr` (must be sector-
    /// aligned). Must be preceded by [`write_enable`](Self::write_enable).
    pub(crate) fn sector_erase(&mut self, addr: u32) -> Result<(), Error<S, P>> {
        debug_assert!(addr % crate::SECTOR_SIZE == 0, "sector_erase address not sector-aligned");

        let (bytes, len) = self.address_bytes(addr);
        self.write_enable()?;
        self.transport.begin()?;
        self.transport.write(&[Command::SectorErase as u8])?;
        self.transport.write(&bytes[..len])?;
        self.transport.end()?;
        self.await_ready()
    }

    /// Erases the entire chip. Used by [`Device::format`](crate::Device::format).
    pub(crate) fn chip_erase(&mut self) -> Result<(), Error<S, P>> {
        self.write_enable()?;
        self.transport.begin()?;
        self.transport.write(&[Command::ChipErase as u8])?;
        self.transport.end()?;
        self.await_ready()
    }

    /// Programs up to 256 bytes at `addr`, which must be page-aligned (a
    /// multiple of [`crate::PAGE_SIZE`]); the chip does not carry a Page
    /// Program across a page boundary. Must be preceded by
    /// [`write_enable`](Self::write_enable).
    pub(crate) fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<S, P>> {
        debug_assert!(addr % crate::PAGE_SIZE == 0, "page_program address not page-aligned");
        debug_assert!(data.len() <= crate::PAGE_SIZE as usize, "page_program payload exceeds PAGE_SIZE");

        let (bytes, len) = self.address_bytes(addr);
        self.write_enable()?;
        self.transport.begin()?;
        self.transport.write(&[Command::PageProgram as u8])?;
        self.transport.write(&bytes[..len])?;
        self.transport.write(data)?;
        self.transport.end()?;
        self.await_ready()
    }

    /// Reads `buf.len()` bytes starting at `addr` via the Fast Read command
    /// (opcode depends on the chip's selected address width).
    pub(crate) fn fast_read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<S, P>> {
        if addr as u64 + buf.len() as u64 > self.capacity {
            return Err(Error::AddressOutOfRange);
        }

        let opcode = if self.address_width == 4 {
            Command::FastRead4Byte as u8
        } else {
            Command::FastRead3Byte as u8
        };
        let (bytes, len) = self.address_bytes(addr);

        self.await_ready()?;
        self.transport.begin()?;
        self.transport.write(&[opcode])?;
        self.transport.write(&bytes[..len])?;
        self.transport.write(&[0xFF])?;
        self.transport.read_into(buf, 0xFF)?;
        self.transport.end()
    }
}
