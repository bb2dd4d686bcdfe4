use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::error::Error;
use crate::{Device, BLOCKS_PER_SECTOR, BLOCK_SIZE, PAGES_PER_SECTOR, PAGE_SIZE, SECTOR_SIZE};

impl<SPI, CS, DELAY, S, P> Device<SPI, CS, DELAY>
where
    SPI: SpiBus<Error = S>,
    CS: OutputPin<Error = P>,
    DELAY: DelayNs,
    S: Debug,
    P: Debug,
{
    /// Number of 512-byte blocks the chip exposes.
    pub fn count(&self) -> u64 {
        self.capacity / BLOCK_SIZE as u64
    }

    /// Reads `buf.len()` bytes starting at block `blocknum`.
    ///
    /// `buf.len()` must be a multiple of [`BLOCK_SIZE`]. A single block is
    /// read directly into `buf` with one Fast Read transaction; a multi-
    /// block request is split into one Fast Read per block. No caching is
    /// involved on the read path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] if `buf.len()` is not a multiple of
    /// `BLOCK_SIZE`, or [`Error::AddressOutOfRange`] if the requested range
    /// exceeds the chip's capacity.
    pub fn readblocks(&mut self, mut blocknum: u64, buf: &mut [u8]) -> Result<(), Error<S, P>> {
        if buf.len() % BLOCK_SIZE as usize != 0 {
            return Err(Error::InvalidLength);
        }

        for chunk in buf.chunks_mut(BLOCK_SIZE as usize) {
            let addr = block_address(blocknum)?;
            self.fast_read(addr, chunk)?;
            blocknum += 1;
        }

        Ok(())
    }

    /// Writes `buf.len()` bytes starting at block `blocknum`.
    ///
    /// `buf.len()` must be a multiple of [`BLOCK_SIZE`] (well-behaved
    /// callers); see [`writeblocks_padded`](Self::writeblocks_padded) for a
    /// non-block-aligned convenience wrapper. Each 512-byte slice goes
    /// through [`write_block`](Self::write_block).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] if `buf.len()` is not a multiple of
    /// `BLOCK_SIZE`, or [`Error::AddressOutOfRange`] if the requested range
    /// exceeds the chip's capacity.
    pub fn writeblocks(&mut self, mut blocknum: u64, buf: &[u8]) -> Result<(), Error<S, P>> {
        if buf.len() % BLOCK_SIZE as usize != 0 {
            return Err(Error::InvalidLength);
        }

        for chunk in buf.chunks(BLOCK_SIZE as usize) {
            self.write_block(blocknum, chunk)?;
            blocknum += 1;
        }

        Ok(())
    }

    /// Like [`writeblocks`](Self::writeblocks), but tolerates a `buf` whose
    /// length is not a multiple of `BLOCK_SIZE`: the trailing partial block
    /// is padded with `0xFF` in a small internal scratch page rather than by
    /// mutating the caller's buffer in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressOutOfRange`] if the requested range exceeds
    /// the chip's capacity.
    pub fn writeblocks_padded(&mut self, mut blocknum: u64, buf: &[u8]) -> Result<(), Error<S, P>> {
        let full_chunks = buf.chunks_exact(BLOCK_SIZE as usize);
        let tail = full_chunks.remainder();

        for chunk in full_chunks {
            self.write_block(blocknum, chunk)?;
            blocknum += 1;
        }

        if !tail.is_empty() {
            let mut padded = [0xFFu8; BLOCK_SIZE as usize];
            padded[..tail.len()].copy_from_slice(tail);
            self.write_block(blocknum, &padded)?;
        }

        Ok(())
    }

    /// Writes one 512-byte block at `blocknum` by read-modify-erase-write of
    /// its enclosing 4096-byte sector: the sector is read into the device's
    /// scratch buffer, the target block is overlaid, the sector is erased,
    /// and all 16 pages of the sector are reprogrammed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] if `buf.len() != BLOCK_SIZE`, or
    /// [`Error::AddressOutOfRange`] if `blocknum` is beyond the chip's
    /// capacity.
    pub fn write_block(&mut self, blocknum: u64, buf: &[u8]) -> Result<(), Error<S, P>> {
        if buf.len() != BLOCK_SIZE as usize {
            return Err(Error::InvalidLength);
        }
        block_address(blocknum)?;

        let sector_nr = blocknum / BLOCKS_PER_SECTOR as u64;
        let sector_addr = (sector_nr * SECTOR_SIZE as u64) as u32;
        let index = ((blocknum * BLOCK_SIZE as u64) % SECTOR_SIZE as u64) as usize;

        // The scratch buffer is the device's single permanent allocation;
        // swap it out for the duration of the RMW so it can be passed to
        // fast_read/page_program without aliasing `&mut self`.
        let mut sector = core::mem::replace(&mut self.cache, [0u8; SECTOR_SIZE as usize]);

        let result = (|| {
            self.fast_read(sector_addr, &mut sector)?;
            sector[index..index + BLOCK_SIZE as usize].copy_from_slice(buf);
            self.sector_erase(sector_addr)?;

            for page in 0..PAGES_PER_SECTOR {
                let page_addr = sector_addr + page * PAGE_SIZE;
                let start = (page * PAGE_SIZE) as usize;
                let end = start + PAGE_SIZE as usize;
                self.page_program(page_addr, &sector[start..end])?;
            }

            Ok(())
        })();

        self.cache = sector;
        result
    }
}

/// Computes the byte address of `blocknum`, guarding only against `u32`
/// overflow; the chip's own capacity bound is enforced downstream, when the
/// address is actually used for a Fast Read or sector read. Shared by the
/// read and write paths.
fn block_address<S, P>(blocknum: u64) -> Result<u32, Error<S, P>>
where
    S: Debug,
    P: Debug,
{
    let addr = blocknum
        .checked_mul(BLOCK_SIZE as u64)
        .ok_or(Error::AddressOutOfRange)?;
    u32::try_from(addr).map_err(|_| Error::AddressOutOfRange)
}
