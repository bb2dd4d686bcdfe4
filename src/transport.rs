use core::fmt::Debug;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::error::Error;

/// Bundles the SPI bus and chip-select GPIO into a single "talk to the
/// device" capability. Owns no flash semantics: callers open a transaction
/// with [`begin`](Transport::begin), exchange bytes, and close it with
/// [`end`](Transport::end).
pub(crate) struct Transport<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS, S, P> Transport<SPI, CS>
where
    SPI: SpiBus<Error = S>,
    CS: OutputPin<Error = P>,
    S: Debug,
    P: Debug,
{
    pub(crate) fn new(spi: SPI, cs: CS) -> Result<Self, Error<S, P>> {
        let mut transport = Self { spi, cs };
        transport.cs.set_high().map_err(Error::Pin)?;
        Ok(transport)
    }

    /// Assert chip-select, starting a transaction.
    pub(crate) fn begin(&mut self) -> Result<(), Error<S, P>> {
        self.cs.set_low().map_err(Error::Pin)
    }

    /// De-assert chip-select, ending a transaction.
    pub(crate) fn end(&mut self) -> Result<(), Error<S, P>> {
        self.cs.set_high().map_err(Error::Pin)
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<(), Error<S, P>> {
        self.spi.write(bytes).map_err(Error::Spi)
    }

    /// Fills `buf` with `tx_fill_byte`, then clocks it in place: what comes
    /// back in `buf` is what the chip shifted out while `tx_fill_byte` was
    /// shifted in, matching the fill-byte semantics of the host SPI API this
    /// driver's protocol was distilled from.
    pub(crate) fn read_into(&mut self, buf: &mut [u8], tx_fill_byte: u8) -> Result<(), Error<S, P>> {
        buf.fill(tx_fill_byte);
        self.spi.transfer_in_place(buf).map_err(Error::Spi)
    }

    pub(crate) fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}
