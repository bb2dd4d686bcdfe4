use core::fmt::Debug;

/// Error type returned by every fallible operation on [`Device`](crate::Device).
///
/// Parameterised over the SPI bus error type `S` and the chip-select GPIO
/// error type `P`, following the same convention as most `embedded-hal`
/// flash drivers rather than boxing the underlying error.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error<S: Debug, P: Debug> {
    /// The underlying SPI bus reported an error.
    Spi(S),
    /// The chip-select GPIO reported an error.
    Pin(P),
    /// Read JEDEC ID returned a zero byte; the chip did not respond.
    NotResponding {
        manufacturer: u8,
        mem_type: u8,
        capacity_class: u8,
    },
    /// BUSY (SR1 bit 0) stayed set for more than ~2s.
    DeviceStuckBusy,
    /// The requested address range exceeds the chip's capacity.
    AddressOutOfRange,
    /// A buffer length did not satisfy the alignment this operation requires.
    InvalidLength,
}
