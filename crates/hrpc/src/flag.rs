//! # Response Flag
//!
//! The single flag byte carried by every response frame.
//!
//! ## Wire Format
//! - Bit 0 (`0x01`): the payload carries a remote exception instead of a value.
//! - Bit 1 (`0x02`): the frame declares its size. A frame without it cannot be
//!   delimited and is a protocol violation.
//! - Remaining bits are reserved and ignored.

/// Bitmap wrapper over the response flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFlag(u8);

impl ResponseFlag {
    pub const ERROR: u8 = 0x01;
    pub const LENGTH: u8 = 0x02;

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Flag for a well-formed success response.
    pub fn success() -> Self {
        Self(Self::LENGTH)
    }

    /// Flag for a well-formed remote exception response.
    pub fn error() -> Self {
        Self(Self::LENGTH | Self::ERROR)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_error(self) -> bool {
        self.0 & Self::ERROR != 0
    }

    pub fn has_length(self) -> bool {
        self.0 & Self::LENGTH != 0
    }
}
