//! FP32 bit patterns and the bit-true MAC datapath.
//!
//! The accelerator treats FP32 values as opaque 32-bit patterns: loads,
//! stores and the MAC datapath all operate on raw bits. Only the comparison
//! units interpret their operands as IEEE-754 reals. This module exposes the
//! field-level view the datapath needs, plus the [`mac`] submodule with the
//! wide fixed-point accumulator.

pub mod mac;

pub use mac::PcsAccu;

/// Positive zero.
pub const FP32_ZERO: u32 = 0x0000_0000;

/// Positive one.
pub const FP32_ONE: u32 = 0x3F80_0000;

/// Positive infinity.
pub const FP32_INF: u32 = 0x7F80_0000;

/// Sign bit mask.
pub const FP32_SIGN_MASK: u32 = 0x8000_0000;

/// Mantissa field mask (23 bits).
pub const FP32_MANT_MASK: u32 = 0x007F_FFFF;

/// Exponent field width in bits.
pub const FP32_EXP_WIDTH: u32 = 8;

/// Mantissa field width in bits.
pub const FP32_MANT_WIDTH: u32 = 23;

/// Exponent bias.
pub const FP32_BIAS: i32 = 127;

/// Right-aligned all-ones exponent.
pub const FP32_EXP_MASK_ALIGNED: i32 = 0xFF;

/// Check for a zero encoding (either sign).
#[inline]
pub fn is_zero(x: u32) -> bool {
    x & !FP32_SIGN_MASK == 0
}

/// Sign bit as a bool.
#[inline]
pub fn sign(x: u32) -> bool {
    x & FP32_SIGN_MASK != 0
}

/// Biased exponent field.
#[inline]
pub fn exp(x: u32) -> i32 {
    ((x >> FP32_MANT_WIDTH) as i32) & FP32_EXP_MASK_ALIGNED
}

/// Mantissa field with the implicit leading one attached.
#[inline]
pub fn mant_full(x: u32) -> u32 {
    (x & FP32_MANT_MASK) | (1 << FP32_MANT_WIDTH)
}

/// View a bit pattern as an IEEE-754 real. Comparison units only; the MAC
/// datapath never goes through the host float type.
#[inline]
pub fn as_real(x: u32) -> f32 {
    f32::from_bits(x)
}
