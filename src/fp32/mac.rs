//! Bit-true model of the fused multiply-accumulate datapath.
//!
//! The hardware accumulates products in a 284-bit fixed-point register:
//! 1 sign bit + 2^8 bits of range + 23 mantissa bits + 4 overflow-guard
//! bits. In silicon the register uses partial carry-save arithmetic; the
//! emulation splits the same word into five u64 limbs and uses plain ripple
//! carries. The observable values are identical.
//!
//! One [`PcsAccu::mac`] call models one datapath pass: the 24x24-bit
//! mantissa product is aligned into fixed point and either replaces the
//! accumulator (`first_op`) or is added to it. [`PcsAccu::readout`] renders
//! the accumulator back to an FP32 bit pattern with truncating
//! normalization. The guard-bit wraparound is applied inside the addition,
//! not the render, so a render preceded by an add-zero pass (the store
//! hooks do this) reproduces the hardware result exactly.

use super::{
    exp, is_zero, mant_full, sign, FP32_EXP_MASK_ALIGNED, FP32_EXP_WIDTH, FP32_INF,
    FP32_MANT_MASK, FP32_MANT_WIDTH, FP32_SIGN_MASK, FP32_ZERO,
};

/// Number of u64 limbs backing the accumulator.
pub const ACCU_WORDS: usize = 5;

/// Overflow guard bits above the top of the representable range.
const ACCU_OFLOW_BITS: u32 = 4;

/// Total accumulator width in bits.
const PCS_WIDTH: u32 = 1 + (1 << FP32_EXP_WIDTH) + FP32_MANT_WIDTH + ACCU_OFLOW_BITS;

/// The wide fixed-point MAC accumulator.
///
/// Treated as owned scratch of the datapath: kernels clear it, feed it
/// products, and render it. Nothing else interprets the limbs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcsAccu {
    w: [u64; ACCU_WORDS],
}

impl PcsAccu {
    /// A cleared accumulator.
    pub fn new() -> Self {
        Self { w: [0; ACCU_WORDS] }
    }

    /// Zero all limbs.
    pub fn clear(&mut self) {
        self.w = [0; ACCU_WORDS];
    }

    /// One datapath pass: multiply `op_a * op_b` on raw bit patterns,
    /// negate the product if `negate`, then replace the accumulator
    /// (`first_op`) or add to it.
    pub fn mac(&mut self, op_a: u32, op_b: u32, first_op: bool, negate: bool) {
        let mut exponent = exp(op_a) + exp(op_b) - super::FP32_BIAS;
        let mut mantissa = u64::from(mant_full(op_a)) * u64::from(mant_full(op_b));
        let product_sign = sign(op_a) ^ sign(op_b);

        // a zero operand forces a zero product regardless of the other fields
        if is_zero(op_a) || is_zero(op_b) {
            mantissa = 0;
            exponent = 0;
        }

        let product = Self::from_product(product_sign ^ negate, exponent, mantissa);

        if first_op {
            self.w = product.w;
        } else {
            self.add_assign(&product);
        }
    }

    /// Render the accumulator to an FP32 bit pattern.
    ///
    /// Truncating normalization: underflow goes to `+0.0`, overflow to
    /// `+INF`, mantissa bits below the cut are dropped without rounding.
    pub fn readout(&self) -> u32 {
        let mut out: u32 = 0;

        // sign from the top limb, magnitude via two's complement
        let tmp = if self.w[ACCU_WORDS - 1] >> 63 != 0 {
            out = FP32_SIGN_MASK;
            self.negated()
        } else {
            self.clone()
        };

        // locate the leading one to determine the exponent
        let mut exponent = (ACCU_WORDS as i32) * 64 - FP32_MANT_WIDTH as i32 - 1;
        let mut lz: i32 = 0;
        let mut off = 0usize;
        for k in (0..ACCU_WORDS).rev() {
            off = k;
            if tmp.w[k] != 0 {
                lz = tmp.w[k].leading_zeros() as i32;
                exponent -= lz;
                break;
            }
            exponent -= 64;
        }

        if exponent < 0 {
            out |= FP32_ZERO;
        } else if exponent >= FP32_EXP_MASK_ALIGNED {
            out |= FP32_INF;
        } else {
            out |= (exponent as u32) << FP32_MANT_WIDTH;

            let cut = 64 - 1 - FP32_MANT_WIDTH as i32 - lz;
            if cut >= 0 {
                // the leading limb holds the whole mantissa
                out |= ((tmp.w[off] >> cut as u32) as u32) & FP32_MANT_MASK;
            } else {
                // mantissa straddles two limbs
                out |= ((tmp.w[off] << (-cut) as u32) as u32) & FP32_MANT_MASK;
                out |= (tmp.w[off - 1] >> (64 + cut) as u32) as u32;
            }
        }

        out
    }

    /// Align a multiplier output (2.46-bit fixed-point mantissa plus biased
    /// exponent) into the accumulator representation.
    fn from_product(product_sign: bool, exponent: i32, mantissa: u64) -> Self {
        let mut out = Self::new();

        let mut e = exponent;
        let mut m = mantissa;
        if e < 0 {
            // flushed to zero before the sign is applied
            return out;
        }
        if e >= FP32_EXP_MASK_ALIGNED {
            // saturate the way the hardware does: max exponent, unit mantissa
            e = FP32_EXP_MASK_ALIGNED;
            m = 1u64 << (2 * FP32_MANT_WIDTH);
        }

        let shift = e - FP32_MANT_WIDTH as i32;
        if shift < 0 {
            out.w[0] = m >> (-shift) as u32;
        } else {
            let off = (shift >> 6) as usize;
            let sh = (shift & 0x3F) as u32;
            out.w[off] = m << sh;
            // the 48-bit product can spill into the next limb
            if sh + 2 + 2 * FP32_MANT_WIDTH > 64 {
                out.w[off + 1] = m >> (64 - sh);
            }
        }

        if product_sign {
            out = out.negated();
        }
        out
    }

    /// Two's-complement negation across the limbs.
    fn negated(&self) -> Self {
        let mut out = Self::new();
        let mut carry = 1u64;
        for k in 0..ACCU_WORDS {
            let (t, c) = (!self.w[k]).overflowing_add(carry);
            out.w[k] = t;
            carry = u64::from(c);
        }
        out
    }

    /// Limb-wise addition with ripple carry, then wrap the result into the
    /// guard bits: everything above `PCS_WIDTH` is a sign extension, which
    /// models undetected overflow exactly as the hardware exhibits it.
    fn add_assign(&mut self, other: &Self) {
        let mut carry = 0u64;
        for k in 0..ACCU_WORDS {
            let (t1, c1) = self.w[k].overflowing_add(other.w[k]);
            let (t2, c2) = t1.overflowing_add(carry);
            self.w[k] = t2;
            carry = u64::from(c1 | c2);
        }

        let sh = 64 - (PCS_WIDTH & 0x3F);
        self.w[ACCU_WORDS - 1] = (((self.w[ACCU_WORDS - 1] << sh) as i64) >> sh) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp32::FP32_ONE;

    fn bits(x: f32) -> u32 {
        x.to_bits()
    }

    /// Render after an add-zero pass, the way every store hook does.
    fn render(accu: &mut PcsAccu) -> u32 {
        accu.mac(FP32_ZERO, FP32_ZERO, false, false);
        accu.readout()
    }

    #[test]
    fn test_cleared_readout_is_positive_zero() {
        let mut accu = PcsAccu::new();
        assert_eq!(render(&mut accu), FP32_ZERO);
    }

    #[test]
    fn test_first_op_product() {
        let mut accu = PcsAccu::new();
        accu.mac(bits(3.0), bits(5.0), true, false);
        assert_eq!(render(&mut accu), bits(15.0));
    }

    #[test]
    fn test_negated_product() {
        let mut accu = PcsAccu::new();
        accu.mac(bits(2.0), bits(3.0), true, true);
        assert_eq!(render(&mut accu), bits(-6.0));
    }

    #[test]
    fn test_preload_roundtrip() {
        for x in [1.5f32, -2.25, 0.125, 1234.5, -0.0078125] {
            let mut accu = PcsAccu::new();
            accu.mac(bits(x), FP32_ONE, true, false);
            assert_eq!(render(&mut accu), bits(x), "roundtrip of {}", x);
        }
    }

    #[test]
    fn test_dot_product_accumulation() {
        let a = [1.0f32, 2.0, 3.0, 4.0];
        let b = [10.0f32, 20.0, 30.0, 40.0];
        let mut accu = PcsAccu::new();
        for (x, y) in a.iter().zip(b.iter()) {
            accu.mac(bits(*x), bits(*y), false, false);
        }
        assert_eq!(render(&mut accu), bits(300.0));
    }

    #[test]
    fn test_subtractive_accumulation() {
        let mut accu = PcsAccu::new();
        accu.mac(bits(1.0), FP32_ONE, true, false);
        accu.mac(bits(3.0), FP32_ONE, false, true);
        assert_eq!(render(&mut accu), bits(-2.0));
    }

    #[test]
    fn test_wide_accumulator_keeps_small_addend() {
        // 2^30 + 1 - 2^30 == 1 exactly; f32 arithmetic would lose the 1
        let big = bits(1073741824.0);
        let mut accu = PcsAccu::new();
        accu.mac(big, FP32_ONE, true, false);
        accu.mac(FP32_ONE, FP32_ONE, false, false);
        accu.mac(big, FP32_ONE, false, true);
        assert_eq!(render(&mut accu), bits(1.0));
    }

    #[test]
    fn test_readout_truncates_instead_of_rounding() {
        // 1 + 2^-24 + 2^-25 renders as 1.0: both addends sit below the
        // mantissa cut, and round-to-nearest would have bumped the LSB
        let mut accu = PcsAccu::new();
        accu.mac(bits(1.0), FP32_ONE, true, false);
        accu.mac(bits(2f32.powi(-24)), FP32_ONE, false, false);
        accu.mac(bits(2f32.powi(-25)), FP32_ONE, false, false);
        assert_eq!(render(&mut accu), bits(1.0));
    }

    #[test]
    fn test_exponent_overflow_saturates_to_inf() {
        let huge = bits(3.0e38);
        let mut accu = PcsAccu::new();
        accu.mac(huge, huge, true, false);
        assert_eq!(render(&mut accu), FP32_INF);
    }

    #[test]
    fn test_zero_operand_forces_zero_product() {
        let mut accu = PcsAccu::new();
        accu.mac(bits(7.5), FP32_ONE, true, false);
        // -0.0 times anything contributes nothing
        accu.mac(FP32_SIGN_MASK, bits(5.0), false, false);
        assert_eq!(render(&mut accu), bits(7.5));
    }

    #[test]
    fn test_denormal_product_flushes_to_zero() {
        // exponent sum under the bias flushes before accumulation
        let tiny = bits(2f32.powi(-100));
        let mut accu = PcsAccu::new();
        accu.mac(tiny, tiny, true, false);
        assert_eq!(render(&mut accu), FP32_ZERO);
    }

    #[test]
    fn test_first_op_discards_previous_state() {
        let mut accu = PcsAccu::new();
        accu.mac(bits(100.0), FP32_ONE, true, false);
        accu.mac(bits(2.0), bits(4.0), true, false);
        assert_eq!(render(&mut accu), bits(8.0));
    }

    #[test]
    fn test_exact_cancellation() {
        let mut accu = PcsAccu::new();
        accu.mac(bits(0.1), FP32_ONE, true, false);
        accu.mac(bits(0.1), FP32_ONE, false, true);
        assert_eq!(render(&mut accu), FP32_ZERO);
    }
}
