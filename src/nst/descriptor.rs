//! Job descriptor: the command staged by the host for one accelerator run.
//!
//! A descriptor fixes the opcode, the shape of the loop nest (which level
//! initializes, which level writes back, how deep the nest is, and the
//! inclusive bound of every level) and the full AGU programming. It is
//! immutable for the duration of a run and validated before the first
//! memory access.

use thiserror::Error;

use crate::device::{N_AGUS, N_HW_LOOPS};

/// Width of a hardware loop counter in bits. Bounds must fit this counter.
pub const HW_LOOP_WIDTH: u32 = 16;

/// Select init from AGU 0.
pub const INIT_WITH_AGU0: u8 = 0;
/// Select init from AGU 1.
pub const INIT_WITH_AGU1: u8 = 1;
/// Select init from AGU 2.
pub const INIT_WITH_AGU2: u8 = 2;
/// Initialize with zero instead of a memory operand.
pub const INIT_WITH_ZERO: u8 = 3;

/// MAC-family aux: plain accumulation.
pub const AUX_MAC_STD: u8 = 0;
/// MAC-family aux: clamp negative results to +0.0 on store.
pub const AUX_MAC_RELU: u8 = 1;

/// MAXMIN aux: emit the running value.
pub const AUX_MAXMIN_STD: u8 = 0;
/// MAXMIN aux: emit the index of the running value (arg form).
pub const AUX_MAXMIN_ARG: u8 = 1;

/// Comparison select: ALU register equals the operand.
pub const AUX_CMP_EQ: u8 = 0;
/// Comparison select: ALU register below the operand.
pub const AUX_CMP_LT: u8 = 1;
/// Comparison select: ALU register below or equal to the operand.
pub const AUX_CMP_LE: u8 = 2;
/// THTST: emit 1.0/0.0 instead of a thresholded value. Or'able with the
/// comparison selects.
pub const AUX_BIN_OUT: u8 = 4;
/// MASK/MASKMAC: compare the iteration counter against the ALU register.
pub const AUX_CMP_CNT: u8 = 4;

/// COPY aux: deposit the init-loaded constant.
pub const AUX_COPY_REPL: u8 = 0;
/// COPY aux: reload the ALU register from AGU 0 every iteration.
pub const AUX_COPY_VECT: u8 = 1;

/// The nine accelerator opcodes, with the hardware encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Fused multiply-accumulate reduction.
    Mac = 0,
    /// Element-wise add/subtract against a preloaded value.
    VAddSub = 1,
    /// Element-wise multiply.
    VMult = 2,
    /// Outer product / scaled MAC against the ALU register.
    OuterP = 3,
    /// Max/min reduction with optional arg-index output.
    MaxMin = 4,
    /// Threshold / test against the ALU register.
    ThTst = 5,
    /// Conditional masking.
    Mask = 6,
    /// Conditional accumulate read-modify-write.
    MaskMac = 7,
    /// Copy / broadcast.
    Copy = 8,
}

impl OpCode {
    /// All opcodes in encoding order.
    pub const ALL: [OpCode; 9] = [
        OpCode::Mac,
        OpCode::VAddSub,
        OpCode::VMult,
        OpCode::OuterP,
        OpCode::MaxMin,
        OpCode::ThTst,
        OpCode::Mask,
        OpCode::MaskMac,
        OpCode::Copy,
    ];
}

/// Inclusive address window for the optional AGU range assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrRange {
    /// Lowest legal cursor address.
    pub low: u32,
    /// Highest legal cursor address.
    pub high: u32,
}

/// Errors detected by descriptor validation, before any memory access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// `init_level` must not be below `inner_level`.
    #[error("init level {init} below inner level {inner}")]
    InitBelowInner {
        /// Staged init level.
        init: u8,
        /// Staged inner level.
        inner: u8,
    },

    /// `outer_level` must not be below `inner_level`.
    #[error("outer level {outer} below inner level {inner}")]
    OuterBelowInner {
        /// Staged outer level.
        outer: u8,
        /// Staged inner level.
        inner: u8,
    },

    /// `outer_level` must not be below `init_level`.
    #[error("outer level {outer} below init level {init}")]
    OuterBelowInit {
        /// Staged outer level.
        outer: u8,
        /// Staged init level.
        init: u8,
    },

    /// The nest cannot be deeper than the hardware loop stack.
    #[error("outer level {outer} exceeds the hardware loop stack")]
    TooManyLevels {
        /// Staged outer level.
        outer: u8,
    },

    /// A loop bound does not fit the hardware loop counter.
    #[error("loop bound {bound} at level {level} does not fit the hardware loop counter")]
    LoopBoundTooLarge {
        /// Level of the offending bound.
        level: usize,
        /// The staged bound.
        bound: u32,
    },

    /// An absolute loop formulation staged a level with no iterations.
    #[error("iteration count at level {level} must be at least 1")]
    ZeroIterationCount {
        /// Level of the offending count.
        level: usize,
    },
}

/// One accelerator job, fully staged.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    /// Which kernel to run.
    pub op_code: OpCode,
    /// Loop level whose entry fires the kernel's `init`.
    pub init_level: u8,
    /// Loop level whose exit fires the kernel's `store`.
    pub inner_level: u8,
    /// Outermost loop level of the nest.
    pub outer_level: u8,
    /// AGU providing the init operand; values >= 3 select zero.
    pub init_sel: u8,
    /// Opcode-local function bits.
    pub aux_func: u8,
    /// Opcode-local sign / direction modifier.
    pub polarity: bool,
    /// Inclusive per-level bounds; level `k` iterates `loop_bound[k] + 1` times.
    pub loop_bound: [u32; N_HW_LOOPS],
    /// Initial byte address of each AGU.
    pub agu_off: [u32; N_AGUS],
    /// Signed byte stride per AGU and loop level.
    pub agu_stride: [[i32; N_HW_LOOPS]; N_AGUS],
    /// Optional cursor range assertion, checked while the nest runs.
    pub addr_check: Option<AddrRange>,
}

impl JobDescriptor {
    /// A descriptor with a degenerate single-iteration nest and no AGU
    /// programming. Callers overwrite the fields they stage.
    pub fn new(op_code: OpCode) -> Self {
        Self {
            op_code,
            init_level: 0,
            inner_level: 0,
            outer_level: 0,
            init_sel: INIT_WITH_ZERO,
            aux_func: 0,
            polarity: false,
            loop_bound: [0; N_HW_LOOPS],
            agu_off: [0; N_AGUS],
            agu_stride: [[0; N_HW_LOOPS]; N_AGUS],
            addr_check: None,
        }
    }

    /// Check every structural invariant. Runs before the first memory
    /// access; a failing descriptor has no observable effect.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.init_level < self.inner_level {
            return Err(DescriptorError::InitBelowInner {
                init: self.init_level,
                inner: self.inner_level,
            });
        }
        if self.outer_level < self.inner_level {
            return Err(DescriptorError::OuterBelowInner {
                outer: self.outer_level,
                inner: self.inner_level,
            });
        }
        if self.outer_level < self.init_level {
            return Err(DescriptorError::OuterBelowInit {
                outer: self.outer_level,
                init: self.init_level,
            });
        }
        if self.outer_level as usize > N_HW_LOOPS {
            return Err(DescriptorError::TooManyLevels {
                outer: self.outer_level,
            });
        }
        for (level, &bound) in self.loop_bound.iter().enumerate() {
            if u64::from(bound) >= 1u64 << HW_LOOP_WIDTH {
                return Err(DescriptorError::LoopBoundTooLarge { level, bound });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_descriptor_is_valid() {
        assert_eq!(JobDescriptor::new(OpCode::Mac).validate(), Ok(()));
    }

    #[test]
    fn test_init_below_inner_rejected() {
        let mut d = JobDescriptor::new(OpCode::Mac);
        d.inner_level = 2;
        d.init_level = 1;
        d.outer_level = 2;
        assert_eq!(
            d.validate(),
            Err(DescriptorError::InitBelowInner { init: 1, inner: 2 })
        );
    }

    #[test]
    fn test_outer_below_inner_rejected() {
        let mut d = JobDescriptor::new(OpCode::Copy);
        d.inner_level = 3;
        d.init_level = 3;
        d.outer_level = 2;
        assert_eq!(
            d.validate(),
            Err(DescriptorError::OuterBelowInner { outer: 2, inner: 3 })
        );
    }

    #[test]
    fn test_outer_below_init_rejected() {
        let mut d = JobDescriptor::new(OpCode::Copy);
        d.init_level = 2;
        d.outer_level = 1;
        d.inner_level = 0;
        assert_eq!(
            d.validate(),
            Err(DescriptorError::OuterBelowInit { outer: 1, init: 2 })
        );
    }

    #[test]
    fn test_nest_deeper_than_hardware_rejected() {
        let mut d = JobDescriptor::new(OpCode::Mac);
        d.outer_level = 6;
        d.init_level = 6;
        assert_eq!(
            d.validate(),
            Err(DescriptorError::TooManyLevels { outer: 6 })
        );
    }

    #[test]
    fn test_oversized_loop_bound_rejected() {
        let mut d = JobDescriptor::new(OpCode::Mac);
        d.loop_bound[2] = 1 << 16;
        assert_eq!(
            d.validate(),
            Err(DescriptorError::LoopBoundTooLarge {
                level: 2,
                bound: 1 << 16
            })
        );
    }

    #[test]
    fn test_full_depth_nest_accepted() {
        let mut d = JobDescriptor::new(OpCode::Mac);
        d.outer_level = 5;
        d.init_level = 5;
        d.inner_level = 0;
        d.loop_bound = [0xFFFF; 5];
        assert_eq!(d.validate(), Ok(()));
    }
}
