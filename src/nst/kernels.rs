//! The nine opcode kernels.
//!
//! Every kernel implements the same three-phase contract driven by the
//! loop-nest engine: `init` when the nest enters the init level, `execute`
//! in the innermost loop body, `store` when the nest leaves the inner
//! level. The phases differ per opcode in how they use the two memory
//! operands, the wide accumulator, the scalar ALU register, and the
//! counter/index pair.
//!
//! The set is closed, so dispatch is a tagged enum rather than dynamic
//! dispatch; variants carry the per-opcode scratch (the predicate latch and
//! the operand addresses latched at execute time). Addresses, not values,
//! are latched: the store phase re-reads memory through the latched
//! address, which keeps aliased input/output windows bit-exact.

use crate::device::Tcdm;
use crate::fp32::{self, FP32_ONE, FP32_ZERO};

use super::descriptor::{JobDescriptor, OpCode, AUX_CMP_CNT, AUX_CMP_EQ, AUX_CMP_LE, AUX_CMP_LT};
use super::executor::{ExecError, NstState};

/// Kernel instance for one job, with per-opcode scratch.
#[derive(Debug)]
pub(crate) enum OpKernel {
    Mac,
    VAddSub,
    VMult,
    OuterP,
    MaxMin,
    ThTst { tst: bool, op_b: u32 },
    Mask { tst: bool, op_a: u32 },
    MaskMac { tst: bool, op_a: u32 },
    Copy,
}

impl OpKernel {
    /// Instantiate the kernel for an opcode with cleared scratch.
    pub fn for_op(op: OpCode) -> Self {
        match op {
            OpCode::Mac => OpKernel::Mac,
            OpCode::VAddSub => OpKernel::VAddSub,
            OpCode::VMult => OpKernel::VMult,
            OpCode::OuterP => OpKernel::OuterP,
            OpCode::MaxMin => OpKernel::MaxMin,
            OpCode::ThTst => OpKernel::ThTst {
                tst: false,
                op_b: 0,
            },
            OpCode::Mask => OpKernel::Mask {
                tst: false,
                op_a: 0,
            },
            OpCode::MaskMac => OpKernel::MaskMac {
                tst: false,
                op_a: 0,
            },
            OpCode::Copy => OpKernel::Copy,
        }
    }

    /// Init phase, fired on entry to the init level.
    pub fn init(
        &mut self,
        st: &mut NstState,
        desc: &JobDescriptor,
        tcdm: &Tcdm,
    ) -> Result<(), ExecError> {
        match self {
            OpKernel::Mac => {
                if desc.init_sel >= 3 {
                    st.accu.clear();
                } else {
                    let x = tcdm.read_word(st.agu.cursor(desc.init_sel as usize))?;
                    st.accu.mac(x, FP32_ONE, true, false);
                }
            }

            OpKernel::VAddSub => {
                // the preload carries the polarity; execute always adds
                if desc.init_sel >= 3 {
                    st.accu.clear();
                } else {
                    let x = tcdm.read_word(st.agu.cursor(desc.init_sel as usize))?;
                    st.accu.mac(x, FP32_ONE, true, desc.polarity);
                }
            }

            OpKernel::VMult => {
                // no init: each execute restarts the accumulator
            }

            OpKernel::OuterP => {
                st.alu_state = st.init_word(desc.init_sel, tcdm)?;
                st.accu.clear();
            }

            OpKernel::MaxMin => {
                st.alu_state = st.init_word(desc.init_sel, tcdm)?;
                st.cnt_state = 0;
            }

            OpKernel::ThTst { .. } => {
                st.alu_state = st.init_word(desc.init_sel, tcdm)?;
            }

            OpKernel::Mask { .. } => {
                st.alu_state = st.init_word(desc.init_sel, tcdm)?;
                st.cnt_state = 0;
            }

            OpKernel::MaskMac { .. } => {
                // threshold scalar always comes from AGU 1
                st.alu_state = if desc.init_sel >= 3 {
                    FP32_ZERO
                } else {
                    tcdm.read_word(st.agu.cursor(1))?
                };
                // the destination element seeds the running sum
                let seed = tcdm.read_word(st.agu.cursor(0))?;
                st.accu.mac(seed, FP32_ONE, true, false);
                st.cnt_state = 0;
            }

            OpKernel::Copy => {
                if desc.aux_func & 0x1 == 0 {
                    st.alu_state = st.init_word(desc.init_sel, tcdm)?;
                }
            }
        }
        Ok(())
    }

    /// Execute phase, fired in the innermost loop body.
    pub fn execute(
        &mut self,
        st: &mut NstState,
        desc: &JobDescriptor,
        tcdm: &Tcdm,
    ) -> Result<(), ExecError> {
        match self {
            OpKernel::Mac => {
                let op_a = tcdm.read_word(st.agu.cursor(0))?;
                let op_b = tcdm.read_word(st.agu.cursor(1))?;
                st.accu.mac(op_a, op_b, false, desc.polarity);
            }

            OpKernel::VAddSub => {
                let op_a = tcdm.read_word(st.agu.cursor(0))?;
                st.accu.mac(op_a, FP32_ONE, false, false);
            }

            OpKernel::VMult => {
                let op_a = tcdm.read_word(st.agu.cursor(0))?;
                let op_b = tcdm.read_word(st.agu.cursor(1))?;
                st.accu.mac(op_a, op_b, true, desc.polarity);
            }

            OpKernel::OuterP => {
                let op_a = tcdm.read_word(st.agu.cursor(0))?;
                st.accu.mac(op_a, st.alu_state, true, desc.polarity);
            }

            OpKernel::MaxMin => {
                let elem = tcdm.read_word(st.agu.cursor(1))?;
                let running = fp32::as_real(st.alu_state);
                let elem_real = fp32::as_real(elem);
                // strict in both directions: ties keep the earliest index,
                // and NaN elements never take over the running value
                let taken = if desc.polarity {
                    elem_real > running
                } else {
                    elem_real < running
                };
                if taken {
                    st.alu_state = elem;
                    st.idx_state = st.cnt_state;
                }
                st.cnt_state = st.cnt_state.wrapping_add(1);
            }

            OpKernel::ThTst { tst, op_b } => {
                *op_b = st.agu.cursor(1);
                let elem = tcdm.read_word(*op_b)?;
                *tst = compare(desc.aux_func & 0x3, st.alu_state, elem, desc.polarity);
            }

            OpKernel::Mask { tst, op_a } => {
                *op_a = st.agu.cursor(0);
                // full aux dispatch: undocumented values fall to false
                *tst = match desc.aux_func {
                    AUX_CMP_EQ | AUX_CMP_LT | AUX_CMP_LE => {
                        let elem = tcdm.read_word(st.agu.cursor(1))?;
                        compare(desc.aux_func, st.alu_state, elem, desc.polarity)
                    }
                    AUX_CMP_CNT => counter_match(st.cnt_state, st.alu_state) ^ desc.polarity,
                    _ => false,
                };
                st.cnt_state = st.cnt_state.wrapping_add(1);
            }

            OpKernel::MaskMac { tst, op_a } => {
                // the destination element is both the contribution and,
                // in positional mode, the comparison operand
                *op_a = st.agu.cursor(2);
                let op_b_addr = if desc.aux_func & 0x4 != 0 {
                    *op_a
                } else {
                    st.agu.cursor(1)
                };
                *tst = match desc.aux_func {
                    AUX_CMP_EQ | AUX_CMP_LT | AUX_CMP_LE => {
                        let elem = tcdm.read_word(op_b_addr)?;
                        compare(desc.aux_func, st.alu_state, elem, desc.polarity)
                    }
                    AUX_CMP_CNT => counter_match(st.cnt_state, st.alu_state) ^ desc.polarity,
                    _ => false,
                };
                st.cnt_state = st.cnt_state.wrapping_add(1);
            }

            OpKernel::Copy => {
                if desc.aux_func & 0x1 != 0 {
                    st.alu_state = tcdm.read_word(st.agu.cursor(0))?;
                }
            }
        }
        Ok(())
    }

    /// Store phase, fired on exit from the inner level.
    pub fn store(
        &mut self,
        st: &mut NstState,
        desc: &JobDescriptor,
        tcdm: &mut Tcdm,
    ) -> Result<(), ExecError> {
        match self {
            OpKernel::Mac | OpKernel::VAddSub | OpKernel::VMult | OpKernel::OuterP => {
                store_rendered(st, desc, tcdm)?;
            }

            OpKernel::MaxMin => {
                let out = if desc.aux_func != 0 {
                    // arg form: the index bits go out verbatim
                    st.idx_state
                } else {
                    st.alu_state
                };
                tcdm.write_word(st.agu.cursor(2), out)?;
            }

            OpKernel::ThTst { tst, op_b } => {
                let out = if desc.aux_func & 0x4 != 0 {
                    if *tst {
                        FP32_ONE
                    } else {
                        FP32_ZERO
                    }
                } else if *tst {
                    tcdm.read_word(*op_b)?
                } else {
                    st.alu_state
                };
                tcdm.write_word(st.agu.cursor(2), out)?;
            }

            OpKernel::Mask { tst, op_a } => {
                let out = if *tst {
                    tcdm.read_word(*op_a)?
                } else {
                    FP32_ZERO
                };
                tcdm.write_word(st.agu.cursor(2), out)?;
            }

            OpKernel::MaskMac { tst, op_a } => {
                // writeback is itself conditional: a false predicate leaves
                // the destination word untouched
                if *tst {
                    let contrib = tcdm.read_word(*op_a)?;
                    st.accu.mac(contrib, FP32_ONE, false, false);
                    tcdm.write_word(st.agu.cursor(2), st.accu.readout())?;
                }
            }

            OpKernel::Copy => {
                tcdm.write_word(st.agu.cursor(2), st.alu_state)?;
            }
        }
        Ok(())
    }
}

/// Render the accumulator and write it out, with the optional ReLU clamp.
fn store_rendered(
    st: &mut NstState,
    desc: &JobDescriptor,
    tcdm: &mut Tcdm,
) -> Result<(), ExecError> {
    st.accu.mac(FP32_ZERO, FP32_ZERO, false, false);
    let mut out = st.accu.readout();
    if desc.aux_func != 0 && fp32::sign(out) {
        out = FP32_ZERO;
    }
    tcdm.write_word(st.agu.cursor(2), out)?;
    Ok(())
}

/// Comparison select shared by THTST, MASK and MASKMAC.
///
/// The polarity inversion applies only to the documented selects; an
/// unknown select is constant false regardless of polarity.
fn compare(sel: u8, alu: u32, op_b: u32, polarity: bool) -> bool {
    let a = fp32::as_real(alu);
    let b = fp32::as_real(op_b);
    match sel {
        AUX_CMP_EQ => (a == b) ^ polarity,
        AUX_CMP_LT => (a < b) ^ polarity,
        AUX_CMP_LE => (a <= b) ^ polarity,
        _ => false,
    }
}

/// Positional predicate: the iteration counter against the ALU register,
/// compared on the real value the register encodes.
fn counter_match(cnt: u32, alu: u32) -> bool {
    cnt as f32 == fp32::as_real(alu)
}
