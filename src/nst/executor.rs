//! Machine state and the loop-nest engine.
//!
//! One job runs as a recursive counted descent from `outer_level` down to
//! level 0. Entering a level may fire the kernel's `init` (at the init
//! level); level 0 fires `execute`; leaving a level may fire `store` (at
//! the inner level). After the hooks, the AGU bank advances by that level's
//! strides, but only *between* iterations, never after the last one, so
//! cursors land on the start of the next outer tile instead of past its
//! end.
//!
//! ```text
//! level 2  ┌ init?                     (init_level == 2)
//!          │  level 1 ──┐
//!          │    level 0 │ execute      repeated bound[0]+1 times
//!          │    ...     │ store?       (inner_level == 1)
//!          │  level 1 ──┘ AGU update   (skipped on the last iteration)
//!          └ store?                    (inner_level == 2)
//! ```
//!
//! All machine-state registers are reset at the start of every run
//! regardless of opcode; VMULT in particular relies on the accumulator
//! being clear before its (empty) init.

use thiserror::Error;

use crate::device::{AguBank, Tcdm, TcdmError, N_HW_LOOPS};
use crate::fp32::{PcsAccu, FP32_ZERO};

use super::descriptor::{DescriptorError, JobDescriptor};
use super::kernels::OpKernel;

/// Errors raised while a job runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The descriptor failed validation; nothing was executed.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// An AGU cursor left the configured address window. Stores committed
    /// before the detection remain in memory, as on the hardware.
    #[error("AGU {agu} cursor 0x{addr:08X} outside [0x{low:08X}, 0x{high:08X}] at level {level}")]
    AguOutOfRange {
        /// Offending AGU index.
        agu: usize,
        /// Cursor address at detection.
        addr: u32,
        /// Low window bound (inclusive).
        low: u32,
        /// High window bound (inclusive).
        high: u32,
        /// Loop level being entered.
        level: u8,
    },

    /// A cursor access fell outside the TCDM buffer itself.
    #[error(transparent)]
    Tcdm(#[from] TcdmError),
}

/// The register file private to one descriptor run.
#[derive(Debug, Clone)]
pub struct NstState {
    /// AGU cursor bank, initialized from the descriptor offsets.
    pub agu: AguBank,
    /// Wide MAC accumulator.
    pub accu: PcsAccu,
    /// Scalar FP32 ALU register.
    pub alu_state: u32,
    /// Iteration counter.
    pub cnt_state: u32,
    /// Index latch for arg-style reductions.
    pub idx_state: u32,
}

impl NstState {
    fn for_job(desc: &JobDescriptor) -> Self {
        Self {
            agu: AguBank::new(desc.agu_off, desc.agu_stride),
            accu: PcsAccu::new(),
            alu_state: 0,
            cnt_state: 0,
            idx_state: 0,
        }
    }

    /// The init operand: the word under the selected AGU, or zero when the
    /// selector points past the bank.
    pub(crate) fn init_word(&self, init_sel: u8, tcdm: &Tcdm) -> Result<u32, ExecError> {
        if init_sel >= 3 {
            Ok(FP32_ZERO)
        } else {
            Ok(tcdm.read_word(self.agu.cursor(init_sel as usize))?)
        }
    }
}

/// The accelerator core: owns the machine state across runs.
#[derive(Debug)]
pub struct NstCore {
    state: Option<NstState>,
}

impl NstCore {
    /// Create an idle core.
    pub fn new() -> Self {
        Self { state: None }
    }

    /// Machine state left behind by the most recent run, for inspection.
    pub fn state(&self) -> Option<&NstState> {
        self.state.as_ref()
    }

    /// Validate and run one job against the TCDM.
    ///
    /// The machine state is re-initialized before the nest starts; a
    /// descriptor error aborts before any memory access.
    pub fn run_job(&mut self, desc: &JobDescriptor, tcdm: &mut Tcdm) -> Result<(), ExecError> {
        desc.validate()?;

        log::debug!(
            "run_job: op={:?} levels init/inner/outer={}/{}/{} bounds={:?}",
            desc.op_code,
            desc.init_level,
            desc.inner_level,
            desc.outer_level,
            &desc.loop_bound[..desc.outer_level as usize],
        );

        let mut state = NstState::for_job(desc);
        let mut kernel = OpKernel::for_op(desc.op_code);

        let result = nst_loop(
            &mut kernel,
            &mut state,
            desc,
            tcdm,
            desc.outer_level,
            true,
        );
        self.state = Some(state);
        result
    }
}

impl Default for NstCore {
    fn default() -> Self {
        Self::new()
    }
}

/// One level of the counted descent.
fn nst_loop(
    kernel: &mut OpKernel,
    st: &mut NstState,
    desc: &JobDescriptor,
    tcdm: &mut Tcdm,
    level: u8,
    is_last: bool,
) -> Result<(), ExecError> {
    if let Some(range) = desc.addr_check {
        if let Some(agu) = st.agu.out_of_range(range.low, range.high) {
            return Err(ExecError::AguOutOfRange {
                agu,
                addr: st.agu.cursor(agu),
                low: range.low,
                high: range.high,
                level,
            });
        }
    }

    if desc.init_level == level {
        kernel.init(st, desc, tcdm)?;
    }

    if level == 0 {
        kernel.execute(st, desc, tcdm)?;
    } else {
        // inclusive bounds: level k runs loop_bound[k-1] + 1 iterations
        let bound = desc.loop_bound[(level - 1) as usize];
        for k in 0..=bound {
            nst_loop(kernel, st, desc, tcdm, level - 1, k == bound)?;
        }
    }

    if desc.inner_level == level {
        kernel.store(st, desc, tcdm)?;
    }

    // strides apply between iterations only
    if (level as usize) < N_HW_LOOPS && !is_last {
        st.agu.advance(level as usize);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nst::descriptor::{AddrRange, OpCode, AUX_COPY_VECT, INIT_WITH_ZERO};

    fn f(x: f32) -> u32 {
        x.to_bits()
    }

    /// Elementwise copy of `n` words from AGU 0 to AGU 2.
    fn copy_desc(n: u32, src: u32, dst: u32) -> JobDescriptor {
        let mut d = JobDescriptor::new(OpCode::Copy);
        d.aux_func = AUX_COPY_VECT;
        d.init_level = 1;
        d.inner_level = 0;
        d.outer_level = 1;
        d.loop_bound[0] = n - 1;
        d.agu_off = [src, 0, dst];
        d.agu_stride[0][0] = 4;
        d.agu_stride[2][0] = 4;
        d
    }

    #[test]
    fn test_scalar_evaluation_at_level_zero() {
        // all bounds zero, nest collapsed to a single execute
        let mut tcdm = Tcdm::new(64);
        tcdm.write_word(0, f(42.0)).unwrap();
        let mut d = copy_desc(1, 0, 32);
        d.init_level = 0;
        d.outer_level = 0;
        let mut core = NstCore::new();
        core.run_job(&d, &mut tcdm).unwrap();
        assert_eq!(tcdm.read_word(32).unwrap(), f(42.0));
    }

    #[test]
    fn test_elementwise_copy_is_identity() {
        let mut tcdm = Tcdm::new(128);
        let src = [1.5f32, -2.0, 0.25, 8.0];
        tcdm.write_f32_slice(0, &src).unwrap();
        let mut core = NstCore::new();
        core.run_job(&copy_desc(4, 0, 64), &mut tcdm).unwrap();
        for (i, v) in src.iter().enumerate() {
            assert_eq!(tcdm.read_f32(64 + 4 * i as u32).unwrap(), *v);
        }
    }

    #[test]
    fn test_stride_suppressed_on_last_iteration() {
        // after the run, the cursor sits on the element reached by the
        // second-to-last advance, not one stride past the end
        let mut tcdm = Tcdm::new(128);
        tcdm.write_f32_slice(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut core = NstCore::new();
        core.run_job(&copy_desc(4, 0, 64), &mut tcdm).unwrap();
        let st = core.state().unwrap();
        assert_eq!(st.agu.cursor(0), 12);
        assert_eq!(st.agu.cursor(2), 76);
    }

    #[test]
    fn test_execute_count_matches_loop_product() {
        // MAXMIN counts executes in cnt_state: 3 * 4 * 2 = 24
        let mut tcdm = Tcdm::new(256);
        tcdm.write_f32_slice(0, &[0.0; 32]).unwrap();
        let mut d = JobDescriptor::new(OpCode::MaxMin);
        d.init_sel = INIT_WITH_ZERO;
        d.init_level = 3;
        d.inner_level = 3;
        d.outer_level = 3;
        d.loop_bound = [2, 3, 1, 0, 0];
        d.agu_off = [0, 0, 128];
        let mut core = NstCore::new();
        core.run_job(&d, &mut tcdm).unwrap();
        assert_eq!(core.state().unwrap().cnt_state, 24);
    }

    #[test]
    fn test_store_count_matches_inner_window_product() {
        // inner level 1 in a 2-level nest: one store per outer iteration,
        // each landing on a fresh destination word
        let mut tcdm = Tcdm::new(256);
        tcdm.write_f32_slice(0, &[7.0; 8]).unwrap();
        let mut d = JobDescriptor::new(OpCode::Copy);
        d.aux_func = AUX_COPY_VECT;
        d.init_level = 2;
        d.inner_level = 1;
        d.outer_level = 2;
        d.loop_bound = [3, 1, 0, 0, 0];
        d.agu_off = [0, 0, 128];
        d.agu_stride[0][0] = 4;
        d.agu_stride[2][1] = 4;
        let mut core = NstCore::new();
        core.run_job(&d, &mut tcdm).unwrap();
        // two stores, at 128 and 132; 136 untouched
        assert_eq!(tcdm.read_f32(128).unwrap(), 7.0);
        assert_eq!(tcdm.read_f32(132).unwrap(), 7.0);
        assert_eq!(tcdm.read_word(136).unwrap(), 0);
    }

    #[test]
    fn test_reverse_copy_with_negative_stride() {
        let mut tcdm = Tcdm::new(128);
        tcdm.write_f32_slice(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut d = copy_desc(4, 12, 64);
        d.agu_stride[0][0] = -4;
        let mut core = NstCore::new();
        core.run_job(&d, &mut tcdm).unwrap();
        for (i, want) in [4.0f32, 3.0, 2.0, 1.0].iter().enumerate() {
            assert_eq!(tcdm.read_f32(64 + 4 * i as u32).unwrap(), *want);
        }
    }

    #[test]
    fn test_malformed_descriptor_has_no_effect() {
        let mut tcdm = Tcdm::new(64);
        tcdm.write_word(0, f(9.0)).unwrap();
        let mut d = copy_desc(4, 0, 32);
        d.inner_level = 2; // outer 1 < inner 2
        let mut core = NstCore::new();
        assert!(matches!(
            core.run_job(&d, &mut tcdm),
            Err(ExecError::Descriptor(_))
        ));
        assert_eq!(tcdm.read_word(32).unwrap(), 0);
    }

    #[test]
    fn test_agu_range_check_aborts_mid_run() {
        let mut tcdm = Tcdm::new(256);
        tcdm.write_f32_slice(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut d = copy_desc(4, 0, 64);
        // window only admits the first two source elements
        d.addr_check = Some(AddrRange { low: 0, high: 71 });
        let mut core = NstCore::new();
        let err = core.run_job(&d, &mut tcdm).unwrap_err();
        assert!(matches!(err, ExecError::AguOutOfRange { agu: 2, .. }));
        // stores committed before the detection remain
        assert_eq!(tcdm.read_f32(64).unwrap(), 1.0);
        assert_eq!(tcdm.read_f32(68).unwrap(), 2.0);
    }

    #[test]
    fn test_back_to_back_jobs_are_independent() {
        // the second job starts from freshly reset machine state
        let mut tcdm = Tcdm::new(128);
        tcdm.write_f32_slice(0, &[2.0, 3.0]).unwrap();
        tcdm.write_f32_slice(16, &[10.0, 10.0]).unwrap();

        let mut mac = JobDescriptor::new(OpCode::Mac);
        mac.init_level = 1;
        mac.inner_level = 0;
        mac.outer_level = 1;
        mac.loop_bound[0] = 1;
        mac.agu_off = [0, 16, 64];
        mac.agu_stride[0][0] = 4;
        mac.agu_stride[1][0] = 4;

        let mut vmult = JobDescriptor::new(OpCode::VMult);
        vmult.init_level = 0;
        vmult.inner_level = 0;
        vmult.outer_level = 0;
        vmult.agu_off = [0, 16, 68];

        let mut core = NstCore::new();
        core.run_job(&mac, &mut tcdm).unwrap();
        assert_eq!(tcdm.read_f32(64).unwrap(), 50.0);
        core.run_job(&vmult, &mut tcdm).unwrap();
        assert_eq!(tcdm.read_f32(68).unwrap(), 20.0);
    }
}
