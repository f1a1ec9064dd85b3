//! The scenario suite.
//!
//! Every scenario poisons the whole TCDM with `0x55`, lays its inputs
//! down, stages the job, runs it, then compares the touched words against
//! hand-computed goldens. Untouched words must keep the poison, which
//! catches stray stores as well as wrong values.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;

use crate::device::Tcdm;
use crate::nst::descriptor::{
    AddrRange, JobDescriptor, OpCode, AUX_CMP_CNT, AUX_CMP_LE, AUX_CMP_LT, AUX_COPY_VECT,
    AUX_MAC_RELU, AUX_MAXMIN_ARG, INIT_WITH_AGU0, INIT_WITH_AGU1, INIT_WITH_ZERO,
};
use crate::nst::{jobdump, pack_cmd_word, JobBuilder, NstCore};

/// Result of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// Memory image matched the golden values.
    Passed,
    /// Something diverged; the reason names the first mismatch.
    Failed {
        /// Human-readable mismatch description.
        reason: String,
    },
}

/// A named end-to-end job with golden expectations.
pub struct Scenario {
    /// Scenario name, also used for dump file names.
    pub name: &'static str,
    prepare: fn(&mut Tcdm) -> anyhow::Result<JobDescriptor>,
    check: fn(&Tcdm) -> TestOutcome,
}

/// Accumulated results of a suite run.
#[derive(Debug, Default)]
pub struct SuiteReport {
    /// Per-scenario outcomes in run order.
    pub results: Vec<(&'static str, TestOutcome)>,
}

impl SuiteReport {
    /// Number of passed scenarios.
    pub fn passed(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, o)| *o == TestOutcome::Passed)
            .count()
    }

    /// Number of failed scenarios.
    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }
}

/// Run one scenario against a fresh TCDM.
///
/// When `dump_dir` is given, the staged job and the pre/post memory images
/// are written as `<name>_job.txt`, `<name>_ini.txt` and `<name>_out.txt`.
pub fn run_scenario(
    scenario: &Scenario,
    tcdm_bytes: usize,
    check_tcdm_addrs: bool,
    dump_dir: Option<&Path>,
) -> anyhow::Result<TestOutcome> {
    let mut tcdm = Tcdm::new(tcdm_bytes);
    tcdm.fill(0x55);

    let mut desc = (scenario.prepare)(&mut tcdm)
        .with_context(|| format!("staging scenario '{}'", scenario.name))?;
    if check_tcdm_addrs {
        desc.addr_check = Some(AddrRange {
            low: 0,
            high: tcdm.last_word_addr(),
        });
    }

    if let Some(dir) = dump_dir {
        fs::create_dir_all(dir)?;
        let word = pack_cmd_word(&desc, 0);
        let mut jw = BufWriter::new(File::create(dir.join(format!("{}_job.txt", scenario.name)))?);
        jobdump::write_job_dump(&mut jw, scenario.name, word, &desc, 0)?;
        let mut iw = BufWriter::new(File::create(dir.join(format!("{}_ini.txt", scenario.name)))?);
        jobdump::write_mem_dump(&mut iw, &tcdm)?;
    }

    let mut core = NstCore::new();
    if let Err(e) = core.run_job(&desc, &mut tcdm) {
        return Ok(TestOutcome::Failed {
            reason: format!("execution error: {}", e),
        });
    }

    if let Some(dir) = dump_dir {
        let mut ow = BufWriter::new(File::create(dir.join(format!("{}_out.txt", scenario.name)))?);
        jobdump::write_mem_dump(&mut ow, &tcdm)?;
    }

    Ok((scenario.check)(&tcdm))
}

/// Run every scenario in order.
pub fn run_suite(
    scenarios: &[Scenario],
    tcdm_bytes: usize,
    check_tcdm_addrs: bool,
    dump_dir: Option<&Path>,
) -> anyhow::Result<SuiteReport> {
    let mut report = SuiteReport::default();
    for scenario in scenarios {
        let outcome = run_scenario(scenario, tcdm_bytes, check_tcdm_addrs, dump_dir)?;
        match &outcome {
            TestOutcome::Passed => log::info!("{}: passed", scenario.name),
            TestOutcome::Failed { reason } => log::warn!("{}: FAILED ({})", scenario.name, reason),
        }
        report.results.push((scenario.name, outcome));
    }
    Ok(report)
}

/// The built-in scenarios, in dispatch order of the opcodes they cover.
pub fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "mac_dot_product",
            prepare: prep_dot_product,
            check: |t| expect_f32(t, 32, &[300.0]),
        },
        Scenario {
            name: "mac_dot_product_relu",
            prepare: prep_dot_product_relu,
            check: |t| expect_words(t, 32, &[0x0000_0000]),
        },
        Scenario {
            name: "mac_matvec_2d",
            prepare: prep_matvec,
            check: |t| expect_f32(t, 64, &[140.0, 320.0]),
        },
        Scenario {
            name: "vaddsub_bias",
            prepare: prep_vaddsub_bias,
            check: |t| expect_f32(t, 48, &[1.5, 2.5, 3.5, 4.5]),
        },
        Scenario {
            name: "vmult_elementwise",
            prepare: prep_vmult,
            check: |t| expect_f32(t, 48, &[10.0, 40.0, 90.0, 160.0]),
        },
        Scenario {
            name: "outerp_scaled_row",
            prepare: prep_outerp,
            check: |t| expect_f32(t, 48, &[2.0, 4.0, 6.0, 8.0]),
        },
        Scenario {
            name: "maxmin_argmax",
            prepare: prep_argmax,
            check: |t| expect_words(t, 64, &[5]),
        },
        Scenario {
            name: "thtst_clamp_below",
            prepare: prep_threshold_clamp,
            check: |t| expect_f32(t, 48, &[2.5, 2.5, 3.0, 4.0]),
        },
        Scenario {
            name: "mask_position",
            prepare: prep_position_mask,
            check: |t| expect_f32(t, 96, &[0.0, 0.0, 0.0, 13.0, 0.0, 0.0, 0.0, 0.0]),
        },
        Scenario {
            name: "maskmac_gated_accum",
            prepare: prep_maskmac,
            check: |t| expect_f32(t, 48, &[100.0, 210.0, 510.0, 910.0]),
        },
        Scenario {
            name: "copy_tile_2d",
            prepare: prep_tile_copy,
            check: |t| {
                expect_f32(t, 128, &[0.0, 1.0, 2.0, 3.0, 8.0, 9.0, 10.0, 11.0])
            },
        },
    ]
}

fn prep_dot_product(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    tcdm.write_f32_slice(0, &[1.0, 2.0, 3.0, 4.0])?;
    tcdm.write_f32_slice(16, &[10.0, 20.0, 30.0, 40.0])?;
    let mut d = JobDescriptor::new(OpCode::Mac);
    d.init_sel = INIT_WITH_ZERO;
    d.init_level = 1;
    d.inner_level = 0;
    d.outer_level = 1;
    d.loop_bound[0] = 3;
    d.agu_off = [0, 16, 32];
    d.agu_stride[0][0] = 4;
    d.agu_stride[1][0] = 4;
    Ok(d)
}

fn prep_dot_product_relu(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    let mut d = prep_dot_product(tcdm)?;
    tcdm.write_f32_slice(16, &[-10.0, -20.0, -30.0, -40.0])?;
    d.aux_func = AUX_MAC_RELU;
    Ok(d)
}

fn prep_matvec(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    // 2x3 matrix times a length-3 vector: one init/store window per row,
    // the vector cursor rewinds between rows
    tcdm.write_f32_slice(0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    tcdm.write_f32_slice(32, &[10.0, 20.0, 30.0])?;
    Ok(JobBuilder::new(OpCode::Mac)
        .loop_nest(1, 1, 2, &[3, 2], &[&[1, 3], &[1, 0], &[0, 1]])
        .agu_offs(0, 32, 64)
        .cmd(INIT_WITH_ZERO, 0, false)
        .build()?)
}

fn prep_vaddsub_bias(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    // init fires every iteration, so each output is bias + one element
    tcdm.write_f32_slice(0, &[0.5])?;
    tcdm.write_f32_slice(16, &[1.0, 2.0, 3.0, 4.0])?;
    Ok(JobBuilder::new(OpCode::VAddSub)
        .loop_nest(0, 0, 1, &[4], &[&[1], &[0], &[1]])
        .agu_offs(16, 0, 48)
        .cmd(INIT_WITH_AGU1, 0, false)
        .build()?)
}

fn prep_vmult(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    tcdm.write_f32_slice(0, &[1.0, 2.0, 3.0, 4.0])?;
    tcdm.write_f32_slice(16, &[10.0, 20.0, 30.0, 40.0])?;
    Ok(JobBuilder::new(OpCode::VMult)
        .loop_nest(1, 0, 1, &[4], &[&[1], &[1], &[1]])
        .agu_offs(0, 16, 48)
        .cmd(INIT_WITH_ZERO, 0, false)
        .build()?)
}

fn prep_outerp(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    // one row of an outer product: the ALU scalar scales the row vector
    tcdm.write_f32_slice(0, &[1.0, 2.0, 3.0, 4.0])?;
    tcdm.write_f32_slice(16, &[2.0])?;
    Ok(JobBuilder::new(OpCode::OuterP)
        .loop_nest(1, 0, 1, &[4], &[&[1], &[0], &[1]])
        .agu_offs(0, 16, 48)
        .cmd(INIT_WITH_AGU1, 0, false)
        .build()?)
}

fn prep_argmax(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    tcdm.write_f32_slice(16, &[3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0])?;
    Ok(JobBuilder::new(OpCode::MaxMin)
        .loop_nest(1, 1, 1, &[8], &[&[0], &[1], &[0]])
        .agu_offs(0, 16, 64)
        .cmd(INIT_WITH_ZERO, AUX_MAXMIN_ARG, true)
        .build()?)
}

fn prep_threshold_clamp(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    // elements at or above the 2.5 threshold pass, smaller ones clamp up
    tcdm.write_f32_slice(0, &[2.5])?;
    tcdm.write_f32_slice(16, &[1.0, 2.0, 3.0, 4.0])?;
    Ok(JobBuilder::new(OpCode::ThTst)
        .loop_nest(1, 0, 1, &[4], &[&[0], &[1], &[1]])
        .agu_offs(0, 16, 48)
        .cmd(INIT_WITH_AGU0, AUX_CMP_LE, false)
        .build()?)
}

fn prep_position_mask(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    // the ALU register holds 3.0; only counter position 3 passes its input
    tcdm.write_f32_slice(
        0,
        &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0],
    )?;
    tcdm.write_f32_slice(64, &[3.0])?;
    Ok(JobBuilder::new(OpCode::Mask)
        .loop_nest(1, 0, 1, &[8], &[&[1], &[0], &[1]])
        .agu_offs(0, 64, 96)
        .cmd(INIT_WITH_AGU1, AUX_CMP_CNT, false)
        .build()?)
}

fn prep_maskmac(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    // running sum seeded from AGU 0, gated by threshold < element
    tcdm.write_f32_slice(0, &[10.0])?;
    tcdm.write_f32_slice(16, &[1.0, 5.0, 2.0, 7.0])?;
    tcdm.write_f32_slice(48, &[100.0, 200.0, 300.0, 400.0])?;
    Ok(JobBuilder::new(OpCode::MaskMac)
        .loop_nest(1, 0, 1, &[4], &[&[0], &[1], &[1]])
        .agu_offs(0, 16, 48)
        .cmd(INIT_WITH_AGU1, AUX_CMP_LT, false)
        .build()?)
}

fn prep_tile_copy(tcdm: &mut Tcdm) -> anyhow::Result<JobDescriptor> {
    // 2x4 tile out of a row-major matrix of width 8, linearized to the
    // destination
    let matrix: Vec<f32> = (0..16).map(|k| k as f32).collect();
    tcdm.write_f32_slice(0, &matrix)?;
    Ok(JobBuilder::new(OpCode::Copy)
        .loop_nest(2, 0, 2, &[4, 2], &[&[1, 8], &[0, 0], &[1, 4]])
        .agu_offs(0, 0, 128)
        .cmd(INIT_WITH_ZERO, AUX_COPY_VECT, false)
        .build()?)
}

/// Compare consecutive words against real-valued goldens, bit for bit.
fn expect_f32(tcdm: &Tcdm, addr: u32, expected: &[f32]) -> TestOutcome {
    let bits: Vec<u32> = expected.iter().map(|v| v.to_bits()).collect();
    expect_words(tcdm, addr, &bits)
}

/// Compare consecutive words against raw goldens.
fn expect_words(tcdm: &Tcdm, addr: u32, expected: &[u32]) -> TestOutcome {
    for (i, want) in expected.iter().enumerate() {
        let at = addr + (i as u32) * 4;
        match tcdm.read_word(at) {
            Ok(got) if got == *want => {}
            Ok(got) => {
                return TestOutcome::Failed {
                    reason: format!(
                        "word at 0x{:08X}: got 0x{:08X}, want 0x{:08X}",
                        at, got, want
                    ),
                }
            }
            Err(e) => {
                return TestOutcome::Failed {
                    reason: format!("reading golden word at 0x{:08X}: {}", at, e),
                }
            }
        }
    }
    TestOutcome::Passed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_scenario_passes() {
        for scenario in builtin_scenarios() {
            let outcome = run_scenario(&scenario, 4096, true, None).unwrap();
            assert_eq!(
                outcome,
                TestOutcome::Passed,
                "scenario '{}' diverged",
                scenario.name
            );
        }
    }

    #[test]
    fn test_suite_report_counts() {
        let report = run_suite(&builtin_scenarios(), 4096, false, None).unwrap();
        assert_eq!(report.failed(), 0);
        assert_eq!(report.passed(), report.results.len());
    }

    #[test]
    fn test_dumps_are_written() {
        let dir = std::env::temp_dir().join("nst-emu-suite-test");
        let scenarios = builtin_scenarios();
        let first = &scenarios[0];
        run_scenario(first, 4096, false, Some(&dir)).unwrap();
        for suffix in ["job", "ini", "out"] {
            let path = dir.join(format!("{}_{}.txt", first.name, suffix));
            assert!(path.exists(), "missing dump {:?}", path);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
