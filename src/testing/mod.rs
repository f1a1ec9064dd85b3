//! Built-in end-to-end scenarios with golden expectations.
//!
//! Each scenario stages one job against a poisoned TCDM, runs it, and
//! checks the memory image against hand-computed values. The suite doubles
//! as the CLI's self-test and as the source of job/memory dumps for
//! external RTL diffing.

pub mod suite;

pub use suite::{builtin_scenarios, run_scenario, run_suite, Scenario, SuiteReport, TestOutcome};
