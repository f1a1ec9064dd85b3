//! nst-emu library
//!
//! Bit-exact functional model of the NST neural-streaming tensor
//! accelerator: five nested hardware loops drive three address generation
//! units over a tightly-coupled data memory, evaluating one of nine fused
//! floating-point opcodes against a wide partial-carry-save accumulator.
//!
//! # Module Organization
//!
//! - [`fp32`]: FP32 bit patterns and the bit-true MAC datapath
//! - [`device`]: Hardware state model (TCDM, AGU bank)
//! - [`nst`]: Descriptors, opcode kernels, the loop-nest executor, job dumps
//! - [`testing`]: Built-in scenario suite with golden expectations
//! - [`config`]: TOML + environment configuration

pub mod config;
pub mod device;
pub mod fp32;
pub mod nst;
pub mod testing;
