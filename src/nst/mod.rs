//! The accelerator core: descriptors, kernels, the loop-nest executor and
//! the host-side staging helpers.
//!
//! A job's life cycle:
//!
//! 1. the host stages it, either by filling a [`JobDescriptor`] directly
//!    (incremental byte strides, inclusive bounds) or through the
//!    [`JobBuilder`] absolute formulation;
//! 2. [`NstCore::run_job`] validates the descriptor, resets the machine
//!    state, and drives the loop nest against the TCDM;
//! 3. optionally, [`jobdump`] writes the staged job and the memory image
//!    out for external diffing.

pub mod command;
pub mod descriptor;
pub mod executor;
mod kernels;
pub mod jobdump;

pub use command::{pack_cmd_word, JobBuilder};
pub use descriptor::{AddrRange, DescriptorError, JobDescriptor, OpCode};
pub use executor::{ExecError, NstCore, NstState};
