//! Hardware state model: working memory and address generation.
//!
//! The accelerator sees exactly two pieces of hardware state outside its
//! own register file:
//!
//! ```text
//!   +--------------------------+
//!   |          TCDM            |   flat FP32 working buffer,
//!   |  (byte-addressed words)  |   externally owned
//!   +-----^--------^--------^--+
//!         |        |        |
//!       AGU 0    AGU 1    AGU 2    three cursors, each with a base
//!                                  offset and per-loop-level strides
//! ```
//!
//! The loop-nest engine in [`crate::nst`] decides *when* cursors advance;
//! this module only models the cursors and the memory behind them.

pub mod agu;
pub mod tcdm;

pub use agu::{AguBank, N_AGUS, N_HW_LOOPS};
pub use tcdm::{Tcdm, TcdmError};
