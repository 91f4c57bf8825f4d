//! YMF262 OPL3 Chip Emulation
//!
//! Cycle-accurate YMF262 core. The 36 operator slots live in 8 groups of 8
//! lanes processed in a fixed order each tick; register writes reshape the
//! lane data, and the generators reproduce the hardware's integer data path
//! sample by sample at the native 49716 Hz rate.

pub mod chip;
mod dispatch;
mod generators;
pub mod queue;
pub mod registers;
pub(crate) mod simd;
pub(crate) mod tables;

pub use chip::{Ymf262, NATIVE_SAMPLE_RATE};
