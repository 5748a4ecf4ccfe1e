//! Key material: generation, wrapping, storage, and capability-aware
//! storage selection.

pub mod compat;
pub mod generator;
pub mod storage;
pub mod wrapper;
