//! `openusd-text` is a native Rust reader for the USD text format (`usda`).
//!
//! [usda::Parser] produces a sparse [sdf::Data] store. [ar], [atomic] and
//! [usdz] hold the boundary pieces a layer loader needs around it: asset
//! resolution, atomic output and the `usdz` package container.

pub mod ar;
pub mod atomic;
pub mod sdf;
pub mod usda;
pub mod usdz;

pub use half::f16;
