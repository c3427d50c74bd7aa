//! Low-level building blocks shared across the engine

pub mod hash;
pub mod lwlock;
