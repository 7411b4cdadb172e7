//! Outer surfaces for driving the engine in batch.

pub mod csv;
