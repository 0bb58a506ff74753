//! Helpers built on top of the mixer and stream APIs.

pub mod fade;
