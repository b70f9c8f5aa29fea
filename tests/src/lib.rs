//! Shared test infrastructure: in-memory stores and fact builders.

pub mod fixtures;
pub mod mocks;
