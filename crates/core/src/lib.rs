//! Core types, store traits, and errors for the GamePulse aggregation engine.

pub mod dimensions;
pub mod error;
pub mod facts;
pub mod rollup;
pub mod store;
pub mod window;

pub use dimensions::*;
pub use error::{Error, Result};
pub use facts::*;
pub use rollup::*;
pub use store::*;
pub use window::*;
