//! Core types, constants, and errors.
//!
//! This module is always compiled and has no runtime dependencies. It holds
//! the packet address codec and the error types shared by every layer.

mod address;
mod constants;
mod error;

pub use address::*;
pub use constants::*;
pub use error::*;
