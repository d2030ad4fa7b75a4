//! Kiln - on-demand build coordinator
//!
//! Compiles each distinct build configuration exactly once, no matter how
//! many identical requests arrive concurrently, and serves the packaged
//! artifact to all of them.

pub mod audit;
pub mod backend;
pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod response;

pub use error::{KilnError, KilnResult};
