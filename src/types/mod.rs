//! Types
//!
//! Token and configuration data structures.

pub mod config;
pub mod token;

pub use config::*;
pub use token::*;
