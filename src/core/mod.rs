//! Core Components
//!
//! HTTP transport shared by the token manager and the data client.

pub mod transport;

pub use transport::*;
