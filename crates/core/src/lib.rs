//! Core data types for the price monitor.

pub mod price;
pub mod source;

pub use price::*;
pub use source::*;
