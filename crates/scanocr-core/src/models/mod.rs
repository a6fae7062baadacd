//! Configuration and result types.

pub mod config;
pub mod page;
