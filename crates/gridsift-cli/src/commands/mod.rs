//! CLI command implementations

pub mod index;
pub mod signature;
pub mod status;
