//! Command handlers for the zwnvm CLI

pub mod export;
pub mod import;
