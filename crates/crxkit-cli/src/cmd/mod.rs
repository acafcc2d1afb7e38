//! Subcommand implementations.

pub mod apis;
pub mod download;
pub mod keygen;
pub mod pack;
pub mod parse;
pub mod resolve;
