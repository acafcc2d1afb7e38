//! Network and filesystem side of the toolkit.

pub mod download;
pub mod keys;
pub mod minify;
pub mod store;
