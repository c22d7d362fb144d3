pub mod cache;
pub mod common;
pub mod config;
pub mod market;
pub mod replay;
pub mod session;

#[cfg(feature = "test-utils")]
pub mod testing;
