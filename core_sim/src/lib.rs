mod bin;

pub mod addr;
pub mod cache;
pub mod config;
pub mod sim;
pub mod summary;
pub mod trace;

#[cfg(feature = "stat")]
pub mod stat;
