pub mod client;
pub mod common;
pub mod remote;
