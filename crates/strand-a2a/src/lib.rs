pub mod client;
pub mod types;

pub use client::DelegationClient;
pub use types::*;
