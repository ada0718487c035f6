pub mod client;
pub mod operations;

pub use client::HassClient;
pub use operations::{post_states, StateUpdate};
