mod client;
mod engine;
mod gateway;

pub use client::*;
pub use engine::*;
pub use gateway::*;
