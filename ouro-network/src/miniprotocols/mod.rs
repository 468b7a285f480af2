//! Implementations for the different Ouroboros mini-protocols

mod agent;
mod common;
mod machine;

pub mod blockfetch;
pub mod handshake;

pub use agent::*;
pub use common::*;
pub use machine::*;
