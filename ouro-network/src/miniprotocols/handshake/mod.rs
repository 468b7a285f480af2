//! Handshake mini-protocol: one-shot negotiation of the version and the
//! diffusion mode of a connection

mod client;
mod codec;
mod protocol;
mod server;

pub mod n2n;

pub use client::*;
pub use protocol::*;
pub use server::*;
