//! Network stack compatible with the Ouroboros protocol
//!
//! The [`multiplexer`] carries every mini-protocol of a connection over a
//! single bearer, [`miniprotocols`] enforces the agency rules of each
//! protocol instance and [`facades`] wires both into ready-to-use peers.

pub mod facades;
pub mod miniprotocols;
pub mod multiplexer;
