//! BlockFetch mini-protocol: range requests answered by streamed batches of
//! block bodies

mod client;
mod codec;
mod protocol;
mod server;

pub use client::*;
pub use protocol::*;
pub use server::*;

use crate::miniprotocols::FailureSender;
use crate::multiplexer::AgentChannel;

/// Both halves of the protocol for one connection.
///
/// The client fetches from the remote peer while the server answers the
/// peer's own requests; both report fatal errors to the same failure channel.
pub struct BlockFetch {
    pub client: Client,
    pub server: Server,
}

impl BlockFetch {
    pub fn new(
        initiator: AgentChannel,
        responder: AgentChannel,
        failures: FailureSender,
        config: Config,
    ) -> Self {
        Self {
            client: Client::new(initiator, failures.clone(), config),
            server: Server::new(responder, failures),
        }
    }
}
