use tracing::{debug, info, warn};

use super::{Confirmation, Message, RefuseReason, VersionTable, PROTOCOL};
use crate::miniprotocols::{Agent, Error, FailureSender, Role, State};
use crate::multiplexer;

/// Initiator side of the handshake
pub struct Client(Agent<Message>);

impl Client {
    pub fn new(channel: multiplexer::AgentChannel, failures: FailureSender) -> Self {
        Self(Agent::new(&PROTOCOL, Role::Initiator, channel, failures))
    }

    pub fn state(&self) -> State {
        self.0.state()
    }

    pub fn is_done(&self) -> bool {
        self.0.is_done()
    }

    pub fn has_agency(&self) -> bool {
        self.0.has_agency()
    }

    pub async fn send_propose(&mut self, versions: VersionTable) -> Result<(), Error> {
        let msg = Message::Propose(versions);
        self.0.send(&msg).await?;

        debug!("versions proposed");

        Ok(())
    }

    /// Abandons the negotiation before any proposal went out
    pub async fn send_refuse(&mut self, reason: RefuseReason) -> Result<(), Error> {
        let msg = Message::Refuse(reason);
        self.0.send(&msg).await?;

        debug!("negotiation abandoned");

        Ok(())
    }

    pub async fn recv_while_confirm(&mut self) -> Result<Confirmation, Error> {
        match self.0.recv().await? {
            Message::Accept(version, data) => {
                info!(version, "version accepted");
                Ok(Confirmation::Accepted(version, data))
            }
            Message::Refuse(reason) => {
                warn!(?reason, "version refused");
                Ok(Confirmation::Rejected(reason))
            }
            Message::QueryReply(table) => Ok(Confirmation::QueryReply(table)),
            Message::Propose(_) => Err(self
                .0
                .fail(Error::InvalidInbound("proposal sent by the responder".into()))),
        }
    }

    /// Proposes `versions` and waits for the responder to pick one
    pub async fn handshake(&mut self, versions: VersionTable) -> Result<Confirmation, Error> {
        self.send_propose(versions).await?;
        self.recv_while_confirm().await
    }
}
