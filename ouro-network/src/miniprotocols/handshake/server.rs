use tracing::{debug, info, warn};

use super::n2n::VersionData;
use super::{
    highest_mutual_version, Config, Message, RefuseReason, VersionNumber, VersionTable, PROTOCOL,
};
use crate::miniprotocols::{Agent, Error, FailureSender, Role, State};
use crate::multiplexer;

/// Responder side of the handshake
pub struct Server {
    agent: Agent<Message>,
    config: Config,
}

impl Server {
    pub fn new(channel: multiplexer::AgentChannel, failures: FailureSender, config: Config) -> Self {
        Self {
            agent: Agent::new(&PROTOCOL, Role::Responder, channel, failures),
            config,
        }
    }

    pub fn state(&self) -> State {
        self.agent.state()
    }

    pub fn is_done(&self) -> bool {
        self.agent.is_done()
    }

    pub fn has_agency(&self) -> bool {
        self.agent.has_agency()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn receive_proposed_versions(&mut self) -> Result<VersionTable, Error> {
        match self.agent.recv().await? {
            Message::Propose(table) => {
                debug!(versions = ?table.versions(), "versions proposed");
                Ok(table)
            }
            Message::Refuse(reason) => Err(self.agent.fail(Error::PeerRefused(format!("{reason:?}")))),
            other => Err(self.agent.fail(Error::InvalidInbound(format!(
                "unexpected {other:?} while waiting for a proposal"
            )))),
        }
    }

    pub async fn accept_version(
        &mut self,
        version: VersionNumber,
        data: VersionData,
    ) -> Result<(), Error> {
        let msg = Message::Accept(version, data);
        self.agent.send(&msg).await
    }

    pub async fn refuse(&mut self, reason: RefuseReason) -> Result<(), Error> {
        let msg = Message::Refuse(reason);
        self.agent.send(&msg).await
    }

    /// Runs the responder side to completion: waits for a proposal, accepts
    /// the highest mutually supported version and reports it through the
    /// finished callback.
    ///
    /// When no version matches, the negotiation fails without answering the
    /// initiator.
    pub async fn run(&mut self) -> Result<(VersionNumber, VersionData), Error> {
        if self.config.on_finished.is_none() {
            return Err(self.agent.fail(Error::MissingCallback("handshake finished")));
        }

        let proposal = self.receive_proposed_versions().await?;

        let (version, data) = match highest_mutual_version(&self.config.versions, &proposal) {
            Some(x) => x,
            None => {
                warn!(
                    proposed = ?proposal.versions(),
                    allowed = ?self.config.versions,
                    "no mutual version"
                );

                return Err(self.agent.fail(Error::NoMutualVersion(proposal.versions())));
            }
        };

        let full_duplex = data.is_full_duplex();

        self.accept_version(version, data.clone()).await?;

        info!(version, full_duplex, "handshake accepted");

        let on_finished = match self.config.on_finished.as_mut() {
            Some(x) => x,
            None => return Err(self.agent.fail(Error::MissingCallback("handshake finished"))),
        };

        if let Err(err) = on_finished(version, full_duplex) {
            return Err(self.agent.fail(Error::callback(err)));
        }

        Ok((version, data))
    }
}
