use tracing::{debug, info};

use super::{Body, Message, Range, PROTOCOL};
use crate::miniprotocols::{Agent, BoxError, Error, FailureSender, Role, State};
use crate::multiplexer;

/// Responder side of BlockFetch, answering range requests of the remote node
pub struct Server(Agent<Message>);

impl Server {
    pub fn new(channel: multiplexer::AgentChannel, failures: FailureSender) -> Self {
        Self(Agent::new(&PROTOCOL, Role::Responder, channel, failures))
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

    /// Waits for the next request, `None` means the client is done
    pub async fn recv_while_idle(&mut self) -> Result<Option<Range>, Error> {
        match self.0.recv().await? {
            Message::RequestRange(range) => {
                debug!(?range, "range requested");
                Ok(Some(range))
            }
            Message::ClientDone => {
                info!("client done");
                Ok(None)
            }
            other => Err(self.0.fail(Error::InvalidInbound(format!(
                "unexpected {other:?} while idle"
            )))),
        }
    }

    pub async fn send_start_batch(&mut self) -> Result<(), Error> {
        self.0.send(&Message::StartBatch).await
    }

    pub async fn send_no_blocks(&mut self) -> Result<(), Error> {
        self.0.send(&Message::NoBlocks).await
    }

    pub async fn send_block(&mut self, body: Body) -> Result<(), Error> {
        self.0.send(&Message::Block(body)).await
    }

    pub async fn send_batch_done(&mut self) -> Result<(), Error> {
        self.0.send(&Message::BatchDone).await
    }

    /// Answers the pending request with the whole batch, or with `NoBlocks`
    /// when there is nothing to stream
    pub async fn send_block_range(&mut self, bodies: Vec<Body>) -> Result<(), Error> {
        if bodies.is_empty() {
            return self.send_no_blocks().await;
        }

        self.send_start_batch().await?;

        for body in bodies {
            self.send_block(body).await?;
        }

        self.send_batch_done().await
    }

    /// Answers requests with the bodies returned by `provider` until the
    /// client is done
    pub async fn serve<F>(&mut self, mut provider: F) -> Result<(), Error>
    where
        F: FnMut(&Range) -> Result<Vec<Body>, BoxError>,
    {
        while let Some(range) = self.recv_while_idle().await? {
            let bodies = match provider(&range) {
                Ok(x) => x,
                Err(err) => return Err(self.0.fail(Error::callback(err))),
            };

            debug!(count = bodies.len(), "serving batch");

            self.send_block_range(bodies).await?;
        }

        Ok(())
    }
}
