use tracing::{debug, info, warn};

use super::{Body, Config, Message, Range, PROTOCOL};
use crate::miniprotocols::{Agent, Error, FailureSender, Point, Role, State};
use crate::multiplexer;

/// Initiator side of BlockFetch.
///
/// Requests ranges from the remote node and hands every streamed block body
/// to the delivery callback of its [`Config`].
pub struct Client {
    agent: Agent<Message>,
    config: Config,
}

impl Client {
    pub fn new(channel: multiplexer::AgentChannel, failures: FailureSender, config: Config) -> Self {
        Self {
            agent: Agent::new(&PROTOCOL, Role::Initiator, channel, failures),
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

    pub fn is_halted(&self) -> bool {
        self.agent.is_halted()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sends the range request.
    ///
    /// A range that ends before it starts is refused without touching the
    /// state of the protocol.
    pub async fn send_request_range(&mut self, range: Range) -> Result<(), Error> {
        let (start, end) = &range;

        if end.slot_or_default() < start.slot_or_default() {
            return Err(Error::InvalidRange);
        }

        let msg = Message::RequestRange(range);
        self.agent.send(&msg).await?;

        debug!("range requested");

        Ok(())
    }

    /// Waits for the server to open a batch, returns false when the range
    /// holds no blocks
    pub async fn recv_while_busy(&mut self) -> Result<bool, Error> {
        let timeout = self.config.timeouts.batch_start;

        match self.agent.recv_within(timeout).await? {
            Message::StartBatch => {
                info!("batch start");
                Ok(true)
            }
            Message::NoBlocks => {
                warn!("no blocks");
                Ok(false)
            }
            other => Err(self.agent.fail(Error::InvalidInbound(format!(
                "unexpected {other:?} while busy"
            )))),
        }
    }

    pub async fn request_range(&mut self, start: Point, end: Point) -> Result<bool, Error> {
        self.send_request_range((start, end)).await?;
        self.recv_while_busy().await
    }

    /// Next block of the open batch, or `None` once the batch is done
    pub async fn recv_while_streaming(&mut self) -> Result<Option<Body>, Error> {
        let timeout = self.config.timeouts.block;

        match self.agent.recv_within(timeout).await? {
            Message::Block(body) => Ok(Some(body)),
            Message::BatchDone => {
                debug!("batch done");
                Ok(None)
            }
            other => Err(self.agent.fail(Error::InvalidInbound(format!(
                "unexpected {other:?} while streaming"
            )))),
        }
    }

    /// Reads the open batch to its end, handing each body to the delivery
    /// callback before reading the next one. Returns how many blocks were
    /// delivered.
    ///
    /// A failing callback aborts the batch: its error halts the client and
    /// the remaining blocks are left unread.
    pub async fn deliver_batch(&mut self) -> Result<usize, Error> {
        if self.config.on_block.is_none() {
            return Err(self.agent.fail(Error::MissingCallback("block delivery")));
        }

        let mut delivered = 0;

        while let Some(body) = self.recv_while_streaming().await? {
            let on_block = match self.config.on_block.as_mut() {
                Some(x) => x,
                None => return Err(self.agent.fail(Error::MissingCallback("block delivery"))),
            };

            if let Err(err) = on_block(body) {
                return Err(self.agent.fail(Error::callback(err)));
            }

            delivered += 1;
        }

        debug!(delivered, "batch delivered");

        Ok(delivered)
    }

    /// Requests the range and delivers every block of the resulting batch
    pub async fn fetch_range(&mut self, start: Point, end: Point) -> Result<usize, Error> {
        if self.config.on_block.is_none() {
            return Err(self.agent.fail(Error::MissingCallback("block delivery")));
        }

        match self.request_range(start, end).await? {
            true => self.deliver_batch().await,
            false => Ok(0),
        }
    }

    /// Fetches the single block at `point`, bypassing the delivery callback
    pub async fn fetch_single(&mut self, point: Point) -> Result<Body, Error> {
        if !self.request_range(point.clone(), point).await? {
            return Err(Error::NoBlocks);
        }

        let body = match self.recv_while_streaming().await? {
            Some(x) => x,
            None => {
                return Err(self
                    .agent
                    .fail(Error::InvalidInbound("empty batch for a single point".into())))
            }
        };

        match self.recv_while_streaming().await? {
            None => Ok(body),
            Some(_) => Err(self
                .agent
                .fail(Error::InvalidInbound("more than one block for a single point".into()))),
        }
    }

    /// Tells the server no more ranges will be requested
    pub async fn stop(&mut self) -> Result<(), Error> {
        self.agent.send(&Message::ClientDone).await?;

        debug!("client done");

        Ok(())
    }
}
