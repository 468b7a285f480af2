use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use ouro_codec::Fragment;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{MessageKind, MiniProtocol, Role, State};
use crate::multiplexer;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("attempted to receive message while agency is ours")]
    AgencyIsOurs,

    #[error("attempted to send message while agency is theirs")]
    AgencyIsTheirs,

    #[error("protocol already reached its terminal state")]
    ProtocolDone,

    #[error("message kind {kind} is not valid in state {state}")]
    InvalidTransition { state: State, kind: MessageKind },

    #[error("state {0} is not part of the protocol state map")]
    UnknownState(State),

    #[error("malformed state map: {0}")]
    MalformedStateMap(String),

    #[error("inbound message is not valid: {0}")]
    InvalidInbound(String),

    #[error("no mutually supported version among proposed {0:?}")]
    NoMutualVersion(Vec<u64>),

    #[error("peer refused the negotiation: {0}")]
    PeerRefused(String),

    #[error("{0} callback is not configured")]
    MissingCallback(&'static str),

    #[error("requested range ends before it starts")]
    InvalidRange,

    #[error("requested range doesn't contain any blocks")]
    NoBlocks,

    #[error("timed out after {0:?} waiting for peer in state {1}")]
    Timeout(Duration, State),

    #[error("callback failed: {0}")]
    Callback(Arc<dyn std::error::Error + Send + Sync>),

    #[error("error while sending or receiving data through the multiplexer: {0}")]
    Plexer(Arc<multiplexer::Error>),

    #[error("agent halted after a previous failure")]
    Halted,
}

impl Error {
    pub fn callback(err: BoxError) -> Self {
        Error::Callback(Arc::from(err))
    }

    /// True for the errors that come from a peer or a local send breaking
    /// the agency rules of the protocol.
    pub fn is_agency_violation(&self) -> bool {
        matches!(
            self,
            Error::AgencyIsOurs
                | Error::AgencyIsTheirs
                | Error::ProtocolDone
                | Error::InvalidTransition { .. }
                | Error::UnknownState(_)
                | Error::InvalidInbound(_)
        )
    }
}

impl From<multiplexer::Error> for Error {
    fn from(value: multiplexer::Error) -> Self {
        match value {
            multiplexer::Error::Decoding(x) => Error::InvalidInbound(x),
            x => Error::Plexer(Arc::new(x)),
        }
    }
}

/// Fatal error of one agent, as observed by whoever supervises the connection
#[derive(Debug, Clone)]
pub struct Failure {
    pub protocol: &'static str,
    pub role: Role,
    pub error: Error,
}

pub type FailureSender = mpsc::UnboundedSender<Failure>;

pub type FailureReceiver = mpsc::UnboundedReceiver<Failure>;

/// Creates the channel shared by every agent of a connection to report
/// their fatal errors.
pub fn failure_channel() -> (FailureSender, FailureReceiver) {
    mpsc::unbounded_channel()
}

/// A closed set of messages of one mini-protocol
pub trait Message: Fragment + Debug + Send + 'static {
    fn kind(&self) -> MessageKind;
}

/// One side of one mini-protocol running over a multiplexed channel.
///
/// The agent owns the current state of the protocol and checks every outbound
/// and inbound message against the agency rules of its [`MiniProtocol`]. The
/// first failure halts the agent: it is logged, pushed to the shared failure
/// channel and any further operation is refused with [`Error::Halted`].
pub struct Agent<M> {
    protocol: &'static MiniProtocol,
    role: Role,
    state: State,
    buffer: multiplexer::ChannelBuffer,
    failures: FailureSender,
    halted: bool,
    _message: PhantomData<fn() -> M>,
}

impl<M> Agent<M>
where
    M: Message,
{
    pub fn new(
        protocol: &'static MiniProtocol,
        role: Role,
        channel: multiplexer::AgentChannel,
        failures: FailureSender,
    ) -> Self {
        debug_assert_eq!(channel.protocol(), protocol.id);

        Self {
            protocol,
            role,
            state: protocol.initial,
            buffer: multiplexer::ChannelBuffer::new(channel),
            failures,
            halted: false,
            _message: PhantomData,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn protocol(&self) -> &'static MiniProtocol {
        self.protocol
    }

    pub fn is_done(&self) -> bool {
        self.protocol.states.is_terminal(self.state)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn has_agency(&self) -> bool {
        self.protocol.states.can_send(self.state, self.role)
    }

    /// Halts the agent and reports `error` on the failure channel, handing the
    /// same error back to the caller.
    pub fn fail(&mut self, error: Error) -> Error {
        warn!(
            protocol = self.protocol.name,
            role = %self.role,
            state = %self.state,
            %error,
            "agent failed"
        );

        self.halted = true;

        let failure = Failure {
            protocol: self.protocol.name,
            role: self.role,
            error: error.clone(),
        };

        if self.failures.send(failure).is_err() {
            debug!(protocol = self.protocol.name, "nobody is listening for failures");
        }

        error
    }

    fn assert_not_halted(&self) -> Result<(), Error> {
        match self.halted {
            true => Err(Error::Halted),
            false => Ok(()),
        }
    }

    fn assert_outbound(&self, msg: &M) -> Result<State, Error> {
        if self.is_done() {
            return Err(Error::ProtocolDone);
        }

        if !self.has_agency() {
            return Err(Error::AgencyIsTheirs);
        }

        self.protocol.states.apply(self.state, msg.kind())
    }

    fn assert_inbound_agency(&self) -> Result<(), Error> {
        if self.is_done() {
            return Err(Error::ProtocolDone);
        }

        if self.has_agency() {
            return Err(Error::AgencyIsOurs);
        }

        Ok(())
    }

    /// Sends `msg` and moves to the state its kind leads to
    pub async fn send(&mut self, msg: &M) -> Result<(), Error> {
        self.assert_not_halted()?;

        let next = match self.assert_outbound(msg) {
            Ok(x) => x,
            Err(err) => return Err(self.fail(err)),
        };

        let written = self.buffer.send_msg(msg).await;

        if let Err(err) = written {
            return Err(self.fail(err.into()));
        }

        trace!(
            protocol = self.protocol.name,
            from = %self.state,
            to = %next,
            kind = msg.kind(),
            "message sent"
        );

        self.state = next;

        Ok(())
    }

    /// Waits for the next message from the peer, without a deadline
    pub async fn recv(&mut self) -> Result<M, Error> {
        self.recv_inner(None).await
    }

    /// Waits for the next message from the peer for at most `timeout`
    pub async fn recv_within(&mut self, timeout: Duration) -> Result<M, Error> {
        self.recv_inner(Some(timeout)).await
    }

    async fn recv_inner(&mut self, timeout: Option<Duration>) -> Result<M, Error> {
        self.assert_not_halted()?;

        if let Err(err) = self.assert_inbound_agency() {
            return Err(self.fail(err));
        }

        let result = match timeout {
            Some(duration) => {
                let read = tokio::time::timeout(duration, self.buffer.recv_full_msg::<M>()).await;

                match read {
                    Ok(x) => x,
                    Err(_) => {
                        let state = self.state;
                        return Err(self.fail(Error::Timeout(duration, state)));
                    }
                }
            }
            None => self.buffer.recv_full_msg::<M>().await,
        };

        let msg = match result {
            Ok(x) => x,
            Err(err) => return Err(self.fail(err.into())),
        };

        let next = match self.protocol.states.apply(self.state, msg.kind()) {
            Ok(x) => x,
            Err(err) => return Err(self.fail(err)),
        };

        trace!(
            protocol = self.protocol.name,
            from = %self.state,
            to = %next,
            kind = msg.kind(),
            "message received"
        );

        self.state = next;

        Ok(msg)
    }
}
