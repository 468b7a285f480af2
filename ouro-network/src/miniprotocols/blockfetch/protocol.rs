use std::fmt::Debug;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crate::miniprotocols::{
    Agency, BoxError, MessageKind, MiniProtocol, Point, State, StateEntry, StateMap, Transition,
    PROTOCOL_N2N_BLOCK_FETCH,
};

pub type Body = Vec<u8>;

/// Inclusive span of blocks, from the first point to the last one
pub type Range = (Point, Point);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    RequestRange(Range),
    ClientDone,
    StartBatch,
    NoBlocks,
    Block(Body),
    BatchDone,
}

pub const MSG_REQUEST_RANGE: MessageKind = 0;
pub const MSG_CLIENT_DONE: MessageKind = 1;
pub const MSG_START_BATCH: MessageKind = 2;
pub const MSG_NO_BLOCKS: MessageKind = 3;
pub const MSG_BLOCK: MessageKind = 4;
pub const MSG_BATCH_DONE: MessageKind = 5;

impl crate::miniprotocols::Message for Message {
    fn kind(&self) -> MessageKind {
        match self {
            Message::RequestRange(..) => MSG_REQUEST_RANGE,
            Message::ClientDone => MSG_CLIENT_DONE,
            Message::StartBatch => MSG_START_BATCH,
            Message::NoBlocks => MSG_NO_BLOCKS,
            Message::Block(..) => MSG_BLOCK,
            Message::BatchDone => MSG_BATCH_DONE,
        }
    }
}

pub const STATE_IDLE: State = State::new(1, "Idle");
pub const STATE_BUSY: State = State::new(2, "Busy");
pub const STATE_STREAMING: State = State::new(3, "Streaming");
pub const STATE_DONE: State = State::new(4, "Done");

pub static PROTOCOL: MiniProtocol = MiniProtocol {
    name: "blockfetch",
    id: PROTOCOL_N2N_BLOCK_FETCH,
    states: StateMap::new(&[
        StateEntry {
            state: STATE_IDLE,
            agency: Agency::Client,
            transitions: &[
                Transition {
                    kind: MSG_REQUEST_RANGE,
                    next: STATE_BUSY,
                },
                Transition {
                    kind: MSG_CLIENT_DONE,
                    next: STATE_DONE,
                },
            ],
        },
        StateEntry {
            state: STATE_BUSY,
            agency: Agency::Server,
            transitions: &[
                Transition {
                    kind: MSG_START_BATCH,
                    next: STATE_STREAMING,
                },
                Transition {
                    kind: MSG_NO_BLOCKS,
                    next: STATE_IDLE,
                },
            ],
        },
        StateEntry {
            state: STATE_STREAMING,
            agency: Agency::Server,
            transitions: &[
                Transition {
                    kind: MSG_BLOCK,
                    next: STATE_STREAMING,
                },
                Transition {
                    kind: MSG_BATCH_DONE,
                    next: STATE_IDLE,
                },
            ],
        },
        StateEntry {
            state: STATE_DONE,
            agency: Agency::Nobody,
            transitions: &[],
        },
    ]),
    initial: STATE_IDLE,
};

pub const DEFAULT_BATCH_START_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadlines applied while the server holds agency
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wait for `StartBatch` or `NoBlocks` after a range request
    #[serde_as(as = "DurationSeconds<u64>")]
    pub batch_start: Duration,

    /// Wait for each `Block` or the closing `BatchDone` while streaming
    #[serde_as(as = "DurationSeconds<u64>")]
    pub block: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            batch_start: DEFAULT_BATCH_START_TIMEOUT,
            block: DEFAULT_BLOCK_TIMEOUT,
        }
    }
}

/// Receives every block body of a batch, in arrival order
pub type BlockFunc = Box<dyn FnMut(Body) -> Result<(), BoxError> + Send>;

#[derive(Default)]
pub struct Config {
    pub timeouts: Timeouts,
    pub on_block: Option<BlockFunc>,
}

impl Config {
    pub fn new(on_block: BlockFunc) -> Self {
        Self {
            timeouts: Timeouts::default(),
            on_block: Some(on_block),
        }
    }

    pub fn with_timeouts(self, timeouts: Timeouts) -> Self {
        Self { timeouts, ..self }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("timeouts", &self.timeouts)
            .field("on_block", &self.on_block.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_map_is_well_formed() {
        PROTOCOL.states.validate().unwrap();
    }

    #[test]
    fn client_holds_agency_only_while_idle() {
        use crate::miniprotocols::Role;

        let states = &PROTOCOL.states;

        assert!(states.can_send(STATE_IDLE, Role::Initiator));
        assert!(states.can_send(STATE_BUSY, Role::Responder));
        assert!(states.can_send(STATE_STREAMING, Role::Responder));
        assert!(!states.can_send(STATE_STREAMING, Role::Initiator));
        assert!(states.is_terminal(STATE_DONE));
    }

    #[test]
    fn blocks_keep_the_batch_open() {
        let states = &PROTOCOL.states;

        assert_eq!(states.apply(STATE_STREAMING, MSG_BLOCK).unwrap(), STATE_STREAMING);
        assert_eq!(states.apply(STATE_STREAMING, MSG_BATCH_DONE).unwrap(), STATE_IDLE);
        assert_eq!(states.apply(STATE_BUSY, MSG_NO_BLOCKS).unwrap(), STATE_IDLE);
    }

    #[test]
    fn default_timeouts() {
        let timeouts = Timeouts::default();

        assert_eq!(timeouts.batch_start, Duration::from_secs(5));
        assert_eq!(timeouts.block, Duration::from_secs(60));
    }

    #[test]
    fn timeouts_are_read_in_seconds() {
        let timeouts: Timeouts = serde_json::from_str(r#"{ "batch_start": 2 }"#).unwrap();

        assert_eq!(timeouts.batch_start, Duration::from_secs(2));
        assert_eq!(timeouts.block, DEFAULT_BLOCK_TIMEOUT);

        let json = serde_json::to_value(Timeouts::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "batch_start": 5, "block": 60 }));
    }
}
