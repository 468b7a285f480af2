use std::collections::HashMap;
use std::fmt::Debug;

use itertools::Itertools;

use super::n2n::VersionData;
use crate::miniprotocols::{
    Agency, BoxError, MessageKind, MiniProtocol, State, StateEntry, StateMap, Transition,
    PROTOCOL_N2N_HANDSHAKE,
};

pub type NetworkMagic = u64;

pub type VersionNumber = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTable {
    pub values: HashMap<VersionNumber, VersionData>,
}

impl VersionTable {
    /// Version numbers of the table, in ascending order
    pub fn versions(&self) -> Vec<VersionNumber> {
        self.values.keys().copied().sorted().collect()
    }
}

impl FromIterator<(VersionNumber, VersionData)> for VersionTable {
    fn from_iter<T: IntoIterator<Item = (VersionNumber, VersionData)>>(iter: T) -> Self {
        VersionTable {
            values: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefuseReason {
    VersionMismatch(Vec<VersionNumber>),
    HandshakeDecodeError(VersionNumber, String),
    Refused(VersionNumber, String),
}

#[derive(Debug, Clone)]
pub enum Message {
    Propose(VersionTable),
    Accept(VersionNumber, VersionData),
    Refuse(RefuseReason),
    QueryReply(VersionTable),
}

pub const MSG_PROPOSE_VERSIONS: MessageKind = 0;
pub const MSG_ACCEPT_VERSION: MessageKind = 1;
pub const MSG_REFUSE: MessageKind = 2;
pub const MSG_QUERY_REPLY: MessageKind = 3;

impl crate::miniprotocols::Message for Message {
    fn kind(&self) -> MessageKind {
        match self {
            Message::Propose(..) => MSG_PROPOSE_VERSIONS,
            Message::Accept(..) => MSG_ACCEPT_VERSION,
            Message::Refuse(..) => MSG_REFUSE,
            Message::QueryReply(..) => MSG_QUERY_REPLY,
        }
    }
}

pub const STATE_PROPOSE: State = State::new(1, "Propose");
pub const STATE_CONFIRM: State = State::new(2, "Confirm");
pub const STATE_DONE: State = State::new(3, "Done");

pub static PROTOCOL: MiniProtocol = MiniProtocol {
    name: "handshake",
    id: PROTOCOL_N2N_HANDSHAKE,
    states: StateMap::new(&[
        StateEntry {
            state: STATE_PROPOSE,
            agency: Agency::Client,
            transitions: &[
                Transition {
                    kind: MSG_PROPOSE_VERSIONS,
                    next: STATE_CONFIRM,
                },
                // the initiator may give up before proposing anything
                Transition {
                    kind: MSG_REFUSE,
                    next: STATE_DONE,
                },
            ],
        },
        StateEntry {
            state: STATE_CONFIRM,
            agency: Agency::Server,
            transitions: &[
                Transition {
                    kind: MSG_ACCEPT_VERSION,
                    next: STATE_DONE,
                },
                Transition {
                    kind: MSG_REFUSE,
                    next: STATE_DONE,
                },
                Transition {
                    kind: MSG_QUERY_REPLY,
                    next: STATE_DONE,
                },
            ],
        },
        StateEntry {
            state: STATE_DONE,
            agency: Agency::Nobody,
            transitions: &[],
        },
    ]),
    initial: STATE_PROPOSE,
};

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Confirmation {
    Accepted(VersionNumber, VersionData),
    Rejected(RefuseReason),
    QueryReply(VersionTable),
}

/// Invoked once a version was accepted, with the version and whether the
/// connection runs in full duplex.
pub type FinishedFunc = Box<dyn FnMut(VersionNumber, bool) -> Result<(), BoxError> + Send>;

/// Responder side settings
pub struct Config {
    /// Versions this node is willing to run
    pub versions: Vec<VersionNumber>,
    pub on_finished: Option<FinishedFunc>,
}

impl Config {
    pub fn new(versions: Vec<VersionNumber>, on_finished: FinishedFunc) -> Self {
        Self {
            versions,
            on_finished: Some(on_finished),
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("versions", &self.versions)
            .field("on_finished", &self.on_finished.is_some())
            .finish()
    }
}

/// Picks the highest version of `allowed` that is also part of `proposal`.
///
/// Lower mutual versions are never considered once a higher one matches.
pub fn highest_mutual_version(
    allowed: &[VersionNumber],
    proposal: &VersionTable,
) -> Option<(VersionNumber, VersionData)> {
    allowed
        .iter()
        .copied()
        .sorted()
        .rev()
        .find_map(|v| proposal.values.get(&v).map(|data| (v, data.clone())))
}
