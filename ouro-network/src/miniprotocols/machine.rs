//! Agency-annotated state tables shared by every mini-protocol
//!
//! Each mini-protocol describes its legal message exchange as a [`StateMap`]:
//! for every state, which peer holds agency and which message kinds move the
//! protocol to which next state. The tables are plain `const` data so that the
//! same enforcement logic serves every protocol.

use std::collections::HashSet;
use std::fmt::{Debug, Display};

use super::Error;
use crate::multiplexer::Protocol;

/// Discriminator carried by every message of a mini-protocol (its CBOR label)
pub type MessageKind = u16;

/// Which peer is allowed to send the next message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Agency {
    /// only the initiator may send
    Client,
    /// only the responder may send
    Server,
    /// terminal state, nobody may send
    Nobody,
}

/// The side of the connection an agent plays for a given mini-protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// The agency value under which this role is allowed to send
    pub fn agency(&self) -> Agency {
        match self {
            Role::Initiator => Agency::Client,
            Role::Responder => Agency::Server,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct State {
    id: u8,
    name: &'static str,
}

impl State {
    pub const fn new(id: u8, name: &'static str) -> Self {
        Self { id, name }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub kind: MessageKind,
    pub next: State,
}

#[derive(Debug, Clone, Copy)]
pub struct StateEntry {
    pub state: State,
    pub agency: Agency,
    pub transitions: &'static [Transition],
}

#[derive(Debug, Clone, Copy)]
pub struct StateMap {
    pub entries: &'static [StateEntry],
}

impl StateMap {
    pub const fn new(entries: &'static [StateEntry]) -> Self {
        Self { entries }
    }

    pub fn entry(&self, state: State) -> Option<&'static StateEntry> {
        self.entries.iter().find(|x| x.state == state)
    }

    /// Agency of `state`; states missing from the table have no agency at all
    pub fn agency(&self, state: State) -> Agency {
        self.entry(state)
            .map(|x| x.agency)
            .unwrap_or(Agency::Nobody)
    }

    pub fn is_terminal(&self, state: State) -> bool {
        self.agency(state) == Agency::Nobody
    }

    pub fn can_send(&self, state: State, role: Role) -> bool {
        matches!(
            (self.agency(state), role),
            (Agency::Client, Role::Initiator) | (Agency::Server, Role::Responder)
        )
    }

    /// Next state reached from `state` when a message of `kind` goes through
    pub fn apply(&self, state: State, kind: MessageKind) -> Result<State, Error> {
        let entry = self.entry(state).ok_or(Error::UnknownState(state))?;

        entry
            .transitions
            .iter()
            .find(|x| x.kind == kind)
            .map(|x| x.next)
            .ok_or(Error::InvalidTransition { state, kind })
    }

    /// Checks the structural invariants every table must hold
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = HashSet::new();

        for entry in self.entries {
            if !seen.insert(entry.state) {
                return Err(Error::MalformedStateMap(format!(
                    "state {} appears more than once",
                    entry.state
                )));
            }

            match (entry.agency, entry.transitions.is_empty()) {
                (Agency::Nobody, false) => {
                    return Err(Error::MalformedStateMap(format!(
                        "terminal state {} has outgoing transitions",
                        entry.state
                    )))
                }
                (Agency::Client | Agency::Server, true) => {
                    return Err(Error::MalformedStateMap(format!(
                        "state {} has agency but no transitions",
                        entry.state
                    )))
                }
                _ => (),
            }

            let mut kinds = HashSet::new();

            for transition in entry.transitions {
                if !kinds.insert(transition.kind) {
                    return Err(Error::MalformedStateMap(format!(
                        "message kind {} appears twice in state {}",
                        transition.kind, entry.state
                    )));
                }

                if self.entry(transition.next).is_none() {
                    return Err(Error::MalformedStateMap(format!(
                        "state {} leads to unknown state {}",
                        entry.state, transition.next
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Static description of a mini-protocol: its identity and its state table
#[derive(Debug)]
pub struct MiniProtocol {
    pub name: &'static str,
    pub id: Protocol,
    pub states: StateMap,
    pub initial: State,
}
