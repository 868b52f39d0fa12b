//! Identity types for the relay protocol
//!
//! Runners are addressed by logical name. Names are stable for a runner's
//! lifetime while the handle behind a name may change as the runner moves.

use std::fmt;

/// Logical runner name - unique within a race
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RunnerId(String);

impl RunnerId {
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        RunnerId(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runner({})", self.0)
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunnerId {
    fn from(s: &str) -> Self {
        RunnerId(s.to_owned())
    }
}

impl From<String> for RunnerId {
    fn from(s: String) -> Self {
        RunnerId(s)
    }
}

/// Location identifier - a container a runner can be resident in
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Location(String);

impl Location {
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Location(name.into())
    }

    /// Conventional name of the i-th container of a simulation
    pub fn container(index: usize) -> Self {
        Location(format!("Container-{}", index))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({})", self.0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        Location(s.to_owned())
    }
}

/// Conversation tag used for selective receipt
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId(&'static str);

impl ConversationId {
    /// Hand-off requests, acknowledgements and start signals
    pub const RUNNING: ConversationId = ConversationId("running");
    /// Race-finished signals from captains to the judge
    pub const COMPLETION: ConversationId = ConversationId("completion");

    #[inline]
    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conversation({})", self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
