//! Entity identifier types.
//!
//! Every entity kind owns a distinct newtype so an actor id can never be passed
//! where a proposal id is expected. Identifiers are allocated from a
//! [`Sequence`] and render as `<prefix>_<n>` (for example `proposal_3`).

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IdError;

/// Behaviour shared by all entity identifiers.
pub trait EntityId: Copy + Eq + Ord + Display {
    /// Prefix used in the textual representation.
    const PREFIX: &'static str;

    /// Wraps a raw sequence value.
    fn from_raw(raw: u64) -> Self;

    /// Returns the raw sequence value.
    fn raw(self) -> u64;
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
        pub struct $name(u64);

        impl EntityId for $name {
            const PREFIX: &'static str = $prefix;

            fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            fn raw(self) -> u64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_prefixed(s, $prefix).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

entity_id!(
    /// Identifier of a registered actor.
    ActorId,
    "actor"
);
entity_id!(
    /// Identifier of a workflow.
    WorkflowId,
    "workflow"
);
entity_id!(
    /// Identifier of a proposal.
    ProposalId,
    "proposal"
);
entity_id!(
    /// Identifier of a single proposal execution.
    ExecutionId,
    "execution"
);
entity_id!(
    /// Identifier of a parallel batch execution.
    ParallelExecutionId,
    "parallel"
);
entity_id!(
    /// Identifier of an audit entry.
    AuditEntryId,
    "audit"
);

fn parse_prefixed(value: &str, prefix: &'static str) -> Result<u64, IdError> {
    let invalid = |reason: &str| IdError::Invalid {
        kind: prefix,
        value: value.to_owned(),
        reason: reason.to_owned(),
    };

    let suffix = value
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or_else(|| invalid("missing prefix"))?;

    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("suffix must be a decimal number"));
    }

    suffix.parse().map_err(|_| invalid("suffix out of range"))
}

/// Monotonic identifier allocator.
///
/// Values start at 1 and are never reused.
#[derive(Debug, Default, Clone)]
pub struct Sequence {
    last: u64,
}

impl Sequence {
    /// Creates a sequence that has not allocated anything yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// Allocates the next identifier.
    pub fn next_id<I: EntityId>(&mut self) -> I {
        self.last += 1;
        I::from_raw(self.last)
    }

    /// Number of identifiers handed out so far.
    #[must_use]
    pub const fn allocated(&self) -> u64 {
        self.last
    }
}
