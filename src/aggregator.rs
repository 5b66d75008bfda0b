//! Per-server search outcomes and their grouping for presentation.

use crate::error::{EngineError, ErrorKind};
use crate::registry::ServerDescriptor;
use serde::{Deserialize, Serialize};

/// Result of one server's participation in a search.
///
/// Exactly one of `hit_count` and `error` is set once the session reached a
/// terminal per-search state; both are `None` only while it is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOutcome {
    /// Server queried
    pub descriptor: ServerDescriptor,
    /// Hits reported by the server
    pub hit_count: Option<usize>,
    /// Error category if the server failed
    pub error: Option<ErrorKind>,
    /// Error message if the server failed
    pub message: Option<String>,
}

impl ServerOutcome {
    /// Outcome of a session still in flight.
    #[must_use]
    pub fn pending(descriptor: ServerDescriptor) -> Self {
        ServerOutcome {
            descriptor,
            hit_count: None,
            error: None,
            message: None,
        }
    }

    /// Successful search.
    #[must_use]
    pub fn hits(descriptor: ServerDescriptor, hits: usize) -> Self {
        ServerOutcome {
            hit_count: Some(hits),
            ..Self::pending(descriptor)
        }
    }

    /// Failed or cancelled search.
    #[must_use]
    pub fn failed(descriptor: ServerDescriptor, err: &EngineError) -> Self {
        ServerOutcome {
            error: Some(err.kind()),
            message: Some(err.to_string()),
            ..Self::pending(descriptor)
        }
    }

    /// Whether the session has reached a terminal per-search state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.hit_count.is_some() || self.error.is_some()
    }

    /// Whether this outcome is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.error == Some(ErrorKind::Cancelled)
    }

    /// `name (host:port/database) - N hits`, as listed to the user.
    #[must_use]
    pub fn display_line(&self) -> String {
        match (self.hit_count, &self.message) {
            (Some(hits), _) => format!("{} - {hits} hits", self.descriptor.summary()),
            (None, Some(message)) => format!("{} - {message}", self.descriptor.summary()),
            (None, None) => format!("{} - searching", self.descriptor.summary()),
        }
    }
}

/// Outcomes grouped for presentation, each bucket in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Servers that found at least one record
    pub with_hits: Vec<ServerOutcome>,
    /// Servers that searched successfully but found nothing
    pub zero_hits: Vec<ServerOutcome>,
    /// Servers that failed or were cancelled
    pub errors: Vec<ServerOutcome>,
}

impl ResultSet {
    /// Sum of hits over all servers.
    #[must_use]
    pub fn total_hits(&self) -> usize {
        self.with_hits.iter().filter_map(|o| o.hit_count).sum()
    }

    /// Number of outcomes across all buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_hits.len() + self.zero_hits.len() + self.errors.len()
    }

    /// True when no outcome was grouped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition outcomes into hit, zero-hit and error buckets.
///
/// `outcomes` must be in dispatch order; order within each bucket is kept.
/// Outcomes still in flight are not grouped.
#[must_use]
pub fn aggregate(outcomes: &[ServerOutcome]) -> ResultSet {
    let mut set = ResultSet::default();
    for outcome in outcomes {
        match (outcome.hit_count, outcome.error) {
            (_, Some(_)) => set.errors.push(outcome.clone()),
            (Some(0), None) => set.zero_hits.push(outcome.clone()),
            (Some(_), None) => set.with_hits.push(outcome.clone()),
            (None, None) => log::debug!("{} still in flight", outcome.descriptor.name),
        }
    }
    set
}
