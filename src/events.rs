//! Progress and log events emitted by the engine.
//!
//! The engine never renders anything. Each component receives an
//! [`EventSink`] and reports discrete [`EngineEvent`]s through it; the
//! presentation layer decides how to show them.
//!
//! Three sinks are provided:
//! - [`LogSink`] forwards events to the `log` facade
//! - [`ChannelSink`] sends events into a `crossbeam_channel` for another thread
//! - [`NullSink`] discards them

use crate::error::ErrorKind;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A discrete engine event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A client session connected to a server.
    SessionOpened {
        /// Server name
        server: String,
        /// `host:port/database`
        target: String,
    },
    /// A search completed with a hit count.
    HitsFound {
        /// Server name
        server: String,
        /// Number of hits (may be zero)
        hits: usize,
    },
    /// A session failed during open or search.
    SessionFailed {
        /// Server name
        server: String,
        /// Operation that failed
        operation: String,
        /// Error category
        kind: ErrorKind,
        /// Underlying message
        message: String,
    },
    /// A session in flight was cancelled.
    Cancelled {
        /// Server name
        server: String,
    },
    /// A record was fetched and parsed.
    RecordFetched {
        /// Server name
        server: String,
        /// 1-based record index
        index: usize,
    },
    /// A record fetch failed; the session stays usable.
    FetchFailed {
        /// Server name
        server: String,
        /// 1-based record index
        index: usize,
        /// Error category
        kind: ErrorKind,
        /// Underlying message
        message: String,
    },
    /// One more session reached a terminal per-search state.
    Progress {
        /// Sessions finished so far
        completed: usize,
        /// Sessions dispatched
        total: usize,
    },
    /// A server-list entry was skipped.
    ConfigWarning {
        /// Description of the offending entry
        message: String,
    },
}

impl EngineEvent {
    /// Completion percentage for [`EngineEvent::Progress`], `None` otherwise.
    ///
    /// A search over zero servers is reported as complete.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        match self {
            EngineEvent::Progress { total: 0, .. } => Some(100),
            EngineEvent::Progress { completed, total } => {
                u8::try_from(completed.saturating_mul(100) / total).ok()
            },
            _ => None,
        }
    }
}

/// Receiver of engine events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: EngineEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: EngineEvent) {
        (**self).emit(event);
    }
}

/// Forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::SessionOpened { server, target } => {
                log::info!("Connected to {server} ({target})");
            },
            EngineEvent::HitsFound { server, hits: 0 } => {
                log::info!("No records found in {server}");
            },
            EngineEvent::HitsFound { server, hits } => log::info!("{server}: {hits} hits"),
            EngineEvent::SessionFailed {
                server,
                operation,
                kind,
                message,
            } => log::warn!("{server}: {operation} failed ({kind:?}): {message}"),
            EngineEvent::Cancelled { server } => log::info!("{server}: cancelled"),
            EngineEvent::RecordFetched { server, index } => {
                log::debug!("{server}: fetched record {index}");
            },
            EngineEvent::FetchFailed {
                server,
                index,
                kind,
                message,
            } => log::warn!("{server}: fetching record {index} failed ({kind:?}): {message}"),
            EngineEvent::Progress { completed, total } => {
                log::debug!("Progress: {completed}/{total}");
            },
            EngineEvent::ConfigWarning { message } => log::warn!("{message}"),
        }
    }
}

/// Sends events into a channel.
///
/// Send failures (receiver dropped) are ignored so a closed presentation
/// layer never stalls a search.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<EngineEvent>,
}

impl ChannelSink {
    /// Wrap a channel sender.
    #[must_use]
    pub fn new(sender: Sender<EngineEvent>) -> Self {
        ChannelSink { sender }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}
