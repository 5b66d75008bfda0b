//! Lazy, per-session record retrieval.
//!
//! [`RecordCache`] owns the sessions left open after a search. Record `n` of a
//! session is fetched from the server the first time it is requested; later
//! requests are answered from the cache.
//!
//! Each session sits behind its own mutex, so navigation requests for one
//! session queue behind an in-flight fetch instead of racing it, while
//! different sessions fetch in parallel. Index bounds are checked against the
//! hit count recorded at insertion time, without touching the session.

use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink, NullSink};
use crate::marc_parser::MarcParser;
use crate::record::StructuredRecord;
use crate::session::ProtocolSession;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies a session within one search run (its dispatch position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub usize);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {}", self.0)
    }
}

struct SessionSlot<S> {
    server: String,
    hits: usize,
    session: Mutex<S>,
    records: Mutex<HashMap<usize, StructuredRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sparse per-session index → record cache.
pub struct RecordCache<S: ProtocolSession> {
    slots: BTreeMap<SessionId, SessionSlot<S>>,
    parser: MarcParser,
    sink: Arc<dyn EventSink>,
}

impl<S: ProtocolSession> fmt::Debug for RecordCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCache")
            .field("sessions", &self.slots.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<S: ProtocolSession> Default for RecordCache<S> {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

impl<S: ProtocolSession> RecordCache<S> {
    /// Create an empty cache reporting to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        RecordCache {
            slots: BTreeMap::new(),
            parser: MarcParser::new(),
            sink,
        }
    }

    /// Take ownership of a session whose search has completed.
    ///
    /// A session already registered under `id` is closed and replaced.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the session has no hit count yet.
    pub fn insert(&mut self, id: SessionId, session: S) -> Result<()> {
        let server = session.descriptor().name.clone();
        let Some(hits) = session.hit_count() else {
            return Err(EngineError::protocol(&server, "session has not completed a search"));
        };
        let slot = SessionSlot {
            server,
            hits,
            session: Mutex::new(session),
            records: Mutex::new(HashMap::new()),
        };
        if let Some(old) = self.slots.insert(id, slot) {
            close_slot(old);
        }
        Ok(())
    }

    /// Store a record fetched outside the cache (for example, prefetched
    /// during dispatch). Out-of-range indexes and unknown sessions are ignored.
    pub fn seed(&self, id: SessionId, index: usize, record: StructuredRecord) {
        if let Some(slot) = self.slots.get(&id) {
            if index >= 1 && index <= slot.hits {
                lock(&slot.records).entry(index).or_insert(record);
            }
        }
    }

    /// Get record `index` (1-based) of session `id`, fetching it on first use.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Bounds`] for index 0 or past the hit count; the
    ///   session is not contacted
    /// - errors from the session's fetch, or [`EngineError::Parse`] when the
    ///   record text is unparseable; the session stays open
    pub fn get(&self, id: SessionId, index: usize) -> Result<StructuredRecord> {
        let slot = self.slot(id)?;
        if index == 0 || index > slot.hits {
            return Err(EngineError::Bounds {
                index,
                hits: slot.hits,
            });
        }
        if let Some(record) = lock(&slot.records).get(&index) {
            return Ok(record.clone());
        }

        let mut session = lock(&slot.session);
        // Another caller may have fetched it while we waited for the session.
        if let Some(record) = lock(&slot.records).get(&index) {
            return Ok(record.clone());
        }

        let fetched = session
            .fetch_record(index)
            .and_then(|raw| self.parser.parse(&raw));
        drop(session);

        match fetched {
            Ok(record) => {
                lock(&slot.records).insert(index, record.clone());
                self.sink.emit(EngineEvent::RecordFetched {
                    server: slot.server.clone(),
                    index,
                });
                Ok(record)
            },
            Err(err) => {
                self.sink.emit(EngineEvent::FetchFailed {
                    server: slot.server.clone(),
                    index,
                    kind: err.kind(),
                    message: err.to_string(),
                });
                Err(err)
            },
        }
    }

    /// Hit count of session `id`.
    #[must_use]
    pub fn hit_count(&self, id: SessionId) -> Option<usize> {
        self.slots.get(&id).map(|slot| slot.hits)
    }

    /// Server name of session `id`.
    #[must_use]
    pub fn server_name(&self, id: SessionId) -> Option<&str> {
        self.slots.get(&id).map(|slot| slot.server.as_str())
    }

    /// Number of records cached for session `id`.
    #[must_use]
    pub fn cached_count(&self, id: SessionId) -> usize {
        self.slots
            .get(&id)
            .map_or(0, |slot| lock(&slot.records).len())
    }

    /// Whether record `index` of session `id` is cached.
    #[must_use]
    pub fn is_cached(&self, id: SessionId, index: usize) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|slot| lock(&slot.records).contains_key(&index))
    }

    /// Open session ids in dispatch order.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.slots.keys().copied().collect()
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Close session `id` and drop its cached records.
    pub fn close(&mut self, id: SessionId) {
        if let Some(slot) = self.slots.remove(&id) {
            close_slot(slot);
        }
    }

    /// Close every session.
    pub fn close_all(&mut self) {
        for (_, slot) in std::mem::take(&mut self.slots) {
            close_slot(slot);
        }
    }

    fn slot(&self, id: SessionId) -> Result<&SessionSlot<S>> {
        self.slots
            .get(&id)
            .ok_or_else(|| EngineError::protocol(&id.to_string(), "no open session"))
    }
}

fn close_slot<S: ProtocolSession>(slot: SessionSlot<S>) {
    let mut session = slot
        .session
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    session.close();
    log::debug!("Closed session for {}", slot.server);
}

impl<S: ProtocolSession> Drop for RecordCache<S> {
    fn drop(&mut self) {
        self.close_all();
    }
}
