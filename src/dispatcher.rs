//! Concurrent search dispatch across servers.
//!
//! [`QueryDispatcher::run`] starts one session per server, each on its own
//! scoped thread, in the order given (so the priority server is started
//! first). Sessions report back over a channel as they finish; the dispatcher
//! thread is the only writer of the outcome list and invokes the progress
//! callback once per finished session.
//!
//! Cancellation is cooperative: sessions blocked on the client observe the
//! [`CancelToken`] and terminate their process, reporting
//! [`ErrorKind::Cancelled`](crate::error::ErrorKind::Cancelled). Sessions that
//! already finished keep their outcome and stay open in the run's
//! [`RecordCache`]. A session cancelled while prefetching record 1 keeps its
//! hit count but is closed.

use crate::aggregator::{aggregate, ResultSet, ServerOutcome};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink, LogSink};
use crate::marc_parser::MarcParser;
use crate::query::SearchQuery;
use crate::record::StructuredRecord;
use crate::record_cache::{RecordCache, SessionId};
use crate::registry::ServerDescriptor;
use crate::session::{Connector, ProtocolSession};
use crossbeam_channel::unbounded;
use std::fmt;
use std::sync::Arc;
use std::thread;

/// Everything one search invocation produced.
pub struct SearchRun<S: ProtocolSession> {
    /// One outcome per dispatched server, in dispatch order
    pub outcomes: Vec<ServerOutcome>,
    /// Sessions in the order they finished
    pub completion_order: Vec<SessionId>,
    /// Open sessions with at least one hit, keyed by dispatch position
    pub cache: RecordCache<S>,
}

impl<S: ProtocolSession> fmt::Debug for SearchRun<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchRun")
            .field("outcomes", &self.outcomes)
            .field("completion_order", &self.completion_order)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<S: ProtocolSession> SearchRun<S> {
    /// Outcomes grouped for presentation.
    #[must_use]
    pub fn results(&self) -> ResultSet {
        aggregate(&self.outcomes)
    }

    /// Session id of a dispatched server, if its session is still open.
    #[must_use]
    pub fn session_for(&self, name: &str) -> Option<SessionId> {
        self.outcomes
            .iter()
            .position(|o| o.descriptor.name == name)
            .map(SessionId)
            .filter(|id| self.cache.hit_count(*id).is_some())
    }
}

struct Finished<S> {
    id: SessionId,
    outcome: ServerOutcome,
    session: Option<S>,
    first_record: Option<StructuredRecord>,
}

/// Runs one search against many servers at once.
pub struct QueryDispatcher<C: Connector> {
    connector: C,
    config: EngineConfig,
    sink: Arc<dyn EventSink>,
    parser: MarcParser,
}

impl<C: Connector + fmt::Debug> fmt::Debug for QueryDispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDispatcher")
            .field("connector", &self.connector)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> QueryDispatcher<C> {
    /// Create a dispatcher that logs events through the `log` facade.
    #[must_use]
    pub fn new(connector: C, config: EngineConfig) -> Self {
        Self::with_sink(connector, config, Arc::new(LogSink))
    }

    /// Create a dispatcher reporting events to `sink`.
    #[must_use]
    pub fn with_sink(connector: C, config: EngineConfig, sink: Arc<dyn EventSink>) -> Self {
        QueryDispatcher {
            connector,
            config,
            sink,
            parser: MarcParser::new(),
        }
    }

    /// Search every server concurrently.
    ///
    /// `servers` should already be filtered and ordered; sessions are started
    /// in that order. `on_progress(completed, total)` is called on the
    /// caller's thread each time a session finishes. Returns once every
    /// session has finished or been cancelled.
    pub fn run<F>(
        &self,
        query: &SearchQuery,
        servers: &[ServerDescriptor],
        mut on_progress: F,
        cancel: &CancelToken,
    ) -> SearchRun<C::Session>
    where
        F: FnMut(usize, usize),
    {
        let total = servers.len();
        let mut run = SearchRun {
            outcomes: servers.iter().cloned().map(ServerOutcome::pending).collect(),
            completion_order: Vec::with_capacity(total),
            cache: RecordCache::new(Arc::clone(&self.sink)),
        };
        if total == 0 {
            on_progress(0, 0);
            self.sink.emit(EngineEvent::Progress {
                completed: 0,
                total: 0,
            });
            return run;
        }
        log::info!("Total servers to query: {total}");

        let (sender, receiver) = unbounded::<Finished<C::Session>>();
        thread::scope(|scope| {
            for (position, descriptor) in servers.iter().enumerate() {
                let sender = sender.clone();
                scope.spawn(move || {
                    let finished = self.run_session(SessionId(position), descriptor, query, cancel);
                    let _ = sender.send(finished);
                });
            }
            drop(sender);

            for (done, finished) in receiver.iter().enumerate() {
                let completed = done + 1;
                self.publish(&mut run, finished);
                on_progress(completed, total);
                self.sink.emit(EngineEvent::Progress { completed, total });
            }
        });

        run
    }

    fn publish(&self, run: &mut SearchRun<C::Session>, finished: Finished<C::Session>) {
        let Finished {
            id,
            outcome,
            session,
            first_record,
        } = finished;
        run.completion_order.push(id);
        if let Some(session) = session {
            match run.cache.insert(id, session) {
                Ok(()) => {
                    if let Some(record) = first_record {
                        run.cache.seed(id, 1, record);
                    }
                },
                Err(err) => log::warn!("Could not keep session for {}: {err}", outcome.descriptor.name),
            }
        }
        run.outcomes[id.0] = outcome;
    }

    fn run_session(
        &self,
        id: SessionId,
        descriptor: &ServerDescriptor,
        query: &SearchQuery,
        cancel: &CancelToken,
    ) -> Finished<C::Session> {
        let failed = |operation: &str, err: EngineError| {
            self.report_failure(descriptor, operation, &err);
            Finished {
                id,
                outcome: ServerOutcome::failed(descriptor.clone(), &err),
                session: None,
                first_record: None,
            }
        };

        if cancel.is_cancelled() {
            return failed("open", EngineError::Cancelled);
        }
        let mut session = match self.connector.open(descriptor, cancel) {
            Ok(session) => session,
            Err(err) => return failed("open", err),
        };
        self.sink.emit(EngineEvent::SessionOpened {
            server: descriptor.name.clone(),
            target: descriptor.target(),
        });

        let hits = match session.search(query, cancel) {
            Ok(hits) => hits,
            Err(err) => {
                session.close();
                return failed("search", err);
            },
        };
        self.sink.emit(EngineEvent::HitsFound {
            server: descriptor.name.clone(),
            hits,
        });

        let outcome = ServerOutcome::hits(descriptor.clone(), hits);
        if hits == 0 {
            session.close();
            return Finished {
                id,
                outcome,
                session: None,
                first_record: None,
            };
        }

        if !self.config.prefetch_first_record {
            return Finished {
                id,
                outcome,
                session: Some(session),
                first_record: None,
            };
        }
        match self.prefetch_first(&mut session, cancel) {
            Ok(record) => {
                self.sink.emit(EngineEvent::RecordFetched {
                    server: descriptor.name.clone(),
                    index: 1,
                });
                Finished {
                    id,
                    outcome,
                    session: Some(session),
                    first_record: Some(record),
                }
            },
            Err(EngineError::Cancelled) => {
                // The hit count stands; the half-read session is not kept.
                session.close();
                self.sink.emit(EngineEvent::Cancelled {
                    server: descriptor.name.clone(),
                });
                Finished {
                    id,
                    outcome,
                    session: None,
                    first_record: None,
                }
            },
            Err(err) => {
                self.sink.emit(EngineEvent::FetchFailed {
                    server: descriptor.name.clone(),
                    index: 1,
                    kind: err.kind(),
                    message: err.to_string(),
                });
                Finished {
                    id,
                    outcome,
                    session: Some(session),
                    first_record: None,
                }
            },
        }
    }

    fn prefetch_first(
        &self,
        session: &mut C::Session,
        cancel: &CancelToken,
    ) -> Result<StructuredRecord> {
        session
            .fetch_record_cancellable(1, cancel)
            .and_then(|raw| self.parser.parse(&raw))
    }

    fn report_failure(&self, descriptor: &ServerDescriptor, operation: &str, err: &EngineError) {
        let event = if matches!(err, EngineError::Cancelled) {
            EngineEvent::Cancelled {
                server: descriptor.name.clone(),
            }
        } else {
            EngineEvent::SessionFailed {
                server: descriptor.name.clone(),
                operation: operation.to_string(),
                kind: err.kind(),
                message: err.to_string(),
            }
        };
        self.sink.emit(event);
    }
}
