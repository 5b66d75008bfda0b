//! Stateful protocol sessions.
//!
//! A session is one connection to one server for one search invocation. Its
//! lifecycle is tracked by [`SessionState`]:
//!
//! ```text
//! Idle -> Connected -> Searching -> Ready <-> Fetching
//!            |             |          |
//!            +-------------+----------+--> Failed
//! any state --> Closed
//! ```
//!
//! [`ProtocolSession`] is the capability the dispatcher and record cache work
//! against. [`ClientSession`] implements it over any [`Transport`] using the
//! client's command language; [`YazConnector`] opens `ClientSession`s backed by
//! a real `yaz-client` process.

use crate::cancel::CancelToken;
use crate::config::SessionConfig;
use crate::error::{EngineError, ErrorKind, Result};
use crate::protocol;
use crate::query::{show_command, SearchQuery};
use crate::registry::ServerDescriptor;
use crate::transport::{Response, Transport, TransportError, YazTransport};
use std::fmt;
use std::process::{Command, Stdio};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Created, not yet connected
    Idle,
    /// Connection banner accepted
    Connected,
    /// Search command in flight
    Searching,
    /// Hit count known; records may be fetched
    Ready,
    /// A record fetch is in flight
    Fetching(usize),
    /// A fatal error occurred; only close is valid
    Failed,
    /// Terminal
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Fetching(index) => write!(f, "fetching record {index}"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// State owned by one session.
#[derive(Debug, Clone)]
pub struct SessionState {
    descriptor: ServerDescriptor,
    phase: SessionPhase,
    hits: Option<usize>,
    cursor: Option<usize>,
    error: Option<(ErrorKind, String)>,
}

impl SessionState {
    /// Fresh state for a session against `descriptor`.
    #[must_use]
    pub fn new(descriptor: ServerDescriptor) -> Self {
        SessionState {
            descriptor,
            phase: SessionPhase::Idle,
            hits: None,
            cursor: None,
            error: None,
        }
    }

    /// Server this session talks to.
    #[must_use]
    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Last known hit count, `None` until a search succeeds.
    #[must_use]
    pub fn hits(&self) -> Option<usize> {
        self.hits
    }

    /// Index of the last record fetched.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Terminal error, if the session failed.
    #[must_use]
    pub fn error(&self) -> Option<(ErrorKind, &str)> {
        self.error.as_ref().map(|(kind, msg)| (*kind, msg.as_str()))
    }

    /// Whether the session can still be used.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !matches!(self.phase, SessionPhase::Failed | SessionPhase::Closed)
    }

    fn invalid(&self, operation: &str) -> EngineError {
        EngineError::protocol(
            &self.descriptor.name,
            format!("cannot {operation} while session is {}", self.phase),
        )
    }

    /// Idle -> Connected.
    ///
    /// # Errors
    ///
    /// Fails if the session is not idle.
    pub fn connected(&mut self) -> Result<()> {
        if self.phase != SessionPhase::Idle {
            return Err(self.invalid("connect"));
        }
        self.phase = SessionPhase::Connected;
        Ok(())
    }

    /// Connected or Ready -> Searching. Clears the previous hit count.
    ///
    /// # Errors
    ///
    /// Fails from any other phase.
    pub fn begin_search(&mut self) -> Result<()> {
        if !matches!(self.phase, SessionPhase::Connected | SessionPhase::Ready) {
            return Err(self.invalid("search"));
        }
        self.phase = SessionPhase::Searching;
        self.hits = None;
        self.cursor = None;
        Ok(())
    }

    /// Searching -> Ready with a hit count.
    pub fn search_succeeded(&mut self, hits: usize) {
        self.phase = SessionPhase::Ready;
        self.hits = Some(hits);
    }

    /// Check `index` against the hit count without changing phase.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Bounds`] for index 0 or an index past the hit
    /// count, and a protocol error if no search has completed.
    pub fn check_index(&self, index: usize) -> Result<()> {
        let Some(hits) = self.hits else {
            return Err(self.invalid("fetch"));
        };
        if index == 0 || index > hits {
            return Err(EngineError::Bounds { index, hits });
        }
        Ok(())
    }

    /// Ready -> Fetching(index).
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::Bounds`] or a protocol error, leaving the
    /// phase unchanged.
    pub fn begin_fetch(&mut self, index: usize) -> Result<()> {
        if self.phase != SessionPhase::Ready {
            return Err(self.invalid("fetch"));
        }
        self.check_index(index)?;
        self.phase = SessionPhase::Fetching(index);
        Ok(())
    }

    /// Fetching -> Ready, advancing the cursor.
    pub fn fetch_succeeded(&mut self, index: usize) {
        self.phase = SessionPhase::Ready;
        self.cursor = Some(index);
    }

    /// Fetching -> Ready for fetch-local errors, Failed otherwise.
    pub fn fetch_failed(&mut self, err: &EngineError) {
        match err.kind() {
            ErrorKind::Bounds | ErrorKind::Parse => self.phase = SessionPhase::Ready,
            _ => self.fail(err),
        }
    }

    /// Any live phase -> Failed.
    pub fn fail(&mut self, err: &EngineError) {
        if self.phase != SessionPhase::Closed {
            self.phase = SessionPhase::Failed;
            self.error = Some((err.kind(), err.to_string()));
        }
    }

    /// Any phase -> Closed.
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }
}

/// One stateful connection to one server.
///
/// Operations on a session are strictly sequential; callers that share a
/// session across threads must serialize access.
pub trait ProtocolSession: Send {
    /// The session's state.
    fn state(&self) -> &SessionState;

    /// Issue a search and return the hit count.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for rejected or unrecognized responses and
    /// [`EngineError::Cancelled`] if `cancel` fires first.
    fn search(&mut self, query: &SearchQuery, cancel: &CancelToken) -> Result<usize>;

    /// Fetch the raw text of record `index` (1-based).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Bounds`] for an index outside `1..=hits`.
    fn fetch_record(&mut self, index: usize) -> Result<String>;

    /// Fetch record `index`, giving up when `cancel` fires.
    ///
    /// Sessions that cannot interrupt a fetch fall back to
    /// [`ProtocolSession::fetch_record`].
    ///
    /// # Errors
    ///
    /// As [`ProtocolSession::fetch_record`], plus [`EngineError::Cancelled`]
    /// if `cancel` fires first; the session should then be closed.
    fn fetch_record_cancellable(&mut self, index: usize, cancel: &CancelToken) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.fetch_record(index)
    }

    /// Release the connection. Idempotent.
    fn close(&mut self);

    /// Server this session talks to.
    fn descriptor(&self) -> &ServerDescriptor {
        self.state().descriptor()
    }

    /// Last known hit count.
    fn hit_count(&self) -> Option<usize> {
        self.state().hits()
    }
}

/// Opens sessions.
pub trait Connector: Send + Sync {
    /// Session type produced.
    type Session: ProtocolSession;

    /// Connect to `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Connection`] if the client cannot be started or
    /// the target refuses, and [`EngineError::Cancelled`] if `cancel` fires.
    fn open(&self, descriptor: &ServerDescriptor, cancel: &CancelToken) -> Result<Self::Session>;
}

/// A session speaking the client's command language over a [`Transport`].
#[derive(Debug)]
pub struct ClientSession<T: Transport> {
    state: SessionState,
    transport: T,
}

impl<T: Transport> ClientSession<T> {
    /// Read the connection banner from a freshly started client.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Connection`] on refusal, timeout or early exit,
    /// and [`EngineError::Cancelled`] if `cancel` fires. The transport is
    /// terminated on every error path.
    pub fn connect(
        descriptor: ServerDescriptor,
        mut transport: T,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let mut state = SessionState::new(descriptor);
        let server = state.descriptor().name.clone();
        let banner = transport
            .read_response(Some(cancel))
            .map_err(|err| match err {
                TransportError::Cancelled => EngineError::Cancelled,
                other => EngineError::connection(&server, other.to_string()),
            })
            .and_then(|response| protocol::check_connect(&server, &response.lines));
        if let Err(err) = banner {
            transport.terminate();
            return Err(err);
        }
        state.connected()?;
        Ok(ClientSession { state, transport })
    }

    fn server(&self) -> String {
        self.state.descriptor().name.clone()
    }

    fn transport_error(&self, operation: &str, err: TransportError) -> EngineError {
        match err {
            TransportError::Cancelled => EngineError::Cancelled,
            other => EngineError::protocol(&self.server(), format!("{operation}: {other}")),
        }
    }

    fn exchange(
        &mut self,
        operation: &str,
        command: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<Response> {
        self.transport
            .exchange(command, cancel)
            .map_err(|err| self.transport_error(operation, err))
    }

    fn fetch(&mut self, index: usize, cancel: Option<&CancelToken>) -> Result<String> {
        self.state.begin_fetch(index)?;
        let hits = self.state.hits().unwrap_or(0);
        let result = self
            .exchange("show", &show_command(index), cancel)
            .and_then(|response| {
                protocol::check_present_response(&self.server(), index, hits, &response.lines)
            });
        match result {
            Ok(raw) => {
                self.state.fetch_succeeded(index);
                Ok(raw)
            },
            Err(err) => {
                self.state.fetch_failed(&err);
                if matches!(err, EngineError::Cancelled) {
                    self.close();
                }
                Err(err)
            },
        }
    }
}

impl<T: Transport> ProtocolSession for ClientSession<T> {
    fn state(&self) -> &SessionState {
        &self.state
    }

    fn search(&mut self, query: &SearchQuery, cancel: &CancelToken) -> Result<usize> {
        self.state.begin_search()?;
        let result = self
            .exchange("search", &query.find_command(), Some(cancel))
            .and_then(|response| protocol::parse_search_response(&self.server(), &response.lines));
        match result {
            Ok(hits) => {
                self.state.search_succeeded(hits);
                Ok(hits)
            },
            Err(err) => {
                self.state.fail(&err);
                if matches!(err, EngineError::Cancelled) {
                    self.close();
                }
                Err(err)
            },
        }
    }

    fn fetch_record(&mut self, index: usize) -> Result<String> {
        self.fetch(index, None)
    }

    fn fetch_record_cancellable(&mut self, index: usize, cancel: &CancelToken) -> Result<String> {
        self.fetch(index, Some(cancel))
    }

    fn close(&mut self) {
        if self.state.phase() != SessionPhase::Closed {
            self.transport.terminate();
            self.state.close();
        }
    }
}

impl<T: Transport> Drop for ClientSession<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens [`ClientSession`]s backed by a `yaz-client` process.
#[derive(Debug, Clone, Default)]
pub struct YazConnector {
    config: SessionConfig,
}

impl YazConnector {
    /// Create a connector with the given session settings.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        YazConnector { config }
    }

    /// Whether the configured client program can be run.
    #[must_use]
    pub fn is_client_installed(&self) -> bool {
        Command::new(&self.config.client_program)
            .arg("-V")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }
}

impl Connector for YazConnector {
    type Session = ClientSession<YazTransport>;

    fn open(&self, descriptor: &ServerDescriptor, cancel: &CancelToken) -> Result<Self::Session> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let target = descriptor.target();
        log::debug!("Connecting to {}: {} {target}", descriptor.name, self.config.client_program);
        let transport = YazTransport::spawn(
            &self.config.client_program,
            &target,
            self.config.response_timeout(),
        )
        .map_err(|err| {
            EngineError::connection(
                &descriptor.name,
                format!("failed to start {}: {err}", self.config.client_program),
            )
        })?;
        ClientSession::connect(descriptor.clone(), transport, cancel)
    }
}
