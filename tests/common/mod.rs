//! Common test helpers shared across the integration test suite.
//!
//! Provides sample server descriptors, scripted client transcripts, a fake
//! [`Connector`] whose sessions follow a per-server script, and an event sink
//! that records everything it receives.

#![allow(dead_code)]

use crossbeam_channel::select;
use marcsearch::cancel::CancelToken;
use marcsearch::error::{EngineError, Result};
use marcsearch::events::{EngineEvent, EventSink};
use marcsearch::query::SearchQuery;
use marcsearch::registry::{Location, ServerDescriptor};
use marcsearch::session::{Connector, ProtocolSession, SessionPhase, SessionState};
use marcsearch::transport::{Response, Transport, TransportError, TransportResult};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Creates a descriptor with a host derived from the name.
pub fn server(name: &str, location: Location) -> ServerDescriptor {
    ServerDescriptor {
        name: name.to_string(),
        host: format!("z3950.{}.example", name.to_lowercase().replace(' ', "")),
        port: 210,
        database: "INNOPAC".to_string(),
        location,
    }
}

/// The Library of Congress descriptor, as found in real server lists.
pub fn loc() -> ServerDescriptor {
    ServerDescriptor {
        name: "Library of Congress".to_string(),
        host: "lx2.loc.gov".to_string(),
        port: 210,
        database: "LCDB".to_string(),
        location: Location::Usa,
    }
}

/// A JSON server list with the Library of Congress in the middle.
pub const SERVER_LIST: &str = r#"[
  {"name": "Yale University", "host": "orbis.library.yale.edu", "port": 7090, "database": "Voyager", "location": "USA"},
  {"name": "British Library", "host": "z3950cat.bl.uk", "port": 9909, "database": "BLAC", "location": "Worldwide"},
  {"name": "Library of Congress", "host": "lx2.loc.gov", "port": 210, "database": "LCDB", "location": "USA"},
  {"name": "University of Toronto", "host": "sirsi.library.utoronto.ca", "port": 2200, "database": "UNICORN", "location": "Worldwide"}
]"#;

/// Raw dump of record `index` as printed by the client's `show` command.
pub fn record_dump(index: usize) -> String {
    format!(
        "01142cam  2200301 a 4500\n\
         001 {index:08}\n\
         008 010101s2001    nyu           000 1 eng  \n\
         020    $a 0743273567\n\
         100 1  $a Fitzgerald, F. Scott\n\
         245 14 $a The great Gatsby, part {index} / $c F. Scott Fitzgerald.\n\
         260    $a New York : $b Scribner, $c 2004.\n\
         949    $a LOCAL COPY {index}"
    )
}

/// Turns a multi-line transcript into response lines.
pub fn lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

/// Connection banner printed by the client on startup.
pub fn banner() -> Response {
    Response {
        lines: lines("Connecting...OK.\nSent initrequest.\nConnection accepted by v3 target.\nID     : 34\nName   : Voyager LMS - Z39.50 Server"),
        closed: false,
    }
}

/// Search response reporting `hits` hits.
pub fn search_response(hits: usize) -> Response {
    Response {
        lines: lines(&format!(
            "Sent searchRequest.\nReceived SearchResponse.\nSearch was a success.\nNumber of hits: {hits}, setno 1\nrecords returned: 0\nElapsed: 0.214325"
        )),
        closed: false,
    }
}

/// `show` response carrying record `index`.
pub fn present_response(index: usize) -> Response {
    let mut lines = lines("Sent presentRequest (1+1).\nRecords: 1\n[LCDB]Record type: USmarc");
    lines.extend(record_dump(index).lines().map(str::to_string));
    lines.push("nextResultSetPosition = 2".to_string());
    lines.push("Elapsed: 0.083612".to_string());
    Response {
        lines,
        closed: false,
    }
}

/// A transport replaying canned responses and recording the commands sent.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: VecDeque<Response>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub terminated: Arc<AtomicBool>,
    block_on_empty: bool,
}

impl ScriptedTransport {
    /// A transport answering with `responses` in order.
    pub fn new(responses: Vec<Response>) -> Self {
        ScriptedTransport {
            responses: responses.into(),
            ..Self::default()
        }
    }

    /// Once the script runs out, wait for cancellation instead of reporting
    /// a closed client.
    pub fn blocking(mut self) -> Self {
        self.block_on_empty = true;
        self
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, command: &str) -> TransportResult<()> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(command.to_string());
        Ok(())
    }

    fn read_response(&mut self, cancel: Option<&CancelToken>) -> TransportResult<Response> {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            self.terminate();
            return Err(TransportError::Cancelled);
        }
        if let Some(response) = self.responses.pop_front() {
            return Ok(response);
        }
        match cancel {
            Some(token) if self.block_on_empty => {
                let _ = token.receiver().recv();
                self.terminate();
                Err(TransportError::Cancelled)
            },
            _ => Err(TransportError::Closed),
        }
    }

    fn terminate(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

/// What a fake server does when searched.
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer immediately with this many hits
    Hits(usize),
    /// Answer with this many hits after a delay, unless cancelled first
    Slow(Duration, usize),
    /// Refuse the connection
    Refuse,
    /// Reject the search
    Reject,
    /// Never answer; only cancellation ends the search
    Hang,
}

/// Counters shared between a [`FakeConnector`] and its sessions.
#[derive(Debug, Default)]
pub struct Counters {
    pub opened: Mutex<Vec<String>>,
    pub fetches: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Counters {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

/// Connector producing [`FakeSession`]s scripted per server name.
#[derive(Debug, Default)]
pub struct FakeConnector {
    scripts: HashMap<String, Script>,
    fetch_delay: Duration,
    pub counters: Arc<Counters>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behaviour of the server called `name`.
    pub fn script(mut self, name: &str, script: Script) -> Self {
        self.scripts.insert(name.to_string(), script);
        self
    }

    /// Make every record fetch take `delay`.
    pub fn fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    fn open(&self, descriptor: &ServerDescriptor, cancel: &CancelToken) -> Result<FakeSession> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.counters
            .opened
            .lock()
            .unwrap()
            .push(descriptor.name.clone());
        let script = self
            .scripts
            .get(&descriptor.name)
            .cloned()
            .unwrap_or(Script::Hits(1));
        if matches!(script, Script::Refuse) {
            return Err(EngineError::Connection {
                server: descriptor.name.clone(),
                message: "Connection refused".to_string(),
            });
        }
        let mut state = SessionState::new(descriptor.clone());
        state.connected()?;
        Ok(FakeSession {
            state,
            script,
            fetch_delay: self.fetch_delay,
            counters: Arc::clone(&self.counters),
        })
    }
}

/// A session following a [`Script`].
#[derive(Debug)]
pub struct FakeSession {
    state: SessionState,
    script: Script,
    fetch_delay: Duration,
    counters: Arc<Counters>,
}

impl FakeSession {
    /// A standalone session that already found `hits` records.
    pub fn ready(descriptor: ServerDescriptor, hits: usize, counters: Arc<Counters>) -> Self {
        let mut state = SessionState::new(descriptor);
        state.connected().unwrap();
        state.begin_search().unwrap();
        state.search_succeeded(hits);
        FakeSession {
            state,
            script: Script::Hits(hits),
            fetch_delay: Duration::ZERO,
            counters,
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }
}

impl ProtocolSession for FakeSession {
    fn state(&self) -> &SessionState {
        &self.state
    }

    fn search(&mut self, _query: &SearchQuery, cancel: &CancelToken) -> Result<usize> {
        self.state.begin_search()?;
        let name = self.state.descriptor().name.clone();
        let result = match self.script.clone() {
            Script::Hits(hits) => Ok(hits),
            Script::Slow(delay, hits) => select! {
                recv(cancel.receiver()) -> _ => Err(EngineError::Cancelled),
                default(delay) => Ok(hits),
            },
            Script::Hang => {
                let _ = cancel.receiver().recv();
                Err(EngineError::Cancelled)
            },
            Script::Reject | Script::Refuse => Err(EngineError::Protocol {
                server: name,
                message: "Search was a bloomin' failure.".to_string(),
            }),
        };
        match result {
            Ok(hits) => {
                self.state.search_succeeded(hits);
                Ok(hits)
            },
            Err(err) => {
                self.state.fail(&err);
                Err(err)
            },
        }
    }

    fn fetch_record(&mut self, index: usize) -> Result<String> {
        self.state.begin_fetch(index)?;
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            thread::sleep(self.fetch_delay);
        }
        self.state.fetch_succeeded(index);
        Ok(record_dump(index))
    }

    fn fetch_record_cancellable(&mut self, index: usize, cancel: &CancelToken) -> Result<String> {
        if self.fetch_delay.is_zero() {
            return self.fetch_record(index);
        }
        self.state.begin_fetch(index)?;
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        select! {
            recv(cancel.receiver()) -> _ => {
                let err = EngineError::Cancelled;
                self.state.fetch_failed(&err);
                Err(err)
            },
            default(self.fetch_delay) => {
                self.state.fetch_succeeded(index);
                Ok(record_dump(index))
            },
        }
    }

    fn close(&mut self) {
        if self.state.phase() != SessionPhase::Closed {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.state.close();
    }
}

/// Event sink that keeps every event.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}
