#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # marcsearch: concurrent catalog search with lazy MARC retrieval
//!
//! The engine queries many Z39.50 catalog servers at once through an external
//! protocol client (`yaz-client`), collects hit counts per server and lets a
//! caller page through each server's results one record at a time. Records
//! are fetched only when first requested and are parsed into
//! [`StructuredRecord`]s that keep tags 010–899.
//!
//! ## Quick Start
//!
//! ```no_run
//! use marcsearch::{
//!     CancelToken, EngineConfig, Location, QueryDispatcher, SearchQuery, ServerRegistry,
//!     YazConnector,
//! };
//! use marcsearch::events::LogSink;
//! use std::collections::HashSet;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ServerRegistry::load_file("servers.json", &LogSink)?;
//! let servers = registry.select(&HashSet::from([Location::Usa]));
//!
//! let config = EngineConfig::default();
//! let dispatcher = QueryDispatcher::new(YazConnector::new(config.session.clone()), config);
//! let query = SearchQuery::isbn("978-0-7432-7356-5")?;
//!
//! let run = dispatcher.run(&query, &servers, |done, total| {
//!     println!("{done}/{total} servers finished");
//! }, &CancelToken::new());
//!
//! for outcome in &run.results().with_hits {
//!     println!("{}", outcome.display_line());
//! }
//! if let Some(id) = run.cache.session_ids().first() {
//!     let record = run.cache.get(*id, 1)?;
//!     println!("{}", record.to_display_string());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`registry`]: Server descriptors, location filtering and query order
//! - [`query`]: Search queries and their client commands
//! - [`session`]: Stateful protocol sessions and connectors
//! - [`transport`]: Line-oriented exchange with the client process
//! - [`protocol`]: Classification of client responses
//! - [`marc_parser`]: Raw record dump to [`StructuredRecord`]
//! - [`dispatcher`]: Concurrent fan-out with progress and cancellation
//! - [`record_cache`]: Lazy per-session record retrieval
//! - [`aggregator`]: Grouping of per-server outcomes
//! - [`writer`]: ISO 2709 export
//! - [`events`]: Engine events and sinks
//! - [`config`]: Engine and session settings
//! - [`error`]: Error types

pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod leader;
pub mod marc_parser;
pub mod protocol;
pub mod query;
pub mod record;
pub mod record_cache;
pub mod registry;
pub mod session;
pub mod transport;
pub mod writer;

pub use aggregator::{aggregate, ResultSet, ServerOutcome};
pub use cancel::CancelToken;
pub use config::{EngineConfig, SessionConfig};
pub use dispatcher::{QueryDispatcher, SearchRun};
pub use error::{EngineError, ErrorKind, Result};
pub use events::{EngineEvent, EventSink};
pub use leader::Leader;
pub use marc_parser::MarcParser;
pub use query::{IsbnValidator, SearchQuery};
pub use record::{Field, StructuredRecord, Subfield};
pub use record_cache::{RecordCache, SessionId};
pub use registry::{Location, PriorityServer, ServerDescriptor, ServerRegistry};
pub use session::{ClientSession, Connector, ProtocolSession, SessionPhase, SessionState, YazConnector};
pub use writer::{export_record, suggested_filename, MarcWriter};
