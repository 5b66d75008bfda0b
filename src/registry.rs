//! Server list loading, location filtering and query ordering.
//!
//! The server list is a JSON array of objects:
//!
//! ```json
//! [
//!   {"name": "Library of Congress", "host": "lx2.loc.gov", "port": 210,
//!    "database": "LCDB", "location": "USA"}
//! ]
//! ```
//!
//! Every key is required. A malformed entry is skipped with a warning; the
//! load fails only when no usable entry remains.

use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Geographic grouping of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    /// Servers in the United States
    #[serde(rename = "USA")]
    Usa,
    /// Servers elsewhere
    Worldwide,
}

impl Location {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "USA" => Some(Location::Usa),
            "Worldwide" => Some(Location::Worldwide),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Usa => write!(f, "USA"),
            Location::Worldwide => write!(f, "Worldwide"),
        }
    }
}

/// One catalog server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Display name
    pub name: String,
    /// Host name
    pub host: String,
    /// TCP port (1-65535)
    pub port: u16,
    /// Database name
    pub database: String,
    /// Location tag used for filtering
    pub location: Location,
}

impl ServerDescriptor {
    /// Client address, `host:port/database`.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }

    /// `name (host:port/database)`, as shown in result lists.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} ({})", self.name, self.target())
    }
}

/// Identity of the server that is always dispatched first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityServer {
    /// Name matched exactly
    pub name: String,
    /// Host matched case-insensitively
    pub host: String,
}

impl Default for PriorityServer {
    fn default() -> Self {
        PriorityServer {
            name: "Library of Congress".to_string(),
            host: "lx2.loc.gov".to_string(),
        }
    }
}

impl PriorityServer {
    /// Whether a descriptor is this server.
    #[must_use]
    pub fn matches(&self, descriptor: &ServerDescriptor) -> bool {
        descriptor.name == self.name || descriptor.host.eq_ignore_ascii_case(&self.host)
    }
}

/// The loaded server list.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: Vec<ServerDescriptor>,
    priority: PriorityServer,
}

impl ServerRegistry {
    /// Build a registry from already-validated descriptors.
    #[must_use]
    pub fn from_servers(servers: Vec<ServerDescriptor>) -> Self {
        ServerRegistry {
            servers,
            priority: PriorityServer::default(),
        }
    }

    /// Load descriptors from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Json`] if the text is not a JSON array and
    /// [`EngineError::Config`] if no entry is usable.
    pub fn load(source: &str, sink: &dyn EventSink) -> Result<Self> {
        let entries: Vec<Value> = serde_json::from_str(source)?;
        Ok(Self::from_servers(validate_entries(&entries, sink)?))
    }

    /// Load descriptors from a reader.
    ///
    /// # Errors
    ///
    /// See [`ServerRegistry::load`].
    pub fn load_reader<R: Read>(reader: R, sink: &dyn EventSink) -> Result<Self> {
        let entries: Vec<Value> = serde_json::from_reader(reader)?;
        Ok(Self::from_servers(validate_entries(&entries, sink)?))
    }

    /// Load descriptors from a JSON file such as `servers.json`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if the file cannot be opened, otherwise see
    /// [`ServerRegistry::load`].
    pub fn load_file(path: impl AsRef<Path>, sink: &dyn EventSink) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::load_reader(std::io::BufReader::new(file), sink)
    }

    /// Replace the priority server identity.
    #[must_use]
    pub fn with_priority(mut self, priority: PriorityServer) -> Self {
        self.priority = priority;
        self
    }

    /// All descriptors in source order.
    #[must_use]
    pub fn servers(&self) -> &[ServerDescriptor] {
        &self.servers
    }

    /// Filter by location and order for dispatch.
    #[must_use]
    pub fn select(&self, locations: &HashSet<Location>) -> Vec<ServerDescriptor> {
        order_with(filter(&self.servers, locations), &self.priority)
    }
}

/// Keep descriptors whose location is selected, in source order.
///
/// An empty selection yields an empty list.
#[must_use]
pub fn filter(all: &[ServerDescriptor], locations: &HashSet<Location>) -> Vec<ServerDescriptor> {
    all.iter()
        .filter(|d| locations.contains(&d.location))
        .cloned()
        .collect()
}

/// Move the default priority server to the front.
#[must_use]
pub fn order(filtered: Vec<ServerDescriptor>) -> Vec<ServerDescriptor> {
    order_with(filtered, &PriorityServer::default())
}

/// Move the first descriptor matching `priority` to the front; every other
/// descriptor keeps its relative order.
#[must_use]
pub fn order_with(
    mut filtered: Vec<ServerDescriptor>,
    priority: &PriorityServer,
) -> Vec<ServerDescriptor> {
    if let Some(pos) = filtered.iter().position(|d| priority.matches(d)) {
        let first = filtered.remove(pos);
        filtered.insert(0, first);
    }
    filtered
}

fn validate_entries(entries: &[Value], sink: &dyn EventSink) -> Result<Vec<ServerDescriptor>> {
    let mut servers = Vec::with_capacity(entries.len());
    let mut last_error = None;
    let mut seen = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        match descriptor_from_value(index, entry) {
            Ok(descriptor) => {
                let key = (
                    descriptor.host.clone(),
                    descriptor.port,
                    descriptor.database.clone(),
                );
                if !seen.insert(key) {
                    log::debug!("Duplicate server target {}", descriptor.target());
                }
                servers.push(descriptor);
            },
            Err(err) => {
                let message = format!("Skipping server entry: {err}");
                log::warn!("{message}");
                sink.emit(EngineEvent::ConfigWarning { message });
                last_error = Some(err);
            },
        }
    }

    if servers.is_empty() {
        return Err(last_error.unwrap_or_else(|| EngineError::Config {
            entry: "-".to_string(),
            message: "server list is empty".to_string(),
        }));
    }
    log::info!("Loaded {} servers", servers.len());
    Ok(servers)
}

fn descriptor_from_value(index: usize, entry: &Value) -> Result<ServerDescriptor> {
    let label = match entry.get("name").and_then(Value::as_str) {
        Some(name) => format!("#{index} ({name})"),
        None => format!("#{index}"),
    };
    let config_error = |message: String| EngineError::Config {
        entry: label.clone(),
        message,
    };

    let Some(object) = entry.as_object() else {
        return Err(config_error("entry is not an object".to_string()));
    };
    let string_key = |key: &str| -> Result<String> {
        match object.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
            Some(_) => Err(config_error(format!("'{key}' must be a non-empty string"))),
            None => Err(config_error(format!("missing key '{key}'"))),
        }
    };

    let name = string_key("name")?;
    let host = string_key("host")?;
    let database = string_key("database")?;
    let port = match object.get("port") {
        Some(value) => value
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p > 0)
            .ok_or_else(|| config_error(format!("invalid port {value}")))?,
        None => return Err(config_error("missing key 'port'".to_string())),
    };
    let location_text = string_key("location")?;
    let location = Location::parse(&location_text)
        .ok_or_else(|| config_error(format!("unknown location '{location_text}'")))?;

    Ok(ServerDescriptor {
        name,
        host,
        port,
        database,
        location,
    })
}
