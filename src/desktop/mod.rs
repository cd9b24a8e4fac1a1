//! Power BI Desktop integration — workspace discovery and model reading.
//!
//! Discovery locates the dynamically assigned Analysis Services port of a
//! running desktop instance; the reader invokes the external PBIXReader
//! helper against that endpoint and parses its schema output. Nothing here
//! is cached: every request re-discovers and re-reads, so a closed or
//! reopened report is simply picked up on the next call.

pub mod discovery;
pub mod reader;

pub use discovery::{PORT_FILE_NAME, default_workspaces_dir, discover};
pub use reader::ModelReader;

use serde::{Deserialize, Serialize};

/// A locally reachable Analysis Services instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEndpoint {
    pub host: String,
    pub port: u16,
}

impl ConnectionEndpoint {
    /// Endpoint on the loopback interface, as Power BI Desktop binds it.
    pub fn local(port: u16) -> Self {
        Self {
            host: "localhost".to_string(),
            port,
        }
    }

    /// Connection address in `host:port` form, as passed to the helper.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for ConnectionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One table of the tabular model as reported by the helper.
///
/// Field names stay PascalCase on the wire (`Name`, `Columns`, `Measures`)
/// so `/get-model` responses and `/ask` request bodies round-trip unchanged
/// through the frontend. Contents are pass-through — nothing beyond JSON
/// well-formedness is enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Columns", default)]
    pub columns: Vec<String>,
    #[serde(rename = "Measures", default, skip_serializing_if = "Option::is_none")]
    pub measures: Option<Vec<String>>,
}
