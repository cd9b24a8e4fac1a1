//! Workspace discovery — locates a running Power BI Desktop instance by
//! scanning its per-session workspace folders for the port marker file.
//!
//! Power BI Desktop creates one workspace folder per open report under the
//! user's local app data, each containing `msmdsrv.port.txt` with the
//! dynamically assigned Analysis Services port as decimal text. "Not
//! running" is an expected steady state, so every failure here degrades to
//! `None` — a missing base directory, an unreadable marker, and a marker
//! that is not a port number are all just "not found".
//!
//! Known limitation: when several instances are open, the first marker in
//! directory-listing order wins. The order is OS-dependent and no recency
//! tie-break is attempted.

use std::path::{Path, PathBuf};

use crate::desktop::ConnectionEndpoint;

/// Fixed marker file name inside each workspace folder.
pub const PORT_FILE_NAME: &str = "msmdsrv.port.txt";

/// Default workspace base directory for the current user.
pub fn default_workspaces_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| {
        d.join("Microsoft")
            .join("Power BI Desktop")
            .join("AnalysisServicesWorkspaces")
    })
}

/// Scan `workspaces_dir` for a live instance and return its endpoint.
///
/// Returns the endpoint of the first workspace folder whose marker file
/// parses as a port, or `None` when no instance is reachable.
pub fn discover(workspaces_dir: &Path) -> Option<ConnectionEndpoint> {
    let entries = match std::fs::read_dir(workspaces_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(
                dir = %workspaces_dir.display(),
                error = %e,
                "workspace base directory not readable"
            );
            return None;
        }
    };

    for entry in entries.flatten() {
        let marker = entry.path().join(PORT_FILE_NAME);
        let raw = match std::fs::read_to_string(&marker) {
            Ok(raw) => raw,
            // No marker here — not a live workspace folder
            Err(_) => continue,
        };
        match raw.trim().parse::<u16>() {
            Ok(port) => {
                let endpoint = ConnectionEndpoint::local(port);
                tracing::info!(
                    workspace = %entry.path().display(),
                    endpoint = %endpoint,
                    "found running Power BI Desktop instance"
                );
                return Some(endpoint);
            }
            Err(_) => {
                tracing::warn!(
                    marker = %marker.display(),
                    content = %raw.trim(),
                    "port marker is not a valid port number, skipping workspace"
                );
                continue;
            }
        }
    }

    tracing::debug!(
        dir = %workspaces_dir.display(),
        "no running Power BI Desktop instance found"
    );
    None
}
