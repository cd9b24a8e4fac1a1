//! Model reader — obtains the tabular schema from a running instance by
//! invoking the external PBIXReader helper and parsing its JSON output.
//!
//! The helper is an opaque pre-built assembly run as
//! `<launcher> <launcher-args...> <helper> <host:port> <database>`, emitting
//! a JSON array of table objects on stdout. Invocation is bounded by a
//! timeout that kills the child process on expiry — a stuck helper must not
//! hang the request that triggered it.
//!
//! `fetch_model` never fails: a missing instance, a missing helper, a
//! timeout, a non-zero exit, and malformed output all collapse to an empty
//! table list at this boundary. The distinction is kept in the logs.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::DesktopConfig;
use crate::desktop::{ConnectionEndpoint, TableDescriptor, default_workspaces_dir, discover};
use crate::error::BridgeError;

/// Cap on the stderr excerpt carried in `HelperExit`.
const STDERR_EXCERPT_CHARS: usize = 500;

/// Built-in helper locations, tried after any configured paths: sibling
/// `pbix_reader` checkouts relative to the working directory, then relative
/// to the running executable.
fn builtin_helper_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("../pbix_reader/PBIXReader.dll"),
        PathBuf::from("./pbix_reader/PBIXReader.dll"),
    ];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join("../pbix_reader/PBIXReader.dll"));
            candidates.push(dir.join("pbix_reader/PBIXReader.dll"));
        }
    }
    candidates
}

/// Reads the tabular model of a running Power BI Desktop instance.
pub struct ModelReader {
    workspaces_dir: Option<PathBuf>,
    launcher: String,
    launcher_args: Vec<String>,
    helper_paths: Vec<PathBuf>,
    database: String,
    timeout: Duration,
}

impl ModelReader {
    /// Build a reader from the `[desktop]` config section.
    pub fn from_config(config: &DesktopConfig) -> Self {
        Self {
            workspaces_dir: config.workspaces_dir.clone(),
            launcher: config.launcher.clone(),
            launcher_args: config.launcher_args.clone(),
            helper_paths: config.helper_paths.clone(),
            database: config.database.clone(),
            timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }

    /// Fetch the model of the currently running instance.
    ///
    /// Degrades to an empty list on every failure — "no model available" is
    /// not distinguished from "fetch failed" for the caller, who is expected
    /// to let the user retry after starting the desktop application.
    pub async fn fetch_model(&self) -> Vec<TableDescriptor> {
        match self.try_fetch().await {
            Ok(tables) => {
                tracing::info!(tables = tables.len(), "model loaded from running instance");
                tables
            }
            Err(BridgeError::NoInstance) => {
                tracing::debug!("no running instance, returning empty model");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "model fetch failed, returning empty model");
                Vec::new()
            }
        }
    }

    /// Discovery → helper resolution → invocation, with the full error
    /// taxonomy. Discovery misses short-circuit before any helper lookup.
    async fn try_fetch(&self) -> crate::Result<Vec<TableDescriptor>> {
        let workspaces_dir = self
            .workspaces_dir
            .clone()
            .or_else(default_workspaces_dir)
            .ok_or(BridgeError::NoInstance)?;
        let endpoint = discover(&workspaces_dir).ok_or(BridgeError::NoInstance)?;
        let helper = self.resolve_helper().ok_or(BridgeError::HelperNotFound)?;
        self.run_helper(&helper, &endpoint).await
    }

    /// First existing candidate wins; configured paths take priority over
    /// the built-in locations.
    fn resolve_helper(&self) -> Option<PathBuf> {
        self.helper_paths
            .iter()
            .cloned()
            .chain(builtin_helper_candidates())
            .find(|candidate| candidate.exists())
    }

    async fn run_helper(
        &self,
        helper: &Path,
        endpoint: &ConnectionEndpoint,
    ) -> crate::Result<Vec<TableDescriptor>> {
        let start = Instant::now();

        let mut cmd = tokio::process::Command::new(&self.launcher);
        cmd.args(&self.launcher_args);
        cmd.arg(helper);
        cmd.arg(endpoint.address());
        cmd.arg(&self.database);
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::HelperSpawn(format!("failed to spawn '{}': {}", self.launcher, e))
        })?;

        // Take pipes before waiting so the child stays killable on timeout
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        // Drain stdout and stderr while waiting for the child to exit, raced
        // against the timeout. On timeout the process itself is killed, not
        // just the future.
        let output = tokio::select! {
            result = async {
                use tokio::io::AsyncReadExt;
                let mut stdout_bytes = Vec::new();
                let mut stderr_bytes = Vec::new();
                if let Some(mut out) = stdout_pipe {
                    let _ = out.read_to_end(&mut stdout_bytes).await;
                }
                if let Some(mut err) = stderr_pipe {
                    let _ = err.read_to_end(&mut stderr_bytes).await;
                }
                let status = child.wait().await.map_err(|e| {
                    BridgeError::HelperSpawn(format!("process wait error: {e}"))
                })?;
                Ok::<std::process::Output, BridgeError>(std::process::Output {
                    status,
                    stdout: stdout_bytes,
                    stderr: stderr_bytes,
                })
            } => result?,
            _ = tokio::time::sleep(self.timeout) => {
                let _ = child.kill().await;
                return Err(BridgeError::HelperTimeout(self.timeout.as_secs()));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        tracing::debug!(
            launcher = %self.launcher,
            helper = %helper.display(),
            endpoint = %endpoint,
            exit_code = %exit_code,
            duration_ms = %start.elapsed().as_millis(),
            "helper invocation finished"
        );

        if !output.status.success() {
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT_CHARS).collect();
            return Err(BridgeError::HelperExit(exit_code, excerpt));
        }

        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Err(BridgeError::HelperOutput(
                "helper produced no output".to_string(),
            ));
        }

        serde_json::from_str(stdout)
            .map_err(|e| BridgeError::HelperOutput(format!("invalid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::PORT_FILE_NAME;
    use tempfile::TempDir;

    /// Reader wired to a temp workspace dir and an `sh -c` stand-in for the
    /// dotnet launcher, so the invocation path runs without the real helper.
    fn reader_with(
        workspaces: &Path,
        helper: &Path,
        script: &str,
        timeout_secs: u64,
    ) -> ModelReader {
        ModelReader {
            workspaces_dir: Some(workspaces.to_path_buf()),
            launcher: "sh".to_string(),
            launcher_args: vec!["-c".to_string(), script.to_string()],
            helper_paths: vec![helper.to_path_buf()],
            database: "Model".to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn write_live_workspace(base: &Path, port: &str) {
        let workspace = base.join("ws");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join(PORT_FILE_NAME), port).unwrap();
    }

    fn touch_helper(dir: &TempDir) -> PathBuf {
        let helper = dir.path().join("PBIXReader.dll");
        std::fs::write(&helper, b"").unwrap();
        helper
    }

    #[tokio::test]
    async fn test_no_instance_short_circuits_before_helper() {
        let dir = TempDir::new().unwrap();
        let helper = touch_helper(&dir);
        let sentinel = dir.path().join("helper-ran");
        let workspaces = dir.path().join("empty-workspaces");
        std::fs::create_dir_all(&workspaces).unwrap();
        // Empty workspaces dir: the helper script would drop a sentinel file
        // if it ever ran
        let reader = reader_with(&workspaces, &helper, &format!("touch {}", sentinel.display()), 5);

        let model = reader.fetch_model().await;
        assert!(model.is_empty());
        assert!(!sentinel.exists(), "helper must not run without an instance");
    }

    #[tokio::test]
    async fn test_no_instance_error_variant() {
        let dir = TempDir::new().unwrap();
        let helper = touch_helper(&dir);
        let reader = reader_with(dir.path(), &helper, "true", 5);
        let result = reader.try_fetch().await;
        assert!(matches!(result, Err(BridgeError::NoInstance)));
    }

    #[tokio::test]
    async fn test_missing_helper_is_empty_model() {
        let dir = TempDir::new().unwrap();
        write_live_workspace(dir.path(), "12345");
        let reader = ModelReader {
            workspaces_dir: Some(dir.path().to_path_buf()),
            launcher: "sh".to_string(),
            launcher_args: vec![],
            helper_paths: vec![dir.path().join("nope/PBIXReader.dll")],
            database: "Model".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(matches!(
            reader.try_fetch().await,
            Err(BridgeError::HelperNotFound)
        ));
        assert!(reader.fetch_model().await.is_empty());
    }

    #[tokio::test]
    async fn test_valid_json_round_trips() {
        let dir = TempDir::new().unwrap();
        write_live_workspace(dir.path(), "12345");
        let helper = touch_helper(&dir);
        let reader = reader_with(
            dir.path(),
            &helper,
            r#"echo '[{"Name":"Sales","Columns":["Amount","Date"],"Measures":["Total"]}]'"#,
            5,
        );

        let model = reader.fetch_model().await;
        assert_eq!(model.len(), 1);
        assert_eq!(model[0].name, "Sales");
        assert_eq!(model[0].columns, vec!["Amount", "Date"]);
        assert_eq!(model[0].measures, Some(vec!["Total".to_string()]));
    }

    #[tokio::test]
    async fn test_malformed_output_is_empty_model() {
        let dir = TempDir::new().unwrap();
        write_live_workspace(dir.path(), "12345");
        let helper = touch_helper(&dir);
        let reader = reader_with(dir.path(), &helper, "echo not json", 5);
        assert!(reader.fetch_model().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_output_is_empty_model() {
        let dir = TempDir::new().unwrap();
        write_live_workspace(dir.path(), "12345");
        let helper = touch_helper(&dir);
        let reader = reader_with(dir.path(), &helper, "true", 5);
        assert!(matches!(
            reader.try_fetch().await,
            Err(BridgeError::HelperOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_empty_model() {
        let dir = TempDir::new().unwrap();
        write_live_workspace(dir.path(), "12345");
        let helper = touch_helper(&dir);
        let reader = reader_with(dir.path(), &helper, "echo oops >&2; exit 3", 5);
        match reader.try_fetch().await {
            Err(BridgeError::HelperExit(code, stderr)) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected HelperExit, got {other:?}"),
        }
        assert!(reader.fetch_model().await.is_empty());
    }

    #[tokio::test]
    async fn test_hung_helper_is_killed_within_timeout() {
        let dir = TempDir::new().unwrap();
        write_live_workspace(dir.path(), "12345");
        let helper = touch_helper(&dir);
        let reader = reader_with(dir.path(), &helper, "sleep 30", 1);

        let start = Instant::now();
        let model = reader.fetch_model().await;
        assert!(model.is_empty());
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "timeout must bound the fetch, took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_configured_helper_path_takes_priority() {
        let dir = TempDir::new().unwrap();
        let helper = touch_helper(&dir);
        let reader = reader_with(dir.path(), &helper, "true", 5);
        assert_eq!(reader.resolve_helper(), Some(helper));
    }
}
