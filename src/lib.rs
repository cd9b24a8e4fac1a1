//! modelbridge — local assistant backend for Power BI Desktop.
//! Discovers the running desktop instance's tabular model via an external
//! helper process and relays natural-language questions about it to the
//! OpenAI chat-completions API, with the API key kept in a small on-disk
//! config file.

pub mod assistant;
pub mod config;
pub mod credentials;
pub mod desktop;
pub mod error;
pub mod server;

pub use assistant::{Assistant, build_context, build_prompt};
pub use config::{BridgeConfig, DesktopConfig, OpenAiConfig, ServerConfig};
pub use credentials::CredentialStore;
pub use desktop::{ConnectionEndpoint, ModelReader, TableDescriptor, discover};
pub use error::{BridgeError, Result};
pub use server::{AppState, router, run_server};
