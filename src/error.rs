//! Failure taxonomy for a single deployment attempt.
//!
//! Every variant is terminal: the orchestrator stops at the first error and
//! the binary exits with status 1.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeployError>;

#[derive(Error, Debug)]
pub enum DeployError {
    // Local input errors
    #[error("invalid environment variable '{0}', expected NAME=VALUE")]
    InvalidOverride(String),

    #[error("can't find stackfile {}", path.display())]
    StackFileMissing { path: PathBuf },

    #[error("failed to read stackfile {}", path.display())]
    StackFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Remote errors
    #[error("HTTP {status} error while trying to obtain JWT token")]
    Authentication { status: u16 },

    #[error("HTTP {status} error while trying to get {resource}")]
    Lookup { resource: &'static str, status: u16 },

    #[error(
        "unable to define endpoint ({count} available). Specify the ID using --portainer-endpoint-id"
    )]
    AmbiguousEndpoint { count: usize },

    #[error("{action} failed with HTTP {status}:\n{body}")]
    Mutation {
        action: &'static str,
        status: u16,
        body: String,
    },

    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}
