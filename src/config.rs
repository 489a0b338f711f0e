use crate::error::{DeployError, Result};
use anyhow::{anyhow, Context};
use std::{fmt, fs, io, path::Path, path::PathBuf, time::Duration};
use url::Url;

pub const DEFAULT_STACK_FILE: &str = "docker-stack.yml";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything one deployment needs, resolved from flags and environment.
#[derive(Debug)]
pub struct DeployConfig {
    /// Portainer API root, i.e. the instance URL with `/api` appended.
    pub api_url: Url,
    pub credentials: Credentials,
    pub endpoint_id: Option<u64>,
    pub stack_name: String,
    pub stack_file: PathBuf,
    /// Raw `NAME=VALUE` strings; parsed by the orchestrator.
    pub env_vars: Vec<String>,
    pub timeout: Duration,
}

/// Appends the `api` segment to a Portainer instance URL.
pub fn api_url(portainer_url: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(portainer_url)
        .with_context(|| format!("Invalid Portainer URL '{}'", portainer_url))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Portainer URL '{}' cannot be used as a base", portainer_url))?
        .pop_if_empty()
        .push("api");
    Ok(url)
}

pub fn load_stack_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => DeployError::StackFileMissing {
            path: path.to_path_buf(),
        },
        _ => DeployError::StackFileUnreadable {
            path: path.to_path_buf(),
            source,
        },
    })
}
