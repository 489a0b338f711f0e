use crate::error::{DeployError, Result};
use serde::Serialize;

/// A stack environment variable, sent to Portainer as `{"name", "value"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentOverride {
    pub name: String,
    pub value: String,
}

impl std::str::FromStr for EnvironmentOverride {
    type Err = DeployError;

    fn from_str(pair: &str) -> Result<Self> {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| DeployError::InvalidOverride(pair.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

/// Parses `NAME=VALUE` pairs in order. Duplicate names are kept as given.
pub fn parse_overrides(pairs: &[String]) -> Result<Vec<EnvironmentOverride>> {
    pairs.iter().map(|pair| pair.parse()).collect()
}
