//! Environment variable access.
//!
//! Every override toke honours is read through [`Env`], so callers can swap
//! the process environment for a fixed map in tests.

use std::collections::HashMap;

/// Overrides the data root (`~/.toke` by default).
pub const DATA_DIR_VAR: &str = "TOKE_DATA_DIR";
/// Overrides the llama-server binary download base URL.
pub const LLAMA_SERVER_URL_VAR: &str = "TOKE_LLAMA_SERVER_URL";
/// Overrides the MLX server bundle download URL.
pub const MLX_SERVER_URL_VAR: &str = "TOKE_MLX_SERVER_URL";
/// Overrides the GitHub repository the dependency manifest is fetched from.
pub const RELEASE_REPO_VAR: &str = "TOKE_RELEASE_REPO";

/// Read-only view of environment variables.
pub trait Env: Send + Sync {
    /// Returns the value of `key`, or `None` when unset or empty.
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEnv;

impl Env for OsEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// A fixed set of variables, used in tests and embedding scenarios.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for MapEnv
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Env for MapEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_env_returns_set_values() {
        let env = MapEnv::new().with(DATA_DIR_VAR, "/tmp/toke");
        assert_eq!(env.get(DATA_DIR_VAR).as_deref(), Some("/tmp/toke"));
        assert_eq!(env.get(MLX_SERVER_URL_VAR), None);
    }

    #[test]
    fn empty_values_are_treated_as_unset() {
        let env: MapEnv = [(LLAMA_SERVER_URL_VAR, "")].into_iter().collect();
        assert_eq!(env.get(LLAMA_SERVER_URL_VAR), None);
    }
}
