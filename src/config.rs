// Runtime configuration, read from the environment with defaults.
//
// CIVIC_DB_PATH    SQLite database file          (civic.db)
// CIVIC_BIND_ADDR  HTTP listen address           (0.0.0.0:3000)
// CIVIC_ACTOR      actor recorded on audit events (system)

use std::env;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "civic.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_ACTOR: &str = "system";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub actor: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            actor: DEFAULT_ACTOR.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; blank values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| -> String {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Config {
            db_path: PathBuf::from(var("CIVIC_DB_PATH", DEFAULT_DB_PATH)),
            bind_addr: var("CIVIC_BIND_ADDR", DEFAULT_BIND_ADDR),
            actor: var("CIVIC_ACTOR", DEFAULT_ACTOR),
        }
    }

    pub fn with_db_path(mut self, db_path: Option<PathBuf>) -> Self {
        if let Some(path) = db_path {
            self.db_path = path;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(Config::from_lookup(|_| None), Config::default());
    }

    #[test]
    fn test_reads_variables() {
        let vars: HashMap<&str, &str> = [
            ("CIVIC_DB_PATH", "/var/lib/civic/records.db"),
            ("CIVIC_BIND_ADDR", "127.0.0.1:8080"),
            ("CIVIC_ACTOR", "  clerk-7 "),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.db_path, PathBuf::from("/var/lib/civic/records.db"));
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.actor, "clerk-7");
    }

    #[test]
    fn test_blank_falls_back_and_cli_overrides() {
        let config = Config::from_lookup(|_| Some("   ".to_string()));
        assert_eq!(config, Config::default());

        let config = config.with_db_path(Some(PathBuf::from("other.db")));
        assert_eq!(config.db_path, PathBuf::from("other.db"));
    }
}
