use std::{collections::BTreeMap, fmt, path::PathBuf};

use tracing::warn;

use crate::error::{DbResult, Error};

/// Capacity of the channel carrying materialized rows from a worker to the
/// consuming task. Workers block once this many rows are pending.
pub const ROW_CHANNEL_CAPACITY: usize = 256;

/// Number of blocking workers used when none is specified.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Where a database lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageTarget {
    InMemory,
    File(PathBuf),
}

impl StorageTarget {
    pub fn file(path: impl Into<PathBuf>) -> StorageTarget {
        StorageTarget::File(path.into())
    }
}

impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageTarget::InMemory => f.write_str(":memory:"),
            StorageTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Engine options applied when a database handle is created.
///
/// Option names are trimmed and lower-cased, so two configurations holding the
/// same options compare (and hash) equal regardless of insertion order or
/// spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Configuration {
    options: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Configuration {
        Configuration::default()
    }

    /// Adds (or replaces) an option, returning the updated configuration.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Configuration {
        self.set(key, value);
        self
    }

    /// Adds (or replaces) an option.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.options.insert(normalize(key), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(&normalize(key)).map(String::as_str)
    }

    /// Removes an option, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.options.remove(&normalize(key))
    }

    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Builds the native engine configuration.
    ///
    /// Each option is first checked on its own; options the engine rejects are
    /// logged and skipped instead of failing the whole configuration. Option
    /// names are only checked when the database is opened, see
    /// [`unrecognized_options`].
    pub(crate) fn to_native(&self) -> DbResult<duckdb::Config> {
        let mut accepted = self.options().filter(|(key, value)| {
            if key.contains('\0') || value.contains('\0') {
                warn!(option = key, "skipping configuration option with interior NUL");
                return false;
            }
            match duckdb::Config::default().with(key, value) {
                Ok(_) => true,
                Err(error) => {
                    warn!(option = key, value, %error, "skipping invalid configuration option");
                    false
                }
            }
        });

        accepted.try_fold(duckdb::Config::default(), |config, (key, value)| {
            config.with(key, value).map_err(|error| Error::EngineInitialization {
                target: format!("option `{key}`"),
                message: error.to_string(),
            })
        })
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = Configuration::new();
        for (key, value) in iter {
            config.set(key.as_ref(), value);
        }
        config
    }
}

/// Extracts the option names listed in an engine "not recognized" open error.
pub(crate) fn unrecognized_options(message: &str) -> Vec<&str> {
    const MARKER: &str = "options were not recognized:";

    let Some(start) = message.find(MARKER) else {
        return Vec::new();
    };
    message[start + MARKER.len()..]
        .split(',')
        .map(|name| name.trim().trim_end_matches('.'))
        .filter(|name| !name.is_empty())
        .collect()
}

fn normalize(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::hash_map::DefaultHasher,
        hash::{Hash, Hasher},
    };

    use super::*;

    fn hash_of(config: &Configuration) -> u64 {
        let mut hasher = DefaultHasher::new();
        config.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_order_and_case_insensitive_equality() {
        let a = Configuration::new()
            .with("threads", "2")
            .with("Access_Mode", "READ_WRITE");
        let b: Configuration = [(" access_mode ", "READ_WRITE"), ("THREADS", "2")]
            .into_iter()
            .collect();

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.get("ACCESS_MODE"), Some("READ_WRITE"));
    }

    #[test]
    fn test_different_values_differ() {
        let a = Configuration::new().with("threads", "2");
        let b = Configuration::new().with("threads", "3");
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_option_is_skipped() {
        let config = Configuration::new()
            .with("threads", "2")
            .with("access_mode", "not-a-mode");
        assert!(config.to_native().is_ok());
    }

    #[test]
    fn test_unrecognized_options() {
        let message = "Invalid Input Error: The following options were not recognized: foo, bar_baz";
        assert_eq!(unrecognized_options(message), vec!["foo", "bar_baz"]);
        assert!(unrecognized_options("IO Error: cannot open file").is_empty());
    }

    #[test]
    fn test_remove() {
        let mut config = Configuration::new().with("Threads", "2").with("x", "1");
        assert_eq!(config.remove("THREADS").as_deref(), Some("2"));
        assert_eq!(config.len(), 1);
        assert_eq!(config.remove("threads"), None);
    }

    #[test]
    fn test_target_display() {
        assert_eq!(StorageTarget::InMemory.to_string(), ":memory:");
        assert_eq!(StorageTarget::file("data/x.db").to_string(), "data/x.db");
    }
}
