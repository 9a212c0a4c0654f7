//! Parsing of source/sink descriptions.
//!
//! Descriptions use GStreamer's launch syntax for a single element: an element
//! name followed by space-separated `key=value` properties, for example
//! `videotestsrc pattern=2 is-live=false`.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// A parsed single-element description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDescription {
    /// Element name (e.g. "videotestsrc")
    pub name: String,
    properties: BTreeMap<String, String>,
}

impl ElementDescription {
    /// Parse a description, rejecting malformed properties
    pub fn parse(description: &str) -> Result<Self, String> {
        let mut tokens = description.split_whitespace();
        let name = tokens
            .next()
            .ok_or_else(|| "empty description".to_string())?
            .to_string();

        let mut properties = BTreeMap::new();
        for token in tokens {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{}'", token))?;
            if key.is_empty() {
                return Err(format!("missing property name in '{}'", token));
            }
            let value = value.trim_matches('"');
            properties.insert(key.to_string(), value.to_string());
        }

        Ok(Self { name, properties })
    }

    /// Raw property value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Property parsed as an unsigned integer, or `default` when absent
    pub fn get_u32(&self, key: &str, default: u32) -> Result<u32, String> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| format!("property '{}' must be an integer, got '{}'", key, v)),
        }
    }

    /// Optional unsigned 64-bit property
    pub fn get_opt_u64(&self, key: &str) -> Result<Option<u64>, String> {
        self.get(key)
            .map(|v| {
                v.parse()
                    .map_err(|_| format!("property '{}' must be an integer, got '{}'", key, v))
            })
            .transpose()
    }

    /// Property parsed as a boolean, or `default` when absent
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, String> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(format!("property '{}' must be a boolean, got '{}'", key, v)),
            },
        }
    }

    /// Required path property
    pub fn require_path(&self, key: &str) -> Result<PathBuf, String> {
        self.get(key)
            .map(PathBuf::from)
            .ok_or_else(|| format!("{} requires a '{}' property", self.name, key))
    }

    /// Fail if any property outside `known` was given
    pub fn check_known(&self, known: &[&str]) -> Result<(), String> {
        match self.properties.keys().find(|k| !known.contains(&k.as_str())) {
            Some(unknown) => Err(format!(
                "unknown property '{}' for {} (supported: {})",
                unknown,
                self.name,
                known.join(", ")
            )),
            None => Ok(()),
        }
    }
}
