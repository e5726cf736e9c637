//! Module implement configuration for layer instances.
//!
//! Configuration is typically built in code with the `set_*` methods, or
//! loaded from a toml table by the embedding service.

use crate::{Error, Result};

/// Default size for the backend memory map, 1TB of address space.
pub const MAP_SIZE: usize = 1024 * 1024 * 1024 * 1024;
/// Default number of named sub-databases in the main environment.
pub const MAX_DBS: u32 = 128;

macro_rules! get_property {
    ($value:expr, $name:expr, $method:ident, $default:expr) => {
        match $value.get($name) {
            Some(value) => match value.$method() {
                Some(value) => Ok(value),
                None => {
                    err_at!(InvalidInput, msg: "invalid type for config {:?}", $name)
                }
            },
            None => Ok($default),
        }
    };
}

/// Configuration for [Layer](crate::Layer) instances.
#[derive(Debug, Clone)]
pub struct Config {
    /// Lock the backend memory maps for performance.
    pub lockmemory: bool,
    /// Open the backend read-only and reject all writes.
    pub readonly: bool,
    /// Peer URLs to follow, resolved to [Upstream](crate::Upstream)
    /// handles by the embedding service.
    pub upstream: Vec<String>,
    /// Additionally flatten applied edits into the legacy splice log.
    pub fallback: bool,
    /// Backend memory-map size, in bytes.
    pub map_size: usize,
    /// Maximum named sub-databases in the main environment.
    pub max_dbs: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            lockmemory: false,
            readonly: false,
            upstream: Vec::default(),
            fallback: false,
            map_size: MAP_SIZE,
            max_dbs: MAX_DBS,
        }
    }
}

impl<'a> arbitrary::Arbitrary<'a> for Config {
    fn arbitrary(u: &mut arbitrary::Unstructured) -> arbitrary::Result<Self> {
        let config = Config {
            lockmemory: u.arbitrary()?,
            readonly: false,
            upstream: Vec::default(),
            fallback: u.arbitrary()?,
            map_size: *u.choose(&[10_000_000, 100_000_000, 1_000_000_000])?,
            max_dbs: MAX_DBS,
        };
        Ok(config)
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn set_lockmemory(&mut self, lockmemory: bool) -> &mut Self {
        self.lockmemory = lockmemory;
        self
    }

    pub fn set_readonly(&mut self, readonly: bool) -> &mut Self {
        self.readonly = readonly;
        self
    }

    pub fn set_upstream(&mut self, urls: Vec<String>) -> &mut Self {
        self.upstream = urls;
        self
    }

    pub fn set_fallback(&mut self, fallback: bool) -> &mut Self {
        self.fallback = fallback;
        self
    }

    pub fn set_map_size(&mut self, map_size: usize) -> &mut Self {
        self.map_size = map_size;
        self
    }

    /// Load configuration from a toml table. Missing properties keep
    /// their defaults; `upstream` accepts either a string or a list of
    /// strings.
    pub fn from_toml(value: toml::Value) -> Result<Config> {
        let d = Config::default();

        let upstream = match value.get("upstream") {
            Some(toml::Value::String(url)) => vec![url.clone()],
            Some(toml::Value::Array(urls)) => {
                let mut items = vec![];
                for url in urls {
                    match url.as_str() {
                        Some(url) => items.push(url.to_string()),
                        None => err_at!(InvalidInput, msg: "upstream entry not a string")?,
                    }
                }
                items
            }
            Some(_) => err_at!(InvalidInput, msg: "invalid type for config \"upstream\"")?,
            None => vec![],
        };

        let config = Config {
            lockmemory: get_property!(value, "lockmemory", as_bool, d.lockmemory)?,
            readonly: get_property!(value, "readonly", as_bool, d.readonly)?,
            upstream,
            fallback: get_property!(value, "fallback", as_bool, d.fallback)?,
            map_size: get_property!(value, "map_size", as_integer, d.map_size as i64)?
                as usize,
            max_dbs: get_property!(value, "max_dbs", as_integer, d.max_dbs as i64)? as u32,
        };

        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
