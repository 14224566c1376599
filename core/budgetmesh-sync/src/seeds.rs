//! Seed endpoints.
//!
//! A seed is a reachable `host` and `port`. It is accepted as `host:port`,
//! `host[port]` or a bare host, and always stored in the canonical
//! `host[port]` form. The bracket form survives IPv6 literals and list
//! separators.

use crate::error::{SyncError, SyncResult};
use std::collections::BTreeSet;

/// Port used when a seed does not name one.
pub const DEFAULT_PORT: u16 = 7800;

/// A parsed seed endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Seed {
    pub host: String,
    pub port: u16,
}

impl Seed {
    /// Parses any accepted spelling.
    pub fn parse(input: &str) -> SyncResult<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(SyncError::InvalidEndpoint(input.to_string()));
        }

        let (host, port) = split_host_port(s);

        let host = host.trim();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(SyncError::InvalidEndpoint(input.to_string()));
        }
        let port = match port {
            Some(p) => p
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| SyncError::InvalidEndpoint(input.to_string()))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// The canonical `host[port]` form.
    pub fn canonical(&self) -> String {
        format!("{}[{}]", self.host, self.port)
    }

    /// The `host:port` form accepted by resolvers.
    pub fn to_lookup(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn split_host_port(s: &str) -> (&str, Option<&str>) {
    // [v6]:port and [v6]
    if let Some(rest) = s.strip_prefix('[') {
        if let Some((host, port)) = rest.split_once("]:") {
            return (host, Some(port));
        }
        if let Some(host) = rest.strip_suffix(']') {
            return (host, None);
        }
    }
    // host[port]
    if let Some(open) = s.rfind('[').filter(|_| s.ends_with(']')) {
        return (&s[..open], Some(&s[open + 1..s.len() - 1]));
    }
    match s.rsplit_once(':') {
        // A second ':' means an unbracketed IPv6 literal with no port.
        Some((host, port)) if !host.contains(':') => (host, Some(port)),
        _ => (s, None),
    }
}

/// Canonicalizes one seed string.
pub fn normalize_seed(input: &str) -> SyncResult<String> {
    Seed::parse(input).map(|s| s.canonical())
}

/// Splits a comma, semicolon or whitespace separated list, dropping
/// entries that do not parse.
pub fn parse_seed_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .filter_map(|s| normalize_seed(s).ok())
        .collect()
}

/// Persists the seed book when it grows.
pub trait SeedSink: Send + Sync {
    /// Saves the full, canonical seed list.
    fn save_seeds(&self, seeds: &[String]) -> SyncResult<()>;
}

/// The set of known seeds, in canonical form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedBook {
    seeds: BTreeSet<String>,
}

impl SeedBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a book from any accepted spellings, skipping invalid entries.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seeds = entries
            .into_iter()
            .filter_map(|s| normalize_seed(s.as_ref()).ok())
            .collect();
        Self { seeds }
    }

    /// Adds a seed. Returns the canonical form if it was not already known.
    pub fn insert(&mut self, seed: &str) -> SyncResult<Option<String>> {
        let canonical = normalize_seed(seed)?;
        Ok(self.seeds.insert(canonical.clone()).then_some(canonical))
    }

    /// Returns true if the seed is known (any spelling).
    pub fn contains(&self, seed: &str) -> bool {
        normalize_seed(seed).is_ok_and(|c| self.seeds.contains(&c))
    }

    /// All seeds, sorted.
    pub fn to_vec(&self) -> Vec<String> {
        self.seeds.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}
