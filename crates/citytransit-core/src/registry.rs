//! Upstream source registry and identifier normalization.
//!
//! Each city network emits identifiers in its own namespace ("raw" ids).
//! The registry translates them into one merged app-space namespace and
//! back: raw ids have the source's local prefix stripped, then gain the
//! source's app prefix so they stay unique across all sources. Conversion
//! is pure and invertible; the resolver relies on app prefixes being
//! disjoint so an id's prefix unambiguously names its source.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Identifier of one registered upstream source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One upstream transit-information service. Immutable after registry
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: SourceId,
    /// Prefix the upstream prepends to its own raw identifiers.
    pub local_prefix: String,
    /// Prefix added in app space. The single source without one is the
    /// default source and its ids pass through unprefixed.
    pub app_prefix: Option<String>,
    pub separator: char,
    pub v2_base: String,
    pub v3_base: String,
    /// Static API key passed through unchanged as a request header.
    pub api_key: Option<String>,
}

impl Source {
    /// The `"{prefix}{separator}"` tag this source's app-space ids carry,
    /// if any.
    pub fn app_tag(&self) -> Option<String> {
        self.app_prefix
            .as_ref()
            .map(|prefix| format!("{prefix}{}", self.separator))
    }

    /// Convert a raw upstream identifier into app space.
    ///
    /// Strips the source's local prefix when present, then prepends the app
    /// tag when not already present. Idempotent; empty ids pass through.
    pub fn to_app_space(&self, id: &str) -> String {
        if id.is_empty() {
            return String::new();
        }

        let stripped = id.strip_prefix(self.local_prefix.as_str()).unwrap_or(id);
        match self.app_tag() {
            Some(tag) if !stripped.starts_with(&tag) => format!("{tag}{stripped}"),
            _ => stripped.to_string(),
        }
    }

    /// Exact inverse of [`to_app_space`](Self::to_app_space): strips the app
    /// tag and restores the local prefix the upstream expects.
    pub fn restore_upstream(&self, id: &str) -> String {
        if id.is_empty() {
            return String::new();
        }

        let stripped = match self.app_tag() {
            Some(tag) => id.strip_prefix(&tag).unwrap_or(id),
            None => id,
        };

        if stripped.starts_with(self.local_prefix.as_str()) {
            stripped.to_string()
        } else {
            format!("{}{stripped}", self.local_prefix)
        }
    }

    /// Whether an app-space id explicitly carries this source's prefix.
    pub fn owns_app_id(&self, app_id: &str) -> bool {
        self.app_tag()
            .map(|tag| app_id.starts_with(&tag))
            .unwrap_or(false)
    }
}

/// Static list of upstream sources, loaded once at startup.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    /// Validate and build a registry.
    ///
    /// # Errors
    ///
    /// Fails when the list is empty, a source id repeats, more than one
    /// source omits an app prefix, or two app prefixes are not disjoint
    /// (equal, or one a prefix of the other).
    pub fn new(sources: Vec<Source>) -> Result<Self, RegistryError> {
        if sources.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut default: Option<&Source> = None;
        for (index, source) in sources.iter().enumerate() {
            for earlier in &sources[..index] {
                if earlier.id == source.id {
                    return Err(RegistryError::DuplicateId {
                        id: source.id.to_string(),
                    });
                }

                if let (Some(a), Some(b)) = (earlier.app_tag(), source.app_tag()) {
                    if a.starts_with(&b) || b.starts_with(&a) {
                        return Err(RegistryError::PrefixCollision {
                            prefix: source.app_prefix.clone().unwrap_or_default(),
                            first: earlier.id.to_string(),
                            second: source.id.to_string(),
                        });
                    }
                }
            }

            if source.app_prefix.is_none() {
                if let Some(existing) = default {
                    return Err(RegistryError::DuplicateDefault {
                        first: existing.id.to_string(),
                        second: source.id.to_string(),
                    });
                }
                default = Some(source);
            }
        }

        Ok(Self { sources })
    }

    /// The two built-in city networks.
    pub fn builtin() -> Self {
        Self::new(vec![
            Source {
                id: SourceId::new("metro"),
                local_prefix: String::from("mtr:"),
                app_prefix: None,
                separator: ':',
                v2_base: String::from("https://api.metropolis-transit.net/v2"),
                v3_base: String::from("https://api.metropolis-transit.net/v3"),
                api_key: None,
            },
            Source {
                id: SourceId::new("harbor"),
                local_prefix: String::from("hbr:"),
                app_prefix: Some(String::from("h")),
                separator: ':',
                v2_base: String::from("https://api.harborcity-transit.net/v2"),
                v3_base: String::from("https://api.harborcity-transit.net/v3"),
                api_key: None,
            },
        ])
        .expect("builtin registry is valid")
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn get(&self, id: &SourceId) -> Option<&Source> {
        self.sources.iter().find(|source| &source.id == id)
    }

    /// The source whose ids pass through unprefixed, or the first
    /// registered source when every source carries a prefix.
    pub fn default_source(&self) -> &Source {
        self.sources
            .iter()
            .find(|source| source.app_prefix.is_none())
            .unwrap_or(&self.sources[0])
    }

    /// The source named by an app-space id's explicit prefix, if any.
    pub fn sniff_prefix(&self, app_id: &str) -> Option<&Source> {
        self.sources.iter().find(|source| source.owns_app_id(app_id))
    }

    /// Candidate order for the resolver hunt: the explicitly prefixed
    /// source first when the id carries one, else the default source
    /// first; remaining sources follow in registry order.
    pub fn resolution_order(&self, app_id: &str) -> Vec<&Source> {
        let first = self
            .sniff_prefix(app_id)
            .unwrap_or_else(|| self.default_source());

        let mut order = Vec::with_capacity(self.sources.len());
        order.push(first);
        order.extend(self.sources.iter().filter(|source| source.id != first.id));
        order
    }
}
