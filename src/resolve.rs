//! Symbolic reference resolution
//!
//! Property values and link endpoints may name other objects instead of
//! carrying their ids. Lookup order:
//!
//! 1. value already in identifier format
//! 2. `@Name` or bare name in this batch's maps
//! 3. exact name match among existing remote objects
//! 4. case-insensitive substring match among existing remote objects
//!
//! Anything else comes back unchanged and unresolved. More than one remote
//! match at steps 3 or 4 is an error, never a guess.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::client::{short_type_name, Category, ResourceSummary};
use crate::error::{FlowError, Result};
use crate::runtime::InvocationContext;

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("identifier regex")
});

/// True for values in platform identifier format
pub fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value.trim())
}

/// True for values that should go through resolution at all
pub fn looks_like_reference(value: &str) -> bool {
    let value = value.trim();
    is_identifier(value) || (value.starts_with('@') && value.len() > 1)
}

// ============================================================================
// NAME → ID MAPS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapEntry {
    pub id: String,
    pub type_name: String,
}

/// Insert-only map from a batch-local name to the id it was created with
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    entries: BTreeMap<String, MapEntry>,
}

pub type ServiceMap = IdMap;
pub type UnitMap = IdMap;

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false, leaving the map untouched, when the name is taken
    pub fn insert(&mut self, name: &str, id: &str, type_name: &str) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(
            name.to_string(),
            MapEntry {
                id: id.to_string(),
                type_name: type_name.to_string(),
            },
        );
        true
    }

    pub fn get(&self, name: &str) -> Option<&MapEntry> {
        self.entries.get(name)
    }

    pub fn id_of(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.id.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MapEntry)> {
        self.entries.iter()
    }
}

/// Everything created so far by one batch
#[derive(Debug, Default)]
pub struct BatchMaps {
    pub services: ServiceMap,
    pub units: UnitMap,
}

impl BatchMaps {
    pub fn map(&self, category: Category) -> Option<&IdMap> {
        match category {
            Category::Service => Some(&self.services),
            Category::Unit => Some(&self.units),
            Category::Link => None,
        }
    }
}

// ============================================================================
// REFERENCES
// ============================================================================

/// Parsed `["@"] [category ":"] name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    pub at: bool,
    pub category: Option<Category>,
    pub name: &'a str,
}

pub fn parse_reference(raw: &str) -> Reference<'_> {
    let trimmed = raw.trim();
    let (at, rest) = match trimmed.strip_prefix('@') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if let Some((qualifier, name)) = rest.split_once(':') {
        if let Some(category) = Category::from_qualifier(qualifier) {
            if !name.trim().is_empty() {
                return Reference {
                    at,
                    category: Some(category),
                    name: name.trim(),
                };
            }
        }
    }
    Reference {
        at,
        category: None,
        name: rest,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Already an identifier
    Literal,
    /// Created earlier in this batch
    Batch { category: Category },
    /// Existing object in the scope
    Remote { category: Category, name: String },
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub value: String,
    pub resolved: bool,
    pub source: ResolutionSource,
}

impl Resolution {
    fn unresolved(raw: &str) -> Self {
        Self {
            value: raw.to_string(),
            resolved: false,
            source: ResolutionSource::Unresolved,
        }
    }

    /// True when the id belongs to an object this batch did not create
    pub fn is_remote(&self) -> bool {
        matches!(self.source, ResolutionSource::Remote { .. })
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct ReferenceResolver<'a> {
    ctx: &'a InvocationContext,
    scope: String,
    /// Remote listings, fetched at most once per category per invocation
    listings: Mutex<HashMap<Category, Vec<ResourceSummary>>>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(ctx: &'a InvocationContext, scope: &str) -> Self {
        Self {
            ctx,
            scope: scope.to_string(),
            listings: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a property value that may reference another object
    pub async fn resolve(&self, raw: &str, maps: &BatchMaps) -> Result<Resolution> {
        let trimmed = raw.trim();
        if is_identifier(trimmed) {
            return Ok(Resolution {
                value: trimmed.to_string(),
                resolved: true,
                source: ResolutionSource::Literal,
            });
        }

        let reference = parse_reference(trimmed);
        if reference.name.is_empty() {
            return Ok(Resolution::unresolved(raw));
        }

        let local_category = reference.category.unwrap_or(Category::Service);
        if let Some(entry) = maps.map(local_category).and_then(|m| m.get(reference.name)) {
            return Ok(Resolution {
                value: entry.id.clone(),
                resolved: true,
                source: ResolutionSource::Batch {
                    category: local_category,
                },
            });
        }

        let categories: &[Category] = match reference.category {
            Some(Category::Service) => &[Category::Service],
            Some(Category::Unit) => &[Category::Unit],
            _ => &[Category::Service, Category::Unit],
        };
        let mut candidates = Vec::new();
        for category in categories {
            candidates.extend(self.listing(*category).await?);
        }

        let exact: Vec<&ResourceSummary> =
            candidates.iter().filter(|c| c.name == reference.name).collect();
        if let Some(found) = single_match(raw, &exact)? {
            return Ok(remote(found));
        }

        let needle = reference.name.to_lowercase();
        let fuzzy: Vec<&ResourceSummary> = candidates
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .collect();
        if let Some(found) = single_match(raw, &fuzzy)? {
            debug!(reference = raw, matched = %found.name, "Fuzzy reference match");
            return Ok(remote(found));
        }

        Ok(Resolution::unresolved(raw))
    }

    /// Resolve a link endpoint: batch units first, then an exact remote unit name
    pub async fn resolve_unit_endpoint(&self, name: &str, maps: &BatchMaps) -> Result<Resolution> {
        let reference = parse_reference(name);
        if let Some(entry) = maps.units.get(reference.name) {
            return Ok(Resolution {
                value: entry.id.clone(),
                resolved: true,
                source: ResolutionSource::Batch {
                    category: Category::Unit,
                },
            });
        }
        if is_identifier(reference.name) {
            return Ok(Resolution {
                value: reference.name.to_string(),
                resolved: true,
                source: ResolutionSource::Literal,
            });
        }
        let units = self.listing(Category::Unit).await?;
        let exact: Vec<&ResourceSummary> = units.iter().filter(|u| u.name == reference.name).collect();
        Ok(match single_match(name, &exact)? {
            Some(found) => remote(found),
            None => Resolution::unresolved(name),
        })
    }

    /// Existing services whose type name contains `interface`
    pub async fn services_of_type(&self, interface: &str) -> Result<Vec<ResourceSummary>> {
        let needle = interface.to_lowercase();
        Ok(self
            .listing(Category::Service)
            .await?
            .into_iter()
            .filter(|s| short_type_name(&s.type_name).to_lowercase().contains(&needle))
            .collect())
    }

    async fn listing(&self, category: Category) -> Result<Vec<ResourceSummary>> {
        let cached = self.listings.lock().get(&category).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }
        let fetched = self.ctx.client.list_resources(&self.scope, category).await?;
        self.listings.lock().insert(category, fetched.clone());
        Ok(fetched)
    }
}

fn single_match<'r>(
    raw: &str,
    matches: &[&'r ResourceSummary],
) -> Result<Option<&'r ResourceSummary>> {
    match matches {
        [] => Ok(None),
        [one] => Ok(Some(*one)),
        many => Err(FlowError::AmbiguousReference {
            reference: raw.to_string(),
            candidates: many
                .iter()
                .map(|c| format!("{}:{} ({})", c.category, c.name, c.id))
                .collect(),
        }),
    }
}

fn remote(found: &ResourceSummary) -> Resolution {
    Resolution {
        value: found.id.clone(),
        resolved: true,
        source: ResolutionSource::Remote {
            category: found.category,
            name: found.name.clone(),
        },
    }
}
