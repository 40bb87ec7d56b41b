/**
 * CONTENT PORTS - persistence for the site content collections
 *
 * ROLE:
 * Storage behind the admin `/content/{collection}` routes: blog posts,
 * categories, authors, knowledge-base articles and categories, partners.
 *
 * HOW IT WORKS:
 * - `ContentRegistry` maps each `Collection` to a `ContentPort`
 * - `ContentPort` is the common list/get/insert/delete surface
 * - Records are `{id, slug?, created, data}` with free-form JSON `data`
 * - Public-facing collections require a slug, unique inside the collection
 */

pub mod json_store;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub use json_store::JsonContentPort;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("slug '{slug}' already used in {collection}")]
    DuplicateSlug { collection: Collection, slug: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    Posts,
    Categories,
    Authors,
    KbPosts,
    KbCategories,
    Partners,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Posts,
        Collection::Categories,
        Collection::Authors,
        Collection::KbPosts,
        Collection::KbCategories,
        Collection::Partners,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Collection::Posts => "posts",
            Collection::Categories => "categories",
            Collection::Authors => "authors",
            Collection::KbPosts => "kb-posts",
            Collection::KbCategories => "kb-categories",
            Collection::Partners => "partners",
        }
    }

    /// Authors are only referenced by id, everything else is routed by slug.
    pub fn slug_required(self) -> bool {
        !matches!(self, Collection::Authors)
    }

    /// Field a missing slug is derived from.
    pub fn title_field(self) -> &'static str {
        match self {
            Collection::Posts | Collection::KbPosts => "title",
            _ => "name",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Collection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.key() == s)
            .ok_or_else(|| StoreError::UnknownCollection(s.to_string()))
    }
}

/// Listing filters and pagination, parsed from query parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentQuery {
    /// Exact matches on top-level `data` fields.
    pub filters: HashMap<String, serde_json::Value>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for ContentQuery {
    fn default() -> Self {
        Self {
            filters: HashMap::new(),
            limit: Some(100),
            offset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub slug: Option<String>,
    /// RFC3339, UTC.
    pub created: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub records: usize,
    pub slug_required: bool,
}

pub trait ContentPort {
    /// Newest first.
    fn list(&self, query: &ContentQuery) -> Result<Vec<ContentRecord>, StoreError>;

    /// Lookup by id, then by slug.
    fn get(&self, key: &str) -> Result<ContentRecord, StoreError>;

    /// Stores a new record and returns its generated id.
    fn insert(&self, data: serde_json::Value) -> Result<String, StoreError>;

    fn delete(&self, id: &str) -> Result<(), StoreError>;

    fn info(&self) -> CollectionInfo;
}

pub struct ContentRegistry {
    ports: HashMap<Collection, Box<dyn ContentPort + Send + Sync>>,
}

impl Default for ContentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentRegistry {
    pub fn new() -> Self {
        Self { ports: HashMap::new() }
    }

    pub fn register<T: ContentPort + Send + Sync + 'static>(&mut self, collection: Collection, port: T) {
        self.ports.insert(collection, Box::new(port));
    }

    pub fn get(&self, collection: Collection) -> Option<&(dyn ContentPort + Send + Sync)> {
        self.ports.get(&collection).map(|p| p.as_ref())
    }

    pub fn list_info(&self) -> Vec<CollectionInfo> {
        let mut infos: Vec<CollectionInfo> = self.ports.values().map(|p| p.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

/// One JSON file per collection under `data_dir`.
pub fn create_content_store(data_dir: &Path) -> Result<ContentRegistry, StoreError> {
    std::fs::create_dir_all(data_dir)?;
    let mut registry = ContentRegistry::new();
    for collection in Collection::ALL {
        let port = JsonContentPort::new(collection, data_dir.join(format!("{}.json", collection.key())))?;
        registry.register(collection, port);
    }
    info!("content store ready at {}", data_dir.display());
    Ok(registry)
}
