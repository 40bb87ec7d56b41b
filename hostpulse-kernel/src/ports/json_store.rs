use super::{Collection, CollectionInfo, ContentPort, ContentQuery, ContentRecord, StoreError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

/// Lowercase ASCII words joined by single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// JSON-file backed collection with the whole file cached in memory.
pub struct JsonContentPort {
    collection: Collection,
    storage_path: PathBuf,
    cache: Mutex<Vec<ContentRecord>>,
}

impl JsonContentPort {
    pub fn new<P: Into<PathBuf>>(collection: Collection, storage_path: P) -> Result<Self, StoreError> {
        let port = Self {
            collection,
            storage_path: storage_path.into(),
            cache: Mutex::new(Vec::new()),
        };
        port.load_from_disk()?;
        debug!("{} store at {:?}", collection, port.storage_path);
        Ok(port)
    }

    fn load_from_disk(&self) -> Result<(), StoreError> {
        if !self.storage_path.exists() {
            fs::write(&self.storage_path, "[]")?;
        }
        let content = fs::read_to_string(&self.storage_path)?;
        *self.cache.lock() = serde_json::from_str(&content)?;
        Ok(())
    }

    fn save_to_disk(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&*self.cache.lock())?;
        fs::write(&self.storage_path, json)?;
        Ok(())
    }

    /// Explicit slug if given, else derived from the title field.
    fn slug_for(&self, data: &Value) -> Result<Option<String>, StoreError> {
        let source = data
            .get("slug")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .or_else(|| data.get(self.collection.title_field()).and_then(Value::as_str));
        let slug = source.map(slugify).filter(|s| !s.is_empty());

        if slug.is_none() && self.collection.slug_required() {
            return Err(StoreError::InvalidRecord(format!(
                "{} needs a slug or a {}",
                self.collection,
                self.collection.title_field()
            )));
        }
        Ok(slug)
    }

    fn matches_filters(record: &ContentRecord, filters: &HashMap<String, Value>) -> bool {
        filters.iter().all(|(key, expected)| match record.data.get(key) {
            Some(Value::String(s)) => expected.as_str() == Some(s.as_str()),
            Some(other) => other == expected,
            None => expected.is_null(),
        })
    }
}

impl ContentPort for JsonContentPort {
    fn list(&self, query: &ContentQuery) -> Result<Vec<ContentRecord>, StoreError> {
        let cache = self.cache.lock();
        let results = cache
            .iter()
            .rev()
            .filter(|r| Self::matches_filters(r, &query.filters))
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(results)
    }

    fn get(&self, key: &str) -> Result<ContentRecord, StoreError> {
        let cache = self.cache.lock();
        cache
            .iter()
            .find(|r| r.id == key)
            .or_else(|| cache.iter().find(|r| r.slug.as_deref() == Some(key)))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", self.collection, key)))
    }

    fn insert(&self, data: Value) -> Result<String, StoreError> {
        if !data.is_object() {
            return Err(StoreError::InvalidRecord("expected a JSON object".into()));
        }
        let slug = self.slug_for(&data)?;
        let id = Uuid::new_v4().to_string();

        {
            let mut cache = self.cache.lock();
            if let Some(slug) = &slug {
                if cache.iter().any(|r| r.slug.as_ref() == Some(slug)) {
                    return Err(StoreError::DuplicateSlug {
                        collection: self.collection,
                        slug: slug.clone(),
                    });
                }
            }
            cache.push(ContentRecord {
                id: id.clone(),
                slug,
                created: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
                data,
            });
        }

        self.save_to_disk()?;
        info!("{}: created {}", self.collection, id);
        Ok(id)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        {
            let mut cache = self.cache.lock();
            let before = cache.len();
            cache.retain(|r| r.id != id);
            if cache.len() == before {
                return Err(StoreError::NotFound(format!("{}/{}", self.collection, id)));
            }
        }
        self.save_to_disk()?;
        info!("{}: deleted {}", self.collection, id);
        Ok(())
    }

    fn info(&self) -> CollectionInfo {
        CollectionInfo {
            name: self.collection.key().to_string(),
            records: self.cache.lock().len(),
            slug_required: self.collection.slug_required(),
        }
    }
}
