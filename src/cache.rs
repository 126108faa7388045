//! Name-keyed cache of resolved display resources.
//!
//! Entries are never evicted or replaced while the session lives; the table
//! is bounded by the size of the collection. Concurrent resolutions of the
//! same item are not de-duplicated: each fetches on its own and the first one
//! to finish claims the slot, later ones adopt it. Once released, the cache
//! stores nothing further.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{DecodeError, MediaLoadError};
use crate::media::{ContentFormat, DisplayResource, MediaItem};

#[derive(Debug, Default)]
pub struct ResourceCache {
    table: Mutex<Table>,
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<String, DisplayResource>,
    released: bool,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn `item` into a displayable resource, fetching and decoding only
    /// when neither the item nor the table already holds one.
    ///
    /// # Errors
    /// Returns [`MediaLoadError`] when the fetch or the fallback decode fails.
    /// Nothing is stored in that case.
    pub async fn resolve(&self, item: &MediaItem) -> Result<DisplayResource, MediaLoadError> {
        if let Some(resource) = item.resolved() {
            return Ok(resource.clone());
        }

        let cached = self.table.lock().entries.get(item.name()).cloned();
        if let Some(resource) = cached {
            debug!(item = %item.name(), "cache hit");
            return Ok(item.bind(resource));
        }

        let raw = item
            .source()
            .fetch()
            .await
            .map_err(|e| MediaLoadError::fetch(item.name(), e))?;

        let resource = match item.decoder() {
            Some(strategy) => {
                let format = ContentFormat {
                    kind: item.kind(),
                    tag: strategy.output_tag().to_string(),
                };
                let strategy = strategy.clone();
                let decoded = tokio::task::spawn_blocking(move || strategy.decode(&raw))
                    .await
                    .map_err(|e| {
                        MediaLoadError::decode(item.name(), DecodeError::new(item.extension(), e))
                    })?
                    .map_err(|e| MediaLoadError::decode(item.name(), e))?;
                DisplayResource::new(format, decoded)
            }
            None => DisplayResource::new(item.native_format(), raw),
        };

        let stored = {
            let mut table = self.table.lock();
            if table.released {
                debug!(item = %item.name(), "resolved after release; not stored");
                return Ok(resource);
            }
            table
                .entries
                .entry(item.name().to_string())
                .or_insert(resource)
                .clone()
        };
        debug!(
            item = %item.name(),
            format = %stored.format().tag,
            bytes = stored.bytes().len(),
            "resolved"
        );
        Ok(item.bind(stored))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.table.lock().entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }

    /// Drop every binding at session end and stop storing new ones. Returns
    /// how many were released.
    pub fn release(&self) -> usize {
        let released = {
            let mut table = self.table.lock();
            table.released = true;
            std::mem::take(&mut table.entries).len()
        };
        debug!(released, "resource cache released");
        released
    }
}
