//! Best-effort background resolution of upcoming items.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::cache::ResourceCache;
use crate::media::MediaItem;

/// Look-ahead used when the configuration does not say otherwise.
pub const DEFAULT_PREFETCH_COUNT: usize = 3;

/// The `count` positions after `current`, wrapping modulo `len`.
/// Repeats collapse, so a look-ahead past the collection size visits each
/// position once.
#[must_use]
pub fn upcoming_indices(len: usize, current: usize, count: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(count.min(len));
    for step in 1..=count {
        let idx = (current + step) % len;
        if out.contains(&idx) {
            break;
        }
        out.push(idx);
    }
    out
}

/// Resolve the next `count` items concurrently. Failures are logged and
/// dropped; this never returns an error.
pub async fn prefetch(
    cache: Arc<ResourceCache>,
    items: Arc<[Arc<MediaItem>]>,
    current: usize,
    count: usize,
) {
    let pending: Vec<&Arc<MediaItem>> = upcoming_indices(items.len(), current, count)
        .into_iter()
        .map(|idx| &items[idx])
        .filter(|item| !item.is_resolved())
        .collect();
    if pending.is_empty() {
        return;
    }
    debug!(current, count = pending.len(), "prefetching");

    let cache = &cache;
    join_all(pending.into_iter().map(|item| async move {
        if let Err(err) = cache.resolve(item).await {
            warn!(item = %item.name(), error = %err, cause = %err.cause, "prefetch failed");
        }
    }))
    .await;
}
