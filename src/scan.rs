//! Directory scanning and startup ordering of the collection.

use std::path::Path;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::decode::DecoderRegistry;
use crate::error::ScanError;
use crate::media::{FileSource, MediaItem};

/// Recursively collect every supported image and video under `root`.
///
/// Item names are paths relative to `root` with `/` separators; they double
/// as cache keys, so files sharing a base name in different folders stay
/// distinct. Entries are visited in file-name order.
///
/// # Errors
/// [`ScanError::BadDir`] if `root` is missing or not a directory.
pub fn scan(root: &Path, decoders: &DecoderRegistry) -> Result<Vec<Arc<MediaItem>>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::BadDir(root.to_path_buf()));
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !should_skip_dir(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let source = Arc::new(FileSource(path.to_path_buf()));
        match MediaItem::new(name, source, decoders) {
            Some(item) => out.push(Arc::new(item)),
            None => debug!(path = %path.display(), "scan: ignored"),
        }
    }
    info!(root = %root.display(), discovered = out.len(), "scan complete");
    Ok(out)
}

fn should_skip_dir(entry: &DirEntry) -> bool {
    // Never skip the root; tempfile roots can be dot-dirs.
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'))
}

/// Uniform random permutation of `items`; the input is left untouched.
#[must_use]
pub fn shuffle<T: Clone>(items: &[T]) -> Vec<T> {
    shuffle_with(items, &mut rand::rng())
}

/// Deterministic variant of [`shuffle`].
#[must_use]
pub fn shuffle_seeded<T: Clone>(items: &[T], seed: u64) -> Vec<T> {
    shuffle_with(items, &mut StdRng::seed_from_u64(seed))
}

fn shuffle_with<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut out = items.to_vec();
    out.shuffle(rng);
    out
}
