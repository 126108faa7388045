//! Slide items and the resources they resolve to.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;

use crate::decode::{DecodeStrategy, DecoderRegistry};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "tiff", "tif", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "m4v", "avi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

/// Lowercased extension of `name`, without the dot.
#[must_use]
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Classify a file name by extension. `None` means the file is not shown.
#[must_use]
pub fn classify(name: &str) -> Option<MediaKind> {
    let ext = extension_of(name);
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Opaque handle the enumerator hands out for reading an item's raw bytes.
pub trait MediaSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, io::Result<Vec<u8>>>;
}

/// Reads the item from the local filesystem at resolve time.
#[derive(Debug, Clone)]
pub struct FileSource(pub PathBuf);

impl MediaSource for FileSource {
    fn fetch(&self) -> BoxFuture<'_, io::Result<Vec<u8>>> {
        Box::pin(tokio::fs::read(&self.0))
    }
}

/// Encoding of the bytes held by a [`DisplayResource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFormat {
    pub kind: MediaKind,
    /// Format tag, e.g. `jpeg` or `mp4`.
    pub tag: String,
}

#[derive(Debug)]
struct ResourceData {
    format: ContentFormat,
    bytes: Vec<u8>,
}

/// Cheap-to-clone handle to bytes the display surfaces can render directly.
#[derive(Debug, Clone)]
pub struct DisplayResource(Arc<ResourceData>);

impl DisplayResource {
    pub fn new(format: ContentFormat, bytes: Vec<u8>) -> Self {
        Self(Arc::new(ResourceData { format, bytes }))
    }

    #[must_use]
    pub fn format(&self) -> &ContentFormat {
        &self.0.format
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    /// Whether both handles reference the same underlying resource.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// One slide of the show.
///
/// `kind` and the fallback decoder are fixed when the item is created. The
/// resolved resource is set at most once; the first resolution wins.
pub struct MediaItem {
    name: String,
    extension: String,
    kind: MediaKind,
    source: Arc<dyn MediaSource>,
    decoder: Option<Arc<dyn DecodeStrategy>>,
    resolved: OnceLock<DisplayResource>,
}

impl MediaItem {
    /// Build an item, classifying it by extension and looking up its decode
    /// capability once. Returns `None` for extensions that are neither
    /// displayable nor registered for fallback decoding.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn MediaSource>,
        decoders: &DecoderRegistry,
    ) -> Option<Self> {
        let name = name.into();
        let extension = extension_of(&name);
        let decoder = decoders.strategy_for(&extension);
        // Anything the registry can decode is an image, even when it is not
        // natively displayable.
        let kind = classify(&name).or(decoder.as_ref().map(|_| MediaKind::Image))?;
        Some(Self {
            name,
            extension,
            kind,
            source,
            decoder,
            resolved: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    #[must_use]
    pub const fn kind(&self) -> MediaKind {
        self.kind
    }

    pub(crate) fn source(&self) -> &dyn MediaSource {
        self.source.as_ref()
    }

    pub(crate) fn decoder(&self) -> Option<&Arc<dyn DecodeStrategy>> {
        self.decoder.as_ref()
    }

    #[must_use]
    pub fn resolved(&self) -> Option<&DisplayResource> {
        self.resolved.get()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Bind `resource` unless a resource is already bound; returns the bound one.
    pub(crate) fn bind(&self, resource: DisplayResource) -> DisplayResource {
        self.resolved.get_or_init(|| resource).clone()
    }

    /// Format the surfaces receive when no fallback decode is involved.
    pub(crate) fn native_format(&self) -> ContentFormat {
        ContentFormat {
            kind: self.kind,
            tag: self.extension.clone(),
        }
    }
}

impl fmt::Debug for MediaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaItem")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("fallback", &self.decoder.is_some())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
