use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const DEFAULT_VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "webm", "mov", "m4v"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRef {
    uri: String,
    kind: MediaKind,
}

impl MediaRef {
    pub fn new(uri: impl Into<String>, kind: MediaKind) -> Self {
        Self { uri: uri.into(), kind }
    }

    pub fn image(uri: impl Into<String>) -> Self {
        Self::new(uri, MediaKind::Image)
    }

    pub fn video(uri: impl Into<String>) -> Self {
        Self::new(uri, MediaKind::Video)
    }

    /// Tags `uri` by its extension. Query strings and fragments are ignored.
    pub fn classify<S: AsRef<str>>(uri: impl Into<String>, video_extensions: &[S]) -> Self {
        let uri = uri.into();
        let kind = match extension_of(&uri) {
            Some(ext) if video_extensions.iter().any(|v| v.as_ref().eq_ignore_ascii_case(ext)) => {
                MediaKind::Video
            }
            _ => MediaKind::Image,
        };
        Self { uri, kind }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

fn extension_of(uri: &str) -> Option<&str> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let file = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    media: Vec<String>,
}

/// Ordered, deduplicated list of everything the globe can show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaCatalog {
    entries: Vec<MediaRef>,
}

impl MediaCatalog {
    pub fn from_uris<I, S, V>(uris: I, video_extensions: &[V]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        V: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for uri in uris {
            let uri = uri.as_ref().trim();
            if uri.is_empty() || !seen.insert(uri.to_string()) {
                continue;
            }
            entries.push(MediaRef::classify(uri, video_extensions));
        }
        Self { entries }
    }

    pub fn from_refs(refs: impl IntoIterator<Item = MediaRef>) -> Self {
        let mut seen = HashSet::new();
        let entries = refs.into_iter().filter(|media| seen.insert(media.uri().to_string())).collect();
        Self { entries }
    }

    pub fn load<V: AsRef<str>>(path: impl AsRef<Path>, video_extensions: &[V]) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read media catalog {}", path.display()))?;
        let file: CatalogFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse media catalog {}", path.display()))?;
        Ok(Self::from_uris(file.media, video_extensions))
    }

    pub fn load_or_default<V: AsRef<str>>(path: impl AsRef<Path>, video_extensions: &[V]) -> Self {
        match Self::load(path, video_extensions) {
            Ok(catalog) => catalog,
            Err(err) => {
                tracing::warn!("Media catalog error: {err:?}. The globe will be empty.");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MediaRef> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaRef> {
        self.entries.iter()
    }

    pub fn images(&self) -> impl Iterator<Item = &MediaRef> {
        self.entries.iter().filter(|media| media.kind() == MediaKind::Image)
    }

    pub fn videos(&self) -> impl Iterator<Item = &MediaRef> {
        self.entries.iter().filter(|media| media.kind() == MediaKind::Video)
    }

    /// Media for each of `count` globe slots. Entries repeat cyclically when the
    /// catalog is shorter than `count` and the tail is ignored when it is longer.
    pub fn slots(&self, count: usize) -> Vec<&MediaRef> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        (0..count).map(|slot| &self.entries[slot % self.entries.len()]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension_case_insensitively() {
        let video = MediaRef::classify("clips/Beach.MP4", &DEFAULT_VIDEO_EXTENSIONS);
        assert_eq!(video.kind(), MediaKind::Video);
        let image = MediaRef::classify("photos/beach.jpeg", &DEFAULT_VIDEO_EXTENSIONS);
        assert_eq!(image.kind(), MediaKind::Image);
        let query = MediaRef::classify("clips/a.webm?v=2", &DEFAULT_VIDEO_EXTENSIONS);
        assert_eq!(query.kind(), MediaKind::Video);
    }

    #[test]
    fn missing_extension_is_an_image() {
        assert_eq!(MediaRef::classify("photos/README", &DEFAULT_VIDEO_EXTENSIONS).kind(), MediaKind::Image);
        assert_eq!(MediaRef::classify("clips/.mp4", &DEFAULT_VIDEO_EXTENSIONS).kind(), MediaKind::Image);
        assert_eq!(MediaRef::classify("dir.mp4/file", &DEFAULT_VIDEO_EXTENSIONS).kind(), MediaKind::Image);
    }

    #[test]
    fn from_uris_drops_duplicates_and_blanks() {
        let catalog = MediaCatalog::from_uris(
            ["a.jpg", "b.mp4", "a.jpg", "  ", "c.png", "b.mp4"],
            &DEFAULT_VIDEO_EXTENSIONS,
        );
        let uris: Vec<&str> = catalog.iter().map(MediaRef::uri).collect();
        assert_eq!(uris, ["a.jpg", "b.mp4", "c.png"]);
        assert_eq!(catalog.images().count(), 2);
        assert_eq!(catalog.videos().count(), 1);
    }

    #[test]
    fn slots_cycle_and_truncate() {
        let catalog = MediaCatalog::from_uris(["a.jpg", "b.jpg", "c.mp4"], &DEFAULT_VIDEO_EXTENSIONS);
        let slots: Vec<&str> = catalog.slots(5).into_iter().map(MediaRef::uri).collect();
        assert_eq!(slots, ["a.jpg", "b.jpg", "c.mp4", "a.jpg", "b.jpg"]);
        let short: Vec<&str> = catalog.slots(2).into_iter().map(MediaRef::uri).collect();
        assert_eq!(short, ["a.jpg", "b.jpg"]);
        assert!(MediaCatalog::default().slots(50).is_empty());
    }
}
