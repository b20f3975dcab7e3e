use super::{ClipElement, DecodedImage, FetchFuture, MediaElement, MediaSource};
use crate::error::LoadError;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Serves media URIs out of a local directory, the way the hosting page's
/// static asset server would.
#[derive(Debug, Clone)]
pub struct FsMediaSource {
    root: PathBuf,
    runtime: Handle,
    autoplay_allowed: bool,
}

impl FsMediaSource {
    pub fn new(root: impl Into<PathBuf>, runtime: Handle, autoplay_allowed: bool) -> Self {
        Self { root: root.into(), runtime, autoplay_allowed }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a URI onto the media root. Absolute URLs and parent components are
    /// refused.
    pub fn resolve(&self, uri: &str) -> Result<PathBuf, LoadError> {
        if uri.contains("://") {
            return Err(LoadError::failed(uri, "remote URLs are not served from the media root"));
        }
        let path = uri.split(['?', '#']).next().unwrap_or(uri).trim_start_matches('/');
        let relative = Path::new(path);
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(LoadError::failed(uri, "path escapes the media root")),
            }
        }
        if resolved == self.root {
            return Err(LoadError::failed(uri, "empty media path"));
        }
        Ok(resolved)
    }
}

impl MediaSource for FsMediaSource {
    fn fetch_image(&self, uri: &str) -> FetchFuture<'_> {
        let uri = uri.to_string();
        Box::pin(async move {
            let path = self.resolve(&uri)?;
            let bytes = tokio::fs::read(&path).await.map_err(|err| LoadError::failed(&uri, err))?;
            let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
                .await
                .map_err(|err| LoadError::failed(&uri, err))?
                .map_err(|err| LoadError::failed(&uri, err))?;
            Ok(DecodedImage::new(decoded.to_rgba8()))
        })
    }

    fn open_video(&self, uri: &str) -> Result<Arc<dyn MediaElement>, LoadError> {
        let path = self.resolve(uri)?;
        let element: Arc<dyn MediaElement> = ClipElement::open(uri, path, &self.runtime, self.autoplay_allowed);
        Ok(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ReadyState;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;

    fn source(root: &Path) -> FsMediaSource {
        FsMediaSource::new(root, Handle::current(), true)
    }

    #[tokio::test]
    async fn resolve_rejects_escapes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source(dir.path());
        assert!(source.resolve("../secret.jpg").is_err());
        assert!(source.resolve("https://example.com/a.jpg").is_err());
        assert!(source.resolve("/").is_err());
        assert_eq!(source.resolve("/photos/a.jpg?x=1").expect("resolve"), dir.path().join("photos/a.jpg"));
    }

    #[tokio::test]
    async fn fetches_and_decodes_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        RgbaImage::from_pixel(6, 3, Rgba([200, 10, 10, 255])).save(dir.path().join("a.png")).expect("write png");
        let decoded = source(dir.path()).fetch_image("a.png").await.expect("decode");
        assert_eq!(decoded.dimensions(), (6, 3));
    }

    #[tokio::test]
    async fn missing_and_corrupt_images_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("bad.jpg"), b"not an image").expect("write");
        let source = source(dir.path());
        assert!(matches!(source.fetch_image("missing.jpg").await, Err(LoadError::LoadFailed { .. })));
        assert!(matches!(source.fetch_image("bad.jpg").await, Err(LoadError::LoadFailed { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn undecodable_video_reaches_error_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("clip.mp4"), b"\x00\x00\x00\x18ftypmp42").expect("write");
        let element = source(dir.path()).open_video("clip.mp4").expect("open");
        for _ in 0..200 {
            if element.ready_state() != ReadyState::Nothing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(element.ready_state(), ReadyState::Errored);
        element.detach();
    }
}
