//! Per-activation texture cache. Owns every decoded image and media element
//! the globe uses; at most one load is ever issued per identifier.

use crate::catalog::{MediaKind, MediaRef};
use crate::error::LoadError;
use crate::media::{MediaElement, MediaSource, ReadyState};
use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use image::RgbaImage;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub const FALLBACK_ASPECT: f32 = 16.0 / 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    /// Pixels never change after the first upload.
    Fixed,
    /// Pixels follow a playing element and must be resampled every frame.
    CurrentFrame,
}

#[derive(Debug, Clone)]
pub struct TextureFrame {
    pub version: u64,
    pub pixels: Arc<RgbaImage>,
}

/// Something the renderer can sample pixels from.
pub trait TextureSource: Send + Sync + fmt::Debug {
    fn sample_mode(&self) -> SampleMode;

    fn dimensions(&self) -> Option<(u32, u32)>;

    fn sample(&self, now: Instant) -> Option<TextureFrame>;

    fn media_element(&self) -> Option<&Arc<dyn MediaElement>> {
        None
    }

    /// Releases whatever backs the pixels. Returns true when a media element
    /// was detached.
    fn release(&self) -> bool {
        false
    }
}

#[derive(Debug)]
struct StillSource {
    pixels: Arc<RgbaImage>,
}

impl TextureSource for StillSource {
    fn sample_mode(&self) -> SampleMode {
        SampleMode::Fixed
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.pixels.dimensions())
    }

    fn sample(&self, _now: Instant) -> Option<TextureFrame> {
        Some(TextureFrame { version: 1, pixels: Arc::clone(&self.pixels) })
    }
}

#[derive(Debug)]
struct LiveSource {
    element: Arc<dyn MediaElement>,
}

impl TextureSource for LiveSource {
    fn sample_mode(&self) -> SampleMode {
        SampleMode::CurrentFrame
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.element.intrinsic_size()
    }

    fn sample(&self, now: Instant) -> Option<TextureFrame> {
        self.element
            .current_frame(now)
            .map(|frame| TextureFrame { version: frame.version, pixels: frame.pixels })
    }

    fn media_element(&self) -> Option<&Arc<dyn MediaElement>> {
        Some(&self.element)
    }

    fn release(&self) -> bool {
        if self.element.is_detached() {
            return false;
        }
        self.element.pause();
        self.element.detach();
        true
    }
}

/// The loaded representation of one media identifier.
#[derive(Debug)]
pub struct CachedTexture {
    media: MediaRef,
    source: Box<dyn TextureSource>,
}

impl CachedTexture {
    pub fn still(media: MediaRef, pixels: Arc<RgbaImage>) -> Self {
        Self { media, source: Box::new(StillSource { pixels }) }
    }

    pub fn live(media: MediaRef, element: Arc<dyn MediaElement>) -> Self {
        Self { media, source: Box::new(LiveSource { element }) }
    }

    pub fn media(&self) -> &MediaRef {
        &self.media
    }

    pub fn uri(&self) -> &str {
        self.media.uri()
    }

    pub fn source(&self) -> &dyn TextureSource {
        self.source.as_ref()
    }

    pub fn sample_mode(&self) -> SampleMode {
        self.source.sample_mode()
    }

    pub fn sample(&self, now: Instant) -> Option<TextureFrame> {
        self.source.sample(now)
    }

    pub fn media_element(&self) -> Option<&Arc<dyn MediaElement>> {
        self.source.media_element()
    }

    /// Width over height, 16:9 until the source knows its size.
    pub fn aspect_ratio(&self) -> f32 {
        match self.source.dimensions() {
            Some((w, h)) if w > 0 && h > 0 => w as f32 / h as f32,
            _ => FALLBACK_ASPECT,
        }
    }

    /// True once there are pixels to show. Videos need playback to have
    /// produced a frame.
    pub fn has_frame(&self, now: Instant) -> bool {
        match self.source.sample_mode() {
            SampleMode::Fixed => true,
            SampleMode::CurrentFrame => self.source.sample(now).is_some(),
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        match self.media_element() {
            Some(element) => element.ready_state(),
            None => ReadyState::EnoughData,
        }
    }

    pub fn release(&self) -> bool {
        self.source.release()
    }
}

pub type TextureResult = Result<Arc<CachedTexture>, LoadError>;
pub type SharedLoad = Shared<BoxFuture<'static, TextureResult>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, SharedLoad>,
    resolved: HashMap<String, Arc<CachedTexture>>,
    acquire_calls: HashMap<String, usize>,
    loads_issued: usize,
    closed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheRelease {
    pub textures: usize,
    pub media_elements: usize,
    pub in_flight: usize,
}

pub struct TextureCache {
    source: Arc<dyn MediaSource>,
    state: Arc<Mutex<CacheState>>,
}

impl fmt::Debug for TextureCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("TextureCache")
            .field("entries", &state.entries.len())
            .field("resolved", &state.resolved.len())
            .field("loads_issued", &state.loads_issued)
            .field("closed", &state.closed)
            .finish()
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TextureCache {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self { source, state: Arc::new(Mutex::new(CacheState::default())) }
    }

    /// Texture for `media`. Joins the in-flight or finished load when one
    /// exists for the same identifier.
    pub fn acquire(&self, media: &MediaRef) -> SharedLoad {
        let mut state = lock(&self.state);
        *state.acquire_calls.entry(media.uri().to_string()).or_default() += 1;
        if state.closed {
            let cancelled: TextureResult = Err(LoadError::Cancelled { uri: media.uri().to_string() });
            return future::ready(cancelled).boxed().shared();
        }
        if let Some(existing) = state.entries.get(media.uri()) {
            return existing.clone();
        }
        state.loads_issued += 1;
        let load = Self::load(Arc::clone(&self.source), Arc::clone(&self.state), media.clone()).boxed().shared();
        state.entries.insert(media.uri().to_string(), load.clone());
        load
    }

    async fn load(source: Arc<dyn MediaSource>, state: Arc<Mutex<CacheState>>, media: MediaRef) -> TextureResult {
        let texture = match media.kind() {
            MediaKind::Image => {
                let decoded = source.fetch_image(media.uri()).await?;
                let (width, height) = decoded.dimensions();
                tracing::debug!(uri = media.uri(), width, height, "image decoded");
                CachedTexture::still(media.clone(), decoded.pixels)
            }
            MediaKind::Video => {
                let element = source.open_video(media.uri())?;
                if let Err(err) = element.play() {
                    tracing::warn!("{err}; the clip stays blank until playback starts");
                }
                CachedTexture::live(media.clone(), element)
            }
        };
        let texture = Arc::new(texture);
        let mut guard = lock(&state);
        if guard.closed {
            drop(guard);
            texture.release();
            return Err(LoadError::Cancelled { uri: media.uri().to_string() });
        }
        guard.resolved.insert(media.uri().to_string(), Arc::clone(&texture));
        Ok(texture)
    }

    /// Number of identifiers with a finished, successful load.
    pub fn len(&self) -> usize {
        lock(&self.state).resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, uri: &str) -> bool {
        lock(&self.state).resolved.contains_key(uri)
    }

    pub fn get(&self, uri: &str) -> Option<Arc<CachedTexture>> {
        lock(&self.state).resolved.get(uri).cloned()
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.state).entries.values().filter(|load| load.peek().is_none()).count()
    }

    pub fn loads_issued(&self) -> usize {
        lock(&self.state).loads_issued
    }

    pub fn acquire_calls(&self, uri: &str) -> usize {
        lock(&self.state).acquire_calls.get(uri).copied().unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn media_elements(&self) -> Vec<Arc<dyn MediaElement>> {
        lock(&self.state).resolved.values().filter_map(|texture| texture.media_element().cloned()).collect()
    }

    pub fn live_media_elements(&self) -> usize {
        self.media_elements().iter().filter(|element| !element.is_detached()).count()
    }

    /// Pauses and detaches every element, forgets every texture and refuses
    /// further loads. Loads still running release their own results when they
    /// finish.
    pub fn close(&self) -> CacheRelease {
        let (resolved, in_flight) = {
            let mut state = lock(&self.state);
            state.closed = true;
            let in_flight = state.entries.values().filter(|load| load.peek().is_none()).count();
            state.entries.clear();
            (std::mem::take(&mut state.resolved), in_flight)
        };
        let mut report = CacheRelease { textures: resolved.len(), media_elements: 0, in_flight };
        for texture in resolved.into_values() {
            if texture.release() {
                report.media_elements += 1;
            }
        }
        report
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        if !lock(&self.state).closed {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{ClipElement, ClipFrames, DecodedImage, FetchFuture};
    use image::Rgba;
    use std::time::Duration;

    #[derive(Default)]
    struct StubSource {
        autoplay: bool,
    }

    impl MediaSource for StubSource {
        fn fetch_image(&self, uri: &str) -> FetchFuture<'_> {
            let uri = uri.to_string();
            Box::pin(async move {
                if uri.contains("broken") {
                    return Err(LoadError::failed(uri, "decode error"));
                }
                Ok(DecodedImage::new(RgbaImage::from_pixel(4, 3, Rgba([1, 2, 3, 255]))))
            })
        }

        fn open_video(&self, uri: &str) -> Result<Arc<dyn MediaElement>, LoadError> {
            let frames = ClipFrames::new(vec![(RgbaImage::new(2, 1), Duration::from_millis(50))])
                .map_err(|err| LoadError::failed(uri, err))?;
            Ok(ClipElement::from_frames(uri, frames, self.autoplay))
        }
    }

    fn cache(autoplay: bool) -> TextureCache {
        TextureCache::new(Arc::new(StubSource { autoplay }))
    }

    #[test]
    fn still_texture_reports_aspect() {
        let texture = pollster::block_on(cache(true).acquire(&MediaRef::image("a.png"))).expect("texture");
        assert!((texture.aspect_ratio() - 4.0 / 3.0).abs() < 1e-6);
        assert_eq!(texture.sample_mode(), SampleMode::Fixed);
        assert!(texture.has_frame(Instant::now()));
    }

    #[test]
    fn blocked_video_still_resolves() {
        let cache = cache(false);
        let texture = pollster::block_on(cache.acquire(&MediaRef::video("c.mp4"))).expect("texture");
        assert_eq!(texture.sample_mode(), SampleMode::CurrentFrame);
        assert!(!texture.has_frame(Instant::now()));
        assert_eq!(cache.live_media_elements(), 1);
    }

    #[test]
    fn failed_load_is_shared_not_retried() {
        let cache = cache(true);
        let media = MediaRef::image("broken.jpg");
        assert!(pollster::block_on(cache.acquire(&media)).is_err());
        assert!(pollster::block_on(cache.acquire(&media)).is_err());
        assert_eq!(cache.loads_issued(), 1);
        assert_eq!(cache.acquire_calls("broken.jpg"), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn close_detaches_and_refuses_new_loads() {
        let cache = cache(true);
        let texture = pollster::block_on(cache.acquire(&MediaRef::video("c.mp4"))).expect("texture");
        let release = cache.close();
        assert_eq!(release, CacheRelease { textures: 1, media_elements: 1, in_flight: 0 });
        assert!(texture.media_element().expect("element").is_detached());
        let late = pollster::block_on(cache.acquire(&MediaRef::image("a.png")));
        assert!(matches!(late, Err(LoadError::Cancelled { .. })));
        assert_eq!(cache.loads_issued(), 1);
    }
}
