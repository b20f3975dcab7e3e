use super::{MediaElement, ReadyState, VideoFrame};
use crate::error::LoadError;
use anyhow::{anyhow, bail, Result};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, Frame, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Browsers treat tiny GIF delays as this value.
const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);
const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// A fully decoded looping clip.
#[derive(Debug)]
pub struct ClipFrames {
    frames: Vec<Arc<RgbaImage>>,
    starts: Vec<Duration>,
    total: Duration,
    width: u32,
    height: u32,
}

impl ClipFrames {
    pub fn new(frames: Vec<(RgbaImage, Duration)>) -> Result<Self> {
        let Some((first, _)) = frames.first() else {
            bail!("clip contains no frames");
        };
        let (width, height) = first.dimensions();
        let mut starts = Vec::with_capacity(frames.len());
        let mut images = Vec::with_capacity(frames.len());
        let mut total = Duration::ZERO;
        for (image, delay) in frames {
            starts.push(total);
            total += delay.max(MIN_FRAME_DELAY);
            images.push(Arc::new(image));
        }
        Ok(Self { frames: images, starts, total, width, height })
    }

    /// Sniffs the container and decodes every frame.
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let format = image::guess_format(&bytes).map_err(|err| anyhow!("unrecognized clip container: {err}"))?;
        let frames = match format {
            ImageFormat::Gif => collect(GifDecoder::new(Cursor::new(bytes))?.into_frames().collect_frames()?),
            ImageFormat::Png => {
                let decoder = PngDecoder::new(Cursor::new(&bytes))?;
                if decoder.is_apng()? {
                    collect(decoder.apng()?.into_frames().collect_frames()?)
                } else {
                    single(&bytes)?
                }
            }
            ImageFormat::WebP => {
                let decoder = WebPDecoder::new(Cursor::new(&bytes))?;
                if decoder.has_animation() {
                    collect(decoder.into_frames().collect_frames()?)
                } else {
                    single(&bytes)?
                }
            }
            other => bail!("clip container {other:?} is not playable"),
        };
        Self::new(frames)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn duration(&self) -> Duration {
        self.total
    }

    /// Frame shown at `position`, looping forever.
    pub fn frame_at(&self, position: Duration) -> VideoFrame {
        let total = self.total.as_nanos().max(1);
        let nanos = position.as_nanos();
        let loops = (nanos / total) as u64;
        let offset = Duration::from_nanos((nanos % total) as u64);
        let index = match self.starts.binary_search(&offset) {
            Ok(index) => index,
            Err(insert) => insert.saturating_sub(1),
        };
        let version = loops * self.frames.len() as u64 + index as u64 + 1;
        VideoFrame { version, pixels: Arc::clone(&self.frames[index]) }
    }
}

fn collect(frames: Vec<Frame>) -> Vec<(RgbaImage, Duration)> {
    frames
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let delay = if numer == 0 || denom == 0 {
                DEFAULT_FRAME_DELAY
            } else {
                Duration::from_secs_f64(numer as f64 / denom as f64 / 1000.0)
            };
            (frame.into_buffer(), delay)
        })
        .collect()
}

fn single(bytes: &[u8]) -> Result<Vec<(RgbaImage, Duration)>> {
    Ok(vec![(image::load_from_memory(bytes)?.to_rgba8(), DEFAULT_FRAME_DELAY)])
}

#[derive(Debug)]
struct ClipState {
    ready: ReadyState,
    frames: Option<Arc<ClipFrames>>,
    playing: bool,
    autoplay_allowed: bool,
    /// Wall clock at which playback last (re)started.
    started_at: Option<Instant>,
    /// Position accumulated before the last pause.
    position: Duration,
    detached: bool,
    decode_task: Option<JoinHandle<()>>,
}

/// Native media element: decodes an animated clip in the background and
/// serves whichever frame the wall clock lands on.
#[derive(Debug)]
pub struct ClipElement {
    uri: String,
    state: Mutex<ClipState>,
}

impl ClipElement {
    fn with_state(uri: impl Into<String>, autoplay_allowed: bool) -> Arc<Self> {
        Arc::new(Self {
            uri: uri.into(),
            state: Mutex::new(ClipState {
                ready: ReadyState::Nothing,
                frames: None,
                playing: false,
                autoplay_allowed,
                started_at: None,
                position: Duration::ZERO,
                detached: false,
                decode_task: None,
            }),
        })
    }

    /// Opens `path` and starts decoding on `runtime`.
    pub fn open(uri: impl Into<String>, path: PathBuf, runtime: &Handle, autoplay_allowed: bool) -> Arc<Self> {
        let element = Self::with_state(uri, autoplay_allowed);
        let weak = Arc::downgrade(&element);
        let task = runtime.spawn(async move {
            let decoded = match tokio::fs::read(&path).await {
                Ok(bytes) => tokio::task::spawn_blocking(move || ClipFrames::decode(bytes))
                    .await
                    .unwrap_or_else(|err| Err(anyhow!("clip decoder panicked: {err}"))),
                Err(err) => Err(anyhow!("failed to read {}: {err}", path.display())),
            };
            if let Some(element) = weak.upgrade() {
                element.finish_decode(decoded);
            }
        });
        element.lock().decode_task = Some(task);
        element
    }

    /// Element over frames that are already decoded.
    pub fn from_frames(uri: impl Into<String>, frames: ClipFrames, autoplay_allowed: bool) -> Arc<Self> {
        let element = Self::with_state(uri, autoplay_allowed);
        element.finish_decode(Ok(frames));
        element
    }

    fn lock(&self) -> MutexGuard<'_, ClipState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_decode(&self, decoded: Result<ClipFrames>) {
        let mut state = self.lock();
        state.decode_task = None;
        if state.detached {
            return;
        }
        match decoded {
            Ok(frames) => {
                tracing::debug!(
                    uri = %self.uri,
                    frames = frames.len(),
                    duration_ms = frames.duration().as_millis() as u64,
                    "clip decoded"
                );
                state.frames = Some(Arc::new(frames));
                state.ready = ReadyState::EnoughData;
            }
            Err(err) => {
                tracing::warn!(uri = %self.uri, "clip element error: {err:#}");
                state.ready = ReadyState::Errored;
                state.playing = false;
            }
        }
    }

    fn position(state: &ClipState, now: Instant) -> Duration {
        match (state.playing, state.started_at) {
            (true, Some(start)) => state.position + now.saturating_duration_since(start),
            _ => state.position,
        }
    }
}

impl MediaElement for ClipElement {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn play(&self) -> Result<(), LoadError> {
        let mut state = self.lock();
        if state.detached {
            return Err(LoadError::PlaybackBlocked { uri: self.uri.clone(), reason: "element detached".into() });
        }
        if !state.autoplay_allowed {
            return Err(LoadError::PlaybackBlocked {
                uri: self.uri.clone(),
                reason: "autoplay requires a user gesture".into(),
            });
        }
        if !state.playing {
            state.playing = true;
            state.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.lock();
        if state.playing {
            state.position = Self::position(&state, Instant::now());
            state.playing = false;
            state.started_at = None;
        }
    }

    fn detach(&self) {
        let mut state = self.lock();
        if state.detached {
            return;
        }
        state.detached = true;
        state.playing = false;
        state.started_at = None;
        state.frames = None;
        if let Some(task) = state.decode_task.take() {
            task.abort();
        }
    }

    fn is_detached(&self) -> bool {
        self.lock().detached
    }

    fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn ready_state(&self) -> ReadyState {
        self.lock().ready
    }

    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        self.lock().frames.as_ref().map(|frames| frames.dimensions())
    }

    fn current_frame(&self, now: Instant) -> Option<VideoFrame> {
        let state = self.lock();
        let frames = state.frames.as_ref()?;
        if !state.playing && state.position.is_zero() {
            return None;
        }
        Some(frames.frame_at(Self::position(&state, now)))
    }

    fn allow_playback(&self) {
        self.lock().autoplay_allowed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(4, 2, Rgba([value, value, value, 255]))
    }

    fn three_frame_clip() -> ClipFrames {
        ClipFrames::new(vec![
            (solid(10), Duration::from_millis(100)),
            (solid(20), Duration::from_millis(100)),
            (solid(30), Duration::from_millis(200)),
        ])
        .expect("frames")
    }

    #[test]
    fn frame_lookup_loops() {
        let clip = three_frame_clip();
        assert_eq!(clip.duration(), Duration::from_millis(400));
        assert_eq!(clip.frame_at(Duration::from_millis(0)).pixels.get_pixel(0, 0)[0], 10);
        assert_eq!(clip.frame_at(Duration::from_millis(150)).pixels.get_pixel(0, 0)[0], 20);
        assert_eq!(clip.frame_at(Duration::from_millis(399)).pixels.get_pixel(0, 0)[0], 30);
        let wrapped = clip.frame_at(Duration::from_millis(450));
        assert_eq!(wrapped.pixels.get_pixel(0, 0)[0], 10);
        assert_eq!(wrapped.version, 4);
    }

    #[test]
    fn empty_clip_is_rejected() {
        assert!(ClipFrames::new(Vec::new()).is_err());
    }

    #[test]
    fn unknown_container_fails_to_decode() {
        let err = ClipFrames::decode(b"\x00\x00\x00\x18ftypmp42".to_vec()).unwrap_err();
        assert!(err.to_string().contains("clip"), "unexpected error: {err}");
    }

    #[test]
    fn blocked_autoplay_shows_nothing_until_gesture() {
        let element = ClipElement::from_frames("clips/a.gif", three_frame_clip(), false);
        assert_eq!(element.ready_state(), ReadyState::EnoughData);
        assert!(matches!(element.play(), Err(LoadError::PlaybackBlocked { .. })));
        assert!(element.current_frame(Instant::now()).is_none());
        element.allow_playback();
        element.play().expect("play after gesture");
        assert!(element.current_frame(Instant::now()).is_some());
    }

    #[test]
    fn detach_drops_frames_and_blocks_play() {
        let element = ClipElement::from_frames("clips/a.gif", three_frame_clip(), true);
        element.play().expect("play");
        element.detach();
        element.detach();
        assert!(element.is_detached());
        assert!(!element.is_playing());
        assert!(element.intrinsic_size().is_none());
        assert!(element.play().is_err());
    }

    #[test]
    fn paused_clip_freezes_on_current_frame() {
        let element = ClipElement::from_frames("clips/a.gif", three_frame_clip(), true);
        element.play().expect("play");
        std::thread::sleep(Duration::from_millis(5));
        element.pause();
        let later = Instant::now() + Duration::from_secs(3);
        let a = element.current_frame(later).expect("frozen frame");
        let b = element.current_frame(later + Duration::from_secs(1)).expect("frozen frame");
        assert_eq!(a.version, b.version);
    }
}
