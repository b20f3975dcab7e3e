//! Media backends: how a URI becomes decoded pixels or a playing clip.

use crate::error::LoadError;
use image::RgbaImage;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

pub mod clip;
pub mod fs_source;

pub use clip::{ClipElement, ClipFrames};
pub use fs_source::FsMediaSource;

/// Readiness ladder of a media element, mirroring how far decoding has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Nothing,
    Metadata,
    CurrentData,
    /// Enough is buffered to play through to the end.
    EnoughData,
    Errored,
}

impl ReadyState {
    pub fn can_play_through(self) -> bool {
        self == ReadyState::EnoughData
    }
}

/// One decoded frame. `version` changes whenever the pixels do.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub version: u64,
    pub pixels: Arc<RgbaImage>,
}

/// A hidden, muted, looping clip player bound to one URI.
pub trait MediaElement: Send + Sync + fmt::Debug {
    fn uri(&self) -> &str;

    /// Starts or resumes playback. Rejected with `PlaybackBlocked` while the
    /// autoplay policy forbids it.
    fn play(&self) -> Result<(), LoadError>;

    fn pause(&self);

    /// Stops decoding and drops buffered frames. Idempotent.
    fn detach(&self);

    fn is_detached(&self) -> bool;

    fn is_playing(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    fn intrinsic_size(&self) -> Option<(u32, u32)>;

    /// Frame at the current playback position, `None` until playback has
    /// produced one.
    fn current_frame(&self, now: Instant) -> Option<VideoFrame>;

    /// Lifts an autoplay block after a user gesture.
    fn allow_playback(&self) {}
}

#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: Arc<RgbaImage>,
}

impl DecodedImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels: Arc::new(pixels) }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<DecodedImage, LoadError>> + Send + 'a>>;

/// Where media comes from. The native build reads a directory; tests script
/// their own.
pub trait MediaSource: Send + Sync {
    fn fetch_image(&self, uri: &str) -> FetchFuture<'_>;

    fn open_video(&self, uri: &str) -> Result<Arc<dyn MediaElement>, LoadError>;
}
