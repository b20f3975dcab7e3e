//! One activation of the globe: loads, readiness, scene and teardown.
//!
//! Loads run on the tokio runtime and report back over a channel. The scene
//! graph and the readiness gate are only touched from [`GlobeSession::pump`],
//! which the render loop calls between frames.

use crate::cache::{CachedTexture, TextureCache};
use crate::catalog::{MediaCatalog, MediaKind, MediaRef};
use crate::config::AppConfig;
use crate::error::LoadError;
use crate::layout::{self, Placement};
use crate::media::{MediaSource, ReadyState};
use crate::readiness::{LoadCounts, ReadinessGate};
use crate::scene::{Ambience, GlobeScene};
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum LoadEvent {
    Loaded { slot: usize, texture: Arc<CachedTexture> },
    Failed { slot: usize, error: LoadError },
}

/// Handle on the running frame loop. Cancelling it stops the loop and every
/// load spawned under it.
#[derive(Debug, Clone)]
pub struct ActiveLoop {
    token: CancellationToken,
    started_at: Instant,
}

impl ActiveLoop {
    pub fn start(now: Instant) -> Self {
        Self { token: CancellationToken::new(), started_at: now }
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

/// What a teardown released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub tiles: usize,
    pub textures: usize,
    pub media_elements: usize,
    pub cancelled_loads: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub tiles: usize,
    pub cached_textures: usize,
    pub live_media_elements: usize,
}

/// A loaded video that still owes a tile, a readiness signal, or both.
#[derive(Debug)]
struct PendingVideo {
    slot: usize,
    texture: Arc<CachedTexture>,
    attached: bool,
}

pub struct GlobeSession {
    cache: Arc<TextureCache>,
    slots: Vec<MediaRef>,
    placements: Vec<Placement>,
    gate: ReadinessGate,
    scene: GlobeScene,
    pending_videos: Vec<PendingVideo>,
    timeouts: Vec<LoadError>,
    events: mpsc::UnboundedReceiver<LoadEvent>,
    tasks: Vec<JoinHandle<()>>,
    active: ActiveLoop,
    teardown: Option<TeardownReport>,
}

impl GlobeSession {
    /// Lays out the slots, builds the ambience and spawns one load per slot.
    /// Returns before any load completes.
    pub fn activate<R: Rng + ?Sized>(
        config: &AppConfig,
        catalog: &MediaCatalog,
        source: Arc<dyn MediaSource>,
        runtime: &Handle,
        rng: &mut R,
        now: Instant,
    ) -> Self {
        let count = if catalog.is_empty() { 0 } else { config.globe.tile_count };
        let slots: Vec<MediaRef> = catalog.slots(count).into_iter().cloned().collect();
        let placements = layout::layout(slots.len(), config.globe.radius, config.globe.max_roll_radians, rng);
        let gate = ReadinessGate::new(
            slots.iter().map(MediaRef::kind),
            now,
            config.loading.video_ready_timeout(),
            config.loading.global_ready_timeout(),
        );
        let ambience = Ambience::from_config(&config.ambience, &config.globe, rng);
        let scene = GlobeScene::new(&config.globe, ambience);
        let cache = Arc::new(TextureCache::new(source));
        let active = ActiveLoop::start(now);
        let (sender, events) = mpsc::unbounded_channel();

        let tasks = slots
            .iter()
            .enumerate()
            .map(|(slot, media)| {
                let load = cache.acquire(media);
                let sender = sender.clone();
                let token = active.token();
                runtime.spawn(async move {
                    let event = tokio::select! {
                        _ = token.cancelled() => return,
                        result = load => match result {
                            Ok(texture) => LoadEvent::Loaded { slot, texture },
                            Err(error) => LoadEvent::Failed { slot, error },
                        },
                    };
                    if sender.send(event).is_err() {
                        tracing::trace!(slot, "session closed; load result dropped");
                    }
                })
            })
            .collect();

        tracing::info!(
            tiles = slots.len(),
            unique = catalog.len(),
            videos = slots.iter().filter(|media| media.is_video()).count(),
            "globe activated"
        );
        if catalog.is_empty() {
            tracing::warn!("media catalog is empty; showing ambience only");
        }

        Self {
            cache,
            slots,
            placements,
            gate,
            scene,
            pending_videos: Vec::new(),
            timeouts: Vec::new(),
            events,
            tasks,
            active,
            teardown: None,
        }
    }

    /// Applies every completion received since the last call, then checks
    /// the readiness deadlines. Returns true on the call that flips the gate.
    pub fn pump(&mut self, now: Instant) -> bool {
        if !self.is_active() {
            return false;
        }
        let mut flipped = false;
        while let Ok(event) = self.events.try_recv() {
            flipped |= self.apply(event, now);
        }
        flipped |= self.watch_videos(now);
        flipped |= self.gate.poll(now);
        self.record_timeouts();
        if flipped {
            let counts = self.gate.counts();
            tracing::info!(
                elapsed_ms = now.saturating_duration_since(self.gate.activated_at()).as_millis() as u64,
                ready = counts.ready,
                failed = counts.failed,
                timed_out = counts.timed_out,
                pending = counts.pending,
                "globe ready"
            );
        }
        flipped
    }

    fn apply(&mut self, event: LoadEvent, now: Instant) -> bool {
        match event {
            LoadEvent::Loaded { slot, texture } => match self.slots.get(slot).map(MediaRef::kind) {
                Some(MediaKind::Image) => {
                    self.attach(slot, texture);
                    self.gate.mark_ready(slot, now)
                }
                Some(MediaKind::Video) => {
                    self.pending_videos.push(PendingVideo { slot, texture, attached: false });
                    false
                }
                None => false,
            },
            LoadEvent::Failed { slot, error } => {
                if error.is_cancelled() {
                    tracing::debug!(slot, "{error}");
                    return false;
                }
                tracing::warn!(slot, "{error}; skipping tile");
                self.gate.mark_failed(slot, now)
            }
        }
    }

    fn record_timeouts(&mut self) {
        let waited = self.gate.video_wait();
        for slot in self.gate.take_timed_out() {
            let Some(media) = self.slots.get(slot) else {
                continue;
            };
            let error = LoadError::LoadTimedOut { uri: media.uri().to_string(), waited };
            tracing::warn!(slot, "{error}; counting it as settled");
            self.timeouts.push(error);
        }
    }

    /// Videos get their tile once playback produces a frame and report
    /// readiness from the element's ready state.
    fn watch_videos(&mut self, now: Instant) -> bool {
        let mut flipped = false;
        let mut attach = Vec::new();
        for pending in &mut self.pending_videos {
            match pending.texture.ready_state() {
                ReadyState::Errored => {
                    tracing::warn!(slot = pending.slot, uri = pending.texture.uri(), "video element error");
                    flipped |= self.gate.mark_failed(pending.slot, now);
                }
                state if state.can_play_through() => flipped |= self.gate.mark_ready(pending.slot, now),
                _ => {}
            }
            if !pending.attached && pending.texture.has_frame(now) {
                pending.attached = true;
                attach.push((pending.slot, Arc::clone(&pending.texture)));
            }
        }
        for (slot, texture) in attach {
            self.attach(slot, texture);
        }
        let gate = &self.gate;
        self.pending_videos.retain(|pending| {
            let settled = gate.state(pending.slot).is_some_and(|state| state.is_terminal());
            let dead = pending.texture.ready_state() == ReadyState::Errored;
            !(dead || (settled && pending.attached))
        });
        flipped
    }

    fn attach(&mut self, slot: usize, texture: Arc<CachedTexture>) {
        let Some(placement) = self.placements.get(slot).copied() else {
            return;
        };
        if self.scene.attach(placement, texture) {
            tracing::trace!(slot, "tile attached");
        }
    }

    /// Lifts the autoplay block after a user gesture and restarts every
    /// element that was refused.
    pub fn resume_playback(&self) -> usize {
        let mut resumed = 0;
        for element in self.cache.media_elements() {
            element.allow_playback();
            if element.is_playing() || element.is_detached() {
                continue;
            }
            match element.play() {
                Ok(()) => resumed += 1,
                Err(err) => tracing::debug!("{err}"),
            }
        }
        if resumed > 0 {
            tracing::info!(resumed, "playback resumed after user gesture");
        }
        resumed
    }

    /// Cancels the loop and every load, detaches every tile, pauses and
    /// detaches every element and empties the cache. Safe to call repeatedly;
    /// later calls release nothing.
    pub fn teardown(&mut self) -> TeardownReport {
        if self.teardown.is_some() {
            return TeardownReport::default();
        }
        self.active.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.events.close();
        while self.events.try_recv().is_ok() {}
        self.pending_videos.clear();
        let tiles = self.scene.clear();
        let release = self.cache.close();
        let report = TeardownReport {
            tiles,
            textures: release.textures,
            media_elements: release.media_elements,
            cancelled_loads: release.in_flight,
        };
        tracing::info!(
            tiles = report.tiles,
            textures = report.textures,
            media_elements = report.media_elements,
            cancelled_loads = report.cancelled_loads,
            "globe torn down"
        );
        self.teardown = Some(report);
        report
    }

    pub fn is_active(&self) -> bool {
        self.teardown.is_none() && self.active.is_active()
    }

    pub fn active_loop(&self) -> &ActiveLoop {
        &self.active
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Coarse loading affordance: true until the gate flips.
    pub fn is_loading(&self) -> bool {
        !self.gate.is_ready()
    }

    pub fn load_counts(&self) -> LoadCounts {
        self.gate.counts()
    }

    /// Videos the gate stopped waiting for, in the order they timed out.
    pub fn timeouts(&self) -> &[LoadError] {
        &self.timeouts
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn scene(&self) -> &GlobeScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut GlobeScene {
        &mut self.scene
    }

    pub fn cache(&self) -> &TextureCache {
        &self.cache
    }

    pub fn slots(&self) -> &[MediaRef] {
        &self.slots
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn resource_counts(&self) -> ResourceCounts {
        ResourceCounts {
            tiles: self.scene.len(),
            cached_textures: self.cache.len(),
            live_media_elements: self.cache.live_media_elements(),
        }
    }
}

impl Drop for GlobeSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
