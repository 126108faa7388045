//! In-memory collaborators for driving a slideshow without a display.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::events::PlayPauseLabel;
use crate::media::{DisplayResource, MediaSource};
use crate::surfaces::{DisplaySurfaces, VideoPosition};
use crate::tasks::slideshow::SessionListener;

/// Source serving fixed bytes (or a not-found error) after an optional delay.
pub struct MemorySource {
    payload: Option<Vec<u8>>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new(payload: &[u8]) -> Arc<Self> {
        Self::build(Some(payload.to_vec()), Duration::ZERO)
    }

    /// A source whose file has disappeared.
    pub fn missing() -> Arc<Self> {
        Self::build(None, Duration::ZERO)
    }

    pub fn delayed(payload: &[u8], delay: Duration) -> Arc<Self> {
        Self::build(Some(payload.to_vec()), delay)
    }

    fn build(payload: Option<Vec<u8>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            payload,
            delay,
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl MediaSource for MemorySource {
    fn fetch(&self) -> BoxFuture<'_, io::Result<Vec<u8>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.payload
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "source removed"))
        })
    }
}

/// Ordered record of visible surface changes.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Loading(bool),
    ImageSource(Option<Vec<u8>>),
    VideoSource(Option<Vec<u8>>),
    PlayVideo,
    PauseVideo,
    ProgressReset,
    ProgressAnimated(Duration),
    ProgressFrozen(bool),
}

/// Current state of every surface plus the op history.
#[derive(Debug, Clone, Default)]
pub struct SurfaceLog {
    pub ops: Vec<SurfaceOp>,
    pub loading: bool,
    pub image_visible: bool,
    pub image_source: Option<DisplayResource>,
    pub image_fading: bool,
    pub video_visible: bool,
    pub video_source: Option<DisplayResource>,
    pub video_fading: bool,
    pub video_playing: bool,
    pub video_clock: Option<VideoPosition>,
    pub play_calls: usize,
    pub progress_percent: f64,
    pub progress_animation: Option<Duration>,
    pub progress_frozen: bool,
    pub label: Option<PlayPauseLabel>,
}

impl SurfaceLog {
    pub fn image_bytes(&self) -> Option<&[u8]> {
        self.image_source.as_ref().map(DisplayResource::bytes)
    }

    pub fn video_bytes(&self) -> Option<&[u8]> {
        self.video_source.as_ref().map(DisplayResource::bytes)
    }
}

/// Surfaces that only record; pair with the [`SurfaceMonitor`] from [`RecordingSurfaces::new`].
pub struct RecordingSurfaces {
    log: Arc<Mutex<SurfaceLog>>,
}

/// Test-side view of a [`RecordingSurfaces`].
#[derive(Clone)]
pub struct SurfaceMonitor {
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurfaces {
    pub fn new() -> (Self, SurfaceMonitor) {
        let log = Arc::new(Mutex::new(SurfaceLog::default()));
        (Self { log: log.clone() }, SurfaceMonitor { log })
    }
}

impl SurfaceMonitor {
    pub fn snapshot(&self) -> SurfaceLog {
        self.log.lock().clone()
    }

    /// Move the simulated video clock.
    pub fn set_video_clock(&self, current_secs: f64, duration_secs: f64) {
        self.log.lock().video_clock = Some(VideoPosition {
            current_secs,
            duration_secs,
        });
    }

    /// Simulate the video stopping on its own (end of stream).
    pub fn stop_video(&self) {
        self.log.lock().video_playing = false;
    }
}

impl DisplaySurfaces for RecordingSurfaces {
    fn set_loading(&mut self, visible: bool) {
        let mut log = self.log.lock();
        log.loading = visible;
        log.ops.push(SurfaceOp::Loading(visible));
    }

    fn set_image_visible(&mut self, visible: bool) {
        self.log.lock().image_visible = visible;
    }

    fn set_image_source(&mut self, resource: Option<&DisplayResource>) {
        let mut log = self.log.lock();
        log.image_source = resource.cloned();
        log.ops
            .push(SurfaceOp::ImageSource(resource.map(|r| r.bytes().to_vec())));
    }

    fn set_image_fading(&mut self, fading: bool) {
        self.log.lock().image_fading = fading;
    }

    fn set_video_visible(&mut self, visible: bool) {
        self.log.lock().video_visible = visible;
    }

    fn set_video_source(&mut self, resource: Option<&DisplayResource>) {
        let mut log = self.log.lock();
        log.video_source = resource.cloned();
        log.video_playing = false;
        log.video_clock = None;
        log.ops
            .push(SurfaceOp::VideoSource(resource.map(|r| r.bytes().to_vec())));
    }

    fn set_video_fading(&mut self, fading: bool) {
        self.log.lock().video_fading = fading;
    }

    fn play_video(&mut self) -> Result<()> {
        let mut log = self.log.lock();
        log.play_calls += 1;
        log.ops.push(SurfaceOp::PlayVideo);
        if log.video_source.is_none() {
            bail!("no video source");
        }
        log.video_playing = true;
        Ok(())
    }

    fn pause_video(&mut self) {
        let mut log = self.log.lock();
        log.video_playing = false;
        log.ops.push(SurfaceOp::PauseVideo);
    }

    fn video_position(&self) -> Option<VideoPosition> {
        self.log.lock().video_clock
    }

    fn video_playing(&self) -> bool {
        self.log.lock().video_playing
    }

    fn reset_progress(&mut self) {
        let mut log = self.log.lock();
        log.progress_percent = 0.0;
        log.progress_animation = None;
        log.progress_frozen = false;
        log.ops.push(SurfaceOp::ProgressReset);
    }

    fn set_progress(&mut self, percent: f64) {
        self.log.lock().progress_percent = percent;
    }

    fn animate_progress(&mut self, over: Duration) {
        let mut log = self.log.lock();
        log.progress_animation = Some(over);
        log.ops.push(SurfaceOp::ProgressAnimated(over));
    }

    fn freeze_progress(&mut self, frozen: bool) {
        let mut log = self.log.lock();
        log.progress_frozen = frozen;
        log.ops.push(SurfaceOp::ProgressFrozen(frozen));
    }

    fn set_play_pause_label(&mut self, label: PlayPauseLabel) {
        self.log.lock().label = Some(label);
    }
}

/// Listener that records every callback.
#[derive(Clone, Default)]
pub struct RecordingListener {
    inner: Arc<Mutex<ListenerLog>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListenerLog {
    pub file_changes: Vec<String>,
    pub ends: usize,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ListenerLog {
        self.inner.lock().clone()
    }
}

impl SessionListener for RecordingListener {
    fn on_file_change(&mut self, name: &str) {
        self.inner.lock().file_changes.push(name.to_string());
    }

    fn on_end(&mut self) {
        self.inner.lock().ends += 1;
    }
}
