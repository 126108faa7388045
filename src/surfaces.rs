//! Render targets the slideshow writes to.

use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::events::{PlayPauseLabel, SurfaceEvent};
use crate::media::DisplayResource;

/// Playback clock of the video surface, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoPosition {
    pub current_secs: f64,
    /// May be non-finite or zero while the source is still loading.
    pub duration_secs: f64,
}

impl VideoPosition {
    /// Elapsed fraction as a percentage, when the duration is known.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        (self.duration_secs.is_finite() && self.duration_secs > 0.0)
            .then(|| self.current_secs / self.duration_secs * 100.0)
    }
}

/// Passive display targets: image and video surfaces, the loading
/// indicator, the progress fill and the play/pause label.
///
/// Implementations report the end of video playback by sending
/// [`SurfaceEvent::VideoEnded`] on the channel the session listens to.
pub trait DisplaySurfaces: Send {
    fn set_loading(&mut self, visible: bool);

    fn set_image_visible(&mut self, visible: bool);
    /// `None` clears the source.
    fn set_image_source(&mut self, resource: Option<&DisplayResource>);
    fn set_image_fading(&mut self, fading: bool);

    fn set_video_visible(&mut self, visible: bool);
    /// `None` clears the source.
    fn set_video_source(&mut self, resource: Option<&DisplayResource>);
    fn set_video_fading(&mut self, fading: bool);
    fn play_video(&mut self) -> Result<()>;
    fn pause_video(&mut self);
    fn video_position(&self) -> Option<VideoPosition>;
    fn video_playing(&self) -> bool;

    /// Stop any fill animation and empty the progress indicator.
    fn reset_progress(&mut self);
    fn set_progress(&mut self, percent: f64);
    /// Animate the fill from its current width to full over `over`.
    fn animate_progress(&mut self, over: Duration);
    /// Freeze or release the fill animation without changing its width.
    fn freeze_progress(&mut self, frozen: bool);

    fn set_play_pause_label(&mut self, label: PlayPauseLabel);
}

/// Surfaces that render nothing and log what would be shown.
///
/// Videos run on a simulated clock of fixed nominal length so the session
/// sees the same playing/paused/ended behavior a real player gives it.
pub struct HeadlessSurfaces {
    events: Sender<SurfaceEvent>,
    video_length: Duration,
    video_loaded: bool,
    played: Duration,
    playing_since: Option<Instant>,
    end_task: Option<JoinHandle<()>>,
}

impl HeadlessSurfaces {
    pub fn new(events: Sender<SurfaceEvent>, video_length: Duration) -> Self {
        Self {
            events,
            video_length,
            video_loaded: false,
            played: Duration::ZERO,
            playing_since: None,
            end_task: None,
        }
    }

    fn position(&self) -> Duration {
        let running = self.playing_since.map_or(Duration::ZERO, |t| t.elapsed());
        (self.played + running).min(self.video_length)
    }

    fn stop_clock(&mut self) {
        self.played = self.position();
        self.playing_since = None;
        if let Some(task) = self.end_task.take() {
            task.abort();
        }
    }

    fn reset_clock(&mut self) {
        self.stop_clock();
        self.played = Duration::ZERO;
    }
}

impl Drop for HeadlessSurfaces {
    fn drop(&mut self) {
        if let Some(task) = self.end_task.take() {
            task.abort();
        }
    }
}

impl DisplaySurfaces for HeadlessSurfaces {
    fn set_loading(&mut self, visible: bool) {
        debug!(visible, "loading indicator");
    }

    fn set_image_visible(&mut self, visible: bool) {
        debug!(visible, "image surface");
    }

    fn set_image_source(&mut self, resource: Option<&DisplayResource>) {
        match resource {
            Some(res) => info!(format = %res.format().tag, bytes = res.bytes().len(), "image on screen"),
            None => debug!("image source cleared"),
        }
    }

    fn set_image_fading(&mut self, fading: bool) {
        debug!(fading, "image fade");
    }

    fn set_video_visible(&mut self, visible: bool) {
        debug!(visible, "video surface");
    }

    fn set_video_source(&mut self, resource: Option<&DisplayResource>) {
        self.reset_clock();
        self.video_loaded = resource.is_some();
        match resource {
            Some(res) => info!(format = %res.format().tag, bytes = res.bytes().len(), "video on screen"),
            None => debug!("video source cleared"),
        }
    }

    fn set_video_fading(&mut self, fading: bool) {
        debug!(fading, "video fade");
    }

    fn play_video(&mut self) -> Result<()> {
        if !self.video_loaded {
            bail!("no video source loaded");
        }
        if self.playing_since.is_some() {
            return Ok(());
        }
        let remaining = self.video_length.saturating_sub(self.position());
        self.playing_since = Some(Instant::now());
        let events = self.events.clone();
        self.end_task = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let _ = events.send(SurfaceEvent::VideoEnded).await;
        }));
        debug!(remaining_ms = remaining.as_millis() as u64, "video playing");
        Ok(())
    }

    fn pause_video(&mut self) {
        if self.playing_since.is_some() {
            self.stop_clock();
            debug!(position_ms = self.played.as_millis() as u64, "video paused");
        }
    }

    fn video_position(&self) -> Option<VideoPosition> {
        self.video_loaded.then(|| VideoPosition {
            current_secs: self.position().as_secs_f64(),
            duration_secs: self.video_length.as_secs_f64(),
        })
    }

    fn video_playing(&self) -> bool {
        self.playing_since.is_some() && self.position() < self.video_length
    }

    fn reset_progress(&mut self) {
        debug!("progress reset");
    }

    fn set_progress(&mut self, _percent: f64) {}

    fn animate_progress(&mut self, over: Duration) {
        debug!(over_ms = over.as_millis() as u64, "progress animating");
    }

    fn freeze_progress(&mut self, frozen: bool) {
        debug!(frozen, "progress frozen");
    }

    fn set_play_pause_label(&mut self, label: PlayPauseLabel) {
        info!(?label, "play/pause");
    }
}
