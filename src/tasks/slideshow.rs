//! Playback state machine.
//!
//! One task owns every piece of session state. Timers, transition delays,
//! resolutions and the video progress sampler run as spawned tasks that post
//! tagged messages back into the loop, so all mutation happens in one place:
//! - resolutions and transition steps carry the generation of the
//!   `show_current` call that started them and are dropped once stale;
//! - timer expiries and sampler frames carry the id of the task that sent
//!   them and are dropped unless that task is still armed.
//!
//! Task handles abort on drop, so clearing a slot cancels the task and
//! re-arming a slot always cancels its previous occupant.

mod state;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::ResourceCache;
use crate::config::PlaybackConfig;
use crate::error::MediaLoadError;
use crate::events::{PlayPauseLabel, PlaybackStatus, PlayerCommand, SurfaceEvent};
use crate::media::{DisplayResource, MediaItem, MediaKind};
use crate::prefetch::{self, DEFAULT_PREFETCH_COUNT};
use crate::surfaces::DisplaySurfaces;
use state::{Cursor, Step};

/// Fade-out before the new source is swapped in.
const FADE_OUT: Duration = Duration::from_millis(150);
/// Delay between the swap and clearing the fade.
const SETTLE: Duration = Duration::from_millis(50);
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Session callbacks.
pub trait SessionListener: Send {
    /// Called at the start of every slide change, before the item resolves.
    fn on_file_change(&mut self, name: &str);

    /// Called at most once per session, when forward navigation runs past
    /// the last item without looping.
    fn on_end(&mut self);
}

/// Listener that only logs.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl SessionListener for LoggingListener {
    fn on_file_change(&mut self, name: &str) {
        info!(item = %name, "now showing");
    }

    fn on_end(&mut self) {
        info!("slideshow finished");
    }
}

/// How a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub last_index: usize,
    /// `true` when playback ran off the end; `false` on stop or cancel.
    pub reached_end: bool,
}

#[derive(Debug)]
enum Internal {
    Resolved {
        generation: u64,
        result: Result<DisplayResource, MediaLoadError>,
    },
    Swap {
        generation: u64,
        resource: DisplayResource,
    },
    Settle {
        generation: u64,
    },
    DurationElapsed {
        task: u64,
    },
    Frame {
        task: u64,
    },
}

struct ScheduledTask {
    id: u64,
    handle: JoinHandle<()>,
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Loading,
    ShowingImage,
    ShowingVideo,
    Ended,
}

pub struct Slideshow<S, L> {
    items: Arc<[Arc<MediaItem>]>,
    config: PlaybackConfig,
    prefetch_count: usize,
    cache: Arc<ResourceCache>,
    surfaces: S,
    listener: L,
    cursor: Cursor,
    phase: Phase,
    paused: bool,
    generation: u64,
    next_task_id: u64,
    /// Indices that failed to resolve since the last successful slide.
    failed: HashSet<usize>,
    /// Resolutions and prefetches; aborted on teardown.
    background: JoinSet<()>,
    /// Set once the current video's source is on the surface; only then does
    /// an "ended" event belong to the current slide.
    video_armed: bool,
    timer: Option<ScheduledTask>,
    sampler: Option<ScheduledTask>,
    transition: Option<ScheduledTask>,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: Option<mpsc::Receiver<Internal>>,
    status_tx: watch::Sender<PlaybackStatus>,
}

impl<S: DisplaySurfaces, L: SessionListener> Slideshow<S, L> {
    /// # Errors
    /// Fails on an empty collection or a zero image duration.
    pub fn new(
        items: Vec<Arc<MediaItem>>,
        config: PlaybackConfig,
        cache: Arc<ResourceCache>,
        surfaces: S,
        listener: L,
    ) -> Result<Self> {
        ensure!(!items.is_empty(), "a slideshow needs at least one item");
        ensure!(
            config.duration_seconds >= 1,
            "image duration must be at least one second"
        );
        let (internal_tx, internal_rx) = mpsc::channel(32);
        let (status_tx, _) = watch::channel(PlaybackStatus::Idle);
        Ok(Self {
            cursor: Cursor::new(items.len(), config.loop_playback),
            items: items.into(),
            config,
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            cache,
            surfaces,
            listener,
            phase: Phase::Idle,
            paused: false,
            generation: 0,
            next_task_id: 0,
            failed: HashSet::new(),
            background: JoinSet::new(),
            video_armed: false,
            timer: None,
            sampler: None,
            transition: None,
            internal_tx,
            internal_rx: Some(internal_rx),
            status_tx,
        })
    }

    #[must_use]
    pub fn with_prefetch_count(mut self, count: usize) -> Self {
        self.prefetch_count = count;
        self
    }

    /// Watch the playback status.
    pub fn status(&self) -> watch::Receiver<PlaybackStatus> {
        self.status_tx.subscribe()
    }

    /// Start at the first item and play until the show ends, a
    /// [`PlayerCommand::Stop`] arrives, or `cancel` fires. Everything is torn
    /// down before returning.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<PlayerCommand>,
        mut surface_events: mpsc::Receiver<SurfaceEvent>,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome> {
        let mut internal_rx = self
            .internal_rx
            .take()
            .context("slideshow internal channel already taken")?;
        let mut commands_open = true;
        let mut surface_events_open = true;

        self.start();

        while self.phase != Phase::Ended {
            select! {
                _ = cancel.cancelled() => {
                    info!("cancel received; stopping slideshow");
                    break;
                }

                maybe_cmd = commands.recv(), if commands_open => match maybe_cmd {
                    Some(PlayerCommand::Stop) => {
                        info!("stop requested");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("command channel closed");
                        commands_open = false;
                    }
                },

                maybe_ev = surface_events.recv(), if surface_events_open => match maybe_ev {
                    Some(SurfaceEvent::VideoEnded) => self.on_video_ended(),
                    None => {
                        debug!("surface event channel closed");
                        surface_events_open = false;
                    }
                },

                Some(msg) = internal_rx.recv() => self.handle_internal(msg),
            }
        }

        let outcome = SessionOutcome {
            last_index: self.cursor.index(),
            reached_end: self.phase == Phase::Ended,
        };
        self.destroy();
        Ok(outcome)
    }

    fn handle_command(&mut self, cmd: PlayerCommand) {
        debug!(?cmd, "command");
        match cmd {
            PlayerCommand::Next => self.next(),
            PlayerCommand::Prev => self.prev(),
            PlayerCommand::TogglePause => self.toggle_pause(),
            PlayerCommand::Stop => {}
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Resolved { generation, result } => self.on_resolved(generation, result),
            Internal::Swap {
                generation,
                resource,
            } => self.on_swap(generation, resource),
            Internal::Settle { generation } => self.on_settle(generation),
            Internal::DurationElapsed { task } => self.on_duration_elapsed(task),
            Internal::Frame { task } => self.on_frame(task),
        }
    }

    fn start(&mut self) {
        info!(
            items = self.items.len(),
            duration_s = self.config.duration_seconds,
            looping = self.config.loop_playback,
            "slideshow starting"
        );
        self.cursor.reset();
        self.show_current();
    }

    fn show_current(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let index = self.cursor.index();
        let item = self.items[index].clone();

        self.phase = Phase::Loading;
        self.video_armed = false;
        self.surfaces.set_loading(true);
        self.listener.on_file_change(item.name());
        self.clear_timer();
        self.stop_sampler();
        self.transition = None;
        self.publish();
        debug!(index, item = %item.name(), generation, "loading");

        let cache = self.cache.clone();
        let tx = self.internal_tx.clone();
        self.spawn_background(async move {
            let result = cache.resolve(&item).await;
            let _ = tx.send(Internal::Resolved { generation, result }).await;
        });
    }

    fn on_resolved(&mut self, generation: u64, result: Result<DisplayResource, MediaLoadError>) {
        if !self.is_current(generation) {
            debug!(generation, "stale resolution ignored");
            return;
        }
        self.surfaces.set_loading(false);
        match result {
            Ok(resource) => {
                self.failed.clear();
                match self.current_item().kind() {
                    MediaKind::Image => self.show_image(generation, resource),
                    MediaKind::Video => self.show_video(generation, resource),
                }
            }
            Err(err) => {
                error!(
                    index = self.cursor.index(),
                    item = %err.item_name,
                    cause = %err.cause,
                    "failed to load; skipping"
                );
                self.failed.insert(self.cursor.index());
                if self.failed.len() >= self.items.len() {
                    error!(
                        failures = self.failed.len(),
                        "no item in the collection could be loaded"
                    );
                    self.finish();
                } else {
                    self.next();
                }
            }
        }
    }

    fn show_image(&mut self, generation: u64, resource: DisplayResource) {
        self.phase = Phase::ShowingImage;
        self.stop_sampler();
        self.surfaces.set_video_visible(false);
        self.surfaces.pause_video();
        self.surfaces.set_video_source(None);
        self.surfaces.set_image_fading(true);
        self.surfaces.reset_progress();
        self.begin_transition(generation, resource);
        self.publish();
    }

    fn show_video(&mut self, generation: u64, resource: DisplayResource) {
        self.phase = Phase::ShowingVideo;
        self.stop_sampler();
        self.surfaces.set_image_visible(false);
        self.surfaces.set_image_source(None);
        self.surfaces.set_video_fading(true);
        self.surfaces.reset_progress();
        self.begin_transition(generation, resource);
        self.publish();
    }

    fn begin_transition(&mut self, generation: u64, resource: DisplayResource) {
        let id = self.take_task_id();
        self.transition = Some(self.spawn_after(
            id,
            FADE_OUT,
            Internal::Swap {
                generation,
                resource,
            },
        ));
    }

    fn on_swap(&mut self, generation: u64, resource: DisplayResource) {
        if !self.is_current(generation) {
            debug!(generation, "stale swap ignored");
            return;
        }
        match self.phase {
            Phase::ShowingImage => {
                self.surfaces.set_image_source(Some(&resource));
                self.surfaces.set_image_visible(true);
            }
            Phase::ShowingVideo => {
                self.surfaces.set_video_source(Some(&resource));
                self.surfaces.set_video_visible(true);
                self.video_armed = true;
            }
            _ => return,
        }
        let id = self.take_task_id();
        self.transition = Some(self.spawn_after(id, SETTLE, Internal::Settle { generation }));
    }

    fn on_settle(&mut self, generation: u64) {
        if !self.is_current(generation) {
            debug!(generation, "stale settle ignored");
            return;
        }
        self.transition = None;
        match self.phase {
            Phase::ShowingImage => {
                self.surfaces.set_image_fading(false);
                if !self.paused {
                    self.arm_timer();
                    self.surfaces
                        .animate_progress(self.config.image_duration());
                }
            }
            Phase::ShowingVideo => {
                self.surfaces.set_video_fading(false);
                if !self.paused {
                    self.play_video();
                    self.start_sampler();
                }
            }
            _ => return,
        }
        info!(index = self.cursor.index(), item = %self.current_item().name(), "slide shown");
        self.spawn_prefetch();
    }

    fn on_duration_elapsed(&mut self, task: u64) {
        if self.timer.as_ref().map(|t| t.id) != Some(task) {
            debug!(task, "stale timer ignored");
            return;
        }
        self.timer = None;
        self.next();
    }

    fn on_frame(&mut self, task: u64) {
        if self.sampler.as_ref().map(|t| t.id) != Some(task) {
            return;
        }
        if let Some(percent) = self
            .surfaces
            .video_position()
            .and_then(|pos| pos.percent())
        {
            self.surfaces.set_progress(percent);
        }
        if self.paused || !self.surfaces.video_playing() {
            debug!("video progress sampler stopped");
            self.stop_sampler();
        }
    }

    fn on_video_ended(&mut self) {
        if self.paused || !self.video_armed || self.phase != Phase::ShowingVideo {
            debug!(paused = self.paused, "video end ignored");
            return;
        }
        self.next();
    }

    fn next(&mut self) {
        if self.phase == Phase::Ended {
            return;
        }
        match self.cursor.next() {
            Step::Moved(_) | Step::Wrapped(_) => self.show_current(),
            Step::End => self.finish(),
            Step::Stay => {}
        }
    }

    fn prev(&mut self) {
        if self.phase == Phase::Ended {
            return;
        }
        match self.cursor.prev() {
            Step::Moved(_) | Step::Wrapped(_) => self.show_current(),
            Step::Stay => debug!("already at the first item"),
            Step::End => {}
        }
    }

    fn toggle_pause(&mut self) {
        if matches!(self.phase, Phase::Idle | Phase::Ended) {
            return;
        }
        self.paused = !self.paused;
        // Until the slide settles, `on_settle` reads the flag and starts
        // playback itself.
        let settled = self.transition.is_none();
        if self.paused {
            self.surfaces.set_play_pause_label(PlayPauseLabel::Play);
            self.clear_timer();
            match self.phase {
                Phase::ShowingImage => self.surfaces.freeze_progress(true),
                Phase::ShowingVideo => {
                    self.surfaces.pause_video();
                    self.stop_sampler();
                }
                _ => {}
            }
        } else {
            self.surfaces.set_play_pause_label(PlayPauseLabel::Pause);
            match self.phase {
                // Elapsed time is not carried over: a resumed image gets its full duration.
                Phase::ShowingImage if settled => {
                    self.arm_timer();
                    self.surfaces.freeze_progress(false);
                }
                Phase::ShowingVideo if settled => {
                    self.play_video();
                    self.start_sampler();
                }
                _ => {}
            }
        }
        info!(paused = self.paused, index = self.cursor.index(), "pause toggled");
        self.publish();
    }

    /// Natural end of the show; the only path that notifies `on_end`.
    fn finish(&mut self) {
        info!(index = self.cursor.index(), "reached the end of the collection");
        self.phase = Phase::Ended;
        self.publish();
        self.listener.on_end();
    }

    fn destroy(&mut self) {
        self.clear_timer();
        self.stop_sampler();
        self.transition = None;
        self.background.abort_all();
        // Anything still resolving is now stale.
        self.generation += 1;
        self.surfaces.pause_video();
        self.surfaces.set_video_source(None);
        self.surfaces.set_image_source(None);
        self.phase = Phase::Ended;
        self.publish();
        let released = self.cache.release();
        info!(released, "slideshow destroyed");
    }

    fn play_video(&mut self) {
        if let Err(err) = self.surfaces.play_video() {
            warn!(error = %err, "video playback did not start");
        }
    }

    fn arm_timer(&mut self) {
        let id = self.take_task_id();
        let duration = self.config.image_duration();
        self.timer = Some(self.spawn_after(id, duration, Internal::DurationElapsed { task: id }));
    }

    fn clear_timer(&mut self) {
        self.timer = None;
    }

    fn start_sampler(&mut self) {
        let id = self.take_task_id();
        let tx = self.internal_tx.clone();
        let handle = tokio::spawn(async move {
            let mut frames = interval(FRAME_INTERVAL);
            frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                frames.tick().await;
                if tx.send(Internal::Frame { task: id }).await.is_err() {
                    break;
                }
            }
        });
        self.sampler = Some(ScheduledTask { id, handle });
    }

    fn stop_sampler(&mut self) {
        self.sampler = None;
    }

    fn spawn_after(&self, id: u64, delay: Duration, msg: Internal) -> ScheduledTask {
        let tx = self.internal_tx.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(msg).await;
        });
        ScheduledTask { id, handle }
    }

    fn spawn_prefetch(&mut self) {
        let work = prefetch::prefetch(
            self.cache.clone(),
            self.items.clone(),
            self.cursor.index(),
            self.prefetch_count,
        );
        self.spawn_background(work);
    }

    fn spawn_background<F>(&mut self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Reap finished entries so the set only holds live work.
        while self.background.try_join_next().is_some() {}
        self.background.spawn(work);
    }

    fn take_task_id(&mut self) -> u64 {
        self.next_task_id += 1;
        self.next_task_id
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.phase != Phase::Ended
    }

    fn current_item(&self) -> &MediaItem {
        &self.items[self.cursor.index()]
    }

    fn publish(&self) {
        let index = self.cursor.index();
        let status = match self.phase {
            Phase::Idle => PlaybackStatus::Idle,
            Phase::Loading => PlaybackStatus::Loading(index),
            Phase::ShowingImage | Phase::ShowingVideo if self.paused => {
                PlaybackStatus::Paused(index)
            }
            Phase::ShowingImage => PlaybackStatus::ShowingImage(index),
            Phase::ShowingVideo => PlaybackStatus::ShowingVideo(index),
            Phase::Ended => PlaybackStatus::Ended,
        };
        self.status_tx.send_replace(status);
    }
}
