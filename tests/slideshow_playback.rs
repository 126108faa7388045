use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use media_slideshow::cache::ResourceCache;
use media_slideshow::config::PlaybackConfig;
use media_slideshow::decode::DecoderRegistry;
use media_slideshow::events::{PlayPauseLabel, PlaybackStatus, PlayerCommand, SurfaceEvent};
use media_slideshow::media::MediaItem;
use media_slideshow::tasks::slideshow::{SessionOutcome, Slideshow};
use media_slideshow::testkit::{
    MemorySource, RecordingListener, RecordingSurfaces, SurfaceOp, SurfaceMonitor,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn item(name: &str, source: Arc<MemorySource>) -> Arc<MediaItem> {
    Arc::new(MediaItem::new(name, source, &DecoderRegistry::empty()).expect("supported extension"))
}

fn items(names: &[&str]) -> Vec<Arc<MediaItem>> {
    names
        .iter()
        .map(|name| item(name, MemorySource::new(name.as_bytes())))
        .collect()
}

fn playback(duration_seconds: u32, looping: bool) -> PlaybackConfig {
    PlaybackConfig {
        duration_seconds,
        shuffle: false,
        loop_playback: looping,
    }
}

struct Harness {
    started: Instant,
    commands: mpsc::Sender<PlayerCommand>,
    surface_events: mpsc::Sender<SurfaceEvent>,
    cancel: CancellationToken,
    screen: SurfaceMonitor,
    listener: RecordingListener,
    status: watch::Receiver<PlaybackStatus>,
    cache: Arc<ResourceCache>,
    handle: JoinHandle<Result<SessionOutcome>>,
}

impl Harness {
    fn launch(items: Vec<Arc<MediaItem>>, config: PlaybackConfig) -> Self {
        let (surfaces, screen) = RecordingSurfaces::new();
        let listener = RecordingListener::new();
        let cache = Arc::new(ResourceCache::new());
        let show = Slideshow::new(items, config, cache.clone(), surfaces, listener.clone())
            .expect("valid slideshow");
        let status = show.status();
        let (commands, command_rx) = mpsc::channel(8);
        let (surface_events, surface_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(show.run(command_rx, surface_rx, cancel.clone()));
        Self {
            started: Instant::now(),
            commands,
            surface_events,
            cancel,
            screen,
            listener,
            status,
            cache,
            handle,
        }
    }

    /// Sleep until `offset` after launch.
    async fn at(&self, offset: Duration) {
        sleep_until(self.started + offset).await;
    }

    async fn send(&self, cmd: PlayerCommand) {
        self.commands.send(cmd).await.unwrap();
        tokio::time::sleep(ms(10)).await;
    }

    async fn video_ended(&self) {
        self.surface_events
            .send(SurfaceEvent::VideoEnded)
            .await
            .unwrap();
        tokio::time::sleep(ms(10)).await;
    }

    fn status(&self) -> PlaybackStatus {
        *self.status.borrow()
    }

    fn shown(&self) -> Vec<String> {
        self.listener.snapshot().file_changes
    }

    async fn outcome(self) -> SessionOutcome {
        self.handle.await.unwrap().unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn plays_image_video_image_and_ends_once() {
    let h = Harness::launch(items(&["A.jpg", "B.mp4", "C.png"]), playback(5, false));

    h.at(ms(100)).await;
    assert_eq!(h.shown(), ["A.jpg"]);
    assert_eq!(h.status(), PlaybackStatus::ShowingImage(0));
    let log = h.screen.snapshot();
    assert!(log.image_source.is_none(), "swap waits for the fade-out");
    assert!(log.image_fading);
    assert!(!log.loading);

    h.at(ms(300)).await;
    let log = h.screen.snapshot();
    assert_eq!(log.image_bytes(), Some(&b"A.jpg"[..]));
    assert!(log.image_visible);
    assert!(!log.image_fading);
    assert_eq!(log.progress_animation, Some(Duration::from_secs(5)));

    h.at(ms(5_100)).await;
    assert_eq!(h.shown().len(), 1, "image stays up for its full duration");

    h.at(ms(5_500)).await;
    assert_eq!(h.shown(), ["A.jpg", "B.mp4"]);
    assert_eq!(h.status(), PlaybackStatus::ShowingVideo(1));
    let log = h.screen.snapshot();
    assert_eq!(log.video_bytes(), Some(&b"B.mp4"[..]));
    assert!(log.video_visible);
    assert!(log.video_playing);
    assert!(log.image_source.is_none());
    assert!(!log.image_visible);

    h.screen.set_video_clock(2.5, 10.0);
    h.at(ms(5_600)).await;
    assert_eq!(h.screen.snapshot().progress_percent, 25.0);

    // Videos advance on their own end event, not on the image timer.
    h.at(ms(20_000)).await;
    assert_eq!(h.shown().len(), 2);

    h.video_ended().await;
    assert_eq!(h.shown(), ["A.jpg", "B.mp4", "C.png"]);
    h.at(ms(20_500)).await;
    let log = h.screen.snapshot();
    assert_eq!(log.image_bytes(), Some(&b"C.png"[..]));
    assert!(log.video_source.is_none());
    assert!(!log.video_playing);

    h.commands.send(PlayerCommand::Next).await.unwrap();
    let listener = h.listener.clone();
    let cache = h.cache.clone();
    let outcome = h.outcome().await;
    assert_eq!(
        outcome,
        SessionOutcome {
            last_index: 2,
            reached_end: true
        }
    );
    assert_eq!(listener.snapshot().ends, 1);
    assert!(cache.is_empty(), "cache is released on teardown");
}

#[tokio::test(start_paused = true)]
async fn looping_wraps_in_both_directions() {
    let h = Harness::launch(items(&["A.jpg", "B.jpg"]), playback(5, true));
    h.at(ms(300)).await;

    h.send(PlayerCommand::Prev).await;
    assert_eq!(h.shown(), ["A.jpg", "B.jpg"]);

    h.send(PlayerCommand::Next).await;
    assert_eq!(h.shown(), ["A.jpg", "B.jpg", "A.jpg"]);

    // Natural expiry at the last item wraps as well.
    h.send(PlayerCommand::Next).await;
    h.at(ms(6_000)).await;
    assert_eq!(h.shown().last().map(String::as_str), Some("A.jpg"));
    assert_eq!(h.listener.snapshot().ends, 0);

    h.cancel.cancel();
    assert!(!h.outcome().await.reached_end);
}

#[tokio::test(start_paused = true)]
async fn prev_at_first_item_without_loop_is_a_no_op() {
    let h = Harness::launch(items(&["A.jpg", "B.jpg"]), playback(5, false));
    h.at(ms(300)).await;

    h.send(PlayerCommand::Prev).await;
    assert_eq!(h.shown(), ["A.jpg"]);
    assert_eq!(h.status(), PlaybackStatus::ShowingImage(0));
    assert_eq!(h.listener.snapshot().ends, 0);

    h.commands.send(PlayerCommand::Stop).await.unwrap();
    let listener = h.listener.clone();
    let outcome = h.outcome().await;
    assert_eq!(
        outcome,
        SessionOutcome {
            last_index: 0,
            reached_end: false
        }
    );
    assert_eq!(listener.snapshot().ends, 0, "stop is not a natural end");
}

#[tokio::test(start_paused = true)]
async fn single_item_without_loop_ends_after_its_duration() {
    let h = Harness::launch(items(&["only.png"]), playback(2, false));
    let started = h.started;
    let listener = h.listener.clone();

    let outcome = h.outcome().await;
    assert!(outcome.reached_end);
    assert_eq!(outcome.last_index, 0);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(listener.snapshot().ends, 1);
}

#[tokio::test(start_paused = true)]
async fn broken_item_is_skipped_forward() {
    let items = vec![
        item("A.jpg", MemorySource::new(b"a")),
        item("B.jpg", MemorySource::missing()),
        item("C.jpg", MemorySource::new(b"c")),
    ];
    let h = Harness::launch(items, playback(5, false));

    h.at(ms(5_500)).await;
    assert_eq!(h.shown(), ["A.jpg", "B.jpg", "C.jpg"]);
    assert_eq!(h.status(), PlaybackStatus::ShowingImage(2));
    assert_eq!(h.screen.snapshot().image_bytes(), Some(&b"c"[..]));
    assert_eq!(h.listener.snapshot().ends, 0);
    assert!(!h.screen.snapshot().loading);
}

#[tokio::test(start_paused = true)]
async fn failure_after_going_back_still_moves_forward() {
    let items = vec![
        item("A.jpg", MemorySource::missing()),
        item("B.jpg", MemorySource::new(b"b")),
        item("C.jpg", MemorySource::new(b"c")),
    ];
    let h = Harness::launch(items, playback(5, true));

    h.at(ms(300)).await;
    assert_eq!(h.shown(), ["A.jpg", "B.jpg"]);
    assert_eq!(h.status(), PlaybackStatus::ShowingImage(1));

    // Prev lands on the broken item, which then advances to B again.
    h.send(PlayerCommand::Prev).await;
    assert_eq!(h.shown(), ["A.jpg", "B.jpg", "A.jpg", "B.jpg"]);
    h.at(ms(600)).await;
    assert_eq!(h.status(), PlaybackStatus::ShowingImage(1));
}

#[tokio::test(start_paused = true)]
async fn broken_last_item_without_loop_ends_the_show() {
    let items = vec![
        item("A.jpg", MemorySource::new(b"a")),
        item("B.jpg", MemorySource::missing()),
    ];
    let h = Harness::launch(items, playback(1, false));
    let listener = h.listener.clone();

    let outcome = h.outcome().await;
    assert_eq!(
        outcome,
        SessionOutcome {
            last_index: 1,
            reached_end: true
        }
    );
    assert_eq!(listener.snapshot().ends, 1);
}

#[tokio::test(start_paused = true)]
async fn looping_collection_with_nothing_loadable_ends_instead_of_spinning() {
    let items = vec![
        item("A.jpg", MemorySource::missing()),
        item("B.jpg", MemorySource::missing()),
    ];
    let h = Harness::launch(items, playback(5, true));
    let listener = h.listener.clone();

    let outcome = h.outcome().await;
    assert!(outcome.reached_end);
    let log = listener.snapshot();
    assert_eq!(log.file_changes, ["A.jpg", "B.jpg"]);
    assert_eq!(log.ends, 1);
}

#[tokio::test(start_paused = true)]
async fn resumed_image_gets_a_fresh_full_duration() {
    let h = Harness::launch(items(&["A.jpg", "B.jpg"]), playback(5, false));

    h.at(ms(4_000)).await;
    h.send(PlayerCommand::TogglePause).await;
    assert_eq!(h.status(), PlaybackStatus::Paused(0));
    let log = h.screen.snapshot();
    assert_eq!(log.label, Some(PlayPauseLabel::Play));
    assert!(log.progress_frozen);

    h.at(ms(10_000)).await;
    assert_eq!(h.shown().len(), 1, "paused image never expires");

    h.send(PlayerCommand::TogglePause).await;
    assert_eq!(h.status(), PlaybackStatus::ShowingImage(0));
    let log = h.screen.snapshot();
    assert_eq!(log.label, Some(PlayPauseLabel::Pause));
    assert!(!log.progress_frozen);

    h.at(ms(14_900)).await;
    assert_eq!(h.shown().len(), 1, "elapsed time before the pause is discarded");
    h.at(ms(15_100)).await;
    assert_eq!(h.shown(), ["A.jpg", "B.jpg"]);
}

#[tokio::test(start_paused = true)]
async fn paused_video_keeps_position_and_ignores_end() {
    let h = Harness::launch(items(&["V.mp4", "B.jpg"]), playback(5, false));

    h.at(ms(300)).await;
    assert!(h.screen.snapshot().video_playing);
    h.screen.set_video_clock(3.0, 10.0);
    h.at(ms(400)).await;
    assert_eq!(h.screen.snapshot().progress_percent, 30.0);

    h.send(PlayerCommand::TogglePause).await;
    let log = h.screen.snapshot();
    assert!(!log.video_playing);
    assert_eq!(log.ops.last(), Some(&SurfaceOp::PauseVideo));
    assert_eq!(h.status(), PlaybackStatus::Paused(0));

    h.video_ended().await;
    assert_eq!(h.shown(), ["V.mp4"], "end event ignored while paused");

    h.send(PlayerCommand::TogglePause).await;
    let log = h.screen.snapshot();
    assert!(log.video_playing);
    assert_eq!(log.play_calls, 2);
    assert_eq!(log.progress_percent, 30.0);
    let resets = log
        .ops
        .iter()
        .filter(|op| **op == SurfaceOp::ProgressReset)
        .count();
    assert_eq!(resets, 1, "resuming a video does not reset its progress");

    h.video_ended().await;
    assert_eq!(h.shown(), ["V.mp4", "B.jpg"]);
}

#[tokio::test(start_paused = true)]
async fn settled_slide_prefetches_the_next_three() {
    let sources: Vec<_> = (0..5)
        .map(|i| MemorySource::new(format!("img{i}").as_bytes()))
        .collect();
    let items = sources
        .iter()
        .enumerate()
        .map(|(i, src)| item(&format!("img{i}.jpg"), src.clone()))
        .collect();
    let h = Harness::launch(items, playback(5, false));

    h.at(ms(100)).await;
    assert_eq!(sources[1].fetches(), 0, "no prefetch before the slide settles");

    h.at(ms(300)).await;
    for name in ["img0.jpg", "img1.jpg", "img2.jpg", "img3.jpg"] {
        assert!(h.cache.contains(name), "{name} should be cached");
    }
    assert!(!h.cache.contains("img4.jpg"));
    assert_eq!(sources[4].fetches(), 0);

    // Navigating onto a prefetched item reuses it.
    h.send(PlayerCommand::Next).await;
    assert_eq!(sources[1].fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_resolution_for_an_abandoned_slide_is_ignored() {
    let items = vec![
        item("A.jpg", MemorySource::delayed(b"a", Duration::from_secs(1))),
        item("B.jpg", MemorySource::new(b"b")),
    ];
    let h = Harness::launch(items, playback(5, false));

    h.at(ms(100)).await;
    assert_eq!(h.status(), PlaybackStatus::Loading(0));
    assert!(h.screen.snapshot().loading);

    h.send(PlayerCommand::Next).await;
    h.at(ms(1_500)).await;
    assert_eq!(h.shown(), ["A.jpg", "B.jpg"]);
    assert_eq!(h.status(), PlaybackStatus::ShowingImage(1));
    let log = h.screen.snapshot();
    assert_eq!(log.image_bytes(), Some(&b"b"[..]));
    let swaps: Vec<_> = log
        .ops
        .iter()
        .filter(|op| matches!(op, SurfaceOp::ImageSource(Some(_))))
        .collect();
    assert_eq!(swaps, [&SurfaceOp::ImageSource(Some(b"b".to_vec()))]);
}

#[tokio::test(start_paused = true)]
async fn cancel_tears_everything_down() {
    let h = Harness::launch(items(&["V.mp4"]), playback(5, true));
    h.at(ms(300)).await;
    assert!(h.screen.snapshot().video_playing);

    h.cancel.cancel();
    let screen = h.screen.clone();
    let status = h.status.clone();
    let listener = h.listener.clone();
    let outcome = h.outcome().await;

    assert!(!outcome.reached_end);
    assert_eq!(listener.snapshot().ends, 0);
    assert_eq!(*status.borrow(), PlaybackStatus::Ended);
    let log = screen.snapshot();
    assert!(!log.video_playing);
    assert!(log.video_source.is_none());
    assert!(log.image_source.is_none());
}

#[tokio::test(start_paused = true)]
async fn loadable_item_keeps_a_looping_show_alive_across_failures() {
    let items = vec![
        item("A.jpg", MemorySource::missing()),
        item("B.jpg", MemorySource::delayed(b"b", Duration::from_secs(1))),
        item("C.jpg", MemorySource::missing()),
    ];
    let h = Harness::launch(items, playback(5, true));

    // Skip ahead while B is still loading: C and A fail back to back.
    h.at(ms(100)).await;
    assert_eq!(h.status(), PlaybackStatus::Loading(1));
    h.send(PlayerCommand::Next).await;
    assert_eq!(h.shown(), ["A.jpg", "B.jpg", "C.jpg", "A.jpg", "B.jpg"]);

    h.at(ms(1_500)).await;
    assert_eq!(h.status(), PlaybackStatus::ShowingImage(1));
    assert_eq!(h.screen.snapshot().image_bytes(), Some(&b"b"[..]));
    assert_eq!(h.listener.snapshot().ends, 0);
    assert!(!h.handle.is_finished());

    h.cancel.cancel();
    assert!(!h.outcome().await.reached_end);
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_in_flight_prefetch_from_refilling_the_cache() {
    let slow = MemorySource::delayed(b"b", Duration::from_secs(1));
    let items = vec![item("A.jpg", MemorySource::new(b"a")), item("B.jpg", slow.clone())];
    let h = Harness::launch(items, playback(5, false));

    h.at(ms(400)).await;
    assert_eq!(slow.fetches(), 1, "B is being prefetched");
    assert!(h.cache.contains("A.jpg"));

    h.cancel.cancel();
    let cache = h.cache.clone();
    h.outcome().await;
    assert!(cache.is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(cache.is_empty(), "nothing is stored after teardown");
    assert!(!cache.contains("B.jpg"));
}
