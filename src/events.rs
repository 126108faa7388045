/// Navigation and control requests for a running slideshow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Next,
    Prev,
    TogglePause,
    /// End the session without invoking the end-of-show callback.
    Stop,
}

/// Emitted by the display surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The video surface played to the end of its source.
    VideoEnded,
}

/// Observable state of the playback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    /// Constructed but not started.
    #[default]
    Idle,
    Loading(usize),
    ShowingImage(usize),
    ShowingVideo(usize),
    Paused(usize),
    Ended,
}

impl PlaybackStatus {
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Loading(i) | Self::ShowingImage(i) | Self::ShowingVideo(i) | Self::Paused(i) => {
                Some(i)
            }
            Self::Idle | Self::Ended => None,
        }
    }
}

/// Text shown on the play/pause control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayPauseLabel {
    Play,
    Pause,
}
