use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Scalar fields recognized on an inbound "now playing" request.
pub const FIELD_STATE: &str = "state";
pub const FIELD_ARTIST: &str = "artist";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_ALBUM: &str = "album";
pub const FIELD_DURATION: &str = "dur";
pub const FIELD_NEXT_ARTIST: &str = "nextArtist";
pub const FIELD_NEXT_TITLE: &str = "nextTitle";

/// Multipart field carrying the cover image.
pub const FIELD_COVER: &str = "albumart";

/// Shown in the current-line slot when the track has no usable lyrics.
pub const NO_LYRICS_MARKER: &str = "(no lyrics found)";

/// Title line shown while nothing is playing.
pub const TITLE_PLACEHOLDER: &str = "——";

/// Playback state reported by the automation system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    #[default]
    Play,
    Stop,
}

impl PlayState {
    /// Case-insensitive; anything other than `stop` (including empty) is Play.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("stop") {
            PlayState::Stop
        } else {
            PlayState::Play
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlayState::Play => "play",
            PlayState::Stop => "stop",
        }
    }
}

/// A normalized "now playing" notification, ready for the state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NowPlayingEvent {
    pub state: PlayState,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub duration_ms: u64,
    pub next_artist: String,
    pub next_title: String,
    pub cover_path: Option<PathBuf>,
    pub source_addr: String,
}

impl NowPlayingEvent {
    /// Build an event from raw transport fields.  Values are trimmed, absent
    /// strings become empty, an absent or unparsable duration becomes 0 and
    /// unrecognized keys are ignored.
    pub fn from_fields(
        fields: &HashMap<String, String>,
        cover_path: Option<PathBuf>,
        source_addr: impl Into<String>,
    ) -> Self {
        let get = |key: &str| {
            fields
                .get(key)
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        Self {
            state: PlayState::parse(&get(FIELD_STATE)),
            artist: get(FIELD_ARTIST),
            title: get(FIELD_TITLE),
            album: get(FIELD_ALBUM),
            duration_ms: get(FIELD_DURATION).parse().unwrap_or(0),
            next_artist: get(FIELD_NEXT_ARTIST),
            next_title: get(FIELD_NEXT_TITLE),
            cover_path,
            source_addr: source_addr.into(),
        }
    }

    /// Dedup key: `artist|title|state`.
    pub fn fingerprint(&self) -> String {
        format!("{}|{}|{}", self.artist, self.title, self.state.label())
    }
}

/// The three lyric lines around the current position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DisplayWindow {
    pub prev: String,
    pub curr: String,
    pub next: String,
}

impl DisplayWindow {
    pub fn no_lyrics() -> Self {
        Self {
            prev: String::new(),
            curr: NO_LYRICS_MARKER.to_string(),
            next: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Stopped,
    Playing,
}

/// Read-only view of the session published after every change.  `rev`
/// increases monotonically so pollers can tell whether anything moved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Snapshot {
    #[serde(default)]
    pub rev: u64,
    pub state: SessionState,
    pub title_line: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    /// "Up next" text, empty when unknown.
    pub next_line: String,
    pub duration_ms: u64,
    pub position_ms: u64,
    pub timecode: String,
    pub progress_percent: u8,
    pub cover_path: Option<PathBuf>,
    pub has_lyrics: bool,
    pub window: DisplayWindow,
}

/// Acknowledgement returned to the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    pub ok: bool,
}

/// Liveness probe payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Health {
    pub ok: bool,
    pub ts: String,
}
