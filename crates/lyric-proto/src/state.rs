use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::lrc::{load_for_track, TimedTextIndex};
use crate::protocol::{
    DisplayWindow, NowPlayingEvent, PlayState, SessionState, Snapshot, TITLE_PLACEHOLDER,
};

/// Outcome of applying one event to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same fingerprint as the previous event; nothing changed.
    Ignored,
    Stopped,
    Started,
}

/// The now-playing state machine.
///
/// Owned by a single consumer task; events and clock ticks are applied to it
/// one at a time, never concurrently.
#[derive(Debug)]
pub struct Session {
    lyrics_dir: PathBuf,
    state: SessionState,
    artist: String,
    title: String,
    album: String,
    next_artist: String,
    next_title: String,
    duration_ms: u64,
    position_ms: u64,
    cover_path: Option<PathBuf>,
    lyrics: Option<TimedTextIndex>,
    last_fingerprint: Option<String>,
}

impl Session {
    pub fn new(lyrics_dir: PathBuf) -> Self {
        Self {
            lyrics_dir,
            state: SessionState::Stopped,
            artist: String::new(),
            title: String::new(),
            album: String::new(),
            next_artist: String::new(),
            next_title: String::new(),
            duration_ms: 0,
            position_ms: 0,
            cover_path: None,
            lyrics: None,
            last_fingerprint: None,
        }
    }

    pub fn apply(&mut self, event: NowPlayingEvent) -> Transition {
        let fingerprint = event.fingerprint();
        if self.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return Transition::Ignored;
        }
        self.last_fingerprint = Some(fingerprint);

        match event.state {
            PlayState::Stop => {
                self.set_stopped();
                Transition::Stopped
            }
            PlayState::Play => {
                self.set_playing(event);
                Transition::Started
            }
        }
    }

    fn set_stopped(&mut self) {
        self.state = SessionState::Stopped;
        self.artist.clear();
        self.title.clear();
        self.album.clear();
        self.next_artist.clear();
        self.next_title.clear();
        self.duration_ms = 0;
        self.position_ms = 0;
        self.cover_path = None;
        self.lyrics = None;
    }

    fn set_playing(&mut self, event: NowPlayingEvent) {
        self.lyrics = load_for_track(&event.artist, &event.title, &self.lyrics_dir);
        self.state = SessionState::Playing;
        self.artist = event.artist;
        self.title = event.title;
        self.album = event.album;
        self.next_artist = event.next_artist;
        self.next_title = event.next_title;
        self.duration_ms = event.duration_ms;
        self.position_ms = 0;
        self.cover_path = event.cover_path;
    }

    /// Advance the simulated position.  Only effective while playing; the
    /// position is not clamped to the duration.  Returns whether it moved.
    pub fn tick(&mut self, step_ms: u64) -> bool {
        if self.state != SessionState::Playing {
            return false;
        }
        self.position_ms = self.position_ms.saturating_add(step_ms);
        true
    }

    pub fn window(&self) -> DisplayWindow {
        let Some(lyrics) = self.lyrics.as_ref().filter(|l| !l.is_empty()) else {
            return DisplayWindow::no_lyrics();
        };

        let idx = lyrics.index_at(self.position_ms);
        let text_at = |i: Option<usize>| {
            i.and_then(|i| lyrics.get(i))
                .map(|l| l.text.clone())
                .unwrap_or_default()
        };

        DisplayWindow {
            prev: text_at(idx.checked_sub(1)),
            curr: text_at(Some(idx)),
            next: text_at(idx.checked_add(1)),
        }
    }

    pub fn title_line(&self) -> String {
        match (self.artist.is_empty(), self.title.is_empty()) {
            (false, false) => format!("{} - {}", self.artist, self.title),
            (true, false) => self.title.clone(),
            (false, true) => self.artist.clone(),
            (true, true) => TITLE_PLACEHOLDER.to_string(),
        }
    }

    pub fn next_line(&self) -> String {
        match (self.next_artist.is_empty(), self.next_title.is_empty()) {
            (false, false) => format!("{} - {}", self.next_artist, self.next_title),
            (true, false) => self.next_title.clone(),
            (false, true) => self.next_artist.clone(),
            (true, true) => String::new(),
        }
    }

    /// `MM:SS / MM:SS` for position and duration.
    pub fn timecode(&self) -> String {
        format!(
            "{} / {}",
            format_mm_ss(self.position_ms),
            format_mm_ss(self.duration_ms)
        )
    }

    pub fn progress_percent(&self) -> u8 {
        let total = self.duration_ms.max(1);
        (self.position_ms.saturating_mul(100) / total).min(100) as u8
    }

    pub fn snapshot(&self, rev: u64) -> Snapshot {
        Snapshot {
            rev,
            state: self.state,
            title_line: self.title_line(),
            artist: self.artist.clone(),
            title: self.title.clone(),
            album: self.album.clone(),
            next_line: self.next_line(),
            duration_ms: self.duration_ms,
            position_ms: self.position_ms,
            timecode: self.timecode(),
            progress_percent: self.progress_percent(),
            cover_path: self.cover_path.clone(),
            has_lyrics: self.has_lyrics(),
            window: self.window(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn position_ms(&self) -> u64 {
        self.position_ms
    }

    pub fn cover_path(&self) -> Option<&PathBuf> {
        self.cover_path.as_ref()
    }

    pub fn lyrics(&self) -> Option<&TimedTextIndex> {
        self.lyrics.as_ref()
    }

    pub fn has_lyrics(&self) -> bool {
        self.lyrics.as_ref().is_some_and(|l| !l.is_empty())
    }

    pub fn last_fingerprint(&self) -> Option<&str> {
        self.last_fingerprint.as_deref()
    }
}

fn format_mm_ss(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Latest published snapshot, shared with HTTP handlers and renderers.
/// Only the core loop writes to it.
#[derive(Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<RwLock<Snapshot>>,
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn get(&self) -> Snapshot {
        self.inner.read().await.clone()
    }

    pub async fn publish(&self, snapshot: Snapshot) {
        *self.inner.write().await = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NO_LYRICS_MARKER;
    use std::collections::HashMap;

    fn event(state: &str, artist: &str, title: &str, dur: &str) -> NowPlayingEvent {
        let fields: HashMap<String, String> = [
            ("state", state),
            ("artist", artist),
            ("title", title),
            ("dur", dur),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        NowPlayingEvent::from_fields(&fields, None, "test")
    }

    fn lyrics_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("X - Y.lrc"),
            "[00:00]A\n[00:01]B\n[00:02]C\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_initial_state() {
        let session = Session::new(PathBuf::from("/nonexistent"));
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.window(), DisplayWindow::no_lyrics());
        assert_eq!(session.title_line(), TITLE_PLACEHOLDER);
        assert!(session.last_fingerprint().is_none());
    }

    #[test]
    fn test_play_loads_lyrics_and_resets_position() {
        let dir = lyrics_dir();
        let mut session = Session::new(dir.path().to_path_buf());

        assert_eq!(session.apply(event("play", "X", "Y", "10000")), Transition::Started);
        assert_eq!(session.state(), SessionState::Playing);
        assert_eq!(session.duration_ms(), 10_000);
        assert_eq!(session.position_ms(), 0);
        assert_eq!(session.lyrics().map(|l| l.len()), Some(3));
        assert_eq!(session.title_line(), "X - Y");
        assert_eq!(session.last_fingerprint(), Some("X|Y|play"));

        assert_eq!(
            session.window(),
            DisplayWindow {
                prev: String::new(),
                curr: "A".into(),
                next: "B".into(),
            }
        );
    }

    #[test]
    fn test_tick_advances_window() {
        let dir = lyrics_dir();
        let mut session = Session::new(dir.path().to_path_buf());
        session.apply(event("play", "X", "Y", "10000"));

        for _ in 0..5 {
            assert!(session.tick(200));
        }
        assert_eq!(session.position_ms(), 1000);
        assert_eq!(session.window().curr, "B");
        assert_eq!(session.window().prev, "A");
        assert_eq!(session.window().next, "C");

        for _ in 0..5 {
            session.tick(200);
        }
        let window = session.window();
        assert_eq!(window.curr, "C");
        assert_eq!(window.next, "");
    }

    #[test]
    fn test_tick_is_noop_when_stopped() {
        let mut session = Session::new(PathBuf::from("/nonexistent"));
        assert!(!session.tick(200));
        assert_eq!(session.position_ms(), 0);
    }

    #[test]
    fn test_position_may_exceed_duration() {
        let mut session = Session::new(PathBuf::from("/nonexistent"));
        session.apply(event("play", "X", "Y", "400"));
        for _ in 0..10 {
            session.tick(200);
        }
        assert_eq!(session.position_ms(), 2000);
        assert_eq!(session.progress_percent(), 100);
    }

    #[test]
    fn test_duplicate_event_is_ignored() {
        let dir = lyrics_dir();
        let mut session = Session::new(dir.path().to_path_buf());
        assert_eq!(session.apply(event("play", "X", "Y", "10000")), Transition::Started);
        session.tick(200);
        session.tick(200);

        for _ in 0..3 {
            assert_eq!(session.apply(event("play", "X", "Y", "10000")), Transition::Ignored);
        }
        // Position and lyrics from the first event survive.
        assert_eq!(session.position_ms(), 400);
        assert!(session.has_lyrics());
    }

    #[test]
    fn test_repeated_stop_is_ignored() {
        let mut session = Session::new(PathBuf::from("/nonexistent"));
        assert_eq!(session.apply(event("stop", "", "", "")), Transition::Stopped);
        assert_eq!(session.apply(event("STOP", "", "", "")), Transition::Ignored);
    }

    #[test]
    fn test_stop_clears_state() {
        let dir = lyrics_dir();
        let mut session = Session::new(dir.path().to_path_buf());
        session.apply(event("play", "X", "Y", "10000"));
        session.tick(200);

        assert_eq!(session.apply(event("stop", "", "", "")), Transition::Stopped);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.position_ms(), 0);
        assert_eq!(session.duration_ms(), 0);
        assert!(session.lyrics().is_none());
        assert!(session.cover_path().is_none());
        assert_eq!(session.title_line(), TITLE_PLACEHOLDER);
        assert_eq!(session.window().curr, NO_LYRICS_MARKER);
    }

    #[test]
    fn test_same_track_replays_after_stop() {
        let dir = lyrics_dir();
        let mut session = Session::new(dir.path().to_path_buf());
        session.apply(event("play", "X", "Y", "10000"));
        session.apply(event("stop", "X", "Y", ""));
        assert_eq!(session.apply(event("play", "X", "Y", "10000")), Transition::Started);
        assert_eq!(session.state(), SessionState::Playing);
    }

    #[test]
    fn test_track_without_lyrics_shows_marker() {
        let dir = lyrics_dir();
        let mut session = Session::new(dir.path().to_path_buf());
        session.apply(event("play", "Other", "Song", "5000"));
        assert!(!session.has_lyrics());
        assert_eq!(session.window(), DisplayWindow::no_lyrics());
    }

    #[test]
    fn test_title_and_next_lines() {
        let mut session = Session::new(PathBuf::from("/nonexistent"));
        session.apply(event("play", "", "Only Title", ""));
        assert_eq!(session.title_line(), "Only Title");

        let mut fields = HashMap::new();
        fields.insert("artist".to_string(), "A".to_string());
        fields.insert("nextArtist".to_string(), "N".to_string());
        fields.insert("nextTitle".to_string(), "T".to_string());
        session.apply(NowPlayingEvent::from_fields(&fields, None, ""));
        assert_eq!(session.title_line(), "A");
        assert_eq!(session.next_line(), "N - T");
    }

    #[test]
    fn test_timecode_and_progress() {
        let mut session = Session::new(PathBuf::from("/nonexistent"));
        session.apply(event("play", "X", "Y", "125000"));
        for _ in 0..(65_000 / 200) {
            session.tick(200);
        }
        assert_eq!(session.timecode(), "01:05 / 02:05");
        assert_eq!(session.progress_percent(), 52);
    }

    #[test]
    fn test_snapshot_reflects_session() {
        let dir = lyrics_dir();
        let mut session = Session::new(dir.path().to_path_buf());
        session.apply(event("play", "X", "Y", "10000"));
        let snap = session.snapshot(7);
        assert_eq!(snap.rev, 7);
        assert_eq!(snap.state, SessionState::Playing);
        assert_eq!(snap.title_line, "X - Y");
        assert!(snap.has_lyrics);
        assert_eq!(snap.window.curr, "A");
    }

    #[tokio::test]
    async fn test_snapshot_store_publish() {
        let store = SnapshotStore::default();
        assert_eq!(store.get().await.rev, 0);
        store
            .publish(Snapshot {
                rev: 3,
                ..Default::default()
            })
            .await;
        assert_eq!(store.get().await.rev, 3);
    }
}
