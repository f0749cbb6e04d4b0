//! Timed lyric (LRC) parsing and lookup.
//!
//! A source line carries zero or more `[MM:SS]`, `[MM:SS.f]` or `[MM:SS.ff]`
//! tags followed by display text.  Every tag produces one entry sharing the
//! line's text, and the collected entries are sorted by offset so that
//! [`TimedTextIndex::index_at`] can binary search them.
//!
//! Parsing is best effort: malformed lines contribute nothing and never
//! surface an error.  Only file resolution ([`load_for_track`]) touches the
//! filesystem, and its failures degrade to "no lyrics".

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// One display line anchored at an offset into the track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedTextLine {
    pub offset_ms: u64,
    pub text: String,
}

/// Time-ordered lyric lines for one track.  Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimedTextIndex {
    lines: Vec<TimedTextLine>,
}

#[derive(Debug, Error)]
pub enum LyricsError {
    #[error("lyric file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn tag_regex() -> Option<&'static Regex> {
    static TAG: OnceLock<Option<Regex>> = OnceLock::new();
    // ASCII digits only; `\d` would also accept other Unicode digits.
    TAG.get_or_init(|| Regex::new(r"\[([0-9]{1,2}):([0-9]{1,2})(?:\.([0-9]{1,2}))?\]").ok())
        .as_ref()
}

impl TimedTextIndex {
    pub fn parse(source: &str) -> Self {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        let Some(re) = tag_regex() else {
            return Self::default();
        };

        let mut lines = Vec::new();
        for raw in source.lines() {
            let offsets: Vec<u64> = re
                .captures_iter(raw)
                .filter_map(|caps| {
                    let minutes: u64 = caps.get(1)?.as_str().parse().ok()?;
                    let seconds: u64 = caps.get(2)?.as_str().parse().ok()?;
                    let fraction_ms = caps.get(3).map_or(0, |m| fraction_to_ms(m.as_str()));
                    Some((minutes * 60 + seconds) * 1000 + fraction_ms)
                })
                .collect();
            if offsets.is_empty() {
                continue;
            }

            let text = re.replace_all(raw, "");
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            lines.extend(offsets.into_iter().map(|offset_ms| TimedTextLine {
                offset_ms,
                text: text.to_string(),
            }));
        }

        // Stable: equal offsets keep source order, so parsing is deterministic.
        lines.sort_by_key(|l| l.offset_ms);
        Self { lines }
    }

    /// Index of the last line whose offset is `<= elapsed_ms`.
    ///
    /// Returns 0 when the index is empty or `elapsed_ms` precedes the first
    /// line, so callers must check [`is_empty`](Self::is_empty) before
    /// treating 0 as a real line.
    pub fn index_at(&self, elapsed_ms: u64) -> usize {
        self.lines
            .partition_point(|l| l.offset_ms <= elapsed_ms)
            .saturating_sub(1)
    }

    pub fn lines(&self) -> &[TimedTextLine] {
        &self.lines
    }

    pub fn get(&self, idx: usize) -> Option<&TimedTextLine> {
        self.lines.get(idx)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// `f` is tenths of a second, `ff` hundredths.
fn fraction_to_ms(digits: &str) -> u64 {
    let value: u64 = digits.parse().unwrap_or(0);
    match digits.len() {
        1 => value * 100,
        _ => value * 10,
    }
}

/// File names tried for a track, in priority order.  Candidates that need a
/// missing artist or title are skipped.
pub fn candidate_names(artist: &str, title: &str) -> Vec<String> {
    let artist = artist.trim();
    let title = title.trim();

    let mut names = Vec::with_capacity(3);
    if !artist.is_empty() && !title.is_empty() {
        names.push(format!("{} - {}.lrc", artist, title));
        names.push(format!("{} - {}.lrc", title, artist));
    }
    if !title.is_empty() {
        names.push(format!("{}.lrc", title));
    }
    names
}

/// Resolve and parse the lyric file for a track under `search_root`.
///
/// The first candidate that exists and reads as UTF-8 wins.  Any failure
/// means "no lyrics for this track".
pub fn load_for_track(artist: &str, title: &str, search_root: &Path) -> Option<TimedTextIndex> {
    for name in candidate_names(artist, title) {
        let path = search_root.join(&name);
        match read_lrc(&path) {
            Ok(index) => {
                debug!("lrc: loaded {} ({} lines)", path.display(), index.len());
                return Some(index);
            }
            Err(LyricsError::NotFound(_)) => continue,
            Err(e) => {
                warn!("lrc: {}", e);
                continue;
            }
        }
    }
    debug!("lrc: no lyric file for {:?} / {:?}", artist, title);
    None
}

fn read_lrc(path: &Path) -> Result<TimedTextIndex, LyricsError> {
    if !path.is_file() {
        return Err(LyricsError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| LyricsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(TimedTextIndex::parse(&content))
}
