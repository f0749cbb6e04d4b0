/// Console renderer — prints the display window whenever it changes.
///
/// Stands in for a graphical overlay.  It holds its own copy of the display
/// options, reads snapshots from the shared store, and never talks to the
/// core directly.
use lyric_proto::config::DisplayOptions;
use lyric_proto::protocol::{SessionState, Snapshot};
use lyric_proto::state::SnapshotStore;
use tokio::sync::broadcast;
use tracing::warn;

use crate::BroadcastMessage;

const RESET: &str = "\x1b[0m";
const BAR_WIDTH: usize = 20;

pub struct ConsoleRenderer {
    options: DisplayOptions,
    store: SnapshotStore,
    last_frame: Option<String>,
}

impl ConsoleRenderer {
    pub fn new(options: DisplayOptions, store: SnapshotStore) -> Self {
        Self {
            options,
            store,
            last_frame: None,
        }
    }

    pub async fn run(mut self, mut rx: broadcast::Receiver<BroadcastMessage>) {
        loop {
            match rx.recv().await {
                Ok(BroadcastMessage::SnapshotUpdated) => self.refresh().await,
                Ok(BroadcastMessage::Log(line)) => eprintln!("{}", line),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("render: skipped {} updates", n);
                    self.refresh().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn refresh(&mut self) {
        let snapshot = self.store.get().await;
        let frame = render_frame(&snapshot, &self.options);
        if self.last_frame.as_deref() != Some(frame.as_str()) {
            println!("{}", frame);
            self.last_frame = Some(frame);
        }
    }
}

/// Text for one snapshot.  Colors come from the options as 24-bit ANSI.
pub fn render_frame(snapshot: &Snapshot, options: &DisplayOptions) -> String {
    let text = ansi_fg(&options.ui.text_color);
    let highlight = ansi_fg(&options.ui.highlight_color);
    let paint = |color: &Option<String>, s: &str| match color {
        Some(c) if !s.is_empty() => format!("{}{}{}", c, s, RESET),
        _ => s.to_string(),
    };

    let mut lines = vec![
        paint(&text, &snapshot.title_line),
        format!("  {}", paint(&text, &snapshot.window.prev)),
        format!("> {}", paint(&highlight, &snapshot.window.curr)),
        format!("  {}", paint(&text, &snapshot.window.next)),
    ];

    if snapshot.state == SessionState::Playing {
        let mut status = Vec::new();
        if options.features.show_timecode {
            status.push(snapshot.timecode.clone());
        }
        if options.features.show_progress {
            status.push(progress_bar(snapshot.progress_percent));
        }
        if !status.is_empty() {
            lines.push(format!("  {}", status.join("  ")));
        }
        if options.features.show_cd {
            let cover = snapshot
                .cover_path
                .clone()
                .or_else(|| Some(options.default_cover.clone()).filter(|p| p.exists()));
            if let Some(cover) = cover {
                lines.push(format!("  cover: {}", cover.display()));
            }
        }
        if !snapshot.next_line.is_empty() {
            lines.push(format!("  up next: {}", snapshot.next_line));
        }
    }

    lines.join("\n")
}

fn progress_bar(percent: u8) -> String {
    let filled = (percent as usize * BAR_WIDTH) / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        percent
    )
}

/// `#RRGGBB` → ANSI 24-bit foreground escape.  Anything else yields `None`
/// and the text is printed uncolored.
fn ansi_fg(hex: &str) -> Option<String> {
    let hex = hex.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(format!(
        "\x1b[38;2;{};{};{}m",
        channel(0)?,
        channel(2)?,
        channel(4)?
    ))
}
