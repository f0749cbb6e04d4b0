/// DaemonCore — single-owner event loop for the now-playing session.
///
/// The ingestion pipeline and the playback clock both send `DaemonEvent`s
/// into one unbounded channel.  DaemonCore drains it in order and is the only
/// code that touches the `Session`, so an event and a tick can never
/// interleave.
///
/// After every change it publishes a fresh `Snapshot` to the shared store and
/// announces it with `BroadcastMessage::SnapshotUpdated`.
use lyric_proto::protocol::NowPlayingEvent;
use lyric_proto::state::{Session, SnapshotStore, Transition};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::BroadcastMessage;

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A normalized notification from the ingestion pipeline.
    NowPlaying(NowPlayingEvent),
    /// Clock tick from `PlaybackClock`.
    Tick { step_ms: u64 },
    /// Shutdown requested.
    Shutdown,
}

pub struct DaemonCore {
    session: Session,
    store: SnapshotStore,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    /// Revision of the last published snapshot.
    rev: u64,
}

impl DaemonCore {
    pub fn new(
        session: Session,
        store: SnapshotStore,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        Self {
            session,
            store,
            broadcast_tx,
            rev: 0,
        }
    }

    /// Run until `Shutdown` arrives or every sender is dropped.
    pub async fn run(mut self, mut event_rx: mpsc::UnboundedReceiver<DaemonEvent>) {
        info!("DaemonCore: starting event loop");
        self.publish().await;

        while let Some(evt) = event_rx.recv().await {
            let changed = match evt {
                DaemonEvent::Shutdown => {
                    info!("DaemonCore: shutdown requested");
                    break;
                }
                DaemonEvent::NowPlaying(event) => self.handle_now_playing(event),
                DaemonEvent::Tick { step_ms } => self.session.tick(step_ms),
            };

            if changed {
                self.publish().await;
            }
        }

        info!("DaemonCore: event loop finished");
    }

    fn handle_now_playing(&mut self, event: NowPlayingEvent) -> bool {
        let fingerprint = event.fingerprint();
        let source = event.source_addr.clone();

        match self.session.apply(event) {
            Transition::Ignored => {
                debug!("DaemonCore: duplicate {} from {:?} ignored", fingerprint, source);
                false
            }
            Transition::Stopped => {
                info!("DaemonCore: stopped (from {:?})", source);
                true
            }
            Transition::Started => {
                info!(
                    "DaemonCore: now playing {:?} ({} ms, lyrics: {})",
                    self.session.title_line(),
                    self.session.duration_ms(),
                    self.session
                        .lyrics()
                        .map(|l| format!("{} lines", l.len()))
                        .unwrap_or_else(|| "none".to_string()),
                );
                true
            }
        }
    }

    async fn publish(&mut self) {
        self.rev += 1;
        self.store.publish(self.session.snapshot(self.rev)).await;
        // No subscribers is fine.
        let _ = self.broadcast_tx.send(BroadcastMessage::SnapshotUpdated);
    }
}
