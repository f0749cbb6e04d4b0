/// Ingestion pipeline — turns raw transport input into `NowPlayingEvent`s.
///
/// Called concurrently from any number of HTTP handler tasks.  It never
/// touches session state: it normalizes fields, persists an attached cover
/// image, and hands the finished event to the core's delivery channel.
/// Deduplication is left to the consumer so it always compares against the
/// latest accepted fingerprint.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use lyric_proto::protocol::{NowPlayingEvent, FIELD_COVER};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::DaemonEvent;

/// A binary part received alongside the scalar fields.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub field: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("event consumer is no longer running")]
    Closed,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    delivery: mpsc::UnboundedSender<DaemonEvent>,
    cover_cache: PathBuf,
}

impl IngestionPipeline {
    pub fn new(delivery: mpsc::UnboundedSender<DaemonEvent>, cover_cache: PathBuf) -> Self {
        Self {
            delivery,
            cover_cache,
        }
    }

    /// Normalize one inbound request and hand it off.  Returns as soon as the
    /// event is queued; processing happens on the core task.
    pub async fn accept(
        &self,
        fields: HashMap<String, String>,
        attachment: Option<Attachment>,
        source_addr: String,
    ) -> Result<(), IngestError> {
        let cover_path = match attachment {
            Some(a) if a.field == FIELD_COVER && !a.bytes.is_empty() => {
                match write_atomic(&self.cover_cache, &a.bytes).await {
                    Ok(()) => Some(self.cover_cache.clone()),
                    Err(e) => {
                        warn!(
                            "ingest: failed to store cover at {:?}: {}",
                            self.cover_cache, e
                        );
                        None
                    }
                }
            }
            Some(a) => {
                debug!("ingest: ignoring attachment field {:?}", a.field);
                None
            }
            None => None,
        };

        let event = NowPlayingEvent::from_fields(&fields, cover_path, source_addr);
        debug!(
            "ingest: {} from {:?}",
            event.fingerprint(),
            event.source_addr
        );

        self.delivery
            .send(DaemonEvent::NowPlaying(event))
            .map_err(|_| IngestError::Closed)
    }
}

/// Replace `target` with `bytes` so that readers only ever see the old file
/// or the complete new one.
async fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cover".to_string());
    // Concurrent uploads each get their own temp file; the last rename wins.
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = dir.join(format!(".{}.{}.{}.tmp", file_name, std::process::id(), seq));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, target).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyric_proto::protocol::PlayState;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn recv_event(rx: &mut mpsc::UnboundedReceiver<DaemonEvent>) -> NowPlayingEvent {
        match rx.try_recv() {
            Ok(DaemonEvent::NowPlaying(event)) => event,
            other => panic!("expected NowPlaying, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accept_normalizes_and_delivers() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = IngestionPipeline::new(tx, dir.path().join("cover.jpg"));

        pipeline
            .accept(
                fields(&[("state", " STOP "), ("artist", " X ")]),
                None,
                "10.0.0.2".into(),
            )
            .await
            .unwrap();

        let event = recv_event(&mut rx);
        assert_eq!(event.state, PlayState::Stop);
        assert_eq!(event.artist, "X");
        assert_eq!(event.cover_path, None);
        assert_eq!(event.source_addr, "10.0.0.2");
    }

    #[tokio::test]
    async fn test_duplicates_are_not_dropped_by_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = IngestionPipeline::new(tx, dir.path().join("cover.jpg"));

        for _ in 0..3 {
            pipeline
                .accept(fields(&[("artist", "X"), ("title", "Y")]), None, String::new())
                .await
                .unwrap();
        }
        for _ in 0..3 {
            assert_eq!(recv_event(&mut rx).fingerprint(), "X|Y|play");
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delivery_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = IngestionPipeline::new(tx, dir.path().join("cover.jpg"));

        for i in 0..20 {
            let title = format!("T{}", i);
            pipeline
                .accept(fields(&[("title", title.as_str())]), None, String::new())
                .await
                .unwrap();
        }
        for i in 0..20 {
            assert_eq!(recv_event(&mut rx).title, format!("T{}", i));
        }
    }

    #[tokio::test]
    async fn test_cover_attachment_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let cover = dir.path().join("cache").join("cover.jpg");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = IngestionPipeline::new(tx, cover.clone());

        std::fs::create_dir_all(cover.parent().unwrap()).unwrap();
        std::fs::write(&cover, b"old").unwrap();

        let attachment = Attachment {
            field: FIELD_COVER.to_string(),
            bytes: b"\xff\xd8new-cover".to_vec(),
        };
        pipeline
            .accept(fields(&[("title", "Y")]), Some(attachment), String::new())
            .await
            .unwrap();

        let event = recv_event(&mut rx);
        assert_eq!(event.cover_path.as_deref(), Some(cover.as_path()));
        assert_eq!(std::fs::read(&cover).unwrap(), b"\xff\xd8new-cover");

        // No temp files left next to the cover.
        let leftovers: Vec<_> = std::fs::read_dir(cover.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "cover.jpg")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_or_empty_attachment_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cover = dir.path().join("cover.jpg");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = IngestionPipeline::new(tx, cover.clone());

        let other = Attachment {
            field: "lyrics".into(),
            bytes: b"data".to_vec(),
        };
        pipeline
            .accept(fields(&[]), Some(other), String::new())
            .await
            .unwrap();
        assert_eq!(recv_event(&mut rx).cover_path, None);

        let empty = Attachment {
            field: FIELD_COVER.into(),
            bytes: Vec::new(),
        };
        pipeline
            .accept(fields(&[("title", "b")]), Some(empty), String::new())
            .await
            .unwrap();
        assert_eq!(recv_event(&mut rx).cover_path, None);
        assert!(!cover.exists());
    }

    #[tokio::test]
    async fn test_cover_write_failure_still_delivers() {
        let dir = tempfile::tempdir().unwrap();
        // Parent "directory" is a regular file, so the write must fail.
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = IngestionPipeline::new(tx, blocker.join("cover.jpg"));

        let attachment = Attachment {
            field: FIELD_COVER.into(),
            bytes: b"img".to_vec(),
        };
        pipeline
            .accept(fields(&[("title", "Y")]), Some(attachment), String::new())
            .await
            .unwrap();

        let event = recv_event(&mut rx);
        assert_eq!(event.title, "Y");
        assert_eq!(event.cover_path, None);
    }

    #[tokio::test]
    async fn test_closed_channel_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let pipeline = IngestionPipeline::new(tx, dir.path().join("cover.jpg"));
        let result = pipeline.accept(fields(&[]), None, String::new()).await;
        assert!(matches!(result, Err(IngestError::Closed)));
    }
}
