mod clock;
mod core;
mod http;
mod ingest;
mod render;

use lyric_proto::config::Config;
use lyric_proto::state::{Session, SnapshotStore};
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// A new snapshot is in the store.
    SnapshotUpdated,
    /// A warning or error line for the console.
    Log(String),
}

/// Forwards WARN and ERROR events to the broadcast channel so the console
/// renderer can show them next to the lyrics.
struct BroadcastLayer {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastLayer {
    fn new(sender: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        let _ = self.sender.send(BroadcastMessage::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(256);

    let data_dir = lyric_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("lyricd.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(BroadcastLayer::new(broadcast_tx.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,lyric_daemon=debug,lyric_proto=debug")
            }),
        )
        .init();

    eprintln!("lyricd log: {}", log_path.display());

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!("Config loaded from: {:?}", Config::config_path());
    info!("Lyrics directory: {:?}", config.paths.lyrics_dir);

    // Delivery channel: ingestion and clock both feed DaemonCore
    let (event_tx, event_rx) = mpsc::unbounded_channel::<core::DaemonEvent>();

    let session = Session::new(config.paths.lyrics_dir.clone());
    let store = SnapshotStore::new(session.snapshot(0));
    let daemon_core = core::DaemonCore::new(session, store.clone(), broadcast_tx.clone());

    let renderer = render::ConsoleRenderer::new(config.display_options(), store.clone());
    tokio::spawn(renderer.run(broadcast_tx.subscribe()));

    let pipeline = ingest::IngestionPipeline::new(event_tx.clone(), config.cover_cache_path());
    let _http_handle = http::start_server(
        config.bind_address(),
        http::HttpState {
            pipeline,
            store: store.clone(),
        },
    );

    let _clock_handle = clock::PlaybackClock::spawn(event_tx.clone());

    let shutdown_tx = event_tx;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            let _ = shutdown_tx.send(core::DaemonEvent::Shutdown);
        }
    });

    info!("lyricd initialised, running event loop");
    daemon_core.run(event_rx).await;

    Ok(())
}
