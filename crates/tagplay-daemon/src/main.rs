use anyhow::{Context, Result, bail};
use clap::Parser;
use std::time::Duration;
use tagplay_core::DaemonConfig;
use tagplay_core::constants::{READINESS_CHECK_INTERVAL_SECS, READINESS_MAX_WAIT_SECS};
use tagplay_daemon::cli::{Cli, Command, HardwareArgs, SCAN_TIMEOUT_SECS};
use tagplay_daemon::{Orchestrator, OrchestratorConfig, logging, setup};
use tagplay_hardware::mock::MockRfidHandle;
use tagplay_hardware::playback::PlaybackController;
use tagplay_hardware::readiness::{DeviceNode, await_ready};
use tagplay_hardware::rfid_session::RfidSession;
use tagplay_hardware::sources::{SourceConfig, SourceManager};
use tagplay_storage::{
    MediaLibrary, MediaMappingRepository, SqliteMediaMappingRepository, TagResolver, UpsertOutcome,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_file.as_deref())?;

    let config = cli.daemon_config().context("Invalid configuration")?;

    match cli.command() {
        Command::Run => run(&cli.hardware, &config).await,
        Command::Map { media, tag } => map(&cli.hardware, &config, &media, tag).await,
        Command::Unmap { tag } => unmap(&config, &tag).await,
        Command::List => list(&config).await,
        Command::Files => files(&config).await,
    }
}

async fn run(hw: &HardwareArgs, config: &DaemonConfig) -> Result<()> {
    info!("Starting tagplay {}", tagplay_core::VERSION);

    if !hw.skip_readiness && !hw.simulate {
        let ready = await_ready(
            &DeviceNode::defaults(),
            Duration::from_secs(READINESS_CHECK_INTERVAL_SECS),
            Duration::from_secs(READINESS_MAX_WAIT_SECS),
        )
        .await;
        match ready {
            Ok(ready) => info!("Hardware ready after {:?}", ready.waited),
            Err(not_ready) => warn!("{}; continuing without it", not_ready),
        }
    }

    let db = setup::open_database(&config.database_url)
        .await
        .context("Cannot open the mapping database")?;
    let repo = SqliteMediaMappingRepository::new(db.pool().clone());

    let library = MediaLibrary::new(&config.media_path);
    match setup::dangling_mappings(&repo, &library).await {
        Ok(dangling) => {
            for mapping in dangling {
                warn!(
                    "Tag {} is mapped to {}, which is not in {}",
                    mapping.tag_id,
                    mapping.media_reference,
                    library.root().display()
                );
            }
        }
        Err(e) => warn!("Could not check mappings against the media directory: {}", e),
    }

    let (reader, simulated_reader) = setup::rfid_device(hw);
    let mut manager = SourceManager::new(SourceConfig::default());
    manager.register_rfid(RfidSession::new(reader, config.reader));
    if let Some(input) = setup::encoder_input(&config.encoder, hw.simulate) {
        manager.register_encoder(input);
    }

    let playback = PlaybackController::new(
        setup::audio_output(hw),
        config.media_path.clone(),
        &config.audio,
    );
    let mut orchestrator = Orchestrator::new(
        TagResolver::new(repo),
        playback,
        OrchestratorConfig::default(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));
    if let Some(reader) = simulated_reader {
        feed_simulated_tags(reader);
    }

    orchestrator.run(manager.start(), shutdown).await;

    db.close().await;
    info!("tagplay stopped");
    Ok(())
}

async fn watch_signals(shutdown: CancellationToken) {
    match wait_for_signal().await {
        Ok(name) => info!("Received {}, shutting down", name),
        Err(e) => {
            error!("Cannot listen for shutdown signals: {}", e);
            return;
        }
    }
    shutdown.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "Ctrl-C")
}

/// Drive the simulated reader from stdin: a line places that tag, an empty
/// line lifts it.
fn feed_simulated_tags(reader: MockRfidHandle) {
    let (tx, mut rx) = mpsc::channel::<String>(8);

    // A plain thread: a pending stdin read must not hold up runtime shutdown.
    let spawned = std::thread::Builder::new()
        .name("simulated-tags".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Cannot read simulated tags from stdin: {}", e);
        return;
    }

    info!("Simulated reader: type a tag id to place it, an empty line to lift it");
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            match line.trim() {
                "" => reader.remove_tag().await,
                tag_id => reader.place_tag(tag_id).await,
            }
        }
    });
}

async fn open_repository(config: &DaemonConfig) -> Result<SqliteMediaMappingRepository> {
    let db = setup::open_database(&config.database_url)
        .await
        .context("Cannot open the mapping database")?;
    Ok(SqliteMediaMappingRepository::new(db.pool().clone()))
}

async fn map(
    hw: &HardwareArgs,
    config: &DaemonConfig,
    media: &str,
    tag: Option<String>,
) -> Result<()> {
    let library = MediaLibrary::new(&config.media_path);
    if !library.contains(media).await {
        bail!(
            "{} is not a file in {}",
            media,
            library.root().display()
        );
    }

    let repo = open_repository(config).await?;
    let tag_id = match tag {
        Some(tag_id) => tag_id,
        None => scan_tag(hw, config).await?,
    };

    match repo.upsert(&tag_id, media).await? {
        UpsertOutcome::Created => println!("Mapped {} to {}", tag_id.trim(), media),
        UpsertOutcome::Updated { previous } => {
            println!("Remapped {} from {} to {}", tag_id.trim(), previous, media)
        }
    }
    Ok(())
}

async fn scan_tag(hw: &HardwareArgs, config: &DaemonConfig) -> Result<String> {
    let (reader, simulated) = setup::rfid_device(hw);
    if simulated.is_some() {
        bail!("No RFID reader to scan with; pass the tag id with --tag");
    }

    let mut session = RfidSession::new(reader, config.reader);
    println!("Hold the tag to the reader...");
    let read = session
        .read_with_timeout(Duration::from_secs(SCAN_TIMEOUT_SECS))
        .await;
    session.close().await;

    let read = read.context("No tag was read")?;
    println!("Detected tag {}", read.tag_id);
    Ok(read.tag_id)
}

async fn unmap(config: &DaemonConfig, tag: &str) -> Result<()> {
    let repo = open_repository(config).await?;
    repo.delete(tag).await?;
    println!("Removed mapping for {}", tag.trim());
    Ok(())
}

async fn list(config: &DaemonConfig) -> Result<()> {
    let repo = open_repository(config).await?;
    let library = MediaLibrary::new(&config.media_path);

    let mappings = repo.list_all().await?;
    if mappings.is_empty() {
        println!("No mappings");
    }
    for mapping in mappings {
        let missing = if library.contains(&mapping.media_reference).await {
            ""
        } else {
            "  (missing)"
        };
        println!("{}\t{}{}", mapping.tag_id, mapping.media_reference, missing);
    }
    Ok(())
}

async fn files(config: &DaemonConfig) -> Result<()> {
    let library = MediaLibrary::new(&config.media_path);

    let files = library.list_files().await?;
    if files.is_empty() {
        println!("No audio files found in {}", library.root().display());
    }
    for file in files {
        println!("{file}");
    }
    Ok(())
}
