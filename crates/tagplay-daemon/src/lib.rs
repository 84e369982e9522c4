//! The tagplay daemon: wiring, configuration and the coordination loop.
//!
//! The binary (`tagplay`) parses its configuration with [`cli`], installs
//! logging with [`logging`], builds devices and storage with [`setup`] and
//! hands everything to an [`Orchestrator`]. The library half exists so the
//! coordination loop can be driven by tests with mock sources.
//!
//! # Examples
//!
//! ```no_run
//! use tagplay_core::AudioSettings;
//! use tagplay_daemon::orchestrator::{Orchestrator, OrchestratorConfig};
//! use tagplay_hardware::mock::MockAudio;
//! use tagplay_hardware::playback::PlaybackController;
//! use tagplay_hardware::sources::SourceHandle;
//! use tagplay_storage::{Database, SqliteMediaMappingRepository, TagResolver};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::in_memory().await?;
//! let resolver = TagResolver::new(SqliteMediaMappingRepository::new(db.pool().clone()));
//! let (output, _audio) = MockAudio::new();
//! let playback = PlaybackController::new(output, "media", &AudioSettings::default());
//!
//! let mut orchestrator = Orchestrator::new(resolver, playback, OrchestratorConfig::default());
//! let (sources, _inject) = SourceHandle::channels(8);
//! orchestrator.run(sources, CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod event;
pub mod logging;
pub mod orchestrator;
pub mod setup;

pub use event::{Cue, Outcome, PlayerEvent};
pub use orchestrator::{OrchestrationFault, Orchestrator, OrchestratorConfig};
