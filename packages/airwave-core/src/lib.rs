//! Airwave — radio-streaming playback engine.
//!
//! Given a user-curated collection of internet radio stations, the engine
//! maintains exactly one active audio stream, survives transient network
//! failures, tracks now-playing metadata, runs a sleep timer, and hands
//! playback off between a local backend and a remote (cast) receiver
//! without disrupting state or observers.
//!
//! # Architecture
//!
//! - [`services::PlaybackSession`] — central orchestrator: owns the player,
//!   reacts to backend events, serves the command protocol
//! - [`player::SwappablePlayer`] — stable handle over hot-swappable
//!   [`player::BackendPlayer`] implementations
//! - [`services::SleepTimer`] — countdown that pauses playback on expiry
//! - [`services::MetadataHistory`] — bounded, deduplicated now-playing log
//! - [`services::CollectionSynchronizer`] — reloads the station collection
//!   on changed notifications keyed by modification timestamp
//! - [`player::RetryPolicy`] — transport-level reconnect decisions
//! - [`storage::StateStore`] — persisted-state read/write contract
//! - [`api`] — HTTP surface for remote controllers
//! - [`bootstrap`] — composition root wiring it all together

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod player;
pub mod runtime;
pub mod services;
pub mod station;
pub mod storage;
pub mod utils;

pub use bootstrap::{bootstrap, Engine, EngineOptions};
pub use config::EngineConfig;
pub use error::{AirwaveError, AirwaveResult};
pub use services::{CommandResponse, PlayerCommand, SessionHandle, SessionState};
pub use station::{Collection, Station};
