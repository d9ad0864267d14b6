//! # flrp-core
//!
//! Presence-sync core for the FL Studio rich presence relay.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. One thread owns [`PresenceSync`] and its channel.
//! - **Injected collaborators**: Process probe, status source and connector are traits,
//!   so the state machine runs in tests without sockets or a real FL Studio.
//! - **Graceful degradation**: A missing status file or an absent Discord client is a
//!   downgrade, never an error surfaced to the frontend.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flrp_core::{
//!     load_config, platform_endpoints, IpcConnector, JsonStatusFile, OperatorControls,
//!     PresenceSync, SysinfoProbe,
//! };
//! use std::sync::Arc;
//!
//! let config = load_config(None, &std::env::current_dir()?)?;
//! let connector = IpcConnector::new(platform_endpoints(), config.application_id.clone());
//! let controls = Arc::new(OperatorControls::new());
//! let mut sync = PresenceSync::new(
//!     SysinfoProbe::new(),
//!     JsonStatusFile::new(&config.status_file),
//!     connector,
//!     controls,
//! );
//! sync.run(config.poll_interval());
//! ```

pub mod activity;
pub mod channel;
pub mod config;
pub mod controls;
pub mod error;
pub mod probe;
pub mod status;
pub mod sync;

pub use activity::{build_activity, starting_up_activity};
pub use channel::{
    platform_endpoints, IpcConnector, IpcEndpoints, PlatformEndpoints, PresenceChannel,
    PresenceConnector, PresenceLink, DEFAULT_IO_TIMEOUT,
};
#[cfg(windows)]
pub use channel::NamedPipeEndpoints;
#[cfg(unix)]
pub use channel::UnixSocketEndpoints;
pub use config::{load_config, RelayConfig};
pub use controls::OperatorControls;
pub use error::{ChannelError, ConfigError, ConnectError, StatusReadError};
pub use probe::{matches_target, ProcessProbe, SysinfoProbe};
pub use status::{read_status_file, ActivitySnapshot, DisplayKey, JsonStatusFile, StatusSource};
pub use sync::{ConnectionState, PresenceSync, SyncPhase, SyncStatus, TickReport};
