//! penlinkd - host agent daemon for BLE smartpens.
//!
//! The daemon wires the [`penlink_core::Agent`] to the system Bluetooth
//! stack, prints every downloaded drawing as JSON on stdout and logs
//! everything else.
//!
//! # Configuration
//!
//! The daemon reads `penlinkd.toml` from the platform configuration
//! directory (`~/.config/penlink/` on Linux):
//!
//! ```toml
//! [agent]
//! vendor_id = 18261        # 0x4755
//! listen = false           # start discovery on startup
//! event_capacity = 100
//! dimensions = [0, 0]
//!
//! [logging]
//! level = "info"
//!
//! [output]
//! format = "json"          # or "pretty"
//! ```

pub mod config;
pub mod logging;
pub mod output;
pub mod probe;

pub use config::{Config, ConfigError, ValidationError, default_config_path};
pub use logging::LogConfig;
pub use output::{OutputFormat, print_events, write_event};
pub use probe::NotificationProbe;
