//! Settings and where they are stored.
//!
//! [`AppConfig::load`] reads `settings.toml` from [`AppPaths`]; the engine
//! only ever sees validated values.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, ConfigError, InterviewConfig, PlaybackConfig, TransportConfig,
    VadConfig,
};
