//! Where `settings.toml` lives.
//!
//! The platform config directory comes from [`dirs::config_dir`]
//! (`~/.config` on Linux, `~/Library/Application Support` on macOS,
//! `%APPDATA%` on Windows) with an `interview-voice` folder beneath it.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "interview-voice";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
}

impl AppPaths {
    /// Platform layout; the working directory stands in when the platform
    /// has no config directory.
    pub fn new() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::under(&base)
    }

    /// Same layout rooted at `base`.
    pub fn under(base: &Path) -> Self {
        let config_dir = base.join(APP_DIR);
        Self {
            settings_file: config_dir.join(SETTINGS_FILE),
            config_dir,
        }
    }

    /// The settings file named on the command line, else the platform one.
    pub fn settings_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit.unwrap_or_else(|| Self::new().settings_file)
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_base() {
        let paths = AppPaths::under(Path::new("/tmp/home"));
        assert_eq!(paths.config_dir, PathBuf::from("/tmp/home/interview-voice"));
        assert_eq!(
            paths.settings_file,
            PathBuf::from("/tmp/home/interview-voice/settings.toml")
        );
    }

    #[test]
    fn explicit_settings_path_wins() {
        let chosen = PathBuf::from("panel.toml");
        assert_eq!(AppPaths::settings_path(Some(chosen.clone())), chosen);
        assert!(AppPaths::settings_path(None).ends_with("interview-voice/settings.toml"));
    }
}
