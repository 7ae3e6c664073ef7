//! Default path resolution for configuration files
//!
//! Uses XDG Base Directory specification when available, with sensible fallbacks.

use std::path::PathBuf;

/// Returns the default path for the daemon configuration file.
///
/// - Linux/macOS: `~/.config/fixtured/config.toml`
/// - Fallback: `/etc/fixtured/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("fixtured")
        .join("config.toml")
}

/// Returns the default data directory holding the hardware profile and
/// fixture parameter files.
///
/// - Linux/macOS: `~/.local/share/fixtured`
/// - Fallback: `/var/lib/fixtured`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("fixtured")
}
