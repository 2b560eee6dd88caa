//! Configuration file location for the CLI
//!
//! Thresholds and naming templates are read by [`mend_lib::EngineConfig`];
//! the CLI only decides where the file lives.

use std::path::PathBuf;

/// Default config file path, `~/.config/stackmend/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    let home = dirs_next::home_dir()?;
    Some(home.join(".config").join("stackmend").join("config.toml"))
}
