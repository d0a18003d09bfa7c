//! Cross-Platform Path Utilities
//!
//! Resolves the netdiag data directory (`~/.netdiag/`) and the files in it.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the netdiag directory (~/.netdiag/)
pub fn netdiag_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".netdiag"))
}

/// Get the config file path (~/.netdiag/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(netdiag_dir()?.join("config.json"))
}

/// Get the session checkpoint database path (~/.netdiag/sessions.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(netdiag_dir()?.join("sessions.db"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the netdiag directory, creating it if it doesn't exist
pub fn ensure_netdiag_dir() -> AppResult<PathBuf> {
    let path = netdiag_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}
