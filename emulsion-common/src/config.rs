//! Configuration loading and root folder resolution
//!
//! The root folder holds everything the CMS owns on disk: the SQLite
//! database, uploaded media and generated variants, installed plugins,
//! and update backups.

use crate::{Error, Result};
use std::path::PathBuf;

/// Resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(root_folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_root_folder())
}

/// Get default configuration file path for the platform
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("emulsion").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/emulsion/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("emulsion"))
        .unwrap_or_else(|| PathBuf::from("./emulsion_data"))
}

/// Well-known locations inside the root folder.
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// SQLite database file
    pub fn database(&self) -> PathBuf {
        self.root.join("emulsion.db")
    }

    /// Uploaded original media, one subdirectory per album
    pub fn media(&self) -> PathBuf {
        self.root.join("media")
    }

    /// Generated image variants
    pub fn variants(&self) -> PathBuf {
        self.root.join("media").join("variants")
    }

    /// Installed plugin packages
    pub fn plugins(&self) -> PathBuf {
        self.root.join("plugins")
    }

    /// Update snapshots (database + application files)
    pub fn backups(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Advisory lock taken while an update is applied
    pub fn update_lock(&self) -> PathBuf {
        self.root.join("update.lock")
    }

    /// Create every directory the server expects to exist.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.media(),
            self.variants(),
            self.plugins(),
            self.backups(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins() {
        let root = resolve_root_folder(Some("/tmp/emulsion-test"), "EMULSION_TEST_UNSET").unwrap();
        assert_eq!(root, PathBuf::from("/tmp/emulsion-test"));
    }

    #[test]
    fn env_var_beats_default() {
        std::env::set_var("EMULSION_TEST_ROOT_A", "/tmp/from-env");
        let root = resolve_root_folder(None, "EMULSION_TEST_ROOT_A").unwrap();
        assert_eq!(root, PathBuf::from("/tmp/from-env"));
        std::env::remove_var("EMULSION_TEST_ROOT_A");
    }

    #[test]
    fn paths_derive_from_root() {
        let paths = Paths::new("/srv/emulsion");
        assert_eq!(paths.database(), PathBuf::from("/srv/emulsion/emulsion.db"));
        assert_eq!(paths.media(), PathBuf::from("/srv/emulsion/media"));
        assert_eq!(paths.backups(), PathBuf::from("/srv/emulsion/backups"));
    }

    #[test]
    fn ensure_directories_creates_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::new(tmp.path().join("data"));
        paths.ensure_directories().unwrap();
        assert!(paths.media().is_dir());
        assert!(paths.plugins().is_dir());
        assert!(paths.variants().is_dir());
    }
}
