//! Plugin discovery and install/activate state machine
//!
//! A plugin is a directory under the plugins folder carrying a
//! `plugin.toml` manifest. Its lifecycle is tracked in the
//! `plugin_status` table: discovered (no row) -> installed -> active,
//! with deactivate and uninstall walking back down. Activation registers
//! the hooks the manifest declares; deactivation removes them.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::hooks::HookRegistry;
use emulsion_common::{Error, Result};

/// Parsed `plugin.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hooks: Vec<HookDecl>,
}

/// A hook declared by a plugin manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookDecl {
    pub hook: String,
    /// action | filter
    pub kind: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    10
}

/// Lifecycle states persisted in `plugin_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Installed,
    Active,
}

impl PluginState {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginState::Installed => "installed",
            PluginState::Active => "active",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "installed" => Some(PluginState::Installed),
            "active" => Some(PluginState::Active),
            _ => None,
        }
    }
}

/// Scan the plugins directory for manifests. Directories without a
/// readable manifest are skipped with a warning.
pub fn discover(plugins_dir: &Path) -> Result<Vec<PluginManifest>> {
    let mut manifests = Vec::new();

    if !plugins_dir.is_dir() {
        return Ok(manifests);
    }

    for entry in std::fs::read_dir(plugins_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let manifest_path = entry.path().join("plugin.toml");
        if !manifest_path.is_file() {
            continue;
        }

        let content = std::fs::read_to_string(&manifest_path)?;
        match toml::from_str::<PluginManifest>(&content) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => {
                warn!("Skipping plugin manifest {}: {}", manifest_path.display(), e);
            }
        }
    }

    manifests.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(manifests)
}

/// Find a single discovered manifest by plugin name.
pub fn find_manifest(plugins_dir: &Path, name: &str) -> Result<PluginManifest> {
    discover(plugins_dir)?
        .into_iter()
        .find(|m| m.name == name)
        .ok_or_else(|| Error::NotFound(format!("plugin {name}")))
}

pub async fn state_of(db: &SqlitePool, name: &str) -> Result<Option<PluginState>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT state FROM plugin_status WHERE name = ?")
            .bind(name)
            .fetch_optional(db)
            .await?;
    Ok(row.and_then(|(s,)| PluginState::parse(&s)))
}

/// discovered -> installed
pub async fn install(db: &SqlitePool, manifest: &PluginManifest) -> Result<()> {
    if state_of(db, &manifest.name).await?.is_some() {
        return Err(Error::Conflict(format!(
            "plugin {} is already installed",
            manifest.name
        )));
    }

    sqlx::query(
        "INSERT INTO plugin_status (name, version, state, installed_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&manifest.name)
    .bind(&manifest.version)
    .bind(PluginState::Installed.as_str())
    .bind(chrono::Utc::now().timestamp())
    .execute(db)
    .await?;

    info!("Installed plugin {} v{}", manifest.name, manifest.version);
    Ok(())
}

/// installed -> active; registers declared hooks.
pub async fn activate(
    db: &SqlitePool,
    hooks: &HookRegistry,
    manifest: &PluginManifest,
) -> Result<()> {
    match state_of(db, &manifest.name).await? {
        Some(PluginState::Installed) => {}
        Some(PluginState::Active) => {
            return Err(Error::Conflict(format!(
                "plugin {} is already active",
                manifest.name
            )));
        }
        None => {
            return Err(Error::Conflict(format!(
                "plugin {} is not installed",
                manifest.name
            )));
        }
    }

    sqlx::query("UPDATE plugin_status SET state = ? WHERE name = ?")
        .bind(PluginState::Active.as_str())
        .bind(&manifest.name)
        .execute(db)
        .await?;

    register_hooks(hooks, manifest);
    info!("Activated plugin {}", manifest.name);
    Ok(())
}

/// active -> installed; unregisters hooks.
pub async fn deactivate(db: &SqlitePool, hooks: &HookRegistry, name: &str) -> Result<()> {
    match state_of(db, name).await? {
        Some(PluginState::Active) => {}
        Some(PluginState::Installed) => {
            return Err(Error::Conflict(format!("plugin {name} is not active")));
        }
        None => {
            return Err(Error::Conflict(format!("plugin {name} is not installed")));
        }
    }

    sqlx::query("UPDATE plugin_status SET state = ? WHERE name = ?")
        .bind(PluginState::Installed.as_str())
        .bind(name)
        .execute(db)
        .await?;

    hooks.remove_plugin(name);
    info!("Deactivated plugin {name}");
    Ok(())
}

/// installed -> gone. An active plugin must be deactivated first.
pub async fn uninstall(db: &SqlitePool, name: &str) -> Result<()> {
    match state_of(db, name).await? {
        Some(PluginState::Installed) => {}
        Some(PluginState::Active) => {
            return Err(Error::Conflict(format!(
                "plugin {name} is active; deactivate it first"
            )));
        }
        None => {
            return Err(Error::Conflict(format!("plugin {name} is not installed")));
        }
    }

    sqlx::query("DELETE FROM plugin_status WHERE name = ?")
        .bind(name)
        .execute(db)
        .await?;

    info!("Uninstalled plugin {name}");
    Ok(())
}

/// Re-register hooks for every active plugin (server startup).
pub async fn restore_active_hooks(
    db: &SqlitePool,
    hooks: &HookRegistry,
    plugins_dir: &Path,
) -> Result<()> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT name FROM plugin_status WHERE state = 'active'")
            .fetch_all(db)
            .await?;

    for (name,) in rows {
        match find_manifest(plugins_dir, &name) {
            Ok(manifest) => register_hooks(hooks, &manifest),
            Err(_) => warn!("Active plugin {name} has no manifest on disk"),
        }
    }
    Ok(())
}

/// Declared hooks get tracing callbacks; filters pass values through
/// unchanged. Built-in Rust plugins register real callbacks directly on
/// the registry instead of via manifests.
fn register_hooks(hooks: &HookRegistry, manifest: &PluginManifest) {
    for decl in &manifest.hooks {
        let plugin = manifest.name.clone();
        let hook = decl.hook.clone();

        match decl.kind.as_str() {
            "action" => {
                let label = format!("{plugin}:{hook}");
                hooks.add_action(
                    &decl.hook,
                    &manifest.name,
                    decl.priority,
                    Arc::new(move |payload| {
                        tracing::debug!(plugin = %label, ?payload, "action hook fired");
                    }),
                );
            }
            "filter" => {
                hooks.add_filter(&decl.hook, &manifest.name, decl.priority, Arc::new(|v| v));
            }
            other => {
                warn!("Plugin {plugin} declares unknown hook kind '{other}' for {hook}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emulsion_common::db::init::init_memory_database;

    fn manifest(name: &str) -> PluginManifest {
        PluginManifest {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            hooks: vec![HookDecl {
                hook: "album_saved".to_string(),
                kind: "action".to_string(),
                priority: 10,
            }],
        }
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let db = init_memory_database().await.unwrap();
        let hooks = HookRegistry::new();
        let m = manifest("watermark");

        install(&db, &m).await.unwrap();
        assert_eq!(state_of(&db, "watermark").await.unwrap(), Some(PluginState::Installed));

        activate(&db, &hooks, &m).await.unwrap();
        assert_eq!(state_of(&db, "watermark").await.unwrap(), Some(PluginState::Active));
        assert!(hooks.registered_hooks().contains(&"album_saved".to_string()));

        deactivate(&db, &hooks, "watermark").await.unwrap();
        assert!(hooks.registered_hooks().is_empty());

        uninstall(&db, "watermark").await.unwrap();
        assert_eq!(state_of(&db, "watermark").await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_transitions_rejected() {
        let db = init_memory_database().await.unwrap();
        let hooks = HookRegistry::new();
        let m = manifest("exif-badge");

        // Activate before install
        assert!(activate(&db, &hooks, &m).await.is_err());

        install(&db, &m).await.unwrap();
        // Double install
        assert!(install(&db, &m).await.is_err());
        // Deactivate while merely installed
        assert!(deactivate(&db, &hooks, "exif-badge").await.is_err());

        activate(&db, &hooks, &m).await.unwrap();
        // Double activate
        assert!(activate(&db, &hooks, &m).await.is_err());
        // Uninstall while active
        assert!(uninstall(&db, "exif-badge").await.is_err());
    }

    #[test]
    fn discover_reads_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("watermark");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("plugin.toml"),
            r#"
name = "watermark"
version = "0.2.0"
description = "Stamps a watermark on variants"

[[hooks]]
hook = "variant_generated"
kind = "filter"
priority = 5
"#,
        )
        .unwrap();

        // A directory without a manifest is ignored
        std::fs::create_dir_all(tmp.path().join("empty")).unwrap();

        let found = discover(tmp.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "watermark");
        assert_eq!(found[0].hooks[0].priority, 5);
    }

    #[test]
    fn discover_missing_dir_is_empty() {
        let found = discover(Path::new("/nonexistent/plugins")).unwrap();
        assert!(found.is_empty());
    }
}
