//! Release feed parsing and semantic-version gating

use semver::Version;
use serde::{Deserialize, Serialize};

use super::UpdateError;

/// Release feed document: a JSON object listing published releases.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseFeed {
    pub releases: Vec<Release>,
}

/// One published release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Semantic version, no leading `v`
    pub version: String,
    /// Oldest running version that may jump directly to this release
    pub min_version: Option<String>,
    /// Archive download URL
    pub url: String,
    /// SHA-256 hex digest of the archive
    pub sha256: String,
    /// Schema migrations shipped with this release
    #[serde(default)]
    pub migrations: Vec<MigrationStep>,
    #[serde(default)]
    pub notes: String,
}

/// A versioned SQL migration carried by a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStep {
    /// Target schema version once this statement has run
    pub version: i32,
    pub sql: String,
}

/// Result of evaluating the feed against the running version.
#[derive(Debug, Clone)]
pub enum UpdateCheckOutcome {
    UpToDate,
    UpdateAvailable { release: Release },
    /// A newer release exists but requires a newer base version first
    Gated {
        available: String,
        required: String,
    },
}

/// Download and parse the release feed.
pub async fn fetch_feed(url: &str) -> Result<ReleaseFeed, UpdateError> {
    if url.trim().is_empty() {
        return Err(UpdateError::Invalid(
            "update feed URL is not configured".to_string(),
        ));
    }

    let response = reqwest::get(url)
        .await
        .map_err(|e| UpdateError::Http(e.to_string()))?;
    if !response.status().is_success() {
        return Err(UpdateError::Http(format!(
            "feed fetch returned {}",
            response.status()
        )));
    }

    let feed: ReleaseFeed = response
        .json()
        .await
        .map_err(|e| UpdateError::Http(format!("feed parse failed: {e}")))?;
    Ok(feed)
}

/// Pick the newest release ahead of `current`, honoring `min_version`
/// gating. Releases with unparseable versions are skipped.
pub fn evaluate_feed(
    current: &Version,
    feed: &ReleaseFeed,
) -> Result<UpdateCheckOutcome, UpdateError> {
    let mut best: Option<(Version, &Release)> = None;

    for release in &feed.releases {
        let Ok(version) = Version::parse(&release.version) else {
            continue;
        };
        if &version <= current {
            continue;
        }
        match &best {
            Some((best_version, _)) if best_version >= &version => {}
            _ => best = Some((version, release)),
        }
    }

    let Some((version, release)) = best else {
        return Ok(UpdateCheckOutcome::UpToDate);
    };

    if let Some(min_version) = &release.min_version {
        let required = Version::parse(min_version).map_err(|e| {
            UpdateError::Invalid(format!("release {version} has invalid min_version: {e}"))
        })?;
        if current < &required {
            return Ok(UpdateCheckOutcome::Gated {
                available: release.version.clone(),
                required: min_version.clone(),
            });
        }
    }

    Ok(UpdateCheckOutcome::UpdateAvailable {
        release: release.clone(),
    })
}
