//! Manifest types and release-feed parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toke_core::Platform;

/// One downloadable executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    pub url: String,
    pub size: u64,
    pub executable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub platform: String,
}

/// Versioned list of dependencies for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    pub updated_at: DateTime<Utc>,
}

impl Manifest {
    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }
}

/// GitHub API response for a release
#[derive(Debug, Deserialize)]
pub(super) struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// GitHub API response for a release asset
#[derive(Debug, Deserialize)]
pub(super) struct GitHubAsset {
    pub name: String,
    pub size: u64,
    pub browser_download_url: String,
}

struct AssetPattern {
    name: &'static str,
    executable: String,
    pattern: String,
    required: bool,
}

fn asset_patterns(platform: Platform) -> Vec<AssetPattern> {
    let exe = platform.exe_suffix();
    vec![
        AssetPattern {
            name: "llama",
            executable: format!("llama-server{exe}"),
            pattern: format!("llama-server-{platform}"),
            required: true,
        },
        AssetPattern {
            name: "mlx",
            executable: "mlx-server".to_string(),
            pattern: "mlx-server-bundle".to_string(),
            required: platform.is_apple_silicon(),
        },
        AssetPattern {
            name: "diffusion",
            executable: "diffusion_server.py".to_string(),
            pattern: "diffusion-server-bundle".to_string(),
            required: false,
        },
        AssetPattern {
            name: "ngrok",
            executable: format!("ngrok{exe}"),
            pattern: format!("ngrok-{platform}"),
            required: false,
        },
    ]
}

/// Executable name a dependency installs as, for the well-known names.
pub(super) fn known_executable(name: &str, platform: Platform) -> Option<String> {
    asset_patterns(platform)
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.executable)
}

/// Build a manifest from a release by matching asset names per platform.
///
/// For each known dependency the first asset whose name contains the
/// dependency's pattern wins; dependencies without a matching asset are
/// left out.
pub(super) fn manifest_from_release(
    release: &GitHubRelease,
    platform: Platform,
    now: DateTime<Utc>,
) -> Manifest {
    let dependencies = asset_patterns(platform)
        .into_iter()
        .filter_map(|p| {
            let asset = release.assets.iter().find(|a| a.name.contains(&p.pattern))?;
            Some(Dependency {
                name: p.name.to_string(),
                version: release.tag_name.clone(),
                url: asset.browser_download_url.clone(),
                size: asset.size,
                executable: p.executable,
                local_path: None,
                required: p.required,
                platform: platform.to_string(),
            })
        })
        .collect();

    Manifest {
        version: release.tag_name.clone(),
        dependencies,
        updated_at: now,
    }
}
