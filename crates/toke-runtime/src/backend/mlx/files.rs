//! Which files make up an MLX model snapshot.

use std::path::Path;

use reqwest::{Client, Url};
use serde::Deserialize;

const GIB: u64 = 1024 * 1024 * 1024;

/// One file of a model repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    /// Path inside the repository.
    pub path: String,
    pub size: u64,
}

impl ModelFile {
    fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    #[serde(default)]
    size: u64,
    lfs: Option<LfsPointer>,
}

#[derive(Debug, Deserialize)]
struct LfsPointer {
    size: u64,
}

/// Split `https://host/org/name` into `("https://host", "org/name")`.
fn split_repo_url(model_url: &str) -> Option<(String, String)> {
    let url = Url::parse(model_url).ok()?;
    let repo = url.path().trim_matches('/').to_string();
    if repo.is_empty() {
        return None;
    }
    let origin = url.origin().ascii_serialization();
    Some((origin, repo))
}

/// Listing endpoint for the repository at `model_url`.
pub fn tree_url(model_url: &str) -> Option<String> {
    let (origin, repo) = split_repo_url(model_url)?;
    Some(format!("{origin}/api/models/{repo}/tree/main"))
}

/// Download URL of `path` in the repository at `model_url`.
pub fn file_url(model_url: &str, path: &str) -> String {
    format!("{}/resolve/main/{path}", model_url.trim_end_matches('/'))
}

/// Ask the hub for the repository's files. LFS sizes win over pointer sizes.
pub async fn list_model_files(client: &Client, model_url: &str) -> Result<Vec<ModelFile>, String> {
    let url = tree_url(model_url).ok_or_else(|| format!("not a repository URL: {model_url}"))?;
    let response = client.get(&url).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("file listing returned {}", response.status()));
    }
    let entries: Vec<TreeEntry> = response.json().await.map_err(|e| e.to_string())?;
    Ok(entries
        .into_iter()
        .filter(|e| e.kind == "file")
        .map(|e| {
            let size = e.lfs.map_or(e.size, |lfs| lfs.size);
            ModelFile::new(e.path, size)
        })
        .collect())
}

/// Typical file set used when the listing cannot be fetched.
pub fn fallback_files(model_url: &str) -> Vec<ModelFile> {
    let mut files = vec![
        ModelFile::new("config.json", 10_000),
        ModelFile::new("tokenizer.json", 1_000_000),
        ModelFile::new("tokenizer_config.json", 10_000),
        ModelFile::new("special_tokens_map.json", 5_000),
        ModelFile::new("model.safetensors.index.json", 50_000),
    ];
    if model_url.contains("7B") {
        files.extend(
            (1..=3).map(|i| ModelFile::new(format!("model-0000{i}-of-00003.safetensors"), 2 * GIB)),
        );
    } else {
        files.push(ModelFile::new("model.safetensors", 5 * GIB));
    }
    files
}

/// Keep weights, configs and tokenizers; drop docs and dotfiles.
pub fn wanted_model_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    if name.starts_with('.') || name.ends_with(".md") || name.ends_with(".txt") {
        return false;
    }
    name.ends_with(".json") || name.ends_with(".safetensors") || name.contains("tokenizer")
}

/// Config, tokenizer and at least the first weight shard are present.
pub fn is_mlx_model_complete(dir: &Path) -> bool {
    if !dir.join("config.json").is_file() || !dir.join("tokenizer.json").is_file() {
        return false;
    }
    if dir.join("model.safetensors").is_file() {
        return true;
    }
    std::fs::read_dir(dir).is_ok_and(|entries| {
        entries.flatten().any(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with("model-00001-of-") && name.ends_with(".safetensors")
        })
    })
}
