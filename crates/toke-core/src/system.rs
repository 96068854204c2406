//! Hardware-based model recommendations.
//!
//! Probing the hardware lives in `toke-runtime`; this module only holds the
//! snapshot type and the pure selection rules.

use serde::{Deserialize, Serialize};

use crate::catalog::{ModelCatalog, ModelOption, ModelTier};

const GIB: u64 = 1024 * 1024 * 1024;
const MAX_RECOMMENDATIONS: usize = 3;
const FALLBACK_MODEL_ID: &str = "qwen2.5-3b-q4_k_m";

/// Snapshot of the host's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Total RAM in bytes.
    pub total_memory: u64,
    /// Available RAM in bytes.
    pub available_memory: u64,
    pub cpu_cores: usize,
    /// Free disk space in bytes on the volume holding the data root.
    pub free_disk: u64,
    pub is_apple_silicon: bool,
}

impl SystemInfo {
    pub const fn total_memory_gb(&self) -> u64 {
        self.total_memory / GIB
    }

    pub const fn free_disk_gb(&self) -> u64 {
        self.free_disk / GIB
    }
}

/// Up to three catalog models suited to `info`, best first.
pub fn recommend_models_for_system(catalog: &ModelCatalog, info: &SystemInfo) -> Vec<ModelOption> {
    let ram = info.total_memory_gb();
    let disk = info.free_disk_gb();
    let mut picks: Vec<&ModelOption> = Vec::new();

    if info.is_apple_silicon {
        let mlx_rules: [(u64, u64, &str); 4] = [
            (48, 40, "glm-4.5-air-8bit"),
            (24, 60, "glm-4.5-air-4bit"),
            (16, 15, "glm-4.5-air-3bit"),
            (8, 6, "qwen2.5-coder-7b-4bit"),
        ];
        for (min_ram, min_disk, id) in mlx_rules {
            if ram >= min_ram && disk >= min_disk {
                picks.extend(catalog.get_model_by_id(id));
            }
        }
    }

    if ram >= 64 && disk >= 50 {
        picks.extend(catalog.get_model_by_id("glm-4.5-air-q2_k"));
    }
    if ram >= 16 && disk >= 10 {
        picks.extend(catalog.recommended_by_tier(ModelTier::Balanced));
    }
    if ram >= 8 && disk >= 5 {
        picks.extend(catalog.recommended_model());
    }
    if ram >= 4 && disk >= 3 {
        picks.extend(catalog.get_model_by_id(FALLBACK_MODEL_ID));
    }

    if picks.is_empty() {
        picks.extend(catalog.get_model_by_id(FALLBACK_MODEL_ID));
    }

    let mut seen = std::collections::HashSet::new();
    picks
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .take(MAX_RECOMMENDATIONS)
        .cloned()
        .collect()
}

/// One-line comparison of a model's needs against the host, e.g.
/// `RAM: ✓ 8GB/32GB | Disk: ✗ 45GB/20GB`.
pub fn format_system_requirement(model: &ModelOption, info: &SystemInfo) -> String {
    let total_ram = info.total_memory_gb();
    let free_disk = info.free_disk_gb();
    let model_ram = model.memory_required / GIB;
    let model_disk = model.size / GIB;

    let mark = |need: u64, have: u64| if need > have { "✗" } else { "✓" };

    format!(
        "RAM: {} {model_ram}GB/{total_ram}GB | Disk: {} {model_disk}GB/{free_disk}GB",
        mark(model_ram, total_ram),
        mark(model_disk, free_disk),
    )
}
