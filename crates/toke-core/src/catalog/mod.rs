//! Static registry of downloadable models.
//!
//! The catalog is built once per host: MLX entries are only available on
//! Apple Silicon, and the default GGUF pick is only flagged recommended
//! where MLX is not an option.

mod entries;
mod model;

pub use model::{BackendKind, ModelOption, ModelTier};

use crate::platform::is_apple_silicon;

/// Id of the default model for hosts without a better match.
pub const DEFAULT_MODEL_ID: &str = "qwen2.5-coder-7b-q4_k_m";

/// Queryable list of catalog entries for one host.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelOption>,
}

impl ModelCatalog {
    /// Catalog for the current host.
    pub fn detect() -> Self {
        Self::for_host(is_apple_silicon())
    }

    /// Catalog for a host with the given Apple Silicon capability.
    pub fn for_host(is_apple_silicon: bool) -> Self {
        Self {
            models: entries::build(is_apple_silicon),
        }
    }

    /// All entries, available or not, in catalog order.
    pub fn models(&self) -> &[ModelOption] {
        &self.models
    }

    /// Entries that can run on this host.
    pub fn available_models(&self) -> impl Iterator<Item = &ModelOption> {
        self.models.iter().filter(|m| m.available)
    }

    pub fn get_model_by_id(&self, id: &str) -> Option<&ModelOption> {
        self.models.iter().find(|m| m.id == id)
    }

    /// The default model, falling back to the first entry.
    pub fn recommended_model(&self) -> Option<&ModelOption> {
        self.get_model_by_id(DEFAULT_MODEL_ID)
            .or_else(|| self.models.first())
    }

    pub fn models_by_tier(&self, tier: ModelTier) -> impl Iterator<Item = &ModelOption> {
        self.models.iter().filter(move |m| m.tier == tier)
    }

    /// First recommended entry in `tier`, else the tier's first entry.
    ///
    /// Available entries are preferred over unavailable ones at each step.
    pub fn recommended_by_tier(&self, tier: ModelTier) -> Option<&ModelOption> {
        let in_tier = || self.models_by_tier(tier);
        in_tier()
            .find(|m| m.recommended && m.available)
            .or_else(|| in_tier().find(|m| m.available))
            .or_else(|| in_tier().find(|m| m.recommended))
            .or_else(|| in_tier().next())
    }

    /// First recommended MLX entry usable on this host.
    pub fn recommended_mlx_model(&self) -> Option<&ModelOption> {
        self.available_models()
            .find(|m| m.provider == BackendKind::Mlx && m.recommended)
    }
}

/// Format a byte count with 1024-based units and one decimal place.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_ten_entries_in_order() {
        let catalog = ModelCatalog::for_host(false);
        assert_eq!(catalog.models().len(), 10);
        assert_eq!(catalog.models()[0].id, "glm-4.5-air-8bit");
        assert_eq!(catalog.models()[9].id, "glm-4.5-air-q2_k");
    }

    #[test]
    fn mlx_entries_require_apple_silicon() {
        let intel = ModelCatalog::for_host(false);
        let mlx = intel.get_model_by_id("glm-4.5-air-4bit").unwrap();
        assert!(!mlx.available);
        assert_eq!(
            mlx.unavailable_reason.as_deref(),
            Some("Requires Apple Silicon (M1/M2/M3/M4) Mac")
        );
        assert!(intel.available_models().all(|m| m.provider == BackendKind::LlamaCpp));

        let apple = ModelCatalog::for_host(true);
        assert_eq!(apple.available_models().count(), 10);
        assert!(apple.models().iter().all(|m| m.unavailable_reason.is_none()));
    }

    #[test]
    fn default_gguf_is_recommended_only_off_apple_silicon() {
        let id = DEFAULT_MODEL_ID;
        assert!(ModelCatalog::for_host(false).get_model_by_id(id).unwrap().recommended);
        assert!(!ModelCatalog::for_host(true).get_model_by_id(id).unwrap().recommended);
    }

    #[test]
    fn recommended_model_is_qwen_coder() {
        let catalog = ModelCatalog::for_host(true);
        let model = catalog.recommended_model().unwrap();
        assert_eq!(model.id, "qwen2.5-coder-7b-q4_k_m");
        assert_eq!(model.size, 4_794_158_596);
    }

    #[test]
    fn models_by_tier_preserves_order() {
        let catalog = ModelCatalog::for_host(true);
        let ids: Vec<_> = catalog
            .models_by_tier(ModelTier::Balanced)
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(
            ids,
            ["glm-4.5-air-4bit", "qwen2.5-14b-q4_k_m", "deepseek-coder-v2-lite-q4_k_m"]
        );
    }

    #[test]
    fn recommended_by_tier_prefers_available_entries() {
        let apple = ModelCatalog::for_host(true);
        assert_eq!(
            apple.recommended_by_tier(ModelTier::Balanced).unwrap().id,
            "glm-4.5-air-4bit"
        );

        let linux = ModelCatalog::for_host(false);
        assert_eq!(
            linux.recommended_by_tier(ModelTier::Balanced).unwrap().id,
            "qwen2.5-14b-q4_k_m"
        );
        assert_eq!(
            linux.recommended_by_tier(ModelTier::PowerUser).unwrap().id,
            "glm-4.5-air-iq2_m"
        );
    }

    #[test]
    fn recommended_mlx_model_needs_apple_silicon() {
        assert!(ModelCatalog::for_host(false).recommended_mlx_model().is_none());
        assert_eq!(
            ModelCatalog::for_host(true).recommended_mlx_model().unwrap().id,
            "glm-4.5-air-8bit"
        );
    }

    #[test]
    fn format_size_uses_binary_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(4_794_158_596), "4.5 GB");
    }

    #[test]
    fn tier_labels() {
        assert_eq!(ModelTier::Light.name(), "Light & Fast");
        assert_eq!(
            ModelTier::PowerUser.description(),
            "40GB+ models for maximum capability. Requires 64GB+ RAM."
        );
    }
}
