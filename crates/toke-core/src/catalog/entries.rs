//! Static catalog data.

use super::model::{BackendKind, ModelOption, ModelTier};

const GIB: u64 = 1024 * 1024 * 1024;

const APPLE_SILICON_REQUIRED: &str = "Requires Apple Silicon (M1/M2/M3/M4) Mac";

struct Entry {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    size: u64,
    memory: u64,
    url: &'static str,
    provider: BackendKind,
    tier: ModelTier,
    recommended: Recommended,
}

enum Recommended {
    Yes,
    No,
    /// Recommended only where MLX is unavailable.
    OffAppleSilicon,
}

const ENTRIES: &[Entry] = &[
    Entry {
        id: "glm-4.5-air-8bit",
        name: "GLM 4.5 Air 8-bit (MLX)",
        description: "Highest quality GLM. Full 8-bit precision. MLX for Apple Silicon.",
        size: 34 * GIB,
        memory: 48 * GIB,
        url: "https://huggingface.co/mlx-community/GLM-4.5-Air-8bit",
        provider: BackendKind::Mlx,
        tier: ModelTier::PowerUser,
        recommended: Recommended::Yes,
    },
    Entry {
        id: "glm-4.5-air-4bit",
        name: "GLM 4.5 Air 4-bit (MLX)",
        description: "Cutting-edge 106B model. Great balance. MLX 4-bit for Apple Silicon.",
        size: 17 * GIB,
        memory: 24 * GIB,
        url: "https://huggingface.co/mlx-community/GLM-4.5-Air-4bit",
        provider: BackendKind::Mlx,
        tier: ModelTier::Balanced,
        recommended: Recommended::Yes,
    },
    Entry {
        id: "glm-4.5-air-3bit",
        name: "GLM 4.5 Air 3-bit (MLX)",
        description: "Same GLM model, smaller size. MLX 3-bit quantization.",
        size: 13 * GIB,
        memory: 16 * GIB,
        url: "https://huggingface.co/mlx-community/GLM-4.5-Air-3bit",
        provider: BackendKind::Mlx,
        tier: ModelTier::Light,
        recommended: Recommended::No,
    },
    Entry {
        id: "qwen2.5-coder-7b-4bit",
        name: "Qwen 2.5 Coder 7B 4-bit (MLX)",
        description: "Excellent coding model. MLX 4-bit quantization.",
        size: 5 * GIB,
        memory: 8 * GIB,
        url: "https://huggingface.co/mlx-community/Qwen2.5-Coder-7B-Instruct-4bit",
        provider: BackendKind::Mlx,
        tier: ModelTier::Light,
        recommended: Recommended::No,
    },
    Entry {
        id: "qwen2.5-coder-7b-q4_k_m",
        name: "Qwen 2.5 Coder 7B (GGUF)",
        description: "Best coding model. Fast and accurate. GGUF Q4_K_M quantization.",
        size: 4_794_158_596,
        memory: 8 * GIB,
        url: "https://huggingface.co/Qwen/Qwen2.5-Coder-7B-Instruct-GGUF/resolve/main/qwen2.5-coder-7b-instruct-q4_k_m.gguf",
        provider: BackendKind::LlamaCpp,
        tier: ModelTier::Light,
        recommended: Recommended::OffAppleSilicon,
    },
    Entry {
        id: "qwen2.5-3b-q4_k_m",
        name: "Qwen 2.5 3B",
        description: "Smaller, faster model. Good for simple tasks. GGUF format.",
        size: 2 * GIB,
        memory: 4 * GIB,
        url: "https://huggingface.co/Qwen/Qwen2.5-3B-Instruct-GGUF/resolve/main/qwen2.5-3b-instruct-q4_k_m.gguf",
        provider: BackendKind::LlamaCpp,
        tier: ModelTier::Light,
        recommended: Recommended::No,
    },
    Entry {
        id: "qwen2.5-14b-q4_k_m",
        name: "Qwen 2.5 14B",
        description: "Larger, more capable model. Excellent reasoning. GGUF format.",
        size: 8 * GIB,
        memory: 16 * GIB,
        url: "https://huggingface.co/Qwen/Qwen2.5-14B-Instruct-GGUF/resolve/main/qwen2.5-14b-instruct-q4_k_m.gguf",
        provider: BackendKind::LlamaCpp,
        tier: ModelTier::Balanced,
        recommended: Recommended::Yes,
    },
    Entry {
        id: "deepseek-coder-v2-lite-q4_k_m",
        name: "DeepSeek Coder V2 Lite",
        description: "Specialized for code generation. 16B parameters. GGUF format.",
        size: 9 * GIB,
        memory: 18 * GIB,
        url: "https://huggingface.co/deepseek-ai/DeepSeek-Coder-V2-Lite-Instruct-GGUF/resolve/main/deepseek-coder-v2-lite-instruct-q4_k_m.gguf",
        provider: BackendKind::LlamaCpp,
        tier: ModelTier::Balanced,
        recommended: Recommended::No,
    },
    Entry {
        id: "glm-4.5-air-iq2_m",
        name: "GLM 4.5 Air IQ2_M",
        description: "Massive 107B parameter model. Superior quality. 2-bit imatrix quantization.",
        size: 44 * GIB,
        memory: 48 * GIB,
        url: "https://huggingface.co/unsloth/GLM-4.5-Air-GGUF/resolve/main/GLM-4.5-Air-IQ2_M.gguf",
        provider: BackendKind::LlamaCpp,
        tier: ModelTier::PowerUser,
        recommended: Recommended::Yes,
    },
    Entry {
        id: "glm-4.5-air-q2_k",
        name: "GLM 4.5 Air Q2_K",
        description: "GLM 4.5 Air with standard 2-bit quantization. Slightly smaller.",
        size: 45 * GIB,
        memory: 48 * GIB,
        url: "https://huggingface.co/unsloth/GLM-4.5-Air-GGUF/resolve/main/GLM-4.5-Air-Q2_K.gguf",
        provider: BackendKind::LlamaCpp,
        tier: ModelTier::PowerUser,
        recommended: Recommended::No,
    },
];

/// Materialise the catalog for a host.
pub(super) fn build(is_apple_silicon: bool) -> Vec<ModelOption> {
    ENTRIES
        .iter()
        .map(|e| {
            let available = match e.provider {
                BackendKind::Mlx => is_apple_silicon,
                BackendKind::LlamaCpp => true,
            };
            let recommended = match e.recommended {
                Recommended::Yes => true,
                Recommended::No => false,
                Recommended::OffAppleSilicon => !is_apple_silicon,
            };
            ModelOption {
                id: e.id.to_string(),
                name: e.name.to_string(),
                description: e.description.to_string(),
                size: e.size,
                memory_required: e.memory,
                url: e.url.to_string(),
                checksum: "placeholder".to_string(),
                provider: e.provider,
                tier: e.tier,
                recommended,
                available,
                unavailable_reason: (!available).then(|| APPLE_SILICON_REQUIRED.to_string()),
            }
        })
        .collect()
}
