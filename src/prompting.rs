use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Llama,
    Qwen,
    Mistral,
    Unknown,
}

impl ModelFamily {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "llama" => Some(Self::Llama),
            "qwen" | "qwen2" => Some(Self::Qwen),
            "mistral" => Some(Self::Mistral),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

const NAME_HINTS: &[(&str, ModelFamily)] = &[
    ("llama", ModelFamily::Llama),
    ("qwen", ModelFamily::Qwen),
    ("mistral", ModelFamily::Mistral),
    ("mixtral", ModelFamily::Mistral),
];

/// Guesses the family from a model file name; first hint wins.
pub fn infer_family_from_filename(name: &str) -> ModelFamily {
    let name = name.to_ascii_lowercase();
    NAME_HINTS
        .iter()
        .find(|(hint, _)| name.contains(hint))
        .map(|(_, family)| *family)
        .unwrap_or(ModelFamily::Unknown)
}

pub fn infer_family_from_path(path: &Path) -> ModelFamily {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(infer_family_from_filename)
        .unwrap_or(ModelFamily::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_inference_from_name() {
        assert_eq!(infer_family_from_filename("Meta-Llama-3-8B"), ModelFamily::Llama);
        assert_eq!(infer_family_from_filename("Qwen2.5-14B"), ModelFamily::Qwen);
        assert_eq!(infer_family_from_filename("Mixtral-8x7B"), ModelFamily::Mistral);
        assert_eq!(infer_family_from_filename("unknown"), ModelFamily::Unknown);
    }

    #[test]
    fn family_inference_uses_file_stem() {
        let path = Path::new("models/llama-7b/ggml-model-q4_0.gguf");
        assert_eq!(infer_family_from_path(path), ModelFamily::Unknown);
        let path = Path::new("models/tinyllama-1.1b-chat.Q4_K_M.gguf");
        assert_eq!(infer_family_from_path(path), ModelFamily::Llama);
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!(ModelFamily::parse("Qwen2"), Some(ModelFamily::Qwen));
        assert_eq!(ModelFamily::parse(" llama "), Some(ModelFamily::Llama));
        assert_eq!(ModelFamily::parse("gpt"), None);
    }
}
