use std::path::{Path, PathBuf};

use anyhow::{Error as E, Result};
use tokenizers::Tokenizer;
use tracing::info;

use crate::prompting::ModelFamily;

use super::Token;

const TOKENIZER_FILE: &str = "tokenizer.json";

/// First existing candidate among: the explicit hint, the model's own
/// directory, the working directory and `models/`.
pub(super) fn resolve_tokenizer_path(model_path: &Path, tokenizer_hint: Option<&Path>) -> Option<PathBuf> {
    let model_dir = model_path.parent().unwrap_or(Path::new("."));
    let candidates = [
        tokenizer_hint.map(Path::to_path_buf),
        Some(model_dir.join(TOKENIZER_FILE)),
        Some(PathBuf::from(TOKENIZER_FILE)),
        Some(Path::new("models").join(TOKENIZER_FILE)),
    ];

    candidates.into_iter().flatten().find(|candidate| candidate.is_file())
}

pub(super) fn load_tokenizer(
    model_path: &Path,
    tokenizer_hint: Option<&Path>,
    tokenizer_repo: Option<&str>,
) -> Result<Tokenizer> {
    let path = match resolve_tokenizer_path(model_path, tokenizer_hint) {
        Some(path) => path,
        None => {
            let repo = tokenizer_repo.ok_or_else(|| {
                E::msg("no local tokenizer.json and no tokenizer_repo to fetch one from")
            })?;
            info!(repo, "tokenizer.json not found locally, fetching from the Hub");
            hf_hub::api::sync::Api::new()?
                .model(repo.to_string())
                .get(TOKENIZER_FILE)?
        }
    };

    info!(path = %path.display(), "loading tokenizer");
    Tokenizer::from_file(&path).map_err(E::msg)
}

pub(super) fn resolve_eos_token(tokenizer: &Tokenizer, family: ModelFamily) -> Result<Token, String> {
    let lookup = |candidates: &[&str]| lookup_first(tokenizer, candidates);

    match family {
        ModelFamily::Llama => lookup(&["<|end_of_text|>", "</s>"][..]).ok_or_else(|| {
            "Tokenizer/model incompatibility: Llama requires <|end_of_text|> or </s>.".to_string()
        }),
        ModelFamily::Qwen => lookup(&["<|endoftext|>", "</s>"][..]).ok_or_else(|| {
            "Tokenizer/model incompatibility: Qwen requires <|endoftext|> or </s>.".to_string()
        }),
        ModelFamily::Mistral => lookup(&["</s>", "<|end_of_text|>"][..]).ok_or_else(|| {
            "Tokenizer/model incompatibility: Mistral requires </s> or <|end_of_text|>.".to_string()
        }),
        ModelFamily::Unknown => {
            Ok(lookup(&["<|end_of_text|>", "</s>", "<|endoftext|>"][..]).unwrap_or(2))
        }
    }
}

fn lookup_first(tokenizer: &Tokenizer, candidates: &[&str]) -> Option<Token> {
    candidates
        .iter()
        .find_map(|marker| tokenizer.token_to_id(marker))
}
