use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{InferenceError, Result};
use crate::prompting::ModelFamily;

/// Sampling policy for one run. Never mutated once the run has started.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub repeat_last_n: usize,
    pub top_k: usize,
    pub top_p: f64,
    pub temperature: f64,
    pub repeat_penalty: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            repeat_last_n: 64,
            top_k: 40,
            top_p: 0.95,
            temperature: 0.80,
            repeat_penalty: 1.10,
        }
    }
}

/// Everything the orchestrator needs besides the engine and the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Negative means "keep the whole prompt".
    pub keep: i64,
    pub batch_size: usize,
    /// `None` runs until EOS or an explicit termination.
    pub n_predict: Option<usize>,
    pub threads: usize,
    pub sampling: SamplingConfig,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            keep: 0,
            batch_size: 8,
            n_predict: Some(128),
            threads: resolve_threads(-1),
            sampling: SamplingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: Option<PathBuf>,
    pub tokenizer: Option<PathBuf>,
    /// Hub repository used when no local tokenizer.json is found.
    pub tokenizer_repo: Option<String>,
    pub family: Option<ModelFamily>,
    pub prompt: String,
    pub ctx_size: usize,
    pub keep: i64,
    pub batch_size: usize,
    pub n_predict: i64,
    pub threads: i64,
    pub seed: i64,
    pub interactive: bool,
    pub reverse_prompts: Vec<String>,
    pub verbose_prompt: bool,
    pub sampling: SamplingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: None,
            tokenizer: None,
            tokenizer_repo: None,
            family: None,
            prompt: String::new(),
            ctx_size: 512,
            keep: 0,
            batch_size: 8,
            n_predict: 128,
            threads: -1,
            seed: -1,
            interactive: false,
            reverse_prompts: Vec::new(),
            verbose_prompt: false,
            sampling: SamplingConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reverse prompts only make sense when someone can answer them.
    pub fn is_interactive(&self) -> bool {
        self.interactive || !self.reverse_prompts.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.is_none() {
            return Err(InferenceError::InvalidConfig(
                "model path is required".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(InferenceError::InvalidConfig(
                "batch_size must be > 0".to_string(),
            ));
        }
        if self.ctx_size <= 4 {
            return Err(InferenceError::InvalidConfig(format!(
                "ctx_size must be > 4 (got {})",
                self.ctx_size
            )));
        }
        if self.sampling.repeat_last_n > self.ctx_size {
            return Err(InferenceError::InvalidConfig(format!(
                "repeat_last_n ({}) cannot exceed ctx_size ({})",
                self.sampling.repeat_last_n, self.ctx_size
            )));
        }
        Ok(())
    }

    pub fn generation_params(&self) -> GenerationParams {
        let n_predict = if self.is_interactive() || self.n_predict < 0 {
            None
        } else {
            Some(self.n_predict as usize)
        };

        GenerationParams {
            keep: self.keep,
            batch_size: self.batch_size,
            n_predict,
            threads: resolve_threads(self.threads),
            sampling: self.sampling,
        }
    }
}

pub fn resolve_threads(requested: i64) -> usize {
    if requested > 0 {
        return requested as usize;
    }
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(4)
}

pub fn resolve_seed(requested: i64) -> Result<u64> {
    if requested >= 0 {
        return Ok(requested as u64);
    }
    let mut buf = [0u8; 8];
    getrandom::getrandom(&mut buf)
        .map_err(|e| InferenceError::InvalidConfig(format!("cannot draw random seed: {}", e)))?;
    Ok(u64::from_le_bytes(buf))
}

fn parse_value<T>(key: &str, raw: &str, accept: impl Fn(&T) -> bool) -> std::result::Result<T, String>
where
    T: std::str::FromStr + std::fmt::Display,
{
    let value: T = raw
        .parse()
        .map_err(|_| format!("{}: cannot parse '{}'", key, raw))?;
    if !accept(&value) {
        return Err(format!("{}: {} is out of range", key, value));
    }
    Ok(value)
}

/// Applies `key=value` pairs, separated by `,` or `;`, on top of `base`.
pub fn parse_sampling_overrides(
    payload: &str,
    base: SamplingConfig,
) -> std::result::Result<SamplingConfig, String> {
    if payload.trim().is_empty() {
        return Err("empty sampling override, expected key=value pairs".to_string());
    }

    let mut cfg = base;
    for item in payload.split([',', ';']).map(str::trim) {
        if item.is_empty() {
            continue;
        }
        let (key, raw) = item
            .split_once('=')
            .ok_or_else(|| format!("'{}' is not a key=value pair", item))?;
        let raw = raw.trim();

        match key.trim().to_lowercase().as_str() {
            "temperature" | "temp" => {
                cfg.temperature = parse_value("temperature", raw, |t: &f64| (0.0..=2.0).contains(t))?;
            }
            "top_p" | "topp" => {
                cfg.top_p = parse_value("top_p", raw, |p: &f64| (0.0..=1.0).contains(p))?;
            }
            "top_k" | "topk" => cfg.top_k = parse_value("top_k", raw, |_: &usize| true)?,
            "repeat_penalty" => {
                cfg.repeat_penalty = parse_value("repeat_penalty", raw, |r: &f32| *r > 0.0)?;
            }
            "repeat_last_n" => cfg.repeat_last_n = parse_value("repeat_last_n", raw, |_: &usize| true)?,
            other => return Err(format!("unknown sampling key '{}'", other)),
        }
    }

    Ok(cfg)
}
