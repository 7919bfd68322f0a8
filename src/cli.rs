use std::path::PathBuf;

use clap::Parser;

use crate::config::{parse_sampling_overrides, RunConfig};
use crate::error::{InferenceError, Result};
use crate::prompting::ModelFamily;

/// Command line flags. Anything left unset keeps the value from the config
/// file, or the built-in default when there is no file.
#[derive(Parser, Debug, Default)]
#[command(name = "llama_inference")]
#[command(about = "Generate text from a quantized GGUF model")]
pub struct Args {
    /// TOML file with a full run configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the GGUF model
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Prompt to start generation with
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Number of tokens to predict (-1 = unbounded)
    #[arg(short = 'n', long = "n-predict", allow_hyphen_values = true)]
    pub n_predict: Option<i64>,

    /// Prompt tokens kept across context swaps (-1 = whole prompt)
    #[arg(long, allow_hyphen_values = true)]
    pub keep: Option<i64>,

    /// Tokens fed to the model per evaluation while consuming the prompt
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Worker threads (<= 0 picks a default)
    #[arg(short, long, allow_hyphen_values = true)]
    pub threads: Option<i64>,

    /// Context size in tokens
    #[arg(short, long)]
    pub ctx_size: Option<usize>,

    /// RNG seed (< 0 draws one)
    #[arg(short, long, allow_hyphen_values = true)]
    pub seed: Option<i64>,

    #[arg(long)]
    pub repeat_last_n: Option<usize>,

    #[arg(long)]
    pub top_k: Option<usize>,

    #[arg(long)]
    pub top_p: Option<f64>,

    #[arg(long = "temp")]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub repeat_penalty: Option<f32>,

    /// Wait for user input whenever a reverse prompt shows up
    #[arg(short, long)]
    pub interactive: bool,

    /// Hand control back to the user when the output ends with this text
    #[arg(short, long = "reverse-prompt")]
    pub reverse_prompt: Vec<String>,

    /// Print the tokenized prompt before generating
    #[arg(long)]
    pub verbose_prompt: bool,

    /// tokenizer.json to use instead of the one next to the model
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,

    /// Hub repository to fetch tokenizer.json from
    #[arg(long)]
    pub tokenizer_repo: Option<String>,

    /// llama, qwen or mistral; inferred from the file name when omitted
    #[arg(long)]
    pub family: Option<String>,

    /// Sampling overrides as key=value pairs, e.g. "temp=0.2,top_k=20"
    #[arg(long)]
    pub set: Option<String>,
}

impl Args {
    pub fn load_config(&self) -> Result<RunConfig> {
        let base = match &self.config {
            Some(path) => RunConfig::from_toml_file(path)?,
            None => RunConfig::default(),
        };
        self.apply(base)
    }

    /// Layers the flags over `cfg`. `--set` is applied last.
    pub fn apply(&self, mut cfg: RunConfig) -> Result<RunConfig> {
        if let Some(model) = &self.model {
            cfg.model = Some(model.clone());
        }
        if let Some(prompt) = &self.prompt {
            cfg.prompt = prompt.clone();
        }
        if let Some(n) = self.n_predict {
            cfg.n_predict = n;
        }
        if let Some(keep) = self.keep {
            cfg.keep = keep;
        }
        if let Some(batch) = self.batch_size {
            cfg.batch_size = batch;
        }
        if let Some(threads) = self.threads {
            cfg.threads = threads;
        }
        if let Some(ctx) = self.ctx_size {
            cfg.ctx_size = ctx;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(v) = self.repeat_last_n {
            cfg.sampling.repeat_last_n = v;
        }
        if let Some(v) = self.top_k {
            cfg.sampling.top_k = v;
        }
        if let Some(v) = self.top_p {
            cfg.sampling.top_p = v;
        }
        if let Some(v) = self.temperature {
            cfg.sampling.temperature = v;
        }
        if let Some(v) = self.repeat_penalty {
            cfg.sampling.repeat_penalty = v;
        }
        if self.interactive {
            cfg.interactive = true;
        }
        if !self.reverse_prompt.is_empty() {
            cfg.reverse_prompts = self.reverse_prompt.clone();
        }
        if self.verbose_prompt {
            cfg.verbose_prompt = true;
        }
        if let Some(tokenizer) = &self.tokenizer {
            cfg.tokenizer = Some(tokenizer.clone());
        }
        if let Some(repo) = &self.tokenizer_repo {
            cfg.tokenizer_repo = Some(repo.clone());
        }
        if let Some(raw) = &self.family {
            let family = ModelFamily::parse(raw)
                .ok_or_else(|| InferenceError::InvalidConfig(format!("unknown model family '{}'", raw)))?;
            cfg.family = Some(family);
        }
        if let Some(payload) = &self.set {
            cfg.sampling =
                parse_sampling_overrides(payload, cfg.sampling).map_err(InferenceError::InvalidConfig)?;
        }
        Ok(cfg)
    }
}
