use std::path::PathBuf;

use anyhow::{Error as E, Result};
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use tracing::{debug, info, warn};

use crate::backend::RuntimeModel;
use crate::config::SamplingConfig;
use crate::error::InferenceError;
use crate::prompting::ModelFamily;

use super::tokenizer::{load_tokenizer, resolve_eos_token};
use super::{CandleEngine, InferenceEngine, Token};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub model_path: PathBuf,
    pub family: ModelFamily,
    pub tokenizer_hint: Option<PathBuf>,
    pub tokenizer_repo: Option<String>,
    pub context_size: usize,
    pub seed: u64,
}

impl CandleEngine {
    pub fn load(options: &EngineOptions) -> Result<Self> {
        info!(path = %options.model_path.display(), family = ?options.family, "loading model");

        if options.context_size > 2048 {
            warn!(
                ctx_size = options.context_size,
                "model does not support context sizes greater than 2048 tokens"
            );
        }

        let device = Device::Cpu;
        let model = RuntimeModel::load_from_gguf(&options.model_path, options.family, &device)?;

        info!(arch = model.architecture(), "weights loaded, loading tokenizer");

        let tokenizer = load_tokenizer(
            &options.model_path,
            options.tokenizer_hint.as_deref(),
            options.tokenizer_repo.as_deref(),
        )?;

        let eos_token_id = resolve_eos_token(&tokenizer, options.family).map_err(E::msg)?;
        info!(eos = eos_token_id, "special tokens identified");

        Ok(Self {
            model,
            tokenizer,
            device,
            context_size: options.context_size,
            eos_token_id,
            seed: options.seed,
            cached: Vec::new(),
            logits: None,
            sampler: None,
            last_threads: 0,
        })
    }

    fn forward(&mut self, tokens: &[Token], position: usize) -> Result<Tensor> {
        let input = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        let logits = self.model.forward(&input, position)?;
        Ok(logits.squeeze(0)?.to_dtype(DType::F32)?)
    }

    /// Multi-token batches are only masked correctly from position 0, so
    /// later batches are fed one token at a time.
    fn forward_batch(&mut self, tokens: &[Token], past: usize) -> Result<Tensor> {
        if past == 0 {
            return self.forward(tokens, 0);
        }

        let mut last = None;
        for (offset, token) in tokens.iter().enumerate() {
            last = Some(self.forward(&[*token], past + offset)?);
        }
        last.ok_or_else(|| E::msg("empty batch"))
    }

    fn run_eval(&mut self, tokens: &[Token], past: usize) -> Result<()> {
        if past > self.cached.len() {
            return Err(E::msg(format!(
                "past={} is beyond the {} cached positions",
                past,
                self.cached.len()
            )));
        }

        if past < self.cached.len() {
            // Positions were dropped by a context swap: replay the kept prefix
            // so the KV cache matches `past` again.
            debug!(from = self.cached.len(), to = past, "rebuilding kv cache");
            self.cached.truncate(past);
            if past > 0 {
                let prefix = self.cached.clone();
                self.forward(&prefix, 0)?;
            }
        }

        let logits = self.forward_batch(tokens, past)?;
        self.cached.extend_from_slice(tokens);
        self.logits = Some(logits);
        Ok(())
    }

    fn logits_processor(&mut self, sampling: &SamplingConfig) -> &mut LogitsProcessor {
        let stale = !matches!(&self.sampler, Some((cfg, _)) if cfg == sampling);
        if stale {
            self.sampler = None;
        }
        let seed = self.seed;
        let (_, processor) = self.sampler.get_or_insert_with(|| {
            (
                *sampling,
                LogitsProcessor::from_sampling(seed, sampling_strategy(sampling)),
            )
        });
        processor
    }
}

fn sampling_strategy(cfg: &SamplingConfig) -> Sampling {
    let temperature = cfg.temperature;
    if temperature <= 0.0 {
        return Sampling::ArgMax;
    }

    match (cfg.top_k > 0, cfg.top_p < 1.0) {
        (true, true) => Sampling::TopKThenTopP {
            k: cfg.top_k,
            p: cfg.top_p,
            temperature,
        },
        (true, false) => Sampling::TopK {
            k: cfg.top_k,
            temperature,
        },
        (false, true) => Sampling::TopP {
            p: cfg.top_p,
            temperature,
        },
        (false, false) => Sampling::All { temperature },
    }
}

impl InferenceEngine for CandleEngine {
    fn tokenize(&self, text: &str, add_bos: bool) -> crate::error::Result<Vec<Token>> {
        let encoding = self
            .tokenizer
            .encode(text, add_bos)
            .map_err(|e| InferenceError::Tokenize(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn eval(&mut self, tokens: &[Token], past: usize, threads: usize) -> crate::error::Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        if threads != self.last_threads {
            debug!(threads, "eval thread count");
            self.last_threads = threads;
        }
        self.run_eval(tokens, past)
            .map_err(|e| InferenceError::Eval(e.to_string()))
    }

    fn sample(&mut self, last_n: &[Token], sampling: &SamplingConfig) -> crate::error::Result<Token> {
        let logits = self
            .logits
            .clone()
            .ok_or_else(|| InferenceError::Sample("no logits available before eval".to_string()))?;

        let logits = if sampling.repeat_penalty == 1.0 {
            logits
        } else {
            candle_transformers::utils::apply_repeat_penalty(&logits, sampling.repeat_penalty, last_n)
                .map_err(|e| InferenceError::Sample(e.to_string()))?
        };

        self.logits_processor(sampling)
            .sample(&logits)
            .map_err(|e| InferenceError::Sample(e.to_string()))
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    fn detokenize(&self, tokens: &[Token]) -> crate::error::Result<String> {
        self.tokenizer
            .decode(tokens, false)
            .map_err(|e| InferenceError::Tokenize(e.to_string()))
    }

    fn eos_token(&self) -> Token {
        self.eos_token_id
    }
}
