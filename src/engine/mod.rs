mod lifecycle;
mod tokenizer;

use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use tokenizers::Tokenizer;

use crate::backend::RuntimeModel;
use crate::config::SamplingConfig;
use crate::error::Result;

pub use lifecycle::EngineOptions;

/// Vocabulary id. Only meaningful to the engine that produced it.
pub type Token = u32;

/// The model seen from the generation loop: an opaque, expensive black box.
///
/// Implementations own the model context exclusively; the loop never calls
/// into it from more than one place at a time.
pub trait InferenceEngine {
    fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<Token>>;

    /// Evaluates `tokens` as positions `past..past + tokens.len()`.
    fn eval(&mut self, tokens: &[Token], past: usize, threads: usize) -> Result<()>;

    /// Picks the next token from the logits of the last `eval`, penalising
    /// repeats found in `last_n`.
    fn sample(&mut self, last_n: &[Token], sampling: &SamplingConfig) -> Result<Token>;

    fn context_size(&self) -> usize;

    /// Decodes a token sequence as one piece of text. Tokens that only
    /// carry part of a UTF-8 character decode correctly only together with
    /// the rest of it.
    fn detokenize(&self, tokens: &[Token]) -> Result<String>;

    fn eos_token(&self) -> Token;
}

pub struct CandleEngine {
    model: RuntimeModel,
    tokenizer: Tokenizer,
    device: Device,
    context_size: usize,
    eos_token_id: Token,
    seed: u64,
    /// Tokens currently held in the model's KV cache, by position.
    cached: Vec<Token>,
    logits: Option<Tensor>,
    sampler: Option<(SamplingConfig, LogitsProcessor)>,
    last_threads: usize,
}

impl CandleEngine {
    pub fn architecture(&self) -> &'static str {
        self.model.architecture()
    }
}

pub fn system_info() -> String {
    let flag = |on: bool| if on { 1 } else { 0 };
    format!(
        "AVX = {} | NEON = {} | SIMD128 = {} | F16C = {}",
        flag(candle_core::utils::with_avx()),
        flag(candle_core::utils::with_neon()),
        flag(candle_core::utils::with_simd128()),
        flag(candle_core::utils::with_f16c()),
    )
}
