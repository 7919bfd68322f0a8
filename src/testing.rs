//! Test doubles for the engine and the console.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, Sender};

use tokenizers::Tokenizer;

use crate::config::SamplingConfig;
use crate::engine::{InferenceEngine, Token};
use crate::error::{InferenceError, Result};

pub(crate) const EOS: Token = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Eval { len: usize, past: usize },
    Sample,
}

/// Deterministic engine: samples from a script, records every call.
pub(crate) struct ScriptedEngine {
    pub context: usize,
    pub samples: VecDeque<Token>,
    /// Returned once the script runs out.
    pub filler: Token,
    pub phrases: HashMap<String, Vec<Token>>,
    pub vocab: HashMap<Token, String>,
    pub evals: Vec<(Vec<Token>, usize)>,
    pub sample_windows: Vec<Vec<Token>>,
    pub calls: Vec<Call>,
    pub fail_eval_at: Option<usize>,
    /// Decodes with a real tokenizer instead of `vocab` when set.
    pub tokenizer: Option<Tokenizer>,
}

impl ScriptedEngine {
    pub fn new(context: usize, samples: impl IntoIterator<Item = Token>) -> Self {
        Self {
            context,
            samples: samples.into_iter().collect(),
            filler: 42,
            phrases: HashMap::new(),
            vocab: HashMap::new(),
            evals: Vec::new(),
            sample_windows: Vec::new(),
            calls: Vec::new(),
            fail_eval_at: None,
            tokenizer: None,
        }
    }

    pub fn with_phrase(mut self, text: &str, tokens: &[Token]) -> Self {
        self.phrases.insert(text.to_string(), tokens.to_vec());
        self
    }

    pub fn with_word(mut self, token: Token, text: &str) -> Self {
        self.vocab.insert(token, text.to_string());
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Every token that went through `eval`, in order.
    pub fn evaluated(&self) -> Vec<Token> {
        self.evals.iter().flat_map(|(batch, _)| batch.clone()).collect()
    }

    /// Unknown text maps each char to `1000 + code point`.
    pub fn char_tokens(text: &str) -> Vec<Token> {
        text.chars().map(|c| 1000 + c as Token).collect()
    }
}

impl InferenceEngine for ScriptedEngine {
    fn tokenize(&self, text: &str, _add_bos: bool) -> Result<Vec<Token>> {
        if text.contains('\u{0}') {
            return Err(InferenceError::Tokenize("nul byte in input".to_string()));
        }
        Ok(self
            .phrases
            .get(text)
            .cloned()
            .unwrap_or_else(|| Self::char_tokens(text)))
    }

    fn eval(&mut self, tokens: &[Token], past: usize, _threads: usize) -> Result<()> {
        if self.fail_eval_at == Some(self.evals.len()) {
            return Err(InferenceError::Eval("scripted failure".to_string()));
        }
        self.evals.push((tokens.to_vec(), past));
        self.calls.push(Call::Eval {
            len: tokens.len(),
            past,
        });
        Ok(())
    }

    fn sample(&mut self, last_n: &[Token], _sampling: &SamplingConfig) -> Result<Token> {
        self.sample_windows.push(last_n.to_vec());
        self.calls.push(Call::Sample);
        Ok(self.samples.pop_front().unwrap_or(self.filler))
    }

    fn context_size(&self) -> usize {
        self.context
    }

    fn detokenize(&self, tokens: &[Token]) -> Result<String> {
        if let Some(tokenizer) = &self.tokenizer {
            return tokenizer
                .decode(tokens, false)
                .map_err(|e| InferenceError::Tokenize(e.to_string()));
        }
        Ok(tokens
            .iter()
            .map(|t| self.vocab.get(t).cloned().unwrap_or_else(|| format!("<{}>", t)))
            .collect())
    }

    fn eos_token(&self) -> Token {
        EOS
    }
}

/// BPE tokenizer with byte fallback: ids 0 and 1 are the two UTF-8 bytes
/// of "é", id 2 is "a", id 3 is ":".
pub(crate) fn byte_fallback_tokenizer() -> Tokenizer {
    let json = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": null,
        "post_processor": null,
        "decoder": {
            "type": "Sequence",
            "decoders": [{ "type": "ByteFallback" }, { "type": "Fuse" }]
        },
        "model": {
            "type": "BPE",
            "dropout": null,
            "unk_token": null,
            "continuing_subword_prefix": null,
            "end_of_word_suffix": null,
            "fuse_unk": false,
            "byte_fallback": true,
            "ignore_merges": false,
            "vocab": { "<0xC3>": 0, "<0xA9>": 1, "a": 2, ":": 3 },
            "merges": []
        }
    }"#;
    Tokenizer::from_str(json).expect("inline tokenizer json")
}

/// Console source that blocks until a test pushes text into it.
pub(crate) struct BlockingReader {
    rx: Receiver<String>,
    buf: Vec<u8>,
}

impl BlockingReader {
    pub fn new() -> (Sender<String>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx, buf: Vec::new() })
    }
}

impl Read for BlockingReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.buf.is_empty() {
            match self.rx.recv() {
                Ok(text) => self.buf = text.into_bytes(),
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.buf.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.drain(..n);
        Ok(n)
    }
}
