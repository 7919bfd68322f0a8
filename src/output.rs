use std::io::{self, Write};

use crate::engine::{InferenceEngine, Token};
use crate::error::Result;

/// Receives each generated token, in generation order, as soon as it exists,
/// together with the text it completed. `text` is empty while a multi-token
/// character is still incomplete.
pub trait OutputSink {
    fn emit(&mut self, token: Token, text: &str) -> io::Result<()>;
}

impl<F: FnMut(Token, &str)> OutputSink for F {
    fn emit(&mut self, token: Token, text: &str) -> io::Result<()> {
        self(token, text);
        Ok(())
    }
}

/// Streams decoded text to stdout, flushing after every token.
pub struct StdoutSink {
    out: io::Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for StdoutSink {
    fn emit(&mut self, _token: Token, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mut lock = self.out.lock();
        lock.write_all(text.as_bytes())?;
        lock.flush()
    }
}

/// Incremental detokenizer. Each pushed token is decoded together with the
/// tokens since the last emitted boundary, and only text that has become
/// final is handed out.
#[derive(Debug, Default)]
pub struct TextStream {
    tokens: Vec<Token>,
    prev_index: usize,
    current_index: usize,
}

impl TextStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the newly completed text, or an empty string while the tail
    /// still decodes to a partial character.
    pub fn push<E: InferenceEngine + ?Sized>(&mut self, engine: &E, token: Token) -> Result<String> {
        let prev_text = engine.detokenize(&self.tokens[self.prev_index..self.current_index])?;
        self.tokens.push(token);
        let text = engine.detokenize(&self.tokens[self.prev_index..])?;

        if text.ends_with(char::REPLACEMENT_CHARACTER) {
            return Ok(String::new());
        }
        let fresh = match text.get(prev_text.len()..) {
            Some(fresh) if text.starts_with(prev_text.as_str()) && !fresh.is_empty() => fresh.to_string(),
            _ => return Ok(String::new()),
        };

        self.tokens.drain(..self.current_index);
        self.prev_index = 0;
        self.current_index = self.tokens.len();
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{byte_fallback_tokenizer, ScriptedEngine};

    fn stream_all(engine: &ScriptedEngine, tokens: &[Token]) -> Vec<String> {
        let mut stream = TextStream::new();
        tokens
            .iter()
            .map(|t| stream.push(engine, *t).expect("push"))
            .collect()
    }

    #[test]
    fn split_character_is_held_back_until_complete() {
        let engine = ScriptedEngine::new(8, []).with_tokenizer(byte_fallback_tokenizer());

        // "é" is <0xC3><0xA9>.
        let pieces = stream_all(&engine, &[2, 0, 1, 2]);
        assert_eq!(pieces, vec!["a", "", "é", "a"]);
        assert_eq!(pieces.concat(), "aéa");
    }

    #[test]
    fn plain_tokens_stream_one_to_one() {
        let engine = ScriptedEngine::new(8, [])
            .with_word(5, "Hello")
            .with_word(6, ", ")
            .with_word(7, "world");

        assert_eq!(stream_all(&engine, &[5, 6, 7]), vec!["Hello", ", ", "world"]);
    }
}
