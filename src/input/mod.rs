mod console;

use std::io::{self, Write};

use crate::context::HistoryBuffer;
use crate::engine::{InferenceEngine, Token};
use crate::error::Result;
use crate::interject::AbortListener;

pub use console::{read_submission, ConsoleReader, LineRead, Submission};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    Tokens(Vec<Token>),
    Terminate,
}

/// Where new input comes from once the pending prompt has been fed.
/// Chosen once per run.
pub enum InputProvider {
    /// Never has anything more to say.
    PromptOnly,
    Interactive(InteractiveInput),
}

impl InputProvider {
    pub fn poll<E: InferenceEngine + ?Sized>(
        &mut self,
        engine: &E,
        history: &HistoryBuffer,
        interjecting: bool,
    ) -> Result<Polled> {
        match self {
            Self::PromptOnly => Ok(Polled::Tokens(Vec::new())),
            Self::Interactive(input) => input.poll(engine, history, interjecting),
        }
    }
}

pub struct InteractiveInput {
    reverse_prompts: Vec<String>,
    console: ConsoleReader,
    abort: AbortListener,
    echo: Box<dyn Write + Send>,
}

impl InteractiveInput {
    pub fn new(reverse_prompts: Vec<String>, console: ConsoleReader, abort: AbortListener) -> Self {
        Self {
            reverse_prompts: reverse_prompts.into_iter().filter(|r| !r.is_empty()).collect(),
            console,
            abort,
            echo: Box::new(io::stdout()),
        }
    }

    /// Where the reverse prompt is echoed when the user interjects.
    pub fn with_echo(mut self, echo: Box<dyn Write + Send>) -> Self {
        self.echo = echo;
        self
    }

    pub fn poll<E: InferenceEngine + ?Sized>(
        &mut self,
        engine: &E,
        history: &HistoryBuffer,
        interjecting: bool,
    ) -> Result<Polled> {
        if !interjecting && !ends_with_reverse_prompt(engine, history, &self.reverse_prompts)? {
            return Ok(Polled::Tokens(Vec::new()));
        }

        let mut text = String::new();
        if interjecting {
            if let Some(first) = self.reverse_prompts.first() {
                write!(self.echo, "\n{}", first)?;
                self.echo.flush()?;
                text.push_str(first);
            }
        }

        let _waiting = self.abort.begin_wait();
        match read_submission(&mut self.console, &self.abort, text)? {
            Submission::Terminate => Ok(Polled::Terminate),
            Submission::Text(text) => Ok(Polled::Tokens(engine.tokenize(&text, false)?)),
        }
    }
}

/// A UTF-8 character split by byte fallback spans at most this many tokens.
const MAX_CHAR_TOKENS: usize = 4;

/// Decodes just enough trailing history, as one sequence, to compare against
/// the longest reverse prompt. Every token decodes to at least one byte, so
/// `longest` tokens cover the match and the slack absorbs a character cut at
/// the start of the window. Callers pass only non-empty prompts.
fn ends_with_reverse_prompt<E: InferenceEngine + ?Sized>(
    engine: &E,
    history: &HistoryBuffer,
    reverse_prompts: &[String],
) -> Result<bool> {
    let longest = match reverse_prompts.iter().map(|r| r.len()).max() {
        Some(0) | None => return Ok(false),
        Some(n) => n,
    };

    let tail = engine.detokenize(history.tail(longest + MAX_CHAR_TOKENS))?;
    Ok(reverse_prompts.iter().any(|r| tail.ends_with(r.as_str())))
}
