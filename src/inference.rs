//! The generate loop.
//!
//! Each iteration runs, strictly in order: evaluate the pending batch
//! (swapping the context first if it would overflow), sample a token when no
//! prompt input is outstanding, feed the next prompt batch, ask the input
//! provider for more text once the prompt is drained, and finally honour a
//! pending interjection.

use std::time::Instant;

use tracing::{debug, info};

use crate::config::GenerationParams;
use crate::context::{ContextSwap, HalfWindowSwap, HistoryBuffer};
use crate::engine::{InferenceEngine, Token};
use crate::error::{InferenceError, Result};
use crate::feeder::PromptQueue;
use crate::input::{InputProvider, Polled};
use crate::interject::InterjectReceiver;
use crate::output::{OutputSink, TextStream};
use crate::sampler;
use crate::stats::RunStats;

/// Prompts must leave this many free positions in the context.
const PROMPT_HEADROOM: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationState {
    /// Positions already evaluated by the model.
    pub processed: usize,
    /// Leading prompt tokens that survive every swap.
    pub keep: usize,
    /// `None` when unbounded.
    pub remaining: Option<usize>,
}

impl GenerationState {
    fn new(keep: usize, remaining: Option<usize>) -> Self {
        Self {
            processed: 0,
            keep,
            remaining,
        }
    }

    fn consume_one(&mut self) {
        if let Some(n) = self.remaining.as_mut() {
            *n = n.saturating_sub(1);
        }
    }

    fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfSequence,
    PredictLimit,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stop: StopReason,
    pub generated: usize,
    pub history: HistoryBuffer,
    pub stats: RunStats,
}

/// Clamps a requested keep count into `[0, prompt_len]`; negative keeps the
/// whole prompt.
pub fn resolve_keep(requested: i64, prompt_len: usize) -> usize {
    if requested < 0 {
        return prompt_len;
    }
    (requested as usize).min(prompt_len)
}

pub struct Orchestrator<'e, E: InferenceEngine + ?Sized> {
    engine: &'e mut E,
    params: GenerationParams,
    swap: Box<dyn ContextSwap>,
}

impl<'e, E: InferenceEngine + ?Sized> Orchestrator<'e, E> {
    pub fn new(engine: &'e mut E, params: GenerationParams) -> Self {
        Self {
            engine,
            params,
            swap: Box::new(HalfWindowSwap),
        }
    }

    pub fn with_swap(mut self, swap: impl ContextSwap + 'static) -> Self {
        self.swap = Box::new(swap);
        self
    }

    fn validate(&self, capacity: usize, prompt_len: usize) -> Result<()> {
        let max = capacity.saturating_sub(PROMPT_HEADROOM);
        if prompt_len > max {
            return Err(InferenceError::PromptTooLong {
                tokens: prompt_len,
                max,
            });
        }
        if self.params.batch_size == 0 {
            return Err(InferenceError::InvalidConfig(
                "batch_size must be > 0".to_string(),
            ));
        }
        if self.params.sampling.repeat_last_n > capacity {
            return Err(InferenceError::InvalidConfig(format!(
                "repeat_last_n ({}) cannot exceed the context size ({})",
                self.params.sampling.repeat_last_n, capacity
            )));
        }
        Ok(())
    }

    pub fn run<S: OutputSink + ?Sized>(
        &mut self,
        prompt: Vec<Token>,
        input: &mut InputProvider,
        interject: &InterjectReceiver,
        sink: &mut S,
    ) -> Result<RunOutcome> {
        let capacity = self.engine.context_size();
        self.validate(capacity, prompt.len())?;

        let eos = self.engine.eos_token();
        let mut state = GenerationState::new(
            resolve_keep(self.params.keep, prompt.len()),
            self.params.n_predict,
        );
        let mut history = HistoryBuffer::new(capacity);
        let mut pending = PromptQueue::new(prompt);
        let mut batch: Vec<Token> = Vec::new();
        let mut output = TextStream::new();
        let mut stats = RunStats::default();
        let mut generated = 0;

        info!(
            n_ctx = capacity,
            n_batch = self.params.batch_size,
            n_predict = ?self.params.n_predict,
            n_keep = state.keep,
            "generate"
        );

        let stop = loop {
            debug_assert_eq!(history.len(), capacity);
            if state.exhausted() {
                break StopReason::PredictLimit;
            }

            if !batch.is_empty() {
                if state.processed + batch.len() > capacity {
                    let incoming = std::mem::take(&mut batch);
                    let (processed, swapped) = self.swap.swap(
                        capacity,
                        state.processed,
                        state.keep,
                        &history,
                        incoming,
                    )?;
                    debug!(
                        from = state.processed,
                        to = processed,
                        resubmitted = swapped.len(),
                        "context swap"
                    );
                    state.processed = processed;
                    batch = swapped;
                    stats.record_swap();
                }

                let started = Instant::now();
                self.engine
                    .eval(&batch, state.processed, self.params.threads)?;
                stats.record_eval(batch.len(), started.elapsed());
            }
            state.processed += batch.len();
            batch.clear();

            if pending.is_empty() {
                let started = Instant::now();
                let token = sampler::next_token(&mut *self.engine, &history, &self.params.sampling)?;
                stats.record_sample(started.elapsed());

                history.push(token);
                state.consume_one();
                generated += 1;
                let text = output.push(&*self.engine, token)?;
                sink.emit(token, &text)?;
                batch.push(token);
            }

            if batch.last() == Some(&eos) {
                break StopReason::EndOfSequence;
            }

            if !pending.is_empty() {
                batch = pending.next_batch(self.params.batch_size, &mut history);
                stats.record_fed(batch.len());
            }

            if pending.is_empty() {
                match input.poll(&*self.engine, &history, false)? {
                    Polled::Terminate => break StopReason::Terminated,
                    Polled::Tokens(tokens) => pending.append(tokens),
                }
            }

            if let Some(_waiting) = interject.try_take() {
                info!("interjection: waiting for input");
                match input.poll(&*self.engine, &history, true)? {
                    Polled::Terminate => break StopReason::Terminated,
                    Polled::Tokens(tokens) => pending.append(tokens),
                }
            }
        };

        info!(reason = ?stop, generated, "generation finished");

        Ok(RunOutcome {
            stop,
            generated,
            history,
            stats,
        })
    }
}
