use std::collections::VecDeque;

use crate::context::HistoryBuffer;
use crate::engine::Token;

/// Prompt and user tokens waiting to be evaluated, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptQueue {
    pending: VecDeque<Token>,
}

impl PromptQueue {
    pub fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        Self {
            pending: tokens.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn append(&mut self, tokens: impl IntoIterator<Item = Token>) {
        self.pending.extend(tokens);
    }

    /// Pops up to `batch_size` tokens and shifts exactly those into `history`.
    pub fn next_batch(&mut self, batch_size: usize, history: &mut HistoryBuffer) -> Vec<Token> {
        let take = batch_size.min(self.pending.len());
        let batch: Vec<Token> = self.pending.drain(..take).collect();
        history.shift_in(&batch);
        batch
    }
}
