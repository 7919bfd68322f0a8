use crate::engine::Token;
use crate::error::{InferenceError, Result};

/// Fixed-length, right-aligned token history: the newest token is always
/// last and the length never changes after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryBuffer {
    tokens: Vec<Token>,
}

impl HistoryBuffer {
    /// Starts zero-filled, like a freshly allocated context.
    pub fn new(capacity: usize) -> Self {
        Self {
            tokens: vec![0; capacity],
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn as_slice(&self) -> &[Token] {
        &self.tokens
    }

    pub fn last(&self) -> Option<Token> {
        self.tokens.last().copied()
    }

    /// The newest `n` tokens (all of them when `n` exceeds the length).
    pub fn tail(&self, n: usize) -> &[Token] {
        let start = self.tokens.len().saturating_sub(n);
        &self.tokens[start..]
    }

    pub fn push(&mut self, token: Token) {
        self.shift_in(&[token]);
    }

    /// Appends `incoming`, dropping as many tokens from the front.
    pub fn shift_in(&mut self, incoming: &[Token]) {
        let capacity = self.tokens.len();
        if capacity == 0 {
            return;
        }
        let incoming = if incoming.len() > capacity {
            &incoming[incoming.len() - capacity..]
        } else {
            incoming
        };
        self.tokens.drain(..incoming.len());
        self.tokens.extend_from_slice(incoming);
    }
}

/// Compacts the evaluated context when the next batch would not fit.
pub trait ContextSwap {
    /// Returns the new processed count and the batch to evaluate in place
    /// of `batch`.
    fn swap(
        &self,
        capacity: usize,
        processed: usize,
        keep: usize,
        history: &HistoryBuffer,
        batch: Vec<Token>,
    ) -> Result<(usize, Vec<Token>)>;
}

/// Keeps the first `keep` prompt tokens and re-submits the newest half of
/// everything evaluated after them.
#[derive(Debug, Clone, Copy, Default)]
pub struct HalfWindowSwap;

impl ContextSwap for HalfWindowSwap {
    fn swap(
        &self,
        capacity: usize,
        processed: usize,
        keep: usize,
        history: &HistoryBuffer,
        batch: Vec<Token>,
    ) -> Result<(usize, Vec<Token>)> {
        let retain = processed.saturating_sub(keep) / 2;
        let overflow = || InferenceError::ContextOverflow {
            keep,
            batch: batch.len() + retain,
            capacity,
        };

        // The pending batch already sits at the tail of the history.
        let end = history.len().checked_sub(batch.len()).ok_or_else(overflow)?;
        let start = end.checked_sub(retain).ok_or_else(overflow)?;

        let mut next = Vec::with_capacity(retain + batch.len());
        next.extend_from_slice(&history.as_slice()[start..end]);
        next.extend_from_slice(&batch);

        if keep + next.len() > capacity {
            return Err(overflow());
        }

        Ok((keep, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(tokens: impl IntoIterator<Item = Token>) -> HistoryBuffer {
        let tokens: Vec<Token> = tokens.into_iter().collect();
        let mut history = HistoryBuffer::new(tokens.len());
        history.shift_in(&tokens);
        history
    }

    #[test]
    fn new_buffer_is_zero_filled_at_capacity() {
        let history = HistoryBuffer::new(8);
        assert_eq!(history.len(), 8);
        assert!(history.as_slice().iter().all(|t| *t == 0));
    }

    #[test]
    fn shift_in_keeps_length_and_right_alignment() {
        let mut history = HistoryBuffer::new(4);
        history.shift_in(&[1, 2]);
        assert_eq!(history.as_slice(), &[0, 0, 1, 2]);

        history.push(3);
        assert_eq!(history.as_slice(), &[0, 1, 2, 3]);

        history.shift_in(&[4, 5, 6, 7, 8, 9]);
        assert_eq!(history.as_slice(), &[6, 7, 8, 9]);
        assert_eq!(history.last(), Some(9));
    }

    #[test]
    fn tail_clamps_to_length() {
        let history = history_of(1..=5);
        assert_eq!(history.tail(2), &[4, 5]);
        assert_eq!(history.tail(10), &[1, 2, 3, 4, 5]);
        assert!(history.tail(0).is_empty());
    }

    #[test]
    fn swap_keeps_prefix_and_newest_half_of_the_middle() {
        let history = history_of(1..=16);
        let (processed, batch) = HalfWindowSwap
            .swap(16, 16, 2, &history, vec![16])
            .expect("swap fits");

        assert_eq!(processed, 2);
        assert_eq!(batch, vec![9, 10, 11, 12, 13, 14, 15, 16]);
    }

    #[test]
    fn swap_batch_length_matches_formula() {
        let capacity = 32;
        let history = history_of(100..100 + capacity as Token);

        for keep in [0usize, 1, 4, 9] {
            for batch_len in [1usize, 3, 8] {
                for processed in (capacity - batch_len + 1)..=capacity {
                    let batch = history.tail(batch_len).to_vec();
                    let (new_processed, next) = HalfWindowSwap
                        .swap(capacity, processed, keep, &history, batch)
                        .expect("swap fits");

                    assert_eq!(new_processed, keep);
                    assert_eq!(next.len(), batch_len + (processed - keep) / 2);
                    assert_eq!(&next[next.len() - batch_len..], history.tail(batch_len));
                }
            }
        }
    }

    #[test]
    fn swap_that_cannot_fit_is_an_error() {
        let history = history_of(1..=8);
        let result = HalfWindowSwap.swap(8, 6, 0, &history, history.tail(6).to_vec());
        assert!(matches!(
            result,
            Err(InferenceError::ContextOverflow { capacity: 8, .. })
        ));
    }
}
