use crate::config::SamplingConfig;
use crate::context::HistoryBuffer;
use crate::engine::{InferenceEngine, Token};
use crate::error::Result;

/// Samples the next token, handing the engine exactly the last
/// `repeat_last_n` history tokens for its repeat penalty. No retry.
pub fn next_token<E: InferenceEngine + ?Sized>(
    engine: &mut E,
    history: &HistoryBuffer,
    sampling: &SamplingConfig,
) -> Result<Token> {
    debug_assert!(sampling.repeat_last_n <= history.len());
    engine.sample(history.tail(sampling.repeat_last_n), sampling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;

    #[test]
    fn passes_exactly_the_repeat_window() {
        let mut engine = ScriptedEngine::new(8, [5]);
        let mut history = HistoryBuffer::new(8);
        history.shift_in(&[1, 2, 3, 4, 5, 6]);
        let sampling = SamplingConfig {
            repeat_last_n: 3,
            ..SamplingConfig::default()
        };

        let token = next_token(&mut engine, &history, &sampling).expect("sample");
        assert_eq!(token, 5);
        assert_eq!(engine.sample_windows, vec![vec![4, 5, 6]]);
    }

    #[test]
    fn zero_window_passes_nothing() {
        let mut engine = ScriptedEngine::new(4, [9]);
        let history = HistoryBuffer::new(4);
        let sampling = SamplingConfig {
            repeat_last_n: 0,
            ..SamplingConfig::default()
        };

        next_token(&mut engine, &history, &sampling).expect("sample");
        assert_eq!(engine.sample_windows, vec![Vec::<Token>::new()]);
    }
}
