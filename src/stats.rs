use std::time::Duration;

use tracing::info;

/// Counters for one generation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub eval_calls: usize,
    pub eval_tokens: usize,
    pub eval_time: Duration,
    /// Tokens that came from the prompt or the user rather than the sampler.
    pub fed_tokens: usize,
    pub samples: usize,
    pub sample_time: Duration,
    pub swaps: usize,
}

impl RunStats {
    pub(crate) fn record_eval(&mut self, tokens: usize, elapsed: Duration) {
        self.eval_calls += 1;
        self.eval_tokens += tokens;
        self.eval_time += elapsed;
    }

    pub(crate) fn record_fed(&mut self, tokens: usize) {
        self.fed_tokens += tokens;
    }

    pub(crate) fn record_sample(&mut self, elapsed: Duration) {
        self.samples += 1;
        self.sample_time += elapsed;
    }

    pub(crate) fn record_swap(&mut self) {
        self.swaps += 1;
    }

    pub fn log_summary(&self) {
        info!(
            samples = self.samples,
            sample_ms = self.sample_time.as_secs_f64() * 1e3,
            sample_ms_per_token = per_item_ms(self.sample_time, self.samples),
            "sample time"
        );
        info!(
            calls = self.eval_calls,
            tokens = self.eval_tokens,
            fed_tokens = self.fed_tokens,
            eval_ms = self.eval_time.as_secs_f64() * 1e3,
            eval_ms_per_token = per_item_ms(self.eval_time, self.eval_tokens),
            swaps = self.swaps,
            "eval time"
        );
    }
}

pub fn per_item_ms(total: Duration, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total.as_secs_f64() * 1e3 / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut stats = RunStats::default();
        stats.record_eval(8, Duration::from_millis(40));
        stats.record_eval(1, Duration::from_millis(5));
        stats.record_sample(Duration::from_millis(2));
        stats.record_swap();

        assert_eq!(stats.eval_calls, 2);
        assert_eq!(stats.eval_tokens, 9);
        assert_eq!(stats.eval_time, Duration::from_millis(45));
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.swaps, 1);
    }

    #[test]
    fn per_item_average_handles_zero() {
        assert_eq!(per_item_ms(Duration::from_millis(10), 0), 0.0);
        assert!((per_item_ms(Duration::from_millis(10), 4) - 2.5).abs() < 1e-9);
    }
}
