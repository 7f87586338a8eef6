/// Settings of one evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Values a stream retains before evicting the oldest.
    pub stream_capacity: usize,
    /// Steps one evaluation may take before it faults.
    pub step_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { stream_capacity: 1000, step_limit: 1_000_000 }
    }
}

impl Config {
    pub fn with_stream_capacity(self, stream_capacity: usize) -> Self {
        Self { stream_capacity, ..self }
    }

    pub fn with_step_limit(self, step_limit: usize) -> Self {
        Self { step_limit, ..self }
    }
}
