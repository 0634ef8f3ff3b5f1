//! Fixed-capacity ring buffer of persistence outcomes feeding the circuit breaker.

use crate::error::PipelineError;
use crate::utils::config::CircuitBreakerConsts;

/// Number of outcomes the history holds. Patterns must have exactly this length.
pub const HISTORY_CAPACITY: usize = CircuitBreakerConsts::MAX_NUMBER_OF_OPERATIONS_TO_TRACK;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

/// One position of a history pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expect {
    Success,
    Error,
    /// Matches anything, including a slot that has not been written yet.
    Any,
}

impl Expect {
    fn accepts(self, slot: Option<Outcome>) -> bool {
        match self {
            Expect::Any => true,
            Expect::Success => slot == Some(Outcome::Success),
            Expect::Error => slot == Some(Outcome::Error),
        }
    }
}

/// Oldest-first pattern whose last `SUCCESS_TO_CONSIDER_AS_RECOVERING` positions are successes.
pub const RECOVERING_PATTERN: [Expect; HISTORY_CAPACITY] = recovering_pattern();

const fn recovering_pattern() -> [Expect; HISTORY_CAPACITY] {
    let mut p = [Expect::Any; HISTORY_CAPACITY];
    let mut i = HISTORY_CAPACITY - CircuitBreakerConsts::SUCCESS_TO_CONSIDER_AS_RECOVERING;
    while i < HISTORY_CAPACITY {
        p[i] = Expect::Success;
        i += 1;
    }
    p
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationHistory {
    slots: [Option<Outcome>; HISTORY_CAPACITY],
    /// Next slot to overwrite; also the oldest slot once the buffer is full.
    next: usize,
    recorded: u64,
}

impl Default for OperationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationHistory {
    pub fn new() -> Self {
        Self {
            slots: [None; HISTORY_CAPACITY],
            next: 0,
            recorded: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        HISTORY_CAPACITY
    }

    /// Total outcomes ever recorded (not capped by capacity).
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.slots[self.next] = Some(outcome);
        self.next = (self.next + 1) % HISTORY_CAPACITY;
        self.recorded += 1;
    }

    /// Slots in chronological order; unwritten slots come first as `None`.
    pub fn oldest_first(&self) -> impl Iterator<Item = Option<Outcome>> + '_ {
        (0..HISTORY_CAPACITY).map(move |i| self.slots[(self.next + i) % HISTORY_CAPACITY])
    }

    pub fn error_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| **s == Some(Outcome::Error))
            .count()
    }

    /// Compare the history, oldest first, against `pattern`.
    ///
    /// A pattern whose length differs from the capacity is a caller bug and yields
    /// [`PipelineError::IllegalState`].
    pub fn matches_pattern(&self, pattern: &[Expect]) -> Result<bool, PipelineError> {
        let pattern: &[Expect; HISTORY_CAPACITY] = pattern.try_into().map_err(|_| {
            PipelineError::illegal_state(format!(
                "history pattern has {} entries, history tracks {}",
                pattern.len(),
                HISTORY_CAPACITY
            ))
        })?;
        Ok(self.matches(pattern))
    }

    /// Length-checked at compile time.
    pub fn matches(&self, pattern: &[Expect; HISTORY_CAPACITY]) -> bool {
        self.oldest_first()
            .zip(pattern.iter())
            .all(|(slot, expect)| expect.accepts(slot))
    }

    /// Enough errors in the window to consider the store failing.
    pub fn is_failing(&self) -> bool {
        self.error_count() >= CircuitBreakerConsts::ERRORS_TO_CONSIDER_AS_FAILING
    }

    /// The most recent outcomes are an unbroken run of successes.
    pub fn is_recovering(&self) -> bool {
        self.matches(&RECOVERING_PATTERN)
    }
}
