//! Token usage accounting.

use serde::{Deserialize, Serialize};

/// Token usage for one model call, or the running total for an invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Usage {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }

    /// Accumulates another usage record. Saturating, so a hostile provider
    /// cannot overflow the totals.
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: add accumulates across model calls within one invocation.
    #[test]
    fn add_accumulates() {
        let mut total = Usage::default();
        total.add(&Usage::new(10, 5));
        total.add(&Usage::new(7, 3));
        assert_eq!(total.input_tokens, 17);
        assert_eq!(total.output_tokens, 8);
        assert_eq!(total.total_tokens, 25);
    }

    /// **Scenario**: accumulation saturates instead of overflowing.
    #[test]
    fn add_saturates() {
        let mut total = Usage::new(u64::MAX - 1, 0);
        total.add(&Usage::new(10, 10));
        assert_eq!(total.input_tokens, u64::MAX);
    }
}
