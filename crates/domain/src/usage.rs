//! Token usage normalization and cost attribution.
//!
//! Vendors report token counters under different keys and nestings. This
//! module flattens them into one [`Usage`] record and prices it against a
//! model's per-million-token cost table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized token counters for a single call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub reasoning_tokens: u32,
    pub cached_tokens: u32,
    /// Dollars, rounded to 6 decimals. `None` when the model has no pricing
    /// or the vendor counters were malformed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// The raw vendor payload, kept when counters could not be normalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(skip)]
    malformed: bool,
}

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    /// Dollars per 1 million input (prompt) tokens.
    pub input_per_m: f64,
    /// Dollars per 1 million output (completion) tokens.
    pub output_per_m: f64,
    /// Dollars per 1 million cached input tokens, when the vendor discounts
    /// cache reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_per_m: Option<f64>,
}

impl ModelCost {
    /// Estimated cost in USD, rounded to 6 decimal places.
    pub fn cost_of(&self, usage: &Usage) -> f64 {
        let mut dollars = usage.input_tokens as f64 * self.input_per_m
            + usage.output_tokens as f64 * self.output_per_m;
        if let Some(cached_rate) = self.cached_input_per_m {
            dollars += usage.cached_tokens as f64 * cached_rate;
        }
        round6(dollars / 1_000_000.0)
    }
}

fn round6(x: f64) -> f64 {
    (x * 1_000_000.0).round() / 1_000_000.0
}

/// Candidate key paths per counter, first present path wins.
const INPUT_PATHS: &[&[&str]] = &[
    &["prompt_tokens"],
    &["input_tokens"],
    &["usage", "input_tokens"],
    &["usage", "prompt_tokens"],
];
const OUTPUT_PATHS: &[&[&str]] = &[
    &["completion_tokens"],
    &["output_tokens"],
    &["usage", "output_tokens"],
];
const REASONING_PATHS: &[&[&str]] = &[
    &["completion_tokens_details", "reasoning_tokens"],
    &["output_tokens_details", "reasoning_tokens"],
    &["usage", "reasoning_tokens"],
];
const CACHED_PATHS: &[&[&str]] = &[
    &["input_tokens_details", "cached_tokens"],
    &["prompt_tokens_details", "cached_tokens"],
];

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    /// Total tokens: explicit vendor totals are not stored; the sum of
    /// input and output is the canonical total.
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_well_formed(&self) -> bool {
        !self.malformed
    }

    /// Normalize a raw vendor usage payload (either the usage object itself
    /// or a response envelope containing a `usage` key).
    ///
    /// A counter that is present but not a non-negative integer marks the
    /// usage ill-formed: the raw payload is preserved on the record and cost
    /// computation is skipped.
    pub fn normalize(raw: &Value) -> Self {
        let mut usage = Usage::default();
        let mut malformed = false;

        usage.input_tokens = extract(raw, INPUT_PATHS, &mut malformed);
        usage.output_tokens = extract(raw, OUTPUT_PATHS, &mut malformed);
        usage.reasoning_tokens = extract(raw, REASONING_PATHS, &mut malformed);
        usage.cached_tokens = extract(raw, CACHED_PATHS, &mut malformed);

        if malformed {
            usage.malformed = true;
            usage.raw = Some(raw.clone());
        }
        usage
    }

    /// Field-wise maximum of two observations. Streaming vendors report
    /// usage incrementally (input counts at stream start, output counts at
    /// the end); the running maximum accumulates both.
    pub fn merged(&self, later: &Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens.max(later.input_tokens),
            output_tokens: self.output_tokens.max(later.output_tokens),
            reasoning_tokens: self.reasoning_tokens.max(later.reasoning_tokens),
            cached_tokens: self.cached_tokens.max(later.cached_tokens),
            cost: later.cost.or(self.cost),
            raw: later.raw.clone().or_else(|| self.raw.clone()),
            malformed: self.malformed || later.malformed,
        }
    }

    /// Attach cost computed from `cost`. Missing pricing or ill-formed
    /// counters leave `cost` as `None`.
    pub fn priced(mut self, cost: Option<&ModelCost>) -> Self {
        self.cost = match cost {
            Some(c) if !self.malformed => Some(c.cost_of(&self)),
            _ => None,
        };
        self
    }
}

fn extract(raw: &Value, paths: &[&[&str]], malformed: &mut bool) -> u32 {
    for path in paths {
        let mut cur = raw;
        let mut found = true;
        for key in *path {
            match cur.get(key) {
                Some(next) => cur = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if !found || cur.is_null() {
            continue;
        }
        match cur.as_u64() {
            Some(n) => return n.min(u32::MAX as u64) as u32,
            None => {
                *malformed = true;
                return 0;
            }
        }
    }
    0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_openai_shape() {
        let usage = Usage::normalize(&json!({
            "prompt_tokens": 120,
            "completion_tokens": 45,
            "total_tokens": 165,
            "completion_tokens_details": {"reasoning_tokens": 12},
            "prompt_tokens_details": {"cached_tokens": 64},
        }));
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 45);
        assert_eq!(usage.reasoning_tokens, 12);
        assert_eq!(usage.cached_tokens, 64);
        assert_eq!(usage.total_tokens(), 165);
        assert!(usage.is_well_formed());
    }

    #[test]
    fn normalize_anthropic_shape() {
        let usage = Usage::normalize(&json!({
            "input_tokens": 10,
            "output_tokens": 7,
        }));
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 7);
    }

    #[test]
    fn normalize_nested_envelope() {
        let usage = Usage::normalize(&json!({
            "usage": {"input_tokens": 5, "output_tokens": 3}
        }));
        assert_eq!(usage.input_tokens, 5);
        assert_eq!(usage.output_tokens, 3);
    }

    #[test]
    fn first_present_key_wins() {
        // `prompt_tokens` precedes `input_tokens` in the precedence list.
        let usage = Usage::normalize(&json!({
            "prompt_tokens": 11,
            "input_tokens": 99,
        }));
        assert_eq!(usage.input_tokens, 11);
    }

    #[test]
    fn malformed_counter_keeps_raw_and_skips_cost() {
        let raw = json!({"prompt_tokens": "eleven", "completion_tokens": 4});
        let usage = Usage::normalize(&raw);
        assert!(!usage.is_well_formed());
        assert_eq!(usage.raw, Some(raw));

        let cost = ModelCost {
            input_per_m: 1.0,
            output_per_m: 1.0,
            cached_input_per_m: None,
        };
        assert_eq!(usage.priced(Some(&cost)).cost, None);
    }

    #[test]
    fn cost_rounds_to_six_decimals() {
        let cost = ModelCost {
            input_per_m: 2.50,
            output_per_m: 10.00,
            cached_input_per_m: None,
        };
        let usage = Usage::new(1000, 500);
        // 1000 * $2.50/1M + 500 * $10.00/1M = $0.0075
        assert_eq!(cost.cost_of(&usage), 0.0075);
    }

    #[test]
    fn cost_includes_cached_rate() {
        let cost = ModelCost {
            input_per_m: 3.0,
            output_per_m: 15.0,
            cached_input_per_m: Some(0.3),
        };
        let mut usage = Usage::new(1_000_000, 0);
        usage.cached_tokens = 1_000_000;
        assert_eq!(cost.cost_of(&usage), 3.3);
    }

    #[test]
    fn cost_is_nonnegative_and_linear() {
        let cost = ModelCost {
            input_per_m: 1.25,
            output_per_m: 5.0,
            cached_input_per_m: Some(0.125),
        };
        let u1 = Usage {
            input_tokens: 123,
            output_tokens: 456,
            cached_tokens: 78,
            ..Default::default()
        };
        let u2 = Usage {
            input_tokens: 1000,
            output_tokens: 1,
            cached_tokens: 0,
            ..Default::default()
        };
        let sum = Usage {
            input_tokens: u1.input_tokens + u2.input_tokens,
            output_tokens: u1.output_tokens + u2.output_tokens,
            cached_tokens: u1.cached_tokens + u2.cached_tokens,
            ..Default::default()
        };
        let (c1, c2, cs) = (cost.cost_of(&u1), cost.cost_of(&u2), cost.cost_of(&sum));
        assert!(c1 >= 0.0 && c2 >= 0.0);
        assert!((c1 + c2 - cs).abs() < 1e-6);
    }

    #[test]
    fn priced_without_pricing_is_none() {
        let usage = Usage::new(10, 10).priced(None);
        assert_eq!(usage.cost, None);
    }

    #[test]
    fn merged_takes_field_wise_max() {
        let start = Usage::new(100, 0);
        let end = Usage::new(0, 40);
        let merged = start.merged(&end);
        assert_eq!(merged.input_tokens, 100);
        assert_eq!(merged.output_tokens, 40);
    }

    #[test]
    fn absent_counters_default_to_zero() {
        let usage = Usage::normalize(&json!({}));
        assert_eq!(usage, Usage::default());
        assert!(usage.is_well_formed());
    }
}
