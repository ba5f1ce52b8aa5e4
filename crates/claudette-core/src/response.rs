//! Uniform response returned to callers regardless of which backend served
//! the request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The response surface of the middleware.
///
/// `cost_eur` is rounded to six decimal places; `metadata` is a free-form map
/// carrying the selection rationale and provider extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub backend_used: String,
    pub cost_eur: f64,
    pub latency_ms: u64,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub cache_hit: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ChatResponse {
    /// Rounds a raw cost to the six-decimal precision of the response model.
    pub fn round_cost(cost: f64) -> f64 {
        (cost.max(0.0) * 1_000_000.0).round() / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_rounds_to_six_decimals() {
        assert_eq!(ChatResponse::round_cost(0.000_000_4), 0.0);
        assert_eq!(ChatResponse::round_cost(0.000_000_6), 0.000_001);
        assert_eq!(ChatResponse::round_cost(1.234_567_89), 1.234_568);
    }

    #[test]
    fn negative_cost_clamped() {
        assert_eq!(ChatResponse::round_cost(-0.5), 0.0);
    }

    #[test]
    fn serde_round_trip() {
        let mut metadata = BTreeMap::new();
        metadata.insert("selection_reason".to_string(), Value::from("task=code"));
        let resp = ChatResponse {
            content: "ok".into(),
            backend_used: "openai".into(),
            cost_eur: 0.000_003,
            latency_ms: 50,
            tokens_input: 10,
            tokens_output: 20,
            cache_hit: false,
            metadata,
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: ChatResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }
}
