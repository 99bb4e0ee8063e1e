// src/provider/pricing.rs — Per-model token pricing

use serde::{Deserialize, Serialize};

/// Token counts reported by the chat API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Returns (input_price_per_mtok, output_price_per_mtok) in USD.
pub fn model_pricing(model: &str) -> (f64, f64) {
    match model {
        m if m.contains("gpt-4.1-nano") => (0.1, 0.4),
        m if m.contains("gpt-4.1-mini") => (0.4, 1.6),
        m if m.contains("gpt-4.1") => (2.0, 8.0),
        m if m.contains("gpt-4o-mini") => (0.15, 0.6),
        m if m.contains("gpt-4o") => (2.5, 10.0),
        m if m.contains("gpt-4-turbo") => (10.0, 30.0),
        m if m.contains("gpt-4") => (30.0, 60.0),
        m if m.contains("gpt-3.5-turbo") => (0.5, 1.5),
        m if m.contains("o3-mini") || m.contains("o4-mini") => (1.1, 4.4),
        m if m.contains("o3") => (10.0, 40.0),

        // Local OpenAI-compatible servers
        m if m.contains("llama")
            || m.contains("mistral")
            || m.contains("qwen")
            || m.contains("deepseek") =>
        {
            (0.0, 0.0)
        }

        // Unknown models are priced high so estimates err on the safe side
        _ => (2.5, 10.0),
    }
}

pub fn calculate_cost(model: &str, usage: &TokenUsage) -> f64 {
    let (input_price, output_price) = model_pricing(model);
    let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * input_price;
    let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * output_price;
    input_cost + output_cost
}

/// Rough token count for budgeting: about four characters per token.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}
