//! Per-model USD pricing table: a static per-model input/output price
//! table, generalized from pricing a single fallback model to pricing every
//! council member's model. Unrecognized models price at zero.

#[derive(Debug, Clone, Copy)]
struct ModelPricing {
    input_per_million: f64,
    output_per_million: f64,
}

fn pricing_for_model(model: &str) -> Option<ModelPricing> {
    let normalized = model.trim().to_ascii_lowercase();
    let table: &[(&str, ModelPricing)] = &[
        (
            "gpt-4o-mini",
            ModelPricing {
                input_per_million: 0.15,
                output_per_million: 0.60,
            },
        ),
        (
            "gpt-4o",
            ModelPricing {
                input_per_million: 2.50,
                output_per_million: 10.00,
            },
        ),
        (
            "claude-3-5-haiku",
            ModelPricing {
                input_per_million: 0.80,
                output_per_million: 4.00,
            },
        ),
        (
            "claude-3-5-sonnet",
            ModelPricing {
                input_per_million: 3.00,
                output_per_million: 15.00,
            },
        ),
        (
            "gemini-1.5-pro",
            ModelPricing {
                input_per_million: 1.25,
                output_per_million: 5.00,
            },
        ),
        (
            "grok-2",
            ModelPricing {
                input_per_million: 2.00,
                output_per_million: 10.00,
            },
        ),
    ];

    table
        .iter()
        .find(|(prefix, _)| normalized.contains(prefix))
        .map(|(_, pricing)| *pricing)
}

pub fn estimate_cost_usd(model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    let Some(pricing) = pricing_for_model(model) else {
        return 0.0;
    };
    let prompt = f64::from(prompt_tokens);
    let completion = f64::from(completion_tokens);
    (prompt * pricing.input_per_million + completion * pricing.output_per_million) / 1_000_000.0
}
