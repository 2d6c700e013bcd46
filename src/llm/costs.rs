//! Per-token pricing for the models we talk to.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (input, output) USD per token for a model, matched by prefix.
pub fn model_cost(model: &str) -> Option<(Decimal, Decimal)> {
    // Longest prefixes first.
    const TABLE: &[(&str, Decimal, Decimal)] = &[
        ("gemini-2.5-flash-lite", dec!(0.0000001), dec!(0.0000004)),
        ("gemini-2.5-flash", dec!(0.0000003), dec!(0.0000025)),
        ("gemini-2.5-pro", dec!(0.00000125), dec!(0.00001)),
        ("gemini-2.0-flash", dec!(0.0000001), dec!(0.0000004)),
        ("claude-3-5-haiku", dec!(0.0000008), dec!(0.000004)),
        ("claude-haiku-4", dec!(0.000001), dec!(0.000005)),
        ("claude-sonnet-4", dec!(0.000003), dec!(0.000015)),
        ("claude-3-7-sonnet", dec!(0.000003), dec!(0.000015)),
        ("claude-opus-4", dec!(0.000015), dec!(0.000075)),
    ];

    TABLE
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| (*input, *output))
}

/// Pricing for a model, zero when unknown.
pub fn cost_or_zero(model: &str) -> (Decimal, Decimal) {
    model_cost(model).unwrap_or((Decimal::ZERO, Decimal::ZERO))
}
