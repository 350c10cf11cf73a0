//! Per-call cost estimate from reported token usage

use super::backend::Usage;

/// USD per thousand tokens for a model
fn rate_per_thousand(model: &str) -> f64 {
    if model.contains("detailed") {
        0.01
    } else if model.contains("portfolio") {
        0.008
    } else {
        0.006
    }
}

/// None when no tokens were reported.
pub fn estimate_cost_usd(model: &str, usage: Option<&Usage>) -> Option<f64> {
    let tokens = usage.map(|u| u.total_tokens).filter(|t| *t > 0)?;
    let raw = tokens as f64 * rate_per_thousand(model) / 1000.0;
    Some((raw * 1_000_000.0).round() / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let usage = Usage::new(600, 400);
        assert_eq!(estimate_cost_usd("explain-trading-detailed-v1", Some(&usage)), Some(0.01));
        assert_eq!(estimate_cost_usd("explain-portfolio-v1", Some(&usage)), Some(0.008));
        assert_eq!(estimate_cost_usd("explain-esg-v1", Some(&usage)), Some(0.006));
    }

    #[test]
    fn test_no_tokens() {
        assert_eq!(estimate_cost_usd("explain-esg-v1", None), None);
        assert_eq!(estimate_cost_usd("explain-esg-v1", Some(&Usage::default())), None);
    }

    #[test]
    fn test_rounding() {
        let usage = Usage::new(1, 0);
        assert_eq!(estimate_cost_usd("explain-esg-v1", Some(&usage)), Some(0.000006));
    }
}
