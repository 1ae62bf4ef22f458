use crate::{
    stress::{default_scenarios, run_stress_test, StressTestResult},
    var::{historical, VarResult},
};
use helix_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Snapshot of the portfolio-level figures a [`RiskReport`] is built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub portfolio_value: Decimal,
    pub current_drawdown: Decimal,
    pub daily_pnl: Decimal,
    pub position_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub portfolio_metrics: PortfolioMetrics,
    pub var: Option<VarResult>,
    pub stress_test_results: Vec<StressTestResult>,
    pub risk_score: Decimal,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
}

/// Combines portfolio metrics, historical VaR (when at least 30 returns are supplied), and a
/// default stress test into a single report (spec §4.C risk report).
pub fn generate_risk_report(
    metrics: PortfolioMetrics,
    position_values: &HashMap<Symbol, Decimal>,
    returns: Option<&[f64]>,
    event_count: usize,
) -> RiskReport {
    let var = returns.filter(|r| r.len() >= 30).map(|r| historical(r, 0.95, 1));

    let stress_test_results = run_stress_test(metrics.portfolio_value, position_values, &default_scenarios());

    let risk_score = (metrics.current_drawdown * Decimal::from(200)
        + metrics.daily_pnl.abs() * Decimal::from(50)
        + Decimal::from(event_count) * Decimal::from(2))
    .min(Decimal::from(100));

    let risk_level = if risk_score < Decimal::from(30) {
        RiskLevel::Low
    } else if risk_score < Decimal::from(60) {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    };

    RiskReport {
        portfolio_metrics: metrics,
        recommendations: recommendations(&metrics, var.as_ref()),
        var,
        stress_test_results,
        risk_score,
        risk_level,
    }
}

/// Ports the original report's recommendation rules into plain English statements.
fn recommendations(metrics: &PortfolioMetrics, var: Option<&VarResult>) -> Vec<String> {
    let mut out = Vec::new();

    if metrics.current_drawdown > Decimal::new(1, 1) {
        out.push("reduce position size to cut risk exposure".to_string());
    }

    if metrics.daily_pnl < Decimal::ZERO
        && metrics.daily_pnl.abs() > metrics.portfolio_value * Decimal::new(2, 2)
    {
        out.push("daily losses are significant, consider pausing new entries".to_string());
    }

    if metrics.position_count > 5 {
        out.push("holdings are overly diversified, consider concentrating in core assets".to_string());
    }

    if let Some(var) = var {
        if var.var95 < Decimal::new(-5, 2) {
            out.push("VaR indicates elevated potential loss, consider widening stop-losses".to_string());
        }
    }

    if out.is_empty() {
        out.push("current risk level is manageable, continue monitoring".to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn metrics() -> PortfolioMetrics {
        PortfolioMetrics {
            portfolio_value: dec!(10_000),
            current_drawdown: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            position_count: 1,
        }
    }

    #[test]
    fn defaults_to_manageable_recommendation_when_nothing_is_wrong() {
        let report = generate_risk_report(metrics(), &HashMap::new(), None, 0);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert_eq!(report.recommendations, vec!["current risk level is manageable, continue monitoring".to_string()]);
    }

    #[test]
    fn high_drawdown_raises_risk_level_and_recommendation() {
        let mut m = metrics();
        m.current_drawdown = dec!(0.2);
        let report = generate_risk_report(m, &HashMap::new(), None, 0);
        assert!(report.recommendations.contains(&"reduce position size to cut risk exposure".to_string()));
        assert_eq!(report.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn too_many_positions_triggers_concentration_recommendation() {
        let mut m = metrics();
        m.position_count = 6;
        let report = generate_risk_report(m, &HashMap::new(), None, 0);
        assert!(report.recommendations.iter().any(|r| r.contains("concentrating")));
    }
}
