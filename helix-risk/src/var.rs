use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Output of any of the three VaR estimators (spec §4.C VaR and stress).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct VarResult {
    pub var95: Decimal,
    pub var99: Decimal,
    pub es95: Decimal,
    pub es99: Decimal,
    pub confidence: Decimal,
    pub horizon_days: u32,
}

const MIN_SAMPLE: usize = 30;

/// Conservative placeholder used when fewer than [`MIN_SAMPLE`] returns are available,
/// ported from the original risk manager's `_simplified_var_calculation`.
fn simplified(horizon_days: u32) -> VarResult {
    let sqrt_horizon = (horizon_days as f64).sqrt();
    let base_var = 0.02 * sqrt_horizon;
    let var99 = base_var * 1.5;
    VarResult {
        var95: to_decimal(base_var),
        var99: to_decimal(var99),
        es95: to_decimal(base_var * 1.2),
        es99: to_decimal(var99 * 1.2),
        confidence: Decimal::new(95, 2),
        horizon_days,
    }
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or(Decimal::ZERO)
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = rank - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Rational approximation of the standard normal inverse CDF (Acklam's algorithm), used since
/// no statistics crate is part of the dependency stack.
fn norm_ppf(p: f64) -> f64 {
    const A: [f64; 6] = [-3.969_683_028_665_376e+01, 2.209_460_984_245_205e+02, -2.759_285_104_469_687e+02,
        1.383_577_518_672_690e+02, -3.066_479_806_614_716e+01, 2.506_628_277_459_239e+00];
    const B: [f64; 5] = [-5.447_609_879_822_406e+01, 1.615_858_368_580_409e+02, -1.556_989_798_598_866e+02,
        6.680_131_188_771_972e+01, -1.328_068_155_288_572e+01];
    const C: [f64; 6] = [-7.784_894_002_430_293e-03, -3.223_964_580_411_365e-01, -2.400_758_277_161_838e+00,
        -2.549_732_539_343_734e+00, 4.374_664_141_464_968e+00, 2.938_163_982_698_783e+00];
    const D: [f64; 4] = [7.784_695_709_041_462e-03, 3.224_671_290_700_398e-01, 2.445_134_137_142_996e+00,
        3.754_408_661_907_416e+00];

    let p_low = 0.024_25;
    let p_high = 1.0 - p_low;

    if p < p_low {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= p_high {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Historical-percentile VaR: the empirical `(1-confidence)`-quantile of returns, scaled by
/// `sqrt(horizon)`.
pub fn historical(returns: &[f64], confidence: f64, horizon_days: u32) -> VarResult {
    if returns.len() < MIN_SAMPLE {
        return simplified(horizon_days);
    }

    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let sqrt_horizon = (horizon_days as f64).sqrt();

    let var95 = percentile(&sorted, (1.0 - 0.95) * 100.0) * sqrt_horizon;
    let var99 = percentile(&sorted, (1.0 - 0.99) * 100.0) * sqrt_horizon;

    let tail_mean = |threshold: f64| {
        let tail: Vec<f64> = sorted.iter().copied().filter(|r| *r <= threshold).collect();
        if tail.is_empty() { threshold } else { mean(&tail) }
    };
    let es95 = tail_mean(var95) * sqrt_horizon;
    let es99 = tail_mean(var99) * sqrt_horizon;

    VarResult {
        var95: to_decimal(var95),
        var99: to_decimal(var99),
        es95: to_decimal(es95),
        es99: to_decimal(es99),
        confidence: to_decimal(confidence),
        horizon_days,
    }
}

/// Parametric (variance-covariance) VaR assuming normally-distributed returns.
pub fn parametric(returns: &[f64], confidence: f64, horizon_days: u32) -> VarResult {
    if returns.len() < MIN_SAMPLE {
        return simplified(horizon_days);
    }

    let mu = mean(returns);
    let sigma = std_dev(returns, mu);
    let sqrt_horizon = (horizon_days as f64).sqrt();
    let z95 = norm_ppf(1.0 - confidence);
    let z99 = norm_ppf(0.01);

    let var95 = -(mu * horizon_days as f64 + z95 * sigma * sqrt_horizon);
    let var99 = -(mu * horizon_days as f64 + z99 * sigma * sqrt_horizon);
    let es95 = -(mu * horizon_days as f64 + sigma * sqrt_horizon * norm_pdf(z95) / (1.0 - confidence));
    let es99 = -(mu * horizon_days as f64 + sigma * sqrt_horizon * norm_pdf(z99) / 0.01);

    VarResult {
        var95: to_decimal(var95),
        var99: to_decimal(var99),
        es95: to_decimal(es95),
        es99: to_decimal(es99),
        confidence: to_decimal(confidence),
        horizon_days,
    }
}

/// Monte-Carlo VaR: draws `simulations` normal samples per horizon day from the returns'
/// empirical mean/std, sums per-path, then reads off the percentile - deterministic given a
/// seeded `rng` so callers can reproduce a run.
pub fn monte_carlo(
    returns: &[f64],
    portfolio_value: f64,
    confidence: f64,
    horizon_days: u32,
    simulations: usize,
    rng: &mut impl FnMut() -> f64,
) -> VarResult {
    if returns.len() < MIN_SAMPLE {
        return simplified(horizon_days);
    }

    let mu = mean(returns);
    let sigma = std_dev(returns, mu);

    let mut portfolio_returns: Vec<f64> = (0..simulations)
        .map(|_| {
            (0..horizon_days)
                .map(|_| {
                    // Box-Muller transform from two uniform draws into one normal sample.
                    let u1 = rng().max(f64::EPSILON);
                    let u2 = rng();
                    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                    mu + sigma * z
                })
                .sum()
        })
        .collect();
    portfolio_returns.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let var95 = -percentile(&portfolio_returns, (1.0 - confidence) * 100.0) * portfolio_value;
    let var99 = -percentile(&portfolio_returns, 1.0) * portfolio_value;

    let tail_mean = |threshold: f64| {
        let tail: Vec<f64> = portfolio_returns.iter().copied().filter(|r| *r <= -threshold / portfolio_value).collect();
        if tail.is_empty() { -threshold / portfolio_value } else { mean(&tail) }
    };
    let es95 = -tail_mean(var95) * portfolio_value;
    let es99 = -tail_mean(var99) * portfolio_value;

    VarResult {
        var95: to_decimal(var95),
        var99: to_decimal(var99),
        es95: to_decimal(es95),
        es99: to_decimal(es99),
        confidence: to_decimal(confidence),
        horizon_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_simplified_below_min_sample() {
        let returns = vec![0.01, -0.02, 0.015];
        let result = historical(&returns, 0.95, 1);
        assert_eq!(result.var95, to_decimal(0.02));
    }

    #[test]
    fn historical_var_uses_loss_tail() {
        let mut returns = vec![0.0; 40];
        for (i, r) in returns.iter_mut().enumerate() {
            *r = -0.01 * (i as f64);
        }
        let result = historical(&returns, 0.95, 1);
        assert!(result.var95 < Decimal::ZERO);
    }

    #[test]
    fn parametric_var_is_deterministic_for_same_input() {
        let returns: Vec<f64> = (0..40).map(|i| 0.001 * (i as f64 - 20.0)).collect();
        let a = parametric(&returns, 0.95, 1);
        let b = parametric(&returns, 0.95, 1);
        assert_eq!(a, b);
    }
}
