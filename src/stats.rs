//! Rank statistics used by the correlation analysis.

use serde::Serialize;

const BETA_CF_MAX_ITERATIONS: usize = 300;
const BETA_CF_EPSILON: f64 = 3.0e-14;
const BETA_CF_FLOOR: f64 = 1.0e-300;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpearmanResult {
    pub correlation: Option<f64>,
    pub p_value: Option<f64>,
    pub sample_count: usize,
}

/// 1-based ranks with ties sharing the mean of the positions they span.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&left, &right| values[left].total_cmp(&values[right]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        let shared = (start + end) as f64 / 2.0 + 1.0;
        for &index in &order[start..=end] {
            ranks[index] = shared;
        }
        start = end + 1;
    }
    ranks
}

fn pearson(left: &[f64], right: &[f64]) -> Option<f64> {
    let n = left.len() as f64;
    let mean_left = left.iter().sum::<f64>() / n;
    let mean_right = right.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance_left = 0.0;
    let mut variance_right = 0.0;
    for (l, r) in left.iter().zip(right) {
        let dl = l - mean_left;
        let dr = r - mean_right;
        covariance += dl * dr;
        variance_left += dl * dl;
        variance_right += dr * dr;
    }

    if variance_left == 0.0 || variance_right == 0.0 {
        return None;
    }
    Some((covariance / (variance_left * variance_right).sqrt()).clamp(-1.0, 1.0))
}

/// Spearman's rho with a two-sided p-value from Student's t on n - 2
/// degrees of freedom. Returns `None` fields where the statistic is undefined.
pub fn spearman(left: &[f64], right: &[f64]) -> SpearmanResult {
    let sample_count = left.len().min(right.len());
    let undefined = SpearmanResult {
        correlation: None,
        p_value: None,
        sample_count,
    };
    if sample_count < 2 {
        return undefined;
    }

    let left_ranks = average_ranks(&left[..sample_count]);
    let right_ranks = average_ranks(&right[..sample_count]);
    let Some(rho) = pearson(&left_ranks, &right_ranks) else {
        return undefined;
    };

    SpearmanResult {
        correlation: Some(rho),
        p_value: correlation_p_value(rho, sample_count),
        sample_count,
    }
}

fn correlation_p_value(rho: f64, sample_count: usize) -> Option<f64> {
    if sample_count < 3 {
        return None;
    }
    if rho.abs() >= 1.0 {
        return Some(0.0);
    }

    let df = (sample_count - 2) as f64;
    let t_squared = rho * rho * df / (1.0 - rho * rho);
    Some(regularized_incomplete_beta(df / (df + t_squared), df / 2.0, 0.5).clamp(0.0, 1.0))
}

/// Lanczos approximation (g = 7, n = 9).
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = COEFFICIENTS[0];
    for (i, coefficient) in COEFFICIENTS.iter().enumerate().skip(1) {
        sum += coefficient / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    let floor = |value: f64| {
        if value.abs() < BETA_CF_FLOOR {
            BETA_CF_FLOOR
        } else {
            value
        }
    };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / floor(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=BETA_CF_MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / floor(1.0 + even * d);
        c = floor(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / floor(1.0 + odd * d);
        c = floor(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < BETA_CF_EPSILON {
            break;
        }
    }
    h
}
