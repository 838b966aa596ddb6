//! Exponential Moving Average.
//!
//! k = 2/(span+1), seeded with the first close, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! No warm-up bias correction: every output value is defined.

pub fn calculate_ema(closes: &[f64], span: usize) -> Vec<f64> {
    if span == 0 || closes.is_empty() {
        return Vec::new();
    }

    let k = smoothing_factor(span);
    let mut values = Vec::with_capacity(closes.len());
    let mut ema = closes[0];
    values.push(ema);

    for &close in &closes[1..] {
        ema = close * k + ema * (1.0 - k);
        values.push(ema);
    }

    values
}

pub fn smoothing_factor(span: usize) -> f64 {
    2.0 / (span as f64 + 1.0)
}
