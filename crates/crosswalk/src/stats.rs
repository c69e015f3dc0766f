//! Survey-weighted descriptive statistics.
//!
//! Every statistic works on a [`WeightedSample`]: the (value, weight) pairs
//! where both sides are present. A pair is dropped when either side is
//! missing (`None`, NaN, ±inf) or the weight is negative; the exclusion is
//! pairwise, never global. Results are `Option<f64>`: `None` is the undefined
//! result for an empty or degenerate sample. Nothing here panics or errors.
//!
//! `weighted_quantile` is a right-closed step function over cumulative
//! weight; `gini_coefficient` uses the left Riemann sum under the Lorenz
//! curve. Published figures were produced with these exact numerics.

use serde::Serialize;

/// Offset applied to the outer breakpoints of [`weighted_qcut`].
pub const QCUT_EDGE_EPSILON: f64 = 1e-10;

/// Valid (value, weight) pairs in input order.
#[derive(Debug, Clone, Default)]
pub struct WeightedSample {
    values: Vec<f64>,
    weights: Vec<f64>,
}

impl WeightedSample {
    /// Build from parallel slices. NaN / infinite entries count as missing.
    pub fn from_slices(values: &[f64], weights: &[f64]) -> Self {
        Self::from_options(
            values.iter().map(|v| Some(*v)),
            weights.iter().map(|w| Some(*w)),
        )
    }

    /// Build from optional values and weights. Iteration stops at the shorter side.
    pub fn from_options<V, W>(values: V, weights: W) -> Self
    where
        V: IntoIterator<Item = Option<f64>>,
        W: IntoIterator<Item = Option<f64>>,
    {
        let mut sample = Self::default();
        for (value, weight) in values.into_iter().zip(weights) {
            if let (Some(v), Some(w)) = (value, weight) {
                if v.is_finite() && w.is_finite() && w >= 0.0 {
                    sample.values.push(v);
                    sample.weights.push(w);
                }
            }
        }
        sample
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    /// Pairs sorted ascending by value. `sort_by` is stable, so ties keep
    /// input order and the result is independent of anything but the input.
    fn sorted_pairs(&self) -> Vec<(f64, f64)> {
        let mut pairs: Vec<(f64, f64)> = self
            .values
            .iter()
            .copied()
            .zip(self.weights.iter().copied())
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        pairs
    }

    pub fn mean(&self) -> Option<f64> {
        let total = self.total_weight();
        if self.is_empty() || total <= 0.0 {
            return None;
        }
        let weighted: f64 = self
            .values
            .iter()
            .zip(&self.weights)
            .map(|(v, w)| v * w)
            .sum();
        Some(weighted / total)
    }

    /// Population standard deviation (no small-sample correction).
    pub fn std(&self) -> Option<f64> {
        let mean = self.mean()?;
        let total = self.total_weight();
        let variance: f64 = self
            .values
            .iter()
            .zip(&self.weights)
            .map(|(v, w)| w * (v - mean).powi(2))
            .sum::<f64>()
            / total;
        Some(variance.sqrt())
    }

    /// Value at the first sorted position whose cumulative weight reaches
    /// `q * total_weight`. No interpolation.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.is_empty() || !(0.0..=1.0).contains(&q) {
            return None;
        }
        let pairs = self.sorted_pairs();

        let mut cumulative = Vec::with_capacity(pairs.len());
        let mut running = 0.0;
        for (_, w) in &pairs {
            running += w;
            cumulative.push(running);
        }
        // Total taken from the sorted curve itself so `q = 1` always lands on it.
        let total = running;
        if total <= 0.0 {
            return None;
        }

        let cutoff = q * total;
        let idx = cumulative
            .iter()
            .position(|c| *c >= cutoff)
            .unwrap_or(pairs.len() - 1);
        Some(pairs[idx].0)
    }

    /// Weighted Gini coefficient, `1 - 2B` with `B` the left Riemann sum of
    /// the Lorenz curve. Needs at least two pairs.
    pub fn gini(&self) -> Option<f64> {
        if self.len() < 2 {
            return None;
        }
        let pairs = self.sorted_pairs();

        let mut cum_w = 0.0;
        let mut cum_wx = Vec::with_capacity(pairs.len());
        let mut running_wx = 0.0;
        for (x, w) in &pairs {
            cum_w += w;
            running_wx += w * x;
            cum_wx.push(running_wx);
        }

        let denom = cum_w * running_wx;
        if denom == 0.0 || !denom.is_finite() {
            return None;
        }

        let area: f64 = pairs
            .iter()
            .skip(1)
            .zip(&cum_wx)
            .map(|((_, w), prev_wx)| prev_wx * w)
            .sum();
        Some(1.0 - 2.0 * area / denom)
    }
}

pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    WeightedSample::from_slices(values, weights).mean()
}

pub fn weighted_std(values: &[f64], weights: &[f64]) -> Option<f64> {
    WeightedSample::from_slices(values, weights).std()
}

pub fn weighted_quantile(values: &[f64], weights: &[f64], q: f64) -> Option<f64> {
    WeightedSample::from_slices(values, weights).quantile(q)
}

pub fn gini_coefficient(values: &[f64], weights: &[f64]) -> Option<f64> {
    WeightedSample::from_slices(values, weights).gini()
}

// ---------------------------------------------------------------------------
// Quantile binning
// ---------------------------------------------------------------------------

/// Result of [`weighted_qcut`].
#[derive(Debug, Clone, Serialize)]
pub struct QuantileBins {
    /// Sorted, de-duplicated bin edges. `breakpoints.len() - 1` bins survive.
    pub breakpoints: Vec<f64>,
    /// Bin index (0-based) per input row, `None` for missing or out-of-range values.
    pub assignments: Vec<Option<usize>>,
    /// One label per surviving bin.
    pub labels: Vec<String>,
}

impl QuantileBins {
    pub fn bin_count(&self) -> usize {
        self.breakpoints.len().saturating_sub(1)
    }

    pub fn label(&self, row: usize) -> Option<&str> {
        self.assignments
            .get(row)
            .copied()
            .flatten()
            .map(|bin| self.labels[bin].as_str())
    }

    /// Locate `value` in the bins: `(b_k, b_{k+1}]`, first bin closed on both ends.
    fn bin_of(&self, value: f64) -> Option<usize> {
        if !value.is_finite() || self.breakpoints.len() < 2 {
            return None;
        }
        let j = self.breakpoints.partition_point(|b| *b < value);
        if j == 0 {
            (value == self.breakpoints[0]).then_some(0)
        } else if j == self.breakpoints.len() {
            None
        } else {
            Some(j - 1)
        }
    }
}

/// Split rows into `q` groups holding roughly `1/q` of the total weight each.
///
/// When more than `1/q` of the weight sits on one value, breakpoints collapse
/// and fewer bins survive. That is expected; `labels` is then discarded in
/// favor of `"1"..="k"`.
pub fn weighted_qcut(
    values: &[f64],
    weights: &[f64],
    q: usize,
    labels: Option<&[String]>,
) -> QuantileBins {
    let sample = WeightedSample::from_slices(values, weights);

    let (min, max) = match (sample.min(), sample.max()) {
        (Some(min), Some(max)) if q > 0 => (min, max),
        _ => {
            return QuantileBins {
                breakpoints: Vec::new(),
                assignments: vec![None; values.len()],
                labels: Vec::new(),
            }
        }
    };

    let mut breakpoints = vec![min - QCUT_EDGE_EPSILON];
    for i in 1..q {
        if let Some(bp) = sample.quantile(i as f64 / q as f64) {
            breakpoints.push(bp);
        }
    }
    breakpoints.push(max + QCUT_EDGE_EPSILON);
    breakpoints.sort_by(|a, b| a.total_cmp(b));
    breakpoints.dedup();

    let bins = breakpoints.len() - 1;
    let labels: Vec<String> = match labels {
        Some(given) if given.len() == bins => given.to_vec(),
        _ => (1..=bins).map(|i| i.to_string()).collect(),
    };

    let mut result = QuantileBins {
        breakpoints,
        assignments: Vec::with_capacity(values.len()),
        labels,
    };
    // Rows with a missing weight are still binned; only the edges need weights.
    result.assignments = values.iter().map(|v| result.bin_of(*v)).collect();
    result
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedSummary {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    /// Rows with a present value.
    pub n: usize,
    /// Sum of weights over rows with a present value.
    pub population: f64,
}

pub fn weighted_summary(values: &[f64], weights: &[f64]) -> WeightedSummary {
    let sample = WeightedSample::from_slices(values, weights);

    let mut n = 0;
    let mut population = 0.0;
    for (i, v) in values.iter().enumerate() {
        if v.is_finite() {
            n += 1;
            if let Some(w) = weights.get(i).filter(|w| w.is_finite()) {
                population += w;
            }
        }
    }

    WeightedSummary {
        mean: sample.mean(),
        std: sample.std(),
        p25: sample.quantile(0.25),
        p50: sample.quantile(0.50),
        p75: sample.quantile(0.75),
        n,
        population,
    }
}
