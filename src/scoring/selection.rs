use super::error::{ScoringError, ScoringResult};

/// Which judge scores (or items) count toward an aggregate.
///
/// `k` values are clamped to `1..=len` when applied; an absent `k` means
/// every value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    /// `minimes` / `worst_n`: the k smallest
    Worst(Option<i64>),
    /// `maximes` / `best_n`: the k largest
    Best(Option<i64>),
    /// `all` / `totes`: the k largest when k < len, else everything
    All(Option<i64>),
    /// `drop_extremes`: remove one minimum and one maximum
    DropExtremes,
    /// `drop_extremes_until_n`: drop max, then min, alternately until k remain
    DropExtremesUntil(i64),
    /// `eliminar_extrems`: strip min/max pairs, then drop the value farthest
    /// from the median if one extra remains
    TrimToMedian(Option<i64>),
}

impl Criterion {
    pub fn parse(name: &str, n: Option<i64>) -> ScoringResult<Self> {
        let name = name.trim();
        let required = |n: Option<i64>| {
            n.ok_or_else(|| {
                ScoringError::Selection(format!("selection '{}' requires n", name))
            })
        };
        match name {
            "minimes" | "worst_n" => Ok(Criterion::Worst(n)),
            "maximes" | "best_n" => Ok(Criterion::Best(n)),
            "all" | "totes" => Ok(Criterion::All(n)),
            "drop_extremes" => Ok(Criterion::DropExtremes),
            "drop_extremes_until_n" => Ok(Criterion::DropExtremesUntil(required(n)?)),
            "eliminar_extrems" => Ok(Criterion::TrimToMedian(n)),
            _ => Err(ScoringError::Selection(format!(
                "unknown selection method: {}",
                name
            ))),
        }
    }

    /// Indices of the selected values.
    ///
    /// Ties keep their original relative order, so among equal values the
    /// earliest is treated as the smaller one.
    pub fn select_indices(&self, values: &[f64]) -> Vec<usize> {
        let n = values.len();
        if n == 0 {
            return Vec::new();
        }
        let clamp = |k: i64| k.clamp(1, n as i64) as usize;
        let clamp_or_all = |k: Option<i64>| k.map_or(n, clamp);
        let ascending = || {
            let mut idx: Vec<usize> = (0..n).collect();
            idx.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            idx
        };
        let descending = || {
            let mut idx: Vec<usize> = (0..n).collect();
            idx.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
            idx
        };

        match *self {
            Criterion::Worst(k) => {
                let mut idx = ascending();
                idx.truncate(clamp_or_all(k));
                idx
            }
            Criterion::Best(k) => {
                let mut idx = descending();
                idx.truncate(clamp_or_all(k));
                idx
            }
            Criterion::All(Some(k)) if clamp(k) < n => {
                let mut idx = descending();
                idx.truncate(clamp(k));
                idx
            }
            Criterion::All(_) => (0..n).collect(),
            Criterion::DropExtremes => {
                let idx = ascending();
                if n <= 2 {
                    idx
                } else {
                    idx[1..n - 1].to_vec()
                }
            }
            Criterion::DropExtremesUntil(k) => {
                let k = clamp(k);
                let mut idx = ascending();
                let mut drop_max = true;
                while idx.len() > k {
                    if drop_max {
                        idx.pop();
                    } else {
                        idx.remove(0);
                    }
                    drop_max = !drop_max;
                }
                idx
            }
            Criterion::TrimToMedian(k) => trim_to_median(values, clamp_or_all(k)),
        }
    }

    /// The selected values, in selection order.
    pub fn select(&self, values: &[f64]) -> Vec<f64> {
        match self {
            // value form of "all" always reports the largest first
            Criterion::All(_) => {
                let mut out: Vec<f64> = self
                    .select_indices(values)
                    .into_iter()
                    .map(|i| values[i])
                    .collect();
                out.sort_by(|a, b| b.total_cmp(a));
                out
            }
            _ => self
                .select_indices(values)
                .into_iter()
                .map(|i| values[i])
                .collect(),
        }
    }
}

fn trim_to_median(values: &[f64], k: usize) -> Vec<usize> {
    let mut s: Vec<usize> = (0..values.len()).collect();
    s.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    if s.len() <= k {
        return s;
    }
    while s.len() >= k + 2 {
        s = s[1..s.len() - 1].to_vec();
    }
    if s.len() > k {
        let sorted: Vec<f64> = s.iter().map(|&i| values[i]).collect();
        let med = median_sorted(&sorted);
        let dists: Vec<f64> = sorted.iter().map(|x| (x - med).abs()).collect();
        let max_dist = dists.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        // ties go to the right-most, i.e. the larger value is dropped
        if let Some(drop) = dists.iter().rposition(|d| *d == max_dist) {
            s.remove(drop);
        }
    }
    s
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let m = sorted.len();
    if m == 0 {
        0.0
    } else if m % 2 == 1 {
        sorted[m / 2]
    } else {
        (sorted[m / 2 - 1] + sorted[m / 2]) / 2.0
    }
}

/// Reduction applied after selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Sum,
    Prod,
    Avg,
    Min,
    Max,
    Med,
}

impl Aggregator {
    pub fn parse(name: &str) -> ScoringResult<Self> {
        match name.trim() {
            "sum" => Ok(Aggregator::Sum),
            "prod" => Ok(Aggregator::Prod),
            "avg" => Ok(Aggregator::Avg),
            "min" => Ok(Aggregator::Min),
            "max" => Ok(Aggregator::Max),
            "med" => Ok(Aggregator::Med),
            other => Err(ScoringError::Selection(format!(
                "unknown aggregator: {}",
                other
            ))),
        }
    }

    /// Every aggregator yields 0 on an empty input.
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Aggregator::Sum => values.iter().sum(),
            Aggregator::Prod => values.iter().product(),
            Aggregator::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregator::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregator::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregator::Med => median(values),
        }
    }
}

/// Median with the average-of-middles rule for even lengths.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    median_sorted(&sorted)
}
