//! Trampoline execution rule for a single judge.

/// Only the first ten elements earn a base point.
const BASE_ELEMENTS: usize = 10;
const MAX_DEDUCTION: f64 = 10.0;

/// Execution score for one judge's element deductions.
///
/// `deductions` are tenths in `0..=10`, padded or cut to `n_elements`.
/// `crash_at == 0` means no crash; otherwise only the elements before
/// `crash_at` count (crash at 3 scores elements 1 and 2).
///
/// Score = `min(k, 10) - sum(first k deductions) / 10`.
pub fn execution_score(deductions: &[f64], crash_at: i64, n_elements: usize) -> f64 {
    let clamped: Vec<f64> = (0..n_elements)
        .map(|i| deductions.get(i).copied().unwrap_or(0.0))
        .map(|d| d.clamp(0.0, MAX_DEDUCTION))
        .collect();

    let counted = if crash_at > 0 {
        (crash_at - 1).clamp(0, n_elements as i64) as usize
    } else {
        n_elements
    };

    let base = counted.min(BASE_ELEMENTS) as f64;
    let deducted: f64 = clamped[..counted].iter().sum::<f64>() / 10.0;
    base - deducted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_full_routine_eleven_elements() {
        let d = [8.0, 7.0, 9.0, 6.0, 8.0, 7.0, 9.0, 6.0, 8.0, 7.0, 9.0];
        // base 10, deductions 84 tenths
        assert!(approx(execution_score(&d, 0, 11), 1.6));
    }

    #[test]
    fn test_crash_truncates() {
        let d = [1.0, 2.0, 3.0, 4.0];
        // crash at 3 -> elements 1 and 2 count
        assert!(approx(execution_score(&d, 3, 4), 2.0 - 0.3));
    }

    #[test]
    fn test_crash_at_first_element_scores_zero() {
        assert!(approx(execution_score(&[5.0, 5.0], 1, 2), 0.0));
    }

    #[test]
    fn test_crash_beyond_routine_counts_everything() {
        assert!(approx(execution_score(&[1.0, 1.0], 9, 2), 2.0 - 0.2));
    }

    #[test]
    fn test_pads_and_clamps() {
        // missing elements count as clean, out-of-range deductions clamp
        assert!(approx(execution_score(&[15.0, -3.0], 0, 3), 3.0 - 1.0));
    }

    #[test]
    fn test_truncates_extra_values() {
        assert!(approx(execution_score(&[1.0, 1.0, 10.0], 0, 2), 2.0 - 0.2));
    }
}
