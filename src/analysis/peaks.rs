use log::debug;

use crate::data::{Peak, PeakKind, Series};
use crate::error::AnalysisError;

/// Maxima taken from the highs and minima taken from the lows of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakSet {
    pub maxima: Vec<Peak>,
    pub minima: Vec<Peak>,
}

impl PeakSet {
    /// Extracts both families with a prominence threshold of
    /// `sensitivity * series.price_range()`.
    pub fn from_series(series: &Series, sensitivity: f64) -> Result<Self, AnalysisError> {
        let threshold = sensitivity * series.price_range();
        let maxima = detect_peaks(&series.highs(), PeakKind::Maximum, threshold);
        let minima = detect_peaks(&series.lows(), PeakKind::Minimum, threshold);
        debug!(
            "peak extraction: {} maxima, {} minima (prominence > {:.6})",
            maxima.len(),
            minima.len(),
            threshold
        );

        if maxima.len() < 2 || minima.len() < 2 {
            return Err(AnalysisError::InsufficientPeaks {
                maxima: maxima.len(),
                minima: minima.len(),
            });
        }
        Ok(Self { maxima, minima })
    }

    pub fn of_kind(&self, kind: PeakKind) -> &[Peak] {
        match kind {
            PeakKind::Maximum => &self.maxima,
            PeakKind::Minimum => &self.minima,
        }
    }

    pub fn len(&self) -> usize {
        self.maxima.len() + self.minima.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maxima.is_empty() && self.minima.is_empty()
    }
}

/// Strict local extrema of `values` whose prominence exceeds `threshold`,
/// ordered by index.
pub fn detect_peaks(values: &[f64], kind: PeakKind, threshold: f64) -> Vec<Peak> {
    if values.len() < 3 {
        return Vec::new();
    }

    // Minima are searched as maxima of the mirrored series.
    let oriented: Vec<f64> = match kind {
        PeakKind::Maximum => values.to_vec(),
        PeakKind::Minimum => values.iter().map(|v| -v).collect(),
    };

    let mut peaks = Vec::new();
    for i in 1..oriented.len() - 1 {
        let curr = oriented[i];
        if curr <= oriented[i - 1] || curr <= oriented[i + 1] {
            continue;
        }

        let prominence = prominence(&oriented, i);
        if prominence > threshold {
            peaks.push(Peak {
                index: i,
                price: values[i],
                kind,
                prominence,
            });
        }
    }
    peaks
}

/// Height of `values[peak]` above the higher of its two bases. Each base is the
/// lowest value met while walking outwards until a strictly higher sample or
/// the edge of the series.
fn prominence(values: &[f64], peak: usize) -> f64 {
    let height = values[peak];

    let mut left_base = height;
    for &value in values[..peak].iter().rev() {
        if value > height {
            break;
        }
        left_base = left_base.min(value);
    }

    let mut right_base = height;
    for &value in &values[peak + 1..] {
        if value > height {
            break;
        }
        right_base = right_base.min(value);
    }

    height - left_base.max(right_base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_strict_maxima_with_prominence() {
        let values = [1.0, 3.0, 2.0, 5.0, 1.0, 4.0, 4.5, 0.0];
        let peaks = detect_peaks(&values, PeakKind::Maximum, 0.0);
        let indices: Vec<usize> = peaks.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 3, 6]);

        // Index 1: left base 1.0, right base 2.0 before the higher 5.0.
        assert!((peaks[0].prominence - 1.0).abs() < 1e-12);
        // Index 3 is the global maximum; both walks reach the edges.
        assert!((peaks[1].prominence - 4.0).abs() < 1e-12);
        assert!((peaks[2].prominence - 3.5).abs() < 1e-12);
    }

    #[test]
    fn minima_mirror_maxima() {
        let values = [5.0, 2.0, 4.0, 1.0, 6.0];
        let peaks = detect_peaks(&values, PeakKind::Minimum, 0.5);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].index, 1);
        assert_eq!(peaks[0].price, 2.0);
        assert_eq!(peaks[0].kind, PeakKind::Minimum);
        assert!((peaks[0].prominence - 2.0).abs() < 1e-12);
        assert_eq!(peaks[1].index, 3);
    }

    #[test]
    fn plateaus_and_edges_are_not_candidates() {
        let values = [3.0, 2.0, 2.0, 1.0, 1.0];
        assert!(detect_peaks(&values, PeakKind::Maximum, 0.0).is_empty());
        assert!(detect_peaks(&[1.0, 2.0], PeakKind::Maximum, 0.0).is_empty());
    }

    #[test]
    fn threshold_filters_shallow_peaks() {
        let values = [0.0, 1.0, 0.8, 3.0, 0.0];
        let all = detect_peaks(&values, PeakKind::Maximum, 0.0);
        let strong = detect_peaks(&values, PeakKind::Maximum, 0.5);
        assert_eq!(all.len(), 2);
        assert_eq!(strong.len(), 1);
        assert_eq!(strong[0].index, 3);
    }
}
