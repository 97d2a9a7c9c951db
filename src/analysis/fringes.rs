use crate::data::model::Spectrum;

// ---------------------------------------------------------------------------
// Fringe extrema
// ---------------------------------------------------------------------------

/// Indices of fringe maxima and minima in one spectrum, both ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extrema {
    pub maxima: Vec<usize>,
    pub minima: Vec<usize>,
}

/// Locate fringe maxima and minima at least `separation_nm` apart.
///
/// The separation is converted to samples with the spectrum's first step.
/// Short (even empty) sequences are returned as-is; deciding whether they
/// are enough is up to the loss calculation.
pub fn find_extrema(spectrum: &Spectrum, separation_nm: f64) -> Extrema {
    let distance = min_distance_samples(separation_nm, spectrum.step());
    let powers = spectrum.powers();
    let negated: Vec<f64> = powers.iter().map(|p| -p).collect();

    Extrema {
        maxima: find_peaks(powers, distance),
        minima: find_peaks(&negated, distance),
    }
}

/// `ceil(separation / step)`, never below one sample.
pub fn min_distance_samples(separation_nm: f64, step_nm: f64) -> usize {
    let samples = (separation_nm / step_nm).ceil();
    if samples.is_finite() && samples >= 1.0 {
        samples as usize
    } else {
        1
    }
}

/// Local maxima of `x` with at least `distance` samples between any two.
///
/// A candidate is a sample strictly above its left neighbour and not below
/// its right one; on a flat top the first sample of the plateau is used.
/// The end samples are never candidates. Candidates are then kept in order
/// of decreasing height, each suppressing every remaining candidate closer
/// than `distance`; equal heights favour the lower index.
pub fn find_peaks(x: &[f64], distance: usize) -> Vec<usize> {
    let candidates = local_maxima(x);
    if distance <= 1 || candidates.len() < 2 {
        return candidates;
    }

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    // Stable sort keeps lower indices first among equal heights.
    order.sort_by(|&a, &b| x[candidates[b]].total_cmp(&x[candidates[a]]));

    let mut keep = vec![true; candidates.len()];
    for &i in &order {
        if !keep[i] {
            continue;
        }
        let peak = candidates[i];

        let mut j = i;
        while j > 0 && peak - candidates[j - 1] < distance {
            j -= 1;
            keep[j] = false;
        }
        let mut j = i + 1;
        while j < candidates.len() && candidates[j] - peak < distance {
            keep[j] = false;
            j += 1;
        }
    }

    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(idx, k)| k.then_some(idx))
        .collect()
}

fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }

    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i] > x[i - 1] {
            // Walk across a possible plateau.
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push(i);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_spectrum(n: usize, step: f64, period_samples: f64) -> Spectrum {
        let wl = (0..n).map(|i| 1549.0 + i as f64 * step).collect();
        let p = (0..n)
            .map(|i| 1.0 + 0.5 * (2.0 * std::f64::consts::PI * i as f64 / period_samples).sin())
            .collect();
        Spectrum::new(wl, p).unwrap()
    }

    #[test]
    fn sine_extrema_follow_period() {
        // 40-sample period, 10 periods.
        let sp = sine_spectrum(401, 0.005, 40.0);
        let ex = find_extrema(&sp, 0.1);

        assert_eq!(ex.maxima.len(), 10);
        assert_eq!(ex.minima.len(), 10);
        for w in ex.maxima.windows(2).chain(ex.minima.windows(2)) {
            assert!((w[1] - w[0]).abs_diff(40) <= 1, "spacing {w:?}");
        }
        // First crest of sin sits at a quarter period, first trough at three quarters.
        assert!(ex.maxima[0].abs_diff(10) <= 1);
        assert!(ex.minima[0].abs_diff(30) <= 1);
    }

    #[test]
    fn distance_suppresses_ripple() {
        // A sine with a small high-frequency ripple on top.
        let n = 401;
        let x: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64;
                (2.0 * std::f64::consts::PI * t / 40.0).sin()
                    + 0.05 * (2.0 * std::f64::consts::PI * t / 3.0).sin()
            })
            .collect();

        let noisy = find_peaks(&x, 1);
        let filtered = find_peaks(&x, 30);
        assert!(noisy.len() > 20);
        assert_eq!(filtered.len(), 10);
        assert!(filtered.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn taller_neighbour_wins_inside_window() {
        let x = [0.0, 1.0, 0.0, 3.0, 0.0, 2.0, 0.0];
        assert_eq!(find_peaks(&x, 1), vec![1, 3, 5]);
        assert_eq!(find_peaks(&x, 3), vec![3]);
        assert_eq!(find_peaks(&x, 2), vec![1, 3, 5]);
    }

    #[test]
    fn equal_heights_keep_first() {
        let x = [0.0, 2.0, 0.0, 2.0, 0.0];
        assert_eq!(find_peaks(&x, 3), vec![1]);
    }

    #[test]
    fn plateau_reports_first_index_and_edges_are_ignored() {
        let x = [5.0, 1.0, 3.0, 3.0, 3.0, 1.0, 4.0];
        assert_eq!(find_peaks(&x, 1), vec![2]);
        assert!(find_peaks(&[1.0, 2.0], 1).is_empty());
    }

    #[test]
    fn separation_converts_to_samples() {
        assert_eq!(min_distance_samples(0.1, 0.05), 2);
        assert_eq!(min_distance_samples(0.1, 0.03), 4);
        assert_eq!(min_distance_samples(0.001, 0.05), 1);
    }
}
