//! Per-chunk signal measurements shared by the detectors.

/// Map a 16-bit sample onto [-1.0, 1.0).
#[inline]
pub fn normalize_sample(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Normalize a whole chunk.
pub fn normalize(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| normalize_sample(s)).collect()
}

/// Mean squared value; 0 for an empty slice.
pub fn mean_square(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64) as f32
}

/// Root mean square; 0 for an empty slice.
///
/// ~0.707 for a full-scale sine, 1.0 for a full-scale square wave.
pub fn rms(samples: &[f32]) -> f32 {
    mean_square(samples).sqrt()
}

/// Single-bin Goertzel power at `freq`, normalized to be comparable with
/// [`mean_square`].
///
/// Uses bin `k = round(N * freq / sample_rate)`, so the frequency actually
/// measured is the nearest DFT bin. A pure sine on that bin gives roughly its
/// mean square; broadband noise spreads over N/2 bins and gives about
/// `2 / N` of it.
pub fn goertzel_power(samples: &[f32], freq: f32, sample_rate: u32) -> f32 {
    let n = samples.len();
    if n == 0 || sample_rate == 0 {
        return 0.0;
    }

    let n_f = n as f64;
    let k = (n_f * freq as f64 / sample_rate as f64).round();
    let omega = 2.0 * std::f64::consts::PI * k / n_f;
    let coeff = 2.0 * omega.cos();

    let (mut s1, mut s2) = (0.0f64, 0.0f64);
    for &x in samples {
        let s0 = x as f64 + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }

    let raw = s1 * s1 + s2 * s2 - coeff * s1 * s2;
    (2.0 * raw / (n_f * n_f)) as f32
}

/// Strongest [`goertzel_power`] across a set of candidate frequencies.
pub fn max_band_power(samples: &[f32], freqs: &[f32], sample_rate: u32) -> f32 {
    freqs
        .iter()
        .map(|&f| goertzel_power(samples, f, sample_rate))
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8000;

    fn sine(freq: f32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
            .collect()
    }

    /// Deterministic uniform noise in [-amplitude, amplitude].
    fn noise(len: usize, amplitude: f32, mut seed: u64) -> Vec<f32> {
        (0..len)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                let unit = (seed >> 11) as f64 / (1u64 << 53) as f64;
                amplitude * (2.0 * unit as f32 - 1.0)
            })
            .collect()
    }

    #[test]
    fn normalize_sample_range() {
        assert_eq!(normalize_sample(0), 0.0);
        assert_eq!(normalize_sample(i16::MIN), -1.0);
        assert!(normalize_sample(i16::MAX) < 1.0);
        assert!(normalize_sample(i16::MAX) > 0.9999);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0.0; 160]), 0.0);
    }

    #[test]
    fn rms_of_empty_is_zero() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(mean_square(&[]), 0.0);
    }

    #[test]
    fn rms_of_sine_is_amplitude_over_root_two() {
        let s = sine(1000.0, 160, 0.5);
        assert!((rms(&s) - 0.5 / 2f32.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn rms_negative_matches_positive() {
        assert_eq!(rms(&[-0.25; 100]), rms(&[0.25; 100]));
    }

    #[test]
    fn goertzel_empty_is_zero() {
        assert_eq!(goertzel_power(&[], 1000.0, RATE), 0.0);
        assert_eq!(max_band_power(&[], &[1000.0], RATE), 0.0);
    }

    #[test]
    fn goertzel_pure_tone_ratio_exceeds_point_nine() {
        for &freq in &[850.0, 1000.0, 1150.0] {
            let s = sine(freq, 160, 0.3);
            let ratio = goertzel_power(&s, freq, RATE) / mean_square(&s);
            assert!(ratio > 0.9, "freq {} ratio {}", freq, ratio);
        }
    }

    #[test]
    fn goertzel_off_bin_tone_is_small() {
        let s = sine(2000.0, 160, 0.3);
        let ratio = goertzel_power(&s, 1000.0, RATE) / mean_square(&s);
        assert!(ratio < 0.01, "ratio {}", ratio);
    }

    #[test]
    fn goertzel_white_noise_ratio_is_low() {
        let mut total = 0.0;
        let trials = 50;
        for seed in 1..=trials {
            let s = noise(160, 0.3, seed * 7919);
            total += goertzel_power(&s, 1000.0, RATE) / mean_square(&s);
        }
        let mean_ratio = total / trials as f32;
        assert!(mean_ratio < 0.5, "mean ratio {}", mean_ratio);
    }

    #[test]
    fn max_band_power_picks_the_matching_tone() {
        let s = sine(950.0, 160, 0.4);
        let band = [850.0, 900.0, 950.0, 1000.0];
        let best = max_band_power(&s, &band, RATE);
        assert_eq!(best, goertzel_power(&s, 950.0, RATE));
        assert!(best / mean_square(&s) > 0.9);
    }

    #[test]
    fn goertzel_is_deterministic() {
        let s = noise(160, 0.5, 42);
        assert_eq!(
            goertzel_power(&s, 1000.0, RATE),
            goertzel_power(&s, 1000.0, RATE)
        );
    }
}
