//! Accelerometer signal processing: magnitude and activity classification.

use crate::domain::sample::ActivityState;

/// Magnitude = √(x²+y²+z²), in device units normalized so 1 ≈ 1 g.
pub fn magnitude(x: f32, y: f32, z: f32) -> f64 {
    ((x * x + y * y + z * z) as f64).sqrt()
}

/// Classify activity level from a magnitude reading per §4.3/§8's exact
/// boundary values: `< 1.1` stationary, `< 1.5` light, `< 2.0` moderate, else vigorous.
pub fn classify_activity(magnitude: f64) -> ActivityState {
    if magnitude < 1.1 {
        ActivityState::Stationary
    } else if magnitude < 1.5 {
        ActivityState::Light
    } else if magnitude < 2.0 {
        ActivityState::Moderate
    } else {
        ActivityState::Vigorous
    }
}

/// Average, standard deviation, and max magnitude over a window.
pub fn window_stats(magnitudes: &[f64]) -> (f64, f64, f64) {
    if magnitudes.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let avg = magnitudes.iter().sum::<f64>() / magnitudes.len() as f64;
    let variance = magnitudes.iter().map(|m| (m - avg).powi(2)).sum::<f64>() / magnitudes.len() as f64;
    let max = magnitudes.iter().cloned().fold(f64::MIN, f64::max);
    (avg, variance.sqrt(), max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitude_unit_gravity() {
        assert!((magnitude(0.0, 0.0, 1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn classify_activity_boundary_values() {
        assert_eq!(classify_activity(1.1), ActivityState::Light);
        assert_eq!(classify_activity(1.5), ActivityState::Moderate);
        assert_eq!(classify_activity(2.0), ActivityState::Vigorous);
        assert_eq!(classify_activity(1.0999), ActivityState::Stationary);
    }

    #[test]
    fn window_stats_on_constant_series_has_zero_std() {
        let (avg, std, max) = window_stats(&[1.0, 1.0, 1.0]);
        assert_eq!(avg, 1.0);
        assert_eq!(std, 0.0);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn window_stats_empty_is_zeroed() {
        assert_eq!(window_stats(&[]), (0.0, 0.0, 0.0));
    }
}
