//! Risk gauge rendering.
//!
//! Pure mapping from a probability to percentage, color band and needle
//! angle. The color band is derived locally and is independent of the
//! backend's `risk_level` label.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::models::AssessmentResult;

/// Needle bearing at probability 0 (degrees).
pub const MIN_ANGLE: f64 = -180.0;

/// Needle bearing at probability 1 (degrees).
pub const MAX_ANGLE: f64 = 0.0;

/// Needle animation length.
pub const ANIMATION_DURATION: Duration = Duration::from_secs(1);

/// Local color classification of a probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ColorBand {
    /// p < 0.30
    Low,
    /// 0.30 <= p < 0.60
    Medium,
    /// 0.60 <= p < 0.80
    High,
    /// p >= 0.80
    Critical,
}

impl ColorBand {
    /// Classify a probability. Each band includes its lower bound.
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        match probability {
            p if p >= 0.80 => Self::Critical,
            p if p >= 0.60 => Self::High,
            p if p >= 0.30 => Self::Medium,
            _ => Self::Low,
        }
    }

    #[must_use]
    pub const fn color_name(self) -> &'static str {
        match self {
            Self::Low => "green",
            Self::Medium => "yellow",
            Self::High => "orange",
            Self::Critical => "red",
        }
    }

    #[must_use]
    pub const fn hex(self) -> &'static str {
        match self {
            Self::Low => "#22c55e",
            Self::Medium => "#eab308",
            Self::High => "#f97316",
            Self::Critical => "#ef4444",
        }
    }
}

/// Static gauge values for one probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaugeReading {
    pub display_percentage: u8,
    pub band: ColorBand,
    pub color: &'static str,
    /// Target needle bearing (degrees)
    pub angle: f64,
}

/// Render a probability. Out-of-range input is clamped to [0, 1].
#[must_use]
pub fn render(probability: f64) -> GaugeReading {
    let p = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
    let band = ColorBand::from_probability(p);

    GaugeReading {
        display_percentage: (p * 100.0).round() as u8,
        band,
        color: band.hex(),
        angle: MIN_ANGLE + p * (MAX_ANGLE - MIN_ANGLE),
    }
}

/// Everything the result card shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeView {
    pub reading: GaugeReading,
    /// Label text, straight from the backend
    pub risk_label: String,
    pub advisory: Option<&'static str>,
    pub alert: bool,
    /// Needle animation to play in the browser
    pub sweep: Sweep,
}

/// Needle animation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sweep {
    pub from_angle: f64,
    pub to_angle: f64,
    pub duration_ms: u64,
}

/// Ease-out cubic on t in [0, 1].
#[must_use]
pub fn ease_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Needle animation state.
///
/// A new target restarts the sweep from wherever the needle currently is.
#[derive(Debug, Clone)]
pub struct GaugeAnimation {
    from: f64,
    to: f64,
    started: Instant,
    duration: Duration,
}

impl GaugeAnimation {
    /// Needle at rest on the minimum bearing.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            from: MIN_ANGLE,
            to: MIN_ANGLE,
            started: now,
            duration: ANIMATION_DURATION,
        }
    }

    /// Needle bearing at `now`.
    #[must_use]
    pub fn angle_at(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return self.to;
        }
        let elapsed = now.saturating_duration_since(self.started);
        let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        self.from + (self.to - self.from) * ease_out(t)
    }

    /// Point the needle at a new bearing.
    pub fn retarget(&mut self, angle: f64, now: Instant) -> Sweep {
        self.from = self.angle_at(now);
        self.to = angle;
        self.started = now;

        Sweep {
            from_angle: self.from,
            to_angle: self.to,
            duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Build the result card for a fresh result and start its needle sweep.
pub fn present(result: &AssessmentResult, animation: &mut GaugeAnimation, now: Instant) -> GaugeView {
    let reading = render(result.probability);
    let sweep = animation.retarget(reading.angle, now);

    GaugeView {
        reading,
        risk_label: result.risk_level.to_string(),
        advisory: result.risk_level.advisory(),
        alert: result.alert,
        sweep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use proptest::prelude::*;

    #[test]
    fn test_band_boundaries_are_lower_inclusive() {
        assert_eq!(ColorBand::from_probability(0.0), ColorBand::Low);
        assert_eq!(ColorBand::from_probability(0.299), ColorBand::Low);
        assert_eq!(ColorBand::from_probability(0.30), ColorBand::Medium);
        assert_eq!(ColorBand::from_probability(0.60), ColorBand::High);
        assert_eq!(ColorBand::from_probability(0.80), ColorBand::Critical);
        assert_eq!(ColorBand::from_probability(1.0), ColorBand::Critical);
    }

    #[test]
    fn test_render_high() {
        let reading = render(0.75);
        assert_eq!(reading.display_percentage, 75);
        assert_eq!(reading.band, ColorBand::High);
        assert_eq!(reading.band.color_name(), "orange");
        assert!((reading.angle - -45.0).abs() < 1e-9);
    }

    #[test]
    fn test_label_and_color_are_independent() {
        let result = AssessmentResult {
            probability: 0.82,
            risk_level: RiskLevel::Medium,
            alert: false,
            analysis: Vec::new(),
        };
        let mut animation = GaugeAnimation::new(Instant::now());
        let view = present(&result, &mut animation, Instant::now());

        assert_eq!(view.reading.band, ColorBand::Critical);
        assert_eq!(view.risk_label, "Medium");
        assert_eq!(view.advisory, Some("Moderate risk. Exercise caution."));
    }

    #[test]
    fn test_unknown_label_has_no_advisory() {
        let result = AssessmentResult {
            probability: 0.1,
            risk_level: RiskLevel::Other("Unrated".into()),
            alert: false,
            analysis: Vec::new(),
        };
        let mut animation = GaugeAnimation::new(Instant::now());
        let view = present(&result, &mut animation, Instant::now());

        assert!(view.advisory.is_none());
        assert_eq!(view.risk_label, "Unrated");
    }

    #[test]
    fn test_animation_eases_out_and_settles() {
        let start = Instant::now();
        let mut animation = GaugeAnimation::new(start);
        animation.retarget(0.0, start);

        let half = animation.angle_at(start + ANIMATION_DURATION / 2);
        // Ease-out covers more than half the distance in half the time
        assert!(half > -90.0 && half < 0.0);
        assert!((animation.angle_at(start + ANIMATION_DURATION) - 0.0).abs() < 1e-9);
        assert!((animation.angle_at(start + ANIMATION_DURATION * 3) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_retarget_starts_from_current_angle() {
        let start = Instant::now();
        let mut animation = GaugeAnimation::new(start);
        animation.retarget(0.0, start);

        let midway = start + ANIMATION_DURATION / 2;
        let current = animation.angle_at(midway);
        let sweep = animation.retarget(-180.0, midway);

        assert!((sweep.from_angle - current).abs() < 1e-9);
        assert_eq!(sweep.to_angle, -180.0);
        assert_eq!(sweep.duration_ms, 1000);
    }

    proptest! {
        #[test]
        fn prop_percentage_in_range(p in 0.0f64..=1.0) {
            let reading = render(p);
            prop_assert!(reading.display_percentage <= 100);
            prop_assert_eq!(u32::from(reading.display_percentage), (p * 100.0).round() as u32);
        }

        #[test]
        fn prop_band_is_monotonic(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(ColorBand::from_probability(lo) <= ColorBand::from_probability(hi));
        }

        #[test]
        fn prop_angle_in_bounds(p in 0.0f64..=1.0) {
            let angle = render(p).angle;
            prop_assert!((MIN_ANGLE..=MAX_ANGLE).contains(&angle));
        }
    }
}
