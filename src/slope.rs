//! Progressive slope curves
//!
//! A ramp's steepness is driven by a curve `f(t)` over normalized position
//! `t ∈ [0, 1]`. The slope angle at `t` interpolates from the start angle to the
//! end angle by `f(t)`, and the height profile `g(t)` is the normalized running
//! integral of `tan(angle(t))`: gentle rise near the bottom, near-vertical near
//! the top.

use serde::{Deserialize, Serialize};

use crate::config::SlopeConfig;

/// Growth rate of the exponential curve
const EXPONENTIAL_RATE: f32 = 4.0;

/// Subdivisions per unit `t` when integrating the height profile
const INTEGRATION_STEPS: usize = 512;

/// Shape of the slope progression along a ramp
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CurveType {
    Linear,
    EaseIn,
    EaseOut,
    #[default]
    EaseInOut,
    Exponential,
}

impl CurveType {
    pub fn all() -> &'static [Self] {
        &[
            Self::Linear,
            Self::EaseIn,
            Self::EaseOut,
            Self::EaseInOut,
            Self::Exponential,
        ]
    }

    /// Monotonic curve with `f(0) = 0` and `f(1) = 1`.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            CurveType::Linear => t,
            CurveType::EaseIn => t * t,
            CurveType::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            CurveType::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            CurveType::Exponential => (EXPONENTIAL_RATE * t).exp_m1() / EXPONENTIAL_RATE.exp_m1(),
        }
    }
}

impl std::fmt::Display for CurveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurveType::Linear => write!(f, "linear"),
            CurveType::EaseIn => write!(f, "ease-in"),
            CurveType::EaseOut => write!(f, "ease-out"),
            CurveType::EaseInOut => write!(f, "ease-in-out"),
            CurveType::Exponential => write!(f, "exponential"),
        }
    }
}

/// Slope angles and curve for one ramp
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlopeProfile {
    /// Degrees at the bottom of the ramp
    pub start_angle: f32,
    /// Degrees at the top of the ramp
    pub end_angle: f32,
    pub curve: CurveType,
}

impl SlopeProfile {
    pub fn new(start_angle: f32, end_angle: f32, curve: CurveType) -> Self {
        Self {
            start_angle,
            end_angle,
            curve,
        }
    }

    pub fn from_config(config: &SlopeConfig) -> Self {
        Self::new(config.start_angle, config.end_angle, config.curve)
    }

    /// Progressive slope factor `f(t)`.
    pub fn factor(&self, t: f32) -> f32 {
        self.curve.apply(t)
    }

    /// Slope angle in degrees at `t`.
    pub fn angle(&self, t: f32) -> f32 {
        self.start_angle + (self.end_angle - self.start_angle) * self.factor(t)
    }

    /// Rise per unit of horizontal run at `t`.
    pub fn gradient(&self, t: f32) -> f32 {
        self.angle(t).to_radians().tan()
    }

    /// Running trapezoid integral of the gradient over `steps` equal slices,
    /// starting at 0.
    fn cumulative(&self, steps: usize) -> Vec<f64> {
        let mut cumulative = Vec::with_capacity(steps + 1);
        cumulative.push(0.0f64);
        let mut prev = self.gradient(0.0) as f64;
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            let g = self.gradient(t) as f64;
            let last = cumulative[i - 1];
            cumulative.push(last + 0.5 * (prev + g) / steps as f64);
            prev = g;
        }
        cumulative
    }

    /// Height factor profile sampled at `samples` evenly spaced points from
    /// `t = 0` to `t = 1`: `g(0) = 0`, `g(1) = 1`, strictly increasing.
    pub fn height_factors(&self, samples: usize) -> Vec<f32> {
        if samples < 2 {
            return vec![0.0; samples];
        }

        // Integrate over a fine grid, then read off at the sample points
        let steps = INTEGRATION_STEPS.max(samples * 8);
        let cumulative = self.cumulative(steps);
        let total = cumulative[steps];

        (0..samples)
            .map(|i| {
                if i == samples - 1 {
                    return 1.0;
                }
                let pos = i as f64 / (samples - 1) as f64 * steps as f64;
                let lo = pos.floor() as usize;
                let frac = pos - lo as f64;
                let hi = (lo + 1).min(steps);
                let v = cumulative[lo] + (cumulative[hi] - cumulative[lo]) * frac;
                (v / total) as f32
            })
            .collect()
    }

    /// `g(t)` tabulated once, for callers that look up many positions.
    pub fn height_table(&self) -> HeightTable {
        let cumulative = self.cumulative(INTEGRATION_STEPS);
        let total = cumulative[INTEGRATION_STEPS];
        HeightTable {
            factors: cumulative.iter().map(|&c| (c / total) as f32).collect(),
        }
    }

    /// Height factor `g(t)` at a single position. Tabulates the profile on
    /// every call; hold a [`HeightTable`] for repeated lookups.
    pub fn height_factor(&self, t: f32) -> f32 {
        self.height_table().at(t)
    }

    /// Largest rise a single cell step may have at the end angle.
    pub fn max_step_rise(&self, cell_size: f32) -> f32 {
        cell_size * self.end_angle.to_radians().tan()
    }
}

/// `g(t)` on a fixed grid of `t`, linearly interpolated between entries
#[derive(Clone, Debug, PartialEq)]
pub struct HeightTable {
    factors: Vec<f32>,
}

impl HeightTable {
    pub fn at(&self, t: f32) -> f32 {
        let last = self.factors.len().saturating_sub(1);
        let pos = t.clamp(0.0, 1.0) * last as f32;
        let lo = (pos.floor() as usize).min(last);
        let hi = (lo + 1).min(last);
        match (self.factors.get(lo), self.factors.get(hi)) {
            (Some(&a), Some(&b)) => a + (b - a) * (pos - lo as f32),
            _ => 0.0,
        }
    }
}
