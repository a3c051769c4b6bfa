//! Behavior emulator: Gaussian-clamped timing samples,
//! Bézier-eased mouse travel, and segmented scrolling with reading
//! pauses, grounded in `original_source/src/stealth/behavior.py`.

use std::f64::consts::PI;
use std::time::Duration;

use rand::Rng;

use crate::config::BehaviorIntensity;
use crate::driver::BrowserDriver;

use super::errors::StealthResult;

/// `(mean_ms, stddev_ms, min_ms, max_ms)` for a Gaussian sample clamped to
/// `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct TimingTuple {
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl TimingTuple {
    const fn new(mean_ms: f64, stddev_ms: f64, min_ms: f64, max_ms: f64) -> Self {
        Self { mean_ms, stddev_ms, min_ms, max_ms }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BehaviorTimingProfile {
    pub intensity: BehaviorIntensity,
    pub click_hesitation: TimingTuple,
    pub mouse_travel_time: TimingTuple,
    pub micro_delay: TimingTuple,
    pub scroll_pause: TimingTuple,
}

#[must_use]
pub fn profile_for(intensity: BehaviorIntensity) -> BehaviorTimingProfile {
    match intensity {
        BehaviorIntensity::Conservative => BehaviorTimingProfile {
            intensity,
            click_hesitation: TimingTuple::new(250.0, 100.0, 100.0, 500.0),
            mouse_travel_time: TimingTuple::new(300.0, 150.0, 100.0, 800.0),
            micro_delay: TimingTuple::new(50.0, 30.0, 10.0, 150.0),
            scroll_pause: TimingTuple::new(500.0, 300.0, 200.0, 1500.0),
        },
        BehaviorIntensity::Moderate => BehaviorTimingProfile {
            intensity,
            click_hesitation: TimingTuple::new(150.0, 75.0, 50.0, 400.0),
            mouse_travel_time: TimingTuple::new(200.0, 100.0, 50.0, 600.0),
            micro_delay: TimingTuple::new(30.0, 20.0, 5.0, 100.0),
            scroll_pause: TimingTuple::new(300.0, 200.0, 100.0, 1000.0),
        },
        BehaviorIntensity::Aggressive => BehaviorTimingProfile {
            intensity,
            click_hesitation: TimingTuple::new(75.0, 40.0, 20.0, 200.0),
            mouse_travel_time: TimingTuple::new(100.0, 50.0, 20.0, 300.0),
            micro_delay: TimingTuple::new(15.0, 10.0, 2.0, 50.0),
            scroll_pause: TimingTuple::new(100.0, 75.0, 30.0, 400.0),
        },
    }
}

/// Samples a Gaussian via Box-Muller (the stdlib-only substitute for
/// Python's `random.gauss`; `rand` 0.9 ships no `Normal` distribution
/// without the separate `rand_distr` crate), clamped to `[min, max]`.
#[must_use]
pub fn sample_clamped(tuple: TimingTuple, rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random_range(0.0..1.0);
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    let value = tuple.mean_ms + z0 * tuple.stddev_ms;
    value.clamp(tuple.min_ms, tuple.max_ms)
}

/// Cubic ease-in-out: `3t^2 - 2t^3`, explicitly not linear interpolation.
#[must_use]
pub fn ease_in_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    3.0 * t * t - 2.0 * t * t * t
}

pub struct BehaviorEmulator {
    profile: BehaviorTimingProfile,
}

impl BehaviorEmulator {
    #[must_use]
    pub fn new(intensity: BehaviorIntensity) -> Self {
        Self { profile: profile_for(intensity) }
    }

    #[must_use]
    pub fn profile(&self) -> BehaviorTimingProfile {
        self.profile
    }

    fn sample(&self, tuple: TimingTuple) -> Duration {
        let mut rng = rand::rng();
        Duration::from_millis(sample_clamped(tuple, &mut rng).round() as u64)
    }

    /// Hesitates for a sampled click-hesitation delay, then clicks `css`.
    pub async fn click_with_delay(&self, driver: &dyn BrowserDriver, css: &str) -> StealthResult<()> {
        tokio::time::sleep(self.sample(self.profile.click_hesitation)).await;
        driver.click(css).await?;
        Ok(())
    }

    /// Moves the mouse from `(from_x, from_y)` to `(to_x, to_y)` along a
    /// Bézier ease-in-out curve, stepped at ~60fps over a sampled travel
    /// duration.
    pub async fn move_mouse_naturally(
        &self,
        driver: &dyn BrowserDriver,
        from: (f64, f64),
        to: (f64, f64),
    ) -> StealthResult<()> {
        let duration = self.sample(self.profile.mouse_travel_time);
        let steps = ((duration.as_secs_f64() * 60.0).round() as usize).max(1);
        let step_delay = duration / steps as u32;

        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let eased = ease_in_out(t);
            let x = from.0 + (to.0 - from.0) * eased;
            let y = from.1 + (to.1 - from.1) * eased;
            driver.mouse_move(x, y).await?;
            if i < steps {
                tokio::time::sleep(step_delay).await;
            }
        }
        Ok(())
    }

    /// Scrolls `total_dy` pixels in 2-4 variable-speed segments with a
    /// sampled reading pause between each.
    pub async fn scroll_naturally(&self, driver: &dyn BrowserDriver, total_dy: f64) -> StealthResult<()> {
        let mut rng = rand::rng();
        let segment_count = rng.random_range(2..=4);
        let mut remaining = total_dy;

        for seg in 0..segment_count {
            let segments_left = segment_count - seg;
            let share = if segments_left == 1 {
                remaining
            } else {
                let fraction = rng.random_range(0.2..0.6);
                remaining * fraction
            };
            driver.scroll_by(0.0, share).await?;
            remaining -= share;

            if seg + 1 < segment_count {
                tokio::time::sleep(self.sample(self.profile.scroll_pause)).await;
            }
        }
        Ok(())
    }

    pub async fn add_micro_delay(&self) {
        tokio::time::sleep(self.sample(self.profile.micro_delay)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_within_bounds() {
        let tuple = TimingTuple::new(150.0, 75.0, 50.0, 400.0);
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let value = sample_clamped(tuple, &mut rng);
            assert!((tuple.min_ms..=tuple.max_ms).contains(&value), "{value} out of bounds");
        }
    }

    #[test]
    fn ease_in_out_endpoints() {
        assert!((ease_in_out(0.0) - 0.0).abs() < 1e-9);
        assert!((ease_in_out(1.0) - 1.0).abs() < 1e-9);
        assert!((ease_in_out(0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn ease_in_out_is_monotone() {
        let mut prev = ease_in_out(0.0);
        for i in 1..=10 {
            let next = ease_in_out(i as f64 / 10.0);
            assert!(next >= prev);
            prev = next;
        }
    }
}
