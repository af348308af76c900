//! Randomised pacing and pointer motion drawn from a [`TempoPlan`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use cdp_adapter::Rect;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::{DelayRange, TempoPlan};

/// Scroll gesture: down, linger, then a smaller drift back up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollPlan {
    pub down_px: f64,
    pub pause: Duration,
    pub up_px: f64,
}

/// Per-session tempo source. Tracks the simulated cursor so consecutive
/// moves start where the last one ended.
pub struct Tempo {
    plan: TempoPlan,
    rng: Mutex<StdRng>,
    cursor: Mutex<(f64, f64)>,
}

impl Tempo {
    pub fn new(plan: TempoPlan) -> Self {
        let rng = match plan.seed {
            Some(_) => StdRng::seed_from_u64(tempo_seed(&plan)),
            None => StdRng::from_entropy(),
        };
        Self {
            plan,
            rng: Mutex::new(rng),
            cursor: Mutex::new((0.0, 0.0)),
        }
    }

    pub fn plan(&self) -> &TempoPlan {
        &self.plan
    }

    pub fn draw(&self, range: DelayRange) -> Duration {
        let (lo, hi) = range.bounds();
        if lo == hi {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(self.rng.lock().gen_range(lo..=hi))
    }

    pub fn action_delay(&self) -> Duration {
        self.draw(self.plan.action)
    }

    pub fn short_delay(&self) -> Duration {
        self.draw(self.plan.short)
    }

    pub fn key_delay(&self) -> Duration {
        self.draw(self.plan.typing.per_key)
    }

    pub fn press_hold(&self) -> Duration {
        self.draw(self.plan.mouse.press)
    }

    fn uniform(&self, (lo, hi): (f64, f64)) -> f64 {
        if hi <= lo {
            return lo;
        }
        self.rng.lock().gen_range(lo..=hi)
    }

    fn steps(&self, (lo, hi): (u32, u32)) -> u32 {
        let (lo, hi) = (lo.max(1), hi.max(1));
        if hi <= lo {
            return lo;
        }
        self.rng.lock().gen_range(lo..=hi)
    }

    /// Random point inside the central band of `rect`.
    pub fn click_point(&self, rect: &Rect) -> (f64, f64) {
        let inset = self.plan.mouse.click_inset;
        let fx = self.uniform(inset);
        let fy = self.uniform(inset);
        rect.point_at(fx, fy)
    }

    /// Curved path from the current cursor through a random waypoint to
    /// `target`. The final point is exactly `target`.
    pub fn mouse_path(&self, target: (f64, f64)) -> Vec<(f64, f64)> {
        let start = *self.cursor.lock();
        let mouse = &self.plan.mouse;
        let waypoint = (self.uniform(mouse.waypoint_x), self.uniform(mouse.waypoint_y));

        let mut path = Vec::new();
        self.leg(start, waypoint, self.steps(mouse.waypoint_steps), &mut path);
        self.leg(waypoint, target, self.steps(mouse.target_steps), &mut path);
        if let Some(last) = path.last_mut() {
            *last = target;
        }
        *self.cursor.lock() = target;
        path
    }

    fn leg(&self, from: (f64, f64), to: (f64, f64), steps: u32, out: &mut Vec<(f64, f64)>) {
        let jitter = self.plan.mouse.jitter_px.abs();
        for i in 1..=steps {
            let t = f64::from(i) / f64::from(steps);
            let eased = t * t * (3.0 - 2.0 * t);
            let (mut x, mut y) = (
                from.0 + (to.0 - from.0) * eased,
                from.1 + (to.1 - from.1) * eased,
            );
            if jitter > 0.0 && i < steps {
                x += self.uniform((-jitter, jitter));
                y += self.uniform((-jitter, jitter));
            }
            out.push((x, y));
        }
    }

    pub fn scroll_plan(&self) -> ScrollPlan {
        let scroll = &self.plan.scroll;
        ScrollPlan {
            down_px: f64::from(self.steps(scroll.down_px)),
            pause: self.draw(scroll.pause),
            up_px: f64::from(self.steps(scroll.up_px)),
        }
    }

    /// Uniform delay in `[min, max]`, for retry backoff and settle pauses.
    pub fn between(&self, min: Duration, max: Duration) -> Duration {
        self.draw(DelayRange::new(
            min.as_millis() as u64,
            max.as_millis() as u64,
        ))
    }
}

fn tempo_seed(plan: &TempoPlan) -> u64 {
    let mut hasher = DefaultHasher::new();
    plan.name.hash(&mut hasher);
    if let Some(seed) = plan.seed {
        seed.hash(&mut hasher);
    }
    hasher.finish()
}
