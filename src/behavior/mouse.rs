//! Bezier mouse trajectories
//!
//! Human mouse movements follow curved paths with micro-jitter, not straight
//! lines. Paths are built as cubic Bezier curves through two randomized
//! control points, sampled at a fixed step count under a randomly chosen
//! easing curve.

use rand::rngs::StdRng;
use rand::Rng;

/// Fixed sample count per path, independent of distance.
pub const PATH_SAMPLES: usize = 50;

/// Maximum perpendicular offset of each control point from the chord.
const CONTROL_POINT_SPREAD: f64 = 50.0;

/// Per-sample jitter amplitude in either axis.
const JITTER: f64 = 1.0;

/// A 2D page coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One sampled position plus the dwell before moving to the next.
#[derive(Debug, Clone, Copy)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub delay_ms: u64,
}

/// An ordered trajectory, consumed once and never persisted.
#[derive(Debug, Clone)]
pub struct MousePath {
    pub waypoints: Vec<Waypoint>,
}

impl MousePath {
    /// Total dwell time across the whole trajectory.
    pub fn total_delay_ms(&self) -> u64 {
        self.waypoints.iter().map(|w| w.delay_ms).sum()
    }
}

/// Progress-curve shapes applied to the Bezier parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    Bounce,
}

const EASINGS: &[Easing] = &[
    Easing::Linear,
    Easing::EaseIn,
    Easing::EaseOut,
    Easing::EaseInOut,
    Easing::Bounce,
];

impl Easing {
    /// Map linear progress t in [0,1] to eased progress.
    fn apply(self, t: f64) -> f64 {
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            // Slight overshoot past the target before settling.
            Easing::Bounce => {
                let c1 = 1.70158;
                let c3 = c1 + 1.0;
                1.0 + c3 * (t - 1.0).powi(3) + c1 * (t - 1.0).powi(2)
            }
        }
    }
}

/// Build a trajectory from `start` to `end`.
///
/// The first and last waypoints are pinned to the exact requested endpoints;
/// jitter only touches interior samples.
pub(super) fn build_path(rng: &mut StdRng, start: Point, end: Point) -> MousePath {
    let cp1 = control_point(rng, start, end, 0.25);
    let cp2 = control_point(rng, start, end, 0.75);
    let easing = EASINGS[rng.gen_range(0..EASINGS.len())];

    let mut waypoints = Vec::with_capacity(PATH_SAMPLES);
    for i in 0..PATH_SAMPLES {
        let t = i as f64 / (PATH_SAMPLES - 1) as f64;
        let eased = easing.apply(t);
        let (mut x, mut y) = cubic_bezier(start, cp1, cp2, end, eased);

        let interior = i != 0 && i != PATH_SAMPLES - 1;
        if interior {
            x += rng.gen_range(-JITTER..=JITTER);
            y += rng.gen_range(-JITTER..=JITTER);
        } else {
            // Endpoints must land exactly where requested, whatever the
            // easing curve did to t.
            let target = if i == 0 { start } else { end };
            x = target.x;
            y = target.y;
        }

        waypoints.push(Waypoint {
            x,
            y,
            delay_ms: rng.gen_range(5..=20),
        });
    }

    MousePath { waypoints }
}

/// Pick a control point near the chord position `fraction`, offset up to
/// +/- CONTROL_POINT_SPREAD in both axes.
fn control_point(rng: &mut StdRng, start: Point, end: Point, fraction: f64) -> Point {
    Point {
        x: start.x + (end.x - start.x) * fraction + rng.gen_range(-CONTROL_POINT_SPREAD..=CONTROL_POINT_SPREAD),
        y: start.y + (end.y - start.y) * fraction + rng.gen_range(-CONTROL_POINT_SPREAD..=CONTROL_POINT_SPREAD),
    }
}

/// Standard cubic Bezier interpolation.
fn cubic_bezier(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> (f64, f64) {
    let mt = 1.0 - t;
    let mt2 = mt * mt;
    let mt3 = mt2 * mt;
    let t2 = t * t;
    let t3 = t2 * t;

    (
        mt3 * p0.x + 3.0 * mt2 * t * p1.x + 3.0 * mt * t2 * p2.x + t3 * p3.x,
        mt3 * p0.y + 3.0 * mt2 * t * p1.y + 3.0 * mt * t2 * p2.y + t3 * p3.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorSynthesizer;

    #[test]
    fn test_path_endpoints_are_exact() {
        let mut synth = BehaviorSynthesizer::with_seed(1);
        for (start, end) in [
            (Point::new(0.0, 0.0), Point::new(800.0, 600.0)),
            (Point::new(512.3, 9.7), Point::new(512.3, 9.7)),
            (Point::new(-40.0, 1200.0), Point::new(3.0, 3.0)),
        ] {
            let path = synth.mouse_path(start, end);
            let first = path.waypoints.first().unwrap();
            let last = path.waypoints.last().unwrap();
            assert_eq!((first.x, first.y), (start.x, start.y));
            assert_eq!((last.x, last.y), (end.x, end.y));
        }
    }

    #[test]
    fn test_sample_count_is_fixed_regardless_of_distance() {
        let mut synth = BehaviorSynthesizer::with_seed(2);
        let short = synth.mouse_path(Point::new(0.0, 0.0), Point::new(1.0, 1.0));
        let long = synth.mouse_path(Point::new(0.0, 0.0), Point::new(5000.0, 5000.0));
        assert_eq!(short.waypoints.len(), PATH_SAMPLES);
        assert_eq!(long.waypoints.len(), PATH_SAMPLES);
    }

    #[test]
    fn test_delays_stay_in_band() {
        let mut synth = BehaviorSynthesizer::with_seed(3);
        let path = synth.mouse_path(Point::new(10.0, 10.0), Point::new(900.0, 100.0));
        assert!(path.waypoints.iter().all(|w| (5..=20).contains(&w.delay_ms)));
        assert!(path.total_delay_ms() >= 5 * PATH_SAMPLES as u64);
    }

    #[test]
    fn test_seeded_paths_replay_exactly() {
        let a = BehaviorSynthesizer::with_seed(9).mouse_path(Point::new(0.0, 0.0), Point::new(100.0, 50.0));
        let b = BehaviorSynthesizer::with_seed(9).mouse_path(Point::new(0.0, 0.0), Point::new(100.0, 50.0));
        for (wa, wb) in a.waypoints.iter().zip(b.waypoints.iter()) {
            assert_eq!((wa.x, wa.y, wa.delay_ms), (wb.x, wb.y, wb.delay_ms));
        }
    }
}
