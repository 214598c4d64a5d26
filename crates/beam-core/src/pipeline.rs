//! Raw scanner points → renderable streams.
//!
//! Each tick a device's raw list runs through hot-beam detection,
//! interpolation, galvo inertia simulation and quality downsampling.
//! Simulation state is rebuilt from scratch every tick; the only state
//! carried between ticks is buffer capacity.

use glam::Vec2;

use crate::point::{LaserPoint, EPSILON};
use crate::settings::LaserSettings;

/// Upper bound on the dwell brightening of a slow-moving beam.
const MAX_DWELL_INTENSITY: f32 = 4.0;

/// Output lists of one device plus the raw list they are derived from.
#[derive(Debug, Default, Clone)]
pub struct DeviceFrames {
    /// Last decoded packet. Replaced wholesale, never appended.
    pub raw: Vec<LaserPoint>,
    /// Main stream for the line renderer.
    pub processed: Vec<LaserPoint>,
    /// Stream for beam rendering (separate stride from `processed`).
    pub beam: Vec<LaserPoint>,
    /// Synthetic points at detected held beams.
    pub hot_beam: Vec<LaserPoint>,
    interpolated: Vec<LaserPoint>,
}

impl DeviceFrames {
    /// Empty lists with room for `capacity` points each.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: Vec::with_capacity(capacity),
            processed: Vec::with_capacity(capacity),
            beam: Vec::with_capacity(capacity),
            hot_beam: Vec::new(),
            interpolated: Vec::new(),
        }
    }

    fn clear_outputs(&mut self) {
        self.processed.clear();
        self.beam.clear();
        self.hot_beam.clear();
    }
}

/// Per-device processing chain configured from a settings snapshot.
#[derive(Debug, Clone)]
pub struct PointPipeline {
    settings: LaserSettings,
}

impl PointPipeline {
    pub fn new(settings: &LaserSettings) -> Self {
        Self { settings: settings.sanitized() }
    }

    pub fn settings(&self) -> &LaserSettings {
        &self.settings
    }

    /// Rebuild `processed`, `beam` and `hot_beam` from `frames.raw`.
    pub fn run(&self, frames: &mut DeviceFrames) {
        if frames.raw.is_empty() {
            frames.clear_outputs();
            return;
        }

        frames.hot_beam = detect_hot_beams(
            &frames.raw,
            self.settings.beam_repeat_threshold,
            self.settings.beam_intensity_count,
        );

        if !self.settings.scanner_simulation || frames.raw.len() < 2 {
            frames.processed.clone_from(&frames.raw);
            frames.beam.clone_from(&frames.raw);
        } else {
            if let Err(e) = interpolate_points(&frames.raw, self.settings.sample_count, &mut frames.interpolated) {
                log::error!("Skipping tick: {}", e);
                return;
            }
            simulate_scanner(
                &mut frames.interpolated,
                self.settings.sample_count,
                self.settings.velocity_smoothing,
                self.settings.edge_fade,
            );

            let quality = self.settings.laser_quality;
            frames.processed = downsample_points(&frames.interpolated, quality.downsample_factor());
            frames.beam = downsample_points(&frames.interpolated, quality.beam_downsample_factor());
        }

        if self.settings.enable_beam_brush {
            frames.processed = remove_duplicate_points(&frames.processed);
        }
    }
}

/// Linear interpolation of `sample_count` samples per consecutive pair.
///
/// Both segment endpoints are included, so adjacent segments share a
/// duplicated junction sample. Lists shorter than two points, or a
/// `sample_count` of 0 or 1, are copied through unchanged. Fails without
/// touching the points when the output cannot be allocated.
pub fn interpolate_points(points: &[LaserPoint], sample_count: usize, out: &mut Vec<LaserPoint>) -> Result<(), String> {
    out.clear();
    if points.len() < 2 || sample_count <= 1 {
        out.try_reserve(points.len())
            .map_err(|e| format!("Failed to grow interpolation buffer to {} points: {}", points.len(), e))?;
        out.extend_from_slice(points);
        return Ok(());
    }

    let total = (points.len() - 1)
        .checked_mul(sample_count)
        .ok_or_else(|| format!("{} raw points x {} samples overflows", points.len(), sample_count))?;
    out.try_reserve(total)
        .map_err(|e| format!("Failed to grow interpolation buffer to {} points: {}", total, e))?;
    let last = (sample_count - 1) as f32;
    for pair in points.windows(2) {
        for s in 0..sample_count {
            let t = s as f32 / last;
            out.push(pair[0].lerp(&pair[1], t));
        }
    }
    Ok(())
}

/// Galvo inertia model, applied in place.
///
/// The mirror chases each sample with an exponentially smoothed velocity.
/// Brightness scales with the inverse of that velocity (slow mirror = more
/// dwell), except for beam points which always keep full brightness.
pub fn simulate_scanner(points: &mut [LaserPoint], sample_count: usize, smoothing: f32, edge_fade: f32) {
    let Some(first) = points.first() else {
        return;
    };

    let edge_fade = edge_fade.max(0.1);
    let step_size = 100.0 / sample_count.max(1) as f32 * 0.01;
    let mut position = first.position();
    let mut velocity = Vec2::ZERO;

    for point in points.iter_mut() {
        let target = point.position() - position;
        let mut intensity = 1.0;

        if target.length() > 0.0 {
            velocity += (target - velocity) * (1.0 - smoothing);
            position += velocity * step_size;
            intensity = edge_intensity(velocity.length(), edge_fade);
        }

        if point.is_beam() {
            intensity = 1.0;
        }

        point.x = position.x;
        point.y = position.y;
        point.r *= intensity;
        point.g *= intensity;
        point.b *= intensity;
    }
}

// The clamp/divide/blend order is tuned by eye; keep it literal.
fn edge_intensity(speed: f32, edge_fade: f32) -> f32 {
    let intensity = (1.0 / speed * 0.2 * edge_fade * 2.0).min(MAX_DWELL_INTENSITY);
    let intensity = intensity.min(MAX_DWELL_INTENSITY) / (edge_fade * 2.0 * 4.0).max(1.0);
    let fade_percent = (edge_fade - 0.5).max(0.0) * 2.0;
    intensity * (1.0 - fade_percent) + fade_percent
}

/// Keep every `factor`-th point starting at index 0.
pub fn downsample_points(points: &[LaserPoint], factor: usize) -> Vec<LaserPoint> {
    points.iter().step_by(factor.max(1)).copied().collect()
}

/// Drop points that sit on the same position as the point kept before them.
pub fn remove_duplicate_points(points: &[LaserPoint]) -> Vec<LaserPoint> {
    let mut result: Vec<LaserPoint> = Vec::with_capacity(points.len());
    for point in points {
        match result.last() {
            Some(last) if last.is_same_position(point) => {}
            _ => result.push(*point),
        }
    }
    result
}

/// Find held beams (runs of lit points that do not move) in a raw list.
///
/// A run longer than `repeat_threshold` stationary pairs yields
/// `intensity_count` copies of its last point with ascending beam markers
/// ending at 1.0.
pub fn detect_hot_beams(points: &[LaserPoint], repeat_threshold: usize, intensity_count: usize) -> Vec<LaserPoint> {
    let mut hot = Vec::new();
    let mut run = 0usize;

    for pair in points.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        if curr.is_same_position(prev) && !curr.is_blank() && !prev.is_blank() {
            run += 1;
            continue;
        }
        if run > repeat_threshold {
            push_hot_beam(&mut hot, prev, intensity_count);
        }
        run = 0;
    }

    if run > repeat_threshold {
        if let Some(last) = points.last() {
            push_hot_beam(&mut hot, last, intensity_count);
        }
    }

    hot
}

fn push_hot_beam(hot: &mut Vec<LaserPoint>, source: &LaserPoint, count: usize) {
    for level in 0..count {
        let z = if count > 1 {
            (level as f32 / (count - 1) as f32).max(EPSILON)
        } else {
            1.0
        };
        hot.push(source.with_beam(z));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::LaserQuality;

    fn lit(x: f32, y: f32) -> LaserPoint {
        LaserPoint::with_rgb(x, y, 1.0, 1.0, 1.0)
    }

    #[test]
    fn test_interpolate_endpoints_and_count() {
        let points = vec![lit(0.0, 0.0), lit(1.0, 0.0), lit(1.0, 1.0)];
        let mut out = Vec::new();
        interpolate_points(&points, 5, &mut out).unwrap();
        assert_eq!(out.len(), 10);
        assert!(out[0].approx_eq(&points[0]));
        assert!(out[4].approx_eq(&points[1]));
        assert!(out[5].approx_eq(&points[1]));
        assert!(out[9].approx_eq(&points[2]));
        assert!((out[2].x - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_interpolate_overflowing_sample_count_fails() {
        let points = vec![lit(0.0, 0.0), lit(1.0, 0.0), lit(1.0, 1.0)];
        let mut out = vec![lit(9.0, 9.0)];
        let err = interpolate_points(&points, usize::MAX / 2 + 1, &mut out).unwrap_err();
        assert!(err.contains("overflows"));
        assert!(out.is_empty());
    }

    #[test]
    fn test_run_keeps_outputs_when_interpolation_fails() {
        let pipeline = PointPipeline {
            settings: LaserSettings {
                sample_count: usize::MAX / 2 + 1,
                ..LaserSettings::default()
            },
        };
        let mut frames = DeviceFrames {
            raw: vec![lit(0.0, 0.0), lit(1.0, 0.0), lit(1.0, 1.0)],
            processed: vec![lit(0.5, 0.5)],
            ..DeviceFrames::default()
        };
        pipeline.run(&mut frames);
        assert_eq!(frames.processed, vec![lit(0.5, 0.5)]);
    }

    #[test]
    fn test_interpolate_single_sample_is_passthrough() {
        let points = vec![lit(0.0, 0.0), lit(1.0, 0.0)];
        let mut out = vec![lit(9.0, 9.0)];
        interpolate_points(&points, 1, &mut out).unwrap();
        assert_eq!(out, points);
    }

    #[test]
    fn test_interpolate_keeps_beam_marker_out_of_scan_segment() {
        let points = vec![lit(0.0, 0.0), lit(1.0, 0.0).with_beam(1.0), lit(1.0, 0.0).with_beam(1.0)];
        let mut out = Vec::new();
        interpolate_points(&points, 4, &mut out).unwrap();
        assert!(out[..4].iter().all(|p| p.z == 0.0));
        assert!(out[4..].iter().all(|p| (p.z - 1.0).abs() < EPSILON));
    }

    #[test]
    fn test_simulation_first_point_unchanged() {
        let mut points = vec![lit(0.3, -0.2), lit(0.4, -0.2)];
        simulate_scanner(&mut points, 10, 0.83, 0.1);
        assert_eq!(points[0].x, 0.3);
        assert_eq!(points[0].y, -0.2);
        assert_eq!(points[0].r, 1.0);
    }

    #[test]
    fn test_simulation_lags_behind_target() {
        let mut points = vec![lit(0.0, 0.0), lit(1.0, 0.0)];
        simulate_scanner(&mut points, 10, 0.5, 0.1);
        // v = 0.5, step = 0.1 → x = 0.05
        assert!((points[1].x - 0.05).abs() < 1e-6);
        // 1/0.5 * 0.2 * 0.1 * 2 = 0.08, divided by max(1, 0.8) = 0.08
        assert!((points[1].r - 0.08).abs() < 1e-6);
        assert_eq!(points[1].focus, 0.0);
    }

    #[test]
    fn test_simulation_intensity_capped() {
        let mut points = vec![lit(0.0, 0.0), lit(0.0001, 0.0)];
        simulate_scanner(&mut points, 10, 0.0, 1.0);
        // EdgeFade 1.0 blends fully towards 1.0
        assert!((points[1].r - 1.0).abs() < 1e-5);

        let mut points = vec![lit(0.0, 0.0), lit(0.00001, 0.0)];
        simulate_scanner(&mut points, 10, 0.0, 0.5);
        // capped at 4.0, divided by 4.0
        assert!((points[1].g - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_simulation_beam_points_not_faded() {
        let mut points = vec![lit(0.0, 0.0), lit(1.0, 0.0).with_beam(0.5)];
        simulate_scanner(&mut points, 10, 0.5, 0.1);
        assert_eq!(points[1].r, 1.0);
        assert_eq!(points[1].z, 0.5);
    }

    #[test]
    fn test_downsample() {
        let points: Vec<LaserPoint> = (0..10).map(|i| lit(i as f32, 0.0)).collect();
        assert_eq!(downsample_points(&points, 1), points);
        let thinned = downsample_points(&points, 4);
        assert_eq!(thinned.len(), 3);
        assert_eq!(thinned[0].x, 0.0);
        assert_eq!(thinned[1].x, 4.0);
        assert_eq!(thinned[2].x, 8.0);
        assert!(downsample_points(&[], 8).is_empty());
    }

    #[test]
    fn test_remove_duplicates() {
        let points = vec![lit(0.0, 0.0), lit(0.0, 0.0), lit(1.0, 0.0), lit(1.0, 0.0), lit(0.0, 0.0)];
        let deduped = remove_duplicate_points(&points);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0], points[0]);
        assert!(deduped.windows(2).all(|w| !w[0].is_same_position(&w[1])));
    }

    #[test]
    fn test_hot_beam_threshold() {
        // 4 equal points = 3 stationary pairs
        let mut points = vec![lit(0.5, 0.5); 4];
        points.push(lit(0.0, 0.0));
        assert!(detect_hot_beams(&points, 3, 5).is_empty());

        let mut points = vec![lit(0.5, 0.5); 5];
        points.push(lit(0.0, 0.0));
        let hot = detect_hot_beams(&points, 3, 5);
        assert_eq!(hot.len(), 5);
        assert!(hot.iter().all(|p| p.is_same_position(&lit(0.5, 0.5))));
        assert_eq!(hot[0].z, EPSILON);
        assert_eq!(hot[4].z, 1.0);
        assert!(hot.windows(2).all(|w| w[1].z > w[0].z));
    }

    #[test]
    fn test_hot_beam_run_at_end_of_list() {
        let points = vec![lit(0.5, 0.5); 6];
        assert_eq!(detect_hot_beams(&points, 3, 4).len(), 4);
    }

    #[test]
    fn test_hot_beam_ignores_blank_runs() {
        let points = vec![LaserPoint::xy(0.5, 0.5); 20];
        assert!(detect_hot_beams(&points, 3, 4).is_empty());
    }

    #[test]
    fn test_hot_beam_single_level() {
        let points = vec![lit(0.1, 0.1); 3];
        let hot = detect_hot_beams(&points, 1, 1);
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0].z, 1.0);
    }

    #[test]
    fn test_run_empty_clears_outputs() {
        let pipeline = PointPipeline::new(&LaserSettings::default());
        let mut frames = DeviceFrames {
            processed: vec![lit(1.0, 1.0)],
            beam: vec![lit(1.0, 1.0)],
            hot_beam: vec![lit(1.0, 1.0)],
            ..DeviceFrames::default()
        };
        pipeline.run(&mut frames);
        assert!(frames.processed.is_empty());
        assert!(frames.beam.is_empty());
        assert!(frames.hot_beam.is_empty());
    }

    #[test]
    fn test_run_simulated_lengths() {
        let settings = LaserSettings {
            sample_count: 8,
            laser_quality: LaserQuality::Medium,
            enable_beam_brush: false,
            ..LaserSettings::default()
        };
        let pipeline = PointPipeline::new(&settings);
        let mut frames = DeviceFrames {
            raw: vec![lit(-1.0, 0.0), lit(1.0, 0.0), lit(1.0, 1.0)],
            ..DeviceFrames::default()
        };
        pipeline.run(&mut frames);
        // 2 segments * 8 samples = 16; /4 → 4, /8 → 2
        assert_eq!(frames.processed.len(), 4);
        assert_eq!(frames.beam.len(), 2);
    }
}
