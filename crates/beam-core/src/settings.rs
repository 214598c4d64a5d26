use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Rendering quality tier. Controls how aggressively the simulated
/// point stream is thinned out before it reaches the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaserQuality {
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl LaserQuality {
    /// Stride for the main (processed) stream.
    pub fn downsample_factor(self) -> usize {
        match self {
            LaserQuality::Low => 8,
            LaserQuality::Medium => 4,
            LaserQuality::High => 2,
            LaserQuality::Ultra => 1,
        }
    }

    /// Stride for the beam stream.
    pub fn beam_downsample_factor(self) -> usize {
        match self {
            LaserQuality::Low | LaserQuality::Medium => 8,
            LaserQuality::High => 2,
            LaserQuality::Ultra => 1,
        }
    }
}

/// Largest accepted `sample_count`.
pub const MAX_SAMPLE_COUNT: usize = 1000;

/// Largest accepted `beam_intensity_count`.
pub const MAX_BEAM_INTENSITY_COUNT: usize = 1000;

/// System-wide configuration snapshot.
///
/// Built once at startup and never mutated afterwards; every device
/// buffer keeps its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserSettings {
    /// Number of logical laser devices. Range: 1..=255
    pub max_devices: usize,
    /// UDP port the controller multicasts to.
    pub network_port: u16,
    /// Run interpolation and galvo inertia simulation.
    pub scanner_simulation: bool,
    pub laser_quality: LaserQuality,
    /// Interpolated samples per raw segment. Range: 1..=1000
    pub sample_count: usize,
    /// Velocity EMA weight. Range: 0.0..1.0
    pub velocity_smoothing: f32,
    /// Edge fade / dwell amount. Range: 0.0..1.0
    pub edge_fade: f32,
    /// Stationary pairs needed before a held beam is reported.
    pub beam_repeat_threshold: usize,
    /// Synthetic points emitted per detected held beam. Range: 1..=1000
    pub beam_intensity_count: usize,
    /// Drop position-adjacent duplicates from the processed stream.
    pub enable_beam_brush: bool,
    /// Explicit path to the vendor decoder module.
    pub decoder_library: Option<PathBuf>,
}

impl Default for LaserSettings {
    fn default() -> Self {
        Self {
            max_devices: 9,
            network_port: 5568,
            scanner_simulation: true,
            laser_quality: LaserQuality::High,
            sample_count: 10,
            velocity_smoothing: 0.83,
            edge_fade: 0.1,
            beam_repeat_threshold: 3,
            beam_intensity_count: 10,
            enable_beam_brush: true,
            decoder_library: None,
        }
    }
}

impl LaserSettings {
    /// Copy with every field pulled back into its valid range.
    pub fn sanitized(&self) -> Self {
        Self {
            max_devices: self.max_devices.clamp(1, 255),
            sample_count: self.sample_count.clamp(1, MAX_SAMPLE_COUNT),
            velocity_smoothing: self.velocity_smoothing.clamp(0.0, 1.0),
            edge_fade: self.edge_fade.clamp(0.0, 1.0),
            beam_intensity_count: self.beam_intensity_count.clamp(1, MAX_BEAM_INTENSITY_COUNT),
            ..self.clone()
        }
    }
}
