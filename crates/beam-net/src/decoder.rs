//! Boundary to the vendor packet decoder.
//!
//! The wire format is undocumented, so decoding is delegated to a
//! [`DecoderBackend`]. The adapter only deals with what comes out of it:
//! six floats per point (`x, y, focus, r, g, b`) which get normalized,
//! flipped and shifted into [`LaserPoint`]s.

use beam_core::{LaserPoint, LaserSettings};

use crate::vendor::LibraryDecoder;

/// Floats per decoded sample: x, y, focus, r, g, b.
pub const SAMPLE_STRIDE: usize = 6;

/// A stateful packet decoder.
///
/// Implementations keep one point store per device that every
/// [`read_packet`](DecoderBackend::read_packet) call may update. Any
/// resources are released on drop.
pub trait DecoderBackend: Send {
    fn initialize(&mut self, max_devices: usize) -> Result<(), String>;

    /// Feed one datagram to the decoder.
    fn read_packet(&mut self, data: &[u8]);

    /// Current samples for `device`, `SAMPLE_STRIDE` floats per point.
    /// `None` or an empty slice means nothing was decoded.
    fn device_samples(&mut self, device: usize) -> Option<&[f32]>;

    fn name(&self) -> &str;
}

/// Stand-in used when the vendor module is unavailable. Decodes nothing.
#[derive(Debug, Default)]
pub struct NullDecoder;

impl DecoderBackend for NullDecoder {
    fn initialize(&mut self, _max_devices: usize) -> Result<(), String> {
        Ok(())
    }

    fn read_packet(&mut self, _data: &[u8]) {}

    fn device_samples(&mut self, _device: usize) -> Option<&[f32]> {
        None
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Owns the decoder backend and turns its output into laser points.
pub struct DecoderAdapter {
    backend: Box<dyn DecoderBackend>,
    max_devices: usize,
}

impl DecoderAdapter {
    /// Wrap an already-initialized backend.
    pub fn new(backend: Box<dyn DecoderBackend>, max_devices: usize) -> Self {
        Self { backend, max_devices }
    }

    /// Adapter that never decodes anything.
    pub fn null(max_devices: usize) -> Self {
        Self::new(Box::new(NullDecoder), max_devices)
    }

    /// Load the vendor module named in `settings`, falling back to the
    /// null decoder when it is missing or incomplete.
    pub fn open(settings: &LaserSettings) -> Self {
        let max_devices = settings.max_devices;
        let loaded = LibraryDecoder::locate(settings.decoder_library.as_deref()).and_then(|mut decoder| {
            decoder.initialize(max_devices)?;
            Ok(decoder)
        });

        match loaded {
            Ok(decoder) => {
                log::info!("Decoder module loaded from {}", decoder.name());
                Self::new(Box::new(decoder), max_devices)
            }
            Err(e) => {
                log::warn!("{}; packets will not be decoded", e);
                Self::null(max_devices)
            }
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Decode one datagram for the device the network layer attributed it to.
    ///
    /// The packet is always fed to the backend, since its state spans
    /// packets, but points are only returned for a device hint inside
    /// `0..max_devices`.
    pub fn decode(&mut self, data: &[u8], device_hint: Option<usize>) -> Option<(usize, Vec<LaserPoint>)> {
        if data.is_empty() {
            return None;
        }
        self.backend.read_packet(data);

        let device = device_hint.filter(|&d| d < self.max_devices)?;
        let samples = self.backend.device_samples(device)?;
        if samples.len() < SAMPLE_STRIDE {
            return None;
        }
        Some((device, points_from_samples(samples)))
    }
}

/// Convert raw decoder samples into laser points.
///
/// Colors on a 0..255 scale (any channel above 1) are brought to 0..1,
/// focus is always a 0..255 value, and Y is flipped from the protocol's
/// convention to the renderer's. The color and focus carried by sample
/// `i` belong to point `i - 1`, so the last point is left dark.
pub fn points_from_samples(samples: &[f32]) -> Vec<LaserPoint> {
    let mut points: Vec<LaserPoint> = Vec::with_capacity(samples.len() / SAMPLE_STRIDE);

    for sample in samples.chunks_exact(SAMPLE_STRIDE) {
        let &[x, y, focus, mut r, mut g, mut b] = sample else {
            continue;
        };

        if r > 1.0 || g > 1.0 || b > 1.0 {
            r /= 255.0;
            g /= 255.0;
            b /= 255.0;
        }

        if let Some(prev) = points.last_mut() {
            prev.r = r;
            prev.g = g;
            prev.b = b;
            prev.focus = focus.clamp(0.0, 255.0) / 255.0;
            prev.clamp_colour();
        }

        points.push(LaserPoint::xy(x, -y));
    }

    points
}
