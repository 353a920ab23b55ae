//! Rasterizes the leading jet of an event into a square, multi-channel image
//! centred on the jet axis and spanning +/- 1 unit in eta and phi.

use std::f64::consts::PI;

use crate::types::JetCluster;

/// Half-width of the encoded window in eta and phi.
const WINDOW: f64 = 1.0;

/// N x N x C grid, stored row-major as `[eta][phi][channel]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    size: usize,
    channels: usize,
    data: Vec<f32>,
}

impl Image {
    pub fn zeros(size: usize, channels: usize) -> Self {
        Self {
            size,
            channels,
            data: vec![0.0; size * size * channels],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn get(&self, eta: usize, phi: usize, channel: usize) -> f32 {
        self.data[self.offset(eta, phi) + channel]
    }

    /// Flat view in `[eta][phi][channel]` order, ready for an NHWC tensor.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    fn offset(&self, eta: usize, phi: usize) -> usize {
        (eta * self.size + phi) * self.channels
    }

    fn add(&mut self, eta: usize, phi: usize, value: f32) {
        let start = self.offset(eta, phi);
        for px in &mut self.data[start..start + self.channels] {
            *px += value;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageEncoder {
    grid_size: usize,
    channels: usize,
}

impl ImageEncoder {
    pub fn new(grid_size: usize, channels: usize) -> Self {
        Self {
            grid_size,
            channels,
        }
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Accumulates `pt / jet_pt` of every in-window constituent into its pixel,
    /// replicated over all channels. No jet gives an all-zero image.
    pub fn encode(&self, jet: Option<&JetCluster>) -> Image {
        let mut image = Image::zeros(self.grid_size, self.channels);
        let Some(jet) = jet else {
            return image;
        };
        if !(jet.pt.is_finite() && jet.pt > 0.0) {
            tracing::warn!(jet_pt = jet.pt, "jet pt is not positive; emitting empty image");
            return image;
        }

        let pixel_width = 2.0 * WINDOW / self.grid_size as f64;
        let mut dropped = 0usize;
        for p in &jet.constituents {
            let dphi = wrap_phi(p.phi - jet.phi);
            let deta = p.eta - jet.eta;
            // rare for a wide jet; NaN deltas fail the check too
            if !(deta.abs() <= WINDOW && dphi.abs() <= WINDOW) {
                dropped += 1;
                continue;
            }
            let eta_idx = self.pixel_index(deta, pixel_width);
            let phi_idx = self.pixel_index(dphi, pixel_width);
            image.add(eta_idx, phi_idx, (p.pt / jet.pt) as f32);
        }
        if dropped > 0 {
            tracing::debug!(
                dropped,
                total = jet.constituents.len(),
                "constituents outside encoding window"
            );
        }
        image
    }

    /// `delta` is already inside the window; an edge value of exactly +1 would
    /// land on N, so clamp onto the last pixel.
    fn pixel_index(&self, delta: f64, pixel_width: f64) -> usize {
        let idx = ((delta + WINDOW) / pixel_width).floor() as usize;
        idx.min(self.grid_size - 1)
    }
}

/// Brings a phi difference into (-pi, pi] with a single 2*pi shift.
pub fn wrap_phi(dphi: f64) -> f64 {
    if dphi > PI {
        dphi - 2.0 * PI
    } else if dphi <= -PI {
        dphi + 2.0 * PI
    } else {
        dphi
    }
}
