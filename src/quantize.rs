//! Intensity quantization to 8 bits
//!
//! Rescales a volume of arbitrary range into [0, 255]. The ceiling is chosen
//! from a 2048-bin histogram so that a handful of hot-spot voxels do not
//! squash the rest of the intensity range.

use std::borrow::Cow;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{CoregError, Result};
use crate::volume::Volume;

/// Number of bins in the clipping histogram
pub const CLIP_BINS: usize = 2048;

/// Cumulative mass above which the remaining bins are treated as hot spots
pub const CLIP_FRACTION: f64 = 0.9999;

/// Options for [`quantize`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeParams {
    /// Standard deviation of Gaussian noise added before rounding (0 = off)
    pub dither: f64,
    /// Seed for the dithering noise
    pub seed: u64,
}

impl Default for QuantizeParams {
    fn default() -> Self {
        Self {
            dither: 0.0,
            seed: 0,
        }
    }
}

/// Quantize a volume into unsigned 8-bit intensities
///
/// Three passes over the z-slices:
/// 1. global min/max of the finite voxels
/// 2. a [`CLIP_BINS`]-bin histogram over that range; the first bin whose
///    cumulative fraction exceeds [`CLIP_FRACTION`] becomes the ceiling
/// 3. `round((v - min) * 255 / (ceiling - min))`, clamped to [0, 255]
///
/// Non-finite voxels map to 0.
///
/// # Errors
/// `DegenerateIntensityRange` for a constant volume, `InvalidParameter`
/// when no voxel is finite or the dithering level is negative.
pub fn quantize<T: Copy + Into<f64>>(volume: &Volume<T>, params: &QuantizeParams) -> Result<Volume<u8>> {
    if !(params.dither >= 0.0 && params.dither.is_finite()) {
        return Err(CoregError::InvalidParameter(format!(
            "dither must be finite and non-negative, got {}",
            params.dither
        )));
    }

    let (nx, ny, _) = volume.dims;
    let slice_len = (nx * ny).max(1);

    info!("Computing min/max of {}x{}x{} volume...", volume.dims.0, volume.dims.1, volume.dims.2);
    let mut mn = f64::INFINITY;
    let mut mx = f64::NEG_INFINITY;
    for slice in volume.data.chunks(slice_len) {
        for &v in slice {
            let v: f64 = v.into();
            if v.is_finite() {
                mn = mn.min(v);
                mx = mx.max(v);
            }
        }
    }

    if !mn.is_finite() {
        return Err(CoregError::InvalidParameter("volume has no finite intensities".to_string()));
    }
    if mx <= mn {
        return Err(CoregError::DegenerateIntensityRange { min: mn });
    }

    info!("2nd pass max/min...");
    let ceiling = clipped_maximum(volume, mn, mx, slice_len);
    info!("Intensity range [{}, {}], ceiling {}", mn, mx, ceiling);

    let scale = 255.0 / (ceiling - mn);
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut out = Vec::with_capacity(volume.len());
    for slice in volume.data.chunks(slice_len) {
        for &v in slice {
            let v: f64 = v.into();
            if !v.is_finite() {
                out.push(0u8);
                continue;
            }
            let r = if params.dither > 0.0 {
                params.dither * standard_normal(&mut rng)
            } else {
                0.0
            };
            out.push(((v + r - mn) * scale).round().clamp(0.0, 255.0) as u8);
        }
    }

    Volume::new(out, volume.dims, volume.affine)
}

/// [`quantize`] without dithering
pub fn quantize_default<T: Copy + Into<f64>>(volume: &Volume<T>) -> Result<Volume<u8>> {
    quantize(volume, &QuantizeParams::default())
}

/// Voxel types the registration entry points accept
///
/// 8-bit volumes are used as they are; every other type goes through
/// [`quantize`].
pub trait Intensity: Copy + Into<f64> {
    fn to_uint8<'a>(volume: &'a Volume<Self>, params: &QuantizeParams) -> Result<Cow<'a, Volume<u8>>>;
}

impl Intensity for u8 {
    fn to_uint8<'a>(volume: &'a Volume<u8>, _params: &QuantizeParams) -> Result<Cow<'a, Volume<u8>>> {
        Ok(Cow::Borrowed(volume))
    }
}

macro_rules! quantized_intensity {
    ($($t:ty),*) => {
        $(
            impl Intensity for $t {
                fn to_uint8<'a>(volume: &'a Volume<$t>, params: &QuantizeParams) -> Result<Cow<'a, Volume<u8>>> {
                    quantize(volume, params).map(Cow::Owned)
                }
            }
        )*
    };
}

quantized_intensity!(i8, i16, u16, i32, u32, f32, f64);

/// Ceiling that leaves at most `1 - CLIP_FRACTION` of the mass above it
fn clipped_maximum<T: Copy + Into<f64>>(volume: &Volume<T>, mn: f64, mx: f64, slice_len: usize) -> f64 {
    let bin_scale = (CLIP_BINS - 1) as f64 / (mx - mn);
    let mut histogram = vec![0usize; CLIP_BINS];

    for slice in volume.data.chunks(slice_len) {
        for &v in slice {
            let v: f64 = v.into();
            if v.is_finite() {
                let bin = ((v - mn) * bin_scale).round() as usize;
                histogram[bin.min(CLIP_BINS - 1)] += 1;
            }
        }
    }

    let total: usize = histogram.iter().sum();
    let mut cumulative = 0usize;
    let mut top_bin = CLIP_BINS - 1;
    for (b, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative as f64 / total as f64 > CLIP_FRACTION {
            top_bin = b;
            break;
        }
    }

    let ceiling = mn + top_bin as f64 * (mx - mn) / (CLIP_BINS - 1) as f64;
    if ceiling > mn {
        ceiling
    } else {
        warn!(
            "More than {:.2}% of voxels sit at the minimum; using the raw maximum {} as ceiling",
            CLIP_FRACTION * 100.0,
            mx
        );
        mx
    }
}

/// Box-Muller draw from N(0, 1)
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
