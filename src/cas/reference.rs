//! Host implementation of the `cas` kernel.
//!
//! Mirrors the device arithmetic step for step (soft min/max, amplitude,
//! shaping weight, plus-shaped filter, blend, sRGB encode, round-to-even
//! quantization) so device output can be checked against it. Device results
//! may differ by one code value because the kernel uses native reciprocal and
//! rsqrt approximations.

use super::{ChannelLayout, ImageGeometry};
use crate::backend::{Sharpener, validate_image};
use crate::error::{CasError, Result};

/// sRGB transfer function, decode direction.
pub fn srgb_to_linear(value: u8) -> f32 {
    let c = f32::from(value) / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB transfer function, encode direction.
pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Saturating round-half-to-even conversion of `[0, 1]` to a byte.
pub fn to_unorm8(value: f32) -> u8 {
    // `as` saturates and maps NaN to 0, matching convert_uchar_sat_rte.
    (value * 255.0).round_ties_even() as u8
}

// fmax/fmin semantics: a NaN operand yields the other operand.
fn clamp01(value: f32) -> f32 {
    value.max(0.0).min(1.0)
}

/// Sharpens one channel given its 3x3 neighborhood in linear light,
/// laid out `[a, b, c, d, e, f, g, h, i]` row by row.
pub fn sharpen_channel(n: [f32; 9], sharpen_strength: f32, contrast_adaption: f32) -> f32 {
    let [a, b, c, d, e, f, g, h, i] = n;

    let mut mn = d.min(e).min(f.min(b)).min(h);
    let mn2 = mn.min(a.min(c).min(g.min(i)));
    mn += mn2;

    let mut mx = d.max(e).max(f.max(b)).max(h);
    let mx2 = mx.max(a.max(c).max(g.max(i)));
    mx += mx2;

    let amp = 1.0 / clamp01(mn.min(2.0 - mx) * (1.0 / mx)).sqrt();
    let w = -1.0 / (amp * (-3.0 * contrast_adaption + 8.0));
    let rcp_weight = 1.0 / (4.0 * w + 1.0);

    let window = (b + d) + (f + h);
    let sharpened = clamp01((window * w + e) * rcp_weight);
    sharpen_strength.mul_add(sharpened, (-sharpen_strength).mul_add(e, e))
}

/// Source image decoded to linear RGB plus normalized alpha.
#[derive(Debug, Clone)]
pub struct LinearImage {
    geometry: ImageGeometry,
    texels: Vec<[f32; 4]>,
}

impl LinearImage {
    pub fn from_srgb8(pixels: &[u8], has_alpha: bool, rows: usize, cols: usize) -> Result<Self> {
        let geometry = validate_image(pixels, has_alpha, rows, cols)?;
        let texels = pixels
            .chunks_exact(geometry.channels())
            .map(|px| {
                let alpha = if has_alpha { f32::from(px[3]) / 255.0 } else { 1.0 };
                [
                    srgb_to_linear(px[0]),
                    srgb_to_linear(px[1]),
                    srgb_to_linear(px[2]),
                    alpha,
                ]
            })
            .collect();
        Ok(Self { geometry, texels })
    }

    pub fn geometry(&self) -> ImageGeometry {
        self.geometry
    }

    /// Clamp-to-edge fetch.
    fn texel(&self, x: isize, y: isize) -> [f32; 4] {
        let x = x.clamp(0, self.geometry.cols as isize - 1) as usize;
        let y = y.clamp(0, self.geometry.rows as isize - 1) as usize;
        self.texels[y * self.geometry.cols + x]
    }

    /// Sharpens the whole image into `out`, which must hold
    /// `geometry().total_bytes()` bytes.
    pub fn sharpen_into(
        &self,
        layout: ChannelLayout,
        sharpen_strength: f32,
        contrast_adaption: f32,
        out: &mut [u8],
    ) {
        let ImageGeometry {
            rows,
            cols,
            has_alpha,
        } = self.geometry;
        let plane = rows * cols;
        debug_assert_eq!(out.len(), self.geometry.total_bytes());

        for y in 0..rows {
            for x in 0..cols {
                let idx = y * cols + x;
                let center = self.texels[idx];

                if has_alpha && center[3] == 0.0 {
                    match layout {
                        ChannelLayout::PlanarRgb => out[plane * 3 + idx] = 0,
                        ChannelLayout::InterleavedRgba => out[idx * 4..idx * 4 + 4].fill(0),
                    }
                    continue;
                }

                let (xi, yi) = (x as isize, y as isize);
                let neighborhood = [
                    self.texel(xi - 1, yi - 1),
                    self.texel(xi, yi - 1),
                    self.texel(xi + 1, yi - 1),
                    self.texel(xi - 1, yi),
                    center,
                    self.texel(xi + 1, yi),
                    self.texel(xi - 1, yi + 1),
                    self.texel(xi, yi + 1),
                    self.texel(xi + 1, yi + 1),
                ];
                let rgb: [u8; 3] = std::array::from_fn(|ch| {
                    let n = neighborhood.map(|t| t[ch]);
                    to_unorm8(linear_to_srgb(sharpen_channel(
                        n,
                        sharpen_strength,
                        contrast_adaption,
                    )))
                });
                let alpha = to_unorm8(center[3]);

                match layout {
                    ChannelLayout::PlanarRgb => {
                        out[idx] = rgb[0];
                        out[plane + idx] = rgb[1];
                        out[plane * 2 + idx] = rgb[2];
                        if has_alpha {
                            out[plane * 3 + idx] = alpha;
                        }
                    }
                    ChannelLayout::InterleavedRgba if has_alpha => {
                        out[idx * 4..idx * 4 + 4].copy_from_slice(&[rgb[0], rgb[1], rgb[2], alpha]);
                    }
                    ChannelLayout::InterleavedRgba => {
                        out[idx * 3..idx * 3 + 3].copy_from_slice(&rgb);
                    }
                }
            }
        }
    }
}

/// [`Sharpener`] backed by [`LinearImage::sharpen_into`] on the host.
#[derive(Debug, Default)]
pub struct CpuSharpener {
    image: Option<LinearImage>,
    output: Vec<u8>,
}

impl CpuSharpener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sharpener for CpuSharpener {
    fn supply_image(
        &mut self,
        pixels: &[u8],
        has_alpha: bool,
        rows: usize,
        cols: usize,
    ) -> Result<()> {
        self.image = None;
        let image = LinearImage::from_srgb8(pixels, has_alpha, rows, cols)?;
        self.output = vec![0; image.geometry().total_bytes()];
        self.image = Some(image);
        Ok(())
    }

    fn sharpen(
        &mut self,
        layout: ChannelLayout,
        sharpen_strength: f32,
        contrast_adaption: f32,
    ) -> Result<&[u8]> {
        let image = self.image.as_ref().ok_or(CasError::NoImage)?;
        image.sharpen_into(layout, sharpen_strength, contrast_adaption, &mut self.output);
        Ok(&self.output)
    }

    fn geometry(&self) -> Option<ImageGeometry> {
        self.image.as_ref().map(LinearImage::geometry)
    }

    fn name(&self) -> &str {
        "host reference"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_rgba(rows: usize, cols: usize, px: [u8; 4]) -> Vec<u8> {
        px.iter().copied().cycle().take(rows * cols * 4).collect()
    }

    /// 8x8 mid-gray with a bright vertical stripe at column 4.
    fn stripe_rgb() -> Vec<u8> {
        let mut pixels = Vec::new();
        for _y in 0..8 {
            for x in 0..8 {
                let v = if x == 4 { 192 } else { 64 };
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        pixels
    }

    fn sharpen(
        pixels: &[u8],
        has_alpha: bool,
        rows: usize,
        cols: usize,
        layout: ChannelLayout,
        strength: f32,
        contrast: f32,
    ) -> Vec<u8> {
        let mut engine = CpuSharpener::new();
        engine.supply_image(pixels, has_alpha, rows, cols).unwrap();
        engine.sharpen(layout, strength, contrast).unwrap().to_vec()
    }

    #[test]
    fn transfer_function_round_trips_every_code() {
        for v in 0..=255u8 {
            assert_eq!(to_unorm8(linear_to_srgb(srgb_to_linear(v))), v);
        }
    }

    #[test]
    fn transfer_function_endpoints() {
        assert_relative_eq!(srgb_to_linear(0), 0.0);
        assert_relative_eq!(srgb_to_linear(255), 1.0, epsilon = 1e-6);
        assert_relative_eq!(linear_to_srgb(1.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn quantization_rounds_half_to_even_and_saturates() {
        assert_eq!(to_unorm8(0.0), 0);
        assert_eq!(to_unorm8(1.0), 255);
        assert_eq!(to_unorm8(0.5), 128);
        assert_eq!(to_unorm8(-1.0), 0);
        assert_eq!(to_unorm8(2.0), 255);
        assert_eq!(to_unorm8(f32::NAN), 0);
    }

    #[test]
    fn flat_neighborhood_is_unchanged() {
        let e = srgb_to_linear(100);
        let out = sharpen_channel([e; 9], 1.0, 1.0);
        assert_relative_eq!(out, e, epsilon = 1e-6);
    }

    #[test]
    fn black_neighborhood_stays_black() {
        assert_eq!(sharpen_channel([0.0; 9], 0.8, 0.5), 0.0);
    }

    #[test]
    fn flat_image_is_a_no_op() {
        let input = flat_rgba(64, 64, [37, 140, 221, 255]);
        let out = sharpen(&input, true, 64, 64, ChannelLayout::InterleavedRgba, 0.8, 0.5);
        assert_eq!(out, input);
    }

    #[test]
    fn zero_strength_is_identity() {
        let input = stripe_rgb();
        let out = sharpen(&input, false, 8, 8, ChannelLayout::InterleavedRgba, 0.0, 0.7);
        assert_eq!(out, input);
    }

    #[test]
    fn stripe_gains_contrast() {
        let input = stripe_rgb();
        let soft = sharpen(&input, false, 8, 8, ChannelLayout::InterleavedRgba, 1.0, 0.0);
        let hard = sharpen(&input, false, 8, 8, ChannelLayout::InterleavedRgba, 1.0, 1.0);

        let at = |buf: &[u8], x: usize, y: usize| buf[(y * 8 + x) * 3];
        assert!(at(&soft, 3, 4) < 64);
        assert!(at(&soft, 4, 4) > 192);
        assert!(at(&hard, 3, 4) < at(&soft, 3, 4));
        // far from the stripe nothing changes
        assert_eq!(at(&soft, 0, 0), 64);
    }

    #[test]
    fn transparent_pixels_are_zeroed() {
        // pixel (x=2, y=1) is fully transparent
        let hole = 4 + 2;
        let mut input = flat_rgba(4, 4, [200, 100, 50, 255]);
        input[hole * 4..hole * 4 + 4].copy_from_slice(&[90, 90, 90, 0]);

        for (strength, contrast) in [(0.0, 0.0), (1.0, 1.0), (0.5, 0.25)] {
            let out =
                sharpen(&input, true, 4, 4, ChannelLayout::InterleavedRgba, strength, contrast);
            assert_eq!(&out[hole * 4..hole * 4 + 4], &[0, 0, 0, 0]);

            let planar = sharpen(&input, true, 4, 4, ChannelLayout::PlanarRgb, strength, contrast);
            assert_eq!(planar[16 * 3 + hole], 0);
            assert_eq!(planar[16 * 3], 255);
        }
    }

    #[test]
    fn planar_and_interleaved_hold_the_same_pixels() {
        let input = stripe_rgb();
        let planar = sharpen(&input, false, 8, 8, ChannelLayout::PlanarRgb, 0.9, 0.3);
        let interleaved = sharpen(&input, false, 8, 8, ChannelLayout::InterleavedRgba, 0.9, 0.3);
        assert_eq!(planar.len(), interleaved.len());

        let plane = 64;
        for idx in 0..plane {
            for ch in 0..3 {
                assert_eq!(planar[ch * plane + idx], interleaved[idx * 3 + ch]);
            }
        }
    }

    #[test]
    fn repeated_sharpen_is_identical() {
        let input = stripe_rgb();
        let mut engine = CpuSharpener::new();
        engine.supply_image(&input, false, 8, 8).unwrap();
        let first = engine
            .sharpen(ChannelLayout::PlanarRgb, 0.6, 0.4)
            .unwrap()
            .to_vec();
        let second = engine.sharpen(ChannelLayout::PlanarRgb, 0.6, 0.4).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tiny_images_clamp_to_edge() {
        let one = sharpen(&[10, 20, 30], false, 1, 1, ChannelLayout::InterleavedRgba, 1.0, 1.0);
        assert_eq!(one, vec![10, 20, 30]);

        let row = [0u8, 0, 0, 255, 255, 255, 0, 0, 0];
        let out = sharpen(&row, false, 1, 3, ChannelLayout::PlanarRgb, 1.0, 0.5);
        assert_eq!(out.len(), 9);
    }

    #[test]
    fn resupply_resizes_output() {
        let mut engine = CpuSharpener::new();
        engine.supply_image(&[50u8; 16 * 16 * 4], true, 16, 16).unwrap();
        assert_eq!(
            engine.sharpen(ChannelLayout::PlanarRgb, 1.0, 0.0).unwrap().len(),
            1024
        );

        engine.supply_image(&[50u8; 3 * 5 * 3], false, 3, 5).unwrap();
        assert_eq!(engine.geometry(), Some(ImageGeometry::new(3, 5, false)));
        assert_eq!(
            engine.sharpen(ChannelLayout::InterleavedRgba, 1.0, 0.0).unwrap().len(),
            45
        );
    }

    #[test]
    fn sharpen_without_image_fails() {
        let mut engine = CpuSharpener::new();
        assert!(matches!(
            engine.sharpen(ChannelLayout::PlanarRgb, 0.5, 0.5),
            Err(CasError::NoImage)
        ));
    }

    #[test]
    fn failed_supply_leaves_no_image() {
        let mut engine = CpuSharpener::new();
        engine.supply_image(&[1u8; 12], true, 1, 3).unwrap();
        assert!(engine.supply_image(&[1u8; 5], true, 1, 3).is_err());
        assert!(engine.geometry().is_none());
    }
}
