//! Device tests for `ClSharpener`. Each test skips when no OpenCL GPU is
//! available on the machine running the suite.

use clcas::{CasError, ChannelLayout, ClSharpener, CpuSharpener, ImageGeometry, Sharpener};

fn gpu() -> Option<ClSharpener> {
    match ClSharpener::new() {
        Ok(engine) => Some(engine),
        Err(e) => {
            eprintln!("No usable OpenCL GPU, skipping: {}", e);
            None
        }
    }
}

/// Gradient with hard-edged blocks and a few transparent pixels.
fn pattern(rows: usize, cols: usize, has_alpha: bool) -> Vec<u8> {
    let mut pixels = Vec::new();
    for y in 0..rows {
        for x in 0..cols {
            let block = if (x / 5 + y / 3) % 2 == 0 { 0 } else { 90 };
            let r = ((x * 7 + y) % 160 + block) as u8;
            let g = ((y * 11) % 165 + block) as u8;
            let b = ((x * y) % 120 + block / 2) as u8;
            pixels.extend_from_slice(&[r, g, b]);
            if has_alpha {
                pixels.push(if (x + y) % 13 == 0 { 0 } else { 255 - (x % 50) as u8 });
            }
        }
    }
    pixels
}

fn reference(
    pixels: &[u8],
    has_alpha: bool,
    rows: usize,
    cols: usize,
    layout: ChannelLayout,
    strength: f32,
    contrast: f32,
) -> Vec<u8> {
    let mut cpu = CpuSharpener::new();
    cpu.supply_image(pixels, has_alpha, rows, cols).unwrap();
    cpu.sharpen(layout, strength, contrast).unwrap().to_vec()
}

fn max_diff(a: &[u8], b: &[u8]) -> u8 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0)
}

#[test]
fn sharpen_before_supply_is_rejected() {
    let Some(mut engine) = gpu() else { return };
    assert!(matches!(
        engine.sharpen(ChannelLayout::PlanarRgb, 0.5, 0.5),
        Err(CasError::NoImage)
    ));
}

#[test]
fn matches_host_reference_in_every_mode() {
    let Some(mut engine) = gpu() else { return };
    let (rows, cols) = (37, 53);
    for has_alpha in [false, true] {
        let pixels = pattern(rows, cols, has_alpha);
        engine.supply_image(&pixels, has_alpha, rows, cols).unwrap();
        // Planar first: it leaves the colour planes of transparent pixels
        // untouched, so they must still hold the zero fill from supply_image.
        for layout in [ChannelLayout::PlanarRgb, ChannelLayout::InterleavedRgba] {
            for (strength, contrast) in [(0.0, 0.0), (0.8, 0.5), (1.0, 1.0)] {
                let expected =
                    reference(&pixels, has_alpha, rows, cols, layout, strength, contrast);
                let got = engine.sharpen(layout, strength, contrast).unwrap();
                assert!(
                    max_diff(got, &expected) <= 1,
                    "alpha {} layout {:?} strength {} contrast {}",
                    has_alpha,
                    layout,
                    strength,
                    contrast
                );
            }
        }
    }
}

#[test]
fn flat_image_is_unchanged() {
    let Some(mut engine) = gpu() else { return };
    let pixels: Vec<u8> = [180u8, 60, 20, 255]
        .iter()
        .copied()
        .cycle()
        .take(64 * 64 * 4)
        .collect();
    engine.supply_image(&pixels, true, 64, 64).unwrap();
    let out = engine
        .sharpen(ChannelLayout::InterleavedRgba, 0.8, 0.5)
        .unwrap();
    assert_eq!(out, pixels.as_slice());
}

#[test]
fn zero_strength_reproduces_input() {
    let Some(mut engine) = gpu() else { return };
    let pixels = pattern(20, 24, false);
    engine.supply_image(&pixels, false, 20, 24).unwrap();
    let out = engine
        .sharpen(ChannelLayout::InterleavedRgba, 0.0, 0.9)
        .unwrap();
    assert!(max_diff(out, &pixels) <= 1);
}

#[test]
fn repeated_sharpen_is_byte_identical() {
    let Some(mut engine) = gpu() else { return };
    let pixels = pattern(31, 17, true);
    engine.supply_image(&pixels, true, 31, 17).unwrap();
    let first = engine
        .sharpen(ChannelLayout::PlanarRgb, 0.7, 0.3)
        .unwrap()
        .to_vec();
    let second = engine.sharpen(ChannelLayout::PlanarRgb, 0.7, 0.3).unwrap();
    assert_eq!(first.as_slice(), second);
}

#[test]
fn transparent_pixels_come_out_zero() {
    let Some(mut engine) = gpu() else { return };
    let (rows, cols) = (16, 16);
    let pixels = pattern(rows, cols, true);
    engine.supply_image(&pixels, true, rows, cols).unwrap();

    for (strength, contrast) in [(0.0, 0.0), (1.0, 1.0)] {
        let out = engine
            .sharpen(ChannelLayout::InterleavedRgba, strength, contrast)
            .unwrap();
        for (px, src) in out.chunks_exact(4).zip(pixels.chunks_exact(4)) {
            if src[3] == 0 {
                assert_eq!(px, &[0, 0, 0, 0]);
            }
        }
    }
}

#[test]
fn planar_and_interleaved_agree() {
    let Some(mut engine) = gpu() else { return };
    let (rows, cols) = (19, 23);
    let pixels = pattern(rows, cols, false);
    engine.supply_image(&pixels, false, rows, cols).unwrap();

    let planar = engine
        .sharpen(ChannelLayout::PlanarRgb, 0.9, 0.4)
        .unwrap()
        .to_vec();
    let interleaved = engine
        .sharpen(ChannelLayout::InterleavedRgba, 0.9, 0.4)
        .unwrap();

    let plane = rows * cols;
    for idx in 0..plane {
        for ch in 0..3 {
            assert_eq!(planar[ch * plane + idx], interleaved[idx * 3 + ch]);
        }
    }
}

#[test]
fn resupply_with_new_dimensions() {
    let Some(mut engine) = gpu() else { return };

    let big = pattern(200, 300, true);
    engine.supply_image(&big, true, 200, 300).unwrap();
    assert_eq!(
        engine
            .sharpen(ChannelLayout::InterleavedRgba, 0.5, 0.5)
            .unwrap()
            .len(),
        200 * 300 * 4
    );

    let small = pattern(5, 3, false);
    engine.supply_image(&small, false, 5, 3).unwrap();
    assert_eq!(engine.geometry(), Some(ImageGeometry::new(5, 3, false)));
    let out = engine
        .sharpen(ChannelLayout::PlanarRgb, 0.5, 0.5)
        .unwrap();
    assert_eq!(out.len(), 5 * 3 * 3);
}

#[test]
fn invalid_supply_leaves_engine_without_image() {
    let Some(mut engine) = gpu() else { return };
    engine
        .supply_image(&pattern(4, 4, false), false, 4, 4)
        .unwrap();
    assert!(matches!(
        engine.supply_image(&[0u8; 7], false, 4, 4),
        Err(CasError::InvalidImage(_))
    ));
    assert!(matches!(
        engine.sharpen(ChannelLayout::PlanarRgb, 0.5, 0.5),
        Err(CasError::NoImage)
    ));
}
