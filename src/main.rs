//! clcas - GPU contrast-adaptive sharpening driver
//!
//! Loads a raw RGB(A) image (or generates a test pattern), sharpens it on the
//! best available OpenCL GPU and reports the average time per sharpen call.
//! Optionally writes the result and checks it against the host reference.

use clcas::cas::CpuSharpener;
use clcas::opencl::{ScoreWeights, list_devices};
use clcas::{ChannelLayout, ClSharpener, Sharpener};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;

const DEFAULT_LOOPS: u32 = 5;
const MAX_LOOPS: u32 = 64;

/// Output layout selectable on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LayoutArg {
    Planar,
    Interleaved,
}

impl From<LayoutArg> for ChannelLayout {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::Planar => ChannelLayout::PlanarRgb,
            LayoutArg::Interleaved => ChannelLayout::InterleavedRgba,
        }
    }
}

/// Command line arguments for the sharpening driver
#[derive(Parser, Debug)]
#[clap(
    name = "clcas",
    about = "Sharpen a raw RGB(A) image with contrast-adaptive sharpening on an OpenCL GPU.",
    version
)]
struct Args {
    /// Raw input file: row-major interleaved 8-bit sRGB, no header.
    /// A synthetic test pattern is used when omitted.
    #[clap(short, long)]
    input: Option<PathBuf>,

    /// Image width in pixels
    #[clap(long, default_value = "1920")]
    width: usize,

    /// Image height in pixels
    #[clap(long, default_value = "1080")]
    height: usize,

    /// Input carries an alpha channel (RGBA instead of RGB)
    #[clap(short, long)]
    alpha: bool,

    /// Write the sharpened raw image here
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Output channel layout
    #[clap(long, value_enum, default_value = "interleaved")]
    layout: LayoutArg,

    /// Sharpening strength in [0,1]
    #[clap(short, long, value_parser = parse_unit_interval, default_value = "0.8")]
    sharpen_strength: f32,

    /// Contrast adaption in [0,1]
    #[clap(short, long, value_parser = parse_unit_interval, default_value = "0.5")]
    contrast_adaption: f32,

    /// Number of timed sharpen calls (1-64, anything else falls back to 5)
    #[clap(short, long, default_value = "5")]
    loops: u32,

    /// Report execution time as frames per second
    #[clap(long)]
    fps: bool,

    /// Use the host reference implementation instead of the GPU
    #[clap(long)]
    cpu: bool,

    /// Compare GPU output against the host reference
    #[clap(long)]
    verify: bool,

    /// Enable verbose logging
    #[clap(short, long)]
    verbose: bool,

    /// List available OpenCL GPUs with their selection scores and exit
    #[clap(long)]
    list_devices: bool,
}

/// Parses a float and checks it lies in [0,1].
pub(crate) fn parse_unit_interval(value: &str) -> Result<f32> {
    let parsed: f32 = value.trim().parse().context("Invalid number")?;
    if !(0.0..=1.0).contains(&parsed) {
        bail!("Value {} is outside the range [0,1]", parsed);
    }
    Ok(parsed)
}

/// Lists available OpenCL GPUs.
fn list_opencl_devices() -> Result<()> {
    println!("Available OpenCL GPUs:");
    let listings =
        list_devices(&ScoreWeights::default()).context("Failed to get OpenCL platforms")?;
    if listings.is_empty() {
        println!("  No OpenCL GPU devices found.");
        return Ok(());
    }

    for dev in &listings {
        println!(
            "  Platform {} ({}) Device {}: {} ({}) - Memory: {} MB - Score: {}",
            dev.platform_index,
            dev.platform_name,
            dev.device_index,
            dev.device_name.trim(),
            dev.vendor.trim(),
            dev.global_mem / (1024 * 1024),
            dev.score
        );
    }
    Ok(())
}

/// Diagonal colour gradient with a checkerboard overlay, so the sharpening
/// has edges to work on.
fn test_pattern(rows: usize, cols: usize, has_alpha: bool) -> Vec<u8> {
    let channels = if has_alpha { 4 } else { 3 };
    let mut pixels = Vec::with_capacity(rows * cols * channels);
    for y in 0..rows {
        for x in 0..cols {
            let checker = if (x / 8 + y / 8) % 2 == 0 { 0 } else { 48 };
            let r = (x * 255 / cols.max(1)) as u8;
            let g = (y * 255 / rows.max(1)) as u8;
            let b = r.wrapping_add(g) / 2;
            pixels.push(r.saturating_add(checker));
            pixels.push(g.saturating_add(checker));
            pixels.push(b.saturating_add(checker));
            if has_alpha {
                pixels.push(u8::MAX);
            }
        }
    }
    pixels
}

fn load_pixels(args: &Args) -> Result<Vec<u8>> {
    let Some(path) = &args.input else {
        return Ok(test_pattern(args.height, args.width, args.alpha));
    };
    let pixels =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let channels = if args.alpha { 4 } else { 3 };
    let expected = args.width * args.height * channels;
    if pixels.len() != expected {
        bail!(
            "{} holds {} bytes, expected {} for {}x{} with {} channels",
            path.display(),
            pixels.len(),
            expected,
            args.width,
            args.height,
            channels
        );
    }
    Ok(pixels)
}

fn execution_time(show_fps: bool, seconds: f64) -> String {
    if show_fps {
        format!("Execution time: {:.1} FPS", 1.0 / seconds)
    } else {
        format!("Execution time: {:.6} seconds", seconds)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_devices {
        return list_opencl_devices();
    }

    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let loops = if (1..=MAX_LOOPS).contains(&args.loops) {
        args.loops
    } else {
        log::warn!("loops must be in 1..={}, using {}", MAX_LOOPS, DEFAULT_LOOPS);
        DEFAULT_LOOPS
    };
    let layout = ChannelLayout::from(args.layout);

    let start = Instant::now();
    let pixels = load_pixels(&args)?;
    log::info!(
        "Loaded {}x{} {} image in {:.6} seconds",
        args.width,
        args.height,
        if args.alpha { "RGBA" } else { "RGB" },
        start.elapsed().as_secs_f64()
    );

    let start = Instant::now();
    let mut engine: Box<dyn Sharpener> = if args.cpu {
        Box::new(CpuSharpener::new())
    } else {
        Box::new(
            ClSharpener::new()
                .context("No compatible GPU found or CAS kernel failed to compile")?,
        )
    };
    log::info!(
        "Initialized {} in {:.6} seconds",
        engine.name(),
        start.elapsed().as_secs_f64()
    );

    let start = Instant::now();
    engine
        .supply_image(&pixels, args.alpha, args.height, args.width)
        .context("Failed to upload image")?;
    log::info!("Uploaded image in {:.6} seconds", start.elapsed().as_secs_f64());

    let mut total_secs = 0.0;
    for _ in 0..loops {
        let start = Instant::now();
        engine
            .sharpen(layout, args.sharpen_strength, args.contrast_adaption)
            .context("Sharpening failed")?;
        total_secs += start.elapsed().as_secs_f64();
    }
    println!(
        "Sharpened {}x{} image {} times (strength {}, contrast adaption {})\n{}",
        args.width,
        args.height,
        loops,
        args.sharpen_strength,
        args.contrast_adaption,
        execution_time(args.fps, total_secs / f64::from(loops))
    );

    let sharpened = engine
        .sharpen(layout, args.sharpen_strength, args.contrast_adaption)
        .context("Sharpening failed")?
        .to_vec();

    if args.verify && !args.cpu {
        let mut reference = CpuSharpener::new();
        reference.supply_image(&pixels, args.alpha, args.height, args.width)?;
        let expected = reference.sharpen(layout, args.sharpen_strength, args.contrast_adaption)?;
        let max_diff = sharpened
            .iter()
            .zip(expected)
            .map(|(a, b)| a.abs_diff(*b))
            .max()
            .unwrap_or(0);
        println!("Maximum difference from host reference: {}", max_diff);
        if max_diff > 1 {
            bail!("GPU output differs from the host reference by {}", max_diff);
        }
    }

    if let Some(path) = &args.output {
        std::fs::write(path, &sharpened)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote {} bytes to {}", sharpened.len(), path.display());
    }

    Ok(())
}
