//! OpenCL sharpening engine.
//!
//! Construction selects a device and compiles the `cas` kernel once.
//! [`ClSharpener::supply_image`] is the only place device memory is
//! allocated: it replaces the input texture, the output buffer and the pinned
//! host buffer. [`ClSharpener::sharpen`] reuses the uploaded texture, so the
//! same image can be re-sharpened with new parameters without another upload.

use super::{
    CAS_KERNEL_NAME, CAS_KERNEL_SOURCE, ChannelLayout, DEFAULT_BUILD_OPTIONS, ImageGeometry,
    WORK_GROUP_SIZE,
};
use crate::backend::{Sharpener, validate_image};
use crate::error::{CasError, InitError, Result};
use crate::opencl::{
    DeviceCaps, InputTexture, KernelArgs, PinnedBuffer, ScoreWeights, SelectedDevice,
    build_program, create_device_buffer, select_device,
};

use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::event::Event;
use opencl3::kernel::Kernel;
use opencl3::memory::Buffer;
use opencl3::program::Program;
use opencl3::types::CL_BLOCKING;
use std::sync::Arc;

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Device scoring weights.
    pub weights: ScoreWeights,
    /// Options passed to the OpenCL compiler.
    pub build_options: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            build_options: DEFAULT_BUILD_OPTIONS.to_string(),
        }
    }
}

/// Per-image device resources. `pinned` is declared first so it is unmapped
/// before the other objects are released.
struct LoadedImage {
    pinned: PinnedBuffer,
    output: Buffer<u8>,
    texture: InputTexture,
    geometry: ImageGeometry,
}

/// OpenCL contrast-adaptive sharpening engine.
///
/// Not reentrant: callers sharing one engine between threads must serialize
/// access themselves.
pub struct ClSharpener {
    image: Option<LoadedImage>,
    kernel: Kernel,
    _program: Program,
    queue: Arc<CommandQueue>,
    context: Context,
    device_name: String,
    caps: DeviceCaps,
    /// Host staging area used to widen RGB input to RGBA before upload.
    staging: Vec<u8>,
    last_kernel_ms: Option<f64>,
}

impl std::fmt::Debug for ClSharpener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClSharpener")
            .field("device_name", &self.device_name)
            .field("geometry", &self.image.as_ref().map(|i| i.geometry))
            .finish_non_exhaustive()
    }
}

impl ClSharpener {
    /// Selects the best GPU and builds the kernel with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Result<Self> {
        let SelectedDevice {
            device,
            context,
            queue,
            name,
            caps,
        } = select_device(&config.weights)?;

        let program = build_program(&context, &device, CAS_KERNEL_SOURCE, &config.build_options)?;
        let kernel = Kernel::create(&program, CAS_KERNEL_NAME).map_err(|e| InitError::Compile {
            log: format!("kernel '{}' not found: {}", CAS_KERNEL_NAME, e),
        })?;

        Ok(Self {
            image: None,
            kernel,
            _program: program,
            queue: Arc::new(queue),
            context,
            device_name: name,
            caps,
            staging: Vec::new(),
            last_kernel_ms: None,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn device_caps(&self) -> &DeviceCaps {
        &self.caps
    }

    pub fn geometry(&self) -> Option<ImageGeometry> {
        self.image.as_ref().map(|image| image.geometry)
    }

    /// Device time of the most recent kernel dispatch, from queue profiling.
    pub fn last_kernel_ms(&self) -> Option<f64> {
        self.last_kernel_ms
    }

    /// Replaces the source image.
    ///
    /// `pixels` holds `rows * cols` interleaved sRGB samples, RGBA if
    /// `has_alpha` and RGB otherwise. Any previously returned output slice is
    /// invalidated. On error the engine is left without an image.
    pub fn supply_image(
        &mut self,
        pixels: &[u8],
        has_alpha: bool,
        rows: usize,
        cols: usize,
    ) -> Result<()> {
        // Unmap and release the previous allocation before creating new ones.
        self.image = None;

        let geometry = validate_image(pixels, has_alpha, rows, cols)?;
        check_image_limits(&self.caps, &geometry)?;

        let total_bytes = geometry.total_bytes();
        log::debug!(
            "Allocating {}x{} image ({} output bytes, alpha: {}, grid {:?})",
            cols,
            rows,
            total_bytes,
            has_alpha,
            geometry.launch_grid()
        );

        let output = create_device_buffer(&self.context, &self.queue, total_bytes)
            .map_err(CasError::allocation)?;
        let mut texture =
            InputTexture::create(&self.context, rows, cols).map_err(CasError::allocation)?;

        let rgba: &[u8] = if has_alpha {
            pixels
        } else {
            widen_rgb_to_rgba(pixels, &mut self.staging);
            &self.staging
        };
        texture
            .upload(&self.queue, rgba)
            .map_err(CasError::upload)?;

        let pinned = PinnedBuffer::map(&self.context, &self.queue, total_bytes)
            .map_err(CasError::allocation)?;

        self.image = Some(LoadedImage {
            pinned,
            output,
            texture,
            geometry,
        });
        Ok(())
    }

    /// Runs the kernel over the loaded image and copies the result into the
    /// pinned host buffer, which is returned.
    ///
    /// `sharpen_strength` and `contrast_adaption` are expected in `[0, 1]`
    /// and are passed through unclamped.
    pub fn sharpen(
        &mut self,
        layout: ChannelLayout,
        sharpen_strength: f32,
        contrast_adaption: f32,
    ) -> Result<&[u8]> {
        let image = self.image.as_mut().ok_or(CasError::NoImage)?;
        let geometry = image.geometry;

        let kernel_event = KernelArgs::new()
            .arg(image.texture.handle())
            .arg(geometry.has_alpha)
            .arg(layout)
            .arg(sharpen_strength)
            .arg(contrast_adaption)
            .mem(&image.output)
            .build(&self.kernel)
            .enqueue_2d(
                &self.queue,
                geometry.launch_grid(),
                [WORK_GROUP_SIZE, WORK_GROUP_SIZE],
            )
            .map_err(CasError::execution)?;
        self.queue.finish().map_err(CasError::execution)?;

        self.last_kernel_ms = event_elapsed_ms(&kernel_event);
        if let Some(ms) = self.last_kernel_ms {
            log::debug!("cas kernel: {:.3} ms", ms);
        }

        // SAFETY: blocking read of exactly `total_bytes` into the mapped region.
        let read_event = unsafe {
            self.queue.enqueue_read_buffer(
                &image.output,
                CL_BLOCKING,
                0,
                image.pinned.as_mut_slice(),
                &[],
            )
        }
        .map_err(CasError::execution)?;
        read_event.wait().map_err(CasError::execution)?;

        Ok(image.pinned.as_slice())
    }
}

impl Sharpener for ClSharpener {
    fn supply_image(
        &mut self,
        pixels: &[u8],
        has_alpha: bool,
        rows: usize,
        cols: usize,
    ) -> Result<()> {
        ClSharpener::supply_image(self, pixels, has_alpha, rows, cols)
    }

    fn sharpen(
        &mut self,
        layout: ChannelLayout,
        sharpen_strength: f32,
        contrast_adaption: f32,
    ) -> Result<&[u8]> {
        ClSharpener::sharpen(self, layout, sharpen_strength, contrast_adaption)
    }

    fn geometry(&self) -> Option<ImageGeometry> {
        ClSharpener::geometry(self)
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

/// Rejects images wider or taller than the device's 2D image limits.
fn check_image_limits(caps: &DeviceCaps, geometry: &ImageGeometry) -> Result<()> {
    if geometry.cols > caps.image2d_max_width || geometry.rows > caps.image2d_max_height {
        return Err(CasError::InvalidImage(format!(
            "{}x{} exceeds the device image limit of {}x{}",
            geometry.cols, geometry.rows, caps.image2d_max_width, caps.image2d_max_height
        )));
    }
    Ok(())
}

/// Elapsed device time of a completed event, when queue profiling is on.
fn event_elapsed_ms(event: &Event) -> Option<f64> {
    let start = event.profiling_command_start().ok()?;
    let end = event.profiling_command_end().ok()?;
    Some(end.saturating_sub(start) as f64 / 1_000_000.0)
}

/// Appends an opaque alpha channel to tightly packed RGB samples.
fn widen_rgb_to_rgba(rgb: &[u8], rgba: &mut Vec<u8>) {
    rgba.clear();
    rgba.reserve(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        rgba.extend_from_slice(&[px[0], px[1], px[2], u8::MAX]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_appends_opaque_alpha() {
        let mut out = vec![9u8; 3];
        widen_rgb_to_rgba(&[1, 2, 3, 4, 5, 6], &mut out);
        assert_eq!(out, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn image_limits_are_inclusive_per_axis() {
        let caps = DeviceCaps {
            image2d_max_width: 4096,
            image2d_max_height: 2048,
            ..DeviceCaps::default()
        };
        assert!(check_image_limits(&caps, &ImageGeometry::new(2048, 4096, true)).is_ok());
        assert!(check_image_limits(&caps, &ImageGeometry::new(1, 1, false)).is_ok());

        for (rows, cols) in [(2049, 4096), (2048, 4097), (2049, 1)] {
            let err = check_image_limits(&caps, &ImageGeometry::new(rows, cols, false))
                .unwrap_err();
            match err {
                CasError::InvalidImage(msg) => assert!(msg.contains("4096x2048"), "{}", msg),
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn default_config_enables_mad() {
        let config = EngineConfig::default();
        assert_eq!(config.build_options, "-cl-mad-enable");
        assert_eq!(config.weights, ScoreWeights::default());
    }
}
