use crate::cas::{ChannelLayout, ClSharpener, EngineConfig, ImageGeometry};
use crate::error::{CasError, Result};

/// Minimal sharpening abstraction shared by the OpenCL engine and the host
/// reference implementation.
///
/// `supply_image` uploads a new source image; `sharpen` may then be called any
/// number of times. The returned slice borrows the engine's output buffer and
/// is therefore invalidated by the next `supply_image`.
pub trait Sharpener {
    fn supply_image(
        &mut self,
        pixels: &[u8],
        has_alpha: bool,
        rows: usize,
        cols: usize,
    ) -> Result<()>;

    fn sharpen(
        &mut self,
        layout: ChannelLayout,
        sharpen_strength: f32,
        contrast_adaption: f32,
    ) -> Result<&[u8]>;

    /// Geometry of the loaded image, `None` before the first `supply_image`.
    fn geometry(&self) -> Option<ImageGeometry>;

    /// Human-readable backend description, e.g. the device name.
    fn name(&self) -> &str;
}

impl<T> Sharpener for Box<T>
where
    T: Sharpener + ?Sized,
{
    fn supply_image(
        &mut self,
        pixels: &[u8],
        has_alpha: bool,
        rows: usize,
        cols: usize,
    ) -> Result<()> {
        (**self).supply_image(pixels, has_alpha, rows, cols)
    }

    fn sharpen(
        &mut self,
        layout: ChannelLayout,
        sharpen_strength: f32,
        contrast_adaption: f32,
    ) -> Result<&[u8]> {
        (**self).sharpen(layout, sharpen_strength, contrast_adaption)
    }

    fn geometry(&self) -> Option<ImageGeometry> {
        (**self).geometry()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Checks that `pixels` holds exactly `rows * cols` RGB or RGBA samples.
pub fn validate_image(
    pixels: &[u8],
    has_alpha: bool,
    rows: usize,
    cols: usize,
) -> Result<ImageGeometry> {
    if rows == 0 || cols == 0 {
        return Err(CasError::InvalidImage(format!(
            "dimensions must be non-zero, got {}x{}",
            cols, rows
        )));
    }
    let geometry = ImageGeometry::new(rows, cols, has_alpha);
    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(geometry.channels()))
        .ok_or_else(|| CasError::InvalidImage(format!("{}x{} overflows", cols, rows)))?;
    if pixels.len() != expected {
        return Err(CasError::InvalidImage(format!(
            "expected {} bytes for {}x{} {}, got {}",
            expected,
            cols,
            rows,
            if has_alpha { "RGBA" } else { "RGB" },
            pixels.len()
        )));
    }
    Ok(geometry)
}

/// Owned engine handle: the only surface GUI shells and the C ABI see.
pub struct CasHandle {
    engine: Box<dyn Sharpener>,
}

impl CasHandle {
    /// Selects a device and builds the kernel. Failure is logged once and
    /// reported as `None` so callers can fall back gracefully.
    pub fn initialize() -> Option<Self> {
        Self::initialize_with(&EngineConfig::default())
    }

    pub fn initialize_with(config: &EngineConfig) -> Option<Self> {
        match ClSharpener::with_config(config) {
            Ok(engine) => Some(Self::from_engine(Box::new(engine))),
            Err(e) => {
                log::error!("CAS initialization failed: {}", e);
                None
            }
        }
    }

    pub fn from_engine(engine: Box<dyn Sharpener>) -> Self {
        Self { engine }
    }

    pub fn supply_image(
        &mut self,
        pixels: &[u8],
        has_alpha: bool,
        rows: usize,
        cols: usize,
    ) -> Result<()> {
        self.engine.supply_image(pixels, has_alpha, rows, cols)
    }

    pub fn sharpen_image(
        &mut self,
        layout: ChannelLayout,
        sharpen_strength: f32,
        contrast_adaption: f32,
    ) -> Result<&[u8]> {
        self.engine.sharpen(layout, sharpen_strength, contrast_adaption)
    }

    pub fn geometry(&self) -> Option<ImageGeometry> {
        self.engine.geometry()
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    /// Releases every device resource. Equivalent to dropping the handle.
    pub fn destroy(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::CpuSharpener;

    #[test]
    fn validate_rejects_zero_dimensions() {
        assert!(matches!(
            validate_image(&[], false, 0, 4),
            Err(CasError::InvalidImage(_))
        ));
        assert!(matches!(
            validate_image(&[], true, 4, 0),
            Err(CasError::InvalidImage(_))
        ));
    }

    #[test]
    fn validate_checks_length_per_alpha_mode() {
        let rgb = vec![0u8; 2 * 3 * 3];
        assert_eq!(
            validate_image(&rgb, false, 2, 3).unwrap(),
            ImageGeometry::new(2, 3, false)
        );
        assert!(validate_image(&rgb, true, 2, 3).is_err());
    }

    #[test]
    fn handle_forwards_to_engine() {
        let mut handle = CasHandle::from_engine(Box::new(CpuSharpener::new()));
        assert!(handle.geometry().is_none());
        assert!(matches!(
            handle.sharpen_image(ChannelLayout::PlanarRgb, 0.5, 0.5),
            Err(CasError::NoImage)
        ));

        handle.supply_image(&[10u8; 4 * 4 * 4], true, 4, 4).unwrap();
        let out = handle
            .sharpen_image(ChannelLayout::InterleavedRgba, 0.5, 0.5)
            .unwrap();
        assert_eq!(out.len(), 64);
        assert_eq!(handle.geometry(), Some(ImageGeometry::new(4, 4, true)));
        handle.destroy();
    }
}
