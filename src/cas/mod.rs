//! Contrast-adaptive sharpening: the OpenCL engine, its kernel and a host
//! reference implementation of the same per-pixel math.

pub mod engine;
pub mod reference;

pub use engine::{ClSharpener, EngineConfig};
pub use reference::CpuSharpener;

use crate::opencl::KernelArg;

/// OpenCL C source of the `cas` kernel.
pub const CAS_KERNEL_SOURCE: &str = include_str!("cas.cl");

/// Entry point name inside [`CAS_KERNEL_SOURCE`].
pub const CAS_KERNEL_NAME: &str = "cas";

/// Build options: allow fused multiply-add contraction.
pub const DEFAULT_BUILD_OPTIONS: &str = "-cl-mad-enable";

/// Work-group edge length. The launch grid is padded to a multiple of this.
pub const WORK_GROUP_SIZE: usize = 16;

/// Memory arrangement of the sharpened output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ChannelLayout {
    /// `R` plane, then `G`, then `B`, then `A` if present; each rows * cols bytes.
    #[default]
    PlanarRgb = 0,
    /// `RGBA` per pixel with alpha, `RGB` per pixel without.
    InterleavedRgba = 1,
}

impl TryFrom<i32> for ChannelLayout {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ChannelLayout::PlanarRgb),
            1 => Ok(ChannelLayout::InterleavedRgba),
            other => Err(other),
        }
    }
}

impl From<ChannelLayout> for KernelArg {
    fn from(layout: ChannelLayout) -> Self {
        KernelArg::Int(layout as i32)
    }
}

/// Dimensions and alpha mode of the currently supplied image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGeometry {
    pub rows: usize,
    pub cols: usize,
    pub has_alpha: bool,
}

impl ImageGeometry {
    pub fn new(rows: usize, cols: usize, has_alpha: bool) -> Self {
        Self {
            rows,
            cols,
            has_alpha,
        }
    }

    pub fn channels(&self) -> usize {
        if self.has_alpha { 4 } else { 3 }
    }

    pub fn pixels(&self) -> usize {
        self.rows * self.cols
    }

    /// Size of the sharpened output. Three-channel output is tightly packed.
    pub fn total_bytes(&self) -> usize {
        self.pixels() * self.channels()
    }

    /// Global work size as `[x, y]`, each axis rounded up to the work-group size.
    pub fn launch_grid(&self) -> [usize; 2] {
        [
            align_up(self.cols, WORK_GROUP_SIZE),
            align_up(self.rows, WORK_GROUP_SIZE),
        ]
    }
}

/// Smallest multiple of `align` that is `>= value`.
pub fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}
