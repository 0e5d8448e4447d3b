//! GPU contrast-adaptive sharpening
//!
//! This library uses OpenCL to sharpen 8-bit sRGB RGB(A) images with
//! AMD FidelityFX-style contrast-adaptive sharpening (CAS). An image is
//! uploaded once to a device texture and can then be sharpened repeatedly
//! with different strength / contrast-adaption settings; each result is read
//! back into a pinned host buffer.
//!
//! ```no_run
//! use clcas::{ChannelLayout, ClSharpener};
//!
//! # fn main() -> Result<(), clcas::CasError> {
//! let mut engine = ClSharpener::new()?;
//! let pixels = vec![128u8; 64 * 64 * 4];
//! engine.supply_image(&pixels, true, 64, 64)?;
//! let sharpened = engine.sharpen(ChannelLayout::InterleavedRgba, 0.8, 0.5)?;
//! assert_eq!(sharpened.len(), pixels.len());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cas;
pub mod error;
pub mod ffi;
pub mod opencl;

pub use backend::{CasHandle, Sharpener};
pub use cas::{ChannelLayout, ClSharpener, CpuSharpener, EngineConfig, ImageGeometry};
pub use error::{CasError, InitError, Result};
