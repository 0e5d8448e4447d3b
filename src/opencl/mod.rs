//! OpenCL plumbing for the sharpening engine
//!
//! This module handles interaction with the GPU via OpenCL,
//! including device selection, kernel compilation, memory allocation
//! and data transfer.

pub mod device;
pub mod kernel;
pub mod memory;

pub use device::{
    DeviceCaps, DeviceListing, ScoreWeights, SelectedDevice, list_devices, select_device,
};
pub use kernel::{KernelArg, KernelArgs, KernelInvocation, build_program};
pub use memory::{InputTexture, PinnedBuffer, create_device_buffer};
