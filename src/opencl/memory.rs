//! Device memory objects used by the sharpening engine: the sRGBA input
//! texture, the kernel's output buffer and the pinned host-mapped buffer the
//! results are copied into.

use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::error_codes::{CL_INVALID_VALUE, ClError};
use opencl3::memory::{
    Buffer, CL_MAP_READ, CL_MAP_WRITE, CL_MEM_ALLOC_HOST_PTR, CL_MEM_OBJECT_IMAGE2D,
    CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_UNORM_INT8, CL_sRGBA, ClMem, Image,
};
use opencl3::types::{CL_BLOCKING, cl_image_desc, cl_image_format, cl_mem};
use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// Read-only 2D image in sRGBA / unorm8 format. Reads through a sampler
/// return linear values; the device does the gamma decode.
pub struct InputTexture {
    image: Image,
    rows: usize,
    cols: usize,
}

impl InputTexture {
    pub fn create(context: &Context, rows: usize, cols: usize) -> Result<Self, ClError> {
        let format = cl_image_format {
            image_channel_order: CL_sRGBA,
            image_channel_data_type: CL_UNORM_INT8,
        };
        let desc = cl_image_desc {
            image_type: CL_MEM_OBJECT_IMAGE2D,
            image_width: cols,
            image_height: rows,
            image_depth: 1,
            image_array_size: 1,
            image_row_pitch: 0,
            image_slice_pitch: 0,
            num_mip_levels: 0,
            num_samples: 0,
            buffer: ptr::null_mut(),
        };
        // SAFETY: no host pointer is supplied, the descriptor outlives the call.
        let image = unsafe {
            Image::create(context, CL_MEM_READ_ONLY, &format, &desc, ptr::null_mut())?
        };
        Ok(Self { image, rows, cols })
    }

    /// Blocking upload of tightly packed RGBA8 pixels covering the whole image.
    pub fn upload(&mut self, queue: &CommandQueue, rgba: &[u8]) -> Result<(), ClError> {
        if rgba.len() != self.rows * self.cols * 4 {
            return Err(ClError(CL_INVALID_VALUE));
        }
        let origin = [0usize; 3];
        let region = [self.cols, self.rows, 1];
        // SAFETY: the write is blocking and `rgba` covers `region` exactly.
        let event = unsafe {
            queue.enqueue_write_image(
                &mut self.image,
                CL_BLOCKING,
                origin.as_ptr(),
                region.as_ptr(),
                0,
                0,
                rgba.as_ptr().cast_mut().cast::<c_void>(),
                &[],
            )?
        };
        event.wait()
    }

    pub fn handle(&self) -> cl_mem {
        self.image.get()
    }
}

/// Zero-filled device-only byte buffer written by the kernel. Bytes the
/// kernel skips (colour planes of transparent pixels) therefore read as 0.
pub fn create_device_buffer(
    context: &Context,
    queue: &CommandQueue,
    len: usize,
) -> Result<Buffer<u8>, ClError> {
    // SAFETY: no host pointer is supplied.
    let mut buffer =
        unsafe { Buffer::<u8>::create(context, CL_MEM_READ_WRITE, len, ptr::null_mut())? };
    // SAFETY: the fill covers exactly the buffer and is awaited below.
    let fill = unsafe { queue.enqueue_fill_buffer(&mut buffer, &[0u8], 0, len, &[])? };
    fill.wait()?;
    Ok(buffer)
}

/// Host-allocated device buffer kept mapped for read/write while alive.
///
/// Dropping it unmaps the view, so a slice handed out by [`as_slice`] can
/// never outlive the mapping.
///
/// [`as_slice`]: PinnedBuffer::as_slice
pub struct PinnedBuffer {
    queue: Arc<CommandQueue>,
    buffer: Buffer<u8>,
    mapped: NonNull<u8>,
    len: usize,
}

impl PinnedBuffer {
    pub fn map(context: &Context, queue: &Arc<CommandQueue>, len: usize) -> Result<Self, ClError> {
        // SAFETY: no host pointer is supplied; the runtime allocates pinned memory.
        let mut buffer = unsafe {
            Buffer::<u8>::create(
                context,
                CL_MEM_READ_WRITE | CL_MEM_ALLOC_HOST_PTR,
                len,
                ptr::null_mut(),
            )?
        };

        let mut mapped_ptr: cl_mem = ptr::null_mut();
        // SAFETY: blocking map of the whole buffer; the pointer is valid until unmapped.
        unsafe {
            queue.enqueue_map_buffer(
                &mut buffer,
                CL_BLOCKING,
                CL_MAP_READ | CL_MAP_WRITE,
                0,
                len,
                &mut mapped_ptr,
                &[],
            )?;
        }
        let mapped = NonNull::new(mapped_ptr.cast::<u8>()).ok_or(ClError(CL_INVALID_VALUE))?;
        log::debug!("Mapped {} bytes of pinned host memory", len);

        Ok(Self {
            queue: Arc::clone(queue),
            buffer,
            mapped,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the region stays mapped for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.mapped.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.mapped.as_ptr(), self.len) }
    }
}

impl Drop for PinnedBuffer {
    fn drop(&mut self) {
        // SAFETY: `mapped` was returned by mapping `buffer` on this queue.
        let unmapped = unsafe {
            self.queue.enqueue_unmap_mem_object(
                self.buffer.get(),
                self.mapped.as_ptr().cast::<c_void>(),
                &[],
            )
        };
        match unmapped.and_then(|_| self.queue.finish()) {
            Ok(()) => log::debug!("Unmapped {} bytes of pinned host memory", self.len),
            Err(e) => log::warn!("Failed to unmap pinned host memory: {}", e),
        }
    }
}
