//! Program compilation and positional kernel argument binding.

use crate::error::InitError;

use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::Device;
use opencl3::error_codes::ClError;
use opencl3::event::Event;
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::ClMem;
use opencl3::program::Program;
use opencl3::types::{cl_float, cl_int, cl_mem};

/// Compiles `source` for `device` only. On failure the error carries the
/// device compiler's build log.
pub fn build_program(
    context: &Context,
    device: &Device,
    source: &str,
    options: &str,
) -> Result<Program, InitError> {
    let mut program = Program::create_from_source(context, source).map_err(|e| {
        InitError::Compile {
            log: e.to_string(),
        }
    })?;

    if let Err(e) = program.build(&[device.id()], options) {
        let build_log = program.get_build_log(device.id()).unwrap_or_default();
        return Err(InitError::Compile {
            log: format!("{}: {}", e, build_log.trim()),
        });
    }

    log::debug!("Built kernel program with options '{}'", options);
    Ok(program)
}

/// A single kernel argument value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Mem(cl_mem),
    Int(cl_int),
    Float(cl_float),
}

impl From<cl_mem> for KernelArg {
    fn from(value: cl_mem) -> Self {
        KernelArg::Mem(value)
    }
}

impl From<cl_int> for KernelArg {
    fn from(value: cl_int) -> Self {
        KernelArg::Int(value)
    }
}

impl From<bool> for KernelArg {
    fn from(value: bool) -> Self {
        KernelArg::Int(cl_int::from(value))
    }
}

impl From<cl_float> for KernelArg {
    fn from(value: cl_float) -> Self {
        KernelArg::Float(value)
    }
}

/// Fluent argument binder. Positions are assigned in call order, so
/// arguments must be bound in the order the kernel declares them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelArgs {
    args: Vec<KernelArg>,
}

impl KernelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<KernelArg>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn mem(mut self, memory: &impl ClMem) -> Self {
        self.args.push(KernelArg::Mem(memory.get()));
        self
    }

    pub fn as_slice(&self) -> &[KernelArg] {
        &self.args
    }

    /// Pairs the bound arguments with `kernel`, ready to enqueue.
    pub fn build(self, kernel: &Kernel) -> KernelInvocation<'_> {
        KernelInvocation { kernel, args: self }
    }
}

/// A kernel with all of its arguments bound.
pub struct KernelInvocation<'k> {
    kernel: &'k Kernel,
    args: KernelArgs,
}

impl KernelInvocation<'_> {
    /// Enqueues a 2D launch of `global` work-items in `local`-sized groups.
    pub fn enqueue_2d(
        &self,
        queue: &CommandQueue,
        global: [usize; 2],
        local: [usize; 2],
    ) -> Result<Event, ClError> {
        let mut exec = ExecuteKernel::new(self.kernel);
        // SAFETY: every argument is a plain scalar or a live memory handle,
        // and the caller binds them in the kernel's declaration order.
        unsafe {
            for arg in self.args.as_slice() {
                match arg {
                    KernelArg::Mem(mem) => exec.set_arg(mem),
                    KernelArg::Int(value) => exec.set_arg(value),
                    KernelArg::Float(value) => exec.set_arg(value),
                };
            }
            exec.set_global_work_sizes(&global)
                .set_local_work_sizes(&local)
                .enqueue_nd_range(queue)
        }
    }
}
