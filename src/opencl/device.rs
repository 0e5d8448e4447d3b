//! GPU discovery and scoring.
//!
//! Every GPU on every platform is scored by a weighted sum of its hardware
//! capabilities; the highest score wins and ties keep the device seen first.

use crate::error::InitError;

use opencl3::command_queue::{CL_QUEUE_PROFILING_ENABLE, CommandQueue};
use opencl3::context::Context;
use opencl3::device::{CL_DEVICE_TYPE_GPU, Device, get_device_ids};
use opencl3::error_codes::ClError;
use opencl3::platform::get_platforms;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Weights of the device score. Each capability is divided by its `*_unit`
/// (integer division) and then multiplied by its weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreWeights {
    pub compute_units: u64,
    pub clock_mhz: u64,
    pub global_mem_unit: u64,
    pub global_mem: u64,
    pub local_mem_unit: u64,
    pub local_mem: u64,
    pub image_dim_unit: u64,
    pub image_dim: u64,
    pub cache_unit: u64,
    pub cache: u64,
    pub cacheline: u64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            compute_units: 200,
            clock_mhz: 10,
            global_mem_unit: 256 * MIB,
            global_mem: 1,
            local_mem_unit: KIB,
            local_mem: 1,
            image_dim_unit: 512,
            image_dim: 1,
            cache_unit: 64 * KIB,
            cache: 1,
            cacheline: 1,
        }
    }
}

/// The subset of device properties that feed the score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCaps {
    pub compute_units: u32,
    pub clock_mhz: u32,
    pub global_mem: u64,
    pub local_mem: u64,
    pub image2d_max_width: usize,
    pub image2d_max_height: usize,
    pub global_mem_cache: u64,
    pub global_mem_cacheline: u32,
}

impl DeviceCaps {
    pub fn query(device: &Device) -> Result<Self, ClError> {
        Ok(Self {
            compute_units: device.max_compute_units()?,
            clock_mhz: device.max_clock_frequency()?,
            global_mem: device.global_mem_size()?,
            local_mem: device.local_mem_size()?,
            image2d_max_width: device.image2d_max_width()?,
            image2d_max_height: device.image2d_max_height()?,
            global_mem_cache: device.global_mem_cache_size()?,
            global_mem_cacheline: device.global_mem_cacheline_size()?,
        })
    }

    /// Weighted capability score. More capable hardware scores strictly
    /// higher in every term whose unit it crosses.
    pub fn score(&self, w: &ScoreWeights) -> u64 {
        let per = |value: u64, unit: u64| value / unit.max(1);

        [
            (u64::from(self.compute_units), w.compute_units),
            (u64::from(self.clock_mhz), w.clock_mhz),
            (per(self.global_mem, w.global_mem_unit), w.global_mem),
            (per(self.local_mem, w.local_mem_unit), w.local_mem),
            (per(self.image2d_max_width as u64, w.image_dim_unit), w.image_dim),
            (per(self.image2d_max_height as u64, w.image_dim_unit), w.image_dim),
            (per(self.global_mem_cache, w.cache_unit), w.cache),
            (u64::from(self.global_mem_cacheline), w.cacheline),
        ]
        .into_iter()
        .fold(0u64, |score, (value, weight)| {
            score.saturating_add(value.saturating_mul(weight))
        })
    }
}

/// Returns the first candidate with the strictly highest non-zero score.
pub fn pick_best<T>(candidates: impl IntoIterator<Item = (T, u64)>) -> Option<(T, u64)> {
    let mut best: Option<(T, u64)> = None;
    for (candidate, score) in candidates {
        let best_score = best.as_ref().map_or(0, |(_, s)| *s);
        if score > best_score {
            best = Some((candidate, score));
        }
    }
    best
}

/// The winning device together with the context and queue bound to it.
pub struct SelectedDevice {
    pub device: Device,
    pub context: Context,
    pub queue: CommandQueue,
    pub name: String,
    pub caps: DeviceCaps,
}

impl std::fmt::Debug for SelectedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedDevice")
            .field("name", &self.name)
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}

/// Scans all platforms, picks the best-scoring GPU and creates a context and a
/// profiling-enabled command queue on it.
pub fn select_device(weights: &ScoreWeights) -> Result<SelectedDevice, InitError> {
    let platforms = get_platforms().map_err(|e| InitError::NoDevice(e.to_string()))?;
    if platforms.is_empty() {
        return Err(InitError::NoDevice("no OpenCL platforms found".to_string()));
    }

    let mut scored = Vec::new();
    for platform in &platforms {
        let plat_name = platform
            .name()
            .unwrap_or_else(|_| "Unknown Platform".to_string());
        let device_ids = match get_device_ids(platform.id(), CL_DEVICE_TYPE_GPU) {
            Ok(ids) => ids,
            Err(e) => {
                log::debug!("No GPU devices on platform '{}': {}", plat_name, e);
                continue;
            }
        };

        for device_id in device_ids {
            let device = Device::new(device_id);
            let score = match DeviceCaps::query(&device) {
                Ok(caps) => caps.score(weights),
                Err(e) => {
                    log::debug!("Skipping device on '{}': {}", plat_name, e);
                    0
                }
            };
            log::debug!(
                "Device '{}' on '{}' scored {}",
                device.name().unwrap_or_default().trim(),
                plat_name,
                score
            );
            scored.push((device, score));
        }
    }

    let (device, score) = pick_best(scored)
        .ok_or_else(|| InitError::NoDevice("no GPU device scored above zero".to_string()))?;
    let caps = DeviceCaps::query(&device).map_err(InitError::device)?;
    let name = device.name().unwrap_or_default().trim().to_string();
    log::info!("Selected OpenCL device '{}' (score {})", name, score);

    let context = Context::from_device(&device).map_err(InitError::device)?;
    #[allow(deprecated)]
    let queue = CommandQueue::create_default(&context, CL_QUEUE_PROFILING_ENABLE)
        .map_err(InitError::device)?;

    Ok(SelectedDevice {
        device,
        context,
        queue,
        name,
        caps,
    })
}

/// One row of the `--list-devices` report.
#[derive(Debug, Clone)]
pub struct DeviceListing {
    pub platform_index: usize,
    pub platform_name: String,
    pub device_index: usize,
    pub device_name: String,
    pub vendor: String,
    pub global_mem: u64,
    pub score: u64,
}

/// Enumerates every GPU on every platform along with its score.
pub fn list_devices(weights: &ScoreWeights) -> Result<Vec<DeviceListing>, ClError> {
    let mut listings = Vec::new();
    for (platform_index, platform) in get_platforms()?.iter().enumerate() {
        let platform_name = platform
            .name()
            .unwrap_or_else(|_| "Unknown Platform".to_string());
        let Ok(device_ids) = get_device_ids(platform.id(), CL_DEVICE_TYPE_GPU) else {
            continue;
        };
        for (device_index, device_id) in device_ids.iter().enumerate() {
            let device = Device::new(*device_id);
            let caps = DeviceCaps::query(&device).unwrap_or_default();
            listings.push(DeviceListing {
                platform_index,
                platform_name: platform_name.clone(),
                device_index,
                device_name: device
                    .name()
                    .unwrap_or_else(|_| "Unknown Device".to_string()),
                vendor: device
                    .vendor()
                    .unwrap_or_else(|_| "Unknown Vendor".to_string()),
                global_mem: caps.global_mem,
                score: caps.score(weights),
            });
        }
    }
    Ok(listings)
}
