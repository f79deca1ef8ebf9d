//! Compute device selection.

use candle_core::Device;
use mtgl_common::Result;
use tracing::{debug, info};

/// Select the best available device.
///
/// CUDA and Metal are only tried when the crate is built with the matching
/// feature; anything unavailable falls back to the CPU.
pub fn select_device(use_gpu: bool) -> Result<Device> {
    if !use_gpu {
        return Ok(Device::Cpu);
    }
    debug!("GPU requested, probing backends");

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("CUDA device available");
                return Ok(device);
            }
            Err(e) => {
                debug!("CUDA not available: {}, falling back to CPU", e);
            }
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Metal device available");
                return Ok(device);
            }
            Err(e) => {
                debug!("Metal not available: {}, falling back to CPU", e);
            }
        }
    }

    info!("No GPU backend available, using CPU");
    Ok(Device::Cpu)
}

/// Check if a device is a GPU.
pub fn is_gpu(device: &Device) -> bool {
    matches!(device, Device::Cuda(_) | Device::Metal(_))
}
