/*!
macOS-specific GPU detection using system_profiler
*/

use crate::constants::*;
use crate::gpu::{GpuInfo, GpuVendor};
use crate::Result;
use std::process::Command;

pub fn detect_gpus() -> Result<Vec<GpuInfo>> {
    let mut gpus = Vec::new();

    if let Ok(output) = Command::new(CMD_SYSTEM_PROFILER)
        .arg("SPDisplaysDataType")
        .output()
    {
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            for line in stdout.lines() {
                if let Some((key, value)) = line.split_once(':') {
                    if key.trim().to_lowercase() == KEYWORD_CHIPSET_MODEL {
                        let name = value.trim().to_string();
                        gpus.push(GpuInfo {
                            vendor: GpuVendor::from_name(&name),
                            name,
                            vram_mb: None,
                            driver_version: None,
                        });
                    }
                }
            }
        }
    }

    // Apple Silicon always has an integrated GPU, even if system_profiler is unavailable
    if gpus.is_empty() && std::env::consts::ARCH == "aarch64" {
        gpus.push(GpuInfo {
            vendor: GpuVendor::Apple,
            name: "Apple Silicon GPU".to_string(),
            vram_mb: None,
            driver_version: None,
        });
    }

    Ok(gpus)
}
