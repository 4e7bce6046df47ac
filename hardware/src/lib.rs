/*!
# ModelFlow Hardware Detection

Detects GPU and memory hardware so model-backed pipelines get a deterministic
default device and precision.

## Features

- GPU vendor and capability detection
- System memory detection
- Cross-platform support (Windows, Linux, macOS)
- Device/precision recommendation with a fixed priority order

## Example

```rust,no_run
use modelflow_hardware::detect_system;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let system = detect_system()?;
    let rec = system.recommended_device();
    println!("Device: {} ({}) - {}", rec.device, rec.precision, rec.reason);
    Ok(())
}
```
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;
use sysinfo::System;

mod gpu;
mod memory;
pub mod constants;
pub mod device;

#[cfg(target_os = "windows")]
mod platform_windows;

#[cfg(target_os = "linux")]
mod platform_linux;

#[cfg(target_os = "macos")]
mod platform_macos;

pub use gpu::{GpuInfo, GpuVendor, detect_gpus};
pub use memory::{MemoryInfo, detect_memory, calculate_total_vram, get_ram_tier, get_vram_tier};
pub use device::{default_precision, recommend_device, Device, DeviceRecommendation, Precision};

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("Failed to detect GPU: {0}")]
    GpuDetection(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Unknown precision: {0}")]
    UnknownPrecision(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HardwareError>;

/// Complete system hardware information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub gpus: Vec<GpuInfo>,
    pub memory: MemoryInfo,
    pub os: OsInfo,

    // Computed fields
    pub total_vram_mb: u64,
    pub ram_tier: String,
    pub vram_tier: String,
}

impl SystemInfo {
    /// System with no accelerators, used when detection is skipped.
    pub fn cpu_only() -> Self {
        Self {
            gpus: Vec::new(),
            memory: MemoryInfo {
                total_ram_mb: 0,
                available_ram_mb: 0,
            },
            os: OsInfo::detect(),
            total_vram_mb: 0,
            ram_tier: get_ram_tier(0).to_string(),
            vram_tier: get_vram_tier(0).to_string(),
        }
    }

    /// Get recommended device and precision
    pub fn recommended_device(&self) -> DeviceRecommendation {
        recommend_device(&self.gpus, &self.os.name)
    }
}

/// Operating system information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
    pub arch: String,
}

impl OsInfo {
    /// Detect operating system information including version.
    pub fn detect() -> Self {
        let os_version = System::long_os_version()
            .or_else(System::os_version)
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            name: std::env::consts::OS.to_string(),
            version: os_version,
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Detect complete system hardware
pub fn detect_system() -> Result<SystemInfo> {
    let gpus = gpu::detect_gpus()?;
    let memory = detect_memory()?;
    let os = OsInfo::detect();

    let total_vram_mb = calculate_total_vram(&gpus);
    let ram_tier = get_ram_tier(memory.total_ram_mb).to_string();
    let vram_tier = get_vram_tier(total_vram_mb).to_string();

    log::debug!(
        "Detected {} GPU(s), {} MB RAM on {}",
        gpus.len(),
        memory.total_ram_mb,
        os.name
    );

    Ok(SystemInfo {
        gpus,
        memory,
        os,
        total_vram_mb,
        ram_tier,
        vram_tier,
    })
}
