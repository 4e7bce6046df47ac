/*!
Memory Detection (RAM and VRAM)
*/

use serde::{Deserialize, Serialize};
use crate::constants::*;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total system RAM in MB
    pub total_ram_mb: u64,

    /// Available (free) system RAM in MB
    pub available_ram_mb: u64,
}

/// Detect system memory (RAM) using sysinfo crate
pub fn detect_memory() -> Result<MemoryInfo> {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_memory();

    Ok(MemoryInfo {
        total_ram_mb: sys.total_memory() / 1024 / 1024,
        available_ram_mb: sys.available_memory() / 1024 / 1024,
    })
}

/// Calculate total VRAM across all GPUs
pub fn calculate_total_vram(gpus: &[crate::gpu::GpuInfo]) -> u64 {
    gpus.iter()
        .filter_map(|gpu| gpu.vram_mb)
        .sum()
}

/// Get memory tier (low/medium/high/very high)
pub fn get_ram_tier(total_ram_mb: u64) -> &'static str {
    tier(total_ram_mb, LOW_RAM_THRESHOLD_MB, MEDIUM_RAM_THRESHOLD_MB, HIGH_RAM_THRESHOLD_MB)
}

/// Get VRAM tier (low/medium/high/very high)
pub fn get_vram_tier(total_vram_mb: u64) -> &'static str {
    tier(total_vram_mb, LOW_VRAM_THRESHOLD_MB, MEDIUM_VRAM_THRESHOLD_MB, HIGH_VRAM_THRESHOLD_MB)
}

fn tier(value: u64, low: u64, medium: u64, high: u64) -> &'static str {
    if value < low {
        TIER_LOW
    } else if value < medium {
        TIER_MEDIUM
    } else if value < high {
        TIER_HIGH
    } else {
        TIER_VERY_HIGH
    }
}
