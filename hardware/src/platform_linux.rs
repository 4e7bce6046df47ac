/*!
Linux-specific GPU detection using nvidia-smi and lspci
*/

use crate::constants::*;
use crate::gpu::{GpuInfo, GpuVendor};
use crate::Result;
use std::process::Command;

/// Detect GPUs on Linux using nvidia-smi, falling back to lspci
pub fn detect_gpus() -> Result<Vec<GpuInfo>> {
    let mut gpus = Vec::new();

    // Try nvidia-smi first (gives VRAM and driver version)
    if let Ok(output) = Command::new(CMD_NVIDIA_SMI)
        .args([
            "--query-gpu=name,memory.total,driver_version",
            "--format=csv,noheader,nounits",
        ])
        .output()
    {
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            gpus.extend(parse_nvidia_smi(&stdout));
        }
    }

    // Fall back to lspci
    if gpus.is_empty() {
        if let Ok(output) = Command::new(CMD_LSPCI).output() {
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                gpus.extend(parse_lspci(&stdout));
            }
        }
    }

    log::debug!("Detected {} GPU(s) on Linux", gpus.len());
    Ok(gpus)
}

pub(crate) fn parse_nvidia_smi(stdout: &str) -> Vec<GpuInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
            if parts.len() < 3 {
                return None;
            }
            Some(GpuInfo {
                vendor: GpuVendor::Nvidia,
                name: parts[0].to_string(),
                vram_mb: parts[1].parse().ok(),
                driver_version: Some(parts[2].to_string()),
            })
        })
        .collect()
}

pub(crate) fn parse_lspci(stdout: &str) -> Vec<GpuInfo> {
    stdout
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains(KEYWORD_VGA) || lower.contains(KEYWORD_3D)
        })
        .map(|line| {
            // Device description follows the class, after the last colon
            let name = line.rsplit(':').next().unwrap_or(line).trim().to_string();
            GpuInfo {
                vendor: GpuVendor::from_name(line),
                name,
                vram_mb: None, // lspci doesn't provide VRAM
                driver_version: None,
            }
        })
        .collect()
}
