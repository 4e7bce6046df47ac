/*!
Windows-specific GPU detection using PowerShell and WMI
*/

use crate::constants::*;
use crate::gpu::{GpuInfo, GpuVendor};
use crate::{HardwareError, Result};
use std::process::Command;

/// Detect GPUs on Windows via Win32_VideoController
pub fn detect_gpus() -> Result<Vec<GpuInfo>> {
    let output = Command::new(CMD_POWERSHELL)
        .args([
            "-Command",
            "Get-CimInstance -ClassName Win32_VideoController | Select-Object Name, AdapterRAM, DriverVersion | ConvertTo-Json",
        ])
        .output()
        .map_err(|e| HardwareError::GpuDetection(format!("PowerShell failed: {}", e)))?;

    if !output.status.success() {
        return Err(HardwareError::GpuDetection(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    let json_str = String::from_utf8_lossy(&output.stdout);
    if json_str.trim().is_empty() {
        return Ok(Vec::new());
    }
    let data: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| HardwareError::GpuDetection(format!("JSON parse failed: {}", e)))?;

    // Single adapter is an object, several are an array
    let adapters = match data {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    Ok(adapters
        .iter()
        .filter_map(|adapter| {
            let name = adapter["Name"].as_str()?.trim().to_string();
            Some(GpuInfo {
                vendor: GpuVendor::from_name(&name),
                vram_mb: adapter["AdapterRAM"].as_u64().map(|bytes| bytes / 1024 / 1024),
                driver_version: adapter["DriverVersion"].as_str().map(str::to_string),
                name,
            })
        })
        .collect())
}
