/*!
Device and Precision Selection

Deterministic default placement for model-backed pipelines:
- Explicit caller configuration always wins (handled by callers)
- Otherwise the first matching rule below, evaluated over detected GPUs:
  NVIDIA → CUDA, Apple → Metal, AMD → ROCm (Linux) / DirectML (Windows),
  Intel → DirectML (Windows), anything else → CPU
- Precision defaults to F16 on accelerators and F32 on CPU
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::*;
use crate::gpu::{GpuInfo, GpuVendor};
use crate::HardwareError;

/// Compute device a model is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    Cpu,
    /// CUDA device ordinal
    Cuda(u32),
    Metal,
    DirectMl,
    Rocm,
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "{}", DEVICE_CPU),
            Self::Cuda(0) => write!(f, "{}", DEVICE_CUDA),
            Self::Cuda(index) => write!(f, "{}:{}", DEVICE_CUDA, index),
            Self::Metal => write!(f, "{}", DEVICE_METAL),
            Self::DirectMl => write!(f, "{}", DEVICE_DIRECTML),
            Self::Rocm => write!(f, "{}", DEVICE_ROCM),
        }
    }
}

impl FromStr for Device {
    type Err = HardwareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (name, index) = match lower.split_once(':') {
            Some((name, index)) => {
                let index = index
                    .parse::<u32>()
                    .map_err(|_| HardwareError::UnknownDevice(s.to_string()))?;
                (name, Some(index))
            }
            None => (lower.as_str(), None),
        };

        match (name, index) {
            (DEVICE_CPU, None) => Ok(Self::Cpu),
            (DEVICE_CUDA | "gpu", index) => Ok(Self::Cuda(index.unwrap_or(0))),
            (DEVICE_METAL | "mps", None) => Ok(Self::Metal),
            (DEVICE_DIRECTML | "dml", None) => Ok(Self::DirectMl),
            (DEVICE_ROCM, None) => Ok(Self::Rocm),
            _ => Err(HardwareError::UnknownDevice(s.to_string())),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = HardwareError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

/// Numeric precision for model weights and activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Precision {
    F32,
    F16,
    Bf16,
    Int8,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F32 => PRECISION_F32,
            Self::F16 => PRECISION_F16,
            Self::Bf16 => PRECISION_BF16,
            Self::Int8 => PRECISION_INT8,
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Precision {
    type Err = HardwareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            PRECISION_F32 | "float32" | "fp32" => Ok(Self::F32),
            PRECISION_F16 | "float16" | "fp16" | "half" => Ok(Self::F16),
            PRECISION_BF16 | "bfloat16" => Ok(Self::Bf16),
            PRECISION_INT8 | "i8" | "q8" => Ok(Self::Int8),
            _ => Err(HardwareError::UnknownPrecision(s.to_string())),
        }
    }
}

impl TryFrom<String> for Precision {
    type Error = HardwareError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Precision> for String {
    fn from(precision: Precision) -> Self {
        precision.to_string()
    }
}

/// Default precision for a device.
pub fn default_precision(device: Device) -> Precision {
    if device.is_accelerator() {
        Precision::F16
    } else {
        Precision::F32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecommendation {
    pub device: Device,
    pub precision: Precision,

    /// Reason for recommendation
    pub reason: String,
}

/// Recommend a device based on GPU availability
pub fn recommend_device(gpus: &[GpuInfo], os_name: &str) -> DeviceRecommendation {
    let os_lower = os_name.to_lowercase();
    let has = |vendor: GpuVendor| gpus.iter().any(|gpu| gpu.vendor == vendor);

    let (device, reason) = if has(GpuVendor::Nvidia) {
        (Device::Cuda(0), "NVIDIA GPU detected, CUDA is optimal".to_string())
    } else if has(GpuVendor::Apple) {
        (Device::Metal, "Apple Silicon detected, Metal is optimal".to_string())
    } else if has(GpuVendor::Amd) && os_lower.contains(OS_LINUX) {
        (Device::Rocm, "AMD GPU detected on Linux, ROCm is optimal".to_string())
    } else if (has(GpuVendor::Amd) || has(GpuVendor::Intel)) && os_lower.contains(OS_WINDOWS) {
        (Device::DirectMl, "GPU detected on Windows, DirectML is optimal".to_string())
    } else {
        (Device::Cpu, "No supported GPU detected, using CPU".to_string())
    };

    DeviceRecommendation {
        device,
        precision: default_precision(device),
        reason,
    }
}
