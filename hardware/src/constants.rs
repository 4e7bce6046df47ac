/*!
Hardware Detection Constants

Centralized constants for hardware detection to avoid string literals across crates.
*/

// ========== Device Names ==========
pub const DEVICE_CPU: &str = "cpu";
pub const DEVICE_CUDA: &str = "cuda";
pub const DEVICE_METAL: &str = "metal";
pub const DEVICE_DIRECTML: &str = "directml";
pub const DEVICE_ROCM: &str = "rocm";

// ========== Precision Names ==========
pub const PRECISION_F32: &str = "f32";
pub const PRECISION_F16: &str = "f16";
pub const PRECISION_BF16: &str = "bf16";
pub const PRECISION_INT8: &str = "int8";

// ========== Detection Command Names ==========
pub const CMD_NVIDIA_SMI: &str = "nvidia-smi";
pub const CMD_LSPCI: &str = "lspci";
pub const CMD_SYSTEM_PROFILER: &str = "system_profiler";
pub const CMD_POWERSHELL: &str = "powershell";

// ========== Memory Thresholds (MB) ==========
pub const LOW_VRAM_THRESHOLD_MB: u64 = 4096;      // < 4GB = low VRAM
pub const MEDIUM_VRAM_THRESHOLD_MB: u64 = 8192;   // 4-8GB = medium VRAM
pub const HIGH_VRAM_THRESHOLD_MB: u64 = 16384;    // 8-16GB = high VRAM
                                                    // > 16GB = very high VRAM

pub const LOW_RAM_THRESHOLD_MB: u64 = 8192;       // < 8GB = low RAM
pub const MEDIUM_RAM_THRESHOLD_MB: u64 = 16384;   // 8-16GB = medium RAM
pub const HIGH_RAM_THRESHOLD_MB: u64 = 32768;     // 16-32GB = high RAM
                                                    // > 32GB = very high RAM

// ========== OS Names ==========
pub const OS_WINDOWS: &str = "windows";
pub const OS_LINUX: &str = "linux";
pub const OS_MACOS: &str = "macos";

// ========== Memory Tiers ==========
pub const TIER_LOW: &str = "low";
pub const TIER_MEDIUM: &str = "medium";
pub const TIER_HIGH: &str = "high";
pub const TIER_VERY_HIGH: &str = "very_high";

// ========== GPU Keywords for Classification ==========
pub const GPU_KEYWORD_NVIDIA: &str = "nvidia";
pub const GPU_KEYWORD_AMD: &str = "amd";
pub const GPU_KEYWORD_ATI: &str = "ati";
pub const GPU_KEYWORD_RADEON: &str = "radeon";
pub const GPU_KEYWORD_INTEL: &str = "intel";
pub const GPU_KEYWORD_APPLE: &str = "apple";

// ========== Detection Keywords ==========
pub const KEYWORD_VGA: &str = "vga";
pub const KEYWORD_3D: &str = "3d";
pub const KEYWORD_CHIPSET_MODEL: &str = "chipset model";
