//! Audio and image buffers.

use serde::{Deserialize, Serialize};

use crate::error::{ValueError, ValueResult};

/// Interleaved PCM audio in f32 samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> ValueResult<Self> {
        let audio = Self {
            samples,
            sample_rate,
            channels,
        };
        audio.validate()?;
        Ok(audio)
    }

    /// Single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> ValueResult<Self> {
        Self::new(samples, sample_rate, 1)
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn validate(&self) -> ValueResult<()> {
        if self.sample_rate == 0 {
            return Err(invalid("sample rate must be positive"));
        }
        if self.channels == 0 {
            return Err(invalid("channel count must be positive"));
        }
        if self.samples.is_empty() {
            return Err(invalid("audio buffer is empty"));
        }
        if self.samples.len() % self.channels as usize != 0 {
            return Err(invalid(format!(
                "{} samples do not divide evenly into {} channels",
                self.samples.len(),
                self.channels
            )));
        }
        if self.samples.iter().any(|s| !s.is_finite()) {
            return Err(invalid("audio contains non-finite samples"));
        }
        Ok(())
    }

    /// Average interleaved channels into one.
    pub fn to_mono(&self) -> AudioBuffer {
        if self.channels <= 1 {
            return self.clone();
        }
        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        AudioBuffer {
            samples,
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    /// Linear-interpolation resample of a mono buffer to `target_rate`.
    pub fn resample(&self, target_rate: u32) -> AudioBuffer {
        let mono = self.to_mono();
        if mono.samples.is_empty() || mono.sample_rate == target_rate || target_rate == 0 {
            return mono;
        }

        let ratio = mono.sample_rate as f64 / target_rate as f64;
        let out_len = ((mono.samples.len() as f64) / ratio).round().max(1.0) as usize;
        let last = mono.samples.len() - 1;

        let samples = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let left = (pos.floor() as usize).min(last);
                let right = (left + 1).min(last);
                let frac = (pos - left as f64) as f32;
                mono.samples[left] * (1.0 - frac) + mono.samples[right] * frac
            })
            .collect();

        AudioBuffer {
            samples,
            sample_rate: target_rate,
            channels: 1,
        }
    }
}

/// Packed 8-bit image in height × width × channels order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> ValueResult<Self> {
        let image = Self {
            width,
            height,
            channels,
            pixels,
        };
        image.validate()?;
        Ok(image)
    }

    pub fn validate(&self) -> ValueResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!(
                "image dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(invalid(format!(
                "unsupported channel count {} (expected 1, 3 or 4)",
                self.channels
            )));
        }
        let expected = self.width as usize * self.height as usize * self.channels as usize;
        if self.pixels.len() != expected {
            return Err(invalid(format!(
                "{}x{}x{} image needs {} bytes, got {}",
                self.width,
                self.height,
                self.channels,
                expected,
                self.pixels.len()
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ValueError {
    ValueError::InvalidValue {
        message: message.into(),
    }
}
