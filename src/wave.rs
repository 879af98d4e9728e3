//! PCM wave buffer.
//!
//! [`WaveBuffer`] owns raw interleaved PCM bytes plus their format and
//! exposes them through a sample-indexed signed 16-bit view.  Two storage
//! depths are supported:
//!
//! | bits | storage                    | read                 | write                          |
//! |------|----------------------------|----------------------|--------------------------------|
//! | 16   | signed, host byte order    | as stored            | clamped to `i16`               |
//! | 8    | unsigned with a bias of 128| `(byte - 128) << 8`  | `(clamp(v) >> 8) + 128`        |
//!
//! Every DSP routine in [`crate::dsp`] works in that 16-bit domain, whatever
//! the storage depth.

use std::{fmt, path::Path};

use anyhow::{bail, Context, Result};

use crate::error::WaveError;

/// WAVE `wFormatTag` for integer PCM; the only tag accepted.
pub const FORMAT_PCM: u16 = 1;

/// Clamp a widened sample value into the signed 16-bit range.
#[inline]
pub fn clamp_sample(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

// ─────────────────────────────────────────────────────────────────────────────
// Format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub sample_rate: u32,
    /// 8 or 16.
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl WaveFormat {
    pub fn new(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        Self { sample_rate, bits_per_sample, channels }
    }

    /// Bytes occupied by one sample of one channel.
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8).max(1)
    }
}

impl Default for WaveFormat {
    fn default() -> Self {
        Self { sample_rate: 16_000, bits_per_sample: 16, channels: 1 }
    }
}

impl fmt::Display for WaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {}-bit, {} ch",
            self.sample_rate, self.bits_per_sample, self.channels
        )
    }
}

fn validate_format(bits_per_sample: u16, channels: u16, format_tag: u16) -> Result<(), WaveError> {
    if !matches!(bits_per_sample, 8 | 16) || channels == 0 || format_tag != FORMAT_PCM {
        return Err(WaveError::UnsupportedFormat { bits_per_sample, channels, format_tag });
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// WaveBuffer
// ─────────────────────────────────────────────────────────────────────────────

/// Growable PCM byte buffer with format metadata.
///
/// `Clone` is a deep copy; no two buffers ever share storage.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveBuffer {
    format: WaveFormat,
    data: Vec<u8>,
}

impl Default for WaveBuffer {
    fn default() -> Self {
        Self { format: WaveFormat::default(), data: Vec::new() }
    }
}

impl WaveBuffer {
    /// Empty buffer in `format`.
    pub fn new(format: WaveFormat) -> Result<Self, WaveError> {
        validate_format(format.bits_per_sample, format.channels, FORMAT_PCM)?;
        Ok(Self { format, data: Vec::new() })
    }

    /// Build a buffer from 16-bit domain samples, narrowing to the storage depth.
    pub fn from_samples(format: WaveFormat, samples: &[i16]) -> Result<Self, WaveError> {
        let mut buf = Self::new(format)?;
        buf.reserve(samples.len() * format.bytes_per_sample())?;
        for &s in samples {
            buf.push_sample(i32::from(s));
        }
        Ok(buf)
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    /// Switch to a new format.
    ///
    /// Existing data is discarded whether or not the format is accepted; on
    /// rejection the previous format stays in place.
    pub fn set_format(
        &mut self,
        sample_rate: u32,
        bits_per_sample: u16,
        channels: u16,
        format_tag: u16,
    ) -> Result<(), WaveError> {
        self.data.clear();
        validate_format(bits_per_sample, channels, format_tag)?;
        self.format = WaveFormat { sample_rate, bits_per_sample, channels };
        Ok(())
    }

    // ── Raw byte access ───────────────────────────────────────────────────────

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn reserve(&mut self, additional: usize) -> Result<(), WaveError> {
        self.data
            .try_reserve(additional)
            .map_err(|source| WaveError::Alloc { requested: additional, source })
    }

    /// Truncate to, or zero-extend up to, `new_len` bytes.
    pub fn resize(&mut self, new_len: usize) -> Result<(), WaveError> {
        if new_len > self.data.len() {
            self.reserve(new_len - self.data.len())?;
        }
        self.data.resize(new_len, 0);
        Ok(())
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<(), WaveError> {
        self.reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Append `len` zero bytes (reserve / pad).
    pub fn append_zeroed(&mut self, len: usize) -> Result<(), WaveError> {
        self.resize(self.data.len() + len)
    }

    /// Overwrite bytes in place starting at `byte_offset`.
    ///
    /// The copy is clamped to the current length and never grows the buffer.
    /// Returns the number of bytes actually written.
    pub fn assign_data(&mut self, bytes: &[u8], byte_offset: usize) -> usize {
        if byte_offset >= self.data.len() {
            return 0;
        }
        let n = bytes.len().min(self.data.len() - byte_offset);
        self.data[byte_offset..byte_offset + n].copy_from_slice(&bytes[..n]);
        n
    }

    /// Zero-pad a trailing partial sample so the byte length is a whole
    /// number of samples.
    pub fn pad_to_sample_boundary(&mut self) -> Result<(), WaveError> {
        let bps = self.format.bytes_per_sample();
        let rem = self.data.len() % bps;
        if rem != 0 {
            self.append_zeroed(bps - rem)?;
        }
        Ok(())
    }

    // ── Sample access ─────────────────────────────────────────────────────────

    /// Number of samples across all channels.  A trailing partial sample
    /// counts; it reads as if zero-padded.
    pub fn sample_count(&self) -> usize {
        self.data.len().div_ceil(self.format.bytes_per_sample())
    }

    pub fn frame_count(&self) -> usize {
        self.sample_count() / usize::from(self.format.channels)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / f64::from(self.format.sample_rate)
    }

    /// Sample `index` widened to the signed 16-bit domain.
    pub fn sample(&self, index: usize) -> Option<i16> {
        if index >= self.sample_count() {
            return None;
        }
        match self.format.bits_per_sample {
            8 => Some((i16::from(self.data[index]) - 128) << 8),
            _ => {
                let lo = self.data[2 * index];
                let hi = self.data.get(2 * index + 1).copied().unwrap_or(0);
                Some(i16::from_ne_bytes([lo, hi]))
            }
        }
    }

    /// Store `value` at `index`, clamped to `i16` and narrowed to the storage depth.
    pub fn set_sample(&mut self, index: usize, value: i32) -> Result<(), WaveError> {
        let count = self.sample_count();
        if index >= count {
            return Err(WaveError::SampleOutOfRange { index, count });
        }
        let v = clamp_sample(value);
        match self.format.bits_per_sample {
            8 => self.data[index] = narrow_to_u8(v),
            _ => {
                self.pad_to_sample_boundary()?;
                self.data[2 * index..2 * index + 2].copy_from_slice(&v.to_ne_bytes());
            }
        }
        Ok(())
    }

    /// All samples in order, in the 16-bit domain.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        (0..self.sample_count()).filter_map(move |i| self.sample(i))
    }

    /// Samples `start..end` copied into a new buffer of the same format.
    pub fn slice_samples(&self, start: usize, end: usize) -> Option<Self> {
        if start > end || end > self.sample_count() {
            return None;
        }
        let bps = self.format.bytes_per_sample();
        let mut data = self.data[start * bps..(end * bps).min(self.data.len())].to_vec();
        data.resize((end - start) * bps, 0);
        Some(Self { format: self.format, data })
    }

    /// Caller must have reserved space; `Vec` growth is infallible here.
    fn push_sample(&mut self, value: i32) {
        let v = clamp_sample(value);
        match self.format.bits_per_sample {
            8 => self.data.push(narrow_to_u8(v)),
            _ => self.data.extend_from_slice(&v.to_ne_bytes()),
        }
    }

    // ── WAV container ─────────────────────────────────────────────────────────

    /// Load an integer-PCM WAV file (8- or 16-bit).
    pub fn read_wav(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("Cannot open WAV: {}", path.display()))?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int
            || !matches!(spec.bits_per_sample, 8 | 16)
        {
            bail!(
                "Unsupported WAV encoding in {}: {:?} {}-bit (only 8/16-bit PCM)",
                path.display(),
                spec.sample_format,
                spec.bits_per_sample
            );
        }

        let format = WaveFormat::new(spec.sample_rate, spec.bits_per_sample, spec.channels);
        let mut buf = Self::new(format)?;
        buf.reserve(reader.len() as usize * format.bytes_per_sample())?;

        // hound hands 8-bit data back already unbiased (-128..=127).
        let shift = if spec.bits_per_sample == 8 { 8 } else { 0 };
        for s in reader.samples::<i16>() {
            let s = s.with_context(|| format!("WAV read error in {}", path.display()))?;
            buf.push_sample(i32::from(s) << shift);
        }
        tracing::debug!(path = %path.display(), format = %format, samples = buf.sample_count(), "loaded wave");
        Ok(buf)
    }

    /// Write the buffer as a PCM WAV file in its own format.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: self.format.channels,
            sample_rate: self.format.sample_rate,
            bits_per_sample: self.format.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Cannot create WAV: {}", path.display()))?;
        for s in self.samples() {
            if self.format.bits_per_sample == 8 {
                writer.write_sample((s >> 8) as i8).context("WAV write error")?;
            } else {
                writer.write_sample(s).context("WAV write error")?;
            }
        }
        writer.finalize().context("WAV finalise error")?;
        tracing::debug!(
            path = %path.display(),
            samples = self.sample_count(),
            secs = self.duration_secs(),
            "saved wave"
        );
        Ok(())
    }
}

fn narrow_to_u8(v: i16) -> u8 {
    ((i32::from(v) >> 8) + 128) as u8
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
