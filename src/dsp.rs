//! Waveform assembly: Hanning windows, gain, overlap-add and crossfade
//! splicing on [`WaveBuffer`]s.
//!
//! All ranges are sample indices (across interleaved channels), never byte
//! offsets.  Window math runs in `f64`; each product is truncated toward zero
//! and clamped to `i16` before it is stored.

use std::f64::consts::PI;

use crate::{error::DspError, wave::WaveBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowShape {
    /// `0.5 - 0.5·cos(2πi/N)`
    Full,
    /// Rising half-lobe, `0.5 - 0.5·cos(πi/(N-1))`: 0 → 1.
    UpHill,
    /// Falling half-lobe, `0.5 - 0.5·cos(π(i+N-1)/(N-1))`: 1 → 0.
    DownHill,
}

/// Generate an `n`-point Hanning window.
///
/// For every `n`, `UpHill[i] + DownHill[i] == 1`.  A one-point half-lobe is
/// `[1.0]` rising and `[0.0]` falling.
pub fn hanning_window(n: usize, shape: WindowShape) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 && shape != WindowShape::Full {
        return vec![if shape == WindowShape::UpHill { 1.0 } else { 0.0 }];
    }
    let half = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let phase = match shape {
                WindowShape::Full => 2.0 * PI * i as f64 / n as f64,
                WindowShape::UpHill => PI * i as f64 / half,
                WindowShape::DownHill => PI * (i + n - 1) as f64 / half,
            };
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}

fn check_range(buf: &WaveBuffer, start: usize, end: usize) -> Result<(), DspError> {
    let count = buf.sample_count();
    if start > end || end > count {
        return Err(DspError::Range { start, end, count });
    }
    Ok(())
}

fn check_format(left: &WaveBuffer, right: &WaveBuffer) -> Result<(), DspError> {
    if left.format() != right.format() {
        return Err(DspError::FormatMismatch {
            left: left.format().to_string(),
            right: right.format().to_string(),
        });
    }
    Ok(())
}

fn scale_sample(buf: &mut WaveBuffer, index: usize, factor: f64) -> Result<(), DspError> {
    let s = buf.sample(index).unwrap_or(0);
    buf.set_sample(index, (f64::from(s) * factor) as i32)?;
    Ok(())
}

/// Multiply samples `start..start + window.len()` by `window`.
pub fn multiply_window(buf: &mut WaveBuffer, start: usize, window: &[f64]) -> Result<(), DspError> {
    let end = start.saturating_add(window.len());
    check_range(buf, start, end)?;
    for (k, &w) in window.iter().enumerate() {
        scale_sample(buf, start + k, w)?;
    }
    Ok(())
}

/// Scale samples in `start..end` by `factor`.
pub fn amplify(buf: &mut WaveBuffer, start: usize, end: usize, factor: f64) -> Result<(), DspError> {
    check_range(buf, start, end)?;
    for i in start..end {
        scale_sample(buf, i, factor)?;
    }
    Ok(())
}

/// `to[i] += from[i]` for every sample of `from`.
pub fn overlap_add(to: &mut WaveBuffer, from: &WaveBuffer) -> Result<(), DspError> {
    check_format(to, from)?;
    let (to_len, from_len) = (to.sample_count(), from.sample_count());
    if to_len < from_len {
        return Err(DspError::TooShort { to: to_len, from: from_len });
    }
    for (i, s) in from.samples().enumerate() {
        let acc = to.sample(i).unwrap_or(0);
        to.set_sample(i, i32::from(acc) + i32::from(s))?;
    }
    Ok(())
}

/// Crossfade two segments into one.
///
/// The longer operand (or `left` when both are the same length) takes the
/// up-hill lobe, the other the down-hill lobe; the result is their sum and
/// has the longer operand's length.
pub fn hanning_overlap(left: &WaveBuffer, right: &WaveBuffer) -> Result<WaveBuffer, DspError> {
    check_format(left, right)?;
    let (longer, shorter) = if left.sample_count() >= right.sample_count() {
        (left, right)
    } else {
        (right, left)
    };

    let mut out = longer.clone();
    out.pad_to_sample_boundary()?;
    let up = hanning_window(out.sample_count(), WindowShape::UpHill);
    multiply_window(&mut out, 0, &up)?;

    let mut other = shorter.clone();
    let down = hanning_window(other.sample_count(), WindowShape::DownHill);
    multiply_window(&mut other, 0, &down)?;

    overlap_add(&mut out, &other)?;
    Ok(out)
}

fn slice(buf: &WaveBuffer, start: usize, end: usize) -> Result<WaveBuffer, DspError> {
    buf.slice_samples(start, end)
        .ok_or(DspError::Range { start, end, count: buf.sample_count() })
}

/// Splice `right` after `left`, crossfading over `overlap` samples.
///
/// The outgoing tail of `left` fades down while the head of `right` fades
/// up.  `overlap` is clamped to the shorter fragment and rounded down to a
/// whole number of frames; the result holds `left + right - overlap` samples.
pub fn concatenate(left: &WaveBuffer, right: &WaveBuffer, overlap: usize) -> Result<WaveBuffer, DspError> {
    check_format(left, right)?;
    let (l, r) = (left.sample_count(), right.sample_count());
    let channels = usize::from(left.format().channels);
    let mut overlap = overlap.min(l).min(r);
    overlap -= overlap % channels;

    let mut out = slice(left, 0, l - overlap)?;
    if overlap > 0 {
        let fade_out = slice(left, l - overlap, l)?;
        let fade_in = slice(right, 0, overlap)?;
        let mixed = hanning_overlap(&fade_in, &fade_out)?;
        out.append_bytes(mixed.as_bytes())?;
    }
    out.append_bytes(slice(right, overlap, r)?.as_bytes())?;
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
