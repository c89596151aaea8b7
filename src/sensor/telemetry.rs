use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::DecodeError;

/// Fixed wire size of a telemetry frame.
pub const FRAME_LEN: usize = 18;

/// One decoded air-quality reading. Immutable once constructed; each decode
/// produces a fresh value that replaces the previous one on its node.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    /// Seconds since the unix epoch, device-reported. Nodes without a
    /// real-time clock report zero; the decoder substitutes the central's
    /// wall-clock time instead of propagating it.
    pub capture_timestamp: u64,
    pub raw_concentration: u16,
    pub averaged_concentration: f32,
    pub trend_slope: f32,
}

/// Decode one 18-byte telemetry frame. All multi-byte fields are big-endian;
/// the float fields are raw IEEE-754 bit patterns.
///
/// Pure and stateless, safe to call concurrently for independent frames.
pub fn decode_frame(frame: &[u8]) -> Result<TelemetrySample, DecodeError> {
    if frame.len() < FRAME_LEN {
        return Err(DecodeError::Truncated { actual: frame.len() });
    }

    let device_timestamp = read_u64_be(frame, 0);
    let raw_concentration = u16::from_be_bytes([frame[8], frame[9]]);
    let averaged_concentration = f32::from_bits(read_u32_be(frame, 10));
    let trend_slope = f32::from_bits(read_u32_be(frame, 14));

    if !averaged_concentration.is_finite() {
        return Err(DecodeError::MalformedField { field: "averaged_concentration" });
    }
    if !trend_slope.is_finite() {
        return Err(DecodeError::MalformedField { field: "trend_slope" });
    }

    let capture_timestamp = if device_timestamp == 0 {
        unix_now_seconds()
    } else {
        device_timestamp
    };

    Ok(TelemetrySample {
        capture_timestamp,
        raw_concentration,
        averaged_concentration,
        trend_slope,
    })
}

fn read_u64_be(frame: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&frame[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}

fn read_u32_be(frame: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&frame[offset..offset + 4]);
    u32::from_be_bytes(bytes)
}

fn unix_now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(1)
}
