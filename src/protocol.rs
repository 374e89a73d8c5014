use crate::error::CommError;
use crate::types::{ResultFrame, TargetStatus, Zone};
use crate::uld::RawResults;

// -- Bus addressing --
/// Factory default address in 7-bit form.
pub const DEFAULT_I2C_ADDRESS: u8 = 0x29;
/// Factory default address as written in ST documentation (8-bit, R/W bit included).
pub const DEFAULT_I2C_ADDRESS_8BIT: u8 = 0x52;
pub const MAX_CLOCK_HZ: u32 = 1_000_000;

// -- Grid geometry --
/// 4x4 resolution.
pub const ZONE_COUNT: usize = 16;
/// Targets per zone in the default driver build.
pub const DEFAULT_TARGETS_PER_ZONE: usize = 1;
/// Upper bound supported by the vendor driver.
pub const MAX_TARGETS_PER_ZONE: usize = 4;

// -- Liveness probe registers --
pub const REG_PAGE_SELECT: u16 = 0x7FFF;
pub const REG_DEVICE_ID: u16 = 0x0000;
pub const REG_REVISION_ID: u16 = 0x0001;
pub const EXPECTED_DEVICE_ID: u8 = 0xF0;
pub const EXPECTED_REVISION_ID: u8 = 0x02;

// -- Reset timing --
pub const RESET_HOLD_MS: u32 = 100;
pub const RESET_SETTLE_MS: u32 = 100;

/// Convert an 8-bit (R/W included) address to its 7-bit form.
pub fn seven_bit(address_8bit: u8) -> u8 {
    address_8bit >> 1
}

/// Check that `address` is a usable 7-bit address (reserved ranges excluded).
pub fn is_valid_address(address: u8) -> bool {
    (0x08..=0x77).contains(&address)
}

/// Prefix a register write with its 16-bit big-endian index.
pub fn build_write(index: u16, data: &[u8], buf: &mut Vec<u8>) {
    buf.clear();
    buf.reserve(2 + data.len());
    buf.extend_from_slice(&index.to_be_bytes());
    buf.extend_from_slice(data);
}

/// Decode zone `index` from the flat per-target arrays.
///
/// Zone `i` starts at flat offset `i * targets_per_zone`; only target 0 of
/// each zone is reported. `None` if `index` is not a grid zone or the arrays
/// are too short.
pub fn decode_zone(raw: &RawResults, index: usize, targets_per_zone: usize) -> Option<Zone> {
    if index >= ZONE_COUNT {
        return None;
    }
    let offset = index.checked_mul(targets_per_zone)?;
    Some(Zone {
        index: u8::try_from(index).ok()?,
        target: 0,
        target_status: TargetStatus::from(*raw.target_status.get(offset)?),
        distance_mm: *raw.distance_mm.get(offset)?,
    })
}

/// Decode a full 16-zone frame.
pub fn decode_frame(
    raw: &RawResults,
    targets_per_zone: usize,
    sequence: u32,
) -> Result<ResultFrame, CommError> {
    let expected = ZONE_COUNT * targets_per_zone;
    let actual = raw.target_status.len().min(raw.distance_mm.len());
    if targets_per_zone == 0 || actual < expected {
        return Err(CommError::TruncatedFrame { expected, actual });
    }

    let zones: [Zone; ZONE_COUNT] = (0..ZONE_COUNT)
        .map(|i| decode_zone(raw, i, targets_per_zone))
        .collect::<Option<Vec<_>>>()
        .and_then(|zones| zones.try_into().ok())
        .ok_or(CommError::TruncatedFrame { expected, actual })?;
    Ok(ResultFrame {
        sequence,
        stream_count: raw.stream_count,
        zones,
    })
}
