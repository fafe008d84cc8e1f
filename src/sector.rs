//! Byte offset to sector arithmetic.

use crate::constants::BYTES_PER_SECTOR;

const SECTOR: u64 = BYTES_PER_SECTOR as u64;

/// Sector index holding the byte at `offset`.
#[must_use]
pub const fn sector_of(offset: u64) -> u64 {
    offset / SECTOR
}

/// Largest sector boundary at or below `offset`.
#[must_use]
pub const fn sector_floor(offset: u64) -> u64 {
    offset - offset % SECTOR
}

/// Byte offset of the start of `sector`.
#[must_use]
pub const fn sector_start(sector: u64) -> u64 {
    sector * SECTOR
}

/// Whole sectors fetched to satisfy a request of `len` bytes.
///
/// Always at least one, and always one more than the whole sectors in
/// `len`, so the tail of a request is served from a full sector.
#[must_use]
pub const fn sectors_for_request(len: usize) -> usize {
    len / BYTES_PER_SECTOR + 1
}

/// True if `len` is a positive whole number of sectors.
#[must_use]
pub const fn is_sector_aligned(len: usize) -> bool {
    len != 0 && len % BYTES_PER_SECTOR == 0
}
