//! Constants used throughout the library.
//!
//! These encode the fixed physical format of Redbook audio CDs and the
//! sentinel values reported by libcdio.

use crate::types::{Lsn, TrackNum};

/// Samples per second. All Redbook audio CDs run at 44.1 kHz.
pub const SAMPLE_RATE: usize = 44100;

/// Number of channels (stereo)
pub const CHANNELS: usize = 2;

/// Bits per sample
pub const BITS_PER_SAMPLE: usize = 16;

/// Bytes per sample
pub const BYTES_PER_SAMPLE: usize = BITS_PER_SAMPLE / 8;

/// Sectors (audio frames) per second of audio.
///
/// Redbook track offsets are given as MM:SS:FF where FF counts these
/// 1/75 s units. They are unrelated to the 33-byte channel data frames.
pub const SECTORS_PER_SECOND: usize = 75;

/// Stereo sample frames in one sector (588)
pub const SAMPLES_PER_SECTOR: usize = SAMPLE_RATE / SECTORS_PER_SECOND;

/// Bytes of audio in one sector (2352)
pub const BYTES_PER_SECTOR: usize =
    SAMPLE_RATE * CHANNELS * BYTES_PER_SAMPLE / SECTORS_PER_SECOND;

/// Maximum number of tracks on a CD
pub const MAX_TRACKS: usize = 99;

/// Speed multiplier that asks the drive to read as fast as it can
pub const FULL_SPEED: i32 = -1;

/// Retries per failed sector when none are configured
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// libcdio's marker for an unreadable sector address
pub const INVALID_LSN: Lsn = -45301;

/// libcdio's marker for an unreadable track number
pub const INVALID_TRACK: TrackNum = 0xFF;

/// Version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
