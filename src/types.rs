//! Core type definitions.

use bitflags::bitflags;

use crate::constants::BYTES_PER_SECTOR;

/// Logical Sector Number - absolute sector position on disc
pub type Lsn = i32;

/// Track number (1-99)
pub type TrackNum = u8;

bitflags! {
    /// Per-track flags from the table of contents.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct TrackFlags: u8 {
        /// Audio was mastered with pre-emphasis
        const PREEMPHASIS = 0x01;
        /// Digital copy is permitted
        const COPY_PERMITTED = 0x02;
        /// Data track rather than audio (mixed-mode discs)
        const DATA = 0x04;
    }
}

bitflags! {
    /// Read mode flags controlling the drive's error correction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct ReadMode: i32 {
        /// No correction - a failed read surfaces immediately
        const DISABLE = 0x00;
        /// Read every sector twice and accept it only when both agree
        const VERIFY = 0x01;
        /// Retry failed sectors one at a time
        const RETRY = 0x02;
        /// Surface a sector that exhausted its retries instead of filling silence
        const NEVERSKIP = 0x20;
        /// All supported modes enabled
        const FULL = 0xFF;
    }
}

impl Default for ReadMode {
    fn default() -> Self {
        ReadMode::FULL
    }
}

impl ReadMode {
    /// True if any form of re-reading is enabled.
    #[must_use]
    pub fn corrects(self) -> bool {
        self.intersects(ReadMode::VERIFY | ReadMode::RETRY)
    }
}

/// Message destination options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageDest {
    /// Discard messages
    #[default]
    ForgetIt,
    /// Print messages to stderr
    PrintIt,
    /// Log messages to buffer
    LogIt,
}

/// Table of Contents entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackPosition {
    /// Track number, starting at 1
    pub track: TrackNum,
    /// Address of the sector where the track starts
    pub start_sector: Lsn,
    /// Sectors the track covers, including any pregap before the next track
    pub length_sectors: u32,
    /// Audio channels (2 on every known disc)
    pub channels: u8,
    /// Flag bits
    pub flags: TrackFlags,
}

impl TrackPosition {
    /// Whether the track holds audio. Mixed-mode discs can carry data tracks.
    #[must_use]
    pub fn is_audio(&self) -> bool {
        !self.flags.contains(TrackFlags::DATA)
    }

    #[must_use]
    pub fn is_copy_permitted(&self) -> bool {
        self.flags.contains(TrackFlags::COPY_PERMITTED)
    }

    #[must_use]
    pub fn is_preemphasis_enabled(&self) -> bool {
        self.flags.contains(TrackFlags::PREEMPHASIS)
    }

    /// First sector past the end of the track.
    #[must_use]
    pub fn end_sector(&self) -> i64 {
        i64::from(self.start_sector) + i64::from(self.length_sectors)
    }

    /// Size of the track's audio in bytes.
    #[must_use]
    pub fn length_bytes(&self) -> u64 {
        u64::from(self.length_sectors) * BYTES_PER_SECTOR as u64
    }

    /// Whether `sector` lies within the track bounds.
    #[must_use]
    pub fn contains_sector(&self, sector: i64) -> bool {
        sector >= i64::from(self.start_sector) && sector < self.end_sector()
    }
}
