//! # audiocd
//!
//! A seekable stream of raw PCM audio read from an audio CD, sector by
//! sector, on top of libcdio.
//!
//! The drive only understands whole 2352-byte sectors. [`AudioCd`] accepts
//! reads and seeks at any byte offset, fetches the covering sectors and
//! keeps the unread tail of the last one buffered for the next call.
//!
//! ## Features
//!
//! - [`std::io::Read`] and [`std::io::Seek`] over the whole disc
//! - Table of contents with per-track flags
//! - Retry and verify-by-reread error correction in the drive layer
//! - A simulated drive for running without hardware
//!
//! Real drives need the `libcdio` cargo feature.
//!
//! ## Example
//!
//! ```no_run
//! use std::io::Read;
//!
//! use audiocd::{AudioCd, BYTES_PER_SECTOR};
//!
//! let mut cd = AudioCd::with_device("/dev/cdrom");
//! cd.open().expect("Failed to open drive");
//!
//! // Jump to the start of track 2 and read its first second of audio
//! let toc = cd.toc().expect("Failed to read TOC");
//! cd.seek_to_sector(toc[1].start_sector as u64).expect("Seek failed");
//!
//! let mut pcm = vec![0u8; 75 * BYTES_PER_SECTOR];
//! cd.read_exact(&mut pcm).expect("Read failed");
//! ```

pub mod constants;
pub mod error;
pub mod message;
pub mod sector;
pub mod types;

mod cdda;
mod retry;
mod stream;

pub use cdda::{close_tray, default_device, find_a_cdrom, CdromDrive, DriveOptions, SimulatedDisc};
pub use constants::*;
pub use error::{DriverError, Error, Result, TocError};
pub use stream::{version, AudioCd};
pub use types::*;
