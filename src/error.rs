//! Error types for the library.

use std::io;

use thiserror::Error;

use crate::types::{Lsn, TrackNum};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while streaming CD audio
#[derive(Error, Debug)]
pub enum Error {
    /// No usable drive or medium was found
    #[error("No usable CD drive or audio disc found")]
    NoDrive,

    /// Stream used before open or after close
    #[error("Device not open")]
    NotOpen,

    /// The driver reported a failure
    #[error("Driver error: {0}")]
    Driver(DriverError),

    /// The drive returned malformed table of contents data
    #[error("Invalid table of contents: {0}")]
    InvalidToc(TocError),

    /// No audio tracks on disc
    #[error("No audio tracks on disc")]
    NoAudioTracks,

    /// A device read not sized in whole sectors
    #[error("Read of {0} bytes is not a whole number of sectors")]
    MisalignedRead(usize),

    /// Seek target before the start or past the end of the disc
    #[error("Seek to byte offset {0} is outside the disc")]
    SeekOutOfRange(i64),

    /// Sector skip (after max retries exhausted)
    #[error("Sector skip at LSN {0} after {1} retries")]
    SectorSkip(Lsn, u32),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Driver return codes, as reported by libcdio.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DriverError {
    #[error("driver I/O error")]
    OperationFailed = -1,
    #[error("unimplemented driver operation")]
    Unsupported = -2,
    #[error("driver not initialized")]
    Uninitialized = -3,
    #[error("driver operation not permitted")]
    NotPermitted = -4,
    #[error("bad parameter passed")]
    BadParameter = -5,
    #[error("bad pointer to memory area")]
    BadPointer = -6,
    #[error("driver not available")]
    NoDriver = -7,
    #[error("MMC operation returned sense data")]
    MmcSenseData = -8,
}

impl DriverError {
    /// Map a driver return code to `Ok` or the matching error.
    ///
    /// # Errors
    ///
    /// Returns the decoded error for any non-zero code.
    pub fn check(code: i32) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(Error::Driver(Self::from(code)))
        }
    }
}

impl From<i32> for DriverError {
    fn from(value: i32) -> Self {
        match value {
            -2 => DriverError::Unsupported,
            -3 => DriverError::Uninitialized,
            -4 => DriverError::NotPermitted,
            -5 => DriverError::BadParameter,
            -6 => DriverError::BadPointer,
            -7 => DriverError::NoDriver,
            -8 => DriverError::MmcSenseData,
            _ => DriverError::OperationFailed,
        }
    }
}

impl From<DriverError> for Error {
    fn from(value: DriverError) -> Self {
        Error::Driver(value)
    }
}

/// Malformed table of contents conditions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocError {
    /// The drive could not report the first track number
    #[error("invalid first track number")]
    InvalidFirstTrack,
    /// The drive could not report where a track starts
    #[error("invalid start sector for track {0}")]
    InvalidSectorAddress(TrackNum),
    /// The drive reported a track with no sectors
    #[error("track {0} has zero length")]
    ZeroLengthTrack(TrackNum),
    /// The drive reported more tracks than a disc can hold, or none it could read
    #[error("drive reported an illegal number of tracks ({0})")]
    IllegalTrackCount(usize),
}

impl From<TocError> for Error {
    fn from(value: TocError) -> Self {
        Error::InvalidToc(value)
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        let kind = match value {
            Error::Io(inner) => return inner,
            Error::NotOpen => io::ErrorKind::NotConnected,
            Error::NoDrive => io::ErrorKind::NotFound,
            Error::SeekOutOfRange(_) | Error::MisalignedRead(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, value)
    }
}
