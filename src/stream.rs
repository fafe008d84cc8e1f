//! Seekable PCM stream over an audio CD.
//!
//! [`AudioCd`] turns byte-addressed reads and seeks into whole-sector drive
//! reads. It keeps the tail of the last sector it fetched in a read-ahead
//! buffer so arbitrary byte offsets cost at most one extra sector.
//!
//! Two offsets describe the stream: `true_offset` is the position the
//! caller sees and `buffered_offset` is how far the drive has been read.
//! The bytes between them are exactly the unread bytes in the buffer, and
//! `buffered_offset` always sits on a sector boundary.

use std::io::{self, Read, Seek, SeekFrom};

use crate::{
    cdda::{self, CdromDrive, DriveOptions, SimulatedDisc},
    constants::{BYTES_PER_SECTOR, FULL_SPEED},
    error::{Error, Result},
    message::Messenger,
    sector,
    types::{Lsn, MessageDest, ReadMode, TrackNum, TrackPosition},
};

/// Where sessions come from when the stream is opened.
#[derive(Debug, Clone)]
enum DriveSource {
    /// The device named in the options, or the default drive
    Device,
    /// An in-memory disc
    Simulated(SimulatedDisc),
}

/// Reads PCM audio from a CD-DA disc.
///
/// The stream must be opened with [`AudioCd::open`] before use. Data is
/// signed 16-bit little-endian stereo at 44.1 kHz with no container.
///
/// `AudioCd` implements [`Read`] and [`Seek`]. It is not meant to be
/// shared between threads; every operation takes `&mut self`.
#[derive(Debug)]
pub struct AudioCd {
    options: DriveOptions,
    source: DriveSource,
    drive: Option<CdromDrive>,
    messages: Messenger,

    /// Read-ahead data; bytes before `pos` are already consumed
    buf: Vec<u8>,
    pos: usize,
    /// Reused for every device read
    scratch: Vec<u8>,
    buffered_offset: u64,
    true_offset: u64,
    /// Disc length in bytes, fetched on first use per session
    disc_bytes: Option<u64>,
    /// Device failure hit after a partial read, returned by the next read
    pending_error: Option<Error>,
}

impl Default for AudioCd {
    fn default() -> Self {
        Self::new(DriveOptions::default())
    }
}

impl AudioCd {
    /// A closed stream that will open the drive named in `options`.
    #[must_use]
    pub fn new(options: DriveOptions) -> Self {
        Self::with_source(options, DriveSource::Device)
    }

    /// A closed stream over the drive at `path`.
    #[must_use]
    pub fn with_device(path: &str) -> Self {
        Self::new(DriveOptions {
            device: Some(path.to_string()),
            ..DriveOptions::default()
        })
    }

    /// A closed stream that reads from an in-memory disc.
    #[must_use]
    pub fn simulated(disc: SimulatedDisc, options: DriveOptions) -> Self {
        Self::with_source(options, DriveSource::Simulated(disc))
    }

    fn with_source(options: DriveOptions, source: DriveSource) -> Self {
        let messages = Messenger::new(options.error_dest, options.message_dest);
        Self {
            options,
            source,
            drive: None,
            messages,
            buf: Vec::new(),
            pos: 0,
            scratch: Vec::new(),
            buffered_offset: 0,
            true_offset: 0,
            disc_bytes: None,
            pending_error: None,
        }
    }

    /// Open a session on the drive and prepare for reading from sector 0.
    ///
    /// Does nothing if already open. This does not control the tray.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoDrive` if no usable drive or disc is found, or the
    /// driver error if the read speed cannot be set.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let mut drive = match &self.source {
            DriveSource::Device => open_device(&self.options),
            DriveSource::Simulated(disc) => CdromDrive::open_simulated(disc.clone(), &self.options),
        }
        .map_err(|e| {
            self.messages.error(format_args!("open failed: {e}"));
            e
        })?;

        if let Err(e) = drive.set_speed(FULL_SPEED) {
            self.messages.absorb(drive.messages_mut());
            return Err(e);
        }

        self.reset();
        self.buf.reserve(BYTES_PER_SECTOR);
        self.drive = Some(drive);
        Ok(())
    }

    /// Whether a drive session is held. This does not reflect the tray.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.drive.as_ref().is_some_and(CdromDrive::is_open)
    }

    fn drive(&self) -> Result<&CdromDrive> {
        self.drive
            .as_ref()
            .filter(|d| d.is_open())
            .ok_or(Error::NotOpen)
    }

    fn drive_mut(&mut self) -> Result<&mut CdromDrive> {
        self.drive
            .as_mut()
            .filter(|d| d.is_open())
            .ok_or(Error::NotOpen)
    }

    /// Release the drive. Buffered data is discarded.
    ///
    /// Closing a closed stream is a no-op. This does not control the tray.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` mirrors the other lifecycle calls.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut drive) = self.drive.take() {
            drive.close();
            self.messages.absorb(drive.messages_mut());
        }
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.buffered_offset = 0;
        self.true_offset = 0;
        self.disc_bytes = None;
        self.pending_error = None;
    }

    /// Eject the disc, then close the stream whether or not the eject worked.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotOpen` if closed, or the driver's eject failure.
    pub fn eject_media(&mut self) -> Result<()> {
        let result = self.drive_mut().and_then(CdromDrive::eject);
        self.close()?;
        result
    }

    /// Close the tray of `device`, or the default drive. Needs no session.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the tray cannot be closed.
    pub fn close_tray(device: Option<&str>) -> Result<()> {
        cdda::close_tray(device)
    }

    /// Vendor, model and revision of the drive. Empty when closed or unknown.
    #[must_use]
    pub fn model(&self) -> String {
        self.drive().map(CdromDrive::model).unwrap_or_default()
    }

    /// Number of tracks on the disc (at most 99).
    ///
    /// # Errors
    ///
    /// Returns `Error::NotOpen` if closed, or `TocError::IllegalTrackCount`
    /// if the drive reports more than 99 tracks.
    pub fn track_count(&self) -> Result<TrackNum> {
        self.drive()?.track_count()
    }

    /// Table of contents, freshly queried from the drive.
    ///
    /// Has one entry per track, [`AudioCd::track_count`] in total.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotOpen` if closed or `Error::InvalidToc` for
    /// malformed data.
    pub fn toc(&mut self) -> Result<Vec<TrackPosition>> {
        self.drive_mut()?.toc()
    }

    /// Total sectors on the disc: the sector after the end of the last track.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`AudioCd::toc`].
    pub fn length_sectors(&mut self) -> Result<u64> {
        let toc = self.toc()?;
        Ok(toc
            .last()
            .map_or(0, |t| u64::try_from(t.end_sector()).unwrap_or(0)))
    }

    /// Sector where the first audio track starts.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoAudioTracks` for a disc without audio.
    pub fn first_audio_sector(&mut self) -> Result<Lsn> {
        self.toc()?
            .iter()
            .find(|t| t.is_audio())
            .map(|t| t.start_sector)
            .ok_or(Error::NoAudioTracks)
    }

    /// Track containing `sector`, or `None` if it lies outside every track.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotOpen` if closed.
    pub fn track_at_sector(&mut self, sector: i64) -> Result<Option<TrackNum>> {
        Ok(self
            .toc()?
            .iter()
            .find(|t| t.contains_sector(sector))
            .map(|t| t.track))
    }

    /// Set the read speed multiplier. 1x is real time (75 sectors/s);
    /// `FULL_SPEED`, the default, reads as fast as possible.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotOpen` if closed, or the driver error.
    pub fn set_speed(&mut self, speed: i32) -> Result<()> {
        self.drive_mut()?.set_speed(speed)
    }

    /// Set how hard the drive works to correct read errors.
    ///
    /// Applies to the open session and to later opens.
    pub fn set_read_mode(&mut self, mode: ReadMode) {
        self.options.read_mode = mode;
        if let Some(drive) = self.drive.as_mut() {
            drive.set_read_mode(mode);
        }
    }

    #[must_use]
    pub fn read_mode(&self) -> ReadMode {
        self.options.read_mode
    }

    /// Set retries per failed sector. Negative disables retries, 0 uses the
    /// default of 20.
    pub fn set_max_retries(&mut self, max_retries: i32) {
        self.options.max_retries = max_retries;
        if let Some(drive) = self.drive.as_mut() {
            drive.set_max_retries(max_retries);
        }
    }

    /// Route error and diagnostic messages.
    pub fn set_verbose(&mut self, error_dest: MessageDest, message_dest: MessageDest) {
        self.options.error_dest = error_dest;
        self.options.message_dest = message_dest;
        self.messages.set_verbose(error_dest, message_dest);
        if let Some(drive) = self.drive.as_mut() {
            drive.messages_mut().set_verbose(error_dest, message_dest);
        }
    }

    /// Drain messages logged with `MessageDest::LogIt`.
    pub fn take_messages(&mut self) -> Vec<String> {
        self.collect_drive_messages();
        self.messages.take_messages()
    }

    /// Drain error messages logged with `MessageDest::LogIt`.
    pub fn take_errors(&mut self) -> Vec<String> {
        self.collect_drive_messages();
        self.messages.take_errors()
    }

    fn collect_drive_messages(&mut self) {
        if let Some(drive) = self.drive.as_mut() {
            self.messages.absorb(drive.messages_mut());
        }
    }

    /// Current logical byte offset.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.true_offset
    }

    /// The open drive session, if any.
    #[must_use]
    pub fn drive_session(&self) -> Option<&CdromDrive> {
        self.drive.as_ref()
    }

    fn unread(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn disc_bytes(&mut self) -> Result<u64> {
        if let Some(bytes) = self.disc_bytes {
            return Ok(bytes);
        }
        let bytes = sector::sector_start(self.length_sectors()?);
        self.disc_bytes = Some(bytes);
        Ok(bytes)
    }

    /// Move the cursor to an arbitrary byte offset.
    ///
    /// Seeking forward within buffered data costs nothing. Any other seek
    /// drops the buffer and re-reads the sector holding the target byte.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotOpen` if closed, `Error::SeekOutOfRange` for a
    /// target outside the disc, or the read error while re-buffering. After
    /// a read error the cursor sits at the start of the target sector.
    pub fn seek_to(&mut self, pos: SeekFrom) -> Result<u64> {
        self.drive()?;

        let end = self.disc_bytes()?;
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.true_offset) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(end) + i128::from(delta),
        };
        let new_offset = match u64::try_from(target) {
            Ok(offset) if offset <= end => offset,
            _ => {
                let shown = i64::try_from(target).unwrap_or(i64::MAX);
                return Err(Error::SeekOutOfRange(shown));
            }
        };

        if new_offset == self.true_offset {
            return Ok(self.true_offset);
        }

        self.pending_error = None;

        if new_offset > self.true_offset && new_offset < self.buffered_offset {
            self.consume((new_offset - self.true_offset) as usize);
            return Ok(self.true_offset);
        }

        let sector_offset = sector::sector_floor(new_offset);
        self.buf.clear();
        self.pos = 0;
        self.buffered_offset = sector_offset;
        self.true_offset = sector_offset;
        self.messages.message(format_args!(
            "seek to byte {new_offset}: repositioning at sector {}",
            sector::sector_of(sector_offset)
        ));

        if sector_offset < end {
            self.buffer_sectors(1)?;
        }
        self.consume((new_offset - sector_offset) as usize);
        Ok(self.true_offset)
    }

    /// Move the cursor to the start of `sector`, e.g. a track's first sector.
    ///
    /// # Errors
    ///
    /// Same as [`AudioCd::seek_to`].
    pub fn seek_to_sector(&mut self, sector: u64) -> Result<u64> {
        self.seek_to(SeekFrom::Start(sector::sector_start(sector)))
    }

    /// Advance the cursor over `n` unread buffered bytes.
    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.unread());
        self.pos += n;
        self.true_offset += n as u64;
    }

    /// Fill `out` with audio from the cursor onward.
    ///
    /// Returns the bytes copied, which is less than `out.len()` only at the
    /// end of the disc or when a device error stopped the read part way.
    /// In the latter case the error is returned by the next call.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotOpen` if closed, or the device error when no
    /// bytes could be copied.
    pub fn read_audio(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }
        self.drive()?;

        let mut filled = 0;
        let mut failure = None;
        while filled < out.len() {
            let available = self.unread();
            if available > 0 {
                let n = available.min(out.len() - filled);
                out[filled..filled + n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
                self.consume(n);
                filled += n;
                continue;
            }
            if failure.is_some() {
                break;
            }

            let end = self.disc_bytes()?;
            let left = sector::sector_of(end)
                .saturating_sub(sector::sector_of(self.buffered_offset));
            if left == 0 {
                break;
            }
            let wanted = sector::sectors_for_request(out.len() - filled) as u64;
            // sectors read before the failure are still buffered and served first
            failure = self.buffer_sectors(wanted.min(left) as usize).err();
        }

        match failure {
            Some(e) if filled == 0 => Err(e),
            Some(e) => {
                self.pending_error = Some(e);
                Ok(filled)
            }
            None => Ok(filled),
        }
    }

    /// Read `count` sectors at `buffered_offset` and append them to the buffer.
    ///
    /// Sectors read before a failure are kept.
    fn buffer_sectors(&mut self, count: usize) -> Result<()> {
        let wanted = count * BYTES_PER_SECTOR;
        if self.scratch.len() < wanted {
            self.scratch.resize(wanted, 0);
        }

        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }

        let start = sector::sector_of(self.buffered_offset) as Lsn;
        let drive = self.drive.as_mut().ok_or(Error::NotOpen)?;
        let (n, result) = drive.read_sectors_counted(start, &mut self.scratch[..wanted]);

        self.buffered_offset += n as u64;
        self.buf.extend_from_slice(&self.scratch[..n]);

        if let Err(e) = &result {
            self.messages
                .error(format_args!("read of {count} sectors at {start} failed: {e}"));
        }
        result
    }
}

impl Read for AudioCd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_audio(buf)?)
    }
}

impl Seek for AudioCd {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.seek_to(pos)?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.true_offset)
    }
}

impl Drop for AudioCd {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Open the named device. Without a name, use the first drive holding an
/// audio disc, then the default drive.
fn open_device(options: &DriveOptions) -> Result<CdromDrive> {
    if options.device.is_none() {
        if let Some(drive) = cdda::find_a_cdrom(options) {
            return Ok(drive);
        }
    }
    CdromDrive::open(options)
}

/// Library version string.
#[must_use]
pub fn version() -> &'static str {
    crate::constants::VERSION
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::DriverError;

    const SECTOR: usize = BYTES_PER_SECTOR;

    /// Byte expected at absolute stream offset `offset`.
    fn expected(offset: usize) -> u8 {
        (offset % 251) as u8
    }

    fn two_track_disc() -> SimulatedDisc {
        let mut disc = SimulatedDisc::with_audio_tracks(&[100, 150]);
        disc.fill_with(|lsn, i| expected(lsn as usize * SECTOR + i));
        disc
    }

    fn options() -> DriveOptions {
        DriveOptions {
            read_mode: ReadMode::DISABLE,
            backoff_delay: Duration::ZERO,
            error_dest: MessageDest::LogIt,
            message_dest: MessageDest::LogIt,
            ..DriveOptions::default()
        }
    }

    fn open_cd(disc: SimulatedDisc) -> AudioCd {
        let mut cd = AudioCd::simulated(disc, options());
        cd.open().unwrap();
        cd
    }

    fn reads(cd: &AudioCd) -> Vec<(Lsn, usize)> {
        cd.drive_session().unwrap().simulated_reads().to_vec()
    }

    fn assert_consistent(cd: &AudioCd) {
        assert!(cd.buffered_offset >= cd.true_offset);
        assert_eq!((cd.buffered_offset - cd.true_offset) as usize, cd.unread());
        assert_eq!(cd.buffered_offset % SECTOR as u64, 0);
    }

    fn assert_bytes_at(data: &[u8], offset: usize) {
        for (i, &b) in data.iter().enumerate() {
            assert_eq!(b, expected(offset + i), "byte at offset {}", offset + i);
        }
    }

    #[test]
    fn test_open_is_idempotent() {
        let mut cd = open_cd(two_track_disc());
        assert!(cd.is_open());
        cd.open().unwrap();
        assert!(cd.is_open());
        assert_eq!(cd.drive_session().unwrap().simulated_speed(), Some(FULL_SPEED));
        assert_eq!(cd.model(), "Simulated CD-ROM 1.0");
    }

    #[test]
    fn test_open_without_media() {
        let mut cd = AudioCd::simulated(SimulatedDisc::no_media(), options());
        assert!(matches!(cd.open(), Err(Error::NoDrive)));
        assert!(!cd.is_open());
        assert_eq!(cd.take_errors().len(), 1);
    }

    #[test]
    fn test_not_open() {
        let mut cd = AudioCd::simulated(two_track_disc(), options());
        let mut buf = [0u8; 16];
        assert!(matches!(cd.read_audio(&mut buf), Err(Error::NotOpen)));
        assert!(matches!(cd.seek_to(SeekFrom::Start(0)), Err(Error::NotOpen)));
        assert!(matches!(cd.toc(), Err(Error::NotOpen)));
        assert!(matches!(cd.length_sectors(), Err(Error::NotOpen)));
        assert!(matches!(cd.track_count(), Err(Error::NotOpen)));
        assert!(matches!(cd.track_at_sector(-1), Err(Error::NotOpen)));
        assert!(matches!(cd.set_speed(4), Err(Error::NotOpen)));
        assert!(matches!(cd.eject_media(), Err(Error::NotOpen)));
        assert_eq!(cd.model(), "");

        let err = cd.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut cd = open_cd(two_track_disc());
        let mut buf = [0u8; 100];
        cd.read_audio(&mut buf).unwrap();
        cd.close().unwrap();
        assert!(!cd.is_open());
        assert_eq!(cd.position(), 0);
        assert_eq!(cd.unread(), 0);
        cd.close().unwrap();
        assert!(!cd.is_open());
    }

    #[test]
    fn test_toc_and_tracks() {
        let mut cd = open_cd(two_track_disc());
        let toc = cd.toc().unwrap();
        assert_eq!(toc.len(), 2);
        assert_eq!(toc.len(), usize::from(cd.track_count().unwrap()));
        assert_eq!(cd.length_sectors().unwrap(), 250);
        assert_eq!(cd.first_audio_sector().unwrap(), 0);

        assert_eq!(cd.track_at_sector(0).unwrap(), Some(1));
        assert_eq!(cd.track_at_sector(99).unwrap(), Some(1));
        assert_eq!(cd.track_at_sector(100).unwrap(), Some(2));
        assert_eq!(cd.track_at_sector(150).unwrap(), Some(2));
        assert_eq!(cd.track_at_sector(300).unwrap(), None);
        assert_eq!(cd.track_at_sector(-1).unwrap(), None);
    }

    #[test]
    fn test_seek_to_track_start() {
        let mut cd = open_cd(two_track_disc());
        let start = cd.toc().unwrap()[1].start_sector;
        let pos = cd.seek_to_sector(start as u64).unwrap();
        assert_eq!(pos, 100 * SECTOR as u64);

        let mut sector = vec![0u8; SECTOR];
        assert_eq!(cd.read_audio(&mut sector).unwrap(), SECTOR);
        assert_bytes_at(&sector, 100 * SECTOR);
        assert_eq!(reads(&cd), vec![(100, SECTOR)]);
        assert_consistent(&cd);
    }

    #[test]
    fn test_seek_within_buffer_reads_nothing() {
        let mut cd = open_cd(two_track_disc());
        assert_eq!(cd.seek_to(SeekFrom::Start(SECTOR as u64 * 3)).unwrap(), 3 * SECTOR as u64);
        assert_eq!(reads(&cd).len(), 1);

        let pos = cd.seek_to(SeekFrom::Current(5)).unwrap();
        assert_eq!(pos, 3 * SECTOR as u64 + 5);
        assert_eq!(reads(&cd).len(), 1);
        assert_consistent(&cd);

        let mut buf = [0u8; 10];
        cd.read_audio(&mut buf).unwrap();
        assert_bytes_at(&buf, 3 * SECTOR + 5);
        assert_eq!(reads(&cd).len(), 1);
    }

    #[test]
    fn test_seek_to_current_is_noop() {
        let mut cd = open_cd(two_track_disc());
        cd.seek_to(SeekFrom::Start(1000)).unwrap();
        let before = reads(&cd).len();
        assert_eq!(cd.seek_to(SeekFrom::Start(1000)).unwrap(), 1000);
        assert_eq!(cd.seek_to(SeekFrom::Current(0)).unwrap(), 1000);
        assert_eq!(reads(&cd).len(), before);
    }

    #[test]
    fn test_seek_backwards_rebuffers() {
        let mut cd = open_cd(two_track_disc());
        let mut buf = vec![0u8; SECTOR * 2];
        cd.read_audio(&mut buf).unwrap();

        let pos = cd.seek_to(SeekFrom::Start(10)).unwrap();
        assert_eq!(pos, 10);
        assert_eq!(reads(&cd).last(), Some(&(0, SECTOR)));
        assert_consistent(&cd);

        let mut small = [0u8; 20];
        cd.read_audio(&mut small).unwrap();
        assert_bytes_at(&small, 10);
    }

    #[test]
    fn test_seek_from_end() {
        let mut cd = open_cd(two_track_disc());
        let end = 250 * SECTOR as u64;
        assert_eq!(cd.seek_to(SeekFrom::End(-4)).unwrap(), end - 4);

        let mut buf = [0u8; 16];
        assert_eq!(cd.read_audio(&mut buf).unwrap(), 4);
        assert_bytes_at(&buf[..4], end as usize - 4);
        assert_eq!(cd.read_audio(&mut buf).unwrap(), 0);

        assert_eq!(cd.seek_to(SeekFrom::End(0)).unwrap(), end);
        assert_eq!(cd.read_audio(&mut buf).unwrap(), 0);
        assert_consistent(&cd);
    }

    #[test]
    fn test_seek_out_of_range() {
        let mut cd = open_cd(two_track_disc());
        cd.seek_to(SeekFrom::Start(77)).unwrap();
        assert!(matches!(
            cd.seek_to(SeekFrom::Current(-78)),
            Err(Error::SeekOutOfRange(-1))
        ));
        assert!(matches!(
            cd.seek_to(SeekFrom::End(1)),
            Err(Error::SeekOutOfRange(_))
        ));
        assert_eq!(cd.position(), 77);
        assert_consistent(&cd);

        let err = cd.seek(SeekFrom::Current(-100)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_partial_sector_read_leaves_remainder_buffered() {
        let mut cd = open_cd(two_track_disc());
        let len = SECTOR * 3 + SECTOR / 2;
        let mut buf = vec![0u8; len];
        assert_eq!(cd.read_audio(&mut buf).unwrap(), len);
        assert_bytes_at(&buf, 0);

        assert_eq!(reads(&cd), vec![(0, SECTOR * 4)]);
        assert_eq!(cd.unread(), SECTOR / 2);
        assert_consistent(&cd);

        let mut rest = vec![0u8; SECTOR / 2];
        assert_eq!(cd.read_audio(&mut rest).unwrap(), SECTOR / 2);
        assert_bytes_at(&rest, len);
        assert_eq!(reads(&cd).len(), 1);
    }

    #[test]
    fn test_chunking_invariance() {
        let total = SECTOR * 5 + 123;

        let mut whole_cd = open_cd(two_track_disc());
        let mut whole = vec![0u8; total];
        assert_eq!(whole_cd.read_audio(&mut whole).unwrap(), total);

        let mut chunked_cd = open_cd(two_track_disc());
        let mut chunked = Vec::new();
        for size in [1usize, 7, SECTOR - 8, 3000, SECTOR * 2, 5000].iter().cycle() {
            if chunked.len() >= total {
                break;
            }
            let mut piece = vec![0u8; (*size).min(total - chunked.len())];
            let n = chunked_cd.read_audio(&mut piece).unwrap();
            assert_eq!(n, piece.len());
            chunked.extend_from_slice(&piece);
            assert_consistent(&chunked_cd);
        }
        assert_eq!(whole, chunked);
    }

    #[test]
    fn test_seek_matches_skip() {
        for offset in [0usize, 1, SECTOR - 1, SECTOR, SECTOR * 7 + 999, SECTOR * 249 + 10] {
            let mut sought = open_cd(two_track_disc());
            sought.seek_to(SeekFrom::Start(offset as u64)).unwrap();
            let mut a = vec![0u8; 500];
            let n = sought.read_audio(&mut a).unwrap();

            let mut skipped = open_cd(two_track_disc());
            let mut discard = vec![0u8; offset];
            skipped.read_audio(&mut discard).unwrap();
            let mut b = vec![0u8; 500];
            let m = skipped.read_audio(&mut b).unwrap();

            assert_eq!(n, m);
            assert_eq!(a[..n], b[..m], "offset {offset}");
        }
    }

    #[test]
    fn test_device_reads_are_whole_sectors() {
        let mut cd = open_cd(two_track_disc());
        let mut buf = vec![0u8; 777];
        cd.read_audio(&mut buf).unwrap();
        cd.seek_to(SeekFrom::Start(SECTOR as u64 * 50 + 3)).unwrap();
        cd.read_audio(&mut buf).unwrap();
        cd.seek_to(SeekFrom::Current(-2000)).unwrap();
        let mut big = vec![0u8; SECTOR * 3 + 1];
        cd.read_audio(&mut big).unwrap();

        let reads = reads(&cd);
        assert!(!reads.is_empty());
        assert!(reads.iter().all(|&(_, len)| len > 0 && len % SECTOR == 0));
    }

    #[test]
    fn test_read_stops_at_end_of_disc() {
        let mut cd = open_cd(SimulatedDisc::with_audio_tracks(&[3]));
        let mut buf = vec![0u8; SECTOR * 10];
        assert_eq!(cd.read_audio(&mut buf).unwrap(), SECTOR * 3);
        assert_eq!(cd.read(&mut buf).unwrap(), 0);
        assert_eq!(reads(&cd), vec![(0, SECTOR * 3)]);
    }

    #[test]
    fn test_partial_read_then_error() {
        let mut disc = two_track_disc();
        disc.break_sector(2);
        let mut cd = open_cd(disc);

        // a one-sector read fetches sectors 0 and 1
        let mut sector = vec![0u8; SECTOR];
        assert_eq!(cd.read_audio(&mut sector).unwrap(), SECTOR);
        assert_eq!(cd.read_audio(&mut sector).unwrap(), SECTOR);
        assert_bytes_at(&sector, SECTOR);

        // sectors 2 and 3 are read together and the drive fails on 2
        assert!(matches!(
            cd.read_audio(&mut sector),
            Err(Error::Driver(DriverError::MmcSenseData))
        ));
        assert_eq!(cd.position(), SECTOR as u64 * 2);
        assert_consistent(&cd);
    }

    #[test]
    fn test_short_read_reports_count_then_error() {
        let mut disc = two_track_disc();
        disc.break_sector(1);
        let mut cd = open_cd(disc);
        cd.set_read_mode(ReadMode::RETRY | ReadMode::NEVERSKIP);
        cd.set_max_retries(-1);

        let mut buf = vec![0u8; SECTOR * 3];
        assert_eq!(cd.read_audio(&mut buf).unwrap(), SECTOR);
        assert_bytes_at(&buf[..SECTOR], 0);
        assert!(matches!(
            cd.read_audio(&mut buf),
            Err(Error::SectorSkip(1, 0))
        ));
        assert_consistent(&cd);
    }

    #[test]
    fn test_seek_failure_leaves_state_consistent() {
        let mut disc = two_track_disc();
        disc.break_sector(40);
        let mut cd = open_cd(disc);

        let target = SECTOR as u64 * 40 + 17;
        assert!(cd.seek_to(SeekFrom::Start(target)).is_err());
        assert_eq!(cd.position(), SECTOR as u64 * 40);
        assert_eq!(cd.unread(), 0);
        assert_consistent(&cd);

        cd.seek_to(SeekFrom::Start(SECTOR as u64 * 41)).unwrap();
        let mut buf = [0u8; 8];
        cd.read_audio(&mut buf).unwrap();
        assert_bytes_at(&buf, SECTOR * 41);
    }

    #[test]
    fn test_io_traits() {
        let mut cd = open_cd(two_track_disc());
        cd.seek(SeekFrom::Start(SECTOR as u64 + 1)).unwrap();
        assert_eq!(cd.stream_position().unwrap(), SECTOR as u64 + 1);

        let mut buf = vec![0u8; 4000];
        cd.read_exact(&mut buf).unwrap();
        assert_bytes_at(&buf, SECTOR + 1);

        let mut track = Vec::new();
        cd.seek(SeekFrom::Start(SECTOR as u64 * 248)).unwrap();
        cd.read_to_end(&mut track).unwrap();
        assert_eq!(track.len(), SECTOR * 2);
        assert_bytes_at(&track, SECTOR * 248);
    }

    #[test]
    fn test_eject_closes_even_on_failure() {
        let mut cd = open_cd(two_track_disc());
        cd.eject_media().unwrap();
        assert!(!cd.is_open());

        let mut disc = two_track_disc();
        disc.fail_eject(DriverError::NotPermitted);
        let mut cd = open_cd(disc);
        assert!(matches!(
            cd.eject_media(),
            Err(Error::Driver(DriverError::NotPermitted))
        ));
        assert!(!cd.is_open());
    }

    #[test]
    fn test_reopen_starts_at_zero() {
        let mut cd = open_cd(two_track_disc());
        cd.seek_to(SeekFrom::Start(5000)).unwrap();
        cd.close().unwrap();
        cd.open().unwrap();
        assert_eq!(cd.position(), 0);
        let mut buf = [0u8; 4];
        cd.read_audio(&mut buf).unwrap();
        assert_bytes_at(&buf, 0);
    }

    #[test]
    fn test_messages_are_logged() {
        let mut cd = open_cd(two_track_disc());
        cd.seek_to(SeekFrom::Start(SECTOR as u64 * 9)).unwrap();
        let messages = cd.take_messages();
        assert!(messages.iter().any(|m| m.starts_with("opened drive")));
        assert!(messages.iter().any(|m| m.contains("repositioning at sector 9")));
        assert!(cd.take_messages().is_empty());
    }

    #[test]
    fn test_invalid_toc_surfaces() {
        let mut disc = two_track_disc();
        disc.set_first_track(crate::constants::INVALID_TRACK);
        let mut cd = open_cd(disc);
        assert!(matches!(cd.toc(), Err(Error::InvalidToc(_))));
        assert!(matches!(cd.track_at_sector(0), Err(Error::InvalidToc(_))));
        let mut buf = [0u8; 4];
        assert!(matches!(cd.read_audio(&mut buf), Err(Error::InvalidToc(_))));
    }

    #[test]
    fn test_default_options_recover_transient_failure() {
        let mut disc = two_track_disc();
        disc.fail_sector(5, 2);
        disc.corrupt_sector(7, 1);
        let mut cd = AudioCd::simulated(
            disc,
            DriveOptions {
                backoff_delay: Duration::ZERO,
                error_dest: MessageDest::LogIt,
                message_dest: MessageDest::LogIt,
                ..DriveOptions::default()
            },
        );
        cd.open().unwrap();
        assert_eq!(cd.read_mode(), ReadMode::FULL);

        let len = SECTOR * 9 + 100;
        let mut buf = vec![0u8; len];
        assert_eq!(cd.read_audio(&mut buf).unwrap(), len);
        assert_bytes_at(&buf, 0);
        assert_consistent(&cd);

        let reads = reads(&cd);
        assert!(reads.len() > 1);
        assert!(reads.iter().all(|&(_, len)| len > 0 && len % SECTOR == 0));
        assert!(cd.take_errors().is_empty());
        assert!(cd
            .take_messages()
            .iter()
            .any(|m| m.contains("sector 5")));
    }

    #[test]
    fn test_disabled_read_delivers_sectors_before_failure() {
        let mut disc = two_track_disc();
        disc.break_sector(3);
        let mut cd = open_cd(disc);

        let mut buf = vec![0u8; SECTOR * 5];
        assert_eq!(cd.read_audio(&mut buf).unwrap(), SECTOR * 3);
        assert_bytes_at(&buf[..SECTOR * 3], 0);
        assert!(matches!(
            cd.read_audio(&mut buf),
            Err(Error::Driver(DriverError::MmcSenseData))
        ));
        assert_eq!(cd.position(), SECTOR as u64 * 3);
        assert_consistent(&cd);
    }

    #[test]
    fn test_illegal_track_count_is_an_error() {
        let lengths = vec![5u32; crate::constants::MAX_TRACKS + 1];
        let mut cd = open_cd(SimulatedDisc::with_audio_tracks(&lengths));
        let illegal = |r: &Result<_>| {
            matches!(r, Err(Error::InvalidToc(crate::error::TocError::IllegalTrackCount(100))))
        };
        assert!(illegal(&cd.track_count().map(|_| ())));
        assert!(illegal(&cd.toc().map(|_| ())));
        assert!(illegal(&cd.length_sectors().map(|_| ())));
        let mut buf = [0u8; 16];
        assert!(illegal(&cd.read_audio(&mut buf).map(|_| ())));
    }

    #[test]
    #[cfg(not(feature = "libcdio"))]
    fn test_hardware_unavailable() {
        let mut cd = AudioCd::with_device("/dev/cdrom");
        assert!(matches!(cd.open(), Err(Error::NoDrive)));
        let mut cd = AudioCd::default();
        assert!(matches!(cd.open(), Err(Error::NoDrive)));
        assert!(AudioCd::close_tray(None).is_err());
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
