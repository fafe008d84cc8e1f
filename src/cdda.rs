//! CDDA drive interface abstraction.
//!
//! This module provides the drive session the stream reads from. A session
//! is backed either by a simulated in-memory disc, which is always
//! available, or by a real libcdio handle when the `libcdio` feature is
//! enabled.

use std::{collections::HashMap, thread, time::Duration};

#[cfg(feature = "libcdio")]
use std::{
    ffi::{CStr, CString},
    ptr,
};

use crate::{
    constants::{BYTES_PER_SECTOR, INVALID_LSN, INVALID_TRACK, MAX_TRACKS},
    error::{DriverError, Error, Result, TocError},
    message::Messenger,
    retry::{self, RetryAction, RetryTracker, DEFAULT_BACKOFF_DELAY_MS},
    sector,
    types::{Lsn, MessageDest, ReadMode, TrackFlags, TrackNum, TrackPosition},
};

#[cfg(feature = "libcdio")]
use libcdio_sys::{
    cdio_close_tray, cdio_destroy, cdio_eject_media, cdio_free_device_list, cdio_get_devices,
    cdio_get_first_track_num, cdio_get_hwinfo, cdio_get_num_tracks, cdio_get_track_channels,
    cdio_get_track_copy_permit, cdio_get_track_format, cdio_get_track_lsn,
    cdio_get_track_preemphasis, cdio_get_track_sec_count, cdio_hwinfo_t, cdio_open,
    cdio_read_audio_sectors, cdio_set_speed, driver_id_t_DRIVER_DEVICE,
    driver_id_t_DRIVER_UNKNOWN, track_flag_t_CDIO_TRACK_FLAG_TRUE,
    track_format_t_TRACK_FORMAT_AUDIO, CdIo_t, CDIO_INVALID_LSN,
};

/// Settings applied when a drive is opened.
#[derive(Debug, Clone)]
pub struct DriveOptions {
    /// Device path, e.g. `/dev/cdrom`. `None` picks the default drive.
    pub device: Option<String>,
    /// Retries per failed sector. Negative disables retries, 0 uses the default of 20.
    pub max_retries: i32,
    /// Error correction applied to every read
    pub read_mode: ReadMode,
    /// Where error messages go
    pub error_dest: MessageDest,
    /// Where diagnostic messages go
    pub message_dest: MessageDest,
    /// First pause after repeated failures at one sector
    pub backoff_delay: Duration,
}

impl Default for DriveOptions {
    fn default() -> Self {
        Self {
            device: None,
            max_retries: 0,
            read_mode: ReadMode::FULL,
            error_dest: MessageDest::ForgetIt,
            message_dest: MessageDest::ForgetIt,
            backoff_delay: Duration::from_millis(DEFAULT_BACKOFF_DELAY_MS),
        }
    }
}

/// A track as laid out on a simulated disc.
#[derive(Debug, Clone, Copy)]
struct SimulatedTrack {
    start: Lsn,
    length: u32,
    flags: TrackFlags,
}

/// In-memory disc served by the simulated backend.
///
/// Sectors not explicitly loaded read back as silence. Read failures,
/// corrupted reads and malformed TOC entries can be injected to exercise
/// error paths without hardware.
#[derive(Debug, Clone)]
pub struct SimulatedDisc {
    model: String,
    has_media: bool,
    first_track: TrackNum,
    tracks: Vec<SimulatedTrack>,
    sectors: HashMap<Lsn, Vec<u8>>,
    /// Remaining failed reads per sector (`u32::MAX` never recovers)
    failures: HashMap<Lsn, u32>,
    /// Remaining reads per sector that return damaged data
    corruptions: HashMap<Lsn, u32>,
    eject_error: Option<DriverError>,
}

impl Default for SimulatedDisc {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDisc {
    /// An empty disc with media present and no tracks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: "Simulated CD-ROM 1.0".to_string(),
            has_media: true,
            first_track: 1,
            tracks: Vec::new(),
            sectors: HashMap::new(),
            failures: HashMap::new(),
            corruptions: HashMap::new(),
            eject_error: None,
        }
    }

    /// A drive with no disc inserted.
    #[must_use]
    pub fn no_media() -> Self {
        Self {
            has_media: false,
            ..Self::new()
        }
    }

    /// A disc of contiguous audio tracks starting at sector 0.
    #[must_use]
    pub fn with_audio_tracks(lengths: &[u32]) -> Self {
        let mut disc = Self::new();
        for &length in lengths {
            disc.add_track(length, TrackFlags::COPY_PERMITTED);
        }
        disc
    }

    /// Append a track directly after the last one. Returns its number.
    pub fn add_track(&mut self, length: u32, flags: TrackFlags) -> TrackNum {
        let start = self.tracks.last().map_or(0, |t| t.start + t.length as Lsn);
        self.tracks.push(SimulatedTrack {
            start,
            length,
            flags,
        });
        self.first_track
            .wrapping_add((self.tracks.len() - 1) as TrackNum)
    }

    /// Append a TOC entry exactly as given, valid or not.
    pub fn push_raw_track(&mut self, start: Lsn, length: u32, flags: TrackFlags) {
        self.tracks.push(SimulatedTrack {
            start,
            length,
            flags,
        });
    }

    /// Number reported for the first track (`INVALID_TRACK` simulates a bad TOC).
    pub fn set_first_track(&mut self, track: TrackNum) {
        self.first_track = track;
    }

    pub fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    /// Store the audio for one sector. Short data is padded with silence.
    pub fn load_sector(&mut self, sector: Lsn, mut data: Vec<u8>) {
        data.resize(BYTES_PER_SECTOR, 0);
        self.sectors.insert(sector, data);
    }

    /// Fill every sector of the disc from `byte(sector, index)`.
    pub fn fill_with<F>(&mut self, byte: F)
    where
        F: Fn(Lsn, usize) -> u8,
    {
        for lsn in 0..self.length_sectors() as Lsn {
            let data = (0..BYTES_PER_SECTOR).map(|i| byte(lsn, i)).collect();
            self.sectors.insert(lsn, data);
        }
    }

    /// Make the next `times` reads touching `sector` fail.
    pub fn fail_sector(&mut self, sector: Lsn, times: u32) {
        self.failures.insert(sector, times);
    }

    /// Make every read touching `sector` fail.
    pub fn break_sector(&mut self, sector: Lsn) {
        self.failures.insert(sector, u32::MAX);
    }

    /// Make the next `times` reads of `sector` return damaged data.
    pub fn corrupt_sector(&mut self, sector: Lsn, times: u32) {
        self.corruptions.insert(sector, times);
    }

    /// Make ejecting fail with `error`.
    pub fn fail_eject(&mut self, error: DriverError) {
        self.eject_error = Some(error);
    }

    /// Sectors up to the end of the last track.
    #[must_use]
    pub fn length_sectors(&self) -> i64 {
        self.tracks
            .iter()
            .map(|t| i64::from(t.start) + i64::from(t.length))
            .max()
            .unwrap_or(0)
    }

    fn take_injected(map: &mut HashMap<Lsn, u32>, sector: Lsn) -> bool {
        match map.get_mut(&sector) {
            Some(0) | None => false,
            Some(remaining) if *remaining == u32::MAX => true,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
        }
    }
}

/// Simulated backend state for an opened [`SimulatedDisc`].
#[derive(Debug)]
struct SimulatedBackend {
    disc: SimulatedDisc,
    speed: i32,
    ejected: bool,
    /// Every raw read request as (start sector, byte count)
    reads: Vec<(Lsn, usize)>,
}

impl SimulatedBackend {
    fn read(&mut self, start: Lsn, buf: &mut [u8]) -> Result<()> {
        self.reads.push((start, buf.len()));

        if self.ejected {
            return Err(DriverError::Uninitialized.into());
        }

        let count = (buf.len() / BYTES_PER_SECTOR) as i64;
        if start < 0 || i64::from(start) + count > self.disc.length_sectors() {
            return Err(DriverError::BadParameter.into());
        }

        for (i, chunk) in buf.chunks_exact_mut(BYTES_PER_SECTOR).enumerate() {
            let lsn = start + i as Lsn;
            if SimulatedDisc::take_injected(&mut self.disc.failures, lsn) {
                return Err(DriverError::MmcSenseData.into());
            }
            match self.disc.sectors.get(&lsn) {
                Some(data) => chunk.copy_from_slice(data),
                None => chunk.fill(0),
            }
            if SimulatedDisc::take_injected(&mut self.disc.corruptions, lsn) {
                chunk.iter_mut().for_each(|b| *b ^= 0x5A);
            }
        }
        Ok(())
    }

    fn raw_track(&self, track: TrackNum) -> RawTrack {
        let index = usize::from(track.wrapping_sub(self.disc.first_track));
        self.disc.tracks.get(index).map_or(
            RawTrack {
                start: INVALID_LSN,
                length: 0,
                channels: 2,
                flags: TrackFlags::empty(),
            },
            |t| RawTrack {
                start: t.start,
                length: t.length,
                channels: 2,
                flags: t.flags,
            },
        )
    }
}

/// Real libcdio backend for CD drive access.
#[cfg(feature = "libcdio")]
struct LibcdioBackend {
    /// libcdio handle, null once released
    p_cdio: *mut CdIo_t,
}

#[cfg(feature = "libcdio")]
impl LibcdioBackend {
    fn release(&mut self) {
        if !self.p_cdio.is_null() {
            unsafe {
                cdio_destroy(self.p_cdio);
            }
            self.p_cdio = ptr::null_mut();
        }
    }

    fn handle(&self) -> Result<*mut CdIo_t> {
        if self.p_cdio.is_null() {
            Err(Error::NotOpen)
        } else {
            Ok(self.p_cdio)
        }
    }

    fn raw_track(&self, p_cdio: *mut CdIo_t, track: TrackNum) -> RawTrack {
        let mut flags = TrackFlags::empty();
        unsafe {
            if cdio_get_track_copy_permit(p_cdio, track) == track_flag_t_CDIO_TRACK_FLAG_TRUE {
                flags |= TrackFlags::COPY_PERMITTED;
            }
            if cdio_get_track_preemphasis(p_cdio, track) == track_flag_t_CDIO_TRACK_FLAG_TRUE {
                flags |= TrackFlags::PREEMPHASIS;
            }
            if cdio_get_track_format(p_cdio, track) != track_format_t_TRACK_FORMAT_AUDIO {
                flags |= TrackFlags::DATA;
            }
        }

        let lsn = unsafe { cdio_get_track_lsn(p_cdio, track) };
        let channels = unsafe { cdio_get_track_channels(p_cdio, track) };

        RawTrack {
            start: if lsn == CDIO_INVALID_LSN { INVALID_LSN } else { lsn },
            length: unsafe { cdio_get_track_sec_count(p_cdio, track) },
            channels: u8::try_from(channels).ok().filter(|&c| c > 0).unwrap_or(2),
            flags,
        }
    }
}

#[cfg(feature = "libcdio")]
impl Drop for LibcdioBackend {
    fn drop(&mut self) {
        self.release();
    }
}

/// Backend implementation for drive operations.
enum DriveBackend {
    /// In-memory disc
    Simulated(SimulatedBackend),
    /// Real libcdio backend
    #[cfg(feature = "libcdio")]
    Libcdio(LibcdioBackend),
}

/// TOC entry as reported by a backend, before validation.
struct RawTrack {
    start: Lsn,
    length: u32,
    channels: u8,
    flags: TrackFlags,
}

/// Validate raw entries for `count` tracks starting at `first`.
fn collect_toc<F>(first: TrackNum, count: TrackNum, mut entry: F) -> Result<Vec<TrackPosition>>
where
    F: FnMut(TrackNum) -> RawTrack,
{
    if count == 0 {
        return Ok(Vec::new());
    }
    if first == INVALID_TRACK || first == 0 {
        return Err(TocError::InvalidFirstTrack.into());
    }

    let mut toc = Vec::with_capacity(usize::from(count));
    for i in 0..count {
        let track = first
            .checked_add(i)
            .ok_or(TocError::InvalidFirstTrack)?;
        let raw = entry(track);

        if raw.start == INVALID_LSN || raw.start < 0 {
            return Err(TocError::InvalidSectorAddress(track).into());
        }
        if raw.length == 0 {
            return Err(TocError::ZeroLengthTrack(track).into());
        }

        toc.push(TrackPosition {
            track,
            start_sector: raw.start,
            length_sectors: raw.length,
            channels: raw.channels,
            flags: raw.flags,
        });
    }
    Ok(toc)
}

/// CD-ROM drive session.
///
/// Owns one open handle to a drive. The handle is released by
/// [`CdromDrive::close`] or when the session is dropped.
pub struct CdromDrive {
    /// Device name/path
    pub device_name: Option<String>,
    opened: bool,
    read_mode: ReadMode,
    max_retries: u32,
    backoff_delay: Duration,
    messages: Messenger,
    backend: DriveBackend,
}

// CdromDrive contains a raw pointer but is safe to move across threads:
// libcdio handles are not shared and every call goes through `&mut self`
// or `&self` on the owning thread.
#[cfg(feature = "libcdio")]
unsafe impl Send for CdromDrive {}

impl std::fmt::Debug for CdromDrive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdromDrive")
            .field("device_name", &self.device_name)
            .field("opened", &self.opened)
            .field("read_mode", &self.read_mode)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl CdromDrive {
    fn with_backend(
        device_name: Option<String>,
        backend: DriveBackend,
        options: &DriveOptions,
    ) -> Self {
        let mut drive = Self {
            device_name,
            opened: true,
            read_mode: options.read_mode,
            max_retries: retry::effective_retries(options.max_retries),
            backoff_delay: options.backoff_delay,
            messages: Messenger::new(options.error_dest, options.message_dest),
            backend,
        };
        let name = drive.device_name.clone().unwrap_or_else(|| "default".to_string());
        drive.messages.message(format_args!("opened drive {name}"));
        drive
    }

    /// Open the drive named in `options`, or the default drive.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoDrive` if libcdio cannot open the device.
    #[cfg(feature = "libcdio")]
    pub fn open(options: &DriveOptions) -> Result<Self> {
        let device = options.device.as_deref().filter(|s| !s.is_empty());
        let device_cstr = device
            .map(|s| CString::new(s).map_err(|_| Error::NoDrive))
            .transpose()?;

        let device_ptr = device_cstr.as_ref().map_or(ptr::null(), |s| s.as_ptr());

        let p_cdio = unsafe { cdio_open(device_ptr, driver_id_t_DRIVER_UNKNOWN) };

        if p_cdio.is_null() {
            return Err(Error::NoDrive);
        }

        Ok(Self::with_backend(
            device.map(String::from).or_else(default_device),
            DriveBackend::Libcdio(LibcdioBackend { p_cdio }),
            options,
        ))
    }

    /// Open a drive - there is no hardware backend without libcdio.
    ///
    /// # Errors
    ///
    /// Always returns `Error::NoDrive`.
    #[cfg(not(feature = "libcdio"))]
    pub fn open(options: &DriveOptions) -> Result<Self> {
        let mut messages = Messenger::new(options.error_dest, options.message_dest);
        messages.error(format_args!("built without libcdio support, no drives available"));
        Err(Error::NoDrive)
    }

    /// Open a session on an in-memory disc.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoDrive` if the simulated drive has no media.
    pub fn open_simulated(disc: SimulatedDisc, options: &DriveOptions) -> Result<Self> {
        if !disc.has_media {
            return Err(Error::NoDrive);
        }
        Ok(Self::with_backend(
            Some("simulated".to_string()),
            DriveBackend::Simulated(SimulatedBackend {
                disc,
                speed: 0,
                ejected: false,
                reads: Vec::new(),
            }),
            options,
        ))
    }

    /// Whether the session still holds its handle.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.opened
    }

    fn ensure_open(&self) -> Result<()> {
        if self.opened {
            Ok(())
        } else {
            Err(Error::NotOpen)
        }
    }

    /// Release the drive handle.
    pub fn close(&mut self) {
        if !self.opened {
            return;
        }
        self.opened = false;
        #[cfg(feature = "libcdio")]
        if let DriveBackend::Libcdio(backend) = &mut self.backend {
            backend.release();
        }
        self.messages.message(format_args!("closed drive"));
    }

    /// Vendor, model and revision of the drive. Empty if unknown.
    #[must_use]
    pub fn model(&self) -> String {
        if !self.opened {
            return String::new();
        }
        match &self.backend {
            DriveBackend::Simulated(sim) => sim.disc.model.clone(),
            #[cfg(feature = "libcdio")]
            DriveBackend::Libcdio(backend) => {
                let Ok(p_cdio) = backend.handle() else {
                    return String::new();
                };
                let mut hwinfo: cdio_hwinfo_t = unsafe { std::mem::zeroed() };
                if !unsafe { cdio_get_hwinfo(p_cdio, &mut hwinfo) } {
                    return String::new();
                }
                [
                    &hwinfo.psz_vendor[..],
                    &hwinfo.psz_model[..],
                    &hwinfo.psz_revision[..],
                ]
                .iter()
                .map(|field| c_chars_to_string(field))
                .collect::<Vec<_>>()
                .join(" ")
            }
        }
    }

    /// Number of tracks on the disc.
    ///
    /// # Errors
    ///
    /// Returns `TocError::IllegalTrackCount` if the drive reports more than
    /// `MAX_TRACKS` tracks or cannot tell.
    pub fn track_count(&self) -> Result<TrackNum> {
        self.ensure_open()?;
        let count = match &self.backend {
            DriveBackend::Simulated(sim) => sim.disc.tracks.len(),
            #[cfg(feature = "libcdio")]
            DriveBackend::Libcdio(backend) => {
                usize::from(unsafe { cdio_get_num_tracks(backend.handle()?) })
            }
        };
        match TrackNum::try_from(count) {
            Ok(n) if count <= MAX_TRACKS => Ok(n),
            _ => Err(TocError::IllegalTrackCount(count).into()),
        }
    }

    /// Number of the first track as reported by the drive.
    ///
    /// # Errors
    ///
    /// Returns `TocError::InvalidFirstTrack` if the drive reports the invalid marker.
    pub fn first_track_num(&self) -> Result<TrackNum> {
        self.ensure_open()?;
        let first = match &self.backend {
            DriveBackend::Simulated(sim) => sim.disc.first_track,
            #[cfg(feature = "libcdio")]
            DriveBackend::Libcdio(backend) => unsafe {
                cdio_get_first_track_num(backend.handle()?)
            },
        };
        if first == INVALID_TRACK {
            return Err(TocError::InvalidFirstTrack.into());
        }
        Ok(first)
    }

    /// Read the table of contents from the disc.
    ///
    /// Queries the drive on every call.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidToc` if the drive reports an illegal track
    /// count, an invalid first track, an invalid start sector or a
    /// zero-length track.
    pub fn toc(&mut self) -> Result<Vec<TrackPosition>> {
        self.ensure_open()?;
        let toc = self.track_count().and_then(|count| match &self.backend {
            DriveBackend::Simulated(sim) => {
                collect_toc(sim.disc.first_track, count, |track| sim.raw_track(track))
            }
            #[cfg(feature = "libcdio")]
            DriveBackend::Libcdio(backend) => {
                let p_cdio = backend.handle()?;
                let first = unsafe { cdio_get_first_track_num(p_cdio) };
                collect_toc(first, count, |track| backend.raw_track(p_cdio, track))
            }
        });

        match &toc {
            Ok(tracks) => self
                .messages
                .message(format_args!("read table of contents: {} tracks", tracks.len())),
            Err(e) => self.messages.error(format_args!("{e}")),
        }
        toc
    }

    /// Set the read speed multiplier. `FULL_SPEED` reads as fast as possible.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the drive rejects the speed.
    pub fn set_speed(&mut self, speed: i32) -> Result<()> {
        self.ensure_open()?;
        match &mut self.backend {
            DriveBackend::Simulated(sim) => sim.speed = speed,
            #[cfg(feature = "libcdio")]
            DriveBackend::Libcdio(backend) => {
                let result = unsafe { cdio_set_speed(backend.handle()?, speed) };
                DriverError::check(result)?;
            }
        }
        self.messages.message(format_args!("drive speed set to {speed}"));
        Ok(())
    }

    /// Eject the disc. The handle is unusable afterwards.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the eject fails.
    pub fn eject(&mut self) -> Result<()> {
        self.ensure_open()?;
        let result = match &mut self.backend {
            DriveBackend::Simulated(sim) => match sim.disc.eject_error {
                Some(error) => Err(error.into()),
                None => {
                    sim.ejected = true;
                    Ok(())
                }
            },
            #[cfg(feature = "libcdio")]
            DriveBackend::Libcdio(backend) => {
                let mut p_cdio = backend.handle()?;
                let code = unsafe { cdio_eject_media(&mut p_cdio) };
                // libcdio frees the handle on a successful eject
                backend.p_cdio = p_cdio;
                DriverError::check(code)
            }
        };
        match &result {
            Ok(()) => self.messages.message(format_args!("ejected media")),
            Err(e) => self.messages.error(format_args!("eject failed: {e}")),
        }
        result
    }

    /// Read whole sectors starting at `start` into `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MisalignedRead` if `buf` is not a positive whole
    /// number of sectors, or the read failure.
    pub fn read_sectors(&mut self, start: Lsn, buf: &mut [u8]) -> Result<()> {
        self.read_sectors_counted(start, buf).1
    }

    /// Read whole sectors, reporting how many leading bytes are good.
    ///
    /// On failure the count covers the sectors before the one that failed.
    /// Error correction follows the configured [`ReadMode`].
    pub fn read_sectors_counted(&mut self, start: Lsn, buf: &mut [u8]) -> (usize, Result<()>) {
        if let Err(e) = self.ensure_open() {
            return (0, Err(e));
        }
        if !sector::is_sector_aligned(buf.len()) {
            return (0, Err(Error::MisalignedRead(buf.len())));
        }

        let whole = self.read_raw(start, buf);
        if !self.read_mode.corrects() {
            return match whole {
                Ok(()) => (buf.len(), Ok(())),
                Err(e) => {
                    self.messages
                        .error(format_args!("read at sector {start} failed: {e}"));
                    self.read_good_prefix(start, buf, e)
                }
            };
        }

        let mut suspect = vec![whole.is_err(); buf.len() / BYTES_PER_SECTOR];
        if let Err(e) = &whole {
            self.messages
                .message(format_args!("read at sector {start} failed ({e}), retrying per sector"));
        } else if self.read_mode.contains(ReadMode::VERIFY) {
            let mut check = vec![0u8; buf.len()];
            match self.read_raw(start, &mut check) {
                Ok(()) => {
                    let pairs = buf
                        .chunks_exact(BYTES_PER_SECTOR)
                        .zip(check.chunks_exact(BYTES_PER_SECTOR));
                    for (flag, (a, b)) in suspect.iter_mut().zip(pairs) {
                        *flag = a != b;
                    }
                }
                Err(_) => suspect.fill(true),
            }
        }

        let max_retries = if self.read_mode.contains(ReadMode::RETRY) {
            self.max_retries
        } else {
            0
        };
        let mut tracker = RetryTracker::new(max_retries, self.backoff_delay);

        for (i, chunk) in buf.chunks_exact_mut(BYTES_PER_SECTOR).enumerate() {
            if !suspect[i] {
                continue;
            }
            let lsn = start + i as Lsn;
            if let Err(e) = self.read_sector_corrected(lsn, chunk, &mut tracker) {
                return (i * BYTES_PER_SECTOR, Err(e));
            }
        }
        if tracker.total_errors() > 0 {
            self.messages.message(format_args!(
                "read at sector {start} finished after {} failed attempts, {} backoffs",
                tracker.total_errors(),
                tracker.total_backoffs()
            ));
        }
        (buf.len(), Ok(()))
    }

    /// Read a failed span one sector at a time, once each, to recover the
    /// sectors in front of the bad one.
    fn read_good_prefix(
        &mut self,
        start: Lsn,
        buf: &mut [u8],
        error: Error,
    ) -> (usize, Result<()>) {
        if buf.len() == BYTES_PER_SECTOR {
            return (0, Err(error));
        }
        for (i, chunk) in buf.chunks_exact_mut(BYTES_PER_SECTOR).enumerate() {
            if let Err(e) = self.read_raw(start + i as Lsn, chunk) {
                return (i * BYTES_PER_SECTOR, Err(e));
            }
        }
        self.messages
            .message(format_args!("read at sector {start} succeeded sector by sector"));
        (buf.len(), Ok(()))
    }

    /// Re-read one sector until it reads cleanly or retries run out.
    fn read_sector_corrected(
        &mut self,
        lsn: Lsn,
        chunk: &mut [u8],
        tracker: &mut RetryTracker,
    ) -> Result<()> {
        let verify = self.read_mode.contains(ReadMode::VERIFY);
        let mut check = if verify {
            vec![0u8; BYTES_PER_SECTOR]
        } else {
            Vec::new()
        };

        loop {
            let failure = match self.read_raw(lsn, chunk) {
                Ok(()) if !verify => None,
                Ok(()) => match self.read_raw(lsn, &mut check) {
                    Ok(()) if check.as_slice() == &*chunk => None,
                    Ok(()) => Some("reads disagree".to_string()),
                    Err(e) => Some(e.to_string()),
                },
                Err(e) => Some(e.to_string()),
            };

            let Some(reason) = failure else {
                tracker.record_success(lsn);
                return Ok(());
            };

            match tracker.record_error(lsn) {
                RetryAction::Retry => {
                    self.messages
                        .message(format_args!("sector {lsn}: {reason}, retrying"));
                }
                RetryAction::Backoff(pause) => {
                    self.messages.message(format_args!(
                        "sector {lsn}: {reason}, backing off {}ms",
                        pause.as_millis()
                    ));
                    thread::sleep(pause);
                }
                RetryAction::GiveUp => {
                    let retries = tracker.max_retries();
                    let attempts = tracker.attempts();
                    if self.read_mode.contains(ReadMode::NEVERSKIP) {
                        self.messages.error(format_args!(
                            "sector {lsn}: {reason}, giving up after {attempts} attempts"
                        ));
                        return Err(Error::SectorSkip(lsn, retries));
                    }
                    self.messages.error(format_args!(
                        "sector {lsn}: {reason}, skipped after {attempts} attempts"
                    ));
                    chunk.fill(0);
                    return Ok(());
                }
            }
        }
    }

    fn read_raw(&mut self, start: Lsn, buf: &mut [u8]) -> Result<()> {
        match &mut self.backend {
            DriveBackend::Simulated(sim) => sim.read(start, buf),
            #[cfg(feature = "libcdio")]
            DriveBackend::Libcdio(backend) => {
                let p_cdio = backend.handle()?;
                let sectors = (buf.len() / BYTES_PER_SECTOR) as u32;
                let result = unsafe {
                    cdio_read_audio_sectors(p_cdio, buf.as_mut_ptr().cast(), start, sectors)
                };
                DriverError::check(result)
            }
        }
    }

    /// Change the error correction mode.
    pub fn set_read_mode(&mut self, mode: ReadMode) {
        self.read_mode = mode;
    }

    #[must_use]
    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    /// Change the retry bound. Negative disables retries, 0 uses the default.
    pub fn set_max_retries(&mut self, max_retries: i32) {
        self.max_retries = retry::effective_retries(max_retries);
    }

    /// Message routing for this session.
    pub fn messages_mut(&mut self) -> &mut Messenger {
        &mut self.messages
    }

    /// Raw read requests seen by a simulated backend, as (start sector, bytes).
    ///
    /// Empty for hardware backends.
    #[must_use]
    pub fn simulated_reads(&self) -> &[(Lsn, usize)] {
        match &self.backend {
            DriveBackend::Simulated(sim) => &sim.reads,
            #[cfg(feature = "libcdio")]
            DriveBackend::Libcdio(_) => &[],
        }
    }

    /// Speed last set on a simulated backend.
    #[must_use]
    pub fn simulated_speed(&self) -> Option<i32> {
        match &self.backend {
            DriveBackend::Simulated(sim) => Some(sim.speed),
            #[cfg(feature = "libcdio")]
            DriveBackend::Libcdio(_) => None,
        }
    }
}

impl Drop for CdromDrive {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(feature = "libcdio")]
fn c_chars_to_string(field: &[std::ffi::c_char]) -> String {
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

/// Close the tray of `device`, or of the default drive.
///
/// # Errors
///
/// Returns the driver error if the tray cannot be closed.
#[cfg(feature = "libcdio")]
pub fn close_tray(device: Option<&str>) -> Result<()> {
    let device_cstr = device
        .filter(|s| !s.is_empty())
        .map(|s| CString::new(s).map_err(|_| Error::Driver(DriverError::BadParameter)))
        .transpose()?;
    let device_ptr = device_cstr.as_ref().map_or(ptr::null(), |s| s.as_ptr());
    let code = unsafe { cdio_close_tray(device_ptr, ptr::null_mut()) };
    DriverError::check(code)
}

/// Close a tray - unsupported without libcdio.
///
/// # Errors
///
/// Always returns `DriverError::Unsupported`.
#[cfg(not(feature = "libcdio"))]
pub fn close_tray(_device: Option<&str>) -> Result<()> {
    Err(DriverError::Unsupported.into())
}

/// Get the default CD-ROM device path.
#[cfg(feature = "libcdio")]
#[must_use]
pub fn default_device() -> Option<String> {
    let device_ptr = unsafe { libcdio_sys::cdio_get_default_device(ptr::null()) };
    if device_ptr.is_null() {
        return None;
    }

    let device = unsafe { CStr::from_ptr(device_ptr) }
        .to_str()
        .ok()
        .map(String::from);

    unsafe {
        libc::free(device_ptr.cast());
    }

    device
}

#[cfg(not(feature = "libcdio"))]
#[must_use]
pub fn default_device() -> Option<String> {
    None
}

/// Find a CD-ROM drive with an audio disc.
///
/// Scans available devices and returns a session on the first one whose
/// table of contents lists at least one audio track.
#[cfg(feature = "libcdio")]
#[must_use]
pub fn find_a_cdrom(options: &DriveOptions) -> Option<CdromDrive> {
    let devices = unsafe { cdio_get_devices(driver_id_t_DRIVER_DEVICE) };
    if devices.is_null() {
        return None;
    }

    let mut result: Option<CdromDrive> = None;

    // null-terminated array of char*
    let mut i = 0;
    loop {
        let device_ptr = unsafe { *devices.offset(i) };
        if device_ptr.is_null() {
            break;
        }
        i += 1;

        let Ok(device_name) = unsafe { CStr::from_ptr(device_ptr) }.to_str() else {
            continue;
        };

        let candidate = DriveOptions {
            device: Some(device_name.to_string()),
            ..options.clone()
        };
        if let Ok(mut drive) = CdromDrive::open(&candidate) {
            let has_audio = drive
                .toc()
                .is_ok_and(|toc| toc.iter().any(TrackPosition::is_audio));
            if has_audio {
                result = Some(drive);
                break;
            }
        }
    }

    unsafe { cdio_free_device_list(devices) };

    result
}

/// Find a CD-ROM drive - stub version when libcdio is not available.
#[cfg(not(feature = "libcdio"))]
#[must_use]
pub fn find_a_cdrom(_options: &DriveOptions) -> Option<CdromDrive> {
    None
}
