//! Code for reading CD-ROM sectors by logical block address

mod cuebin;

use crate::cue::{Toc, Track, TrackMode, TrackType};
use crate::{CdRomError, CdRomResult};
use crc::Crc;
use std::fs::{self, File};
use std::io::Cursor;
use std::ops::Range;
use std::path::Path;

pub use cuebin::CdBinFiles;

const SECTOR_HEADER_LEN: usize = 16;

const CD_ROM_CRC: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_CD_ROM_EDC);
const CRC32_DIGEST_RANGE: Range<usize> = 0..2064;
const CRC32_CHECKSUM_LOCATION: Range<usize> = 2064..2068;

#[derive(Debug)]
enum CdRomReader {
    Fs(CdBinFiles<File>),
    Memory(CdBinFiles<Cursor<Vec<u8>>>),
}

impl CdRomReader {
    fn read_sector(
        &mut self,
        track_number: u8,
        relative_frame: u32,
        out: &mut [u8],
    ) -> CdRomResult<()> {
        match self {
            Self::Fs(bin_files) => bin_files.read_sector(track_number, relative_frame, out),
            Self::Memory(bin_files) => bin_files.read_sector(track_number, relative_frame, out),
        }
    }
}

#[derive(Debug)]
pub struct CdRom {
    toc: Toc,
    reader: CdRomReader,
    verify_checksums: bool,
}

impl CdRom {
    /// Open a CUE/BIN image that will be read from the filesystem as needed.
    ///
    /// # Errors
    ///
    /// Will propagate any I/O errors, and will return an error if the CUE file appears invalid.
    pub fn open<P: AsRef<Path>>(cue_path: P) -> CdRomResult<Self> {
        let (bin_files, toc) = CdBinFiles::create(cue_path, |bin_path| File::open(bin_path))?;

        Ok(Self { toc, reader: CdRomReader::Fs(bin_files), verify_checksums: true })
    }

    /// Open a CUE/BIN image and read every BIN file fully into memory up front.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open`].
    pub fn open_in_memory<P: AsRef<Path>>(cue_path: P) -> CdRomResult<Self> {
        let (bin_files, toc) =
            CdBinFiles::create(cue_path, |bin_path| fs::read(bin_path).map(Cursor::new))?;

        Ok(Self { toc, reader: CdRomReader::Memory(bin_files), verify_checksums: true })
    }

    /// Enable or disable the EDC check on raw data sectors.
    #[must_use]
    pub fn with_checksum_verification(mut self, verify_checksums: bool) -> Self {
        self.verify_checksums = verify_checksums;
        self
    }

    #[must_use]
    pub fn toc(&self) -> &Toc {
        &self.toc
    }

    #[must_use]
    pub fn track_of(&self, frame: u32) -> Option<&Track> {
        self.toc.find_track_by_frame(frame)
    }

    /// Read the 2048 user data bytes of the sector at the given LBA.
    ///
    /// Frames inside a track gap read as all zeros.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is past the end of the disc, on any I/O error, or if the
    /// sector fails its EDC check.
    pub fn read_data_sector(
        &mut self,
        frame: u32,
        out: &mut [u8; crate::DATA_BYTES_PER_SECTOR],
    ) -> CdRomResult<()> {
        let Some(track) = self.toc.find_track_by_frame(frame) else {
            return Err(CdRomError::SectorOutOfRange { frame, disc_len: self.toc.end_frame() });
        };

        if !track.contains(frame) {
            out.fill(0);
            return Ok(());
        }

        let track_number = track.number;
        let relative_frame = frame - track.start_frame;
        match track.mode {
            TrackMode::Mode1Cooked => {
                self.reader.read_sector(track_number, relative_frame, out)?;
            }
            TrackMode::Mode1Raw | TrackMode::Audio => {
                let is_data = track.track_type == TrackType::Data;

                let mut raw = [0; crate::BYTES_PER_SECTOR as usize];
                self.reader.read_sector(track_number, relative_frame, &mut raw)?;

                if is_data && self.verify_checksums {
                    check_edc(&raw, track_number, frame)?;
                }

                if is_data {
                    out.copy_from_slice(
                        &raw[SECTOR_HEADER_LEN..SECTOR_HEADER_LEN + crate::DATA_BYTES_PER_SECTOR],
                    );
                } else {
                    // Audio has no header; hand back the leading PCM bytes
                    out.copy_from_slice(&raw[..crate::DATA_BYTES_PER_SECTOR]);
                }
            }
        }

        Ok(())
    }

    /// Read a full 2352-byte sector at the given LBA. Intended for audio tracks, where the sector
    /// holds 588 stereo samples. Gap frames and cooked data sectors read as all zeros.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is past the end of the disc or on any I/O error.
    pub fn read_raw_sector(
        &mut self,
        frame: u32,
        out: &mut [u8; crate::BYTES_PER_SECTOR as usize],
    ) -> CdRomResult<()> {
        let Some(track) = self.toc.find_track_by_frame(frame) else {
            return Err(CdRomError::SectorOutOfRange { frame, disc_len: self.toc.end_frame() });
        };

        if !track.contains(frame) || track.mode == TrackMode::Mode1Cooked {
            out.fill(0);
            return Ok(());
        }

        let track_number = track.number;
        let relative_frame = frame - track.start_frame;
        self.reader.read_sector(track_number, relative_frame, out)
    }
}

fn check_edc(raw: &[u8], track_number: u8, frame: u32) -> CdRomResult<()> {
    let computed = CD_ROM_CRC.checksum(&raw[CRC32_DIGEST_RANGE]);
    let stored = u32::from_le_bytes(raw[CRC32_CHECKSUM_LOCATION].try_into().unwrap());

    if computed == stored {
        Ok(())
    } else {
        Err(CdRomError::EdcMismatch { track_number, frame, stored, computed })
    }
}
