//! Table of contents: per-track start positions, lengths, and types

use bincode::{Decode, Encode};
use pce_cd_proc_macros::{EnumDisplay, EnumFromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum TrackType {
    Data,
    Audio,
}

/// Sector format of a track, displayed and parsed as its CUE sheet TRACK type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, EnumDisplay, EnumFromStr)]
pub enum TrackMode {
    // Raw sectors with sync/header/EDC/ECC
    #[display = "MODE1/2352"]
    Mode1Raw,
    // Cooked sectors, user data only
    #[display = "MODE1/2048"]
    Mode1Cooked,
    #[display = "AUDIO"]
    Audio,
}

impl TrackMode {
    #[must_use]
    pub fn to_type(self) -> TrackType {
        match self {
            Self::Mode1Raw | Self::Mode1Cooked => TrackType::Data,
            Self::Audio => TrackType::Audio,
        }
    }

    #[must_use]
    pub fn sector_len(self) -> u64 {
        match self {
            Self::Mode1Raw | Self::Audio => crate::BYTES_PER_SECTOR,
            Self::Mode1Cooked => crate::DATA_BYTES_PER_SECTOR as u64,
        }
    }
}

/// One track, addressed by logical block address (LBA 0 is the first sector after the lead-in).
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Track {
    pub number: u8,
    pub mode: TrackMode,
    pub track_type: TrackType,
    /// LBA of INDEX 01
    pub start_frame: u32,
    /// Frames from INDEX 01 up to the next track's pregap (or the end of the disc)
    pub frame_count: u32,
    /// Frames between the end of the previous track and INDEX 01
    pub pregap_frames: u32,
}

impl Track {
    #[must_use]
    pub fn end_frame(&self) -> u32 {
        self.start_frame + self.frame_count
    }

    #[must_use]
    pub fn contains(&self, frame: u32) -> bool {
        (self.start_frame..self.end_frame()).contains(&frame)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Toc {
    tracks: Vec<Track>,
}

impl Toc {
    /// Create a TOC from a track list.
    ///
    /// # Panics
    ///
    /// This function will panic if the track list is empty or if tracks are not numbered
    /// sequentially from 1.
    #[must_use]
    pub fn new(tracks: Vec<Track>) -> Self {
        assert!(!tracks.is_empty(), "track list must not be empty");
        assert!(
            tracks.iter().enumerate().all(|(i, track)| usize::from(track.number) == i + 1),
            "tracks must be numbered sequentially from 1"
        );

        Self { tracks }
    }

    /// Look up a track by its 1-based number.
    #[must_use]
    pub fn track(&self, track_number: u8) -> Option<&Track> {
        track_number.checked_sub(1).and_then(|idx| self.tracks.get(usize::from(idx)))
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.tracks.iter()
    }

    #[must_use]
    pub fn first_track(&self) -> &Track {
        &self.tracks[0]
    }

    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn last_track(&self) -> &Track {
        self.tracks.last().unwrap()
    }

    #[must_use]
    pub fn num_tracks(&self) -> u8 {
        self.tracks.len() as u8
    }

    /// LBA one past the final sector of the last track.
    #[must_use]
    pub fn end_frame(&self) -> u32 {
        self.last_track().end_frame()
    }

    /// Find the track that owns the given LBA. Frames inside a track's pregap belong to the
    /// preceding track, matching how a drive reports subchannel Q positions while playing through
    /// a gap. Returns `None` past the end of the disc.
    #[must_use]
    pub fn find_track_by_frame(&self, frame: u32) -> Option<&Track> {
        if frame >= self.end_frame() {
            return None;
        }

        let idx = match self.tracks.binary_search_by_key(&frame, |track| track.start_frame) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        Some(&self.tracks[idx])
    }
}
