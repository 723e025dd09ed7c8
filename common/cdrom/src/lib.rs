//! CD-ROM image support: CUE/BIN loading, table of contents, and sector reads addressed by
//! logical block address

pub mod cdtime;
pub mod cue;
pub mod reader;

use pce_cd_proc_macros::{EnumDisplay, EnumFromStr};
use std::io;
use thiserror::Error;

// Raw sector: 12 sync bytes + 4 header bytes + 2048 data bytes + 288 EDC/ECC bytes.
// Audio sectors are 588 stereo 16-bit PCM samples
pub const BYTES_PER_SECTOR: u64 = 2352;

// User data portion of a Mode 1 sector
pub const DATA_BYTES_PER_SECTOR: usize = 2048;

/// CUE sheet keywords that the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumDisplay, EnumFromStr)]
pub enum CueKeyword {
    #[display = "FILE"]
    File,
    #[display = "TRACK"]
    Track,
    #[display = "INDEX"]
    Index,
    #[display = "PREGAP"]
    Pregap,
}

/// Which step of opening an image failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumDisplay)]
pub enum ImageAccess {
    #[display = "read CUE file"]
    ReadCue,
    #[display = "get size of BIN file"]
    StatBin,
    #[display = "open BIN file"]
    OpenBin,
}

#[derive(Debug, Error)]
pub enum CdRomError {
    #[error("Unable to {access} '{path}': {source}")]
    Image {
        access: ImageAccess,
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("CUE file '{0}' has no parent directory")]
    CueNoParentDir(String),
    #[error("Malformed {keyword} line in CUE file: '{line}'")]
    CueSyntax { keyword: CueKeyword, line: String },
    #[error("Unusable CUE sheet: {0}")]
    CueLayout(String),
    #[error("I/O error reading sector data: {0}")]
    SectorRead(#[source] io::Error),
    #[error("Sector {frame} is past the end of the disc (disc length {disc_len} sectors)")]
    SectorOutOfRange { frame: u32, disc_len: u32 },
    #[error(
        "EDC mismatch in track {track_number} sector {frame}: stored {stored:08X}, computed {computed:08X}"
    )]
    EdcMismatch { track_number: u8, frame: u32, stored: u32, computed: u32 },
}

pub type CdRomResult<T> = Result<T, CdRomError>;
