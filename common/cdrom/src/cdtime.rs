//! Minutes:seconds:frames disc addressing and the BCD encoding used on the wire

use bincode::{Decode, Encode};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Number of frames in the 2-second lead-in area that precedes logical block 0.
pub const LEAD_IN_FRAMES: u32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Encode, Decode)]
pub struct CdTime {
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
}

impl CdTime {
    pub const ZERO: Self = Self { minutes: 0, seconds: 0, frames: 0 };

    pub const SECONDS_PER_MINUTE: u8 = 60;
    pub const FRAMES_PER_SECOND: u8 = 75;

    const FRAMES_PER_MINUTE: u32 =
        Self::SECONDS_PER_MINUTE as u32 * Self::FRAMES_PER_SECOND as u32;

    #[must_use]
    pub fn new_checked(minutes: u8, seconds: u8, frames: u8) -> Option<Self> {
        (seconds < Self::SECONDS_PER_MINUTE && frames < Self::FRAMES_PER_SECOND)
            .then_some(Self { minutes, seconds, frames })
    }

    #[must_use]
    pub fn to_frames(self) -> u32 {
        u32::from(self.minutes) * Self::FRAMES_PER_MINUTE
            + u32::from(self.seconds) * u32::from(Self::FRAMES_PER_SECOND)
            + u32::from(self.frames)
    }

    /// Minutes saturate at 255; no real disc gets anywhere close.
    #[must_use]
    pub fn from_frames(frames: u32) -> Self {
        let minutes = (frames / Self::FRAMES_PER_MINUTE).min(u8::MAX.into()) as u8;
        let seconds = ((frames / u32::from(Self::FRAMES_PER_SECOND))
            % u32::from(Self::SECONDS_PER_MINUTE)) as u8;
        let frames = (frames % u32::from(Self::FRAMES_PER_SECOND)) as u8;

        Self { minutes, seconds, frames }
    }

    /// Decode a BCD minutes/seconds/frames triple. Returns `None` if any byte is not valid BCD or
    /// if seconds/frames are out of range.
    #[must_use]
    pub fn from_bcd(minutes: u8, seconds: u8, frames: u8) -> Option<Self> {
        Self::new_checked(bcd_to_binary(minutes)?, bcd_to_binary(seconds)?, bcd_to_binary(frames)?)
    }

    #[must_use]
    pub fn to_bcd(self) -> [u8; 3] {
        [binary_to_bcd(self.minutes), binary_to_bcd(self.seconds), binary_to_bcd(self.frames)]
    }
}

/// Convert a value in 0-99 to packed BCD. Values of 100 and up wrap.
#[must_use]
pub fn binary_to_bcd(value: u8) -> u8 {
    let value = value % 100;
    ((value / 10) << 4) | (value % 10)
}

#[must_use]
pub fn bcd_to_binary(value: u8) -> Option<u8> {
    let msd = value >> 4;
    let lsd = value & 0x0F;
    (msd < 10 && lsd < 10).then_some(10 * msd + lsd)
}

impl FromStr for CdTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(minutes), Some(seconds), Some(frames), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("Unexpected time format: {s}"));
        };

        let err_fn = |_err| format!("Invalid time string: {s}");
        let minutes: u8 = minutes.parse().map_err(err_fn)?;
        let seconds: u8 = seconds.parse().map_err(err_fn)?;
        let frames: u8 = frames.parse().map_err(err_fn)?;

        Self::new_checked(minutes, seconds, frames).ok_or_else(|| format!("Time out of range: {s}"))
    }
}

impl Display for CdTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.minutes, self.seconds, self.frames)
    }
}
