//! CD-DA transport state: where audio playback is, where it stops, and what happens at the end

use crate::api::AudioTrackPlayer;
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum CdDaStatus {
    #[default]
    Off,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum CdDaPlayMode {
    Repeat,
    IrqAtEnd,
    #[default]
    Once,
}

impl CdDaPlayMode {
    // Low 2 bits of the command's second byte; 0 means stop
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x03 {
            0x00 => None,
            0x01 => Some(Self::Repeat),
            0x02 => Some(Self::IrqAtEnd),
            0x03 => Some(Self::Once),
            _ => unreachable!("value & 0x03 is always <= 0x03"),
        }
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct AudioTransport {
    /// Next frame to read (sector reads) or play position (CD-DA)
    pub current_frame: u32,
    /// Frame where the current read or playback stops
    pub end_frame: u32,
    /// One past the last frame on the disc
    pub last_frame: u32,
    /// Where repeat mode restarts from
    pub loop_start_frame: u32,
    pub status: CdDaStatus,
    pub play_mode: CdDaPlayMode,
    pub end_mark: bool,
}

impl AudioTransport {
    pub fn new(last_frame: u32) -> Self {
        Self { end_frame: last_frame, last_frame, ..Self::default() }
    }

    /// Start playing from `current_frame` up to `end_frame`.
    pub fn play<P: AudioTrackPlayer>(&mut self, player: &mut P) {
        self.loop_start_frame = self.current_frame;
        self.status = CdDaStatus::Playing;
        player.start(self.current_frame, self.end_frame.saturating_sub(self.current_frame));

        log::debug!("CD-DA playing frames {} to {}", self.current_frame, self.end_frame);
    }

    pub fn pause<P: AudioTrackPlayer>(&mut self, player: &mut P) {
        self.current_frame = player.current_frame();
        self.status = CdDaStatus::Paused;
        player.pause(true);

        log::debug!("CD-DA paused at frame {}", self.current_frame);
    }

    pub fn resume<P: AudioTrackPlayer>(&mut self, player: &mut P) {
        self.status = CdDaStatus::Playing;
        player.pause(false);
    }

    /// Stop playback and forget the end point.
    pub fn stop<P: AudioTrackPlayer>(&mut self, player: &mut P) {
        if self.status != CdDaStatus::Off {
            log::debug!("CD-DA stopped");
        }

        self.status = CdDaStatus::Off;
        self.end_frame = self.last_frame;
        self.end_mark = false;
        player.stop();
    }

    /// Check whether the player reached the end point since the last poll and apply the play mode.
    /// Returns true if the transfer-done IRQ should be raised.
    pub fn poll_end<P: AudioTrackPlayer>(&mut self, player: &mut P) -> bool {
        if !player.has_ended_since_last_poll() || self.status != CdDaStatus::Playing {
            return false;
        }

        if !self.end_mark {
            self.status = CdDaStatus::Off;
            return false;
        }

        match self.play_mode {
            CdDaPlayMode::Repeat => {
                log::debug!("CD-DA looping back to frame {}", self.loop_start_frame);
                player.start(
                    self.loop_start_frame,
                    self.end_frame.saturating_sub(self.loop_start_frame),
                );
                false
            }
            CdDaPlayMode::IrqAtEnd => {
                self.status = CdDaStatus::Off;
                self.end_mark = false;
                true
            }
            CdDaPlayMode::Once => {
                self.status = CdDaStatus::Off;
                self.end_mark = false;
                false
            }
        }
    }
}
