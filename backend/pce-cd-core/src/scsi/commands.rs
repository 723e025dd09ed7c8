use crate::api::{AdpcmClock, AudioTrackPlayer, PceCd, ProtocolViolation, SectorSource};
use crate::cdda::{CdDaPlayMode, CdDaStatus};
use crate::registers;
use crate::scheduler::{self, TimerEvent};
use crate::scsi::{Command, Status};
use cdrom::cdtime::{self, CdTime, LEAD_IN_FRAMES};
use cdrom::cue::{Toc, TrackType};

// BCD MSF positions at or past 00:07:00 are offset by the 7-second data area start
const BCD_MSF_OFFSET: u32 = 525;

const LEAD_OUT_TRACK: u8 = 0xAA;

/// Decode the target frame of a SET AUDIO START/END command. Returns `None` if the command
/// names a track that is not on the disc.
pub fn decode_audio_frame(command: &[u8], toc: &Toc) -> Option<u32> {
    match command[9] & 0xC0 {
        0x00 => Some(
            (u32::from(command[3]) << 16) | (u32::from(command[4]) << 8) | u32::from(command[5]),
        ),
        0x40 => {
            let Some(time) = CdTime::from_bcd(command[2], command[3], command[4]) else {
                log::warn!(
                    "Invalid BCD MSF in audio command: {:02X}:{:02X}:{:02X}",
                    command[2],
                    command[3],
                    command[4]
                );
                return Some(0);
            };

            let frame = time.to_frames();
            Some(if frame >= BCD_MSF_OFFSET { frame - BCD_MSF_OFFSET } else { frame })
        }
        0x80 => {
            let track_number = cdtime::bcd_to_binary(command[2])?;
            toc.track(track_number).map(|track| track.start_frame)
        }
        _ => {
            log::warn!("Unsupported audio frame addressing mode {:02X}", command[9]);
            Some(0)
        }
    }
}

fn msf_bcd(frame: u32) -> [u8; 3] {
    CdTime::from_frames(frame).to_bcd()
}

impl<D: SectorSource, P: AudioTrackPlayer, M: AdpcmClock> PceCd<D, P, M> {
    pub(super) fn execute_command(&mut self, command: Command, bytes: &[u8]) {
        match command {
            Command::TestUnitReady => self.test_unit_ready(),
            Command::Read6 => self.read_6(bytes),
            Command::SetAudioStart => self.set_audio_start(bytes),
            Command::SetAudioEnd => self.set_audio_end(bytes),
            Command::Pause => self.pause(),
            Command::ReadSubchannelQ => self.read_subchannel_q(),
            Command::GetDirInfo => self.get_dir_info(bytes),
        }
    }

    fn test_unit_ready(&mut self) {
        let status = if self.disc.is_some() { Status::Good } else { Status::CheckCondition };
        self.reply_status(status);
    }

    fn read_6(&mut self, bytes: &[u8]) {
        let frame =
            (u32::from(bytes[1] & 0x1F) << 16) | (u32::from(bytes[2]) << 8) | u32::from(bytes[3]);
        let frame_count = u32::from(bytes[4]);

        if self.disc.is_none() {
            self.reply_status(Status::CheckCondition);
            return;
        }

        if self.transport.status != CdDaStatus::Off {
            self.transport.stop(&mut self.cdda);
        }

        log::debug!("READ(6) from frame {frame}, {frame_count} sectors");

        self.transport.current_frame = frame;
        self.transport.end_frame = frame + frame_count;

        if frame_count == 0 {
            // Nothing to read, but some software issues this and expects success
            self.reply_status(Status::Good);
        } else {
            self.bus.clear_data();
            self.scheduler.arm(TimerEvent::SectorRead, self.cycles, scheduler::SECTOR_PERIOD);
            self.motor_on = true;
        }

        self.set_irq(registers::IRQ_TRANSFER_READY, true);
    }

    fn decode_audio_command_frame(&self, bytes: &[u8]) -> Option<u32> {
        let disc = self.disc.as_ref()?;
        decode_audio_frame(bytes, disc.toc())
    }

    fn set_audio_start(&mut self, bytes: &[u8]) {
        let Some(frame) = self.decode_audio_command_frame(bytes) else {
            self.reply_status(Status::CheckCondition);
            return;
        };

        self.transport.current_frame = frame;

        if self.transport.status == CdDaStatus::Paused {
            self.transport.stop(&mut self.cdda);
        } else if bytes[1] & 0x03 != 0 {
            let irq_at_end = bytes[1] & 0x02 != 0;

            self.transport.end_frame = self.transport.last_frame;
            self.transport.play_mode =
                if irq_at_end { CdDaPlayMode::IrqAtEnd } else { CdDaPlayMode::Once };
            self.transport.end_mark = irq_at_end;
            self.transport.play(&mut self.cdda);
            self.motor_on = true;
        } else {
            // Play up to the next track's INDEX 01, including when starting inside its pregap
            let track_end = self
                .disc
                .as_ref()
                .and_then(|disc| disc.toc().tracks().find(|track| track.start_frame > frame))
                .map_or(self.transport.last_frame, |track| track.start_frame);

            self.transport.end_frame = track_end;
            self.transport.play_mode = CdDaPlayMode::Once;
            self.transport.end_mark = false;
            self.transport.play(&mut self.cdda);
            self.motor_on = true;
        }

        self.reply_status(Status::Good);
        self.set_irq(registers::IRQ_TRANSFER_DONE, true);
    }

    fn set_audio_end(&mut self, bytes: &[u8]) {
        let Some(frame) = self.decode_audio_command_frame(bytes) else {
            self.reply_status(Status::CheckCondition);
            return;
        };

        self.transport.end_frame = frame;

        match CdDaPlayMode::from_bits(bytes[1]) {
            Some(play_mode) => {
                self.transport.play_mode = play_mode;
                self.transport.end_mark = true;

                if self.transport.status == CdDaStatus::Paused {
                    self.transport.resume(&mut self.cdda);
                } else {
                    self.transport.play(&mut self.cdda);
                }
                self.motor_on = true;
            }
            None => {
                self.transport.stop(&mut self.cdda);
            }
        }

        self.reply_status(Status::Good);
        self.set_irq(registers::IRQ_TRANSFER_DONE, true);
    }

    fn pause(&mut self) {
        if self.disc.is_none() || self.transport.status == CdDaStatus::Off {
            self.reply_status(Status::CheckCondition);
            return;
        }

        self.transport.pause(&mut self.cdda);
        self.reply_status(Status::Good);
    }

    fn read_subchannel_q(&mut self) {
        let Some(disc) = &self.disc else {
            self.reply_status(Status::CheckCondition);
            return;
        };

        let (status_byte, frame) = match self.transport.status {
            CdDaStatus::Playing => (0x00, self.cdda.current_frame()),
            CdDaStatus::Paused => (0x02, self.transport.current_frame),
            CdDaStatus::Off => (0x03, self.transport.current_frame),
        };

        let toc = disc.toc();
        let track = disc.track_of(frame).unwrap_or_else(|| toc.last_track());
        let [rel_minutes, rel_seconds, rel_frames] =
            msf_bcd(frame.saturating_sub(track.start_frame));
        let [abs_minutes, abs_seconds, abs_frames] = msf_bcd(frame);

        let reply = [
            status_byte,
            0x00,
            cdtime::binary_to_bcd(track.number),
            0x01,
            rel_minutes,
            rel_seconds,
            rel_frames,
            abs_minutes,
            abs_seconds,
            abs_frames,
        ];

        log::trace!("Subchannel Q at frame {frame}: {reply:02X?}");

        self.bus.load_reply(&reply);
    }

    fn get_dir_info(&mut self, bytes: &[u8]) {
        let Some(disc) = &self.disc else {
            self.reply_status(Status::CheckCondition);
            return;
        };
        let toc = disc.toc();

        let reply: Vec<u8> = match bytes[1] {
            0x00 => vec![cdtime::binary_to_bcd(1), cdtime::binary_to_bcd(toc.num_tracks())],
            0x01 => msf_bcd(toc.end_frame() + LEAD_IN_FRAMES).to_vec(),
            0x02 => {
                let (frame, track_type_byte) = if bytes[2] == LEAD_OUT_TRACK {
                    (toc.end_frame(), 0x00)
                } else {
                    let track = cdtime::bcd_to_binary(bytes[2])
                        .and_then(|track_number| toc.track(track_number.max(1)));
                    let Some(track) = track else {
                        log::warn!("GET DIR INFO for nonexistent track {:02X}", bytes[2]);
                        self.reply_status(Status::CheckCondition);
                        return;
                    };

                    let type_byte = match track.track_type {
                        TrackType::Data => 0x04,
                        TrackType::Audio => 0x00,
                    };
                    (track.start_frame, type_byte)
                };

                let mut reply = msf_bcd(frame + LEAD_IN_FRAMES).to_vec();
                reply.push(track_type_byte);
                reply
            }
            mode => {
                self.record_fault(ProtocolViolation::UnknownDirInfoMode(mode));
                self.reply_status(Status::CheckCondition);
                return;
            }
        };

        log::trace!("GET DIR INFO {:02X}: {reply:02X?}", bytes[1]);

        self.bus.load_reply(&reply);
    }
}
