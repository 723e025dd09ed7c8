use crate::api::{AdpcmClock, ArcadeCard, AudioTrackPlayer, PceCd, PceCdError, ProtocolViolation, SectorSource};
use crate::cdda::CdDaStatus;
use crate::fader::FadeState;
use crate::scheduler::{self, TimerEvent};
use cdrom::cue::{Toc, Track, TrackMode, TrackType};
use cdrom::{CdRomError, CdRomResult};
use pce_cd_config::{PceCdConfig, SystemCard};
use proptest::prelude::*;
use test_log::test;

#[derive(Debug, Default)]
pub struct RecordingPlayer {
    pub frame: u32,
    pub ended: bool,
    pub paused: bool,
    pub stopped: bool,
    pub starts: Vec<(u32, u32)>,
    pub volumes: Vec<f32>,
    pub sample: (i16, i16),
}

impl AudioTrackPlayer for RecordingPlayer {
    fn start(&mut self, frame: u32, frame_count: u32) {
        self.starts.push((frame, frame_count));
        self.frame = frame;
        self.paused = false;
        self.stopped = false;
    }

    fn pause(&mut self, paused: bool) {
        self.paused = paused;
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn current_frame(&self) -> u32 {
        self.frame
    }

    fn has_ended_since_last_poll(&mut self) -> bool {
        std::mem::take(&mut self.ended)
    }

    fn set_volume(&mut self, volume: f32) {
        self.volumes.push(volume);
    }

    fn current_sample(&self) -> (i16, i16) {
        self.sample
    }
}

#[derive(Debug, Default)]
pub struct RecordingAdpcm {
    pub nibbles: Vec<u8>,
    pub divider: u8,
    pub reset: bool,
    pub volumes: Vec<f32>,
}

impl AdpcmClock for RecordingAdpcm {
    fn supply_nibble(&mut self, nibble: u8) {
        self.nibbles.push(nibble);
    }

    fn set_clock_divider(&mut self, divider: u8) {
        self.divider = divider;
    }

    fn reset(&mut self, asserted: bool) {
        self.reset = asserted;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volumes.push(volume);
    }
}

// Data track 1 at LBA 0, audio track 2 at LBA 1150 after a 2-second pregap
#[derive(Debug)]
pub struct TestDisc {
    toc: Toc,
}

impl TestDisc {
    pub fn new() -> Self {
        Self {
            toc: Toc::new(vec![
                Track {
                    number: 1,
                    mode: TrackMode::Mode1Raw,
                    track_type: TrackType::Data,
                    start_frame: 0,
                    frame_count: 1000,
                    pregap_frames: 0,
                },
                Track {
                    number: 2,
                    mode: TrackMode::Audio,
                    track_type: TrackType::Audio,
                    start_frame: 1150,
                    frame_count: 4000,
                    pregap_frames: 150,
                },
            ]),
        }
    }
}

fn sector_byte(frame: u32, i: usize) -> u8 {
    (frame.wrapping_mul(7) as usize + i) as u8
}

fn sector_contents(frame: u32) -> Vec<u8> {
    (0..cdrom::DATA_BYTES_PER_SECTOR).map(|i| sector_byte(frame, i)).collect()
}

impl SectorSource for TestDisc {
    fn read_sector(
        &mut self,
        frame: u32,
        out: &mut [u8; cdrom::DATA_BYTES_PER_SECTOR],
    ) -> CdRomResult<()> {
        let disc_len = self.toc.end_frame();
        if frame >= disc_len {
            return Err(CdRomError::SectorOutOfRange { frame, disc_len });
        }

        for (i, byte) in out.iter_mut().enumerate() {
            *byte = sector_byte(frame, i);
        }

        Ok(())
    }

    fn toc(&self) -> &Toc {
        &self.toc
    }
}

type TestCd = PceCd<TestDisc, RecordingPlayer, RecordingAdpcm>;

fn new_cd_with_config(config: PceCdConfig, disc: bool) -> TestCd {
    let disc = disc.then(TestDisc::new);
    PceCd::new(config, disc, RecordingPlayer::default(), RecordingAdpcm::default(), None)
}

fn new_cd() -> TestCd {
    new_cd_with_config(PceCdConfig::default(), true)
}

const BSY: u8 = 0x80;
const REQ: u8 = 0x40;
const MSG: u8 = 0x20;
const CD: u8 = 0x10;
const IO: u8 = 0x08;

fn bus_phase(cd: &mut TestCd) -> u8 {
    cd.read(0x00) & (BSY | REQ | MSG | CD | IO)
}

fn set_ack(cd: &mut TestCd, ack: bool) {
    let mask = cd.read(0x02) & 0x7F;
    cd.write(0x02, mask | if ack { 0x80 } else { 0x00 });
}

fn handshake(cd: &mut TestCd) {
    set_ack(cd, true);
    set_ack(cd, false);
}

fn send_command(cd: &mut TestCd, bytes: &[u8]) {
    cd.write(0x00, 0x81);

    for &byte in bytes {
        assert_eq!(bus_phase(cd), BSY | REQ | CD, "drive should be requesting a command byte");
        cd.write(0x01, byte);
        handshake(cd);
    }
}

// Complete the status and message phases, returning the status byte
fn finish_status(cd: &mut TestCd) -> u8 {
    assert_eq!(bus_phase(cd), BSY | REQ | CD | IO, "drive should be in the status phase");
    let status = cd.read(0x01);
    handshake(cd);

    assert_eq!(bus_phase(cd), BSY | REQ | MSG | CD | IO, "drive should be in the message phase");
    assert_eq!(cd.read(0x01), 0x00);
    handshake(cd);

    assert_eq!(bus_phase(cd), 0, "bus should be free");
    status
}

fn read_data(cd: &mut TestCd, len: usize) -> Vec<u8> {
    (0..len)
        .map(|_| {
            assert_eq!(bus_phase(cd), BSY | REQ | IO, "drive should be presenting data");
            cd.read(0x08)
        })
        .collect()
}

fn irq_status(cd: &TestCd) -> u8 {
    cd.registers.irq_status & 0x7C
}

#[test]
fn test_unit_ready_without_disc() {
    let mut cd = new_cd_with_config(PceCdConfig::default(), false);

    send_command(&mut cd, &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(cd.read(0x01), 0x01);
    assert!(cd.signals().bsy);

    assert_eq!(finish_status(&mut cd), 0x01);
    assert!(!cd.signals().bsy);
}

#[test]
fn test_unit_ready_with_disc() {
    let mut cd = new_cd();

    send_command(&mut cd, &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(finish_status(&mut cd), 0x00);
}

#[test]
fn read_two_sectors() {
    let mut cd = new_cd();
    cd.write(0x02, 0x60);

    send_command(&mut cd, &[0x08, 0x00, 0x00, 0x00, 0x02, 0x00]);
    assert_eq!(cd.transport().current_frame, 0);
    assert_eq!(cd.transport().end_frame, 2);
    assert!(cd.is_timer_armed(TimerEvent::SectorRead));
    assert!(cd.motor_on());
    assert_eq!(cd.read(0x03) & 0x10, 0x10);

    cd.advance(scheduler::SECTOR_PERIOD).unwrap();
    assert_eq!(read_data(&mut cd, 2048), sector_contents(0));

    // Waiting on the next sector
    assert_eq!(bus_phase(&mut cd), BSY | IO);
    assert_eq!(irq_status(&cd) & 0x20, 0);

    cd.advance(scheduler::SECTOR_PERIOD).unwrap();
    assert_eq!(read_data(&mut cd, 2048), sector_contents(1));

    assert_eq!(irq_status(&cd) & 0x20, 0x20);
    assert!(cd.irq_line());
    assert!(!cd.is_timer_armed(TimerEvent::SectorRead));
    assert_eq!(finish_status(&mut cd), 0x00);
}

#[test]
fn slow_host_does_not_lose_sectors() {
    let mut cd = new_cd();

    send_command(&mut cd, &[0x08, 0x00, 0x00, 0x10, 0x02, 0x00]);

    // Two sector periods pass before the host starts reading
    cd.advance(2 * scheduler::SECTOR_PERIOD).unwrap();
    assert_eq!(read_data(&mut cd, 2048), sector_contents(0x10));

    cd.advance(scheduler::SECTOR_PERIOD).unwrap();
    assert_eq!(read_data(&mut cd, 2048), sector_contents(0x11));
    assert_eq!(finish_status(&mut cd), 0x00);
}

#[test]
fn zero_length_read() {
    let mut cd = new_cd();

    send_command(&mut cd, &[0x08, 0x00, 0x00, 0x05, 0x00, 0x00]);
    assert!(!cd.is_timer_armed(TimerEvent::SectorRead));
    assert_eq!(finish_status(&mut cd), 0x00);
}

#[test]
fn read_past_end_of_disc_is_an_error() {
    let mut cd = new_cd();

    // LBA 5150 is the end of the disc
    send_command(&mut cd, &[0x08, 0x00, 0x14, 0x1E, 0x01, 0x00]);
    let result = cd.advance(scheduler::SECTOR_PERIOD);
    assert!(matches!(result, Err(PceCdError::Disc(CdRomError::SectorOutOfRange { frame: 5150, .. }))));

    assert!(!cd.is_timer_armed(TimerEvent::SectorRead));
    assert_eq!(finish_status(&mut cd), 0x01);
}

#[test]
fn read_error_with_ack_held() {
    let mut cd = new_cd();

    send_command(&mut cd, &[0x08, 0x00, 0x14, 0x1E, 0x01, 0x00]);
    set_ack(&mut cd, true);
    assert!(matches!(cd.advance(scheduler::SECTOR_PERIOD), Err(PceCdError::Disc(_))));

    // The held ACK consumes the status byte as soon as it is presented
    let signals = cd.signals();
    assert!(signals.ack);
    assert!(!signals.req);

    set_ack(&mut cd, false);
    assert_eq!(bus_phase(&mut cd), BSY | REQ | MSG | CD | IO);
    handshake(&mut cd);
    assert_eq!(bus_phase(&mut cd), 0);
}

#[test]
fn read_error_does_not_cut_the_tick_short() {
    let mut cd = new_cd();

    send_command(&mut cd, &[0x08, 0x00, 0x14, 0x1E, 0x01, 0x00]);
    assert!(cd.advance(3 * scheduler::SECTOR_PERIOD).is_err());
    assert_eq!(cd.cycles, 3 * scheduler::SECTOR_PERIOD);
}

#[test]
fn unknown_opcode_surfaces_from_tick() {
    let mut cd = new_cd();

    send_command(&mut cd, &[0xFF]);
    assert_eq!(cd.pending_fault(), Some(ProtocolViolation::UnknownOpcode(0xFF)));
    assert_eq!(finish_status(&mut cd), 0x01);

    assert!(matches!(
        cd.tick(0),
        Err(PceCdError::ProtocolViolation(ProtocolViolation::UnknownOpcode(0xFF)))
    ));
    assert!(cd.tick(0).is_ok());
    assert_eq!(cd.pending_fault(), None);
}

#[test]
fn tick_with_pending_fault_still_advances_time() {
    let mut cd = new_cd();

    send_command(&mut cd, &[0xFF]);
    assert_eq!(finish_status(&mut cd), 0x01);

    // Converts to exactly one second of scheduler ticks
    assert!(cd.tick(crate::api::MASTER_CLOCK_RATE).is_err());
    assert_eq!(cd.cycles, scheduler::TICKS_PER_SECOND);
    assert!(cd.tick(crate::api::MASTER_CLOCK_RATE).is_ok());
    assert_eq!(cd.cycles, 2 * scheduler::TICKS_PER_SECOND);
}

#[test]
fn dir_info() {
    let mut cd = new_cd();

    send_command(&mut cd, &[0xDE, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(read_data(&mut cd, 2), vec![0x01, 0x02]);
    assert_eq!(finish_status(&mut cd), 0x00);

    // 5150 + 150 frames = 01:10:50
    send_command(&mut cd, &[0xDE, 0x01, 0x00, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(read_data(&mut cd, 3), vec![0x01, 0x10, 0x50]);
    assert_eq!(finish_status(&mut cd), 0x00);

    send_command(&mut cd, &[0xDE, 0x02, 0x01, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(read_data(&mut cd, 4), vec![0x00, 0x02, 0x00, 0x04]);
    assert_eq!(finish_status(&mut cd), 0x00);

    send_command(&mut cd, &[0xDE, 0x02, 0x02, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(read_data(&mut cd, 4), vec![0x00, 0x17, 0x25, 0x00]);
    assert_eq!(finish_status(&mut cd), 0x00);

    send_command(&mut cd, &[0xDE, 0x02, 0xAA, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(read_data(&mut cd, 4), vec![0x01, 0x10, 0x50, 0x00]);
    assert_eq!(finish_status(&mut cd), 0x00);

    send_command(&mut cd, &[0xDE, 0x02, 0x03, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(finish_status(&mut cd), 0x01);
    assert_eq!(cd.pending_fault(), None);

    send_command(&mut cd, &[0xDE, 0x03, 0x00, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(finish_status(&mut cd), 0x01);
    assert_eq!(cd.pending_fault(), Some(ProtocolViolation::UnknownDirInfoMode(0x03)));
}

#[test]
fn audio_playback_commands() {
    let mut cd = new_cd();
    cd.write(0x02, 0x20);

    // Pausing while stopped is rejected
    send_command(&mut cd, &[0xDA, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(finish_status(&mut cd), 0x01);

    // Play from LBA 1200 to the end of the disc
    send_command(&mut cd, &[0xD8, 0x01, 0x00, 0x00, 0x04, 0xB0, 0, 0, 0, 0x00]);
    assert_eq!(irq_status(&cd) & 0x20, 0x20);
    assert_eq!(finish_status(&mut cd), 0x00);
    assert_eq!(cd.cdda_player().starts, vec![(1200, 3950)]);
    assert_eq!(cd.transport().status, CdDaStatus::Playing);

    // Stop at LBA 2000 with an IRQ
    send_command(&mut cd, &[0xD9, 0x02, 0x00, 0x00, 0x07, 0xD0, 0, 0, 0, 0x00]);
    assert_eq!(finish_status(&mut cd), 0x00);
    assert_eq!(cd.cdda_player().starts, vec![(1200, 3950), (1200, 800)]);
    assert!(cd.transport().end_mark);

    cd.cdda.frame = 1300;
    send_command(&mut cd, &[0xDD, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(
        read_data(&mut cd, 10),
        vec![0x00, 0x00, 0x02, 0x01, 0x00, 0x02, 0x00, 0x00, 0x17, 0x25]
    );
    assert_eq!(finish_status(&mut cd), 0x00);
    assert_eq!(irq_status(&cd) & 0x20, 0);

    cd.cdda.ended = true;
    cd.advance(1).unwrap();
    assert_eq!(irq_status(&cd) & 0x20, 0x20);
    assert!(cd.irq_line());
    assert_eq!(cd.transport().status, CdDaStatus::Off);
    assert!(!cd.transport().end_mark);
}

#[test]
fn pause_and_resume() {
    let mut cd = new_cd();

    // Play track 2 (BCD track addressing) to the end of the track
    send_command(&mut cd, &[0xD8, 0x00, 0x02, 0, 0, 0, 0, 0, 0, 0x80]);
    assert_eq!(finish_status(&mut cd), 0x00);
    assert_eq!(cd.cdda_player().starts, vec![(1150, 4000)]);

    cd.cdda.frame = 1500;
    send_command(&mut cd, &[0xDA, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(finish_status(&mut cd), 0x00);
    assert_eq!(cd.transport().status, CdDaStatus::Paused);
    assert_eq!(cd.transport().current_frame, 1500);
    assert!(cd.cdda_player().paused);

    // Repeat mode end point resumes rather than restarting
    send_command(&mut cd, &[0xD9, 0x01, 0x00, 0x00, 0x0B, 0xB8, 0, 0, 0, 0x00]);
    assert_eq!(finish_status(&mut cd), 0x00);
    assert!(!cd.cdda_player().paused);
    assert_eq!(cd.cdda_player().starts.len(), 1);

    cd.cdda.ended = true;
    cd.advance(1).unwrap();
    assert_eq!(cd.transport().status, CdDaStatus::Playing);
    assert_eq!(cd.cdda_player().starts.last(), Some(&(1150, 3000 - 1150)));
}

#[test]
fn audio_start_inside_pregap() {
    let mut cd = new_cd();

    // LBA 1100 is in track 2's pregap; play to the end of the track
    send_command(&mut cd, &[0xD8, 0x00, 0x00, 0x00, 0x04, 0x4C, 0, 0, 0, 0x00]);
    assert_eq!(finish_status(&mut cd), 0x00);
    assert_eq!(cd.cdda_player().starts, vec![(1100, 50)]);
    assert_eq!(cd.transport().end_frame, 1150);

    // From inside track 1's data, playback runs through the gap up to track 2
    send_command(&mut cd, &[0xD8, 0x00, 0x00, 0x00, 0x03, 0x84, 0, 0, 0, 0x00]);
    assert_eq!(finish_status(&mut cd), 0x00);
    assert_eq!(cd.cdda_player().starts.last(), Some(&(900, 250)));
}

#[test]
fn read_stops_audio() {
    let mut cd = new_cd();

    send_command(&mut cd, &[0xD8, 0x01, 0x00, 0x00, 0x04, 0xB0, 0, 0, 0, 0x00]);
    assert_eq!(finish_status(&mut cd), 0x00);

    send_command(&mut cd, &[0x08, 0x00, 0x00, 0x00, 0x01, 0x00]);
    assert_eq!(cd.transport().status, CdDaStatus::Off);
    assert!(cd.cdda_player().stopped);
}

#[test]
fn bus_reset() {
    let mut cd = new_cd();
    cd.write(0x02, 0x7C);

    send_command(&mut cd, &[0x08, 0x00, 0x00, 0x00, 0x04, 0x00]);
    cd.advance(scheduler::SECTOR_PERIOD).unwrap();
    assert_eq!(bus_phase(&mut cd), BSY | REQ | IO);

    cd.write(0x04, 0x02);
    assert_eq!(bus_phase(&mut cd), 0);
    assert!(!cd.is_timer_armed(TimerEvent::SectorRead));
    assert!(!cd.motor_on());
    assert_eq!(cd.read(0x02), 0x0C);

    cd.write(0x04, 0x00);
    send_command(&mut cd, &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(finish_status(&mut cd), 0x00);
}

#[test]
fn adpcm_dma_from_cd() {
    let mut cd = new_cd();

    send_command(&mut cd, &[0x08, 0x00, 0x00, 0x05, 0x01, 0x00]);

    // Write address $0000, then start DMA
    cd.write(0x08, 0x00);
    cd.write(0x09, 0x00);
    cd.write(0x0D, 0x02);
    cd.write(0x0D, 0x00);
    cd.write(0x0B, 0x03);
    assert!(cd.is_timer_armed(TimerEvent::AdpcmDma));
    assert_eq!(cd.read(0x0C) & 0x04, 0x04);

    cd.advance(3 * scheduler::SECTOR_PERIOD).unwrap();

    assert_eq!(&cd.adpcm().ram()[..2048], sector_contents(5).as_slice());
    assert_eq!(cd.adpcm().write_pointer(), 2048);
    assert!(!cd.is_timer_armed(TimerEvent::AdpcmDma));
    assert_eq!(cd.read(0x0B) & 0x03, 0x00);
    assert_eq!(cd.read(0x0C) & 0x04, 0x00);
    assert_eq!(finish_status(&mut cd), 0x00);
}

#[test]
fn adpcm_ram_port_wraps() {
    let mut cd = new_cd();

    let bytes: Vec<u8> = (0..65536 + 100).map(|i: u32| (i * 13 + i / 256) as u8).collect();
    for &byte in &bytes {
        cd.write(0x0A, byte);
    }

    assert_eq!(cd.adpcm().write_pointer(), 100);
    assert_eq!(&cd.adpcm().ram()[..100], &bytes[65536..]);
}

#[test]
fn adpcm_playback() {
    let mut cd = new_cd();
    cd.write(0x02, 0x08);

    cd.write(0x0A, 0x12);
    cd.write(0x0A, 0x34);

    // Length 1, read address 0
    cd.write(0x08, 0x01);
    cd.write(0x09, 0x00);
    cd.write(0x0D, 0x10);
    cd.write(0x08, 0x00);
    cd.write(0x0D, 0x08);

    cd.write(0x0E, 0x0F);
    assert_eq!(cd.adpcm_decoder().divider, 1);

    cd.write(0x0D, 0x40);
    assert!(cd.is_timer_armed(TimerEvent::AdpcmNibble));
    assert!(!cd.adpcm_decoder().reset);
    assert_eq!(cd.read(0x0C) & 0x09, 0x08);

    cd.advance(4 * scheduler::ADPCM_NIBBLE_PERIOD_PER_DIVIDER).unwrap();

    assert_eq!(cd.adpcm_decoder().nibbles, vec![0x1, 0x2, 0x3, 0x4]);
    assert!(!cd.is_timer_armed(TimerEvent::AdpcmNibble));
    assert!(cd.adpcm_decoder().reset);
    assert_eq!(cd.read(0x0C) & 0x09, 0x01);

    // The end of playback is only visible through register $0C, even with its IRQ enabled
    assert_eq!(irq_status(&cd), 0x00);
    assert!(!cd.irq_line());
}

#[test]
fn adpcm_rate_change_while_playing() {
    let mut cd = new_cd();

    cd.write(0x0D, 0x40);
    assert_eq!(
        cd.scheduler.period(TimerEvent::AdpcmNibble),
        Some(16 * scheduler::ADPCM_NIBBLE_PERIOD_PER_DIVIDER)
    );

    cd.write(0x0E, 0x0E);
    assert_eq!(
        cd.scheduler.period(TimerEvent::AdpcmNibble),
        Some(2 * scheduler::ADPCM_NIBBLE_PERIOD_PER_DIVIDER)
    );
}

#[test]
fn cdda_fade_in() {
    let mut cd = new_cd();

    cd.write(0x0F, 0x01);
    assert!(cd.is_timer_armed(TimerEvent::CddaFadeIn));
    assert_eq!(cd.fader().cdda(), FadeState { volume: 0.0, active: true });

    cd.advance(20 * scheduler::FADE_PERIOD_100_US).unwrap();

    assert_eq!(cd.fader().cdda(), FadeState { volume: 100.0, active: false });
    assert!(!cd.is_timer_armed(TimerEvent::CddaFadeIn));

    let expected: Vec<f32> = (0..=10).map(|i| 10.0 * i as f32).collect();
    assert_eq!(cd.cdda_player().volumes, expected);

    // ADPCM was not touched
    assert!(cd.adpcm_decoder().volumes.is_empty());
}

#[test]
fn fade_program_only_applies_on_change() {
    let mut cd = new_cd();

    cd.write(0x0F, 0x0D);
    assert!(cd.is_timer_armed(TimerEvent::CddaFadeOut));
    cd.advance(scheduler::FADE_PERIOD_1500_US).unwrap();
    assert_eq!(cd.fader().cdda().volume, 90.0);

    // Same value again does not restart the fade
    cd.write(0x0F, 0x0D);
    assert_eq!(cd.fader().cdda().volume, 90.0);

    // Fading in cancels the fade out
    cd.write(0x0F, 0x00);
    assert!(!cd.is_timer_armed(TimerEvent::CddaFadeOut));
    assert!(cd.is_timer_armed(TimerEvent::CddaFadeIn));
    assert!(cd.is_timer_armed(TimerEvent::AdpcmFadeIn));

    // Unsupported program leaves everything alone
    cd.write(0x0F, 0x03);
    assert!(cd.is_timer_armed(TimerEvent::CddaFadeIn));
    assert_eq!(cd.fader().cdda().volume, 0.0);
}

#[test]
fn bram_lock_through_registers() {
    let mut cd = new_cd();
    assert_eq!(cd.read_bram(0), 0xFF);
    assert_eq!(cd.read(0x07) & 0x80, 0x00);

    cd.write(0x07, 0x80);
    assert_eq!(cd.read(0x07) & 0x80, 0x80);
    assert_eq!(cd.read_bram(0), b'H');

    cd.write_bram(0x10, 0x42);
    assert!(cd.take_bram_dirty());
    assert_eq!(cd.bram()[0x10], 0x42);

    // Unlocking raises no IRQ even when bit 4 is enabled
    cd.write(0x02, 0x10);
    assert_eq!(irq_status(&cd), 0x00);
    assert!(!cd.irq_line());

    // Reading IRQ status locks BRAM again
    cd.read(0x03);
    assert_eq!(cd.read_bram(0x10), 0xFF);
    cd.write_bram(0x10, 0x00);
    assert!(!cd.take_bram_dirty());
}

#[test]
fn cdda_sample_readback() {
    let mut cd = new_cd();
    cd.cdda.sample = (0x1234, 0x5678);

    assert_eq!(cd.read(0x05), 0x78);
    assert_eq!(cd.read(0x06), 0x56);

    cd.read(0x03);
    assert_eq!(cd.read(0x05), 0x34);
    assert_eq!(cd.read(0x06), 0x12);
}

#[test]
fn super_cd_signature() {
    let mut cd = new_cd();
    let signature: Vec<u8> = (0xC1..=0xC7).map(|offset| cd.read(offset)).collect();
    assert_eq!(signature[..3], [0xAA, 0x55, 0x00]);
    assert_eq!(signature[4..], [0xAA, 0x55, 0x03]);

    let config = PceCdConfig { system_card: SystemCard::CdRom2, ..PceCdConfig::default() };
    let mut cd = new_cd_with_config(config, true);
    assert_eq!(cd.read(0xC1), 0x00);
    assert_eq!(cd.read(0xC7), 0x00);
}

#[derive(Debug, Default)]
struct LatchCard {
    latch: u8,
}

impl ArcadeCard for LatchCard {
    fn read(&mut self, _offset: u16) -> u8 {
        self.latch
    }

    fn write(&mut self, offset: u16, value: u8) {
        self.latch = value ^ (offset as u8);
    }
}

#[test]
fn arcade_card_routing() {
    let config = PceCdConfig { system_card: SystemCard::ArcadeCard, ..PceCdConfig::default() };
    let mut cd = new_cd_with_config(config, true);
    assert_eq!(cd.read(0x2A0), 0xFF);

    cd.attach_arcade_card(Box::new(LatchCard::default()));
    cd.write(0x2A0, 0x5A);
    assert_eq!(cd.read(0x3FF), 0x5A ^ 0xA0);

    // Not reachable without the Arcade Card system card
    let mut cd = new_cd();
    cd.attach_arcade_card(Box::new(LatchCard::default()));
    cd.write(0x200, 0x01);
    assert_eq!(cd.read(0x200), 0xFF);
}

#[test]
fn tick_converts_master_clock() {
    let mut cd = new_cd();
    send_command(&mut cd, &[0x08, 0x00, 0x00, 0x00, 0x01, 0x00]);

    // 1/75 second is 286363.6 master clock cycles
    cd.tick(crate::api::MASTER_CLOCK_RATE / 75).unwrap();
    assert_eq!(bus_phase(&mut cd), BSY | CD);

    cd.tick(1).unwrap();
    assert_eq!(bus_phase(&mut cd), BSY | REQ | IO);
}

#[test]
fn save_state_round_trip() {
    let mut cd = new_cd();
    cd.write(0x02, 0x60);
    cd.write(0x0A, 0xAB);
    cd.write(0x0F, 0x09);

    send_command(&mut cd, &[0xD8, 0x01, 0x00, 0x00, 0x04, 0xB0, 0, 0, 0, 0x00]);
    assert_eq!(finish_status(&mut cd), 0x00);
    send_command(&mut cd, &[0x08, 0x00, 0x00, 0x07, 0x02, 0x00]);
    cd.advance(scheduler::SECTOR_PERIOD).unwrap();
    assert_eq!(read_data(&mut cd, 100), sector_contents(7)[..100]);

    let mut state = Vec::new();
    cd.save_state(&mut state).unwrap();

    let mut loaded = new_cd();
    loaded.load_state(state.as_slice()).unwrap();

    assert_eq!(loaded.signals(), cd.signals());
    assert_eq!(loaded.adpcm().ram()[0], 0xAB);
    assert_eq!(loaded.fader().cdda(), cd.fader().cdda());
    assert!(loaded.is_timer_armed(TimerEvent::SectorRead));
    assert!(loaded.is_timer_armed(TimerEvent::CddaFadeOut));
    assert_eq!(loaded.transport().current_frame, 8);
    assert_eq!(loaded.read(0x02), 0x60);

    // Both continue identically
    assert_eq!(read_data(&mut loaded, 1948), sector_contents(7)[100..]);
    assert_eq!(read_data(&mut cd, 1948), sector_contents(7)[100..]);
    loaded.advance(scheduler::SECTOR_PERIOD).unwrap();
    cd.advance(scheduler::SECTOR_PERIOD).unwrap();
    assert_eq!(read_data(&mut loaded, 2048), read_data(&mut cd, 2048));
    assert_eq!(finish_status(&mut loaded), finish_status(&mut cd));

    assert!(loaded.load_state(&[0_u8; 4][..]).is_err());
}

#[derive(Debug, Clone, Copy)]
enum HostOp {
    Write(u16, u8),
    Read(u16),
    Advance(u64),
}

fn host_op() -> impl Strategy<Value = HostOp> {
    prop_oneof![
        (0_u16..0x10, any::<u8>()).prop_map(|(register, value)| HostOp::Write(register, value)),
        // Weight ACK toggles and data writes so that commands actually get sent
        any::<bool>().prop_map(|ack| HostOp::Write(0x02, if ack { 0x80 } else { 0x00 })),
        prop::sample::select(vec![0x00_u8, 0x08, 0xD8, 0xD9, 0xDA, 0xDD, 0xDE])
            .prop_map(|opcode| HostOp::Write(0x01, opcode)),
        (0_u16..0x10).prop_map(HostOp::Read),
        (0_u64..2_000_000).prop_map(HostOp::Advance),
    ]
}

proptest! {
    #[test]
    fn req_and_ack_never_both_set(ops in prop::collection::vec(host_op(), 1..300)) {
        let mut cd = new_cd();

        for op in ops {
            match op {
                HostOp::Write(register, value) => cd.write(register, value),
                HostOp::Read(register) => {
                    cd.read(register);
                }
                HostOp::Advance(ticks) => {
                    // Sector reads past the end of the disc are allowed to fail
                    let _ = cd.advance(ticks);
                }
            }

            let signals = cd.signals();
            prop_assert!(!(signals.req && signals.ack), "REQ and ACK both set after {op:?}");
        }
    }
}
