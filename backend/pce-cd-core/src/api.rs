//! Public interface: the controller object, its collaborators, and errors

use crate::adpcm::Adpcm;
use crate::bram::Bram;
use crate::cdda::{AudioTransport, CdDaStatus};
use crate::fader::{self, FadeChannel, FadeDirection, Fader};
use crate::registers::{self, Registers};
use crate::scheduler::{self, Scheduler, TimerEvent};
use crate::scsi::{BusSignals, ScsiBus};
use bincode::{Decode, Encode};
use cdrom::cue::{Toc, Track};
use cdrom::reader::CdRom;
use cdrom::{CdRomError, CdRomResult};
use pce_cd_config::PceCdConfig;
use std::fmt::{Debug, Formatter};
use thiserror::Error;

/// PC Engine master clock rate in Hz
pub const MASTER_CLOCK_RATE: u64 = 21_477_270;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("unknown command opcode ${0:02X}")]
    UnknownOpcode(u8),
    #[error("command buffer overflowed past {len} bytes")]
    CommandBufferOverflow { len: usize },
    #[error("unknown GET DIR INFO sub-function ${0:02X}")]
    UnknownDirInfoMode(u8),
}

#[derive(Debug, Error)]
pub enum PceCdError {
    #[error("CD bus protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),
    #[error("Disc-related error: {0}")]
    Disc(#[from] CdRomError),
    #[error("Error saving state: {0}")]
    SaveStateEncode(#[from] bincode::error::EncodeError),
    #[error("Error loading state: {0}")]
    SaveStateDecode(#[from] bincode::error::DecodeError),
    #[error("I/O error writing state: {0}")]
    SaveStateIo(#[from] std::io::Error),
}

pub type PceCdResult<T> = Result<T, PceCdError>;

/// Random access to a mounted disc's data sectors and table of contents.
pub trait SectorSource {
    /// Read the 2048 data bytes of the sector at the given LBA.
    ///
    /// # Errors
    ///
    /// Should return an error on I/O failure or if the frame is past the end of the disc.
    fn read_sector(
        &mut self,
        frame: u32,
        out: &mut [u8; cdrom::DATA_BYTES_PER_SECTOR],
    ) -> CdRomResult<()>;

    fn toc(&self) -> &Toc;

    fn track_of(&self, frame: u32) -> Option<&Track> {
        self.toc().find_track_by_frame(frame)
    }
}

impl SectorSource for CdRom {
    fn read_sector(
        &mut self,
        frame: u32,
        out: &mut [u8; cdrom::DATA_BYTES_PER_SECTOR],
    ) -> CdRomResult<()> {
        self.read_data_sector(frame, out)
    }

    fn toc(&self) -> &Toc {
        CdRom::toc(self)
    }

    fn track_of(&self, frame: u32) -> Option<&Track> {
        CdRom::track_of(self, frame)
    }
}

/// CD-DA playback. Frames are LBAs.
pub trait AudioTrackPlayer {
    fn start(&mut self, frame: u32, frame_count: u32);

    fn pause(&mut self, paused: bool);

    fn stop(&mut self);

    fn current_frame(&self) -> u32;

    /// Returns true once after playback reaches the end of the last started range.
    fn has_ended_since_last_poll(&mut self) -> bool;

    /// Volume in the range 0.0 to 100.0.
    fn set_volume(&mut self, volume: f32);

    /// The sample currently being output, as (left, right).
    fn current_sample(&self) -> (i16, i16) {
        (0, 0)
    }
}

/// MSM5205-style ADPCM decoder fed one nibble at a time.
pub trait AdpcmClock {
    fn supply_nibble(&mut self, nibble: u8);

    fn set_clock_divider(&mut self, divider: u8);

    fn reset(&mut self, asserted: bool);

    /// Volume in the range 0.0 to 100.0.
    fn set_volume(&mut self, volume: f32);
}

/// Arcade Card expansion registers at controller offsets $200-$3FF.
pub trait ArcadeCard {
    fn read(&mut self, offset: u16) -> u8;

    fn write(&mut self, offset: u16, value: u8);
}

// Converts master clock cycles to scheduler ticks without drift
#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct Prescaler {
    product: u64,
}

impl Prescaler {
    fn tick(&mut self, mclk_cycles: u64) -> u64 {
        self.product += mclk_cycles * scheduler::TICKS_PER_SECOND;
        let ticks = self.product / MASTER_CLOCK_RATE;
        self.product %= MASTER_CLOCK_RATE;
        ticks
    }
}

pub struct PceCd<D, P, M> {
    pub(crate) disc: Option<D>,
    pub(crate) cdda: P,
    pub(crate) adpcm_decoder: M,
    pub(crate) arcade_card: Option<Box<dyn ArcadeCard>>,
    pub(crate) config: PceCdConfig,
    pub(crate) registers: Registers,
    pub(crate) bus: ScsiBus,
    pub(crate) transport: AudioTransport,
    pub(crate) adpcm: Adpcm,
    pub(crate) fader: Fader,
    pub(crate) bram: Bram,
    pub(crate) scheduler: Scheduler,
    pub(crate) prescaler: Prescaler,
    pub(crate) cycles: u64,
    pub(crate) motor_on: bool,
    pub(crate) fault: Option<ProtocolViolation>,
}

impl<D, P, M> Debug for PceCd<D, P, M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PceCd")
            .field("disc_mounted", &self.disc.is_some())
            .field("config", &self.config)
            .field("signals", &self.bus.signals)
            .field("transport", &self.transport)
            .field("cycles", &self.cycles)
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

impl<D: SectorSource, P: AudioTrackPlayer, M: AdpcmClock> PceCd<D, P, M> {
    /// Create a controller. `initial_bram` is a previously saved BRAM image; a formatted BRAM is
    /// created if it is missing or invalid.
    pub fn new(
        config: PceCdConfig,
        disc: Option<D>,
        cdda: P,
        adpcm_decoder: M,
        initial_bram: Option<&[u8]>,
    ) -> Self {
        let last_frame = disc.as_ref().map_or(0, |disc| disc.toc().end_frame());

        Self {
            disc,
            cdda,
            adpcm_decoder,
            arcade_card: None,
            config,
            registers: Registers::new(),
            bus: ScsiBus::new(),
            transport: AudioTransport::new(last_frame),
            adpcm: Adpcm::new(),
            fader: Fader::new(),
            bram: Bram::new(initial_bram),
            scheduler: Scheduler::new(),
            prescaler: Prescaler::default(),
            cycles: 0,
            motor_on: false,
            fault: None,
        }
    }

    /// Attach Arcade Card hardware. Only reachable if the configured system card is the Arcade
    /// Card.
    pub fn attach_arcade_card(&mut self, card: Box<dyn ArcadeCard>) {
        self.arcade_card = Some(card);
    }

    /// Read from controller-relative offset $000-$3FF.
    pub fn read(&mut self, offset: u16) -> u8 {
        let offset = offset & 0x3FF;

        if offset & 0x200 != 0 {
            return match (&mut self.arcade_card, self.config.system_card.has_arcade_card()) {
                (Some(card), true) => card.read(offset),
                _ => 0xFF,
            };
        }

        if offset & 0xC0 == 0xC0 && self.config.system_card.has_super_cd_signature() {
            if let Some(value) = registers::super_cd_signature(offset) {
                return value;
            }
        }

        self.read_register((offset & 0x0F) as u8)
    }

    /// Write to controller-relative offset $000-$3FF.
    pub fn write(&mut self, offset: u16, value: u8) {
        let offset = offset & 0x3FF;

        if offset & 0x200 != 0 {
            if let (Some(card), true) =
                (&mut self.arcade_card, self.config.system_card.has_arcade_card())
            {
                card.write(offset, value);
            }
            return;
        }

        self.write_register((offset & 0x0F) as u8, value);
    }

    /// Advance the controller by the given number of master clock cycles, firing any timers that
    /// come due. Time always advances by the full amount, even when an error is returned.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation recorded before this call, or else the first error from
    /// reading the disc during this call.
    pub fn tick(&mut self, mclk_cycles: u64) -> PceCdResult<()> {
        let pending_fault = self.fault.take();

        let ticks = self.prescaler.tick(mclk_cycles);
        let result = self.advance(ticks);

        match pending_fault {
            Some(violation) => {
                if let Err(err) = result {
                    log::error!("CD read error while reporting '{violation}': {err}");
                }
                Err(violation.into())
            }
            None => result,
        }
    }

    pub(crate) fn advance(&mut self, ticks: u64) -> PceCdResult<()> {
        let target = self.cycles + ticks;
        let mut first_error = None;

        while let Some((event, cycles)) = self.scheduler.pop(target) {
            self.cycles = cycles;
            if let Err(err) = self.handle_timer(event) {
                first_error.get_or_insert(err);
            }
            self.pump();
        }

        self.cycles = target;
        self.poll_cdda_end();

        first_error.map_or(Ok(()), Err)
    }

    fn handle_timer(&mut self, event: TimerEvent) -> PceCdResult<()> {
        match event {
            TimerEvent::SectorRead => self.sector_read_timer()?,
            TimerEvent::AdpcmDma => self.adpcm_dma_timer(),
            TimerEvent::AdpcmNibble => self.adpcm_nibble_timer(),
            TimerEvent::CddaFadeIn
            | TimerEvent::CddaFadeOut
            | TimerEvent::AdpcmFadeIn
            | TimerEvent::AdpcmFadeOut => self.fade_timer(event),
            TimerEvent::Dummy => {}
        }

        Ok(())
    }

    fn adpcm_dma_timer(&mut self) {
        let signals = self.bus.signals;
        if signals.req && !signals.ack && !signals.cd && signals.io {
            let byte = self.read_cd_data_byte();
            self.adpcm.dma_write(byte);
            self.adpcm.set_dma_busy(true);
            return;
        }

        // Stalled; keep waiting only if another sector is on its way
        self.adpcm.set_dma_busy(false);
        if !self.scheduler.is_armed(TimerEvent::SectorRead) && !self.bus.data_pending() {
            log::debug!("ADPCM DMA finished at write pointer {:04X}", self.adpcm.write_pointer());

            self.scheduler.disarm(TimerEvent::AdpcmDma);
            self.registers.dma_control &= !registers::DMA_CONTROL_ENABLE;
        }
    }

    fn adpcm_nibble_timer(&mut self) {
        let Some(output) = self.adpcm.clock_nibble() else {
            self.scheduler.disarm(TimerEvent::AdpcmNibble);
            return;
        };

        self.adpcm_decoder.supply_nibble(output.nibble);

        if output.ended {
            self.scheduler.disarm(TimerEvent::AdpcmNibble);
            self.adpcm_decoder.reset(true);
        }
    }

    fn fade_timer(&mut self, event: TimerEvent) {
        let Some((channel, direction)) = fader::timer_fade(event) else { return };

        let (volume, done) = self.fader.step(channel, direction);
        self.push_volume(channel, volume);

        if done {
            log::trace!("{channel:?} fade {direction:?} complete at volume {volume}");
            self.scheduler.disarm(event);
        }
    }

    pub(crate) fn push_volume(&mut self, channel: FadeChannel, volume: f32) {
        match channel {
            FadeChannel::CdDa => self.cdda.set_volume(volume),
            FadeChannel::Adpcm => self.adpcm_decoder.set_volume(volume),
        }
    }

    pub(crate) fn apply_fade_program(&mut self, program: u8) {
        let Some(fades) = fader::fade_program(program) else {
            log::warn!("Unsupported CD-DA/ADPCM fade program {:X}", program & 0x0F);
            return;
        };

        log::debug!("Fade program {:X}", program & 0x0F);

        for &fade in fades {
            let opposite = match fade.direction {
                FadeDirection::In => FadeDirection::Out,
                FadeDirection::Out => FadeDirection::In,
            };
            self.scheduler.disarm(fader::fade_timer(fade.channel, opposite));

            let volume = self.fader.start(fade);
            self.push_volume(fade.channel, volume);
            self.scheduler.arm(fade.timer(), self.cycles, fade.period);
        }
    }

    pub(crate) fn poll_cdda_end(&mut self) {
        if self.transport.poll_end(&mut self.cdda) {
            self.set_irq(registers::IRQ_TRANSFER_DONE, true);
        }
    }

    /// Whether the IRQ line to the CPU is asserted.
    pub fn irq_line(&self) -> bool {
        self.registers.irq_line()
    }

    /// Read a byte of BRAM. Returns $FF while BRAM is locked.
    pub fn read_bram(&self, offset: u16) -> u8 {
        self.bram.read(offset)
    }

    /// Write a byte of BRAM. Ignored while BRAM is locked.
    pub fn write_bram(&mut self, offset: u16, value: u8) {
        self.bram.write(offset, value);
    }

    pub fn bram(&self) -> &[u8] {
        self.bram.contents()
    }

    /// Returns whether BRAM has been written since the last call, for persisting saves.
    pub fn take_bram_dirty(&mut self) -> bool {
        self.bram.take_dirty()
    }

    /// Insert a disc, replacing any disc already mounted.
    pub fn mount(&mut self, disc: D) -> Option<D> {
        let last_frame = disc.toc().end_frame();
        let prev = self.eject();

        self.transport.last_frame = last_frame;
        self.transport.end_frame = last_frame;
        self.disc = Some(disc);

        prev
    }

    pub fn eject(&mut self) -> Option<D> {
        self.transport.stop(&mut self.cdda);
        self.scheduler.disarm(TimerEvent::SectorRead);
        self.transport.last_frame = 0;
        self.transport.end_frame = 0;
        self.motor_on = false;

        self.disc.take()
    }

    pub fn disc(&self) -> Option<&D> {
        self.disc.as_ref()
    }

    pub fn cdda_player(&self) -> &P {
        &self.cdda
    }

    pub fn adpcm_decoder(&self) -> &M {
        &self.adpcm_decoder
    }

    pub fn signals(&self) -> BusSignals {
        self.bus.signals
    }

    pub fn transport(&self) -> &AudioTransport {
        &self.transport
    }

    pub fn adpcm(&self) -> &Adpcm {
        &self.adpcm
    }

    pub fn fader(&self) -> &Fader {
        &self.fader
    }

    pub fn is_timer_armed(&self, event: TimerEvent) -> bool {
        self.scheduler.is_armed(event)
    }

    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    /// Protocol violation waiting to be reported by the next [`Self::tick`].
    pub fn pending_fault(&self) -> Option<ProtocolViolation> {
        self.fault
    }

    pub(crate) fn record_fault(&mut self, violation: ProtocolViolation) {
        log::error!("CD bus protocol violation: {violation}");
        self.fault = Some(violation);
    }

    // Restart the player so that it matches the transport state, e.g. after loading a save state
    pub(crate) fn resync_cdda(&mut self) {
        match self.transport.status {
            CdDaStatus::Off => self.cdda.stop(),
            CdDaStatus::Playing => {
                let AudioTransport { current_frame, end_frame, .. } = self.transport;
                self.cdda.start(current_frame, end_frame.saturating_sub(current_frame));
            }
            CdDaStatus::Paused => {
                let AudioTransport { current_frame, end_frame, .. } = self.transport;
                self.cdda.start(current_frame, end_frame.saturating_sub(current_frame));
                self.cdda.pause(true);
            }
        }

        self.cdda.set_volume(self.fader.cdda().volume);
        self.adpcm_decoder.set_volume(self.fader.adpcm().volume);
        self.adpcm_decoder.set_clock_divider(self.adpcm.clock_divider());
        self.adpcm_decoder.reset(!self.adpcm.is_playing());
    }
}
