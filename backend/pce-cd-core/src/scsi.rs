//! SCSI-like command/status/data bus between the CPU-side registers and the CD drive

mod commands;

use crate::api::{AdpcmClock, AudioTrackPlayer, PceCd, PceCdResult, ProtocolViolation, SectorSource};
use crate::registers;
use crate::scheduler::TimerEvent;
use bincode::{Decode, Encode};

const COMMAND_BUFFER_LEN: usize = 256;
const DATA_BUFFER_LEN: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Good,
    CheckCondition,
}

impl Status {
    // Value presented in the data register during the status phase
    fn to_byte(self) -> u8 {
        match self {
            Self::Good => 0x00,
            Self::CheckCondition => 0x01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct BusSignals {
    pub bsy: bool,
    pub sel: bool,
    /// Control/data: set for command, status, and message phases
    pub cd: bool,
    /// Input/output: set when the drive is driving the bus
    pub io: bool,
    pub msg: bool,
    pub req: bool,
    pub ack: bool,
    pub atn: bool,
    pub rst: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TestUnitReady,
    Read6,
    SetAudioStart,
    SetAudioEnd,
    Pause,
    ReadSubchannelQ,
    GetDirInfo,
}

impl Command {
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            0x00 => Some(Self::TestUnitReady),
            0x08 => Some(Self::Read6),
            0xD8 => Some(Self::SetAudioStart),
            0xD9 => Some(Self::SetAudioEnd),
            0xDA => Some(Self::Pause),
            0xDD => Some(Self::ReadSubchannelQ),
            0xDE => Some(Self::GetDirInfo),
            _ => None,
        }
    }

    /// Command length in bytes, including the opcode.
    pub fn len(self) -> usize {
        match self {
            Self::TestUnitReady | Self::Read6 => 6,
            Self::SetAudioStart
            | Self::SetAudioEnd
            | Self::Pause
            | Self::ReadSubchannelQ
            | Self::GetDirInfo => 10,
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct ScsiBus {
    pub signals: BusSignals,
    pub selected: bool,
    pub last_rst: bool,
    pub status_sent: bool,
    pub message_sent: bool,
    pub message_after_status: bool,
    pub data_transferred: bool,
    command_buffer: Vec<u8>,
    data_buffer: Box<[u8; DATA_BUFFER_LEN]>,
    data_index: usize,
    data_size: usize,
}

// Everything a pump pass can change; the pump repeats until this stops changing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PumpSnapshot {
    signals: BusSignals,
    selected: bool,
    status_sent: bool,
    message_sent: bool,
    command_len: usize,
    data_index: usize,
    data_size: usize,
}

impl ScsiBus {
    pub fn new() -> Self {
        Self {
            signals: BusSignals::default(),
            selected: false,
            last_rst: false,
            status_sent: false,
            message_sent: false,
            message_after_status: false,
            data_transferred: false,
            command_buffer: Vec::with_capacity(COMMAND_BUFFER_LEN),
            data_buffer: vec![0; DATA_BUFFER_LEN].into_boxed_slice().try_into().unwrap(),
            data_index: 0,
            data_size: 0,
        }
    }

    /// Whether bytes remain in the data buffer that have not been presented to the host.
    pub fn data_pending(&self) -> bool {
        self.data_index < self.data_size
    }

    pub fn command_buffer(&self) -> &[u8] {
        &self.command_buffer
    }

    fn snapshot(&self) -> PumpSnapshot {
        PumpSnapshot {
            signals: self.signals,
            selected: self.selected,
            status_sent: self.status_sent,
            message_sent: self.message_sent,
            command_len: self.command_buffer.len(),
            data_index: self.data_index,
            data_size: self.data_size,
        }
    }

    fn clear_data(&mut self) {
        self.data_index = 0;
        self.data_size = 0;
        self.data_transferred = false;
    }

    fn sector_buffer_mut(&mut self) -> &mut [u8; cdrom::DATA_BYTES_PER_SECTOR] {
        self.data_buffer
            .first_chunk_mut()
            .expect("data buffer is larger than one sector; this is a bug")
    }

    // Queue a reply for the data-in phase; status follows once the host has read all of it
    fn load_reply(&mut self, reply: &[u8]) {
        self.data_buffer[..reply.len()].copy_from_slice(reply);
        self.data_index = 0;
        self.data_size = reply.len();
        self.data_transferred = true;
        self.signals.io = true;
        self.signals.cd = false;
    }
}

impl<D: SectorSource, P: AudioTrackPlayer, M: AdpcmClock> PceCd<D, P, M> {
    /// Evaluate the bus state machine until it settles, then poll for the end of CD-DA playback.
    pub(crate) fn pump(&mut self) {
        loop {
            let before = self.bus.snapshot();
            self.pump_pass();
            if self.bus.snapshot() == before {
                break;
            }
        }

        self.poll_cdda_end();
    }

    fn pump_pass(&mut self) {
        let rst = self.bus.signals.rst;
        if rst && !self.bus.last_rst {
            self.bus_reset();
        }
        self.bus.last_rst = rst;

        self.check_bus_release();

        if self.bus.signals.sel && !self.bus.selected {
            log::trace!("CD drive selected");

            self.bus.selected = true;
            self.bus.signals.cd = true;
            self.bus.signals.bsy = true;
            self.bus.signals.req = true;
            self.bus.signals.msg = false;
            self.bus.signals.io = false;
            self.bus.command_buffer.clear();
        }

        if !self.bus.signals.atn {
            let BusSignals { cd, io, msg, bsy, .. } = self.bus.signals;
            match (cd, io, msg) {
                (true, _, true) => self.message_phase(),
                (true, true, false) => self.status_phase(),
                (true, false, false) => self.command_phase(),
                (false, true, _) => self.data_in_phase(),
                (false, false, _) => {
                    if bsy {
                        self.data_out_phase();
                    }
                }
            }
        }

        self.check_bus_release();
    }

    fn bus_reset(&mut self) {
        log::debug!("CD bus reset");

        let signals = &mut self.bus.signals;
        *signals = BusSignals { ack: signals.ack, rst: signals.rst, ..BusSignals::default() };

        self.bus.selected = false;
        self.bus.status_sent = false;
        self.bus.message_sent = false;
        self.bus.message_after_status = false;
        self.bus.command_buffer.clear();
        self.bus.clear_data();
        self.motor_on = false;

        self.transport.stop(&mut self.cdda);
        self.scheduler.disarm(TimerEvent::AdpcmDma);
        self.scheduler.disarm(TimerEvent::SectorRead);
    }

    fn check_bus_release(&mut self) {
        let signals = &mut self.bus.signals;
        if !signals.sel && !signals.bsy && self.bus.selected {
            log::trace!("CD bus free");

            self.bus.selected = false;
            signals.cd = false;
            signals.msg = false;
            signals.io = false;
            signals.req = false;
            self.set_irq(registers::IRQ_TRANSFER_DONE, false);
        }
    }

    fn message_phase(&mut self) {
        let signals = &mut self.bus.signals;
        if signals.req && signals.ack {
            signals.req = false;
            self.bus.message_sent = true;
        } else if !signals.req && !signals.ack && self.bus.message_sent {
            self.bus.message_sent = false;
            signals.bsy = false;
        }
    }

    fn status_phase(&mut self) {
        let signals = &mut self.bus.signals;
        if signals.req && signals.ack {
            signals.req = false;
            self.bus.status_sent = true;
        } else if !signals.req && !signals.ack && self.bus.status_sent {
            self.bus.status_sent = false;
            if self.bus.message_after_status {
                self.bus.message_after_status = false;
                signals.msg = true;
                signals.req = true;
                self.registers.data = 0x00;
            }
        }
    }

    fn command_phase(&mut self) {
        let BusSignals { req, ack, .. } = self.bus.signals;

        if req && ack {
            self.bus.signals.req = false;

            if self.bus.command_buffer.len() == COMMAND_BUFFER_LEN {
                self.bus.command_buffer.clear();
                self.record_fault(ProtocolViolation::CommandBufferOverflow {
                    len: COMMAND_BUFFER_LEN,
                });
                self.reply_status(Status::CheckCondition);
                return;
            }

            self.bus.command_buffer.push(self.registers.data);
        } else if !req && !ack && !self.bus.command_buffer.is_empty() {
            let opcode = self.bus.command_buffer[0];
            let Some(command) = Command::from_opcode(opcode) else {
                self.bus.command_buffer.clear();
                self.record_fault(ProtocolViolation::UnknownOpcode(opcode));
                self.reply_status(Status::CheckCondition);
                return;
            };

            if self.bus.command_buffer.len() < command.len() {
                self.bus.signals.req = true;
                return;
            }

            let command_bytes = std::mem::take(&mut self.bus.command_buffer);
            log::debug!("Executing CD command {command:?}: {command_bytes:02X?}");

            self.execute_command(command, &command_bytes);

            // Reuse the allocation
            self.bus.command_buffer = command_bytes;
            self.bus.command_buffer.clear();
        }
    }

    fn data_in_phase(&mut self) {
        let BusSignals { req, ack, .. } = self.bus.signals;

        if req && ack {
            self.bus.signals.req = false;
        } else if !req && !ack {
            if self.bus.data_pending() {
                self.registers.data = self.bus.data_buffer[self.bus.data_index];
                self.bus.data_index += 1;
                self.bus.signals.req = true;
            } else {
                self.set_irq(registers::IRQ_TRANSFER_READY, false);
                if self.bus.data_transferred {
                    self.bus.data_transferred = false;
                    self.reply_status(Status::Good);
                    self.set_irq(registers::IRQ_TRANSFER_DONE, true);
                }
            }
        }
    }

    fn data_out_phase(&mut self) {
        let BusSignals { req, ack, .. } = self.bus.signals;

        if req && ack {
            self.adpcm.dma_write(self.registers.data);
            self.bus.data_index += 1;
            self.bus.signals.req = false;
        } else if !req && !ack {
            if self.bus.data_pending() {
                self.bus.signals.req = true;
            } else {
                self.reply_status(Status::Good);
            }
        }
    }

    /// Enter the status phase with the given status byte; a message byte follows it.
    pub(crate) fn reply_status(&mut self, status: Status) {
        log::trace!("CD status reply: {status:?}");

        let signals = &mut self.bus.signals;
        signals.cd = true;
        signals.io = true;
        signals.req = true;
        signals.msg = false;

        self.bus.message_after_status = true;
        self.bus.status_sent = false;
        self.bus.message_sent = false;
        self.registers.data = status.to_byte();
    }

    pub(crate) fn sector_read_timer(&mut self) -> PceCdResult<()> {
        if self.bus.data_pending() {
            // Host has not finished reading the previous sector
            return Ok(());
        }

        let Some(disc) = &mut self.disc else {
            self.scheduler.disarm(TimerEvent::SectorRead);
            return Ok(());
        };

        let frame = self.transport.current_frame;
        log::trace!("Reading sector {frame}");

        if let Err(err) = disc.read_sector(frame, self.bus.sector_buffer_mut()) {
            self.scheduler.disarm(TimerEvent::SectorRead);
            self.bus.clear_data();
            self.reply_status(Status::CheckCondition);
            return Err(err.into());
        }

        self.bus.data_index = 0;
        self.bus.data_size = cdrom::DATA_BYTES_PER_SECTOR;
        self.transport.current_frame += 1;
        self.bus.signals.io = true;
        self.bus.signals.cd = false;

        if self.transport.current_frame == self.transport.end_frame {
            log::debug!("Finished reading sectors at frame {}", self.transport.current_frame);

            self.bus.data_transferred = true;
            self.scheduler.disarm(TimerEvent::SectorRead);
        } else {
            self.bus.data_transferred = false;
        }

        Ok(())
    }
}
