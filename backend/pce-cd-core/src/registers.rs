//! Register file at $1800-$180F and its read/write side effects

use crate::api::{AdpcmClock, AudioTrackPlayer, PceCd, SectorSource};
use crate::scheduler::{self, TimerEvent};
use bincode::{Decode, Encode};

// IRQ bits shared by the enable mask ($02) and the status register ($03)
pub const IRQ_TRANSFER_READY: u8 = 0x40;
pub const IRQ_TRANSFER_DONE: u8 = 0x20;
// Bits 2-4 (ADPCM half, ADPCM end, BRAM) can be enabled but nothing raises them
const IRQ_MASK: u8 = 0x7C;

// $02 bit 7
const ACK_BIT: u8 = 0x80;

// $03 bits that are not IRQ status
const MOTOR_BIT: u8 = 0x10;
const LR_TOGGLE_BIT: u8 = 0x02;

// $04 bit 1
const RESET_BIT: u8 = 0x02;

// $07 bit 7
const BRAM_UNLOCK_BIT: u8 = 0x80;

// $0B bits 0-1
pub const DMA_CONTROL_ENABLE: u8 = 0x03;

/// Super CD-ROM² system card identification bytes at $18C1-$18C7.
pub fn super_cd_signature(offset: u16) -> Option<u8> {
    match offset & 0xCF {
        0xC1 | 0xC5 => Some(0xAA),
        0xC2 | 0xC6 => Some(0x55),
        0xC3 => Some(0x00),
        0xC7 => Some(0x03),
        _ => None,
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Registers {
    // $00 low 3 bits as last written
    pub status_low: u8,
    // $01
    pub data: u8,
    // $02
    pub irq_mask: u8,
    // $03
    pub irq_status: u8,
    // $04
    pub reset: u8,
    // $07
    pub bram_control: u8,
    // $08-$09
    pub address: u16,
    // $0B
    pub dma_control: u8,
    // $0E
    pub adpcm_rate: u8,
    // $0F
    pub fade: u8,
}

impl Registers {
    pub fn new() -> Self {
        Self {
            status_low: 0,
            data: 0,
            irq_mask: 0,
            irq_status: 0,
            reset: 0,
            bram_control: 0,
            address: 0,
            dma_control: 0,
            adpcm_rate: 0,
            fade: 0,
        }
    }

    pub fn irq_line(&self) -> bool {
        self.irq_mask & self.irq_status & IRQ_MASK != 0
    }
}

impl<D: SectorSource, P: AudioTrackPlayer, M: AdpcmClock> PceCd<D, P, M> {
    pub(crate) fn set_irq(&mut self, irq: u8, asserted: bool) {
        if asserted {
            self.registers.irq_status |= irq;
        } else {
            self.registers.irq_status &= !irq;
        }
    }

    pub(crate) fn read_register(&mut self, register: u8) -> u8 {
        let value = match register {
            0x00 => {
                let signals = self.bus.signals;
                (u8::from(signals.bsy) << 7)
                    | (u8::from(signals.req) << 6)
                    | (u8::from(signals.msg) << 5)
                    | (u8::from(signals.cd) << 4)
                    | (u8::from(signals.io) << 3)
                    | (self.registers.status_low & 0x07)
            }
            0x01 => self.registers.data,
            0x02 => self.registers.irq_mask,
            0x03 => {
                // Reading status locks BRAM and flips the CD-DA sample channel select
                self.bram.lock();

                let value = (self.registers.irq_status & !MOTOR_BIT)
                    | if self.motor_on { MOTOR_BIT } else { 0 };
                self.registers.irq_status ^= LR_TOGGLE_BIT;
                value
            }
            0x04 => self.registers.reset,
            0x05 | 0x06 => {
                let (left, right) = self.cdda.current_sample();
                let sample = if self.registers.irq_status & LR_TOGGLE_BIT != 0 { left } else { right };
                let [lsb, msb] = sample.to_le_bytes();
                if register == 0x05 { lsb } else { msb }
            }
            0x07 => {
                if self.bram.is_locked() {
                    self.registers.bram_control & !BRAM_UNLOCK_BIT
                } else {
                    self.registers.bram_control | BRAM_UNLOCK_BIT
                }
            }
            0x08 => self.read_cd_data_byte(),
            0x0A => self.adpcm.read_data_port(),
            0x0B => self.registers.dma_control,
            0x0C => self.adpcm.status(),
            0x0D => self.adpcm.control(),
            0x09 | 0x0E | 0x0F => 0x00,
            _ => unreachable!("register is masked to 4 bits"),
        };

        log::trace!("CD register read: {register:X} = {value:02X}");

        value
    }

    pub(crate) fn write_register(&mut self, register: u8, value: u8) {
        log::trace!("CD register write: {register:X} = {value:02X}");

        match register {
            0x00 => {
                self.registers.status_low = value & 0x07;

                // Any write pulses SEL
                self.bus.signals.sel = true;
                self.pump();
                self.bus.signals.sel = false;
                self.pump();

                self.scheduler.disarm(TimerEvent::AdpcmDma);
                self.set_irq(IRQ_TRANSFER_READY | IRQ_TRANSFER_DONE, false);
            }
            0x01 => {
                self.registers.data = value;
            }
            0x02 => {
                self.bus.signals.ack = value & ACK_BIT != 0;
                self.registers.irq_mask = value;
            }
            0x04 => {
                if value & RESET_BIT != 0 {
                    // Reset masks off the transfer and BRAM IRQs
                    self.registers.irq_mask &= 0x8F;
                }
                self.bus.signals.rst = value & RESET_BIT != 0;
                self.registers.reset = value;
            }
            0x07 => {
                if value & BRAM_UNLOCK_BIT != 0 {
                    self.bram.unlock();
                }
                self.registers.bram_control = value;
            }
            0x08 => {
                self.registers.address = (self.registers.address & 0xFF00) | u16::from(value);
            }
            0x09 => {
                self.registers.address =
                    (self.registers.address & 0x00FF) | (u16::from(value) << 8);
            }
            0x0A => {
                self.adpcm.write_data_port(value);
            }
            0x0B => {
                if value & DMA_CONTROL_ENABLE != 0
                    && !self.scheduler.is_armed(TimerEvent::AdpcmDma)
                {
                    log::debug!("Starting CD to ADPCM DMA");

                    self.scheduler.arm(TimerEvent::AdpcmDma, self.cycles, scheduler::DMA_BYTE_PERIOD);
                    self.adpcm.set_dma_busy(true);
                }
                self.registers.dma_control = value;
            }
            0x0D => {
                let effect = self.adpcm.write_control(value, self.registers.address);

                if effect.stopped {
                    self.scheduler.disarm(TimerEvent::AdpcmNibble);
                    self.adpcm_decoder.reset(true);
                }

                if effect.started {
                    self.adpcm_decoder.reset(false);
                    self.scheduler.arm(
                        TimerEvent::AdpcmNibble,
                        self.cycles,
                        scheduler::ADPCM_NIBBLE_PERIOD_PER_DIVIDER
                            * u64::from(self.adpcm.clock_divider()),
                    );
                }
            }
            0x0E => {
                let divider = self.adpcm.write_rate(value);
                self.adpcm_decoder.set_clock_divider(divider);

                if let Some(period) = self.scheduler.period(TimerEvent::AdpcmNibble) {
                    let new_period = scheduler::ADPCM_NIBBLE_PERIOD_PER_DIVIDER * u64::from(divider);
                    if period != new_period {
                        self.scheduler.arm(TimerEvent::AdpcmNibble, self.cycles, new_period);
                    }
                }

                self.registers.adpcm_rate = value;
            }
            0x0F => {
                if value != self.registers.fade {
                    self.apply_fade_program(value);
                }
                self.registers.fade = value;
            }
            0x03 | 0x05 | 0x06 | 0x0C => {
                log::trace!("Ignoring write to read-only CD register {register:X}");
            }
            _ => unreachable!("register is masked to 4 bits"),
        }

        self.pump();
    }

    /// Read the data register, completing a REQ/ACK handshake if the drive is presenting a data
    /// byte.
    pub(crate) fn read_cd_data_byte(&mut self) -> u8 {
        let value = self.registers.data;

        let signals = self.bus.signals;
        if signals.req && !signals.ack && !signals.cd && signals.io {
            self.bus.signals.ack = true;
            self.pump();
            self.bus.signals.ack = false;
            self.pump();
        }

        value
    }
}
