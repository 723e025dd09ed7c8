//! ADPCM RAM, its read/write/playback pointers, and the address control register

use bincode::{Decode, Encode};

pub const ADPCM_RAM_LEN: usize = 64 * 1024;

// Register $0C bits
pub const STATUS_END: u8 = 0x01;
pub const STATUS_BUSY: u8 = 0x04;
pub const STATUS_PLAYING: u8 = 0x08;

// Register $0D bits
const CONTROL_WRITE_ADDR_LOW_BIT: u8 = 0x01;
const CONTROL_SET_WRITE_ADDR: u8 = 0x02;
const CONTROL_SET_READ_ADDR: u8 = 0x08;
const CONTROL_SET_LENGTH: u8 = 0x10;
const CONTROL_PLAY: u8 = 0x40;
const CONTROL_RESET: u8 = 0x80;

/// What the controller needs to do after an address control write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlEffect {
    pub started: bool,
    pub stopped: bool,
}

/// One nibble produced by the playback clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NibbleOutput {
    pub nibble: u8,
    /// Playback moved past the end address and stopped
    pub ended: bool,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Adpcm {
    ram: Box<[u8; ADPCM_RAM_LEN]>,
    read_pointer: u16,
    write_pointer: u16,
    read_holdoff: u8,
    write_holdoff: u8,
    play_start: u16,
    play_end: u16,
    play_half: u16,
    low_nibble: bool,
    playing: bool,
    length: u16,
    clock_divider: u8,
    control: u8,
    status: u8,
}

impl Adpcm {
    pub fn new() -> Self {
        Self {
            ram: vec![0; ADPCM_RAM_LEN].into_boxed_slice().try_into().unwrap(),
            read_pointer: 0,
            write_pointer: 0,
            read_holdoff: 0,
            write_holdoff: 0,
            play_start: 0,
            play_end: 0,
            play_half: 0,
            low_nibble: false,
            playing: false,
            length: 0,
            clock_divider: 16,
            control: 0,
            status: STATUS_END,
        }
    }

    pub fn ram(&self) -> &[u8; ADPCM_RAM_LEN] {
        &self.ram
    }

    pub fn read_pointer(&self) -> u16 {
        self.read_pointer
    }

    pub fn write_pointer(&self) -> u16 {
        self.write_pointer
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn play_range(&self) -> (u16, u16, u16) {
        (self.play_start, self.play_half, self.play_end)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn clock_divider(&self) -> u8 {
        self.clock_divider
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn control(&self) -> u8 {
        self.control
    }

    pub fn set_dma_busy(&mut self, busy: bool) {
        if busy {
            self.status |= STATUS_BUSY;
        } else {
            self.status &= !STATUS_BUSY;
        }
    }

    /// RAM data port write ($0A). Discards the byte while the write holdoff is counting down.
    pub fn write_data_port(&mut self, value: u8) {
        if self.write_holdoff > 0 {
            self.write_holdoff -= 1;
            return;
        }

        self.dma_write(value);
    }

    /// RAM data port read ($0A). Returns 0 without advancing while the read holdoff is counting
    /// down.
    pub fn read_data_port(&mut self) -> u8 {
        if self.read_holdoff > 0 {
            self.read_holdoff -= 1;
            return 0;
        }

        let value = self.ram[usize::from(self.read_pointer)];
        self.read_pointer = self.read_pointer.wrapping_add(1);
        value
    }

    /// Store a byte at the write pointer and advance it, bypassing the holdoff.
    pub fn dma_write(&mut self, value: u8) {
        self.ram[usize::from(self.write_pointer)] = value;
        self.write_pointer = self.write_pointer.wrapping_add(1);
    }

    /// Address control write ($0D); `address` is the value of registers $09:$08.
    pub fn write_control(&mut self, value: u8, address: u16) -> ControlEffect {
        let prev = self.control;
        self.control = value;

        let mut effect = ControlEffect::default();

        if prev & CONTROL_RESET != 0 && value & CONTROL_RESET == 0 {
            log::trace!("ADPCM reset");

            self.read_pointer = 0;
            self.write_pointer = 0;
            self.play_start = 0;
            self.play_end = 0;
            self.play_half = 0;
            self.low_nibble = false;
            self.stop();
            effect.stopped = true;
        }

        if value & CONTROL_PLAY != 0 && prev & CONTROL_PLAY == 0 {
            self.play_start = self.read_pointer;
            self.play_end = self.read_pointer.wrapping_add(self.length);
            self.play_half = self.read_pointer.wrapping_add(self.length / 2);
            self.low_nibble = false;
            self.playing = true;
            self.status = (self.status & !STATUS_END) | STATUS_PLAYING;
            effect.started = true;

            log::debug!(
                "ADPCM play from {:04X} to {:04X} (half {:04X})",
                self.play_start,
                self.play_end,
                self.play_half
            );
        } else if value & CONTROL_PLAY == 0 {
            self.stop();
            effect.stopped = true;
        }

        if value & CONTROL_SET_LENGTH != 0 {
            self.length = address;
        }

        if value & CONTROL_SET_READ_ADDR != 0 {
            self.read_pointer = address;
            self.read_holdoff = 2;
        }

        if value & CONTROL_SET_WRITE_ADDR != 0 {
            self.write_pointer = address;
            self.write_holdoff = value & CONTROL_WRITE_ADDR_LOW_BIT;
        }

        effect
    }

    /// Playback rate write ($0E). Returns the new clock divider.
    pub fn write_rate(&mut self, value: u8) -> u8 {
        self.clock_divider = 16 - (value & 0x0F);
        self.clock_divider
    }

    /// Produce the next nibble for the decoder, high nibble first. Returns `None` when idle.
    pub fn clock_nibble(&mut self) -> Option<NibbleOutput> {
        if !self.playing {
            return None;
        }

        let byte = self.ram[usize::from(self.play_start)];
        let nibble = if self.low_nibble { byte & 0x0F } else { byte >> 4 };
        self.low_nibble = !self.low_nibble;

        let mut ended = false;
        if !self.low_nibble {
            let finished_addr = self.play_start;
            self.play_start = self.play_start.wrapping_add(1);

            if self.play_start == self.play_half {
                // Half-way notification; no IRQ is raised here
                log::trace!("ADPCM reached half address {:04X}", self.play_half);
            }

            if finished_addr == self.play_end {
                log::debug!("ADPCM playback reached end address {:04X}", self.play_end);
                self.stop();
                ended = true;
            }
        }

        Some(NibbleOutput { nibble, ended })
    }

    fn stop(&mut self) {
        self.playing = false;
        self.status = (self.status | STATUS_END) & !STATUS_PLAYING;
    }
}
