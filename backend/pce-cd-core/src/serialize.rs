//! Save states: every piece of controller state, encoded in sequence with bincode

use crate::api::{AdpcmClock, AudioTrackPlayer, PceCd, PceCdResult, SectorSource};
use bincode::config::{Fixint, LittleEndian};
use std::io;
use std::io::{BufReader, BufWriter, Write};

const BINCODE_CONFIG: bincode::config::Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_little_endian().with_fixed_int_encoding();

impl<D: SectorSource, P: AudioTrackPlayer, M: AdpcmClock> PceCd<D, P, M> {
    /// Write the controller state. The mounted disc, the collaborators, and the Arcade Card are
    /// not included.
    ///
    /// # Errors
    ///
    /// Propagates any encoding or I/O error.
    pub fn save_state<W>(&self, writer: W) -> PceCdResult<()>
    where
        W: io::Write,
    {
        let mut writer = BufWriter::new(writer);

        bincode::encode_into_std_write(&self.registers, &mut writer, BINCODE_CONFIG)?;
        bincode::encode_into_std_write(&self.bus, &mut writer, BINCODE_CONFIG)?;
        bincode::encode_into_std_write(&self.transport, &mut writer, BINCODE_CONFIG)?;
        bincode::encode_into_std_write(&self.adpcm, &mut writer, BINCODE_CONFIG)?;
        bincode::encode_into_std_write(&self.fader, &mut writer, BINCODE_CONFIG)?;
        bincode::encode_into_std_write(&self.bram, &mut writer, BINCODE_CONFIG)?;
        bincode::encode_into_std_write(&self.scheduler, &mut writer, BINCODE_CONFIG)?;
        bincode::encode_into_std_write(&self.prescaler, &mut writer, BINCODE_CONFIG)?;
        bincode::encode_into_std_write(self.cycles, &mut writer, BINCODE_CONFIG)?;
        bincode::encode_into_std_write(self.motor_on, &mut writer, BINCODE_CONFIG)?;

        writer.flush()?;

        Ok(())
    }

    /// Restore state written by [`Self::save_state`] and bring the CD-DA player and ADPCM decoder
    /// back in line with it. State is left unchanged if decoding fails.
    ///
    /// # Errors
    ///
    /// Propagates any decoding error.
    pub fn load_state<R>(&mut self, reader: R) -> PceCdResult<()>
    where
        R: io::Read,
    {
        let mut reader = BufReader::new(reader);

        let registers = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;
        let bus = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;
        let transport = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;
        let adpcm = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;
        let fader = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;
        let bram = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;
        let scheduler = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;
        let prescaler = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;
        let cycles = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;
        let motor_on = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;

        self.registers = registers;
        self.bus = bus;
        self.transport = transport;
        self.adpcm = adpcm;
        self.fader = fader;
        self.bram = bram;
        self.scheduler = scheduler;
        self.prescaler = prescaler;
        self.cycles = cycles;
        self.motor_on = motor_on;
        self.fault = None;

        log::info!("Loaded CD controller state at cycle {}", self.cycles);

        self.resync_cdda();

        Ok(())
    }
}
