/// MIDI note output - USB/virtual ports via midir, DIN via any byte writer
use crate::error::OutputError;
use midir::{MidiOutput, MidiOutputConnection};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Write;
use std::time::Duration;
use std::sync::{Arc, Mutex};

const CLIENT_NAME: &str = "STEPGATE MIDI Output";

/// DIN MIDI line speed.
pub const DIN_BAUD_RATE: u32 = 31_250;

/// Where note events end up. Transport-agnostic.
pub trait NoteSink {
    fn note_on(&mut self, note: u8, velocity: u8, channel: u8) -> Result<(), OutputError>;

    fn note_off(&mut self, note: u8, velocity: u8, channel: u8) -> Result<(), OutputError>;

    /// Silence everything this sink may have left sounding.
    fn all_notes_off(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Lets a UI thread reconnect a device while the driver thread sends to it.
impl<S: NoteSink> NoteSink for Arc<Mutex<S>> {
    fn note_on(&mut self, note: u8, velocity: u8, channel: u8) -> Result<(), OutputError> {
        match self.lock() {
            Ok(mut sink) => sink.note_on(note, velocity, channel),
            Err(_) => Ok(()),
        }
    }

    fn note_off(&mut self, note: u8, velocity: u8, channel: u8) -> Result<(), OutputError> {
        match self.lock() {
            Ok(mut sink) => sink.note_off(note, velocity, channel),
            Err(_) => Ok(()),
        }
    }

    fn all_notes_off(&mut self) -> Result<(), OutputError> {
        match self.lock() {
            Ok(mut sink) => sink.all_notes_off(),
            Err(_) => Ok(()),
        }
    }
}

pub fn encode_note_on(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

pub fn encode_note_off(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
}

/// Control Change 123, All Notes Off.
pub fn encode_all_notes_off(channel: u8) -> [u8; 3] {
    [0xB0 | (channel & 0x0F), 123, 0]
}

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    port_name: Option<String>,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connection: None,
            port_name: None,
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), OutputError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| OutputError::InvalidPort(format!("index {}", port_index)))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "stepgate")
            .map_err(|e| OutputError::Connect(e.to_string()))?;

        log::info!("connected MIDI output {}", name);
        self.connection = Some(connection);
        self.port_name = Some(name);
        Ok(())
    }

    /// Connect to the first port whose name contains `name`.
    pub fn connect_named(&mut self, name: &str) -> Result<(), OutputError> {
        let index = Self::available_ports()
            .iter()
            .position(|p| p.contains(name))
            .ok_or_else(|| OutputError::InvalidPort(name.to_string()))?;
        self.connect(index)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    fn send(&mut self, message: &[u8]) -> Result<(), OutputError> {
        if let Some(ref mut conn) = self.connection {
            conn.send(message)?;
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.port_name = None;
    }
}

impl NoteSink for MidiOutputDevice {
    fn note_on(&mut self, note: u8, velocity: u8, channel: u8) -> Result<(), OutputError> {
        self.send(&encode_note_on(channel, note, velocity))
    }

    fn note_off(&mut self, note: u8, velocity: u8, channel: u8) -> Result<(), OutputError> {
        self.send(&encode_note_off(channel, note, velocity))
    }

    fn all_notes_off(&mut self) -> Result<(), OutputError> {
        for channel in 0..16 {
            self.send(&encode_all_notes_off(channel))?;
        }
        Ok(())
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// DIN MIDI: raw 3-byte messages written to a 31.25 kbps serial line
/// (or anything else that takes bytes).
pub struct SerialMidiOutput<W: Write> {
    writer: W,
}

impl SerialMidiOutput<Box<dyn SerialPort>> {
    /// Open a serial device at 31.25 kbps, 8N1, raw (no output processing).
    pub fn open(path: &str) -> Result<Self, OutputError> {
        let port = serialport::new(path, DIN_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(10))
            .open()?;
        log::info!("DIN MIDI on {} at {} baud", path, DIN_BAUD_RATE);
        Ok(Self::new(port))
    }
}

impl<W: Write> SerialMidiOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn send(&mut self, message: [u8; 3]) -> Result<(), OutputError> {
        self.writer.write_all(&message)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> NoteSink for SerialMidiOutput<W> {
    fn note_on(&mut self, note: u8, velocity: u8, channel: u8) -> Result<(), OutputError> {
        self.send(encode_note_on(channel, note, velocity))
    }

    fn note_off(&mut self, note: u8, velocity: u8, channel: u8) -> Result<(), OutputError> {
        self.send(encode_note_off(channel, note, velocity))
    }

    fn all_notes_off(&mut self) -> Result<(), OutputError> {
        for channel in 0..16 {
            self.send(encode_all_notes_off(channel))?;
        }
        Ok(())
    }
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}
