/// Audio monitor using cpal - a sine per sounding note, for auditioning
/// patterns with no MIDI device attached
use crate::error::OutputError;
use crate::midi::NoteSink;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tone {
    note: u8,
    channel: u8,
    frequency: f32,
    phase: f32,
}

pub struct AudioOutput {
    _stream: Option<cpal::Stream>,
    tones: Arc<Mutex<Vec<Tone>>>,
}

impl AudioOutput {
    pub fn new() -> Option<Self> {
        let tones = Arc::new(Mutex::new(Vec::new()));
        let stream = Self::setup_audio_stream(Arc::clone(&tones))?;

        Some(Self {
            _stream: Some(stream),
            tones,
        })
    }

    /// A monitor with no device behind it; notes are tracked but not heard.
    pub fn silent() -> Self {
        Self {
            _stream: None,
            tones: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn setup_audio_stream(tones: Arc<Mutex<Vec<Tone>>>) -> Option<cpal::Stream> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let config = device.default_output_config().ok()?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut tones) = tones.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    for frame in data.chunks_mut(channels.max(1)) {
                        let value = render_frame(&mut tones, sample_rate);
                        frame.fill(value);
                    }
                },
                |err| log::warn!("Audio stream error: {}", err),
                None,
            ),
            _ => return None,
        };

        match stream {
            Ok(stream) => {
                if let Err(err) = stream.play() {
                    log::warn!("Audio stream failed to start: {}", err);
                }
                Some(stream)
            }
            Err(err) => {
                log::warn!("Audio stream unavailable: {}", err);
                None
            }
        }
    }

    pub fn sounding(&self) -> usize {
        self.tones.lock().map(|tones| tones.len()).unwrap_or(0)
    }
}

fn render_frame(tones: &mut [Tone], sample_rate: f32) -> f32 {
    let mut value = 0.0;
    for tone in tones.iter_mut() {
        value += (tone.phase * 2.0 * std::f32::consts::PI).sin();
        tone.phase += tone.frequency / sample_rate;
        if tone.phase >= 1.0 {
            tone.phase -= 1.0;
        }
    }
    value * 0.2 / (tones.len().max(1) as f32).sqrt()
}

impl NoteSink for AudioOutput {
    fn note_on(&mut self, note: u8, _velocity: u8, channel: u8) -> Result<(), OutputError> {
        if let Ok(mut tones) = self.tones.lock() {
            tones.retain(|t| !(t.note == note && t.channel == channel));
            tones.push(Tone {
                note,
                channel,
                frequency: midi_note_to_frequency(note),
                phase: 0.0,
            });
        }
        Ok(())
    }

    fn note_off(&mut self, note: u8, _velocity: u8, channel: u8) -> Result<(), OutputError> {
        if let Ok(mut tones) = self.tones.lock() {
            tones.retain(|t| !(t.note == note && t.channel == channel));
        }
        Ok(())
    }

    fn all_notes_off(&mut self) -> Result<(), OutputError> {
        if let Ok(mut tones) = self.tones.lock() {
            tones.clear();
        }
        Ok(())
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new().unwrap_or_else(Self::silent)
    }
}

fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}
