/// STEPGATE - step-sequencer clock for button-driven MIDI firmware
///
/// This library provides the timing/scheduling core and its I/O edges:
/// - Debounced button input and pattern editing
/// - Tempo clock with optional swing
/// - Per-voice gate tracking so no note is left sounding
/// - MIDI (USB or DIN serial) and audio-monitor note sinks
/// - A polling driver that ties it all together

pub mod audio;
pub mod config;
pub mod driver;
pub mod error;
pub mod input;
pub mod midi;
pub mod panel;
pub mod sequencer;

// Re-export commonly used types
pub use audio::AudioOutput;
pub use config::Config;
pub use driver::{Driver, DriverHandle, MonotonicClock};
pub use error::{ConfigError, OutputError};
pub use input::{ButtonBank, ControlEvent, Debouncer, InputSource};
pub use midi::{midi_note_name, MidiOutputDevice, NoteSink, SerialMidiOutput};
pub use panel::VirtualPanel;
pub use sequencer::clock::{FixedTempoClock, Millis, StepClock, SwingClock, TempoClock};
pub use sequencer::gate::VoiceGateTracker;
pub use sequencer::playback::{Indicator, IndicatorSink, PlaybackEvent, SequencerEngine};
pub use sequencer::{PatternStore, Voice, STEP_COUNT};
