/// Startup configuration - embedded defaults, optionally replaced by a user
/// TOML file
use crate::error::ConfigError;
use crate::input::{ButtonBank, PinId};
use crate::sequencer::clock::{FixedTempoClock, Millis, SwingClock, TempoClock, MAX_BPM};
use crate::sequencer::gate::VoiceGateTracker;
use crate::sequencer::playback::SequencerEngine;
use crate::sequencer::{PatternStore, Voice, STEP_COUNT};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Embedded default config TOML
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bpm: u32,
    pub debounce_ms: Millis,
    pub gate_ms: Millis,
    #[serde(default = "default_safety_margin")]
    pub safety_margin_ms: Millis,
    pub swing: Option<SwingConfig>,
    pub voices: Vec<Voice>,
    #[serde(default)]
    pub pattern: Vec<Vec<bool>>,
    pub pins: PinConfig,
    #[serde(default)]
    pub midi: MidiConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SwingConfig {
    pub max_fraction: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinConfig {
    pub steps: [PinId; STEP_COUNT],
    pub voice_select: Option<PinId>,
    pub play: PinId,
    pub tempo_pot: Option<PinId>,
    pub swing_pot: Option<PinId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MidiConfig {
    pub port: Option<String>,
    pub serial: Option<PathBuf>,
}

fn default_safety_margin() -> Millis {
    crate::sequencer::gate::SAFETY_MARGIN_MS
}

impl Config {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the user config file if it exists, else
    /// the embedded defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            log::info!("loading config from {}", path.display());
            return Self::from_toml(&std::fs::read_to_string(path)?);
        }

        if let Some(path) = user_config_path().filter(|p| p.exists()) {
            log::info!("loading config from {}", path.display());
            return Self::from_toml(&std::fs::read_to_string(path)?);
        }

        Self::from_toml(DEFAULT_CONFIG)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bpm == 0 || self.bpm as f32 > MAX_BPM {
            return Err(invalid(format!("bpm {} outside 1..=240", self.bpm)));
        }
        if self.voices.is_empty() {
            return Err(invalid("at least one voice is required"));
        }
        for (i, voice) in self.voices.iter().enumerate() {
            if voice.note > 127 || voice.velocity > 127 {
                return Err(invalid(format!("voice {} note/velocity above 127", i)));
            }
            if voice.channel > 15 {
                return Err(invalid(format!("voice {} channel above 15", i)));
            }
        }
        if self.pattern.len() > self.voices.len() {
            return Err(invalid(format!(
                "pattern has {} rows for {} voices",
                self.pattern.len(),
                self.voices.len()
            )));
        }
        if let Some(row) = self.pattern.iter().find(|row| row.len() != STEP_COUNT) {
            return Err(invalid(format!(
                "pattern row has {} steps, expected {}",
                row.len(),
                STEP_COUNT
            )));
        }
        if let Some(swing) = self.swing {
            if !(0.0..=1.0).contains(&swing.max_fraction) {
                return Err(invalid("swing max_fraction outside 0..=1"));
            }
            if self.pins.tempo_pot.is_none() || self.pins.swing_pot.is_none() {
                return Err(invalid("swing needs tempo_pot and swing_pot pins"));
            }
        }
        Ok(())
    }

    pub fn tempo_clock(&self) -> TempoClock {
        match self.swing {
            Some(swing) => TempoClock::Swing(SwingClock::new(self.bpm as f32, swing.max_fraction)),
            None => TempoClock::Fixed(FixedTempoClock::new(self.bpm)),
        }
    }

    pub fn build_engine(&self) -> SequencerEngine {
        let pattern = PatternStore::from_rows(self.voices.len(), &self.pattern);
        let gates = VoiceGateTracker::with_margin(self.voices.len(), self.safety_margin_ms);
        SequencerEngine::with_gates(
            self.voices.clone(),
            pattern,
            gates,
            self.tempo_clock(),
            self.gate_ms,
        )
    }

    pub fn build_buttons(&self) -> ButtonBank {
        ButtonBank::new(
            self.pins.steps,
            self.pins.voice_select,
            self.pins.play,
            self.debounce_ms,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config parses")
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stepgate").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::clock::StepClock;

    const MINIMAL: &str = r#"
        bpm = 120
        debounce_ms = 5
        gate_ms = 100

        [[voices]]
        note = 60
        channel = 0
        velocity = 100

        [pins]
        steps = [2, 3, 4, 5]
        play = 7
    "#;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bpm, 127);
        assert_eq!(config.voices.len(), 4);
        assert_eq!(config.safety_margin_ms, 10);
        assert!(config.swing.is_none());
    }

    #[test]
    fn test_minimal_config() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.voices, vec![Voice::new(60, 0, 100)]);
        assert!(config.pins.voice_select.is_none());
        assert!(config.midi.port.is_none());
        assert_eq!(config.build_engine().clock().step_interval_ms(), 500);
    }

    #[test]
    fn test_pattern_preset_loaded() {
        let toml = format!("pattern = [[true, false, false, true]]\n{}", MINIMAL);
        let engine = Config::from_toml(&toml).unwrap().build_engine();
        assert!(engine.pattern().is_triggered(0, 0));
        assert!(engine.pattern().is_triggered(0, 3));
        assert!(!engine.pattern().is_triggered(0, 1));
    }

    #[test]
    fn test_rejects_bad_channel() {
        let toml = MINIMAL.replace("channel = 0", "channel = 16");
        assert!(matches!(
            Config::from_toml(&toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bad_bpm() {
        let toml = MINIMAL.replace("bpm = 120", "bpm = 0");
        assert!(Config::from_toml(&toml).is_err());
        let toml = MINIMAL.replace("bpm = 120", "bpm = 300");
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_rejects_wrong_pattern_shape() {
        let toml = format!("pattern = [[true, false]]\n{}", MINIMAL);
        assert!(Config::from_toml(&toml).is_err());
        let rows = "[[true, false, false, false], [true, false, false, false]]";
        let toml = format!("pattern = {}\n{}", rows, MINIMAL);
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_swing_requires_pots() {
        let toml = format!("{}\n[swing]\nmax_fraction = 0.5\n", MINIMAL);
        assert!(Config::from_toml(&toml).is_err());

        let toml = toml.replace("play = 7", "play = 7\ntempo_pot = 14\nswing_pot = 15");
        let config = Config::from_toml(&toml).unwrap();
        assert!(matches!(config.tempo_clock(), TempoClock::Swing(_)));
    }

    #[test]
    fn test_toml_error_reported() {
        assert!(matches!(
            Config::from_toml("bpm = \"fast\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
