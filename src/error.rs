/// Error types for the outer surfaces (config loading, note transports).
/// The sequencing core itself has no failure modes.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create MIDI output: {0}")]
    MidiInit(#[from] midir::InitError),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Failed to send MIDI message: {0}")]
    Send(#[from] midir::SendError),

    #[error("Serial IO error: {0}")]
    Serial(#[from] std::io::Error),

    #[error("Failed to open serial port: {0}")]
    SerialOpen(#[from] serialport::Error),
}
