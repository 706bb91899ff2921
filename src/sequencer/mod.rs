/// Core sequencer logic - pattern grid, voice table and the pieces the
/// engine schedules with
use serde::Deserialize;

pub mod clock;
pub mod gate;
pub mod playback;

/// Steps in one pattern cycle.
pub const STEP_COUNT: usize = 4;

/// Static note configuration for one voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Voice {
    pub note: u8,
    pub channel: u8,
    pub velocity: u8,
}

impl Voice {
    pub fn new(note: u8, channel: u8, velocity: u8) -> Self {
        Self {
            note: note.min(127),
            channel: channel.min(15),
            velocity: velocity.min(127),
        }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new(60, 0, 100) // Middle C
    }
}

/// Trigger grid indexed by (voice, step), plus the selected-voice cursor
/// that step buttons edit.
#[derive(Debug, Clone)]
pub struct PatternStore {
    cells: Vec<[bool; STEP_COUNT]>,
    current_voice: usize,
}

impl PatternStore {
    pub fn new(voice_count: usize) -> Self {
        Self {
            cells: vec![[false; STEP_COUNT]; voice_count.max(1)],
            current_voice: 0,
        }
    }

    /// Build from preset rows. Missing rows or steps stay off.
    pub fn from_rows(voice_count: usize, rows: &[Vec<bool>]) -> Self {
        let mut store = Self::new(voice_count);
        for (voice, row) in store.cells.iter_mut().zip(rows) {
            for (cell, &value) in voice.iter_mut().zip(row) {
                *cell = value;
            }
        }
        store
    }

    pub fn voice_count(&self) -> usize {
        self.cells.len()
    }

    pub fn current_voice(&self) -> usize {
        self.current_voice
    }

    pub fn is_triggered(&self, voice: usize, step: usize) -> bool {
        self.cells
            .get(voice)
            .and_then(|row| row.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Row of the selected voice, for the step LEDs.
    pub fn current_row(&self) -> [bool; STEP_COUNT] {
        self.cells[self.current_voice]
    }

    /// Flip `step` on the selected voice and return the new value.
    pub fn toggle_step(&mut self, step: usize) -> bool {
        match self.cells[self.current_voice].get_mut(step) {
            Some(cell) => {
                *cell = !*cell;
                *cell
            }
            None => false,
        }
    }

    /// Cycle the selected voice and return its index.
    pub fn select_next_voice(&mut self) -> usize {
        self.current_voice = (self.current_voice + 1) % self.cells.len();
        self.current_voice
    }

    pub fn clear(&mut self) {
        for row in &mut self.cells {
            *row = [false; STEP_COUNT];
        }
    }
}
