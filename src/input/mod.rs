/// Button and pot input - debounces raw pin reads into clean press events
use crate::sequencer::clock::{Millis, MAX_BPM};
use crate::sequencer::STEP_COUNT;

/// Opaque pin identity.
pub type PinId = u8;

/// Raw reads from the hardware (or anything pretending to be it).
///
/// Digital inputs are pull-up wired: idle reads `true`, pressed reads `false`.
pub trait InputSource {
    fn read_digital(&mut self, pin: PinId) -> bool;

    /// Analog position normalized to [0, 1].
    fn read_analog_normalized(&mut self, pin: PinId) -> f32;
}

/// Debounced state of one button.
#[derive(Debug, Clone)]
pub struct Debouncer {
    pin: PinId,
    stable: bool,
    last_read: bool,
    last_change: Millis,
    window_ms: Millis,
}

impl Debouncer {
    pub fn new(pin: PinId, window_ms: Millis) -> Self {
        Self {
            pin,
            stable: true,
            last_read: true,
            last_change: 0,
            window_ms,
        }
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    pub fn stable(&self) -> bool {
        self.stable
    }

    /// Feed one raw read. Returns true on a debounced press (HIGH -> LOW).
    ///
    /// Any change of the raw level restarts the window, so a burst that never
    /// settles is ignored.
    pub fn poll(&mut self, raw: bool, now: Millis) -> bool {
        if raw != self.last_read {
            self.last_read = raw;
            self.last_change = now;
        }

        if now.wrapping_sub(self.last_change) > self.window_ms && raw != self.stable {
            self.stable = raw;
            return !raw;
        }
        false
    }
}

/// A debounced press mapped to what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    ToggleStep(usize),
    NextVoice,
    PlayStop,
}

/// Every front-panel button, polled together once per tick.
#[derive(Debug, Clone)]
pub struct ButtonBank {
    steps: Vec<Debouncer>,
    voice_select: Option<Debouncer>,
    play: Debouncer,
}

impl ButtonBank {
    pub fn new(
        step_pins: [PinId; STEP_COUNT],
        voice_select: Option<PinId>,
        play: PinId,
        window_ms: Millis,
    ) -> Self {
        Self {
            steps: step_pins
                .iter()
                .map(|&pin| Debouncer::new(pin, window_ms))
                .collect(),
            voice_select: voice_select.map(|pin| Debouncer::new(pin, window_ms)),
            play: Debouncer::new(play, window_ms),
        }
    }

    pub fn poll(&mut self, input: &mut impl InputSource, now: Millis) -> Vec<ControlEvent> {
        let mut events = Vec::new();

        for (step, button) in self.steps.iter_mut().enumerate() {
            if button.poll(input.read_digital(button.pin()), now) {
                events.push(ControlEvent::ToggleStep(step));
            }
        }

        if let Some(button) = self.voice_select.as_mut() {
            if button.poll(input.read_digital(button.pin()), now) {
                events.push(ControlEvent::NextVoice);
            }
        }

        if self.play.poll(input.read_digital(self.play.pin()), now) {
            events.push(ControlEvent::PlayStop);
        }

        events
    }
}

/// Tempo pot position to BPM in [0, 240].
pub fn tempo_from_normalized(value: f32) -> f32 {
    value.clamp(0.0, 1.0) * MAX_BPM
}

/// Swing pot position to a swing position in [-1, 1].
pub fn swing_from_normalized(value: f32) -> f32 {
    value.clamp(0.0, 1.0) * 2.0 - 1.0
}
