/// Virtual front panel - button levels, pot positions and LEDs shared
/// between a UI thread and the driver thread
use crate::input::{InputSource, PinId};
use crate::sequencer::playback::{Indicator, IndicatorSink};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct PanelState {
    pressed: HashMap<PinId, bool>,
    analog: HashMap<PinId, f32>,
    leds: HashMap<Indicator, bool>,
}

/// Cheap to clone; every clone sees the same panel.
#[derive(Debug, Clone, Default)]
pub struct VirtualPanel {
    state: Arc<Mutex<PanelState>>,
}

impl VirtualPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pressed(&self, pin: PinId, pressed: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.pressed.insert(pin, pressed);
        }
    }

    pub fn set_analog(&self, pin: PinId, value: f32) {
        if let Ok(mut state) = self.state.lock() {
            state.analog.insert(pin, value.clamp(0.0, 1.0));
        }
    }

    pub fn analog(&self, pin: PinId) -> f32 {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.analog.get(&pin).copied())
            .unwrap_or(0.0)
    }

    pub fn led(&self, indicator: Indicator) -> bool {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.leds.get(&indicator).copied())
            .unwrap_or(false)
    }
}

impl InputSource for VirtualPanel {
    fn read_digital(&mut self, pin: PinId) -> bool {
        // Pull-up wiring: released reads HIGH.
        let pressed = self
            .state
            .lock()
            .ok()
            .and_then(|state| state.pressed.get(&pin).copied())
            .unwrap_or(false);
        !pressed
    }

    fn read_analog_normalized(&mut self, pin: PinId) -> f32 {
        self.analog(pin)
    }
}

impl IndicatorSink for VirtualPanel {
    fn set_indicator(&mut self, indicator: Indicator, on: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.leds.insert(indicator, on);
        }
    }
}
