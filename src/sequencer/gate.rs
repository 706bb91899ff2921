/// Per-voice gate tracking - every note-on gets exactly one note-off
use super::clock::{deadline_reached, Millis};

/// Margin kept between a note's end and the next step of the same voice.
pub const SAFETY_MARGIN_MS: Millis = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Silent,
    Sounding { off_deadline: Millis },
}

#[derive(Debug, Clone)]
pub struct VoiceGateTracker {
    gates: Vec<GateState>,
    safety_margin: Millis,
}

impl VoiceGateTracker {
    pub fn new(voice_count: usize) -> Self {
        Self::with_margin(voice_count, SAFETY_MARGIN_MS)
    }

    pub fn with_margin(voice_count: usize, safety_margin: Millis) -> Self {
        Self {
            gates: vec![GateState::Silent; voice_count],
            safety_margin,
        }
    }

    pub fn state(&self, voice: usize) -> GateState {
        self.gates.get(voice).copied().unwrap_or(GateState::Silent)
    }

    pub fn is_sounding(&self, voice: usize) -> bool {
        matches!(self.state(voice), GateState::Sounding { .. })
    }

    /// Gate length actually used for a requested gate at a step interval.
    ///
    /// Clamped to end `safety_margin` before the next step; falls back to the
    /// whole interval when that would leave nothing.
    pub fn clamped_gate(&self, gate_ms: Millis, step_interval_ms: Millis) -> Millis {
        let clamped = gate_ms.min(step_interval_ms.saturating_sub(self.safety_margin));
        if clamped == 0 {
            step_interval_ms.max(1)
        } else {
            clamped
        }
    }

    /// Silent -> Sounding. Returns false and leaves the voice untouched if it
    /// is already sounding.
    pub fn note_on(
        &mut self,
        voice: usize,
        now: Millis,
        gate_ms: Millis,
        step_interval_ms: Millis,
    ) -> bool {
        let length = self.clamped_gate(gate_ms, step_interval_ms);
        match self.gates.get_mut(voice) {
            Some(gate) if *gate == GateState::Silent => {
                *gate = GateState::Sounding {
                    off_deadline: now.wrapping_add(length),
                };
                true
            }
            _ => false,
        }
    }

    /// Sounding -> Silent once the deadline is reached. Returns true when a
    /// note-off must be emitted.
    pub fn tick(&mut self, voice: usize, now: Millis) -> bool {
        let Some(gate) = self.gates.get_mut(voice) else {
            return false;
        };
        match *gate {
            GateState::Sounding { off_deadline } if deadline_reached(now, off_deadline) => {
                *gate = GateState::Silent;
                true
            }
            _ => false,
        }
    }

    /// Unconditional Sounding -> Silent. Idempotent.
    pub fn force_off(&mut self, voice: usize) -> bool {
        match self.gates.get_mut(voice) {
            Some(gate) if *gate != GateState::Silent => {
                *gate = GateState::Silent;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_clamped_before_next_step() {
        let mut gates = VoiceGateTracker::new(1);
        assert!(gates.note_on(0, 1_000, 5_000, 472));
        assert_eq!(
            gates.state(0),
            GateState::Sounding {
                off_deadline: 1_462
            }
        );
        assert!(!gates.tick(0, 1_461));
        assert!(gates.tick(0, 1_462));
        assert!(!gates.is_sounding(0));
        assert!(!gates.tick(0, 1_463));
    }

    #[test]
    fn test_short_gate_kept() {
        let gates = VoiceGateTracker::new(1);
        assert_eq!(gates.clamped_gate(100, 472), 100);
    }

    #[test]
    fn test_gate_never_zero_length() {
        let gates = VoiceGateTracker::new(1);
        assert_eq!(gates.clamped_gate(100, 8), 8);
        assert_eq!(gates.clamped_gate(100, 10), 10);
        assert_eq!(gates.clamped_gate(0, 472), 472);
        assert_eq!(gates.clamped_gate(0, 0), 1);
    }

    #[test]
    fn test_note_on_rejected_while_sounding() {
        let mut gates = VoiceGateTracker::new(2);
        assert!(gates.note_on(1, 0, 100, 500));
        assert!(!gates.note_on(1, 50, 100, 500));
        assert_eq!(gates.state(1), GateState::Sounding { off_deadline: 100 });
    }

    #[test]
    fn test_force_off_idempotent() {
        let mut gates = VoiceGateTracker::new(1);
        assert!(!gates.force_off(0));
        gates.note_on(0, 0, 100, 500);
        assert!(gates.force_off(0));
        assert!(!gates.force_off(0));
        assert!(!gates.tick(0, 1_000));
    }

    #[test]
    fn test_deadline_across_wraparound() {
        let mut gates = VoiceGateTracker::new(1);
        let now = u32::MAX - 20;
        gates.note_on(0, now, 100, 500);
        assert!(!gates.tick(0, now.wrapping_add(50)));
        assert!(gates.tick(0, now.wrapping_add(100)));
    }

    #[test]
    fn test_unknown_voice_is_noop() {
        let mut gates = VoiceGateTracker::new(1);
        assert!(!gates.note_on(3, 0, 100, 500));
        assert!(!gates.tick(3, 0));
        assert!(!gates.force_off(3));
    }
}
