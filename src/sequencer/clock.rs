/// Tempo clocks - decide when the next step boundary has arrived
///
/// Timestamps are wrapping millisecond counters, so every deadline check goes
/// through `deadline_reached` instead of a plain `>=`.

/// Monotonic millisecond counter value. Wraps at `u32::MAX`.
pub type Millis = u32;

/// Highest tempo an analog tempo source can request.
pub const MAX_BPM: f32 = 240.0;

/// Tempos at or below this are treated as "stopped, no stepping".
pub const STALL_BPM: f32 = 0.5;

/// True once `now` is at or past `deadline`, tolerant of counter wraparound.
pub fn deadline_reached(now: Millis, deadline: Millis) -> bool {
    now.wrapping_sub(deadline) as i32 >= 0
}

/// Step interval in milliseconds for a tempo in BPM.
pub fn interval_for_bpm(bpm: u32) -> Millis {
    60_000 / bpm.max(1)
}

pub trait StepClock {
    /// Whether the armed step boundary has been reached.
    fn is_step_due(&self, now: Millis) -> bool;

    /// Arm the boundary following `step` and return the interval armed.
    fn arm_next(&mut self, now: Millis, step: usize) -> Millis;

    /// Current base step interval, ignoring swing.
    fn step_interval_ms(&self) -> Millis;

    /// Feed a freshly sampled tempo. Clocks with a fixed tempo ignore it.
    fn set_tempo_bpm(&mut self, _bpm: f32) {}

    /// Feed a freshly sampled swing position in [-1, 1].
    fn set_swing(&mut self, _position: f32) {}
}

/// Constant tempo: every step lasts `60000 / bpm` ms.
#[derive(Debug, Clone)]
pub struct FixedTempoClock {
    interval: Millis,
    next_deadline: Millis,
}

impl FixedTempoClock {
    pub fn new(bpm: u32) -> Self {
        Self {
            interval: interval_for_bpm(bpm),
            next_deadline: 0,
        }
    }

    pub fn next_deadline(&self) -> Millis {
        self.next_deadline
    }
}

impl StepClock for FixedTempoClock {
    fn is_step_due(&self, now: Millis) -> bool {
        deadline_reached(now, self.next_deadline)
    }

    fn arm_next(&mut self, now: Millis, _step: usize) -> Millis {
        self.next_deadline = now.wrapping_add(self.interval);
        self.interval
    }

    fn step_interval_ms(&self) -> Millis {
        self.interval
    }
}

/// Tempo and swing re-sampled every tick from external controls.
///
/// Each step's interval is derived independently from the current base, so
/// swing alternates around the tempo instead of drifting: the interval after
/// an even step is `base - base * r`, after an odd step `base + base * r`,
/// where `r` is the swing position scaled by `max_fraction`.
#[derive(Debug, Clone)]
pub struct SwingClock {
    bpm: f32,
    swing: f32,
    max_fraction: f32,
    next_deadline: Millis,
}

impl SwingClock {
    pub fn new(bpm: f32, max_fraction: f32) -> Self {
        Self {
            bpm: bpm.clamp(0.0, MAX_BPM),
            swing: 0.0,
            max_fraction: max_fraction.clamp(0.0, 1.0),
            next_deadline: 0,
        }
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn is_stalled(&self) -> bool {
        self.bpm <= STALL_BPM
    }

    /// Effective swing ratio after scaling.
    pub fn swing_ratio(&self) -> f32 {
        self.swing * self.max_fraction
    }

    fn base_interval(&self) -> f32 {
        if self.is_stalled() {
            return 0.0;
        }
        60_000.0 / self.bpm
    }

    /// Interval to arm after `step` at the current tempo and swing.
    pub fn swung_interval(&self, step: usize) -> Millis {
        let base = self.base_interval();
        let offset = base * self.swing_ratio();
        let delta = if step % 2 == 0 {
            base - offset
        } else {
            base + offset
        };
        delta.round().max(1.0) as Millis
    }
}

impl StepClock for SwingClock {
    fn is_step_due(&self, now: Millis) -> bool {
        !self.is_stalled() && deadline_reached(now, self.next_deadline)
    }

    fn arm_next(&mut self, now: Millis, step: usize) -> Millis {
        let delta = self.swung_interval(step);
        self.next_deadline = now.wrapping_add(delta);
        delta
    }

    fn step_interval_ms(&self) -> Millis {
        (self.base_interval().round() as Millis).max(1)
    }

    fn set_tempo_bpm(&mut self, bpm: f32) {
        self.bpm = bpm.clamp(0.0, MAX_BPM);
    }

    fn set_swing(&mut self, position: f32) {
        self.swing = position.clamp(-1.0, 1.0);
    }
}

/// Clock variant chosen at startup from config.
#[derive(Debug, Clone)]
pub enum TempoClock {
    Fixed(FixedTempoClock),
    Swing(SwingClock),
}

impl StepClock for TempoClock {
    fn is_step_due(&self, now: Millis) -> bool {
        match self {
            TempoClock::Fixed(clock) => clock.is_step_due(now),
            TempoClock::Swing(clock) => clock.is_step_due(now),
        }
    }

    fn arm_next(&mut self, now: Millis, step: usize) -> Millis {
        match self {
            TempoClock::Fixed(clock) => clock.arm_next(now, step),
            TempoClock::Swing(clock) => clock.arm_next(now, step),
        }
    }

    fn step_interval_ms(&self) -> Millis {
        match self {
            TempoClock::Fixed(clock) => clock.step_interval_ms(),
            TempoClock::Swing(clock) => clock.step_interval_ms(),
        }
    }

    fn set_tempo_bpm(&mut self, bpm: f32) {
        if let TempoClock::Swing(clock) = self {
            clock.set_tempo_bpm(bpm);
        }
    }

    fn set_swing(&mut self, position: f32) {
        if let TempoClock::Swing(clock) = self {
            clock.set_swing(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_interval_127_bpm() {
        let clock = FixedTempoClock::new(127);
        assert_eq!(clock.step_interval_ms(), 472);
    }

    #[test]
    fn test_fixed_due_after_interval() {
        let mut clock = FixedTempoClock::new(120);
        clock.arm_next(1_000, 0);
        assert!(!clock.is_step_due(1_499));
        assert!(clock.is_step_due(1_500));
        assert!(clock.is_step_due(1_501));
    }

    #[test]
    fn test_deadline_across_wraparound() {
        let now = u32::MAX - 100;
        let mut clock = FixedTempoClock::new(120);
        clock.arm_next(now, 0);
        assert_eq!(clock.next_deadline(), 399);
        // A plain `>=` would call this due immediately.
        assert!(!clock.is_step_due(now.wrapping_add(1)));
        assert!(!clock.is_step_due(398));
        assert!(clock.is_step_due(399));
    }

    #[test]
    fn test_deadline_reached_signed_difference() {
        assert!(deadline_reached(5, 5));
        assert!(deadline_reached(6, 5));
        assert!(!deadline_reached(4, 5));
        assert!(deadline_reached(2, u32::MAX - 2));
        assert!(!deadline_reached(u32::MAX - 2, 2));
    }

    #[test]
    fn test_swing_pairs_sum_to_two_bases() {
        for &position in &[-1.0_f32, -0.6, -0.13, 0.0, 0.25, 0.71, 1.0] {
            for &bpm in &[60.0_f32, 127.0, 133.0, 200.0] {
                let mut clock = SwingClock::new(bpm, 0.5);
                clock.set_swing(position);
                let base = 60_000.0 / bpm;
                let pair = clock.swung_interval(0) + clock.swung_interval(1);
                let error = (pair as f32 - 2.0 * base).abs();
                assert!(error <= 1.0, "bpm {bpm} swing {position}: {pair} vs {}", 2.0 * base);
            }
        }
    }

    #[test]
    fn test_swing_direction() {
        let mut clock = SwingClock::new(120.0, 0.5);
        clock.set_swing(1.0);
        assert_eq!(clock.swung_interval(0), 250);
        assert_eq!(clock.swung_interval(1), 750);
        assert_eq!(clock.swung_interval(2), 250);

        clock.set_swing(-1.0);
        assert_eq!(clock.swung_interval(0), 750);
        assert_eq!(clock.swung_interval(1), 250);
    }

    #[test]
    fn test_swing_delta_floored_at_one() {
        let mut clock = SwingClock::new(240.0, 1.0);
        clock.set_swing(1.0);
        assert_eq!(clock.swung_interval(0), 1);
    }

    #[test]
    fn test_swing_stalled_never_due() {
        let mut clock = SwingClock::new(120.0, 0.3);
        clock.arm_next(0, 0);
        clock.set_tempo_bpm(0.4);
        assert!(clock.is_stalled());
        assert!(!clock.is_step_due(10_000));

        clock.set_tempo_bpm(120.0);
        assert!(clock.is_step_due(10_000));
    }

    #[test]
    fn test_swing_tempo_resampled_per_step() {
        let mut clock = SwingClock::new(120.0, 0.5);
        assert_eq!(clock.arm_next(0, 0), 500);
        clock.set_tempo_bpm(60.0);
        assert_eq!(clock.arm_next(500, 1), 1_000);
        assert!(!clock.is_step_due(1_499));
        assert!(clock.is_step_due(1_500));
    }

    #[test]
    fn test_tempo_clock_fixed_ignores_controls() {
        let mut clock = TempoClock::Fixed(FixedTempoClock::new(120));
        clock.set_tempo_bpm(60.0);
        clock.set_swing(1.0);
        assert_eq!(clock.arm_next(0, 0), 500);
        assert_eq!(clock.arm_next(0, 1), 500);
    }
}
