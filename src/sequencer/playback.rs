/// Playback engine - runs one scheduler pass per tick and queues the
/// resulting note and indicator events
use super::clock::{Millis, StepClock, TempoClock};
use super::gate::VoiceGateTracker;
use super::{PatternStore, Voice, STEP_COUNT};
use crate::input::ControlEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Playback,
    Step(usize),
}

pub trait IndicatorSink {
    fn set_indicator(&mut self, indicator: Indicator, on: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    StepAdvanced(usize),
    NoteOn { voice: usize, note: u8, velocity: u8, channel: u8 },
    NoteOff { voice: usize, note: u8, velocity: u8, channel: u8 },
    Indicator(Indicator, bool),
}

impl PlaybackEvent {
    fn note_on(voice: usize, config: &Voice) -> Self {
        PlaybackEvent::NoteOn {
            voice,
            note: config.note,
            velocity: config.velocity,
            channel: config.channel,
        }
    }

    fn note_off(voice: usize, config: &Voice) -> Self {
        PlaybackEvent::NoteOff {
            voice,
            note: config.note,
            velocity: 0,
            channel: config.channel,
        }
    }
}

pub struct SequencerEngine<C: StepClock = TempoClock> {
    voices: Vec<Voice>,
    pattern: PatternStore,
    gates: VoiceGateTracker,
    clock: C,
    gate_ms: Millis,
    current_step: usize,
    is_playing: bool,
    playback_led: bool,
    events: Vec<PlaybackEvent>,
}

impl<C: StepClock> SequencerEngine<C> {
    pub fn new(voices: Vec<Voice>, pattern: PatternStore, clock: C, gate_ms: Millis) -> Self {
        let gates = VoiceGateTracker::new(voices.len());
        Self::with_gates(voices, pattern, gates, clock, gate_ms)
    }

    pub fn with_gates(
        voices: Vec<Voice>,
        pattern: PatternStore,
        gates: VoiceGateTracker,
        clock: C,
        gate_ms: Millis,
    ) -> Self {
        Self {
            voices,
            pattern,
            gates,
            clock,
            gate_ms,
            current_step: 0,
            is_playing: false,
            playback_led: false,
            events: Vec::new(),
        }
    }

    pub fn pattern(&self) -> &PatternStore {
        &self.pattern
    }

    pub fn gates(&self) -> &VoiceGateTracker {
        &self.gates
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Resume from the current step; the first step fires one interval later.
    pub fn start(&mut self, now: Millis) {
        if self.is_playing {
            return;
        }
        log::debug!("play from step {}", self.current_step);
        self.is_playing = true;
        // The gap before a step follows the swing side of the step before it.
        let previous = (self.current_step + STEP_COUNT - 1) % STEP_COUNT;
        self.clock.arm_next(now, previous);
    }

    /// Stop and flush every sounding voice within this call.
    pub fn stop(&mut self) {
        if !self.is_playing {
            return;
        }
        log::debug!("stop at step {}", self.current_step);
        self.is_playing = false;
        self.all_notes_off();
        self.set_playback_led(false);
    }

    pub fn toggle_play(&mut self, now: Millis) {
        if self.is_playing {
            self.stop();
        } else {
            self.start(now);
        }
    }

    /// Force every sounding voice silent, queuing its note-off.
    pub fn all_notes_off(&mut self) {
        for (voice, config) in self.voices.iter().enumerate() {
            if self.gates.force_off(voice) {
                self.events.push(PlaybackEvent::note_off(voice, config));
            }
        }
    }

    /// Apply a debounced control press.
    pub fn handle(&mut self, event: ControlEvent, now: Millis) {
        match event {
            ControlEvent::ToggleStep(step) => {
                let on = self.pattern.toggle_step(step);
                self.events
                    .push(PlaybackEvent::Indicator(Indicator::Step(step), on));
            }
            ControlEvent::NextVoice => {
                let voice = self.pattern.select_next_voice();
                log::debug!("editing voice {}", voice);
                self.refresh_step_indicators();
            }
            ControlEvent::PlayStop => self.toggle_play(now),
        }
    }

    /// Queue the selected voice's row onto the step LEDs.
    pub fn refresh_step_indicators(&mut self) {
        for (step, on) in self.pattern.current_row().into_iter().enumerate() {
            self.events
                .push(PlaybackEvent::Indicator(Indicator::Step(step), on));
        }
    }

    /// One scheduler pass.
    pub fn tick(&mut self, now: Millis) {
        // Gates expire whether or not we are playing.
        for (voice, config) in self.voices.iter().enumerate() {
            if self.gates.tick(voice, now) {
                self.events.push(PlaybackEvent::note_off(voice, config));
            }
        }

        if !self.is_playing || !self.clock.is_step_due(now) {
            return;
        }

        let step = self.current_step;
        let interval = self.clock.arm_next(now, step);

        for (voice, config) in self.voices.iter().enumerate() {
            if self.pattern.is_triggered(voice, step)
                && self.gates.note_on(voice, now, self.gate_ms, interval)
            {
                self.events.push(PlaybackEvent::note_on(voice, config));
            }
        }

        self.events.push(PlaybackEvent::StepAdvanced(step));
        let led = !self.playback_led;
        self.set_playback_led(led);

        self.current_step = (step + 1) % STEP_COUNT;
        log::trace!("step {} at {} ms, next in {} ms", step, now, interval);
    }

    fn set_playback_led(&mut self, on: bool) {
        self.playback_led = on;
        self.events
            .push(PlaybackEvent::Indicator(Indicator::Playback, on));
    }

    pub fn poll_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.events)
    }
}
