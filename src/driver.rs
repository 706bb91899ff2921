/// Polling driver - one tick reads buttons and pots, feeds the engine and
/// routes its events to the note and indicator sinks
use crate::config::Config;
use crate::input::{swing_from_normalized, tempo_from_normalized, ButtonBank, InputSource, PinId};
use crate::midi::NoteSink;
use crate::sequencer::clock::{Millis, StepClock};
use crate::sequencer::playback::{IndicatorSink, PlaybackEvent, SequencerEngine};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Millisecond counter since creation, truncated to wrap like a hardware
/// timer.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Driver<I: InputSource, D: IndicatorSink> {
    engine: SequencerEngine,
    buttons: ButtonBank,
    input: I,
    indicators: D,
    sinks: Vec<Box<dyn NoteSink>>,
    pots: Option<(PinId, PinId)>,
}

impl<I: InputSource, D: IndicatorSink> Driver<I, D> {
    pub fn new(config: &Config, input: I, indicators: D, sinks: Vec<Box<dyn NoteSink>>) -> Self {
        let pots = match (config.swing, config.pins.tempo_pot, config.pins.swing_pot) {
            (Some(_), Some(tempo), Some(swing)) => Some((tempo, swing)),
            _ => None,
        };
        let mut driver = Self {
            engine: config.build_engine(),
            buttons: config.build_buttons(),
            input,
            indicators,
            sinks,
            pots,
        };
        driver.engine.refresh_step_indicators();
        driver.dispatch();
        driver
    }

    pub fn engine(&self) -> &SequencerEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SequencerEngine {
        &mut self.engine
    }

    /// One pass: debounce inputs, apply presses, sample pots, run the
    /// scheduler, then flush events to the sinks.
    pub fn poll(&mut self, now: Millis) {
        for event in self.buttons.poll(&mut self.input, now) {
            self.engine.handle(event, now);
        }

        if let Some((tempo_pin, swing_pin)) = self.pots {
            let tempo = tempo_from_normalized(self.input.read_analog_normalized(tempo_pin));
            let swing = swing_from_normalized(self.input.read_analog_normalized(swing_pin));
            let clock = self.engine.clock_mut();
            clock.set_tempo_bpm(tempo);
            clock.set_swing(swing);
        }

        self.engine.tick(now);
        self.dispatch();
    }

    /// Poll every millisecond until `running` clears, then shut down.
    pub fn run(&mut self, clock: &MonotonicClock, running: &Mutex<bool>) {
        while running.lock().map(|r| *r).unwrap_or(false) {
            self.poll(clock.now());
            thread::sleep(Duration::from_millis(1));
        }
        self.shutdown();
    }

    /// Stop playback and silence every sink.
    pub fn shutdown(&mut self) {
        self.engine.stop();
        self.engine.all_notes_off();
        self.dispatch();
        for sink in &mut self.sinks {
            if let Err(e) = sink.all_notes_off() {
                log::warn!("all notes off failed: {}", e);
            }
        }
    }

    fn dispatch(&mut self) {
        for event in self.engine.poll_events() {
            match event {
                PlaybackEvent::NoteOn {
                    note,
                    velocity,
                    channel,
                    ..
                } => {
                    for sink in &mut self.sinks {
                        if let Err(e) = sink.note_on(note, velocity, channel) {
                            log::warn!("note on {} failed: {}", note, e);
                        }
                    }
                }
                PlaybackEvent::NoteOff {
                    note,
                    velocity,
                    channel,
                    ..
                } => {
                    for sink in &mut self.sinks {
                        if let Err(e) = sink.note_off(note, velocity, channel) {
                            log::warn!("note off {} failed: {}", note, e);
                        }
                    }
                }
                PlaybackEvent::Indicator(indicator, on) => {
                    self.indicators.set_indicator(indicator, on);
                }
                PlaybackEvent::StepAdvanced(_) => {}
            }
        }
    }
}

impl<I, D> Driver<I, D>
where
    I: InputSource + Send + 'static,
    D: IndicatorSink + Send + 'static,
{
    /// Run the polling loop on its own thread. Sinks are built on that thread
    /// since audio streams cannot move between threads.
    pub fn spawn<F>(config: Config, input: I, indicators: D, make_sinks: F) -> DriverHandle
    where
        F: FnOnce() -> Vec<Box<dyn NoteSink>> + Send + 'static,
    {
        let is_running = Arc::new(Mutex::new(true));
        let running = Arc::clone(&is_running);

        let thread = thread::spawn(move || {
            let clock = MonotonicClock::new();
            let mut driver = Driver::new(&config, input, indicators, make_sinks());
            log::info!("driver running, {} voices", config.voices.len());

            driver.run(&clock, &running);
            log::info!("driver stopped");
        });

        DriverHandle {
            is_running,
            thread: Some(thread),
        }
    }
}

pub struct DriverHandle {
    is_running: Arc<Mutex<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl DriverHandle {
    pub fn is_running(&self) -> bool {
        self.is_running.lock().map(|r| *r).unwrap_or(false)
    }

    /// Stop the loop and wait for it to flush its notes.
    pub fn stop(&mut self) {
        if let Ok(mut running) = self.is_running.lock() {
            *running = false;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("driver thread panicked");
            }
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OutputError;
    use crate::panel::VirtualPanel;
    use crate::sequencer::playback::Indicator;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(bool, u8, u8)>>>);

    impl NoteSink for Recorder {
        fn note_on(&mut self, note: u8, _velocity: u8, channel: u8) -> Result<(), OutputError> {
            self.0.lock().unwrap().push((true, note, channel));
            Ok(())
        }

        fn note_off(&mut self, note: u8, _velocity: u8, channel: u8) -> Result<(), OutputError> {
            self.0.lock().unwrap().push((false, note, channel));
            Ok(())
        }
    }

    type PanelDriver = Driver<VirtualPanel, VirtualPanel>;

    fn press(driver: &mut PanelDriver, panel: &VirtualPanel, pin: PinId, now: &mut Millis) {
        panel.set_pressed(pin, true);
        for _ in 0..10 {
            *now += 1;
            driver.poll(*now);
        }
        panel.set_pressed(pin, false);
        for _ in 0..10 {
            *now += 1;
            driver.poll(*now);
        }
    }

    #[test]
    fn test_buttons_drive_playback() {
        let config = Config::default();
        let panel = VirtualPanel::new();
        let recorder = Recorder::default();
        let sinks: Vec<Box<dyn NoteSink>> = vec![Box::new(recorder.clone())];
        let mut driver = Driver::new(&config, panel.clone(), panel.clone(), sinks);
        let mut now: Millis = 0;

        // Step 1 on voice 0, then start.
        press(&mut driver, &panel, config.pins.steps[0], &mut now);
        assert!(panel.led(Indicator::Step(0)));
        press(&mut driver, &panel, config.pins.play, &mut now);
        assert!(driver.engine().is_playing());

        for _ in 0..1_000 {
            now += 1;
            driver.poll(now);
        }
        {
            let notes = recorder.0.lock().unwrap();
            assert_eq!(notes.first(), Some(&(true, 36, 9)));
            assert_eq!(notes.get(1), Some(&(false, 36, 9)));
        }

        press(&mut driver, &panel, config.pins.play, &mut now);
        assert!(!driver.engine().is_playing());
        assert!(!panel.led(Indicator::Playback));
    }

    #[test]
    fn test_voice_select_swaps_step_leds() {
        let config = Config::default();
        let panel = VirtualPanel::new();
        let mut driver = Driver::new(&config, panel.clone(), panel.clone(), Vec::new());
        let mut now: Millis = 0;

        press(&mut driver, &panel, config.pins.steps[2], &mut now);
        assert!(panel.led(Indicator::Step(2)));
        press(&mut driver, &panel, config.pins.voice_select.unwrap(), &mut now);
        assert!(!panel.led(Indicator::Step(2)));
        assert_eq!(driver.engine().pattern().current_voice(), 1);
    }

    #[test]
    fn test_pots_feed_swing_clock() {
        let mut config = Config::default();
        config.swing = Some(crate::config::SwingConfig { max_fraction: 0.5 });
        let panel = VirtualPanel::new();
        panel.set_analog(config.pins.tempo_pot.unwrap(), 0.25);
        panel.set_analog(config.pins.swing_pot.unwrap(), 0.5);
        let mut driver = Driver::new(&config, panel.clone(), panel.clone(), Vec::new());
        driver.poll(1);
        assert_eq!(driver.engine().clock().step_interval_ms(), 1_000);
    }

    #[test]
    fn test_shutdown_silences_sounding_notes() {
        let mut config = Config::default();
        config.pattern = vec![vec![true, false, false, false]];
        let panel = VirtualPanel::new();
        let recorder = Recorder::default();
        let sinks: Vec<Box<dyn NoteSink>> = vec![Box::new(recorder.clone())];
        let mut driver = Driver::new(&config, panel.clone(), panel.clone(), sinks);
        driver.engine_mut().start(0);
        driver.poll(472);
        driver.shutdown();
        let notes = recorder.0.lock().unwrap();
        assert_eq!(*notes, vec![(true, 36, 9), (false, 36, 9)]);
    }

    #[test]
    fn test_run_returns_after_flushing_when_cleared() {
        let mut config = Config::default();
        config.pattern = vec![vec![true, false, false, false]];
        let panel = VirtualPanel::new();
        let recorder = Recorder::default();
        let sinks: Vec<Box<dyn NoteSink>> = vec![Box::new(recorder.clone())];
        let mut driver = Driver::new(&config, panel.clone(), panel.clone(), sinks);
        driver.engine_mut().start(0);
        driver.poll(472);

        driver.run(&MonotonicClock::new(), &Mutex::new(false));
        assert!(!driver.engine().is_playing());
        let notes = recorder.0.lock().unwrap();
        assert_eq!(*notes, vec![(true, 36, 9), (false, 36, 9)]);
    }

    #[test]
    fn test_spawned_driver_stops_and_flushes() {
        let mut config = Config::default();
        config.pattern = vec![vec![true; 4]];
        let play = config.pins.play;
        let panel = VirtualPanel::new();
        let recorder = Recorder::default();
        let sink = recorder.clone();
        let mut handle = Driver::spawn(config, panel.clone(), panel.clone(), move || {
            let sinks: Vec<Box<dyn NoteSink>> = vec![Box::new(sink)];
            sinks
        });
        assert!(handle.is_running());

        panel.set_pressed(play, true);
        thread::sleep(Duration::from_millis(20));
        panel.set_pressed(play, false);
        thread::sleep(Duration::from_millis(600));
        handle.stop();

        assert!(!handle.is_running());
        let notes = recorder.0.lock().unwrap();
        let ons = notes.iter().filter(|(on, _, _)| *on).count();
        let offs = notes.len() - ons;
        assert!(ons >= 1, "no step played: {:?}", *notes);
        assert_eq!(ons, offs);
        assert_eq!(notes.last(), Some(&(false, 36, 9)));
    }
}
