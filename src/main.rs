#[cfg(feature = "gui")]
use eframe::egui;

use std::sync::{Arc, Mutex};
use stepgate::{AudioOutput, Config, MidiOutputDevice, NoteSink, SerialMidiOutput};

#[cfg(feature = "gui")]
use stepgate::{midi_note_name, Driver, DriverHandle, Indicator, VirtualPanel, STEP_COUNT};

type SharedMidi = Arc<Mutex<MidiOutputDevice>>;

fn load_config() -> Config {
    let path = std::env::args().nth(1).map(std::path::PathBuf::from);
    match Config::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("stepgate: {}", e);
            std::process::exit(1);
        }
    }
}

/// Note sinks for the driver thread: the shared MIDI port, an optional DIN
/// serial line, and the audio monitor when asked for.
fn build_sinks(config: &Config, midi: SharedMidi, monitor: bool) -> Vec<Box<dyn NoteSink>> {
    let mut sinks: Vec<Box<dyn NoteSink>> = vec![Box::new(midi)];

    if let Some(path) = &config.midi.serial {
        match SerialMidiOutput::open(&path.to_string_lossy()) {
            Ok(port) => sinks.push(Box::new(port)),
            Err(e) => log::warn!("cannot open {}: {}", path.display(), e),
        }
    }

    if monitor {
        sinks.push(Box::new(AudioOutput::default()));
    }
    sinks
}

fn connect_configured_port(config: &Config, midi: &SharedMidi) {
    let Some(name) = &config.midi.port else {
        return;
    };
    if let Ok(mut device) = midi.lock() {
        if let Err(e) = device.connect_named(name) {
            log::warn!("MIDI port {}: {}", name, e);
        }
    }
}

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    env_logger::init();
    let config = load_config();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([520.0, 360.0])
            .with_title("STEPGATE - Step Sequencer"),
        ..Default::default()
    };

    eframe::run_native(
        "STEPGATE",
        options,
        Box::new(|_cc| Ok(Box::new(PanelApp::new(config)))),
    )
}

#[cfg(not(feature = "gui"))]
fn main() {
    use stepgate::{Driver, MonotonicClock, VirtualPanel};

    env_logger::init();
    let config = load_config();
    let midi: SharedMidi = Arc::new(Mutex::new(MidiOutputDevice::new()));
    connect_configured_port(&config, &midi);
    let monitor = config.midi.port.is_none() && config.midi.serial.is_none();

    // No buttons headless: the configured pattern just plays.
    let panel = VirtualPanel::new();
    let clock = MonotonicClock::new();
    let sinks = build_sinks(&config, midi, monitor);
    let mut driver = Driver::new(&config, panel.clone(), panel, sinks);
    driver.engine_mut().start(clock.now());
    log::info!("playing headless at {} BPM", config.bpm);

    let running = Arc::new(Mutex::new(true));
    let handler_running = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        if let Ok(mut running) = handler_running.lock() {
            *running = false;
        }
    }) {
        log::warn!("no Ctrl-C handler, notes may hang on exit: {}", e);
    }

    driver.run(&clock, &running);
}

#[cfg(feature = "gui")]
struct PanelApp {
    config: Config,
    panel: VirtualPanel,
    midi: SharedMidi,
    driver: DriverHandle,

    // UI state
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    tempo: f32,
    swing: f32,
}

#[cfg(feature = "gui")]
impl PanelApp {
    fn new(config: Config) -> Self {
        let available_midi_ports = MidiOutputDevice::available_ports();
        let midi: SharedMidi = Arc::new(Mutex::new(MidiOutputDevice::new()));
        connect_configured_port(&config, &midi);
        let selected_port = midi
            .lock()
            .ok()
            .and_then(|d| d.port_name().map(str::to_string))
            .and_then(|name| available_midi_ports.iter().position(|p| *p == name));

        let panel = VirtualPanel::new();
        let tempo = config.bpm as f32 / 240.0;
        if let (Some(tempo_pot), Some(swing_pot)) = (config.pins.tempo_pot, config.pins.swing_pot) {
            panel.set_analog(tempo_pot, tempo);
            panel.set_analog(swing_pot, 0.5);
        }

        let sink_config = config.clone();
        let sink_midi = Arc::clone(&midi);
        let driver = Driver::spawn(config.clone(), panel.clone(), panel.clone(), move || {
            build_sinks(&sink_config, sink_midi, true)
        });

        Self {
            config,
            panel,
            midi,
            driver,
            available_midi_ports,
            selected_port,
            tempo,
            swing: 0.5,
        }
    }

    fn connect(&mut self, port_idx: usize) {
        let Ok(mut device) = self.midi.lock() else {
            return;
        };
        // Nothing may be left hanging on the old port.
        if let Err(e) = device.all_notes_off() {
            log::warn!("all notes off failed: {}", e);
        }
        match device.connect(port_idx) {
            Ok(()) => self.selected_port = Some(port_idx),
            Err(e) => log::warn!("MIDI connect failed: {}", e),
        }
    }

    /// Momentary button: the pin reads pressed only while held.
    fn button(&self, ui: &mut egui::Ui, label: &str, pin: u8) {
        let response = ui.add(egui::Button::new(label).min_size(egui::vec2(80.0, 60.0)));
        self.panel.set_pressed(pin, response.is_pointer_button_down_on());
    }

    fn led(&self, ui: &mut egui::Ui, indicator: Indicator) {
        let (rect, _) = ui.allocate_exact_size(egui::vec2(80.0, 16.0), egui::Sense::hover());
        let color = if self.panel.led(indicator) {
            egui::Color32::from_rgb(100, 200, 100)
        } else {
            egui::Color32::from_rgb(40, 40, 40)
        };
        ui.painter().circle_filled(rect.center(), 6.0, color);
    }
}

#[cfg(feature = "gui")]
impl eframe::App for PanelApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("STEPGATE - Step Sequencer");
            ui.add_space(10.0);

            // MIDI Port Selection
            let mut selected_port_changed = None;
            ui.horizontal(|ui| {
                ui.label("MIDI Output:");
                if self.available_midi_ports.is_empty() {
                    ui.label("No MIDI ports available");
                } else {
                    egui::ComboBox::from_label("")
                        .selected_text(
                            self.selected_port
                                .map(|i| self.available_midi_ports[i].as_str())
                                .unwrap_or("Select port..."),
                        )
                        .show_ui(ui, |ui| {
                            for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                                if ui
                                    .selectable_label(self.selected_port == Some(i), port_name)
                                    .clicked()
                                {
                                    selected_port_changed = Some(i);
                                }
                            }
                        });
                }
            });

            if let Some(port_idx) = selected_port_changed {
                self.connect(port_idx);
            }

            ui.add_space(10.0);

            // Step buttons with their LEDs
            ui.horizontal(|ui| {
                for step in 0..STEP_COUNT {
                    ui.vertical(|ui| {
                        self.led(ui, Indicator::Step(step));
                        self.button(ui, &format!("{}", step + 1), self.config.pins.steps[step]);
                    });
                }
            });

            ui.add_space(10.0);

            // Transport and voice select
            ui.horizontal(|ui| {
                ui.vertical(|ui| {
                    self.led(ui, Indicator::Playback);
                    self.button(ui, "▶ / ⏹", self.config.pins.play);
                });
                if let Some(pin) = self.config.pins.voice_select {
                    ui.vertical(|ui| {
                        ui.add_space(16.0);
                        self.button(ui, "Voice", pin);
                    });
                }
            });

            // Pots, only read by the swing clock
            if self.config.swing.is_some() {
                ui.add_space(10.0);
                if let (Some(tempo_pot), Some(swing_pot)) =
                    (self.config.pins.tempo_pot, self.config.pins.swing_pot)
                {
                    ui.horizontal(|ui| {
                        ui.label("Tempo:");
                        if ui.add(egui::Slider::new(&mut self.tempo, 0.0..=1.0)).changed() {
                            self.panel.set_analog(tempo_pot, self.tempo);
                        }
                        ui.label(format!("{:.0} BPM", self.tempo * 240.0));

                        ui.add_space(20.0);

                        ui.label("Swing:");
                        if ui.add(egui::Slider::new(&mut self.swing, 0.0..=1.0)).changed() {
                            self.panel.set_analog(swing_pot, self.swing);
                        }
                    });
                }
            }

            // Info
            ui.separator();
            let voices: Vec<String> = self
                .config
                .voices
                .iter()
                .map(|v| format!("{} ch{}", midi_note_name(v.note), v.channel + 1))
                .collect();
            ui.label(format!("Voices: {}", voices.join(", ")));
            ui.label("Press a step button to toggle it on the selected voice");
            let connected = self.midi.lock().map(|d| d.is_connected()).unwrap_or(false);
            if !connected {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    "⚠ No MIDI output connected - audio playback only",
                );
            }
            if !self.driver.is_running() {
                ui.colored_label(egui::Color32::RED, "Driver stopped");
            }
        });
    }
}
