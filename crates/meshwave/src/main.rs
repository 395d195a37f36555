//! Meshwave - audio-reactive mesh parameters
//!
//! Minimal host for the modulation engine: loads settings, runs the update
//! loop at ~60 Hz and takes commands from the console.

mod console;
mod logging_setup;
mod tone;
mod visuals;

use anyhow::{bail, Context, Result};
use console::Command;
use crossbeam_channel::{unbounded, Receiver};
use meshwave_core::config::{read_document, SECTION_KEY};
use meshwave_core::{
    AudioBackend, AudioReactivityEngine, AudioReactivitySettings, BandMapping, DeviceSelector,
    LogConfig, MockBackend, ParameterTable,
};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tone::ToneGenerator;
use tracing::{debug, error, info, warn};
use visuals::VisualParams;

const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);
const STATUS_INTERVAL: Duration = Duration::from_secs(5);
const LOGGING_SECTION: &str = "logging";

/// Command line options
struct Options {
    settings_path: PathBuf,
    performance: bool,
    test_tone: bool,
}

impl Options {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut settings_path = None;
        let mut performance = false;
        let mut test_tone = !cfg!(feature = "audio");

        for arg in args {
            match arg.as_str() {
                "--performance" => performance = true,
                "--test-tone" => test_tone = true,
                flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
                path => settings_path = Some(PathBuf::from(path)),
            }
        }

        let settings_path = match settings_path {
            Some(path) => path,
            None => AudioReactivitySettings::default_path()
                .unwrap_or_else(|| PathBuf::from("meshwave.json")),
        };

        Ok(Self {
            settings_path,
            performance,
            test_tone,
        })
    }
}

fn log_config_from(document: &Value) -> LogConfig {
    document
        .get(LOGGING_SECTION)
        .and_then(|section| serde_json::from_value(section.clone()).ok())
        .unwrap_or_default()
}

/// Engine settings from `document`, or the starter mapping on first run
fn initial_settings(document: &Value) -> AudioReactivitySettings {
    if document.get(SECTION_KEY).is_some() {
        return AudioReactivitySettings::load_from_document(document);
    }
    info!("No audio reactivity settings yet, using starter mapping");
    starter_settings(AudioReactivitySettings::default())
}

/// Settings used when nothing has been configured yet
fn starter_settings(mut settings: AudioReactivitySettings) -> AudioReactivitySettings {
    settings.sensitivity = 2.0;
    settings.smoothing = 0.8;
    settings.enabled = true;
    settings
        .mappings
        .push(BandMapping::new(6, "x_displace", 2.0, -0.5, 0.5, false));
    settings
}

#[cfg(feature = "audio")]
fn hardware_backend() -> Result<Box<dyn AudioBackend>> {
    Ok(Box::new(meshwave_core::CpalBackend::new()))
}

#[cfg(not(feature = "audio"))]
fn hardware_backend() -> Result<Box<dyn AudioBackend>> {
    bail!("Built without audio support, use --test-tone")
}

fn create_backend(test_tone: bool) -> Result<(Box<dyn AudioBackend>, Option<ToneGenerator>)> {
    if !test_tone {
        return Ok((hardware_backend()?, None));
    }
    let (backend, handle) = MockBackend::new();
    handle.add_device(tone::TONE_DEVICE_NAME, 1, 0);
    let generator = ToneGenerator::spawn(handle).context("Failed to start test tone")?;
    info!("Using synthetic input '{}'", tone::TONE_DEVICE_NAME);
    Ok((Box::new(backend), Some(generator)))
}

struct App {
    engine: AudioReactivityEngine,
    table: ParameterTable<VisualParams>,
    visuals: VisualParams,
    settings_path: PathBuf,
    commands: Receiver<Command>,
    last_status: Instant,
}

impl App {
    /// Returns `false` when the loop should stop
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::ListDevices => {
                if let Err(e) = self.engine.scan_devices() {
                    warn!("Device scan failed: {}", e);
                }
                let current = self.engine.current_device_index();
                for device in self.engine.devices().iter().filter(|d| d.is_input()) {
                    let marker = if Some(device.index) == current { "*" } else { " " };
                    println!("{} {}", marker, device);
                }
            }
            Command::SelectDevice(selector) => self.select(&selector),
            Command::NextDevice => {
                let devices = self.engine.devices();
                let current = self.engine.current_device_index();
                let next = devices
                    .iter()
                    .filter(|d| d.is_input())
                    .find(|d| current.is_some_and(|c| d.index > c))
                    .or_else(|| devices.iter().find(|d| d.is_input()));
                match next {
                    Some(device) => self.select(&DeviceSelector::Index(device.index)),
                    None => println!("No input devices"),
                }
            }
            Command::Toggle => {
                let enabled = !self.engine.is_enabled();
                if let Err(e) = self.engine.set_enabled(enabled) {
                    error!("Could not switch audio input: {}", e);
                }
                println!(
                    "Audio reactivity {}",
                    if enabled { "enabled" } else { "disabled" }
                );
            }
            Command::AdjustSensitivity(delta) => {
                let value = self.engine.sensitivity() + delta;
                self.engine.set_sensitivity(value);
                println!("Sensitivity: {:.2}", self.engine.sensitivity());
            }
            Command::AdjustSmoothing(delta) => {
                let value = self.engine.smoothing() + delta;
                self.engine.set_smoothing(value);
                println!("Smoothing: {:.2}", self.engine.smoothing());
            }
            Command::ShowBands => {
                println!(
                    "Device: {} | level {:.3}",
                    self.engine.current_device_name(),
                    self.engine.input_level()
                );
                for (label, energy) in self.engine.band_labels().iter().zip(self.engine.bands()) {
                    let bar = "#".repeat((energy.clamp(0.0, 1.0) * 40.0) as usize);
                    println!("{:>12} {:.3} {}", label, energy, bar);
                }
            }
            Command::ShowParams => println!("{:#?}", self.visuals),
            Command::Save => match self.save() {
                Ok(()) => println!("Saved to {:?}", self.settings_path),
                Err(e) => error!("Failed to save settings: {:#}", e),
            },
            Command::Help => println!("{}", console::HELP),
            Command::Quit => return false,
        }
        true
    }

    fn select(&mut self, selector: &DeviceSelector) {
        match self.engine.select_device(selector) {
            Ok(()) => println!("Input: {}", self.engine.current_device_name()),
            Err(e) => println!("Cannot select {}: {}", selector, e),
        }
    }

    fn save(&self) -> Result<()> {
        let mut document = read_document(&self.settings_path);
        self.engine.settings().save_to_document(&mut document)?;
        if let Value::Object(map) = &mut document {
            if !map.contains_key(LOGGING_SECTION) {
                map.insert(
                    LOGGING_SECTION.to_string(),
                    serde_json::to_value(LogConfig::default())?,
                );
            }
        }

        if let Some(parent) = self.settings_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }
        fs::write(&self.settings_path, serde_json::to_string_pretty(&document)?)
            .with_context(|| format!("Failed to write {:?}", self.settings_path))?;
        Ok(())
    }

    fn run(&mut self) {
        'frames: loop {
            let frame_start = Instant::now();

            while let Ok(command) = self.commands.try_recv() {
                if !self.handle_command(command) {
                    break 'frames;
                }
            }

            let mut store = self.table.bind(&mut self.visuals);
            self.engine.update(&mut store);

            if frame_start.duration_since(self.last_status) >= STATUS_INTERVAL {
                self.last_status = frame_start;
                debug!(
                    "{} | level={:.3} bands={:?} x_displace={:.3}",
                    self.engine.current_device_name(),
                    self.engine.input_level(),
                    self.engine.bands(),
                    self.visuals.x_displace
                );
            }

            if let Some(remaining) = FRAME_INTERVAL.checked_sub(frame_start.elapsed()) {
                thread::sleep(remaining);
            }
        }
    }
}

fn main() -> Result<()> {
    let options = Options::parse(std::env::args().skip(1))?;
    let document = read_document(&options.settings_path);
    let _log_guard = logging_setup::init(&log_config_from(&document))?;

    info!("=== Meshwave session started ===");
    info!("Settings file: {:?}", options.settings_path);

    let (backend, test_tone) = create_backend(options.test_tone)?;
    let mut engine = AudioReactivityEngine::new(backend)?;

    engine.apply_settings(&initial_settings(&document));
    engine
        .setup(options.performance)
        .context("Failed to set up audio reactivity")?;

    let (sender, commands) = unbounded();
    console::spawn_reader(sender).context("Failed to start console reader")?;
    println!("{}", console::HELP);

    let mut app = App {
        engine,
        table: visuals::parameter_table(),
        visuals: VisualParams::default(),
        settings_path: options.settings_path,
        commands,
        last_status: Instant::now(),
    };
    app.run();

    if let Err(e) = app.save() {
        error!("Failed to save settings: {:#}", e);
    }
    app.engine.exit();
    drop(test_tone);

    info!("=== Meshwave session ended ===");
    Ok(())
}
