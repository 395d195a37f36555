//! Console commands
//!
//! A reader thread turns stdin lines into [`Command`]s and sends them to the
//! update loop over a channel.

use crossbeam_channel::Sender;
use meshwave_core::DeviceSelector;
use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Step for sensitivity adjustments
pub const SENSITIVITY_STEP: f32 = 0.1;

/// Step for smoothing adjustments
pub const SMOOTHING_STEP: f32 = 0.05;

/// Something the user asked for
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// List input devices
    ListDevices,
    /// Switch to a device
    SelectDevice(DeviceSelector),
    /// Switch to the next input device
    NextDevice,
    /// Turn audio reactivity on or off
    Toggle,
    /// Change sensitivity by a delta
    AdjustSensitivity(f32),
    /// Change smoothing by a delta
    AdjustSmoothing(f32),
    /// Print the current band energies
    ShowBands,
    /// Print the visual parameters
    ShowParams,
    /// Write settings to disk
    Save,
    /// Print the command list
    Help,
    /// Leave the loop
    Quit,
}

/// Parse one input line. Blank or unknown input yields `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "devices" | "d" => Command::ListDevices,
        "select" | "s" if !rest.is_empty() => Command::SelectDevice(match rest.parse() {
            Ok(index) => DeviceSelector::Index(index),
            Err(_) => DeviceSelector::Name(rest.to_string()),
        }),
        "next" | "n" => Command::NextDevice,
        "toggle" | "t" => Command::Toggle,
        "sens+" | "+" => Command::AdjustSensitivity(SENSITIVITY_STEP),
        "sens-" | "-" => Command::AdjustSensitivity(-SENSITIVITY_STEP),
        "smooth+" | "]" => Command::AdjustSmoothing(SMOOTHING_STEP),
        "smooth-" | "[" => Command::AdjustSmoothing(-SMOOTHING_STEP),
        "bands" | "b" => Command::ShowBands,
        "params" | "p" => Command::ShowParams,
        "save" => Command::Save,
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(command)
}

/// Help text for the console
pub const HELP: &str = "\
Commands:
  devices | d          list input devices
  select <index|name>  switch input device
  next | n             next input device
  toggle | t           audio reactivity on/off
  sens+ / sens-        sensitivity +/- 0.1
  smooth+ / smooth-    smoothing +/- 0.05
  bands | b            show band energies
  params | p           show visual parameters
  save                 write settings
  quit | q             exit";

/// Read stdin on a background thread. End of input sends [`Command::Quit`].
pub fn spawn_reader(sender: Sender<Command>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Console read failed: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(command) => {
                        if sender.send(command).is_err() {
                            return;
                        }
                    }
                    None => println!("Unknown command '{}', type 'help'", line.trim()),
                }
            }
            debug!("Console input closed");
            let _ = sender.send(Command::Quit);
        })
}
