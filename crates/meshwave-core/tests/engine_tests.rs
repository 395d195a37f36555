use meshwave_core::audio::SessionState;
use meshwave_core::{
    AudioReactivityEngine, AudioReactivitySettings, BandMapping, BandRange, DeviceSelector,
    MockBackend, MockHandle,
};
use std::collections::HashMap;
use std::f32::consts::PI;
use std::thread;

/// A sine that lands exactly on `bin` of a `block_size`-point transform
fn tone(bin: usize, block_size: usize, amplitude: f32) -> Vec<f32> {
    (0..block_size)
        .map(|i| amplitude * (2.0 * PI * bin as f32 * i as f32 / block_size as f32).sin())
        .collect()
}

fn engine_with_mic() -> (AudioReactivityEngine, MockHandle) {
    let (backend, handle) = MockBackend::new();
    handle.add_device("Built-in Mic", 1, 0);
    handle.add_device("USB Interface", 2, 0);
    let engine = AudioReactivityEngine::new(Box::new(backend)).unwrap();
    (engine, handle)
}

fn params(ids: &[&str]) -> HashMap<String, f32> {
    ids.iter().map(|id| (id.to_string(), 0.0)).collect()
}

#[test]
fn test_tone_drives_its_band() {
    let (mut engine, handle) = engine_with_mic();
    engine.setup(false).unwrap();
    engine.set_enabled(true).unwrap();
    engine.set_smoothing(0.0);
    // Bin 30 is inside the mids band (12..=46)
    engine.add_mapping(BandMapping::new(3, "zoom", 1.0, 0.0, 1.0, false));

    assert_eq!(handle.push_samples(&tone(30, 1024, 0.5)), 1);

    let mut store = params(&["zoom"]);
    assert_eq!(engine.update(&mut store), 1);

    let bands = engine.bands();
    assert_eq!(bands.len(), 8);
    let loudest = bands
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |acc, (i, &e)| if e > acc.1 { (i, e) } else { acc })
        .0;
    assert_eq!(loudest, 3);
    assert!(store["zoom"] > 0.0);
    assert!((store["zoom"] - engine.band(3)).abs() < 1e-6);

    let level = engine.input_level();
    assert!((level - 0.5 / 2.0f32.sqrt()).abs() < 1e-3);
}

#[test]
fn test_silence_before_first_block() {
    let (mut engine, _handle) = engine_with_mic();
    engine.setup(false).unwrap();
    engine.set_enabled(true).unwrap();
    engine.add_mapping(BandMapping::new(0, "zoom", 1.0, 0.2, 1.0, false));

    let mut store = params(&["zoom"]);
    engine.update(&mut store);

    assert!(engine.bands().iter().all(|&b| b == 0.0));
    assert!((store["zoom"] - 0.2).abs() < 1e-6);
}

#[test]
fn test_disabled_engine_leaves_parameters_alone() {
    let (mut engine, handle) = engine_with_mic();
    engine.setup(false).unwrap();
    engine.add_mapping(BandMapping::new(3, "zoom", 1.0, 0.0, 1.0, false));

    assert_eq!(handle.push_samples(&tone(30, 1024, 0.5)), 0);
    let mut store = params(&["zoom"]);
    assert_eq!(engine.update(&mut store), 0);
    assert_eq!(store["zoom"], 0.0);
}

#[test]
fn test_performance_mode_opens_smaller_blocks() {
    let (mut engine, handle) = engine_with_mic();
    engine.set_enabled(true).unwrap();
    engine.setup(true).unwrap();

    assert_eq!(engine.session_state(), SessionState::Connected);
    assert_eq!(handle.last_settings().unwrap().block_size, 512);
    assert_eq!(engine.processed_spectrum().len(), 256);
}

#[test]
fn test_custom_bands_reset_energies() {
    let (mut engine, handle) = engine_with_mic();
    engine.setup(false).unwrap();
    engine.set_enabled(true).unwrap();
    engine.set_smoothing(0.0);

    handle.push_samples(&tone(30, 1024, 0.5));
    engine.update(&mut params(&[]));
    assert!(engine.band(3) > 0.0);

    engine
        .configure_bands(&[BandRange::new(0, 63), BandRange::new(64, 511)])
        .unwrap();
    assert_eq!(engine.num_bands(), 2);
    assert_eq!(engine.bands(), vec![0.0, 0.0]);

    assert!(engine.configure_bands(&[BandRange::new(9, 3)]).is_err());
    assert_eq!(engine.num_bands(), 2);
}

#[test]
fn test_mapping_to_missing_band_is_skipped() {
    let (mut engine, handle) = engine_with_mic();
    engine.setup(false).unwrap();
    engine.set_enabled(true).unwrap();
    engine.set_num_bands(4).unwrap();
    engine.add_mapping(BandMapping::new(7, "zoom", 1.0, 0.0, 1.0, false));
    engine.add_mapping(BandMapping::new(0, "missing", 1.0, 0.0, 1.0, false));

    handle.push_samples(&tone(30, 1024, 0.5));
    let mut store = params(&["zoom"]);
    assert_eq!(engine.update(&mut store), 0);
    assert_eq!(store["zoom"], 0.0);
}

#[test]
fn test_samples_from_driver_thread() {
    let (mut engine, handle) = engine_with_mic();
    engine.setup(false).unwrap();
    engine.set_enabled(true).unwrap();

    let driver = {
        let handle = handle.clone();
        thread::spawn(move || {
            let block = tone(30, 1024, 0.5);
            for chunk in block.chunks(256).cycle().take(64) {
                handle.push_samples(chunk);
            }
        })
    };

    let mut store = params(&[]);
    for _ in 0..20 {
        engine.update(&mut store);
    }
    driver.join().unwrap();
    engine.update(&mut store);

    assert!(engine.input_level() > 0.0);
    assert!(engine.bands().iter().all(|b| b.is_finite()));
}

#[test]
fn test_exit_stops_input_and_analysis() {
    let (mut engine, handle) = engine_with_mic();
    engine.setup(false).unwrap();
    engine.set_enabled(true).unwrap();
    engine.set_smoothing(0.0);
    handle.push_samples(&tone(30, 1024, 0.5));
    engine.update(&mut params(&[]));
    let before = engine.processed_spectrum();

    engine.exit();
    assert_eq!(handle.active_sessions(), 0);

    engine.submit_samples(&tone(100, 1024, 0.9));
    engine.update(&mut params(&[]));
    assert_eq!(engine.processed_spectrum(), before);
    assert_eq!(handle.active_sessions(), 0);
}

#[test]
fn test_select_device_by_name_and_index() {
    let (mut engine, handle) = engine_with_mic();
    engine.setup(false).unwrap();
    engine.set_enabled(true).unwrap();
    assert_eq!(engine.current_device_name(), "Built-in Mic");

    engine
        .select_device(&DeviceSelector::Name("USB Interface".into()))
        .unwrap();
    assert_eq!(engine.current_device_index(), Some(1));

    assert!(engine.select_device(&DeviceSelector::Index(5)).is_err());
    assert_eq!(engine.current_device_name(), "USB Interface");
    assert_eq!(handle.active_sessions(), 1);
}

#[test]
fn test_apply_settings_replaces_mappings() {
    let (mut engine, _handle) = engine_with_mic();
    engine.add_mapping(BandMapping::new(0, "zoom", 1.0, 0.0, 1.0, true));
    engine.add_mapping(BandMapping::new(1, "rotate_x", 1.0, 0.0, 1.0, true));

    let settings = AudioReactivitySettings {
        sensitivity: 2.0,
        smoothing: 1.4,
        mappings: vec![BandMapping::new(6, "x_displace", 2.0, -0.5, 0.5, false)],
        ..Default::default()
    };
    engine.apply_settings(&settings);

    assert_eq!(engine.mappings(), settings.mappings.as_slice());
    assert_eq!(engine.sensitivity(), 2.0);
    assert_eq!(engine.smoothing(), 0.99);
}

#[test]
fn test_apply_settings_band_ranges() {
    let (mut engine, _handle) = engine_with_mic();

    let custom = AudioReactivitySettings {
        num_bands: 8,
        band_ranges: vec![BandRange::new(0, 9), BandRange::new(10, 99), BandRange::new(100, 511)],
        ..Default::default()
    };
    engine.apply_settings(&custom);
    assert_eq!(engine.num_bands(), 3);
    assert_eq!(engine.band_ranges(), custom.band_ranges);

    let invalid = AudioReactivitySettings {
        num_bands: 4,
        band_ranges: vec![BandRange::new(50, 10)],
        ..Default::default()
    };
    engine.apply_settings(&invalid);
    assert_eq!(engine.num_bands(), 4);
}

#[test]
fn test_apply_settings_restores_device() {
    let (mut engine, handle) = engine_with_mic();
    let settings = AudioReactivitySettings {
        enabled: true,
        device_name: Some("USB Interface".into()),
        ..Default::default()
    };
    engine.apply_settings(&settings);
    assert_eq!(handle.active_sessions(), 0);

    engine.setup(false).unwrap();
    assert_eq!(engine.current_device_name(), "USB Interface");

    let snapshot = engine.settings();
    assert!(snapshot.enabled);
    assert_eq!(snapshot.device_name.as_deref(), Some("USB Interface"));
    assert_eq!(snapshot.device_index, Some(1));
}

#[test]
fn test_apply_settings_restores_device_by_index() {
    let (mut engine, _handle) = engine_with_mic();
    engine.setup(false).unwrap();
    let settings = AudioReactivitySettings {
        enabled: true,
        device_index: Some(1),
        ..Default::default()
    };
    engine.apply_settings(&settings);
    assert_eq!(engine.current_device_name(), "USB Interface");
}

#[test]
fn test_unplugged_device_reconnects_on_update() {
    let (mut engine, handle) = engine_with_mic();
    engine.setup(false).unwrap();
    engine.set_enabled(true).unwrap();
    engine.set_rescan_interval(std::time::Duration::ZERO);

    handle.remove_device("Built-in Mic");
    engine.update(&mut params(&[]));
    assert_eq!(engine.session_state(), SessionState::Disabled);

    handle.add_device("Built-in Mic", 1, 0);
    engine.update(&mut params(&[]));
    assert_eq!(engine.session_state(), SessionState::Connected);
    assert_eq!(engine.current_device_name(), "Built-in Mic");
}
