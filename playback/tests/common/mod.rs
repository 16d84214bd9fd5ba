//! A scripted stand-in for the host game.

#![allow(dead_code)]

use std::collections::HashSet;

use tas_host_integrations::input::{Buttons, InputDevices, Key};
use tas_host_integrations::{Host, Scene};
use tas_playback::config::{MemoryScriptSource, TasSettings};
use tas_playback::Manager;

pub const SCRIPT: &str = "Test.tas";

pub const START_STOP: Key = 163;
pub const FAST_FORWARD: Key = 161;
pub const FRAME_ADVANCE: Key = 219;
pub const SLOW_FORWARD: Key = 220;

#[derive(Debug, Default)]
pub struct FakeHost {
    pub scene: Scene,
    pub loading: bool,
    pub active: bool,
    pub frame_counter: u64,
    pub keys_down: HashSet<Key>,
    pub right_stick_x: f32,
    pub devices: InputDevices,
    pub autosaving: bool,

    /// Pad buttons handed to the host, one entry per injected frame.
    pub injected: Vec<Buttons>,
    pub console: Vec<Vec<String>>,
    pub scene_updates: usize,
    pub base_updates: usize,
    pub polls: usize,
}

impl FakeHost {
    /// An in-level, focused host.
    pub fn new() -> Self {
        Self {
            scene: Scene::Level,
            active: true,
            ..Self::default()
        }
    }

    pub fn press(&mut self, key: Key) {
        self.keys_down.insert(key);
    }

    pub fn release(&mut self, key: Key) {
        self.keys_down.remove(&key);
    }
}

impl Host for FakeHost {
    fn scene(&self) -> Scene {
        self.scene
    }

    fn is_loading(&self) -> bool {
        self.loading
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    fn is_key_down(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }

    fn right_stick_x(&self) -> f32 {
        self.right_stick_x
    }

    fn devices(&mut self) -> &mut InputDevices {
        &mut self.devices
    }

    fn begin_update(&mut self) {
        self.frame_counter += 1;
    }

    fn poll_devices(&mut self) {
        self.polls += 1;
    }

    fn update_virtual_inputs(&mut self) {
        self.injected.push(self.devices.gamepad.current.buttons);
    }

    fn update_scene(&mut self) {
        self.scene_updates += 1;
    }

    fn update_base(&mut self) {
        self.base_updates += 1;
    }

    fn is_autosaving_with_hazards(&self) -> bool {
        self.autosaving
    }

    fn run_console_command(&mut self, args: &[String]) {
        self.console.push(args.to_vec());
    }
}

/// A manager playing `script` from memory, with the Studio link turned off.
pub fn manager_with(script: &str, settings: TasSettings) -> (Manager, MemoryScriptSource) {
    let source = MemoryScriptSource::new().with_script(SCRIPT, script);

    let manager = Manager::builder()
        .with_settings(TasSettings {
            script_path: SCRIPT.into(),
            studio_address: None,
            ..settings
        })
        .with_script_source(source.clone())
        .build();

    (manager, source)
}

pub fn manager(script: &str) -> (Manager, MemoryScriptSource) {
    manager_with(script, TasSettings::default())
}

/// Runs `count` outer ticks.
pub fn tick(manager: &mut Manager, host: &mut FakeHost, count: usize) {
    for _ in 0..count {
        manager.engine_update(host);
    }
}
