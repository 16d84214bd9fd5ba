//! Full runs against a fake host: speed, stepping, commands and safety stops.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tas_host_integrations::Scene;
use tas_host_integrations::input::Buttons;
use tas_playback::config::TasSettings;

use common::{FAST_FORWARD, FRAME_ADVANCE, FakeHost, SLOW_FORWARD, START_STOP, manager, manager_with, tick};

#[test]
fn test_named_script_plays_every_frame() {
    let (mut manager, _) = manager("Jump, 1\nRight, 3\nJump2\n");
    let mut host = FakeHost::new();

    manager.enable_run(&mut host);
    assert_eq!(manager.controller().total_frames(), 5);

    tick(&mut manager, &mut host, 5);
    assert_eq!(
        host.injected,
        vec![
            Buttons::JUMP | Buttons::CONFIRM,
            Buttons::RIGHT,
            Buttons::RIGHT,
            Buttons::RIGHT,
            Buttons::ALT_JUMP
        ]
    );
    assert!(manager.is_running());

    // Running off the end stops the run.
    tick(&mut manager, &mut host, 1);
    assert!(!manager.is_running());
    assert_eq!(host.injected.len(), 5);
}

#[test]
fn test_unknown_command_is_skipped() {
    let (mut manager, _) = manager("1,R\nFrobnicate, 5\n1,L\n");
    let mut host = FakeHost::new();

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 3);

    assert_eq!(host.injected, vec![Buttons::RIGHT, Buttons::LEFT]);
    assert!(!manager.is_running());
}

#[test]
fn test_disable_run_twice_is_harmless() {
    let (mut manager, _) = manager("10\n");
    let mut host = FakeHost::new();

    let disables = Arc::new(AtomicUsize::new(0));
    let counter = disables.clone();
    manager.hooks_mut().on_disable("count", move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 2);

    manager.disable_run(&mut host);
    let after_first = (manager.states(), manager.controller().current_frame_in_tas());
    manager.disable_run(&mut host);

    assert_eq!((manager.states(), manager.controller().current_frame_in_tas()), after_first);
    assert!(!manager.is_running());
    assert_eq!(manager.controller().current_frame_in_tas(), 0);
    assert_eq!(disables.load(Ordering::SeqCst), 2);
}

#[test]
fn test_enable_run_waits_for_the_game_to_boot() {
    let (mut manager, _) = manager("10\n");
    let mut host = FakeHost::new();
    host.scene = Scene::GameLoader;

    manager.enable_run(&mut host);

    assert!(!manager.is_running());
    assert_eq!(manager.controller().total_frames(), 0);
}

#[test]
fn test_start_stop_applies_on_release() {
    let (mut manager, _) = manager("1,J\n10\n");
    let mut host = FakeHost::new();

    host.press(START_STOP);
    tick(&mut manager, &mut host, 2);
    assert!(!manager.is_running());

    host.release(START_STOP);
    tick(&mut manager, &mut host, 1);
    assert!(manager.is_running());
    assert_eq!(manager.controller().current_frame_in_tas(), 1);
    assert_eq!(host.injected, vec![Buttons::JUMP | Buttons::CONFIRM]);

    host.press(START_STOP);
    tick(&mut manager, &mut host, 1);
    assert!(manager.is_running());

    host.release(START_STOP);
    tick(&mut manager, &mut host, 1);
    assert!(!manager.is_running());
    assert_eq!(manager.controller().current_frame_in_tas(), 0);
}

#[test]
fn test_slow_forward_advances_a_fraction_of_ticks() {
    let settings = TasSettings {
        slow_forward_speed: 0.25,
        ..TasSettings::default()
    };
    let (mut manager, _) = manager_with("100\n", settings);
    let mut host = FakeHost::new();

    host.press(SLOW_FORWARD);
    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 40);

    assert!(manager.slow_forwarding());
    assert_eq!(manager.controller().current_frame_in_tas(), 10);

    // Skipped ticks freeze the scene but keep the host's base update running.
    assert_eq!(host.scene_updates, 10);
    assert_eq!(host.base_updates, 40);
}

#[test]
fn test_fast_forward_batches_one_frame_per_update() {
    let (mut manager, _) = manager("100\n");
    let mut host = FakeHost::new();

    host.press(FAST_FORWARD);
    manager.enable_run(&mut host);

    tick(&mut manager, &mut host, 1);
    assert_eq!(manager.frame_loops(), 10.0);
    assert_eq!(manager.controller().current_frame_in_tas(), 1);

    tick(&mut manager, &mut host, 1);
    assert_eq!(manager.controller().current_frame_in_tas(), 11);
    assert_eq!(host.scene_updates, 11);
    assert_eq!(host.base_updates, 2);
}

#[test]
fn test_autosave_hazard_cuts_batch_short() {
    let (mut manager, _) = manager("100\n");
    let mut host = FakeHost::new();

    host.press(FAST_FORWARD);
    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 1);

    assert_eq!(host.base_updates, 1);

    // The cut batch runs its one update with the base update still skipped.
    host.autosaving = true;
    tick(&mut manager, &mut host, 1);

    assert_eq!(manager.controller().current_frame_in_tas(), 2);
    assert_eq!(host.scene_updates, 2);
    assert_eq!(host.base_updates, 1);
}

#[test]
fn test_script_fast_forward_ends_at_target() {
    let (mut manager, _) = manager("30\nFastForward, 20\n30\n");
    let mut host = FakeHost::new();

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 1);
    assert_eq!(manager.frame_loops(), 20.0);

    tick(&mut manager, &mut host, 1);
    assert_eq!(manager.controller().current_frame_in_tas(), 21);

    // The second batch crosses the target; speed returns to normal afterwards.
    tick(&mut manager, &mut host, 1);
    assert_eq!(manager.controller().current_frame_in_tas(), 41);
    assert_eq!(manager.frame_loops(), 1.0);

    tick(&mut manager, &mut host, 1);
    assert_eq!(manager.controller().current_frame_in_tas(), 42);
}

#[test]
fn test_breakpoint_pauses_then_frame_advance_steps_once() {
    let (mut manager, _) = manager("5\n***\n5,J\n");
    let mut host = FakeHost::new();

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 2);

    assert!(manager.is_running());
    assert!(manager.states().is_frame_stepping());
    assert_eq!(manager.controller().current_frame_in_tas(), 5);

    tick(&mut manager, &mut host, 3);
    assert_eq!(manager.controller().current_frame_in_tas(), 5);

    host.press(FRAME_ADVANCE);
    tick(&mut manager, &mut host, 1);
    assert_eq!(manager.controller().current_frame_in_tas(), 6);
    assert_eq!(host.injected.last(), Some(&(Buttons::JUMP | Buttons::CONFIRM)));

    // Holding the key does not keep stepping.
    tick(&mut manager, &mut host, 3);
    assert_eq!(manager.controller().current_frame_in_tas(), 6);
    assert!(manager.states().is_frame_stepping());

    host.release(FRAME_ADVANCE);
    tick(&mut manager, &mut host, 1);
    host.press(FRAME_ADVANCE);
    tick(&mut manager, &mut host, 1);
    assert_eq!(manager.controller().current_frame_in_tas(), 7);
}

#[test]
fn test_breakpoint_at_end_stops_the_run() {
    let (mut manager, _) = manager("3\n***\n");
    let mut host = FakeHost::new();

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 2);

    assert!(!manager.is_running());
    assert!(!manager.states().is_frame_stepping());
    assert_eq!(host.injected.len(), 3);
}

#[test]
fn test_console_command_runs_once_at_its_frame() {
    let (mut manager, _) = manager("1\nConsole load 1a\n2\nConsole, give, key\n");
    let mut host = FakeHost::new();

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 1);
    assert!(host.console.is_empty());

    tick(&mut manager, &mut host, 5);
    assert_eq!(host.console, vec![vec!["load".to_string(), "1a".to_string()]]);
}

#[test]
fn test_stop_run_command_ends_the_run() {
    let (mut manager, _) = manager("2\nStopRun\n5\n");
    let mut host = FakeHost::new();

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 5);

    assert!(!manager.is_running());
    assert_eq!(host.injected.len(), 3);
}

#[test]
fn test_unsafe_scene_stops_the_run() {
    let (mut manager, _) = manager("10\n");
    let mut host = FakeHost::new();
    host.scene = Scene::Other;

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 4);

    assert!(!manager.is_running());
    assert_eq!(host.injected.len(), 2);
}

#[test]
fn test_unsafe_command_allows_any_scene() {
    let (mut manager, source) = manager("Unsafe\n10\n");
    let mut host = FakeHost::new();
    host.scene = Scene::Other;

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 4);

    assert!(manager.is_running());
    assert!(!manager.settings().disallow_unsafe_input);

    // Every fresh parse starts safe again.
    source.set(common::SCRIPT, "10\n");
    manager.disable_run(&mut host);
    manager.enable_run(&mut host);
    assert!(manager.settings().disallow_unsafe_input);
}

#[test]
fn test_edited_script_keeps_the_cursor() {
    let (mut manager, source) = manager("1,R\n1,R\n1,R\n");
    let mut host = FakeHost::new();

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 1);

    source.set(common::SCRIPT, "1,R\n3,L\n");
    tick(&mut manager, &mut host, 1);

    assert_eq!(manager.controller().total_frames(), 4);
    assert_eq!(host.injected, vec![Buttons::RIGHT, Buttons::LEFT]);
}

#[test]
fn test_queued_actions_run_at_the_start_of_a_tick() {
    let (mut manager, _) = manager("10\n");
    let mut host = FakeHost::new();

    let sender = manager.main_thread_sender();
    thread::spawn(move || {
        sender.send(|manager| manager.settings_mut().fast_forward_speed = 42);
    })
    .join()
    .unwrap();

    assert_eq!(manager.settings().fast_forward_speed, 10);
    tick(&mut manager, &mut host, 1);
    assert_eq!(manager.settings().fast_forward_speed, 42);

    // On the owning thread, actions run right away.
    manager.add_main_thread_action(|manager| manager.settings_mut().fast_forward_speed = 7);
    assert_eq!(manager.settings().fast_forward_speed, 7);
}

#[test]
fn test_master_switch_leaves_the_host_alone() {
    let settings = TasSettings {
        enabled: false,
        ..TasSettings::default()
    };
    let (mut manager, _) = manager_with("10\n", settings);
    let mut host = FakeHost::new();

    host.press(START_STOP);
    tick(&mut manager, &mut host, 1);
    host.release(START_STOP);
    tick(&mut manager, &mut host, 1);

    assert!(!manager.is_running());
    assert_eq!(host.polls, 2);
    assert_eq!(host.scene_updates, 2);
}
