//! The manager talking to a real Studio client, over a socket pair and over TCP.

mod common;

use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::{Duration, Instant};

use tas_playback::Manager;
use tas_playback::config::default_bindings;
use tas_studio_com::{Duplex, HotkeyId, StudioClient, StudioServer};

use common::{FRAME_ADVANCE, FakeHost, SCRIPT, manager, tick};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Connects a client over a socket pair and hands the server end to `manager`.
fn attach(manager: &mut Manager) -> StudioClient<UnixStream> {
    let (server_stream, client_stream) = UnixStream::pair().unwrap();
    let events = manager.main_thread_sender();

    let server_thread = thread::spawn(move || {
        StudioServer::establish(server_stream, SCRIPT, 3, move |event| {
            events.send(move |manager| manager.handle_studio_event(event));
        })
    });

    let client = StudioClient::establish(client_stream, &default_bindings(), 3).unwrap();
    manager.attach_studio(server_thread.join().unwrap().unwrap());

    client
}

/// Ticks until `done` holds or the timeout runs out.
fn tick_until<F: Fn(&Manager) -> bool>(manager: &mut Manager, host: &mut FakeHost, done: F) -> bool {
    let deadline = Instant::now() + TIMEOUT;

    while Instant::now() < deadline {
        tick(manager, host, 1);
        if done(manager) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }

    false
}

fn states_settle<S: Duplex>(client: &StudioClient<S>, count: usize) -> bool {
    let arrived = client.wait_for(TIMEOUT, |view| view.states_received >= count);
    thread::sleep(Duration::from_millis(100));
    arrived && client.view().states_received == count
}

#[test]
fn test_status_is_sent_every_tick() {
    let (mut manager, _) = manager("10\n");
    let mut host = FakeHost::new();
    let client = attach(&mut manager);

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 3);

    assert!(states_settle(&client, 3));

    let state = client.view().state.unwrap();
    assert_eq!(state.current_frame_in_tas, 3);
    assert_eq!(state.total_frames, 10);
    assert_eq!(state.current_line, 0);
    assert_eq!(state.current_line_suffix, "3/10");
    assert_eq!(state.save_state_line, -1);
    assert_eq!(state.states, 1);
}

#[test]
fn test_status_is_throttled_while_ultra_fast_forwarding() {
    let (mut manager, _) = manager("2000\nFastForward, 100\n10\n");
    let mut host = FakeHost::new();
    let client = attach(&mut manager);

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 2);

    // 101 host updates, of which only counters 23, 46, 69 and 92 report.
    assert!(manager.ultra_fast_forwarding());
    assert!(states_settle(&client, 4));
}

#[test]
fn test_frame_advance_press_is_forwarded() {
    let (mut manager, _) = manager("10\n");
    let mut host = FakeHost::new();
    let client = attach(&mut manager);

    host.press(FRAME_ADVANCE);
    tick(&mut manager, &mut host, 3);

    assert!(client.wait_for(TIMEOUT, |view| view.hotkeys_pressed == vec![HotkeyId::FrameAdvance]));
}

#[test]
fn test_studio_events_reach_the_manager() {
    let (mut manager, _) = manager("10\n");
    let mut host = FakeHost::new();
    let client = attach(&mut manager);

    client.send_path("Other.tas").unwrap();
    assert!(tick_until(&mut manager, &mut host, |manager| {
        manager.controller().path().to_str() == Some("Other.tas")
    }));
    assert_eq!(manager.settings().script_path.to_str(), Some("Other.tas"));

    let mut bindings = default_bindings();
    bindings.set(HotkeyId::FrameAdvance, vec![1]);
    client.send_new_bindings(&bindings).unwrap();

    assert!(tick_until(&mut manager, &mut host, |manager| {
        manager.hotkeys().frame_advance.keys == vec![1]
    }));
}

#[test]
fn test_dead_link_is_dropped() {
    let (mut manager, _) = manager("10\n");
    let mut host = FakeHost::new();
    let client = attach(&mut manager);
    assert!(manager.studio_connected());

    drop(client);
    assert!(tick_until(&mut manager, &mut host, |manager| !manager.studio_connected()));
}

#[test]
fn test_listener_accepts_studio_over_tcp() {
    let (mut manager, _) = manager("10\n");
    let mut host = FakeHost::new();

    manager.settings_mut().studio_address = Some("127.0.0.1:0".into());
    let address = manager.listen_for_studio().unwrap().unwrap();

    let stream = TcpStream::connect(address).unwrap();
    let client = StudioClient::establish(stream, &default_bindings(), 3).unwrap();
    assert_eq!(client.view().path, SCRIPT);

    assert!(tick_until(&mut manager, &mut host, |manager| manager.studio_connected()));

    manager.enable_run(&mut host);
    tick(&mut manager, &mut host, 2);
    assert!(client.wait_for(TIMEOUT, |view| {
        view.state.as_ref().is_some_and(|state| state.current_frame_in_tas == 2)
    }));
}

#[test]
fn test_listener_is_off_without_an_address() {
    let (mut manager, _) = manager("10\n");
    assert_eq!(manager.listen_for_studio().unwrap(), None);
}
