//! End-to-end handshake and messaging tests over an in-process socket pair.

use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tas_studio_com::{
    Bindings, ChannelError, ConnectionState, HotkeyId, Message, MessageKind, StudioClient, StudioEvent, StudioInfo,
    StudioServer,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn sample_bindings() -> Bindings {
    let mut bindings = Bindings::default();
    bindings.set(HotkeyId::StartStop, vec![91]);
    bindings.set(HotkeyId::FrameAdvance, vec![221]);
    bindings
}

/// Establishes both ends, returning the server, the client, and the server's event feed.
fn connect() -> (StudioServer<UnixStream>, StudioClient<UnixStream>, mpsc::Receiver<StudioEvent>) {
    let (server_stream, client_stream) = UnixStream::pair().unwrap();
    let (events_tx, events_rx) = mpsc::channel();

    let server_thread = thread::spawn(move || {
        StudioServer::establish(server_stream, "/tmp/Celeste.tas", 3, move |event| {
            let _ = events_tx.send(event);
        })
    });

    let client = StudioClient::establish(client_stream, &sample_bindings(), 3).unwrap();
    let server = server_thread.join().unwrap().unwrap();

    (server, client, events_rx)
}

fn wait_until<F: Fn() -> bool>(predicate: F) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_handshake_reaches_ready_on_both_sides() {
    let (server, client, events) = connect();

    assert_eq!(server.state(), ConnectionState::Ready);
    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(client.view().path, "/tmp/Celeste.tas");

    // The bindings from the handshake are the first thing the engine sees.
    let first = events.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(first, StudioEvent::BindingsChanged(sample_bindings()));
}

#[test]
fn test_state_and_misc_messages_reach_the_client() {
    let (server, client, _events) = connect();

    let info = StudioInfo {
        current_line: 4,
        current_line_suffix: "2/3".into(),
        current_frame_in_tas: 7,
        total_frames: 12,
        save_state_line: -1,
        states: 1,
        game_info: "Pos: 10, 20".into(),
        ..StudioInfo::default()
    };

    server.send_state(&info, false, 3).unwrap();
    server.send_player_data("Speed: 90").unwrap();
    server.send_hotkey_pressed(HotkeyId::FrameAdvance).unwrap();
    server.send_reload_bindings().unwrap();

    assert!(client.wait_for(TIMEOUT, |view| view.reload_requests == 1));

    let view = client.view();
    assert_eq!(view.state, Some(info));
    assert_eq!(view.player_data, "Speed: 90");
    assert_eq!(view.hotkeys_pressed, vec![HotkeyId::FrameAdvance]);
}

#[test]
fn test_client_messages_become_events() {
    let (_server, client, events) = connect();
    let _ = events.recv_timeout(TIMEOUT).unwrap();

    client.send_path("/tmp/Other.tas").unwrap();

    let mut new_bindings = sample_bindings();
    new_bindings.set(HotkeyId::PauseResume, vec![80]);
    client.send_new_bindings(&new_bindings).unwrap();

    assert_eq!(
        events.recv_timeout(TIMEOUT).unwrap(),
        StudioEvent::PathChanged("/tmp/Other.tas".into())
    );
    assert_eq!(
        events.recv_timeout(TIMEOUT).unwrap(),
        StudioEvent::BindingsChanged(new_bindings)
    );
}

#[test]
fn test_server_rejects_out_of_order_client() {
    let (server_stream, mut raw_client) = UnixStream::pair().unwrap();

    let server_thread = thread::spawn(move || StudioServer::establish(server_stream, "path.tas", 3, |_| {}));

    // Consume the greeting and path like a well-behaved client would...
    assert_eq!(Message::read_from(&mut raw_client).unwrap().kind, MessageKind::EstablishConnection);
    assert_eq!(Message::read_from(&mut raw_client).unwrap().kind, MessageKind::SendPath);

    // ...but answer with the wrong message.
    Message::text(MessageKind::SendPath, "nope")
        .write_to(&mut raw_client)
        .unwrap();

    let result = server_thread.join().unwrap();
    assert!(matches!(
        result,
        Err(ChannelError::UnexpectedMessage {
            state: ConnectionState::AwaitingBindings,
            expected: MessageKind::SendCurrentBindings,
            received: MessageKind::SendPath,
        })
    ));
}

#[test]
fn test_client_rejects_out_of_order_server() {
    let (mut raw_server, client_stream) = UnixStream::pair().unwrap();

    // Skip the greeting entirely.
    Message::text(MessageKind::SendPath, "path.tas")
        .write_to(&mut raw_server)
        .unwrap();

    let result = StudioClient::establish(client_stream, &sample_bindings(), 3);
    assert!(matches!(
        result,
        Err(ChannelError::UnexpectedMessage {
            expected: MessageKind::EstablishConnection,
            ..
        })
    ));
}

#[test]
fn test_server_bails_when_peer_hangs_up_mid_handshake() {
    let (server_stream, raw_client) = UnixStream::pair().unwrap();
    drop(raw_client);

    let result = StudioServer::establish(server_stream, "path.tas", 3, |_| {});
    assert!(result.is_err());
}

#[test]
fn test_server_goes_dead_when_client_drops() {
    let (server, client, _events) = connect();
    drop(client);

    assert!(wait_until(|| !server.is_alive()));
    assert_eq!(server.state(), ConnectionState::Disconnected);
    assert!(matches!(server.send_player_data("late"), Err(ChannelError::Disconnected)));
}
