use mdns_ctl::ctl_parser::{encode_service_event, CtlMessage, ServiceState};
use mdns_ctl::{BrowseEvent, BrowseSession, ControlConn, Error, Selector};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::thread;
use std::time::SystemTime;
use test_log::test;

/// A unique socket path under the system temp dir.
fn temp_socket_path(tag: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap();
    std::env::temp_dir().join(format!("mdns-ctl-{}-{}.sock", tag, now.as_micros()))
}

/// Reads the next frame from the client and asserts it is a subscribe.
fn expect_subscribe(conn: &mut ControlConn) -> (Option<String>, Option<String>) {
    match conn.receive().expect("daemon failed to read a frame") {
        CtlMessage::Subscribe {
            application,
            protocol,
        } => (application, protocol),
        other => panic!("expected a subscribe request, got {:?}", other),
    }
}

fn send_event(conn: &mut ControlConn, state: ServiceState, name: Option<&str>, app: &str, proto: &str) {
    let frame = encode_service_event(state, name, app, proto).unwrap();
    conn.send(frame).unwrap();
}

/// The full expansion scenario: a wildcard subscription, a category event
/// that makes the client walk one level down, then a concrete instance
/// reported under the new scope.
#[test]
fn test_wildcard_expands_and_reports_instance() {
    let path = temp_socket_path("expand");
    let listener = UnixListener::bind(&path).unwrap();

    let daemon = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut conn = ControlConn::from_stream(stream);

        assert_eq!(expect_subscribe(&mut conn), (None, None));

        // Announce a category: the client must subscribe to exactly it.
        send_event(&mut conn, ServiceState::Up, None, "_http", "_tcp");
        assert_eq!(
            expect_subscribe(&mut conn),
            (Some("_http".to_string()), Some("_tcp".to_string()))
        );

        // A concrete instance under the new scope, then hang up.
        send_event(
            &mut conn,
            ServiceState::Up,
            Some("printer1._http._tcp"),
            "_http",
            "_tcp",
        );
    });

    let client = ControlConn::connect(&path).unwrap();
    let session = BrowseSession::open(client, Selector::all(), false).unwrap();

    let mut discovered = Vec::new();
    let err = session
        .run(|event| {
            if let BrowseEvent::ServiceUp(s) = event {
                discovered.push((
                    s.name().to_string(),
                    s.application().to_string(),
                    s.protocol().to_string(),
                ));
            }
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err, Error::Disconnected);
    assert_eq!(
        discovered,
        vec![(
            "printer1._http._tcp".to_string(),
            "_http".to_string(),
            "_tcp".to_string()
        )]
    );

    daemon.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

/// A category announced twice must not produce a second subscribe request.
/// The daemon would tolerate one, the client just does not send it.
#[test]
fn test_duplicate_category_subscribes_once() {
    let path = temp_socket_path("dedup");
    let listener = UnixListener::bind(&path).unwrap();

    let daemon = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut conn = ControlConn::from_stream(stream);

        assert_eq!(expect_subscribe(&mut conn), (None, None));

        // Same category twice, then a different one. If the client
        // re-subscribed on the duplicate, the second read here would see
        // `_http` again instead of `_ipp`.
        send_event(&mut conn, ServiceState::Up, None, "_http", "_tcp");
        send_event(&mut conn, ServiceState::Up, None, "_http", "_tcp");
        send_event(&mut conn, ServiceState::Up, None, "_ipp", "_tcp");

        assert_eq!(
            expect_subscribe(&mut conn),
            (Some("_http".to_string()), Some("_tcp".to_string()))
        );
        assert_eq!(
            expect_subscribe(&mut conn),
            (Some("_ipp".to_string()), Some("_tcp".to_string()))
        );
    });

    let client = ControlConn::connect(&path).unwrap();
    let session = BrowseSession::open(client, Selector::all(), false).unwrap();

    let err = session.run(|_event| Ok(())).unwrap_err();
    assert_eq!(err, Error::Disconnected);

    daemon.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

/// Named events go up to the caller and never grow the subscription set;
/// nameless ones do, whatever their up/down state.
#[test]
fn test_named_events_never_subscribe() {
    let path = temp_socket_path("named");
    let listener = UnixListener::bind(&path).unwrap();

    let daemon = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut conn = ControlConn::from_stream(stream);

        assert_eq!(
            expect_subscribe(&mut conn),
            (Some("_http".to_string()), Some("_tcp".to_string()))
        );

        send_event(
            &mut conn,
            ServiceState::Up,
            Some("printer1._http._tcp"),
            "_http",
            "_tcp",
        );
        send_event(
            &mut conn,
            ServiceState::Down,
            Some("printer1._http._tcp"),
            "_http",
            "_tcp",
        );

        // A category going *down* still announces that it exists; the
        // client subscribes all the same. This is the next frame the
        // daemon sees: the named events above produced none.
        send_event(&mut conn, ServiceState::Down, None, "_ipp", "_tcp");
        assert_eq!(
            expect_subscribe(&mut conn),
            (Some("_ipp".to_string()), Some("_tcp".to_string()))
        );
    });

    let client = ControlConn::connect(&path).unwrap();
    let session = BrowseSession::open(client, Selector::new("_http", "_tcp"), false).unwrap();

    let mut deltas = Vec::new();
    let err = session
        .run(|event| {
            match event {
                BrowseEvent::ServiceUp(s) => deltas.push(format!("+{}", s.name())),
                BrowseEvent::ServiceDown(s) => deltas.push(format!("-{}", s.name())),
                _ => {}
            }
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err, Error::Disconnected);
    assert_eq!(
        deltas,
        vec![
            "+printer1._http._tcp".to_string(),
            "-printer1._http._tcp".to_string()
        ]
    );

    daemon.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

/// The daemon closing the channel ends the session with `Disconnected`,
/// before any event was delivered.
#[test]
fn test_eof_terminates_session() {
    let path = temp_socket_path("eof");
    let listener = UnixListener::bind(&path).unwrap();

    let daemon = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut conn = ControlConn::from_stream(stream);
        assert_eq!(expect_subscribe(&mut conn), (None, None));
        // Drop the connection without a word.
    });

    let client = ControlConn::connect(&path).unwrap();
    let session = BrowseSession::open(client, Selector::all(), false).unwrap();

    let mut event_count = 0;
    let err = session
        .run(|_event| {
            event_count += 1;
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err, Error::Disconnected);
    assert_eq!(event_count, 0);

    daemon.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

/// Resolution-on-discovery is an unimplemented extension point: the first
/// discovery is still reported, then the session fails loudly instead of
/// quietly skipping the resolution step.
#[test]
fn test_resolve_on_discovery_fails_loudly() {
    let path = temp_socket_path("resolve");
    let listener = UnixListener::bind(&path).unwrap();

    let daemon = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut conn = ControlConn::from_stream(stream);

        assert_eq!(
            expect_subscribe(&mut conn),
            (Some("_http".to_string()), Some("_tcp".to_string()))
        );
        send_event(
            &mut conn,
            ServiceState::Up,
            Some("printer1._http._tcp"),
            "_http",
            "_tcp",
        );

        // Keep the connection open; the client bails out on its own.
        let _ = conn.receive();
    });

    let client = ControlConn::connect(&path).unwrap();
    let session = BrowseSession::open(client, Selector::new("_http", "_tcp"), true).unwrap();

    let mut discovered = Vec::new();
    let err = session
        .run(|event| {
            if let BrowseEvent::ServiceUp(s) = event {
                discovered.push(s.name().to_string());
            }
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, Error::NotImplemented(_)));
    assert_eq!(discovered, vec!["printer1._http._tcp".to_string()]);

    daemon.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

/// Frames with a type this client does not know are skipped; traffic after
/// them is handled normally.
#[test]
fn test_unknown_frame_is_skipped() {
    let path = temp_socket_path("unknown");
    let listener = UnixListener::bind(&path).unwrap();

    let daemon = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut conn = ControlConn::from_stream(stream);

        assert_eq!(expect_subscribe(&mut conn), (None, None));

        // Hand-rolled frame of type 99 with a 2-byte payload.
        conn.send(vec![0, 10, 0, 99, 0, 0, 0, 0, 0xde, 0xad]).unwrap();
        send_event(
            &mut conn,
            ServiceState::Up,
            Some("printer1._http._tcp"),
            "_http",
            "_tcp",
        );
    });

    let client = ControlConn::connect(&path).unwrap();
    let session = BrowseSession::open(client, Selector::all(), false).unwrap();

    let mut discovered = Vec::new();
    let err = session
        .run(|event| {
            if let BrowseEvent::ServiceUp(s) = event {
                discovered.push(s.name().to_string());
            }
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err, Error::Disconnected);
    assert_eq!(discovered, vec!["printer1._http._tcp".to_string()]);

    daemon.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

/// `spawn` delivers events over the channel and reports the fatal error as
/// a final `SessionFailed` before the channel closes.
#[test]
fn test_spawn_delivers_events_over_channel() {
    let path = temp_socket_path("spawn");
    let listener = UnixListener::bind(&path).unwrap();

    let daemon = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut conn = ControlConn::from_stream(stream);

        assert_eq!(expect_subscribe(&mut conn), (None, None));
        send_event(&mut conn, ServiceState::Up, None, "_http", "_tcp");
        assert_eq!(
            expect_subscribe(&mut conn),
            (Some("_http".to_string()), Some("_tcp".to_string()))
        );
        send_event(
            &mut conn,
            ServiceState::Up,
            Some("printer1._http._tcp"),
            "_http",
            "_tcp",
        );
    });

    let client = ControlConn::connect(&path).unwrap();
    let session = BrowseSession::open(client, Selector::all(), false).unwrap();
    let receiver = session.spawn().unwrap();

    let mut saw_instance = false;
    let mut saw_failure = false;
    while let Ok(event) = receiver.recv() {
        match event {
            BrowseEvent::ServiceUp(s) => {
                assert_eq!(s.name(), "printer1._http._tcp");
                saw_instance = true;
            }
            BrowseEvent::SessionFailed(e) => {
                assert_eq!(e, Error::Disconnected);
                saw_failure = true;
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    assert!(saw_instance);
    assert!(saw_failure);

    daemon.join().unwrap();
    let _ = std::fs::remove_file(&path);
}
