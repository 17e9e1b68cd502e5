use std::sync::Once;
use std::thread;
use std::time::Duration;

use mavnode::prelude::*;

static INIT: Once = Once::new();
const WAIT_DURATION: Duration = Duration::from_millis(100);
const HOST: &str = "127.0.0.1";

fn initialize() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Warn)
            .filter_module(env!("CARGO_PKG_NAME"), log::LevelFilter::Debug)
            .init();
    });
}

fn unused_port() -> portpicker::Port {
    portpicker::pick_unused_port().unwrap()
}

fn make_addr(port: portpicker::Port) -> String {
    format!("{HOST}:{port}")
}

fn wait() {
    thread::sleep(WAIT_DURATION)
}

fn test_dialect() -> Dialect {
    Dialect::new(
        3,
        vec![MessageSchema::new(
            0,
            "HEARTBEAT",
            vec![
                FieldDef::new("type", FieldType::UInt8),
                FieldDef::new("autopilot", FieldType::UInt8),
                FieldDef::new("base_mode", FieldType::UInt8),
                FieldDef::new("custom_mode", FieldType::UInt32),
                FieldDef::new("system_status", FieldType::UInt8),
                FieldDef::new("mavlink_version", FieldType::UInt8),
            ],
        )
        .unwrap()],
    )
    .unwrap()
}

fn test_heartbeat() -> Message {
    let mut message = test_dialect().new_message(0).unwrap();
    message.set("type", 7u8).unwrap();
    message.set("autopilot", 5u8).unwrap();
    message.set("base_mode", 4u8).unwrap();
    message.set("custom_mode", 3u32).unwrap();
    message.set("system_status", 2u8).unwrap();
    message.set("mavlink_version", 1u8).unwrap();
    message
}

#[test]
fn signed_frames_are_accepted_with_matching_keys() {
    initialize();
    let key1 = SecretKey::from([0x4F; 32]);
    let key2 = SecretKey::from([0xA8; 32]);

    let port = unused_port();
    let node1 = Node::builder()
        .version(V2)
        .system_id(10)
        .dialect(test_dialect())
        .no_heartbeat()
        .in_key(key2.clone())
        .out_key(key1.clone())
        .endpoint(UdpServer::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    let node2 = Node::builder()
        .version(V2)
        .system_id(11)
        .dialect(test_dialect())
        .no_heartbeat()
        .in_key(key1)
        .out_key(key2)
        .endpoint(UdpClient::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    let receiver = thread::spawn(move || {
        for event in node1.events() {
            match event {
                Event::Frame { frame, message, .. } => {
                    assert!(frame.is_signed());
                    assert_eq!(message, Some(test_heartbeat()));
                    assert_eq!(frame.system_id(), 11);
                    node1.write_message_all(&test_heartbeat());
                    wait();
                    return;
                }
                Event::ParseError { error, .. } => panic!("frame rejected: {error}"),
                _ => {}
            }
        }
        panic!("node 1 saw no frame");
    });

    let sender = thread::spawn(move || {
        wait();
        node2.write_message_all(&test_heartbeat());

        // The reply must verify against our in-key as well.
        for event in node2.events() {
            match event {
                Event::Frame { frame, .. } => {
                    assert!(frame.is_signed());
                    assert_eq!(frame.system_id(), 10);
                    return;
                }
                Event::ParseError { error, .. } => panic!("frame rejected: {error}"),
                _ => {}
            }
        }
        panic!("node 2 saw no frame");
    });

    receiver.join().unwrap();
    sender.join().unwrap();
}

#[test]
fn wrong_out_key_is_rejected() {
    initialize();
    let key1 = SecretKey::from([0x4F; 32]);
    let key2 = SecretKey::from([0xA8; 32]);

    let port = unused_port();
    let node1 = Node::builder()
        .version(V2)
        .system_id(10)
        .dialect(test_dialect())
        .no_heartbeat()
        .in_key(key2)
        .out_key(key1)
        .endpoint(UdpServer::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    // Signs with a key node 1 does not accept.
    let node2 = Node::builder()
        .version(V2)
        .system_id(11)
        .dialect(test_dialect())
        .no_heartbeat()
        .out_key(SecretKey::from([0x00; 32]))
        .endpoint(UdpClient::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    let receiver = thread::spawn(move || {
        for event in node1.events() {
            match event {
                Event::ParseError { error, .. } => {
                    assert_eq!(error, FrameError::Signature);
                    return;
                }
                Event::Frame { .. } => panic!("badly signed frame accepted"),
                _ => {}
            }
        }
        panic!("node 1 saw no event");
    });

    wait();
    node2.write_message_all(&test_heartbeat());

    receiver.join().unwrap();
    node2.close();
}

#[test]
fn unsigned_frames_are_rejected_when_key_is_set() {
    initialize();
    let port = unused_port();

    let node1 = Node::builder()
        .version(V2)
        .system_id(10)
        .dialect(test_dialect())
        .no_heartbeat()
        .in_key(SecretKey::from([0x4F; 32]))
        .endpoint(UdpServer::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    // No out-key: writes unsigned frames.
    let node2 = Node::builder()
        .version(V2)
        .system_id(11)
        .dialect(test_dialect())
        .no_heartbeat()
        .endpoint(UdpClient::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    let receiver = thread::spawn(move || {
        for event in node1.events() {
            match event {
                Event::ParseError { error, .. } => {
                    assert_eq!(error, FrameError::Signature);
                    return;
                }
                Event::Frame { .. } => panic!("unsigned frame accepted"),
                _ => {}
            }
        }
        panic!("node 1 saw no event");
    });

    wait();
    node2.write_message_all(&test_heartbeat());

    receiver.join().unwrap();
    node2.close();
}

#[test]
fn signed_frames_are_rejected_without_a_key() {
    initialize();
    let port = unused_port();

    // No in-key: signed traffic is suspicious and rejected.
    let node1 = Node::builder()
        .version(V2)
        .system_id(10)
        .dialect(test_dialect())
        .no_heartbeat()
        .endpoint(UdpServer::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    let node2 = Node::builder()
        .version(V2)
        .system_id(11)
        .dialect(test_dialect())
        .no_heartbeat()
        .out_key(SecretKey::from([0x4F; 32]))
        .endpoint(UdpClient::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    let receiver = thread::spawn(move || {
        for event in node1.events() {
            match event {
                Event::ParseError { error, .. } => {
                    assert_eq!(error, FrameError::Signature);
                    return;
                }
                Event::Frame { .. } => panic!("signed frame accepted without key"),
                _ => {}
            }
        }
        panic!("node 1 saw no event");
    });

    wait();
    node2.write_message_all(&test_heartbeat());

    receiver.join().unwrap();
    node2.close();
}
