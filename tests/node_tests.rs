use std::sync::mpsc;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use mavnode::prelude::*;

static INIT: Once = Once::new();
const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Debug;
const WAIT_DURATION: Duration = Duration::from_millis(100);
const HOST: &str = "127.0.0.1";

fn initialize() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Warn)
            .filter_module(env!("CARGO_PKG_NAME"), LOG_LEVEL)
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

fn heartbeat_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::new("type", FieldType::UInt8),
        FieldDef::new("autopilot", FieldType::UInt8),
        FieldDef::new("base_mode", FieldType::UInt8),
        FieldDef::new("custom_mode", FieldType::UInt32),
        FieldDef::new("system_status", FieldType::UInt8),
        FieldDef::new("mavlink_version", FieldType::UInt8),
    ]
}

fn test_dialect() -> Dialect {
    Dialect::new(
        3,
        vec![
            MessageSchema::new(0, "HEARTBEAT", heartbeat_fields()).unwrap(),
            MessageSchema::new(
                66,
                "REQUEST_DATA_STREAM",
                vec![
                    FieldDef::new("target_system", FieldType::UInt8),
                    FieldDef::new("target_component", FieldType::UInt8),
                    FieldDef::new("req_stream_id", FieldType::UInt8),
                    FieldDef::new("req_message_rate", FieldType::UInt16),
                    FieldDef::new("start_stop", FieldType::UInt8),
                ],
            )
            .unwrap(),
        ],
    )
    .unwrap()
}

fn heartbeat(values: [u8; 5], custom_mode: u32) -> Message {
    let mut message = test_dialect().new_message(0).unwrap();
    message.set("type", values[0]).unwrap();
    message.set("autopilot", values[1]).unwrap();
    message.set("base_mode", values[2]).unwrap();
    message.set("custom_mode", custom_mode).unwrap();
    message.set("system_status", values[3]).unwrap();
    message.set("mavlink_version", values[4]).unwrap();
    message
}

fn quiet_node(system_id: u8, endpoint: impl mavnode::io::Endpoint + 'static) -> Node {
    Node::builder()
        .version(V2)
        .system_id(system_id)
        .dialect(test_dialect())
        .no_heartbeat()
        .endpoint(endpoint)
        .build()
        .unwrap()
}

/// Runs a two-way exchange over a transport pair: node 2 sends `msg1`,
/// node 1 answers with `msg2`, and both sides assert that the peer's
/// identity comes through as `system_id`/`component_id`.
fn exchange_test(node1: Node, node2: Node) {
    let msg1 = heartbeat([1, 2, 3, 4, 5], 6);
    let msg2 = heartbeat([6, 5, 4, 2, 1], 3);

    let side1 = {
        let expected = msg1.clone();
        let reply = msg2.clone();
        thread::spawn(move || {
            for event in node1.events() {
                if let Event::Frame { frame, message, .. } = event {
                    assert_eq!(message.as_ref(), Some(&expected));
                    assert_eq!(frame.system_id(), 11);
                    assert_eq!(frame.component_id(), 1);
                    node1.write_message_all(&reply);
                    // Let the write workers flush before the node closes.
                    wait();
                    return;
                }
            }
            panic!("node 1 event stream ended early");
        })
    };

    let side2 = {
        let expected = msg2.clone();
        let sent = msg1.clone();
        thread::spawn(move || {
            wait();
            node2.write_message_all(&sent);

            for event in node2.events() {
                if let Event::Frame { frame, message, .. } = event {
                    assert_eq!(message.as_ref(), Some(&expected));
                    assert_eq!(frame.system_id(), 10);
                    assert_eq!(frame.component_id(), 1);
                    return;
                }
            }
            panic!("node 2 event stream ended early");
        })
    };

    side1.join().unwrap();
    side2.join().unwrap();
}

#[test]
fn tcp_server_client_exchange() {
    initialize();
    let port = unused_port();
    let node1 = quiet_node(10, TcpServer::new(make_addr(port)).unwrap());
    let node2 = quiet_node(11, TcpClient::new(make_addr(port)).unwrap());
    exchange_test(node1, node2);
}

#[test]
fn udp_server_client_exchange() {
    initialize();
    let port = unused_port();
    let node1 = quiet_node(10, UdpServer::new(make_addr(port)).unwrap());
    let node2 = quiet_node(11, UdpClient::new(make_addr(port)).unwrap());
    exchange_test(node1, node2);
}

#[test]
fn udp_broadcast_exchange() {
    initialize();
    let port1 = unused_port();
    let port2 = unused_port();
    let node1 = quiet_node(
        10,
        UdpBroadcast::new(format!("127.255.255.255:{port2}"), format!("0.0.0.0:{port1}")).unwrap(),
    );
    let node2 = quiet_node(
        11,
        UdpBroadcast::new(format!("127.255.255.255:{port1}"), format!("0.0.0.0:{port2}")).unwrap(),
    );
    exchange_test(node1, node2);
}

struct PipeReader(mpsc::Receiver<Vec<u8>>, Vec<u8>);

impl std::io::Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.1.is_empty() {
            let mut chunk = self.0.recv().map_err(|err| {
                std::io::Error::new(std::io::ErrorKind::ConnectionAborted, err)
            })?;
            self.1.append(&mut chunk);
        }
        let len = self.1.len().min(buf.len());
        buf[..len].copy_from_slice(&self.1[..len]);
        self.1.drain(..len);
        Ok(len)
    }
}

struct PipeWriter(mpsc::Sender<Vec<u8>>);

impl std::io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.send(buf.to_vec()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "pipe closed")
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn custom_loopback_exchange() {
    initialize();
    let (tx1, rx1) = mpsc::channel();
    let (tx2, rx2) = mpsc::channel();

    let node1 = quiet_node(
        10,
        Custom::new("loopback-1", PipeReader(rx1, Vec::new()), PipeWriter(tx2)),
    );
    let node2 = quiet_node(
        11,
        Custom::new("loopback-2", PipeReader(rx2, Vec::new()), PipeWriter(tx1)),
    );
    exchange_test(node1, node2);
}

#[test]
fn duplicate_endpoints_are_rejected() {
    initialize();
    let port = unused_port();
    let result = Node::builder()
        .version(V2)
        .system_id(11)
        .dialect(test_dialect())
        .no_heartbeat()
        .endpoint(UdpServer::new(make_addr(port)).unwrap())
        .endpoint(UdpServer::new(make_addr(port)).unwrap())
        .build();
    assert!(matches!(
        result.unwrap_err(),
        Error::Node(NodeError::DuplicateEndpoint(_))
    ));
}

#[test]
fn invalid_configurations_are_rejected() {
    initialize();
    let port = unused_port();

    let no_endpoints = Node::builder().version(V2).system_id(1).no_heartbeat().build();
    assert!(matches!(
        no_endpoints.unwrap_err(),
        Error::Node(NodeError::NoEndpoints)
    ));

    let no_system_id = Node::builder()
        .version(V2)
        .no_heartbeat()
        .endpoint(UdpServer::new(make_addr(port)).unwrap())
        .build();
    assert!(matches!(
        no_system_id.unwrap_err(),
        Error::Node(NodeError::InvalidSystemId(0))
    ));

    // Heartbeats are on by default and need the dialect to define them.
    let no_heartbeat_schema = Node::builder()
        .version(V2)
        .system_id(1)
        .endpoint(UdpServer::new(make_addr(port)).unwrap())
        .build();
    assert!(matches!(
        no_heartbeat_schema.unwrap_err(),
        Error::Node(NodeError::HeartbeatUnsupported)
    ));
}

#[test]
fn frames_are_relayed_with_identity_preserved() {
    initialize();
    let port_a = unused_port();
    let port_b = unused_port();

    let node2 = Node::builder()
        .version(V2)
        .system_id(11)
        .dialect(test_dialect())
        .no_heartbeat()
        .endpoint(UdpServer::new(make_addr(port_a)).unwrap())
        .endpoint(UdpClient::new(make_addr(port_b)).unwrap())
        .build()
        .unwrap();
    let node3 = quiet_node(12, UdpServer::new(make_addr(port_b)).unwrap());
    let node1 = quiet_node(10, UdpClient::new(make_addr(port_a)).unwrap());

    wait();
    node1.write_message_all(&heartbeat([7, 5, 4, 2, 1], 3));

    let relay = thread::spawn(move || {
        for event in node2.events() {
            if let Event::Frame { channel, frame, .. } = event {
                node2.write_frame_except(channel.id(), &frame);
                // Keep the node alive until the relayed frame is out.
                wait();
                return;
            }
        }
        panic!("relay saw no frame");
    });

    let observer = thread::spawn(move || {
        for event in node3.events() {
            if let Event::Frame { frame, message, .. } = event {
                assert_eq!(frame.system_id(), 10);
                assert_eq!(frame.component_id(), 1);
                let message = message.expect("relayed heartbeat must decode");
                assert_eq!(message.id(), 0);
                assert_eq!(message.get_unsigned("type"), Some(7));
                return;
            }
        }
        panic!("observer saw no frame");
    });

    relay.join().unwrap();
    observer.join().unwrap();
    drop(node1);
}

#[test]
fn automatic_heartbeats_are_emitted() {
    initialize();
    let port = unused_port();
    let node1 = quiet_node(10, UdpServer::new(make_addr(port)).unwrap());

    let node2 = Node::builder()
        .version(V2)
        .system_id(11)
        .dialect(test_dialect())
        .heartbeat_interval(Duration::from_millis(300))
        .endpoint(UdpClient::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    for event in node1.events() {
        if let Event::Frame { frame, message, .. } = event {
            let message = message.expect("heartbeat must decode");
            assert_eq!(message.id(), 0);
            assert_eq!(frame.system_id(), 11);
            // Defaults: GCS system type, generic autopilot, active state,
            // dialect version.
            assert_eq!(message.get_unsigned("type"), Some(6));
            assert_eq!(message.get_unsigned("autopilot"), Some(0));
            assert_eq!(message.get_unsigned("system_status"), Some(4));
            assert_eq!(message.get_unsigned("mavlink_version"), Some(3));
            break;
        }
    }
    drop(node2);
}

#[test]
fn ardupilot_heartbeats_trigger_stream_requests() {
    initialize();
    let port = unused_port();

    let node1 = Node::builder()
        .version(V2)
        .system_id(10)
        .dialect(test_dialect())
        .no_heartbeat()
        .stream_requests()
        .endpoint(UdpServer::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    let node2 = Node::builder()
        .version(V2)
        .system_id(11)
        .dialect(test_dialect())
        .heartbeat_interval(Duration::from_millis(300))
        .heartbeat_autopilot_type(3) // MAV_AUTOPILOT_ARDUPILOTMEGA
        .endpoint(UdpClient::new(make_addr(port)).unwrap())
        .build()
        .unwrap();

    let requester = thread::spawn(move || {
        for event in node1.events() {
            if let Event::StreamRequested {
                system_id,
                component_id,
                ..
            } = event
            {
                assert_eq!(system_id, 11);
                assert_eq!(component_id, 1);
                // Let the request reach the wire before the node closes.
                wait();
                return;
            }
        }
        panic!("no stream request issued");
    });

    for event in node2.events() {
        if let Event::Frame { message: Some(message), .. } = event {
            if message.id() == 66 {
                assert_eq!(message.get_unsigned("target_system"), Some(11));
                assert_eq!(message.get_unsigned("req_message_rate"), Some(4));
                assert_eq!(message.get_unsigned("start_stop"), Some(1));
                break;
            }
        }
    }

    requester.join().unwrap();
}

#[test]
fn close_terminates_event_iteration() {
    initialize();
    let port = unused_port();
    let node1 = quiet_node(11, UdpServer::new(make_addr(port)).unwrap());
    let node2 = quiet_node(12, UdpClient::new(make_addr(port)).unwrap());

    let writer = thread::spawn(move || {
        wait();
        node2.write_message_all(&heartbeat([1, 2, 3, 4, 5], 6));
        node2
    });

    let mut closed_at = None;
    for event in node1.events() {
        if let Event::ChannelOpen { .. } = event {
            node1.close();
            closed_at = Some(Instant::now());
        }
    }

    let closed_at = closed_at.expect("no channel open observed");
    assert!(closed_at.elapsed() < Duration::from_secs(2));
    assert!(node1.is_closed());

    // Writes after close are no-ops.
    node1.write_message_all(&heartbeat([1, 2, 3, 4, 5], 6));

    let node2 = writer.join().unwrap();
    node2.close();
}

#[test]
fn burst_writes_inside_event_loop() {
    initialize();
    let port = unused_port();
    let node1 = quiet_node(11, UdpServer::new(make_addr(port)).unwrap());
    let node2 = quiet_node(12, UdpClient::new(make_addr(port)).unwrap());

    let writer = thread::spawn(move || {
        wait();
        node2.write_message_all(&heartbeat([1, 2, 3, 4, 5], 6));
        node2
    });

    for event in node1.events() {
        if let Event::ChannelOpen { .. } = event {
            for _ in 0..100 {
                node1.write_message_all(&heartbeat([1, 2, 3, 4, 5], 6));
            }
            node1.close();
        }
    }

    writer.join().unwrap().close();
}

#[test]
fn per_channel_sequence_numbers() {
    initialize();
    let port = unused_port();
    let server = quiet_node(10, TcpServer::new(make_addr(port)).unwrap());
    let client_a = quiet_node(11, TcpClient::new(make_addr(port)).unwrap());
    let client_b = quiet_node(12, TcpClient::new(make_addr(port)).unwrap());

    wait();
    server.write_message_all(&heartbeat([1, 0, 0, 0, 0], 0));
    server.write_message_all(&heartbeat([2, 0, 0, 0, 0], 0));

    for client in [client_a, client_b] {
        let mut sequences = Vec::new();
        for event in client.events() {
            if let Event::Frame { frame, .. } = event {
                assert_eq!(frame.system_id(), 10);
                sequences.push(frame.sequence());
                if sequences.len() == 2 {
                    break;
                }
            }
        }
        // Every channel numbers its own writes from zero.
        assert_eq!(sequences, vec![0, 1]);
    }
    server.close();
}
