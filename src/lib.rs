/*! # Mavnode
A [MAVLink](https://mavlink.io/en/) networking library written in Rust.

Mavnode multiplexes heterogeneous byte-stream transports ("endpoints"),
parses and emits MAVLink 1 / MAVLink 2 frames over each of them, routes
frames between them, and exposes a single event-driven stream of decoded
messages to the application. It implements the _stateful_ features of the
protocol: sequencing, message signing, automatic heartbeats, and stream
requests.

Dialects are plain data: the application registers message schemas at
runtime, and the library derives wire layout and CRC-extra bytes from them.
No code generation is required.

# Usage

A TCP server node that relays every heartbeat it receives to all other
connected peers:

```rust,no_run
use mavnode::prelude::*;

fn main() -> mavnode::error::Result<()> {
    let dialect = Dialect::new(
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
        )?],
    )?;

    let node = Node::builder()
        .version(V2)
        .system_id(17)
        .dialect(dialect)
        .endpoint(TcpServer::new("127.0.0.1:5600")?)
        .build()?;

    for event in node.events() {
        if let Event::Frame { channel, frame, .. } = event {
            node.write_frame_except(channel.id(), &frame);
        }
    }
    Ok(())
}
```

# Transports

The following endpoint kinds are available: [`TcpServer`](io::transport::TcpServer),
[`TcpClient`](io::transport::TcpClient), [`UdpServer`](io::transport::UdpServer),
[`UdpClient`](io::transport::UdpClient), [`UdpBroadcast`](io::transport::UdpBroadcast),
[`Serial`](io::transport::Serial), and [`Custom`](io::transport::Custom) for
application-provided byte streams. Each endpoint produces a dynamic set of
[channels](io::ChannelInfo); a node may own any number of endpoints.

# Message signing

`MAVLink 2` frames can be signed and verified with independent 32-byte
in/out keys. Signature timestamps are process-wide monotonic, and a replay
guard rejects stale timestamps per remote link.
*/
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod consts;
pub mod error;
pub mod io;
pub mod node;
pub mod prelude;
pub mod protocol;

pub(crate) mod utils;
