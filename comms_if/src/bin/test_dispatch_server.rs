//! Simple dispatch server test
//!
//! Binds the dispatch endpoint, prints announcements and artifacts from connected vehicles and
//! forwards commands typed on stdin to the most recently seen vehicle:
//!
//! ```text
//! rent <session_id> [marker_id]
//! return <session_id> [marker_id]
//! cancel [session_id]
//! ```

use std::sync::mpsc;
use comms_if::{
    dispatch::{ServiceMsg, PATH_RENT, PATH_RETURN, PATH_CANCEL},
    net::{MonitoredSocket, SocketOptions}
};
use serde_json::{json, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create the context for zmq
    let ctx = zmq::Context::new();

    // Set the socket options, a short receive timeout lets us poll stdin between messages
    let socket_options = SocketOptions {
        bind: true,
        block_on_first_connect: false,
        recv_timeout: 100,
        ..Default::default()
    };

    // Create the socket
    let socket = MonitoredSocket::new(
        &ctx,
        zmq::ROUTER,
        socket_options,
        "tcp://*:5020"
    )?;

    println!("Dispatch server running on port 5020");

    // Read commands from stdin on another thread so the socket keeps being serviced
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        while stdin.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
            if tx.send(line.trim().to_string()).is_err() {
                break
            }
            line.clear();
        }
    });

    let mut vehicle: Option<Vec<u8>> = None;

    loop {
        // Print anything the vehicle sent
        match socket.recv_multipart(0) {
            Ok(parts) if parts.len() >= 2 => {
                let body = String::from_utf8_lossy(&parts[parts.len() - 1]).to_string();
                println!(
                    "[{}] {}", 
                    String::from_utf8_lossy(&parts[0]), 
                    summarise(&body)
                );
                vehicle = Some(parts[0].clone());
            },
            Ok(_) => println!("Received a malformed message"),
            Err(zmq::Error::EAGAIN) => (),
            Err(e) => println!("Could not receive: {}", e)
        }

        // Forward any typed command
        while let Ok(line) = rx.try_recv() {
            let msg = match parse_command(&line) {
                Some(m) => m,
                None => {
                    println!("Unrecognised command \"{}\"", line);
                    continue
                }
            };

            let identity = match vehicle {
                Some(ref i) => i.clone(),
                None => {
                    println!("No vehicle has connected yet");
                    continue
                }
            };

            let body = msg.to_json()?;
            match socket.send_multipart(vec![identity, body.clone().into_bytes()], 0) {
                Ok(_) => println!("Sent {}", body),
                Err(e) => println!("Could not send command: {}", e)
            }
        }
    }
}

/// Build a command message from a line typed on stdin.
fn parse_command(line: &str) -> Option<ServiceMsg> {
    let words: Vec<&str> = line.split_whitespace().collect();

    let path = match words.first() {
        Some(&"rent") => PATH_RENT,
        Some(&"return") => PATH_RETURN,
        Some(&"cancel") => PATH_CANCEL,
        _ => return None
    };

    let mut payload = serde_json::Map::new();
    if let Some(id) = words.get(1) {
        payload.insert("sessionId".into(), id_value(id));
    }
    if let Some(marker) = words.get(2) {
        payload.insert("targetMarkerId".into(), json!(marker.parse::<u32>().ok()?));
    }

    Some(ServiceMsg::new(path, Value::Object(payload)))
}

/// Numeric ids are sent as numbers, anything else as a string.
fn id_value(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id)
    }
}

/// Shorten artifact messages so the video data doesn't flood the terminal.
fn summarise(body: &str) -> String {
    let msg: ServiceMsg = match serde_json::from_str(body) {
        Ok(m) => m,
        Err(_) => return format!("unparsable message: {}", body)
    };

    match msg.payload.get("video") {
        Some(Value::String(v)) => format!(
            "{} session={} outcome={} reason={} video={} bytes (base64)",
            msg.path,
            msg.payload["sessionId"],
            msg.payload["outcome"],
            msg.payload.get("reasonCode").unwrap_or(&Value::Null),
            v.len()
        ),
        _ => format!("{} {}", msg.path, msg.payload)
    }
}
