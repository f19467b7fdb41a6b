//! Simple sensor controller test
//!
//! Connects to the vehicle's sensor gateway and streams a closing proximity distance, followed
//! by a dock tag read once the vehicle is in contact. The sequence then repeats.

use std::io::Write;
use std::net::TcpStream;
use comms_if::eqpt::sensor::SensorReading;

/// Tag of the first docking fixture
const DOCK_TAG: &str = "043F926A6C1D90";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args().nth(1).unwrap_or_else(|| "localhost:5040".into());

    let mut stream = TcpStream::connect(&addr)?;
    println!("Connected to sensor gateway at {}", addr);

    loop {
        let mut distance = 50.0;

        while distance > 4.0 {
            let reading = SensorReading {
                proximity_distance_cm: Some(distance),
                dock_tag_id: None
            };
            send(&mut stream, &reading)?;
            distance -= 2.0;
            std::thread::sleep(std::time::Duration::from_millis(200));
        }

        // In contact, the tag reader now sees the dock
        for _ in 0..10 {
            let reading = SensorReading {
                proximity_distance_cm: Some(distance),
                dock_tag_id: Some(DOCK_TAG.into())
            };
            send(&mut stream, &reading)?;
            std::thread::sleep(std::time::Duration::from_millis(200));
        }

        // Keepalive gap before the next run
        stream.write_all(b"\n")?;
        std::thread::sleep(std::time::Duration::from_millis(2000));
    }
}

fn send(stream: &mut TcpStream, reading: &SensorReading) -> Result<(), Box<dyn std::error::Error>> {
    let line = serde_json::to_string(reading)?;
    println!("Sending {}", line);
    stream.write_all(line.as_bytes())?;
    stream.write_all(b"\n")?;
    Ok(())
}
