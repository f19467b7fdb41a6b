//! # Sensor Gateway
//!
//! Receives the newline-delimited telemetry stream of the module's sensor controller. The
//! controller connects to the gateway over TCP; a background thread decodes each line into a
//! [`SensorReading`] and publishes it into a single-slot mailbox, so that the control loop only
//! ever sees the newest reading.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    io::{self, BufRead, BufReader}, 
    net::{SocketAddr, TcpListener, TcpStream}, 
    sync::{Arc, atomic::{AtomicBool, Ordering}}, 
    thread, 
    time::Duration
};
use log::{debug, info, warn};

use comms_if::eqpt::sensor::SensorReading;

use crate::mailbox::Mailbox;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period at which the gateway thread checks for shutdown while waiting on the network.
const POLL_PERIOD: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Source of sensor readings for the docking manager.
pub trait SensorSource {
    /// Take the newest reading not yet seen, without blocking.
    ///
    /// Returns `None` if no new reading arrived or the sensor controller is disconnected.
    fn latest(&mut self) -> Option<SensorReading>;

    /// Discard any reading received so far.
    fn drain(&mut self);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// TCP sensor gateway.
pub struct SensorGateway {
    latest: Arc<Mailbox<SensorReading>>,

    connected: Arc<AtomicBool>,

    shutdown: Arc<AtomicBool>,

    local_addr: SocketAddr,

    join_handle: Option<thread::JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SensorGatewayError {
    #[error("Could not listen on {0}: {1}")]
    BindError(String, io::Error),

    #[error("Could not configure the listening socket: {0}")]
    SocketError(io::Error),

    #[error("Could not start the gateway thread: {0}")]
    ThreadError(io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SensorGateway {
    /// Start listening for the sensor controller on the given address.
    pub fn start(listen_addr: &str) -> Result<Self, SensorGatewayError> {
        let listener = TcpListener::bind(listen_addr)
            .map_err(|e| SensorGatewayError::BindError(listen_addr.into(), e))?;
        listener.set_nonblocking(true)
            .map_err(SensorGatewayError::SocketError)?;
        let local_addr = listener.local_addr()
            .map_err(SensorGatewayError::SocketError)?;

        let latest = Arc::new(Mailbox::new());
        let connected = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let latest_clone = latest.clone();
        let connected_clone = connected.clone();
        let shutdown_clone = shutdown.clone();

        let join_handle = thread::Builder::new()
            .name("sensor_gateway".into())
            .spawn(move || gateway_thread(
                listener, 
                latest_clone, 
                connected_clone, 
                shutdown_clone
            ))
            .map_err(SensorGatewayError::ThreadError)?;

        info!("Sensor gateway listening on {}", local_addr);

        Ok(Self {
            latest,
            connected,
            shutdown,
            local_addr,
            join_handle: Some(join_handle)
        })
    }

    /// The address the gateway is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns true while a sensor controller is connected
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl SensorSource for SensorGateway {
    fn latest(&mut self) -> Option<SensorReading> {
        if !self.connected() {
            return None
        }

        self.latest.take()
    }

    fn drain(&mut self) {
        self.latest.clear();
    }
}

impl Drop for SensorGateway {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(jh) = self.join_handle.take() {
            jh.join().ok();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn gateway_thread(
    listener: TcpListener, 
    latest: Arc<Mailbox<SensorReading>>, 
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!("Sensor controller connected from {}", peer);
                connected.store(true, Ordering::Relaxed);

                if let Err(e) = read_stream(stream, &latest, &shutdown) {
                    warn!("Sensor stream error: {}", e);
                }

                // Readings are absent, never stale, while disconnected
                connected.store(false, Ordering::Relaxed);
                latest.clear();
                info!("Sensor controller disconnected");
            },
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_PERIOD),
            Err(e) => {
                warn!("Could not accept sensor connection: {}", e);
                thread::sleep(POLL_PERIOD);
            }
        }
    }
}

/// Read lines from the stream until it closes or shutdown is requested.
fn read_stream(
    stream: TcpStream, 
    latest: &Mailbox<SensorReading>, 
    shutdown: &AtomicBool
) -> io::Result<()> {
    // Accepted streams may inherit the listener's non-blocking mode
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(POLL_PERIOD))?;

    let mut reader = BufReader::new(stream);
    let mut line = Vec::<u8>::new();

    while !shutdown.load(Ordering::Relaxed) {
        // Bytes read before a timeout stay in `line` and the next read continues the same line
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    handle_line(&String::from_utf8_lossy(&line), latest);
                    line.clear();
                }
            },
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock 
                || e.kind() == io::ErrorKind::TimedOut => (),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
            Err(e) => return Err(e)
        }
    }

    Ok(())
}

fn handle_line(line: &str, latest: &Mailbox<SensorReading>) {
    match SensorReading::from_line(line) {
        Ok(Some(reading)) => {
            debug!("Sensor reading: {:?}", reading);
            latest.publish(reading);
        },
        Ok(None) => (),
        Err(e) => warn!("Dropping malformed telemetry line {:?}: {}", line.trim_end(), e)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
