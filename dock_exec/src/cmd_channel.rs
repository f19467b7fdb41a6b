//! # Command Channel
//!
//! Persistent connection to dispatch. Runs in its own thread, publishing received commands into
//! a single-slot mailbox and uploading queued session outcomes. Connection loss is handled by
//! zmq's reconnection (with backoff), and the channel announces itself on every (re)connection.
//!
//! Outcomes are queued with a reference to their recording. Reading and encoding the recording
//! happens here, off the control loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, atomic::{AtomicBool, Ordering}}, 
    thread
};
use crossbeam::channel::{Receiver, TryRecvError};
use log::{debug, info, warn};

use comms_if::{
    dispatch::{ArtifactPayload, Direction, DispatchCmd, Outcome, ServiceMsg, SessionId},
    net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions}
};

use crate::{mailbox::Mailbox, params::DockExecParams, video::VideoArtifact};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive timeout of the dispatch socket, bounds the latency of outbound messages.
const RECV_TIMEOUT_MS: i32 = 50;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to the running command channel thread.
pub struct CmdChannel {
    shutdown: Arc<AtomicBool>,

    join_handle: Option<thread::JoinHandle<()>>,
}

/// The outcome of a completed session, queued for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeReport {
    pub direction: Direction,

    pub session_id: SessionId,

    pub outcome: Outcome,

    pub reason_code: Option<String>,

    /// The session's recording, if one was made
    pub video: Option<VideoArtifact>,
}

/// Thread-side state of the channel.
struct Worker {
    socket: MonitoredSocket,

    commands: Arc<Mailbox<DispatchCmd>>,

    outbound: Receiver<OutcomeReport>,

    /// Serialised message waiting for the transport to accept it
    pending: Option<String>,

    /// Connection count at the last announcement
    announced_count: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CmdChannelError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not start the command channel thread: {0}")]
    ThreadError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdChannel {
    /// Start the channel.
    ///
    /// This function will not block until dispatch is reachable.
    pub fn start(
        ctx: &zmq::Context, 
        params: &DockExecParams, 
        commands: Arc<Mailbox<DispatchCmd>>,
        outbound: Receiver<OutcomeReport>
    ) -> Result<Self, CmdChannelError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            identity: Some(params.client_id.clone()),
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            reconnect_ivl: params.reconnect_ivl_ms,
            reconnect_ivl_max: params.reconnect_ivl_max_ms,
            recv_timeout: RECV_TIMEOUT_MS,
            send_timeout: 0,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx, 
            zmq::DEALER, 
            socket_options, 
            &params.dispatch_endpoint
        ).map_err(CmdChannelError::SocketError)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let mut worker = Worker {
            socket,
            commands,
            outbound,
            pending: None,
            announced_count: 0
        };

        let join_handle = thread::Builder::new()
            .name("cmd_channel".into())
            .spawn(move || {
                while !shutdown_clone.load(Ordering::Relaxed) {
                    worker.cycle();
                }
            })
            .map_err(CmdChannelError::ThreadError)?;

        info!("Command channel started for {}", params.dispatch_endpoint);

        Ok(Self {
            shutdown,
            join_handle: Some(join_handle)
        })
    }
}

impl Drop for CmdChannel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(jh) = self.join_handle.take() {
            jh.join().ok();
        }
    }
}

impl OutcomeReport {
    /// Build the artifact message for dispatch.
    ///
    /// The recording is read and base64 encoded. If it cannot be read the outcome is still
    /// reported, without video.
    pub fn to_service_msg(&self) -> Result<ServiceMsg, serde_json::Error> {
        let video = self.video.as_ref().and_then(|a| match a.to_base64() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Could not read video artifact {:?}: {}", a.path, e);
                None
            }
        });

        let payload = ArtifactPayload {
            session_id: self.session_id.clone(),
            video,
            outcome: self.outcome,
            reason_code: self.reason_code.clone()
        };

        ServiceMsg::artifact(self.direction, &payload)
    }
}

impl Worker {
    /// One pass of the channel: announce if reconnected, receive one command, send outbound.
    fn cycle(&mut self) {
        self.announce_if_reconnected();
        self.recv_command();
        self.send_outbound();
    }

    fn announce_if_reconnected(&mut self) {
        let count = self.socket.connect_count();
        if count == self.announced_count {
            return
        }

        info!("Connected to dispatch (connection {}), announcing", count);

        match ServiceMsg::connect().to_json() {
            Ok(s) => match self.socket.send(&s, zmq::DONTWAIT) {
                Ok(_) => self.announced_count = count,
                Err(e) => debug!("Announcement not sent yet: {}", e)
            },
            Err(e) => {
                warn!("Could not serialise the announcement: {}", e);
                self.announced_count = count;
            }
        }
    }

    /// Block for up to the receive timeout for a command.
    fn recv_command(&mut self) {
        let msg = match self.socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                warn!("Dispatch sent a message which was not valid UTF-8, ignoring");
                return
            },
            Err(zmq::Error::EAGAIN) => return,
            Err(e) => {
                warn!("Could not receive from dispatch: {}", e);
                return
            }
        };

        match DispatchCmd::from_json(&msg) {
            Ok(cmd) => {
                info!("Received command from dispatch: {:?}", cmd);
                if let Some(old) = self.commands.publish(cmd) {
                    warn!("Unhandled command replaced by a newer one: {:?}", old);
                }
            },
            Err(e) => warn!("Ignoring unrecognised dispatch message: {}", e)
        }
    }

    /// Send queued outcomes, keeping the first message the transport refuses.
    fn send_outbound(&mut self) {
        loop {
            let msg = match self.pending.take() {
                Some(m) => m,
                None => match self.outbound.try_recv() {
                    Ok(report) => match report.to_service_msg().and_then(|m| m.to_json()) {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(
                                "Could not serialise the outcome of session {}: {}", 
                                report.session_id, e
                            );
                            continue
                        }
                    },
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return
                }
            };

            match self.socket.send(&msg, zmq::DONTWAIT) {
                Ok(_) => debug!("Sent {} bytes to dispatch", msg.len()),
                Err(e) => {
                    debug!("Dispatch not accepting messages ({}), will retry", e);
                    self.pending = Some(msg);
                    return
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
