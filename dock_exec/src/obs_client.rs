//! # Fiducial Observation Client
//!
//! Subscribes to the fiducial observation feed. Reading the next frame is the only point at
//! which the control loop blocks.
//!
//! Only the newest frame is queued. A cycle which overruns the camera period therefore skips the
//! frames it missed rather than working through a backlog of stale ones.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::fiducial::{FiducialFrame, FRAME_TOPIC},
    net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions}
};

use crate::params::DockExecParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The observation feed client
pub struct ObsClient {
    socket: MonitoredSocket
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ObsClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("No frame received within the frame timeout")]
    FrameTimeout,

    #[error("Could not recieve a frame from the feed: {0}")]
    RecvError(zmq::Error),

    #[error("The feed sent a frame which was not valid UTF-8")]
    NonUtf8Frame,

    #[error("Could not deserialize the frame: {0}")]
    DeserializeError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ObsClient {
    /// Create a new instance of the observation client.
    ///
    /// This function will not block until the feed connects.
    pub fn new(ctx: &zmq::Context, params: &DockExecParams) -> Result<Self, ObsClientError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            subscribe: Some(FRAME_TOPIC.into()),
            conflate: true,
            connect_timeout: 1000,
            linger: 1,
            recv_timeout: params.frame_timeout_ms,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx, 
            zmq::SUB, 
            socket_options, 
            &params.fiducial_endpoint
        ).map_err(ObsClientError::SocketError)?;

        Ok(Self {
            socket
        })
    }

    /// Check if the client is connected to the feed
    pub fn is_connected(&self) -> bool {
        self.socket.connected()
    }

    /// Block until the next frame arrives or the frame timeout expires.
    pub fn next_frame(&self) -> Result<FiducialFrame, ObsClientError> {
        let msg = match self.socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => return Err(ObsClientError::NonUtf8Frame),
            Err(zmq::Error::EAGAIN) => return Err(ObsClientError::FrameTimeout),
            Err(e) => return Err(ObsClientError::RecvError(e))
        };

        FiducialFrame::from_message(&msg)
            .map_err(ObsClientError::DeserializeError)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
