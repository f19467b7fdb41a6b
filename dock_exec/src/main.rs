//! Main docking executable entry point.
//!
//! # Architecture
//!
//! Three tasks run concurrently:
//!
//!     - The control loop (this thread), paced by the camera:
//!         - Read the next fiducial frame (the only blocking point)
//!         - Take the latest dispatch command, if any, and hand it to the docking manager
//!         - Step the docking manager, which reads the latest sensor reading and commands the
//!           drivetrain and latch
//!     - The command channel thread, exchanging messages with dispatch
//!     - The sensor gateway thread, receiving the module's telemetry
//!
//! The tasks only share the command and sensor mailboxes and the outbound message queue.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::Arc;
use color_eyre::{Report, eyre::WrapErr};
use log::{debug, info, trace, warn};

// Internal
use comms_if::net::zmq;
use dock_lib::{
    align_ctrl::AlignCtrlParams,
    cmd_channel::CmdChannel,
    dock_mgr::{DockMgr, DockMgrParams},
    eqpt::{self, ActuatorDriver, LatchCtrl},
    mailbox::Mailbox,
    obs_client::{ObsClient, ObsClientError},
    params::DockExecParams,
    sensor_gateway::SensorGateway,
    video::VideoSettings
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "dock_exec", 
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Docking Controller Executable\n");
    info!(
        "Running on: {:#?}", 
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}", session.session_root);
    info!("Video directory: {:?}\n", session.video_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: DockExecParams = util::params::load("dock_exec.toml")
        .wrap_err("Could not load exec params")?;
    let align_params: AlignCtrlParams = util::params::load("align_ctrl.toml")
        .wrap_err("Could not load AlignCtrl params")?;
    let dock_params: DockMgrParams = util::params::load("dock_mgr.toml")
        .wrap_err("Could not load DockMgr params")?;

    info!("Parameters loaded");

    // ---- INITIALISE EQUIPMENT ----

    let (drive_hw, latch_hw) = eqpt::open_backend(&exec_params.eqpt)
        .wrap_err("Failed to open the equipment back-end")?;
    info!("Equipment back-end {:?} opened", exec_params.eqpt);

    let (outbound_tx, outbound_rx) = crossbeam::channel::bounded(
        exec_params.outbound_queue_depth
    );

    let mut dock_mgr = DockMgr::new(
        dock_params,
        align_params,
        VideoSettings {
            root: session.video_root.clone(),
            jpeg_quality: exec_params.video_jpeg_quality
        },
        ActuatorDriver::new(drive_hw, exec_params.actuator.clone()),
        LatchCtrl::new(latch_hw, exec_params.latch.clone()),
        outbound_tx
    );

    // Start from a known safe state
    dock_mgr.stop();

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = zmq::Context::new();

    let commands = Arc::new(Mailbox::new());

    let _cmd_channel = CmdChannel::start(
        &zmq_ctx, 
        &exec_params, 
        commands.clone(), 
        outbound_rx
    ).wrap_err("Failed to start the CmdChannel")?;
    info!("CmdChannel started");

    let mut sensors = SensorGateway::start(&exec_params.sensor_listen_addr)
        .wrap_err("Failed to start the SensorGateway")?;
    info!("SensorGateway started");

    let obs_client = ObsClient::new(&zmq_ctx, &exec_params)
        .wrap_err("Failed to initialise the ObsClient")?;
    info!("ObsClient initialised");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut num_cycles: u64 = 0;

    loop {
        // ---- FRAME ACQUISITION ----

        let frame = obs_client.next_frame();

        // ---- COMMAND HANDLING ----

        if let Some(cmd) = commands.take() {
            dock_mgr.handle_cmd(cmd, &mut sensors);
        }

        // ---- DOCKING ----

        match frame {
            Ok(frame) => {
                let report = dock_mgr.step(&frame, &mut sensors);
                trace!("DockMgr: {:?}", report);
            },
            Err(ObsClientError::FrameTimeout) => {
                debug!("Frame timeout");
                dock_mgr.frame_read_failed(&mut sensors);
            },
            Err(e) => {
                warn!("Could not read frame: {}", e);
                dock_mgr.frame_read_failed(&mut sensors);
            }
        }

        num_cycles += 1;
        if num_cycles % 1000 == 0 {
            debug!(
                "{} cycles, feed connected: {}, sensors connected: {}", 
                num_cycles, 
                obs_client.is_connected(), 
                sensors.connected()
            );
        }
    }
}
