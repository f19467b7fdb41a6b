//! Docking manager state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use crossbeam::channel::{Sender, TrySendError};
use log::{debug, error, info, warn};
use serde::Serialize;

// Internal
use super::*;
use crate::{
    align_ctrl::{self, AlignCtrl, AlignCtrlParams, AlignmentMetrics, MarkerObservation},
    cmd_channel::OutcomeReport,
    eqpt::{ActuatorDriver, ControlCommand, DriveHw, LatchCtrl, LatchHw, LatchState},
    sensor_gateway::SensorSource,
    video::{VideoArtifact, VideoCapture, VideoSettings}
};
use comms_if::{
    dispatch::{Direction, DispatchCmd, Outcome, TargetRef},
    eqpt::fiducial::FiducialFrame
};
use util::{module::State, time::timestamp_to_seconds};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The docking manager.
///
/// Exclusively owns the drivetrain and the latch. Only the active session may command them.
pub struct DockMgr<D: DriveHw, L: LatchHw> {
    params: DockMgrParams,

    /// Parameters for the alignment controller of each new session
    align_params: AlignCtrlParams,

    video: VideoSettings,

    drive: ActuatorDriver<D>,

    latch: LatchCtrl<L>,

    /// Queue of session outcomes for dispatch
    outbound: Sender<OutcomeReport>,

    active: Option<ActiveSession>,

    /// Record of the most recently completed session
    last_session: Option<DockingSession>,
}

/// Status of the manager after a step
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusReport {
    pub state: DockState,

    /// The command the drivetrain holds after the step
    pub cmd: ControlCommand,

    /// Alignment metrics, if the target marker was visible in an approach state
    pub metrics: Option<AlignmentMetrics>,
}

/// Runtime data of the active session
struct ActiveSession {
    record: DockingSession,

    /// The session's own alignment controller, so no history leaks between sessions
    align: AlignCtrl,

    capture: Option<VideoCapture>,

    /// A recording whose capture could not be sealed, reported with the failure
    unsealed_video: Option<VideoArtifact>,

    /// Frame time of entry into the current state, set by the first frame seen in the state if
    /// the state was entered without one
    state_entered_s: Option<f64>,

    /// Latched on the first close proximity reading while reversing
    proximity_sticky: bool,

    /// Set once this session energized the latch
    latch_energized: bool,

    docked_phase: DockedPhase,
}

/// Sub-steps of the docked state
#[derive(Debug, Clone, Copy, PartialEq)]
enum DockedPhase {
    /// Creeping forward onto the latch, since the given time
    Creep(f64),

    /// Stopped, since the given time
    Hold(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<D: DriveHw, L: LatchHw> DockMgr<D, L> {
    /// Create a new manager in the idle state.
    pub fn new(
        params: DockMgrParams,
        align_params: AlignCtrlParams,
        video: VideoSettings,
        drive: ActuatorDriver<D>,
        latch: LatchCtrl<L>,
        outbound: Sender<OutcomeReport>
    ) -> Self {
        Self {
            params,
            align_params,
            video,
            drive,
            latch,
            outbound,
            active: None,
            last_session: None
        }
    }

    /// Current state, `Idle` if no session is active.
    pub fn state(&self) -> DockState {
        match self.active {
            Some(ref s) => s.record.state,
            None => DockState::Idle
        }
    }

    /// Record of the active session
    pub fn active_session(&self) -> Option<&DockingSession> {
        self.active.as_ref().map(|s| &s.record)
    }

    /// Record of the most recently completed session
    pub fn last_session(&self) -> Option<&DockingSession> {
        self.last_session.as_ref()
    }

    /// The command the drivetrain currently holds
    pub fn last_cmd(&self) -> ControlCommand {
        self.drive.last_cmd()
    }

    pub fn latch_state(&self) -> Option<LatchState> {
        self.latch.state()
    }

    /// Stop the drivetrain. Used on shutdown.
    pub fn stop(&mut self) {
        self.drive.stop();
    }

    /// Swap the active session's capture for another, such as one with a failing sink.
    #[cfg(test)]
    pub(crate) fn replace_capture(&mut self, capture: VideoCapture) {
        if let Some(ref mut s) = self.active {
            s.capture = Some(capture);
        }
    }

    /// Handle a command from dispatch.
    ///
    /// A begin command is rejected while a session is active. A cancel fails the active session
    /// unless it names a different session.
    pub fn handle_cmd<S: SensorSource>(&mut self, cmd: DispatchCmd, sensors: &mut S) {
        match cmd {
            DispatchCmd::Begin { direction, session_id, target } => {
                if let Some(ref s) = self.active {
                    warn!(
                        "Rejecting {} session {}: session {} is in progress ({:?})",
                        direction, session_id, s.record.session_id, s.record.state
                    );
                    return
                }

                let marker_id = match self.resolve_target(direction, &target) {
                    Some(m) => m,
                    None => {
                        warn!(
                            "Rejecting {} session {}: no target marker for {:?}",
                            direction, session_id, target
                        );
                        return
                    }
                };

                // Readings buffered from a previous target are meaningless now
                sensors.drain();

                info!(
                    "Starting {} session {} targeting marker {}",
                    direction, session_id, marker_id
                );

                let mut session = ActiveSession {
                    record: DockingSession::new(session_id, direction, marker_id),
                    align: AlignCtrl::new(self.align_params.clone()),
                    capture: None,
                    unsealed_video: None,
                    state_entered_s: None,
                    proximity_sticky: false,
                    latch_energized: false,
                    docked_phase: DockedPhase::Creep(0.0)
                };
                session.enter_searching(None);

                self.active = Some(session);
            },
            DispatchCmd::Cancel { session_id } => {
                let cancel = match (&self.active, &session_id) {
                    (None, _) => {
                        info!("Cancel received with no active session, ignoring");
                        false
                    },
                    (Some(s), Some(id)) if *id != s.record.session_id => {
                        warn!(
                            "Ignoring cancel for session {}, active session is {}",
                            id, s.record.session_id
                        );
                        false
                    },
                    (Some(_), _) => true
                };

                if cancel {
                    self.fail(FailReason::Cancelled, None, sensors);
                }
            }
        }
    }

    /// Process one camera frame.
    pub fn step<S: SensorSource>(
        &mut self,
        frame: &FiducialFrame,
        sensors: &mut S
    ) -> StatusReport {
        let time_s = timestamp_to_seconds(&frame.timestamp);
        let mut metrics = None;

        let state = match self.active {
            Some(ref mut s) => {
                if s.state_entered_s.is_none() {
                    s.state_entered_s = Some(time_s);
                }

                if let (Some(cap), Some(image)) = (s.capture.as_mut(), frame.image.as_ref()) {
                    if let Err(e) = cap.append(image) {
                        warn!("Could not record frame: {}", e);
                    }
                }

                s.record.state
            },
            None => DockState::Idle
        };

        let result = match state {
            DockState::Searching | DockState::Approaching => self
                .step_approach(frame, time_s)
                .map(|m| metrics = m),
            DockState::ReversingToDock => self.step_reverse(time_s, sensors),
            DockState::Docked => self.step_docked(time_s),
            _ => Ok(())
        };

        if let Err(reason) = result {
            self.fail(reason, Some(time_s), sensors);
        }

        StatusReport {
            state: self.state(),
            cmd: self.drive.last_cmd(),
            metrics
        }
    }

    /// Handle a failure to read the next camera frame.
    pub fn frame_read_failed<S: SensorSource>(&mut self, sensors: &mut S) {
        if self.active.is_some() {
            self.fail(FailReason::CameraReadFailure, None, sensors);
        }
    }

    /// Resolve the marker a begin command targets.
    fn resolve_target(&self, direction: Direction, target: &TargetRef) -> Option<u32> {
        match (target, direction) {
            (TargetRef::Marker(id), _) => Some(*id),
            (TargetRef::ModuleTag(tag), _) => self.params.fixtures.get(tag).copied(),
            (TargetRef::Unspecified, Direction::Return) => Some(self.params.return_marker_id),
            (TargetRef::Unspecified, Direction::Pickup) => None
        }
    }

    /// Searching and approaching: closed loop on the target marker until aligned.
    fn step_approach(
        &mut self,
        frame: &FiducialFrame,
        time_s: f64
    ) -> Result<Option<AlignmentMetrics>, FailReason> {
        let s = match self.active.as_mut() {
            Some(s) => s,
            None => return Ok(None)
        };

        let observation = find_target(frame, s.record.target_marker_id, time_s);
        let found = observation.is_some();

        let input = align_ctrl::InputData {
            observation,
            frame_width_px: frame.width_px as f64,
            time_s
        };

        let (cmd, report) = match s.align.proc(&input) {
            Ok(o) => o,
            Err(e) => {
                warn!("Alignment control error, stopping for this frame: {}", e);
                self.drive.stop();
                return Ok(None)
            }
        };

        match s.record.state {
            DockState::Searching if found => {
                info!("Target marker {} acquired", s.record.target_marker_id);
                s.enter(DockState::Approaching, Some(time_s));
            },
            DockState::Approaching if report.grace_expired => {
                info!("Target marker {} lost, searching", s.record.target_marker_id);
                s.enter_searching(Some(time_s));
            },
            _ => ()
        }

        if !report.aligned {
            self.drive.apply(cmd);
            return Ok(report.metrics)
        }

        // Aligned: stop, start recording and latch if picking up, then reverse onto the dock
        self.drive.stop();
        s.enter(DockState::Aligned, Some(time_s));

        let mut capture = VideoCapture::start(
            &self.video.root,
            &s.record.session_id,
            s.record.direction,
            self.video.jpeg_quality
        ).map_err(|e| {
            error!("Could not start video capture: {}", e);
            FailReason::VideoCaptureError
        })?;

        if let Some(ref image) = frame.image {
            if let Err(e) = capture.append(image) {
                warn!("Could not record frame: {}", e);
            }
        }
        s.capture = Some(capture);

        if s.record.direction == Direction::Pickup {
            self.latch.energize();
            s.latch_energized = true;
        }

        s.enter(DockState::ReversingToDock, Some(time_s));
        self.drive.apply(ControlCommand::new(0.0, -self.params.reverse_throttle));

        Ok(report.metrics)
    }

    /// Open-loop reverse until contact and tag are confirmed.
    fn step_reverse<S: SensorSource>(
        &mut self,
        time_s: f64,
        sensors: &mut S
    ) -> Result<(), FailReason> {
        let s = match self.active.as_mut() {
            Some(s) => s,
            None => return Ok(())
        };

        let mut docked_tag = None;

        if let Some(reading) = sensors.latest() {
            if let Some(d) = reading.proximity_distance_cm {
                if d <= self.params.proximity_threshold_cm && !s.proximity_sticky {
                    info!("Proximity {:.1} cm, contact latched", d);
                    s.proximity_sticky = true;
                }
            }

            match reading.dock_tag_id {
                Some(tag) if s.proximity_sticky => docked_tag = Some(tag),
                Some(tag) => debug!("Ignoring tag {} read before contact", tag),
                None => ()
            }
        }

        if let Some(tag) = docked_tag {
            match self.params.fixtures.get(&tag) {
                Some(&m) if m != s.record.target_marker_id => warn!(
                    "Docked on tag {} which belongs to marker {}, expected marker {}",
                    tag, m, s.record.target_marker_id
                ),
                _ => info!("Dock tag {} confirmed", tag)
            }

            self.drive.stop();
            s.record.dock_tag_id = Some(tag);
            s.enter(DockState::Docked, Some(time_s));
            s.docked_phase = DockedPhase::Creep(time_s);
            self.drive.apply(ControlCommand::new(0.0, self.params.docked_creep_throttle));

            return Ok(())
        }

        let elapsed_s = time_s - s.state_entered_s.unwrap_or(time_s);
        if elapsed_s > self.params.reverse_timeout_s {
            return Err(FailReason::ReverseTimeout)
        }

        self.drive.apply(ControlCommand::new(0.0, -self.params.reverse_throttle));

        Ok(())
    }

    /// Docked: creep forward, stop, hold, then release the latch if picking up.
    fn step_docked(&mut self, time_s: f64) -> Result<(), FailReason> {
        let s = match self.active.as_mut() {
            Some(s) => s,
            None => return Ok(())
        };

        match s.docked_phase {
            DockedPhase::Creep(since_s) => {
                if time_s - since_s >= self.params.docked_creep_s {
                    self.drive.stop();
                    s.docked_phase = DockedPhase::Hold(time_s);
                }
                else {
                    self.drive.apply(
                        ControlCommand::new(0.0, self.params.docked_creep_throttle)
                    );
                }
                Ok(())
            },
            DockedPhase::Hold(since_s) => {
                self.drive.stop();

                if time_s - since_s < self.params.latch_hold_s {
                    return Ok(())
                }

                if s.record.direction == Direction::Pickup {
                    self.latch.release();
                }

                s.enter(DockState::Departing, Some(time_s));
                self.depart(time_s)
            }
        }
    }

    /// Seal the recording and report success.
    fn depart(&mut self, time_s: f64) -> Result<(), FailReason> {
        let mut session = match self.active.take() {
            Some(s) => s,
            None => return Ok(())
        };

        let artifact = match session.capture.take().map(VideoCapture::finalize) {
            Some(Ok(a)) => Some(a),
            Some(Err((e, partial))) => {
                error!("Could not seal video capture: {}", e);
                session.unsealed_video = Some(partial);
                self.active = Some(session);
                return Err(FailReason::VideoCaptureError)
            },
            None => None
        };

        info!("Session {} docked successfully", session.record.session_id);
        self.complete(session, Outcome::Success, None, artifact, Some(time_s));

        Ok(())
    }

    /// The failure handler.
    ///
    /// Stops the drivetrain first, then releases a latch energized by a pickup session, seals
    /// the recording, discards buffered sensor readings and reports the failure.
    fn fail<S: SensorSource>(&mut self, reason: FailReason, time_s: Option<f64>, sensors: &mut S) {
        let mut session = match self.active.take() {
            Some(s) => s,
            None => return
        };

        self.drive.stop();

        warn!(
            "Session {} failed in {:?}: {}",
            session.record.session_id, session.record.state, reason
        );

        if session.record.direction == Direction::Pickup && session.latch_energized {
            self.latch.release();
        }

        let artifact = session.capture
            .take()
            .map(VideoCapture::abort)
            .or_else(|| session.unsealed_video.take());

        sensors.drain();

        session.record.enter(DockState::Failed, time_s);
        self.complete(session, Outcome::Failure, Some(reason), artifact, time_s);
    }

    /// Report the outcome to dispatch, archive the record and return to idle.
    fn complete(
        &mut self,
        mut session: ActiveSession,
        outcome: Outcome,
        reason: Option<FailReason>,
        artifact: Option<VideoArtifact>,
        time_s: Option<f64>
    ) {
        let record = &mut session.record;
        record.outcome = Some(outcome);
        record.fail_reason = reason;
        record.video = artifact.clone();

        let report = OutcomeReport {
            direction: record.direction,
            session_id: record.session_id.clone(),
            outcome,
            reason_code: reason.map(|r| r.code().to_string()),
            video: artifact
        };

        match self.outbound.try_send(report) {
            Ok(_) => info!("Outcome of session {} queued for dispatch", record.session_id),
            Err(TrySendError::Full(_)) => warn!(
                "Outbound queue full, outcome of session {} dropped", record.session_id
            ),
            Err(TrySendError::Disconnected(_)) => warn!(
                "Command channel closed, outcome of session {} dropped", record.session_id
            )
        }

        record.enter(DockState::Idle, time_s);
        util::session::save(record.archive_path(), record.clone());

        self.last_session = Some(session.record);
    }
}

impl ActiveSession {
    /// Enter a new state
    fn enter(&mut self, state: DockState, time_s: Option<f64>) {
        info!("Session {}: {:?} -> {:?}", self.record.session_id, self.record.state, state);
        self.record.enter(state, time_s);
        self.state_entered_s = time_s;
    }

    /// Enter searching, clearing the alignment controller history
    fn enter_searching(&mut self, time_s: Option<f64>) {
        self.enter(DockState::Searching, time_s);
        self.align.reset_pids();
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Find the single usable observation of the target marker in a frame.
///
/// Degenerate detections are dropped, and more than one usable detection of the target is
/// treated as not found.
fn find_target(frame: &FiducialFrame, target: u32, time_s: f64) -> Option<MarkerObservation> {
    let mut candidates = frame.markers
        .iter()
        .filter(|m| m.id == target)
        .map(|m| MarkerObservation::from_detection(m, time_s))
        .filter(|o| !o.is_degenerate());

    let first = candidates.next()?;

    if candidates.next().is_some() {
        debug!("Marker {} detected more than once, ignoring", target);
        return None
    }

    Some(first)
}
