//! Docking sequence tests against fake hardware

use std::path::PathBuf;
use chrono::{TimeZone, Utc};
use crossbeam::channel::{bounded, Receiver};

use super::*;
use crate::{
    align_ctrl::{self, AlignCtrl, MarkerObservation},
    cmd_channel::OutcomeReport,
    eqpt::{fake::*, ActuatorDriver, ControlCommand, LatchCtrl, LatchState},
    sensor_gateway::SensorSource,
    video::{test::{jpeg_frame, scratch_dir, BrokenSink}, VideoCapture, VideoSettings}
};
use comms_if::{
    dispatch::*,
    eqpt::{fiducial::{FiducialFrame, MarkerDetection}, sensor::SensorReading}
};
use util::module::State;

// ---------------------------------------------------------------------------
// HARNESS
// ---------------------------------------------------------------------------

/// Sensor source fed by the test, one reading per cycle
#[derive(Default)]
struct ScriptedSensors {
    pending: Option<SensorReading>,
    drains: usize,
}

impl SensorSource for ScriptedSensors {
    fn latest(&mut self) -> Option<SensorReading> {
        self.pending.take()
    }

    fn drain(&mut self) {
        self.pending = None;
        self.drains += 1;
    }
}

struct Harness {
    mgr: DockMgr<FakeDrive, FakeLatch>,
    log: EventLog,
    sensors: ScriptedSensors,
    outbound: Receiver<OutcomeReport>,
    dir: PathBuf,
}

/// Frame times start here so that they are representable as positive timestamps
const T0: f64 = 1000.0;

const TARGET: u32 = 7;

impl Harness {
    fn new() -> Self {
        let (drive, latch, log) = pair();
        let (tx, rx) = bounded(8);
        let dir = scratch_dir("dock_mgr");

        let mgr = DockMgr::new(
            params::test_params(),
            align_ctrl::test_params(),
            VideoSettings { root: dir.clone(), jpeg_quality: 80 },
            ActuatorDriver::new(drive, actuator_params()),
            LatchCtrl::new(latch, latch_params()),
            tx
        );

        Self {
            mgr,
            log,
            sensors: ScriptedSensors::default(),
            outbound: rx,
            dir
        }
    }

    fn begin(&mut self, direction: Direction, id: u64, target: TargetRef) {
        self.mgr.handle_cmd(
            DispatchCmd::Begin { direction, session_id: SessionId::Num(id), target },
            &mut self.sensors
        );
    }

    fn cancel(&mut self, id: Option<u64>) {
        self.mgr.handle_cmd(
            DispatchCmd::Cancel { session_id: id.map(SessionId::Num) },
            &mut self.sensors
        );
    }

    /// Step with a frame at `t` seconds after T0 containing the given markers
    fn step(&mut self, t: f64, markers: Vec<MarkerDetection>) -> StatusReport {
        let frame = FiducialFrame {
            timestamp: Utc.timestamp_millis(((T0 + t) * 1000.0).round() as i64),
            width_px: 640,
            height_px: 480,
            markers,
            image: Some(jpeg_frame())
        };
        self.mgr.step(&frame, &mut self.sensors)
    }

    /// Step with a sensor reading available
    fn step_sensed(&mut self, t: f64, proximity: Option<f64>, tag: Option<&str>) -> StatusReport {
        self.sensors.pending = Some(SensorReading {
            proximity_distance_cm: proximity,
            dock_tag_id: tag.map(String::from)
        });
        self.step(t, vec![])
    }

    /// Drive a new session straight to reversing with one perfectly aligned frame
    fn align_now(&mut self, direction: Direction, id: u64) {
        self.begin(direction, id, TargetRef::Marker(TARGET));
        let report = self.step(0.0, vec![aligned()]);
        assert_eq!(report.state, DockState::ReversingToDock);
    }

    /// Queued outcomes as they would be sent to dispatch
    fn outcomes(&self) -> Vec<ServiceMsg> {
        self.reports().iter().map(|r| r.to_service_msg().unwrap()).collect()
    }

    fn reports(&self) -> Vec<OutcomeReport> {
        self.outbound.try_iter().collect()
    }

    /// Run frames without markers until the session ends
    fn run_to_idle(&mut self, mut t: f64) {
        while self.mgr.state() != DockState::Idle {
            self.step(t, vec![]);
            t += 0.1;
            assert!(t < 10.0, "session never ended");
        }
    }

    fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.dir).ok();
    }
}

/// A square target marker centred at `cx` with the given side length
fn marker(cx: f64, side: f64) -> MarkerDetection {
    marker_id(TARGET, cx, side)
}

fn marker_id(id: u32, cx: f64, side: f64) -> MarkerDetection {
    let h = side / 2.0;
    MarkerDetection {
        id,
        corners: [
            [cx - h, 240.0 - h],
            [cx + h, 240.0 - h],
            [cx + h, 240.0 + h],
            [cx - h, 240.0 + h],
        ]
    }
}

/// The target exactly at the docking start position
fn aligned() -> MarkerDetection {
    marker(320.0, 8000f64.sqrt())
}

/// Command of a standalone alignment controller seeing `marker` at `t`
fn align_cmd(ctrl: &mut AlignCtrl, t: f64, marker: &MarkerDetection) -> ControlCommand {
    let input = align_ctrl::InputData {
        observation: Some(MarkerObservation::from_detection(marker, T0 + t)),
        frame_width_px: 640.0,
        time_s: T0 + t
    };
    ctrl.proc(&input).unwrap().0
}

// ---------------------------------------------------------------------------
// SCENARIOS
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_pickup_happy_path() {
    let mut h = Harness::new();
    h.begin(Direction::Pickup, 1, TargetRef::Marker(TARGET));
    assert_eq!(h.mgr.state(), DockState::Searching);
    assert_eq!(h.sensors.drains, 1);

    // Converge on the marker
    let approach = [
        (420.0, 50.0), (390.0, 60.0), (360.0, 70.0), (340.0, 80.0)
    ];
    for (i, &(cx, side)) in approach.iter().enumerate() {
        let report = h.step(0.1 * i as f64, vec![marker(cx, side)]);
        assert_eq!(report.state, DockState::Approaching);
        assert!(report.cmd.throttle > 0.0);
    }

    let report = h.step(0.4, vec![aligned()]);
    assert_eq!(report.state, DockState::ReversingToDock);
    assert_eq!(report.cmd, ControlCommand::new(0.0, -0.4));
    assert_eq!(h.mgr.latch_state(), Some(LatchState::Energized));

    // Contact then tag on the next cycle
    h.step(0.5, vec![]);
    assert_eq!(h.step_sensed(0.6, Some(8.0), None).state, DockState::ReversingToDock);
    assert_eq!(h.step_sensed(0.7, Some(7.0), Some("A1")).state, DockState::Docked);

    // Creep, stop, hold, release
    let mut t = 0.8;
    while h.mgr.state() == DockState::Docked {
        h.step(t, vec![]);
        t += 0.1;
        assert!(t < 10.0, "never left docked");
    }
    assert_eq!(h.mgr.state(), DockState::Idle);
    assert_eq!(h.mgr.latch_state(), Some(LatchState::Released));
    assert_eq!(h.mgr.last_cmd(), ControlCommand::stop());

    let record = h.mgr.last_session().unwrap();
    assert_eq!(record.outcome, Some(Outcome::Success));
    assert_eq!(record.dock_tag_id.as_deref(), Some("A1"));
    assert!(record.video.as_ref().unwrap().frame_count > 0);

    let states: Vec<DockState> = record.history.iter().map(|t| t.state).collect();
    assert_eq!(states, vec![
        DockState::Searching,
        DockState::Approaching,
        DockState::Aligned,
        DockState::ReversingToDock,
        DockState::Docked,
        DockState::Departing,
        DockState::Idle
    ]);

    let outcomes = h.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].path, PATH_MODULE_MOUNT);
    assert_eq!(outcomes[0].payload["sessionId"], 1);
    assert_eq!(outcomes[0].payload["outcome"], "success");
    assert!(outcomes[0].payload["video"].is_string());
}

#[test]
fn scenario_b_marker_lost_mid_approach() {
    let mut h = Harness::new();
    h.begin(Direction::Return, 2, TargetRef::Marker(TARGET));

    h.step(0.0, vec![marker(380.0, 50.0)]);
    let before = h.step(0.1, vec![marker(375.0, 52.0)]);
    assert_eq!(before.state, DockState::Approaching);
    assert!(before.cmd.steering_angle_deg != 0.0);

    // Half a second without the marker
    for i in 1..=5 {
        let report = h.step(0.1 + 0.1 * i as f64, vec![]);
        assert_eq!(report.state, DockState::Approaching);
        assert_eq!(report.cmd.steering_angle_deg, 0.0);
        assert_eq!(report.cmd.throttle, before.cmd.throttle);
    }

    // Reacquired, closed loop resumes
    let report = h.step(0.7, vec![marker(370.0, 54.0)]);
    assert_eq!(report.state, DockState::Approaching);
    assert!(report.cmd.steering_angle_deg != 0.0);
    assert!(report.metrics.is_some());

    let record = h.mgr.active_session().unwrap();
    assert_eq!(record.history.len(), 2);
}

#[test]
fn marker_lost_beyond_grace_searches() {
    let mut h = Harness::new();
    h.begin(Direction::Return, 3, TargetRef::Marker(TARGET));

    // A controller fed the same frames but never reset
    let mut carried = AlignCtrl::new(align_ctrl::test_params());
    for &t in &[0.0, 0.1, 0.2] {
        h.step(t, vec![marker(380.0, 50.0)]);
        align_cmd(&mut carried, t, &marker(380.0, 50.0));
    }

    h.step(0.3, vec![]);
    let report = h.step(1.5, vec![]);
    assert_eq!(report.state, DockState::Searching);
    assert_eq!(report.cmd, ControlCommand::new(0.0, 0.3));

    // Reacquisition loops back to approaching with no integral or derivative history
    let report = h.step(1.6, vec![marker(380.0, 50.0)]);
    assert_eq!(report.state, DockState::Approaching);

    let fresh = align_cmd(
        &mut AlignCtrl::new(align_ctrl::test_params()), 1.6, &marker(380.0, 50.0)
    );
    assert_eq!(report.cmd, fresh);
    assert_ne!(align_cmd(&mut carried, 1.6, &marker(380.0, 50.0)), fresh);
}

#[test]
fn scenario_c_reverse_timeout() {
    let mut h = Harness::new();
    h.align_now(Direction::Pickup, 4);

    // Proximity never close, a stray tag read is not enough
    let mut t = 0.5;
    let mut reports = Vec::new();
    while t < 8.0 {
        reports.push(h.step_sensed(t, Some(40.0), Some("A1")));
        t += 0.5;
    }

    let failed_at = reports.iter().position(|r| r.state == DockState::Idle).unwrap();
    assert!(reports[..failed_at].iter().all(|r| r.state == DockState::ReversingToDock));
    assert_eq!(h.mgr.last_cmd().throttle, 0.0);

    let record = h.mgr.last_session().unwrap();
    assert_eq!(record.fail_reason, Some(FailReason::ReverseTimeout));
    assert_eq!(record.history.iter().filter(|t| t.state == DockState::Failed).count(), 1);
    assert!(record.video.as_ref().unwrap().frame_count > 0);

    // Pickup latch is not left energized
    assert_eq!(h.mgr.latch_state(), Some(LatchState::Released));

    let outcomes = h.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].payload["outcome"], "failure");
    assert_eq!(outcomes[0].payload["reasonCode"], "REVERSE_TIMEOUT");
    assert!(outcomes[0].payload["video"].is_string());
}

#[test]
fn scenario_d_cancel_mid_approach() {
    let mut h = Harness::new();
    h.begin(Direction::Return, 5, TargetRef::Marker(TARGET));
    h.step(0.0, vec![marker(400.0, 50.0)]);
    assert_eq!(h.mgr.state(), DockState::Approaching);
    assert!(h.mgr.last_cmd().throttle > 0.0);

    h.cancel(Some(5));

    assert_eq!(h.mgr.state(), DockState::Idle);
    assert_eq!(h.mgr.last_cmd(), ControlCommand::stop());
    assert_eq!(h.events().last(), Some(&Event::Steer(0.0)));
    assert!(!h.events().iter().any(|e| matches!(e, Event::LatchDuty(_))));
    assert_eq!(h.mgr.latch_state(), None);
    assert_eq!(h.sensors.drains, 2);

    let outcomes = h.outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].path, PATH_MODULE_RETURN);
    assert_eq!(outcomes[0].payload["reasonCode"], "CANCELLED");
    assert!(outcomes[0].payload["video"].is_null());
}

// ---------------------------------------------------------------------------
// PROPERTIES
// ---------------------------------------------------------------------------

#[test]
fn stop_precedes_latch_release() {
    let mut h = Harness::new();
    h.align_now(Direction::Pickup, 6);
    h.step_sensed(0.1, Some(5.0), Some("A1"));

    let mut t = 0.2;
    while h.mgr.state() != DockState::Idle {
        h.step(t, vec![]);
        t += 0.1;
        assert!(t < 10.0);
    }

    let events = h.events();
    let release = events.iter().position(|e| *e == Event::LatchDuty(0.1)).unwrap();
    let last_throttle = events[..release]
        .iter()
        .rev()
        .find_map(|e| match e {
            Event::Throttle(v) => Some(*v),
            _ => None
        });
    assert_eq!(last_throttle, Some(0.0));
}

#[test]
fn return_docking_leaves_latch_alone() {
    let mut h = Harness::new();
    h.align_now(Direction::Return, 7);
    h.step_sensed(0.1, Some(5.0), Some("A1"));

    let mut t = 0.2;
    while h.mgr.state() != DockState::Idle {
        h.step(t, vec![]);
        t += 0.1;
        assert!(t < 10.0);
    }

    assert_eq!(h.mgr.latch_state(), None);
    assert_eq!(h.outcomes()[0].path, PATH_MODULE_RETURN);
}

#[test]
fn camera_failure_fails_session_not_process() {
    let mut h = Harness::new();
    h.begin(Direction::Pickup, 8, TargetRef::Marker(TARGET));
    h.step(0.0, vec![marker(400.0, 50.0)]);

    h.mgr.frame_read_failed(&mut h.sensors);
    assert_eq!(h.mgr.state(), DockState::Idle);
    assert_eq!(h.mgr.last_cmd(), ControlCommand::stop());
    assert_eq!(
        h.mgr.last_session().unwrap().fail_reason,
        Some(FailReason::CameraReadFailure)
    );

    // Idle read failures are harmless and a new session can start
    h.mgr.frame_read_failed(&mut h.sensors);
    assert_eq!(h.outcomes().len(), 1);
    h.begin(Direction::Pickup, 9, TargetRef::Marker(TARGET));
    assert_eq!(h.mgr.state(), DockState::Searching);
}

#[test]
fn begin_rejected_while_active() {
    let mut h = Harness::new();
    h.begin(Direction::Pickup, 10, TargetRef::Marker(TARGET));
    h.step(0.0, vec![marker(400.0, 50.0)]);

    h.begin(Direction::Return, 11, TargetRef::Marker(3));
    let record = h.mgr.active_session().unwrap();
    assert_eq!(record.session_id, SessionId::Num(10));
    assert_eq!(record.state, DockState::Approaching);
}

#[test]
fn cancel_for_other_session_ignored() {
    let mut h = Harness::new();
    h.begin(Direction::Pickup, 12, TargetRef::Marker(TARGET));

    h.cancel(Some(99));
    assert_eq!(h.mgr.state(), DockState::Searching);

    h.cancel(None);
    assert_eq!(h.mgr.state(), DockState::Idle);
}

#[test]
fn target_resolution() {
    let mut h = Harness::new();

    h.begin(Direction::Pickup, 13, TargetRef::ModuleTag("043F8E6A6C1D90".into()));
    assert_eq!(h.mgr.active_session().unwrap().target_marker_id, 2);
    h.cancel(None);

    h.begin(Direction::Return, 14, TargetRef::Unspecified);
    assert_eq!(h.mgr.active_session().unwrap().target_marker_id, 11);
    h.cancel(None);

    h.begin(Direction::Pickup, 15, TargetRef::Unspecified);
    assert_eq!(h.mgr.state(), DockState::Idle);

    h.begin(Direction::Pickup, 16, TargetRef::ModuleTag("FFFF".into()));
    assert_eq!(h.mgr.state(), DockState::Idle);
}

#[test]
fn ambiguous_or_foreign_markers_not_tracked() {
    let mut h = Harness::new();
    h.begin(Direction::Return, 17, TargetRef::Marker(TARGET));

    // Another marker id only
    h.step(0.0, vec![marker_id(3, 320.0, 89.0)]);
    assert_eq!(h.mgr.state(), DockState::Searching);

    // Target detected twice
    h.step(0.1, vec![marker(300.0, 50.0), marker(340.0, 50.0)]);
    assert_eq!(h.mgr.state(), DockState::Searching);

    // Degenerate detection
    h.step(0.2, vec![marker(300.0, 0.0)]);
    assert_eq!(h.mgr.state(), DockState::Searching);

    h.step(0.3, vec![marker(300.0, 50.0)]);
    assert_eq!(h.mgr.state(), DockState::Approaching);
}

#[test]
fn unsealed_recording_reported_with_failure() {
    let mut h = Harness::new();
    h.align_now(Direction::Return, 18);

    let path = h.dir.join("18_return_unsealed.mjpeg");
    h.mgr.replace_capture(
        VideoCapture::with_writer(path.clone(), Box::new(BrokenSink), Utc::now(), 80)
    );

    assert_eq!(h.step_sensed(0.1, Some(5.0), Some("A1")).state, DockState::Docked);
    h.run_to_idle(0.2);

    let record = h.mgr.last_session().unwrap();
    assert_eq!(record.outcome, Some(Outcome::Failure));
    assert_eq!(record.fail_reason, Some(FailReason::VideoCaptureError));

    let states: Vec<DockState> = record.history.iter().map(|t| t.state).collect();
    assert_eq!(&states[states.len() - 3..], &[
        DockState::Departing,
        DockState::Failed,
        DockState::Idle
    ]);

    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, Outcome::Failure);
    assert_eq!(reports[0].reason_code.as_deref(), Some("VIDEO_CAPTURE_ERROR"));

    let video = reports[0].video.as_ref().unwrap();
    assert_eq!(video.path, path);
    assert!(video.frame_count > 0);
    assert_eq!(record.video.as_ref(), Some(video));
}
