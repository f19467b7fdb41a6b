//! Alignment control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use super::*;
use crate::eqpt::ControlCommand;
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Alignment controller.
///
/// One instance is owned by each docking session so that no controller history leaks between
/// attempts.
#[derive(Debug, Clone)]
pub struct AlignCtrl {
    params: AlignCtrlParams,

    /// Lateral error controller
    lat_pid: PidController,

    /// Rotation error controller
    rot_pid: PidController,

    /// Size error controller
    size_pid: PidController,

    /// The last command output by the controller
    prev_cmd: ControlCommand,

    /// Frame time at which the marker was first missing, cleared on reacquisition
    lost_since_s: Option<f64>,
}

/// Input data to the module
#[derive(Debug, Clone)]
pub struct InputData {
    /// Observation of the target marker in this frame, `None` if it was not found
    pub observation: Option<MarkerObservation>,

    /// Width of the frame the observation was taken from.
    ///
    /// Units: pixels
    pub frame_width_px: f64,

    /// Frame time.
    ///
    /// Units: seconds
    pub time_s: f64,
}

/// The status report containing the alignment metrics and marker tracking flags.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusReport {
    /// Metrics of the observation, if the marker was found
    pub metrics: Option<AlignmentMetrics>,

    /// True if the alignment-complete predicate holds for this frame
    pub aligned: bool,

    /// Time the marker has been missing for, if it is missing.
    ///
    /// Units: seconds
    pub lost_for_s: Option<f64>,

    /// True if the marker has been missing for longer than the grace period and the controller is
    /// creeping to search for it
    pub grace_expired: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AlignCtrl {
    /// Create a new controller with cleared history.
    pub fn new(params: AlignCtrlParams) -> Self {
        Self {
            lat_pid: PidController::new(&params.lat_gains),
            rot_pid: PidController::new(&params.rot_gains),
            size_pid: PidController::new(&params.size_gains),
            prev_cmd: ControlCommand::stop(),
            lost_since_s: None,
            params,
        }
    }

    pub fn params(&self) -> &AlignCtrlParams {
        &self.params
    }

    /// Clear the history of all three PID loops.
    pub fn reset_pids(&mut self) {
        self.lat_pid.reset();
        self.rot_pid.reset();
        self.size_pid.reset();
    }

    /// Returns true if the given metrics satisfy the alignment-complete predicate.
    pub fn is_aligned(&self, metrics: &AlignmentMetrics) -> bool {
        let p = &self.params;

        metrics.lateral_error_px.abs() < p.lat_threshold_px
            && metrics.rotation_deg.abs() < p.rot_threshold_deg
            && (metrics.size_proxy_px2 - p.target_size_px2).abs() 
                < p.size_tolerance_frac * p.target_size_px2
    }

    /// Calculate the command while the marker is visible.
    fn track(&mut self, metrics: &AlignmentMetrics, time_s: f64) -> ControlCommand {
        let p = &self.params;

        let lat_out = self.lat_pid.get(-metrics.lateral_error_px, time_s);
        let rot_out = self.rot_pid.get(-metrics.rotation_deg, time_s);

        let size_error = p.target_size_px2 - metrics.size_proxy_px2;
        let size_out = self.size_pid.get(size_error, time_s);

        let mut steer_deg = p.lat_blend * lat_out + p.rot_blend * rot_out;

        // Throttle magnitude from the size loop, direction from the sign of the size error
        let throttle = if size_error == 0.0 {
            0.0
        }
        else {
            size_error.signum() * size_out.abs().max(p.min_throttle).min(p.max_throttle)
        };

        // Backing away from the marker inverts the effect of steering on the marker's position
        if size_error < 0.0 {
            steer_deg = -steer_deg;
        }

        trace!(
            "AlignCtrl track: lat_out = {:.3}, rot_out = {:.3}, size_out = {:.3}", 
            lat_out, rot_out, size_out
        );

        ControlCommand::new(
            steer_deg.max(-p.max_steer_deg).min(p.max_steer_deg), 
            throttle
        )
    }
}

impl State for AlignCtrl {
    type InitData = AlignCtrlParams;
    type InitError = AlignCtrlError;

    type InputData = InputData;
    type OutputData = ControlCommand;
    type StatusReport = StatusReport;
    type ProcError = AlignCtrlError;

    /// Initialise the AlignCtrl module.
    ///
    /// Replaces the parameters and clears all history.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        *self = Self::new(init_data);
        Ok(())
    }

    /// Process one frame.
    ///
    /// When the marker is missing the steering is held neutral and the previous throttle is held
    /// for the grace period without updating the controllers. After the grace period a constant
    /// forward creep is demanded to search for the marker.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let width = input_data.frame_width_px;
        if !width.is_finite() || width <= 0.0 {
            return Err(AlignCtrlError::InvalidFrameWidth(width))
        }

        let mut report = StatusReport::default();

        let cmd = match input_data.observation {
            Some(ref obs) => {
                if obs.is_degenerate() {
                    return Err(AlignCtrlError::DegenerateObservation(obs.marker_id))
                }

                self.lost_since_s = None;

                let metrics = obs.metrics(
                    width, 
                    self.params.rotation_scale, 
                    self.params.rotation_limit_deg
                );
                report.metrics = Some(metrics);
                report.aligned = self.is_aligned(&metrics);

                self.track(&metrics, obs.time_s)
            },
            None => {
                let since = *self.lost_since_s.get_or_insert(input_data.time_s);
                let lost_for = input_data.time_s - since;
                report.lost_for_s = Some(lost_for);

                if lost_for <= self.params.lost_grace_s {
                    ControlCommand::new(0.0, self.prev_cmd.throttle)
                }
                else {
                    report.grace_expired = true;
                    ControlCommand::new(0.0, self.params.search_throttle)
                }
            }
        };

        self.prev_cmd = cmd;

        Ok((cmd, report))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Point2;

    fn square(cx: f64, side: f64, time_s: f64) -> MarkerObservation {
        let h = side / 2.0;
        MarkerObservation {
            marker_id: 7,
            corners: [
                Point2::new(cx - h, 240.0 - h),
                Point2::new(cx + h, 240.0 - h),
                Point2::new(cx + h, 240.0 + h),
                Point2::new(cx - h, 240.0 + h),
            ],
            time_s
        }
    }

    fn input(obs: Option<MarkerObservation>, time_s: f64) -> InputData {
        InputData {
            observation: obs,
            frame_width_px: 640.0,
            time_s
        }
    }

    #[test]
    fn test_aligned_on_first_evaluation() {
        let mut ctrl = AlignCtrl::new(test_params());
        let side = 8000f64.sqrt();

        let (cmd, report) = ctrl.proc(&input(Some(square(320.0, side, 0.0)), 0.0)).unwrap();

        assert!(report.aligned);
        assert!(cmd.steering_angle_deg.abs() < 1e-6);
    }

    #[test]
    fn test_not_aligned_outside_thresholds() {
        let ctrl = AlignCtrl::new(test_params());

        let mut m = AlignmentMetrics {
            lateral_error_px: 12.9,
            rotation_deg: -2.9,
            size_proxy_px2: 8000.0 * 1.09
        };
        assert!(ctrl.is_aligned(&m));

        m.lateral_error_px = -13.0;
        assert!(!ctrl.is_aligned(&m));

        m.lateral_error_px = 0.0;
        m.rotation_deg = 3.0;
        assert!(!ctrl.is_aligned(&m));

        m.rotation_deg = 0.0;
        m.size_proxy_px2 = 8000.0 * 0.85;
        assert!(!ctrl.is_aligned(&m));
    }

    #[test]
    fn test_throttle_follows_size_error() {
        let mut ctrl = AlignCtrl::new(test_params());

        // Far away, small marker: forward, at least the minimum throttle
        let (cmd, _) = ctrl.proc(&input(Some(square(320.0, 40.0, 0.0)), 0.0)).unwrap();
        assert!(cmd.throttle >= 0.2 && cmd.throttle <= 0.4);

        // Too close, large marker: backwards
        let mut ctrl = AlignCtrl::new(test_params());
        let (cmd, _) = ctrl.proc(&input(Some(square(320.0, 120.0, 0.0)), 0.0)).unwrap();
        assert!(cmd.throttle <= -0.2 && cmd.throttle >= -0.4);
    }

    #[test]
    fn test_steering_mirrored_when_backing_away() {
        let mut near = AlignCtrl::new(test_params());
        let mut far = AlignCtrl::new(test_params());

        let (far_cmd, _) = far.proc(&input(Some(square(400.0, 40.0, 0.0)), 0.0)).unwrap();
        let (near_cmd, _) = near.proc(&input(Some(square(400.0, 120.0, 0.0)), 0.0)).unwrap();

        assert!(far_cmd.steering_angle_deg != 0.0);
        assert_eq!(far_cmd.steering_angle_deg, -near_cmd.steering_angle_deg);
    }

    #[test]
    fn test_steering_clamped() {
        let mut ctrl = AlignCtrl::new(test_params());

        let mut wide = input(Some(square(1900.0, 20.0, 0.0)), 0.0);
        wide.frame_width_px = 2000.0;

        let (cmd, _) = ctrl.proc(&wide).unwrap();
        assert_eq!(cmd.steering_angle_deg, -20.0);
    }

    #[test]
    fn test_lost_marker_grace_then_search() {
        let mut ctrl = AlignCtrl::new(test_params());

        let (first, _) = ctrl.proc(&input(Some(square(360.0, 40.0, 0.0)), 0.0)).unwrap();
        let integrals = (
            ctrl.lat_pid.integral(), ctrl.rot_pid.integral(), ctrl.size_pid.integral()
        );

        // Within the grace period the previous throttle is held with neutral steering
        for i in 1..=10 {
            let t = 0.1 * i as f64;
            let (cmd, report) = ctrl.proc(&input(None, t)).unwrap();
            assert_eq!(cmd.steering_angle_deg, 0.0);
            assert_eq!(cmd.throttle, first.throttle);
            assert!(!report.grace_expired);
        }

        // No controller update while lost
        assert_eq!(integrals, (
            ctrl.lat_pid.integral(), ctrl.rot_pid.integral(), ctrl.size_pid.integral()
        ));

        // After the grace period search creep
        let (cmd, report) = ctrl.proc(&input(None, 1.25)).unwrap();
        assert!(report.grace_expired);
        assert_eq!(cmd, ControlCommand::new(0.0, 0.3));
    }

    #[test]
    fn test_reacquisition_clears_lost_timer() {
        let mut ctrl = AlignCtrl::new(test_params());

        ctrl.proc(&input(Some(square(320.0, 40.0, 0.0)), 0.0)).unwrap();
        ctrl.proc(&input(None, 0.9)).unwrap();
        let (_, report) = ctrl.proc(&input(Some(square(320.0, 40.0, 1.0)), 1.0)).unwrap();
        assert!(report.lost_for_s.is_none());

        // A fresh gap starts counting from its own first frame
        let (_, report) = ctrl.proc(&input(None, 1.5)).unwrap();
        assert_eq!(report.lost_for_s, Some(0.0));
        assert!(!report.grace_expired);
    }

    #[test]
    fn test_reset_pids() {
        let mut ctrl = AlignCtrl::new(test_params());
        ctrl.proc(&input(Some(square(400.0, 40.0, 0.0)), 0.0)).unwrap();
        ctrl.proc(&input(Some(square(400.0, 40.0, 0.5)), 0.5)).unwrap();
        assert!(ctrl.size_pid.integral() != 0.0);

        ctrl.reset_pids();
        assert_eq!(ctrl.lat_pid.integral(), 0.0);
        assert_eq!(ctrl.size_pid.integral(), 0.0);
    }

    #[test]
    fn test_init_replaces_params_and_history() {
        let mut ctrl = AlignCtrl::new(test_params());
        ctrl.proc(&input(Some(square(400.0, 40.0, 0.0)), 0.0)).unwrap();
        ctrl.proc(&input(None, 0.5)).unwrap();

        let mut params = test_params();
        params.search_throttle = 0.25;
        ctrl.init(params).unwrap();

        assert_eq!(ctrl.params().search_throttle, 0.25);
        assert_eq!(ctrl.size_pid.integral(), 0.0);

        // The lost timer restarted, so this is the start of a new gap
        let (cmd, report) = ctrl.proc(&input(None, 0.6)).unwrap();
        assert_eq!(report.lost_for_s, Some(0.0));
        assert_eq!(cmd, ControlCommand::stop());
    }

    #[test]
    fn test_invalid_inputs() {
        let mut ctrl = AlignCtrl::new(test_params());

        let mut bad = input(None, 0.0);
        bad.frame_width_px = 0.0;
        assert!(matches!(ctrl.proc(&bad), Err(AlignCtrlError::InvalidFrameWidth(_))));

        let degenerate = input(Some(square(320.0, 0.0, 0.0)), 0.0);
        assert!(matches!(
            ctrl.proc(&degenerate), 
            Err(AlignCtrlError::DegenerateObservation(7))
        ));
    }
}
