//! The machine context: kinematics, positions and collaborators in one place.

use crate::{
    arc::{self, ArcRequest, ArcSettings},
    error::{MotionError, Result},
    geometry::GeometryParameters,
    interfaces::{
        EndstopMonitor, IdleHook, IdleThrottle, LevelingCorrection, MotionSink, NoLeveling,
        NoSensorless, SensorlessHoming,
    },
    kinematics::{DeltaKinematics, Kinematics},
    position::{Axis, CarriagePosition, PositionStore, ToolPosition},
    segment::{Execution, MotionContext, MoveOutcome, MoveSegmenter},
};
use tracing::{debug, warn};

/// Explicit state for one machine, generic over its kinematics.
pub struct MachineState<K: Kinematics = DeltaKinematics> {
    pub(crate) kinematics: K,
    pub positions: PositionStore,
    pub(crate) sink: Box<dyn MotionSink>,
    pub(crate) endstops: Box<dyn EndstopMonitor>,
    pub(crate) leveling: Box<dyn LevelingCorrection>,
    pub(crate) sensorless: Box<dyn SensorlessHoming>,
    pub(crate) idle: Box<dyn IdleHook>,
    pub(crate) throttle: IdleThrottle,
}

impl<K: Kinematics> MachineState<K> {
    pub fn new(
        kinematics: K,
        sink: impl MotionSink + 'static,
        endstops: impl EndstopMonitor + 'static,
    ) -> Self {
        Self {
            kinematics,
            positions: PositionStore::new(),
            sink: Box::new(sink),
            endstops: Box::new(endstops),
            leveling: Box::new(NoLeveling),
            sensorless: Box::new(NoSensorless),
            idle: Box::new(()),
            throttle: IdleThrottle::default(),
        }
    }

    pub fn with_leveling(mut self, leveling: impl LevelingCorrection + 'static) -> Self {
        self.leveling = Box::new(leveling);
        self
    }

    pub fn with_sensorless(mut self, sensorless: impl SensorlessHoming + 'static) -> Self {
        self.sensorless = Box::new(sensorless);
        self
    }

    pub fn with_idle(mut self, idle: impl IdleHook + 'static) -> Self {
        self.idle = Box::new(idle);
        self
    }

    pub fn kinematics(&self) -> &K {
        &self.kinematics
    }

    pub fn leveling(&self) -> &dyn LevelingCorrection {
        self.leveling.as_ref()
    }

    /// Split borrows into a segment-producing context and the position store.
    pub(crate) fn split(&mut self) -> (MotionContext<'_, K>, &mut PositionStore) {
        let tool_index = self.positions.active_tool;
        (
            MotionContext {
                kinematics: &self.kinematics,
                endstops: self.endstops.as_ref(),
                leveling: self.leveling.as_ref(),
                sink: self.sink.as_mut(),
                idle: self.idle.as_mut(),
                throttle: &mut self.throttle,
                tool_index,
            },
            &mut self.positions,
        )
    }

    /// Wait for the planner to drain, servicing the idle hook.
    pub fn synchronize(&mut self) {
        self.sink.synchronize(self.idle.as_mut());
    }

    /// Carriage heights for `tool`, leveling applied.
    pub fn carriage_for(&mut self, tool: &ToolPosition) -> Result<CarriagePosition> {
        let (ctx, _) = self.split();
        ctx.carriage_for(tool)
    }

    /// Tell the planner that the machine is at `current`.
    pub fn sync_plan_position(&mut self) -> Result<()> {
        let current = self.positions.current;
        let carriage = self.carriage_for(&current)?;
        self.sink.set_position(&current, &carriage);
        Ok(())
    }

    fn feedrate(&self, feedrate_mm_s: Option<f64>) -> f64 {
        self.positions
            .scaled_feedrate(feedrate_mm_s.unwrap_or(self.positions.feedrate_mm_s))
    }

    fn settle(positions: &mut PositionStore, execution: &Execution) -> MoveOutcome {
        match execution.outcome {
            MoveOutcome::Completed { .. } => positions.set_current_to_destination(),
            MoveOutcome::SinkBackpressureStop { .. } => positions.current = execution.reached,
            MoveOutcome::DegenerateMove => {}
        }
        execution.outcome
    }

    /// Clamp, segment and queue the move from `current` to `destination`.
    ///
    /// `current` follows the motion: the destination on completion, the last
    /// accepted point when the planner pushed back, unchanged otherwise.
    pub fn prepare_move_to_destination(&mut self) -> Result<MoveOutcome> {
        self.endstops
            .clamp_to_soft_limits(&mut self.positions.destination);
        let feedrate = self.feedrate(None);

        let (mut ctx, positions) = self.split();
        let (start, end) = (positions.current, positions.destination);
        let execution = MoveSegmenter::run(&mut ctx, &start, &end, feedrate)?;
        Ok(Self::settle(positions, &execution))
    }

    /// One straight carriage-space move to `destination`, no segmentation.
    pub fn prepare_uninterpolated_move_to_destination(
        &mut self,
        feedrate_mm_s: Option<f64>,
    ) -> Result<MoveOutcome> {
        if self.positions.current == self.positions.destination {
            return Ok(MoveOutcome::DegenerateMove);
        }
        let feedrate = self.feedrate(feedrate_mm_s);

        let (mut ctx, positions) = self.split();
        let (start, end) = (positions.current, positions.destination);
        let execution = ctx.enqueue_all(start, std::iter::once(end), 1, feedrate, None)?;
        Ok(Self::settle(positions, &execution))
    }

    /// Move to (x, y, z) and wait for the motion to finish.
    ///
    /// Above the clip height the reachable disc shrinks, so Z goes first when
    /// rising and last when descending. Targets outside the printable area
    /// are ignored.
    pub fn do_blocking_move_to(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        feedrate_mm_s: Option<f64>,
    ) -> Result<()> {
        if !self.kinematics.is_reachable(x, y) {
            warn!(x, y, "blocking move target unreachable, ignored");
            return Ok(());
        }

        let saved_feedrate = self.positions.feedrate_mm_s;
        if let Some(feedrate) = feedrate_mm_s {
            self.positions.feedrate_mm_s = feedrate;
        }
        let result = self.blocking_move(x, y, z);
        self.positions.feedrate_mm_s = saved_feedrate;
        result
    }

    fn blocking_move(&mut self, x: f64, y: f64, z: f64) -> Result<()> {
        let clip = self.kinematics.clip_start_height();
        self.positions.sync_destination_to_current();

        if self.positions.current.z > clip {
            if z > clip {
                debug!(z, clip, "direct move within clip zone");
                self.positions.destination = self.positions.current.with_xyz(x, y, z);
                self.prepare_uninterpolated_move_to_destination(None)?;
                self.synchronize();
                return Ok(());
            }
            self.positions.destination.z = clip;
            self.prepare_uninterpolated_move_to_destination(None)?;
        }

        if z > self.positions.current.z {
            self.positions.destination.z = z;
            self.prepare_uninterpolated_move_to_destination(None)?;
        }

        self.positions.destination.x = x;
        self.positions.destination.y = y;
        self.prepare_move_to_destination()?;

        if z < self.positions.current.z {
            self.positions.destination.z = z;
            self.prepare_uninterpolated_move_to_destination(None)?;
        }

        self.synchronize();
        Ok(())
    }

    pub fn do_blocking_move_to_x(&mut self, x: f64, feedrate_mm_s: Option<f64>) -> Result<()> {
        let current = self.positions.current;
        self.do_blocking_move_to(x, current.y, current.z, feedrate_mm_s)
    }

    pub fn do_blocking_move_to_y(&mut self, y: f64, feedrate_mm_s: Option<f64>) -> Result<()> {
        let current = self.positions.current;
        self.do_blocking_move_to(current.x, y, current.z, feedrate_mm_s)
    }

    pub fn do_blocking_move_to_z(&mut self, z: f64, feedrate_mm_s: Option<f64>) -> Result<()> {
        let current = self.positions.current;
        self.do_blocking_move_to(current.x, current.y, z, feedrate_mm_s)
    }

    pub fn do_blocking_move_to_xy(
        &mut self,
        x: f64,
        y: f64,
        feedrate_mm_s: Option<f64>,
    ) -> Result<()> {
        let current = self.positions.current;
        self.do_blocking_move_to(x, y, current.z, feedrate_mm_s)
    }

    /// Interpolate an arc from `current` to the request's target.
    pub fn plan_arc(&mut self, request: &ArcRequest, settings: &ArcSettings) -> Result<MoveOutcome> {
        let feedrate = self.feedrate(None);
        let (mut ctx, positions) = self.split();
        let start = positions.current;
        let execution = arc::run_arc(&mut ctx, &start, request, settings, feedrate)?;
        if execution.outcome != MoveOutcome::DegenerateMove {
            positions.current = execution.reached;
        }
        positions.sync_destination_to_current();
        Ok(execution.outcome)
    }

    /// Carriage heights as the steppers report them.
    pub fn actual_carriage(&self) -> CarriagePosition {
        CarriagePosition::from_fn(|t| self.sink.read_actual_position(t))
    }

    /// Tool position derived from the stepper counts, leveling removed.
    pub fn position_from_steppers(&self) -> Result<ToolPosition> {
        let mut tool = self.kinematics.inverse(&self.actual_carriage())?;
        if self.leveling.is_enabled() {
            self.leveling.unapply(&mut tool);
        }
        tool.e = self.positions.current.e;
        Ok(tool)
    }

    /// Overwrite `current` from the steppers, for one axis or all of XYZ.
    pub fn set_current_from_steppers(&mut self, axis: Option<Axis>) -> Result<()> {
        let tool = self.position_from_steppers()?;
        match axis {
            Some(axis) => self.positions.current.set(axis, tool.get(axis)),
            None => {
                for axis in Axis::LINEAR {
                    self.positions.current.set(axis, tool.get(axis));
                }
            }
        }
        Ok(())
    }
}

impl MachineState<DeltaKinematics> {
    pub fn geometry(&self) -> &GeometryParameters {
        self.kinematics.params()
    }

    /// Apply a batch of geometry changes.
    ///
    /// Waits for queued motion first. On success every axis must be homed
    /// again; on error the previous geometry stays in effect.
    pub fn reconfigure(&mut self, mutate: impl FnOnce(&mut GeometryParameters)) -> Result<()> {
        self.synchronize();
        self.kinematics
            .update(mutate)
            .map_err(MotionError::ConfigurationDomain)?;
        self.positions.clear_homed();
        debug!(
            clip_start_height = self.kinematics.clip_start_height(),
            "geometry reconfigured"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimConfig, Simulator};

    fn machine() -> (MachineState, Simulator) {
        let kin = DeltaKinematics::new(GeometryParameters::default()).unwrap();
        let sim = Simulator::new(SimConfig::for_delta(&kin).unwrap());
        let mut machine = MachineState::new(kin, sim.sink(), sim.endstops());
        machine.sync_plan_position().unwrap();
        (machine, sim)
    }

    #[test]
    fn move_updates_current_and_reaches_target() {
        let (mut machine, sim) = machine();
        machine.positions.destination = ToolPosition::new(40.0, -20.0, 5.0, 1.0);
        let outcome = machine.prepare_move_to_destination().unwrap();
        assert!(outcome.is_completed());
        assert_eq!(machine.positions.current, machine.positions.destination);

        machine.synchronize();
        let reached = machine.position_from_steppers().unwrap();
        assert!((reached.x - 40.0).abs() < 1e-6);
        assert!((reached.y + 20.0).abs() < 1e-6);
        assert!((reached.z - 5.0).abs() < 1e-6);
        assert_eq!(sim.extruder(), 1.0);
    }

    #[test]
    fn destination_outside_print_radius_is_clamped() {
        let (mut machine, _sim) = machine();
        machine.positions.destination = ToolPosition::new(500.0, 0.0, 0.0, 0.0);
        assert!(machine.prepare_move_to_destination().unwrap().is_completed());
        assert!(machine.positions.current.x < 140.0);
        assert!(machine.positions.current.x > 139.99);
    }

    #[test]
    fn backpressure_leaves_current_at_last_accepted_point() {
        let (mut machine, sim) = machine();
        sim.set_accept_limit(Some(2));
        machine.positions.destination = ToolPosition::new(100.0, 0.0, 0.0, 0.0);
        let outcome = machine.prepare_move_to_destination().unwrap();
        assert!(matches!(
            outcome,
            MoveOutcome::SinkBackpressureStop { accepted: 2, .. }
        ));
        let current = machine.positions.current;
        assert!(current.x > 0.0 && current.x < 100.0);
    }

    #[test]
    fn uninterpolated_move_is_a_single_segment() {
        let (mut machine, sim) = machine();
        machine.positions.destination = ToolPosition::new(50.0, 50.0, 10.0, 0.0);
        machine
            .prepare_uninterpolated_move_to_destination(Some(100.0))
            .unwrap();
        machine.synchronize();
        assert_eq!(sim.executed().len(), 1);
        assert_eq!(sim.executed()[0].feedrate_mm_s, 100.0);

        assert_eq!(
            machine
                .prepare_uninterpolated_move_to_destination(None)
                .unwrap(),
            MoveOutcome::DegenerateMove
        );
    }

    #[test]
    fn blocking_move_from_clip_zone_descends_before_travelling() {
        let (mut machine, sim) = machine();
        let clip = machine.kinematics().clip_start_height();
        machine.positions.current = ToolPosition::new(0.0, 0.0, 340.0, 0.0);
        machine.sync_plan_position().unwrap();

        machine
            .do_blocking_move_to(100.0, 0.0, 10.0, Some(50.0))
            .unwrap();

        let executed = sim.executed();
        // first segment only drops to the clip height
        let first = machine
            .kinematics()
            .inverse(&executed[0].carriage)
            .unwrap();
        assert!(first.x.abs() < 1e-6 && (first.z - clip).abs() < 1e-6);

        let current = machine.positions.current;
        assert_eq!((current.x, current.y, current.z), (100.0, 0.0, 10.0));
        // feedrate restored after the move
        assert_eq!(machine.positions.feedrate_mm_s, 25.0);
    }

    #[test]
    fn blocking_move_within_clip_zone_is_direct() {
        let (mut machine, sim) = machine();
        machine.positions.current = ToolPosition::new(0.0, 0.0, 345.0, 0.0);
        machine.sync_plan_position().unwrap();
        machine.do_blocking_move_to_xy(5.0, 5.0, None).unwrap();
        assert_eq!(sim.executed().len(), 1);
    }

    #[test]
    fn blocking_move_to_unreachable_target_is_ignored() {
        let (mut machine, sim) = machine();
        machine.do_blocking_move_to_x(200.0, None).unwrap();
        machine.do_blocking_move_to_y(-141.0, None).unwrap();
        assert!(sim.executed().is_empty());
        assert_eq!(machine.positions.current, ToolPosition::ZERO);
    }

    #[test]
    fn rising_blocking_move_lifts_before_travelling() {
        let (mut machine, sim) = machine();
        machine.do_blocking_move_to(30.0, 0.0, 20.0, None).unwrap();
        let first = machine
            .kinematics()
            .inverse(&sim.executed()[0].carriage)
            .unwrap();
        assert!(first.x.abs() < 1e-6);
        assert!((first.z - 20.0).abs() < 1e-6);
    }

    #[test]
    fn reconfigure_clears_homed_flags() {
        let (mut machine, _sim) = machine();
        for axis in Axis::LINEAR {
            machine.positions.set_homed(axis, true);
        }
        machine.reconfigure(|p| p.radius = 148.0).unwrap();
        assert!(!machine.positions.homed().all_homed());
        assert_eq!(machine.geometry().radius, 148.0);

        let err = machine.reconfigure(|p| p.height = -1.0).unwrap_err();
        assert!(matches!(err, MotionError::ConfigurationDomain(_)));
        assert_eq!(machine.geometry().height, 350.0);
    }

    #[test]
    fn current_from_steppers_restores_single_axis() {
        let (mut machine, _sim) = machine();
        machine.positions.destination = ToolPosition::new(12.0, 34.0, 5.0, 0.0);
        machine.prepare_move_to_destination().unwrap();
        machine.synchronize();

        machine.positions.current = ToolPosition::ZERO;
        machine.set_current_from_steppers(Some(Axis::Y)).unwrap();
        assert!((machine.positions.current.y - 34.0).abs() < 1e-6);
        assert_eq!(machine.positions.current.x, 0.0);

        machine.set_current_from_steppers(None).unwrap();
        assert!((machine.positions.current.x - 12.0).abs() < 1e-6);
    }
}
