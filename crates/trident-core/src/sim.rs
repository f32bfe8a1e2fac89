//! Deterministic simulated printer.
//!
//! One shared state backs both a [`MotionSink`] handle and an
//! [`EndstopMonitor`] handle, so homing sees switches trip as the queued
//! segments execute. Physical carriage heights are tracked separately from
//! the planner's idea of them; the two only agree once homing has assigned
//! the origin.

use crate::{
    error::Result,
    interfaces::{DynamicLimits, EndstopMonitor, IdleHook, MotionSink, Segment},
    kinematics::{DeltaKinematics, Kinematics},
    position::{CarriagePosition, ToolPosition, Tower},
};
use std::{cell::RefCell, collections::VecDeque, rc::Rc};
use tracing::debug;

/// Inward margin applied when pulling a point back onto the soft limit, so
/// the clamped point passes the reachability check despite rounding.
const CLAMP_MARGIN: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Physical carriage height at which each tower's switch trips
    pub switch_heights: CarriagePosition,
    /// Physical carriage heights at power-up
    pub start: CarriagePosition,
    /// Segments buffered before the oldest is executed
    pub queue_capacity: usize,
    pub print_radius: f64,
    pub soft_limits: bool,
    /// Keep endstops active outside homing
    pub endstops_always_on: bool,
    /// Refuse every segment after this many have been accepted
    pub accept_limit: Option<usize>,
}

impl SimConfig {
    /// Switches placed where a perfectly calibrated machine would have them.
    pub fn for_delta(kinematics: &DeltaKinematics) -> Result<Self> {
        let switch_heights = kinematics.forward(&kinematics.home_position())?;
        let drop = kinematics.homing_travel() / 2.0;
        Ok(Self {
            start: CarriagePosition::from_fn(|t| switch_heights[t] - drop),
            switch_heights,
            queue_capacity: 16,
            print_radius: kinematics.params().print_radius,
            soft_limits: true,
            endstops_always_on: false,
            accept_limit: None,
        })
    }
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    physical: CarriagePosition,
    planned: CarriagePosition,
    extruder: f64,
    queue: VecDeque<Segment>,
    executed: Vec<Segment>,
    accepted: usize,
    dynamics: DynamicLimits,
    powered: bool,
    endstops_enabled: bool,
    homing: bool,
    triggered_since_validate: bool,
}

impl SimState {
    fn new(config: SimConfig) -> Self {
        Self {
            physical: config.start,
            planned: config.start,
            extruder: 0.0,
            queue: VecDeque::with_capacity(config.queue_capacity),
            executed: Vec::new(),
            accepted: 0,
            dynamics: DynamicLimits::default(),
            powered: false,
            endstops_enabled: config.endstops_always_on,
            homing: false,
            triggered_since_validate: false,
            config,
        }
    }

    fn is_triggered(&self, tower: Tower) -> bool {
        self.physical[tower] >= self.config.switch_heights[tower]
    }

    /// Run one segment, stopping every carriage when a switch trips.
    fn execute(&mut self, segment: Segment) {
        let delta = CarriagePosition::from_fn(|t| segment.carriage[t] - self.planned[t]);

        let mut fraction = 1.0;
        let mut tripped = None;
        if self.endstops_enabled {
            for tower in Tower::ALL {
                if delta[tower] <= 0.0 {
                    continue;
                }
                let room = self.config.switch_heights[tower] - self.physical[tower];
                if room < delta[tower] {
                    let f = (room / delta[tower]).max(0.0);
                    if f < fraction {
                        fraction = f;
                        tripped = Some(tower);
                    }
                }
            }
        }

        for tower in Tower::ALL {
            let travel = delta[tower] * fraction;
            self.physical[tower] += travel;
            self.planned[tower] += travel;
        }
        self.extruder = segment.extruder;

        if let Some(tower) = tripped {
            // land exactly on the switch
            let overshoot = self.physical[tower] - self.config.switch_heights[tower];
            self.physical[tower] -= overshoot;
            self.planned[tower] -= overshoot;
            self.triggered_since_validate = true;
            let dropped = self.queue.len();
            self.queue.clear();
            debug!(%tower, dropped, "endstop hit, quick stop");
        }

        self.executed.push(segment);
    }
}

/// Shared handle to the simulated printer.
#[derive(Debug, Clone)]
pub struct Simulator {
    state: Rc<RefCell<SimState>>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState::new(config))),
        }
    }

    pub fn sink(&self) -> SimSink {
        SimSink {
            state: Rc::clone(&self.state),
        }
    }

    pub fn endstops(&self) -> SimEndstops {
        SimEndstops {
            state: Rc::clone(&self.state),
        }
    }

    /// Segments that have run, in order.
    pub fn executed(&self) -> Vec<Segment> {
        self.state.borrow().executed.clone()
    }

    pub fn queued(&self) -> usize {
        self.state.borrow().queue.len()
    }

    pub fn physical(&self) -> CarriagePosition {
        self.state.borrow().physical
    }

    pub fn planned(&self) -> CarriagePosition {
        self.state.borrow().planned
    }

    pub fn extruder(&self) -> f64 {
        self.state.borrow().extruder
    }

    pub fn dynamics(&self) -> DynamicLimits {
        self.state.borrow().dynamics
    }

    pub fn is_powered(&self) -> bool {
        self.state.borrow().powered
    }

    pub fn endstops_enabled(&self) -> bool {
        self.state.borrow().endstops_enabled
    }

    pub fn is_homing(&self) -> bool {
        self.state.borrow().homing
    }

    /// Accept at most `limit` more segments from now on.
    pub fn set_accept_limit(&self, limit: Option<usize>) {
        let mut state = self.state.borrow_mut();
        let accepted = state.accepted;
        state.config.accept_limit = limit.map(|l| accepted + l);
    }
}

pub struct SimSink {
    state: Rc<RefCell<SimState>>,
}

impl MotionSink for SimSink {
    fn enqueue_segment(&mut self, segment: &Segment) -> bool {
        let mut state = self.state.borrow_mut();
        if state
            .config
            .accept_limit
            .is_some_and(|limit| state.accepted >= limit)
        {
            return false;
        }
        if state.queue.len() >= state.config.queue_capacity.max(1) {
            if let Some(oldest) = state.queue.pop_front() {
                state.execute(oldest);
            }
        }
        state.queue.push_back(*segment);
        state.accepted += 1;
        true
    }

    fn synchronize(&mut self, idle: &mut dyn IdleHook) {
        loop {
            let next = self.state.borrow_mut().queue.pop_front();
            let Some(segment) = next else { break };
            self.state.borrow_mut().execute(segment);
            idle.idle();
        }
    }

    fn read_actual_position(&self, tower: Tower) -> f64 {
        self.state.borrow().planned[tower]
    }

    fn set_position(&mut self, tool: &ToolPosition, carriage: &CarriagePosition) {
        let mut state = self.state.borrow_mut();
        state.planned = *carriage;
        state.extruder = tool.e;
    }

    fn set_carriage_position(&mut self, carriage: &CarriagePosition) {
        self.state.borrow_mut().planned = *carriage;
    }

    fn dynamics(&self) -> DynamicLimits {
        self.state.borrow().dynamics
    }

    fn set_dynamics(&mut self, limits: DynamicLimits) {
        self.state.borrow_mut().dynamics = limits;
    }

    fn power_on(&mut self) {
        self.state.borrow_mut().powered = true;
    }
}

pub struct SimEndstops {
    state: Rc<RefCell<SimState>>,
}

impl EndstopMonitor for SimEndstops {
    fn is_triggered(&self, tower: Tower) -> bool {
        self.state.borrow().is_triggered(tower)
    }

    fn enable(&mut self, enabled: bool) {
        self.state.borrow_mut().endstops_enabled = enabled;
    }

    fn soft_limits_enabled(&self) -> bool {
        self.state.borrow().config.soft_limits
    }

    fn clamp_to_soft_limits(&self, position: &mut ToolPosition) {
        let state = self.state.borrow();
        if !state.config.soft_limits {
            return;
        }
        let radius = state.config.print_radius;
        let dist = position.x.hypot(position.y);
        if dist > radius {
            let scale = radius / dist * (1.0 - CLAMP_MARGIN);
            position.x *= scale;
            position.y *= scale;
        }
    }

    fn validate_homing_move(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        std::mem::take(&mut state.triggered_since_validate)
    }

    fn set_homing(&mut self, homing: bool) {
        let mut state = self.state.borrow_mut();
        state.homing = homing;
        state.endstops_enabled = homing || state.config.endstops_always_on;
    }
}
