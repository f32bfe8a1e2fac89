//! Multi-stage homing.
//!
//! All carriages first rise together until one switch trips, then each tower
//! is re-homed on its own (fast seek, optional slow bump, optional endstop
//! trim), and finally the origin is assigned to all three at once. The
//! per-tower seeks run in machine space, bypassing the kinematics.

use crate::{
    error::{MotionError, Result},
    interfaces::{DynamicLimits, Segment},
    kinematics::Kinematics,
    machine::MachineState,
    position::{CarriagePosition, ToolPosition, Tower},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Stage of the homing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    Idle,
    PowerOn,
    SyncPending,
    LevelingDisabled,
    DynamicsReduced,
    CoarseSeek,
    TowerHome(Tower),
    OriginAssigned,
    DynamicsRestored,
    LevelingRestored,
}

impl fmt::Display for HomingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HomingPhase::Idle => f.write_str("idle"),
            HomingPhase::PowerOn => f.write_str("power on"),
            HomingPhase::SyncPending => f.write_str("planner sync"),
            HomingPhase::LevelingDisabled => f.write_str("leveling disabled"),
            HomingPhase::DynamicsReduced => f.write_str("dynamics reduced"),
            HomingPhase::CoarseSeek => f.write_str("coarse seek"),
            HomingPhase::TowerHome(tower) => write!(f, "tower {tower} home"),
            HomingPhase::OriginAssigned => f.write_str("origin assigned"),
            HomingPhase::DynamicsRestored => f.write_str("dynamics restored"),
            HomingPhase::LevelingRestored => f.write_str("leveling restored"),
        }
    }
}

fn default_feedrate() -> f64 {
    100.0
}

fn default_bump_mm() -> [f64; 3] {
    [5.0; 3]
}

fn default_bump_divisor() -> [f64; 3] {
    [10.0; 3]
}

fn default_overshoot_mm() -> f64 {
    10.0
}

fn default_seek_factor() -> f64 {
    1.5
}

fn default_acceleration() -> f64 {
    100.0
}

fn default_trim_retract_mm() -> f64 {
    // (6 minimum steps + 1) at 80 steps/mm
    0.0875
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomingSettings {
    /// Seek feedrate toward the switches (mm/s)
    #[serde(default = "default_feedrate")]
    pub feedrate_mm_s: f64,

    /// Back-off distance before the slow re-seek, 0 disables it
    #[serde(default = "default_bump_mm")]
    pub bump_mm: [f64; 3],

    /// Slow re-seek runs at `feedrate_mm_s / bump_divisor`
    #[serde(default = "default_bump_divisor")]
    pub bump_divisor: [f64; 3],

    /// How far past the machine height the coarse seek aims
    #[serde(default = "default_overshoot_mm")]
    pub coarse_overshoot_mm: f64,

    /// Per-tower seek distance as a multiple of the homing travel
    #[serde(default = "default_seek_factor")]
    pub seek_factor: f64,

    /// Home with reduced acceleration and zero jerk
    #[serde(default)]
    pub reduce_dynamics: bool,

    #[serde(default = "default_acceleration")]
    pub homing_acceleration: f64,

    /// Extra travel added to a negative endstop trim so it spans enough steps
    #[serde(default = "default_trim_retract_mm")]
    pub trim_retract_mm: f64,

    /// Drop to the clip height after homing so the full disc is usable
    #[serde(default)]
    pub home_to_safe_zone: bool,
}

impl Default for HomingSettings {
    fn default() -> Self {
        Self {
            feedrate_mm_s: default_feedrate(),
            bump_mm: default_bump_mm(),
            bump_divisor: default_bump_divisor(),
            coarse_overshoot_mm: default_overshoot_mm(),
            seek_factor: default_seek_factor(),
            reduce_dynamics: false,
            homing_acceleration: default_acceleration(),
            trim_retract_mm: default_trim_retract_mm(),
            home_to_safe_zone: false,
        }
    }
}

impl HomingSettings {
    /// Feedrate for the slow re-seek of `tower`.
    pub fn bump_feedrate(&self, tower: Tower) -> f64 {
        let mut divisor = self.bump_divisor[tower.index()];
        if divisor < 1.0 {
            warn!(%tower, divisor, "bump divisor below 1, using 10");
            divisor = 10.0;
        }
        self.feedrate_mm_s / divisor
    }

    fn reduced_dynamics(&self) -> DynamicLimits {
        DynamicLimits {
            max_acceleration: [self.homing_acceleration; 3],
            max_jerk: [0.0; 3],
        }
    }
}

/// Options for a single homing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HomeRequest {
    /// Return to the pre-homing position afterwards
    pub come_back: bool,
    /// Assign the origin without moving
    pub simulate: bool,
}

/// Runs the homing sequence and remembers how far it got.
#[derive(Debug, Clone)]
pub struct HomingController {
    settings: HomingSettings,
    phase: HomingPhase,
    history: Vec<HomingPhase>,
}

impl HomingController {
    pub fn new(settings: HomingSettings) -> Self {
        Self {
            settings,
            phase: HomingPhase::Idle,
            history: Vec::new(),
        }
    }

    pub fn settings(&self) -> &HomingSettings {
        &self.settings
    }

    pub fn phase(&self) -> HomingPhase {
        self.phase
    }

    /// Phases entered during the last run, in order.
    pub fn history(&self) -> &[HomingPhase] {
        &self.history
    }

    fn enter(&mut self, phase: HomingPhase) {
        debug!(%phase, "homing phase");
        self.phase = phase;
        self.history.push(phase);
    }

    /// Home every tower.
    ///
    /// Homed flags are cleared up front and only set once the origin has
    /// been assigned. On failure the remaining motion stages are skipped but
    /// sensorless mode, endstop homing mode, dynamics and leveling are still
    /// restored.
    pub fn home<K: Kinematics>(
        &mut self,
        machine: &mut MachineState<K>,
        request: HomeRequest,
    ) -> Result<()> {
        self.history.clear();
        machine.positions.clear_homed();

        if request.simulate {
            self.assign_origin(machine)?;
            self.enter(HomingPhase::Idle);
            return Ok(());
        }

        self.enter(HomingPhase::PowerOn);
        machine.sink.power_on();

        self.enter(HomingPhase::SyncPending);
        machine.synchronize();

        self.enter(HomingPhase::LevelingDisabled);
        let leveling_was = machine.leveling.set_enabled(false);

        let saved_dynamics = if self.settings.reduce_dynamics {
            self.enter(HomingPhase::DynamicsReduced);
            let saved = machine.sink.dynamics();
            machine.sink.set_dynamics(self.settings.reduced_dynamics());
            Some(saved)
        } else {
            None
        };

        let saved_tool = machine.positions.active_tool;
        let saved_feedrate = machine.positions.feedrate_mm_s;
        machine.positions.active_tool = 0;
        machine.endstops.set_homing(true);
        machine.endstops.enable(true);

        let mut return_slot = false;
        let result = self.run_stages(machine, request.come_back, &mut return_slot);

        // only the slot this call pushed, and only if the return move has
        // not consumed it yet
        if result.is_err() && return_slot {
            let popped = machine.positions.pop_stored();
            if let Err(err) = popped {
                warn!(%err, "return position missing from the stored stack");
            }
        }

        machine.endstops.set_homing(false);
        machine.positions.active_tool = saved_tool;
        machine.positions.feedrate_mm_s = saved_feedrate;

        if let Some(saved) = saved_dynamics {
            self.enter(HomingPhase::DynamicsRestored);
            machine.sink.set_dynamics(saved);
        }

        self.enter(HomingPhase::LevelingRestored);
        machine.leveling.set_enabled(leveling_was);

        match result {
            Ok(()) => {
                machine.synchronize();
                self.enter(HomingPhase::Idle);
                info!(position = ?machine.positions.current, "homing complete");
                Ok(())
            }
            Err(err) => {
                warn!(%err, phase = %self.phase, "homing aborted");
                self.phase = HomingPhase::Idle;
                Err(err)
            }
        }
    }

    /// Motion stages between setup and restore. `return_slot` is true while
    /// a position pushed for the return move is still on the stack.
    fn run_stages<K: Kinematics>(
        &mut self,
        machine: &mut MachineState<K>,
        come_back: bool,
        return_slot: &mut bool,
    ) -> Result<()> {
        if come_back {
            machine.positions.push_stored(machine.positions.current)?;
            *return_slot = true;
        }
        self.seek(machine)?;
        self.finish(machine, return_slot)
    }

    /// Coarse seek, per-tower homing and origin assignment.
    fn seek<K: Kinematics>(&mut self, machine: &mut MachineState<K>) -> Result<()> {
        self.enter(HomingPhase::CoarseSeek);

        let e = machine.positions.current.e;
        machine.positions.current = ToolPosition::new(0.0, 0.0, 0.0, e);
        machine.positions.sync_destination_to_current();
        machine.sync_plan_position()?;

        let stealth = Tower::ALL.map(|tower| machine.sensorless.enable(tower));

        let top = machine.kinematics.homing_travel() + self.settings.coarse_overshoot_mm;
        machine.positions.destination.z = top;
        let (mut ctx, positions) = machine.split();
        let accepted = ctx.enqueue(&positions.destination, self.settings.feedrate_mm_s, None)?;
        machine.synchronize();

        for tower in Tower::ALL {
            machine.sensorless.restore(tower, stealth[tower.index()]);
        }

        if !accepted || !machine.endstops.validate_homing_move() {
            return Err(MotionError::HomingValidationFailure {
                phase: HomingPhase::CoarseSeek,
            });
        }

        for tower in Tower::ALL {
            self.home_tower(machine, tower)?;
        }

        self.assign_origin(machine)
    }

    fn home_tower<K: Kinematics>(
        &mut self,
        machine: &mut MachineState<K>,
        tower: Tower,
    ) -> Result<()> {
        self.enter(HomingPhase::TowerHome(tower));
        let feedrate = self.settings.feedrate_mm_s;

        let seek = self.settings.seek_factor * machine.kinematics.homing_travel();
        self.homing_move(machine, tower, seek, feedrate)?;

        let bump = self.settings.bump_mm[tower.index()];
        if bump != 0.0 {
            self.homing_move(machine, tower, -bump, feedrate)?;
            let slow = self.settings.bump_feedrate(tower);
            self.homing_move(machine, tower, 2.0 * bump, slow)?;
        }

        let trim = machine.kinematics.endstop_adjustment(tower);
        if trim < 0.0 {
            self.homing_move(machine, tower, trim - self.settings.trim_retract_mm, feedrate)?;
        }
        Ok(())
    }

    /// Move one carriage by `distance` in machine space.
    ///
    /// Positive distances head for the switch and must end with it tripped.
    fn homing_move<K: Kinematics>(
        &mut self,
        machine: &mut MachineState<K>,
        tower: Tower,
        distance: f64,
        feedrate_mm_s: f64,
    ) -> Result<()> {
        let toward_switch = distance > 0.0;
        debug!(%tower, distance, feedrate_mm_s, "homing move");

        let stealth = toward_switch.then(|| machine.sensorless.enable(tower));

        let mut target = machine.actual_carriage();
        target[tower] = 0.0;
        machine.sink.set_carriage_position(&target);
        target[tower] = distance;

        let accepted = machine.sink.enqueue_segment(&Segment {
            carriage: target,
            extruder: machine.positions.current.e,
            feedrate_mm_s,
            tool_index: 0,
            length_hint_mm: None,
        });
        machine.synchronize();

        let mut valid = accepted;
        if let Some(stealth) = stealth {
            valid &= machine.endstops.validate_homing_move();
            machine.sensorless.restore(tower, stealth);
        }

        if valid {
            Ok(())
        } else {
            Err(MotionError::HomingValidationFailure { phase: self.phase })
        }
    }

    fn assign_origin<K: Kinematics>(&mut self, machine: &mut MachineState<K>) -> Result<()> {
        self.enter(HomingPhase::OriginAssigned);
        let mut home = machine.kinematics.home_position();
        home.e = machine.positions.current.e;
        machine.positions.current = home;
        machine.positions.sync_destination_to_current();
        machine.sync_plan_position()?;
        for tower in Tower::ALL {
            machine.positions.set_homed(tower.axis(), true);
        }
        Ok(())
    }

    /// Optional moves after the origin is known.
    fn finish<K: Kinematics>(
        &mut self,
        machine: &mut MachineState<K>,
        return_slot: &mut bool,
    ) -> Result<()> {
        let feedrate = Some(self.settings.feedrate_mm_s);
        if self.settings.home_to_safe_zone {
            let clip = machine.kinematics.clip_start_height();
            machine.do_blocking_move_to_z(clip, feedrate)?;
        }
        if *return_slot {
            let back = machine.positions.pop_stored()?;
            *return_slot = false;
            machine.do_blocking_move_to(back.x, back.y, back.z, feedrate)?;
        }
        Ok(())
    }
}

/// Carriage heights of a machine sitting at its home position.
pub fn home_carriage<K: Kinematics>(kinematics: &K) -> Result<CarriagePosition> {
    kinematics.forward(&kinematics.home_position())
}
