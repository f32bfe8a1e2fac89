//! Human-readable position and geometry reports.

use crate::{
    error::Result,
    geometry::GeometryParameters,
    interfaces::ReportSink,
    kinematics::Kinematics,
    machine::MachineState,
    position::{CarriagePosition, ToolPosition},
};

fn xyz(position: &ToolPosition) -> String {
    format!(
        "X:{:.3} Y:{:.3} Z:{:.3}",
        position.x, position.y, position.z
    )
}

fn xyze(position: &ToolPosition) -> String {
    format!("{} E:{:.3}", xyz(position), position.e)
}

fn abc(carriage: &CarriagePosition) -> String {
    format!("A:{:.3} B:{:.3} C:{:.3}", carriage.a, carriage.b, carriage.c)
}

/// `X:… Y:… Z:… E:…` with two, two, three and four decimals.
pub fn report_current_position(position: &ToolPosition, out: &mut dyn ReportSink) {
    out.line(&format!(
        "X:{:.2} Y:{:.2} Z:{:.3} E:{:.4}",
        position.x, position.y, position.z, position.e
    ));
}

/// Every view of the current position, from logical down to steppers.
///
/// Waits for queued motion so the stepper view is settled.
pub fn report_current_position_detail<K: Kinematics>(
    machine: &mut MachineState<K>,
    out: &mut dyn ReportSink,
) -> Result<()> {
    let current = machine.positions.current;
    out.line(&format!("Raw:     {}", xyz(&current)));

    let mut leveled = current;
    if machine.leveling().is_enabled() {
        machine.leveling().apply(&mut leveled);
        out.line(&format!("Leveled: {}", xyz(&leveled)));

        let mut unleveled = leveled;
        machine.leveling().unapply(&mut unleveled);
        out.line(&format!("UnLevel: {}", xyz(&unleveled)));
    }

    let carriage = machine.kinematics().forward(&leveled)?;
    out.line(&format!("DeltaK:  {}", abc(&carriage)));

    machine.synchronize();

    let actual = machine.actual_carriage();
    out.line(&format!("Stepper: {}", abc(&actual)));

    let mut from_steppers = machine.kinematics().inverse(&actual)?;
    from_steppers.e = current.e;
    out.line(&format!("FromStp: {}", xyze(&from_steppers)));
    out.line(&format!("Differ:  {}", xyze(&(from_steppers - leveled))));
    Ok(())
}

/// Geometry parameters grouped the way calibration adjusts them.
pub fn report_geometry(params: &GeometryParameters, out: &mut dyn ReportSink) {
    let [xa, xb, xc] = params.endstop_adj;
    out.line("Endstop adjustment:");
    out.line(&format!("  X{xa:.2} Y{xb:.2} Z{xc:.2}"));

    let [ra, rb, rc] = params.diagonal_rod_adj;
    let [aa, ab, ac] = params.tower_angle_adj;
    let [ua, ub, uc] = params.tower_radius_adj;
    out.line("Tower adjustment: rod ABC, angle IJK, radius UVW:");
    out.line(&format!(
        "  A{ra:.3} B{rb:.3} C{rc:.3} I{aa:.3} J{ab:.3} K{ac:.3} U{ua:.3} V{ub:.3} W{uc:.3}"
    ));

    out.line("Radius R, diagonal rod D:");
    out.line(&format!(
        "  R{:.2} D{:.2}",
        params.radius, params.diagonal_rod
    ));

    out.line("Segments per second S, per line L:");
    out.line(&format!(
        "  S{:.2} L{}",
        params.segments_per_second, params.segments_per_line
    ));

    out.line("Printable radius O, probeable radius P, height H:");
    out.line(&format!(
        "  O{:.2} P{:.2} H{:.3}",
        params.print_radius, params.probe_radius, params.height
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kinematics::DeltaKinematics,
        sim::{SimConfig, Simulator},
    };

    #[test]
    fn position_line_precision() {
        let mut out = Vec::new();
        report_current_position(&ToolPosition::new(1.0, -2.5, 350.0, 0.12345), &mut out);
        insta::assert_snapshot!(out.join("\n"), @"X:1.00 Y:-2.50 Z:350.000 E:0.1235");
    }

    #[test]
    fn geometry_report() {
        let params = GeometryParameters {
            endstop_adj: [-0.25, 0.0, 0.1],
            tower_angle_adj: [0.5, -0.5, 0.0],
            ..GeometryParameters::default()
        };
        let mut out = Vec::new();
        report_geometry(&params, &mut out);
        insta::assert_snapshot!(out.join("\n"), @r"
        Endstop adjustment:
          X-0.25 Y0.00 Z0.10
        Tower adjustment: rod ABC, angle IJK, radius UVW:
          A0.000 B0.000 C0.000 I0.500 J-0.500 K0.000 U0.000 V0.000 W0.000
        Radius R, diagonal rod D:
          R150.00 D300.00
        Segments per second S, per line L:
          S200.00 L5
        Printable radius O, probeable radius P, height H:
          O140.00 P120.00 H350.000
        ");
    }

    #[test]
    fn detail_report_shows_agreeing_views() {
        let kin = DeltaKinematics::new(GeometryParameters::default()).unwrap();
        let sim = Simulator::new(SimConfig::for_delta(&kin).unwrap());
        let mut machine = MachineState::new(kin, sim.sink(), sim.endstops());
        machine.positions.current = ToolPosition::new(0.0, 0.0, 10.0, 0.0);
        machine.sync_plan_position().unwrap();

        let mut out = Vec::new();
        report_current_position_detail(&mut machine, &mut out).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], "Raw:     X:0.000 Y:0.000 Z:10.000");
        assert!(out[2].starts_with("Stepper: A:269.808"), "{}", out[2]);
        assert!(out[4].starts_with("Differ:  X:0.000") || out[4].starts_with("Differ:  X:-0.000"));
    }
}
