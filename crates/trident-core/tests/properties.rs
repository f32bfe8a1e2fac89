use std::f64::consts::PI;
use trident_core::{
    DeltaKinematics, GeometryParameters, Kinematics, ToolPosition, segment::MoveSegmenter,
};

fn kin() -> DeltaKinematics {
    DeltaKinematics::new(GeometryParameters::default()).unwrap()
}

/// Point inside the printable disc from raw fuzz input.
fn disc_point(angle: i16, radius: u16, height: u16) -> ToolPosition {
    let theta = f64::from(angle) / f64::from(i16::MAX) * PI;
    let r = f64::from(radius) / f64::from(u16::MAX) * 140.0;
    let z = f64::from(height) / f64::from(u16::MAX) * 300.0;
    ToolPosition::new(r * theta.cos(), r * theta.sin(), z, 0.0)
}

#[test]
fn inverse_undoes_forward_over_the_envelope() {
    let kin = kin();
    bolero::check!()
        .with_type::<(i16, u16, u16)>()
        .cloned()
        .for_each(|(angle, radius, height)| {
            let p = disc_point(angle, radius, height);
            let carriage = kin.forward(&p).unwrap();
            let back = kin.inverse(&carriage).unwrap();
            assert!((back.x - p.x).abs() < 1e-3, "{p:?} -> {back:?}");
            assert!((back.y - p.y).abs() < 1e-3, "{p:?} -> {back:?}");
            assert!((back.z - p.z).abs() < 1e-3, "{p:?} -> {back:?}");
        });
}

#[test]
fn segmentation_conserves_displacement() {
    let kin = kin();
    bolero::check!()
        .with_type::<((i16, u16, u16), (i16, u16, u16), u8)>()
        .cloned()
        .for_each(|(a, b, feed)| {
            let start = disc_point(a.0, a.1, a.2);
            let end = disc_point(b.0, b.1, b.2);
            let feedrate = f64::from(feed) + 1.0;

            let Some(plan) = MoveSegmenter::plan(&kin, &start, &end, feedrate) else {
                return;
            };
            assert!(plan.lines >= 1);

            let points: Vec<_> = plan.points().collect();
            assert_eq!(points.len(), plan.lines);
            assert_eq!(*points.last().unwrap(), end);

            let mut travelled = 0.0;
            let mut previous = start;
            for p in &points {
                travelled += (*p - previous).xyz_length();
                previous = *p;
            }
            let distance = (end - start).xyz_length();
            assert!((travelled - distance).abs() < 1e-6, "{travelled} vs {distance}");

            let faster = MoveSegmenter::plan(&kin, &start, &end, feedrate * 2.0).unwrap();
            assert!(faster.lines <= plan.lines);
        });
}

#[test]
fn reachable_exactly_within_print_radius() {
    let kin = kin();
    bolero::check!()
        .with_type::<(i16, i16)>()
        .cloned()
        .for_each(|(x, y)| {
            let (x, y) = (f64::from(x) / 100.0, f64::from(y) / 100.0);
            assert_eq!(kin.is_reachable(x, y), x * x + y * y <= 140.0 * 140.0);
        });
}

#[test]
fn recompute_is_bitwise_stable() {
    let params = GeometryParameters {
        tower_angle_adj: [0.13, -0.27, 0.05],
        diagonal_rod_adj: [0.2, -0.1, 0.0],
        ..GeometryParameters::default()
    };
    let a = trident_core::GeometryCache::recompute(&params);
    let b = trident_core::GeometryCache::recompute(&params);
    assert_eq!(a.q.to_bits(), b.q.to_bits());
    assert_eq!(a.core_ka.to_bits(), b.core_ka.to_bits());
    assert_eq!(a.clip_start_height.to_bits(), b.clip_start_height.to_bits());
}
