use dfloc_3d::pose::{Attitude, Pose4};
use dfloc_3d::registration::{Registration, RegistrationStatus};
use dfloc_3d::transforms::rotate_yaw;
use dfloc_grid::{DistanceField, GridError, MapInput};
use dfloc_solver::{DistanceFieldAligner, ExecutionStrategy, LossFunction, PoseSolver, SolverConfig};
use glam::DVec3;
use std::sync::Arc;

const RESOLUTION: f64 = 0.1;
const DIMS: [usize; 3] = [61, 51, 31];

/// A 4 x 3 m room with a floor, its walls lying on node planes.
fn room_field() -> Result<DistanceField, GridError> {
    let [nx, ny, nz] = DIMS;
    let mut occupancy = vec![false; nx * ny * nz];
    for k in 5..nz {
        for j in 10..=40 {
            for i in 10..=50 {
                let wall = i == 10 || i == 50 || j == 10 || j == 40;
                let floor = k == 5;
                if wall || floor {
                    occupancy[i + nx * (j + ny * k)] = true;
                }
            }
        }
    }
    DistanceField::build(MapInput::Occupancy(&occupancy), DVec3::ZERO, RESOLUTION, DIMS)
}

/// Points sampled on the surfaces of the room, in the map frame.
fn room_surface_points() -> Vec<[f64; 3]> {
    let mut points = Vec::new();
    for a in 0..10 {
        let z = 0.7 + 0.2 * a as f64;
        for b in 0..14 {
            let y = 1.2 + 0.2 * b as f64;
            points.push([1.0, y, z]);
            points.push([5.0, y, z]);
        }
        for b in 0..19 {
            let x = 1.2 + 0.2 * b as f64;
            points.push([x, 1.0, z]);
            points.push([x, 4.0, z]);
        }
    }
    for a in 0..19 {
        for b in 0..14 {
            points.push([1.2 + 0.2 * a as f64, 1.2 + 0.2 * b as f64, 0.5]);
        }
    }
    points
}

/// Express map frame points in the base frame of a platform at `pose`.
fn to_base_frame(points: &[[f64; 3]], pose: &Pose4) -> Vec<[f64; 3]> {
    let (sin_yaw, cos_yaw) = (-pose.yaw).sin_cos();
    points
        .iter()
        .map(|p| {
            rotate_yaw(DVec3::from_array(*p) - pose.translation(), sin_yaw, cos_yaw).to_array()
        })
        .collect()
}

fn assert_pose_near(actual: &Pose4, expected: &Pose4, translation_tol: f64, yaw_tol: f64) {
    assert!(
        actual.translation_distance(expected) < translation_tol,
        "translation error too high: {:?} vs {:?}",
        actual,
        expected
    );
    assert!(
        actual.yaw_difference(expected).abs() < yaw_tol,
        "yaw error too high: {:?} vs {:?}",
        actual,
        expected
    );
}

#[test]
fn test_recovers_known_offset() -> Result<(), Box<dyn std::error::Error>> {
    let field = room_field()?;
    let truth = Pose4::new(0.3, -0.1, 0.0, 0.05);
    let scan = to_base_frame(&room_surface_points(), &truth);

    for execution in [ExecutionStrategy::Serial, ExecutionStrategy::Parallel] {
        let solver = PoseSolver::new(SolverConfig::default().with_execution(execution))?;
        let result = solver.solve(&scan, Pose4::IDENTITY, Attitude::LEVEL, &field);

        assert!(result.converged, "status: {:?}", result.status);
        assert_eq!(result.status, RegistrationStatus::Converged);
        assert_eq!(result.valid_point_count, scan.len());
        assert!(result.final_cost < result.initial_cost);
        assert_pose_near(&result.pose, &truth, 0.01, 0.01);
    }
    Ok(())
}

#[test]
fn test_converged_solve_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let field = room_field()?;
    let truth = Pose4::new(0.3, -0.1, 0.0, 0.05);
    let scan = to_base_frame(&room_surface_points(), &truth);
    let solver =
        PoseSolver::new(SolverConfig::default().with_execution(ExecutionStrategy::Serial))?;

    let first = solver.solve(&scan, Pose4::IDENTITY, Attitude::LEVEL, &field);
    let second = solver.solve(&scan, first.pose, Attitude::LEVEL, &field);

    assert!(first.converged);
    assert!(!second.status.is_failure());
    assert_pose_near(&second.pose, &first.pose, 1e-4, 1e-4);
    assert!(second.final_cost <= second.initial_cost);
    Ok(())
}

#[test]
fn test_cost_is_non_increasing() -> Result<(), Box<dyn std::error::Error>> {
    let field = room_field()?;
    let truth = Pose4::new(-0.25, 0.2, 0.05, -0.08);
    let scan = to_base_frame(&room_surface_points(), &truth);

    let mut previous = f64::INFINITY;
    for max_iterations in 1..=8 {
        let solver = PoseSolver::new(
            SolverConfig::default()
                .with_max_iterations(max_iterations)
                .with_execution(ExecutionStrategy::Serial),
        )?;
        let result = solver.solve(&scan, Pose4::IDENTITY, Attitude::LEVEL, &field);
        assert!(result.final_cost <= result.initial_cost);
        assert!(
            result.final_cost <= previous,
            "cost increased after {} iterations: {} > {}",
            max_iterations,
            result.final_cost,
            previous
        );
        previous = result.final_cost;
    }
    Ok(())
}

#[test]
fn test_half_of_the_points_out_of_bounds() -> Result<(), Box<dyn std::error::Error>> {
    let field = room_field()?;
    let truth = Pose4::new(0.2, 0.1, 0.0, 0.03);
    let inside = to_base_frame(&room_surface_points(), &truth);
    let num_inside = inside.len();

    let mut scan = inside;
    scan.extend((0..num_inside).map(|i| [1000.0 + i as f64, 0.0, 0.0]));

    let result = PoseSolver::default().solve(&scan, Pose4::IDENTITY, Attitude::LEVEL, &field);

    assert!(result.converged, "status: {:?}", result.status);
    assert_eq!(result.valid_point_count, num_inside);
    assert_pose_near(&result.pose, &truth, 0.01, 0.01);
    Ok(())
}

#[test]
fn test_tilted_scan() -> Result<(), Box<dyn std::error::Error>> {
    let field = room_field()?;
    let truth = Pose4::new(0.15, -0.2, 0.0, 0.04);
    let attitude = Attitude::new(0.03, -0.02);

    // undo the tilt so that the solver's compensation restores the level scan
    let level = to_base_frame(&room_surface_points(), &truth);
    let untilt = dfloc_3d::transforms::tilt_rotation(&attitude).transpose();
    let scan = level
        .iter()
        .map(|p| (untilt * DVec3::from_array(*p)).to_array())
        .collect::<Vec<_>>();

    let result = PoseSolver::default().solve(&scan, Pose4::IDENTITY, attitude, &field);
    assert!(!result.status.is_failure());
    assert_pose_near(&result.pose, &truth, 0.01, 0.01);
    Ok(())
}

#[test]
fn test_cauchy_loss_with_outliers() -> Result<(), Box<dyn std::error::Error>> {
    let field = room_field()?;
    let truth = Pose4::new(0.2, -0.15, 0.0, 0.02);
    let mut scan = to_base_frame(&room_surface_points(), &truth);

    // clutter in the middle of the room
    scan.extend((0..60).map(|i| [2.5 + 0.01 * i as f64, 2.0, 1.5]));

    let config = SolverConfig::default().with_loss(LossFunction::Cauchy { scale: 0.1 });
    let solver = PoseSolver::new(config)?;
    let result = solver.solve(&scan, Pose4::IDENTITY, Attitude::LEVEL, &field);
    assert!(!result.status.is_failure());
    assert_pose_near(&result.pose, &truth, 0.02, 0.01);
    Ok(())
}

#[test]
fn test_aligner_shares_field_between_threads() -> Result<(), Box<dyn std::error::Error>> {
    let field = Arc::new(room_field()?);
    let aligner = Arc::new(DistanceFieldAligner::new(PoseSolver::default(), field));
    let truth = Pose4::new(0.1, 0.1, 0.0, -0.02);
    let scan = Arc::new(to_base_frame(&room_surface_points(), &truth));

    let handles = (0..4)
        .map(|_| {
            let aligner = Arc::clone(&aligner);
            let scan = Arc::clone(&scan);
            std::thread::spawn(move || aligner.register(&scan, Pose4::IDENTITY, Attitude::LEVEL))
        })
        .collect::<Vec<_>>();

    for handle in handles {
        let Ok(result) = handle.join() else {
            panic!("registration thread panicked");
        };
        assert_pose_near(&result.pose, &truth, 0.01, 0.01);
    }
    Ok(())
}
