use argh::FromArgs;
use glam::{DAffine3, DVec3};
use std::path::PathBuf;
use std::sync::Arc;

use dfloc::d3::io::pcd::read_pcd;
use dfloc::d3::pointcloud::PointCloud;
use dfloc::d3::pose::Pose4;
use dfloc::grid::{DistanceField, MapInput};
use dfloc::localizer::{AlignMethod, Localizer, LocalizerConfig, Strategy};

#[derive(FromArgs)]
/// Localize a scan against a point cloud map
struct Args {
    /// path to the map point cloud
    #[argh(option)]
    map: PathBuf,

    /// path to the scan point cloud, in the base frame
    #[argh(option)]
    scan: PathBuf,

    /// path to a JSON localizer configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// alignment method: dll, ndt or icp
    #[argh(option)]
    method: Option<AlignMethod>,

    /// resolution of the distance field in meters
    #[argh(option, default = "0.05")]
    resolution: f64,

    /// margin around the map bounds in meters
    #[argh(option, default = "1.0")]
    margin: f64,

    /// load the distance field from this file instead of computing it
    #[argh(option)]
    load_grid: Option<PathBuf>,

    /// save the computed distance field to this file
    #[argh(option)]
    save_grid: Option<PathBuf>,

    /// initial x position
    #[argh(option, default = "0.0")]
    x: f64,

    /// initial y position
    #[argh(option, default = "0.0")]
    y: f64,

    /// initial z position
    #[argh(option, default = "0.0")]
    z: f64,

    /// initial heading in radians
    #[argh(option, default = "0.0")]
    yaw: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => LocalizerConfig::from_json_file(path)?,
        None => LocalizerConfig::default(),
    };
    if let Some(method) = args.method {
        config.align_method = method;
    }
    config.initial_pose = Some(Pose4::new(args.x, args.y, args.z, args.yaw));
    println!("Configuration: {}", serde_json::to_string_pretty(&config)?);

    let map = read_pcd(&args.map)?;
    println!("Map: #{} points", map.len());

    let scan = read_pcd(&args.scan)?;
    println!("Scan: #{} points", scan.len());

    let field = match config.align_method {
        AlignMethod::DistanceField => Some(Arc::new(distance_field(&args, &map)?)),
        _ => None,
    };

    let strategy = Strategy::from_config(&config, field, Some(map.points()))?;
    let mut localizer = Localizer::new(config, strategy)?;

    let odom = DAffine3::IDENTITY;
    localizer.check_update(&odom, 0.0);

    let start = std::time::Instant::now();
    let result = localizer.process_scan(scan.points(), &odom)?;
    log::info!("Registration took {:?}", start.elapsed());

    match result {
        Some(result) => {
            println!("Registration result: {:?}", result);
            if let Some(pose) = localizer.pose() {
                println!(
                    "Pose x: {:.3} y: {:.3} z: {:.3} yaw: {:.3}",
                    pose.x, pose.y, pose.z, pose.yaw
                );
            }
        }
        None => println!("No update was performed"),
    }

    Ok(())
}

fn distance_field(
    args: &Args,
    map: &PointCloud,
) -> Result<DistanceField, Box<dyn std::error::Error>> {
    if let Some(path) = &args.load_grid {
        let field = DistanceField::load(path)?;
        println!("Loaded distance field with dims {:?}", field.dims());
        return Ok(field);
    }

    if !(args.resolution > 0.0) {
        return Err(format!("invalid resolution: {}", args.resolution).into());
    }

    let (min, max) = (map.get_min_bound(), map.get_max_bound());
    let origin = min - DVec3::splat(args.margin);
    let extent = (max + DVec3::splat(args.margin)) - origin;
    let dims = [
        (extent.x / args.resolution).ceil() as usize + 1,
        (extent.y / args.resolution).ceil() as usize + 1,
        (extent.z / args.resolution).ceil() as usize + 1,
    ];

    let start = std::time::Instant::now();
    let field =
        DistanceField::build(MapInput::Points(map.points()), origin, args.resolution, dims)?;
    println!(
        "Computed distance field with dims {:?} in {:?}",
        dims,
        start.elapsed()
    );

    if let Some(path) = &args.save_grid {
        field.save(path)?;
        println!("Saved distance field to {}", path.display());
    }

    Ok(field)
}
