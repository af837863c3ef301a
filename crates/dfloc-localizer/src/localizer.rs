use dfloc_3d::ops::{filter_by_range, voxel_downsample};
use dfloc_3d::pose::{Attitude, Pose4};
use dfloc_3d::registration::{Registration, RegistrationResult};
use glam::DAffine3;

use crate::config::LocalizerConfig;
use crate::error::LocalizerError;
use crate::strategy::Strategy;

/// Tracks the map to odometry transform of a platform from LiDAR scans.
///
/// The odometry drifts; the localizer corrects it by registering scans
/// against the map whenever the platform moved or enough time elapsed.
///
/// The typical cycle is:
///
/// 1. [`Localizer::update_imu`] for every IMU sample, when enabled.
/// 2. [`Localizer::check_update`] for every odometry sample.
/// 3. [`Localizer::process_scan`] for every scan.
pub struct Localizer<R = Strategy> {
    config: LocalizerConfig,
    strategy: R,
    initialized: bool,
    pending_update: bool,
    // map <- odom
    global_tf: DAffine3,
    last_odom: DAffine3,
    last_update_time: Option<f64>,
    pending_time: Option<f64>,
    imu_attitude: Option<Attitude>,
}

impl<R: Registration> Localizer<R> {
    /// Create a localizer.
    ///
    /// When the configuration holds an initial pose, the localizer starts
    /// initialized at that pose with an identity odometry.
    pub fn new(config: LocalizerConfig, strategy: R) -> Result<Self, LocalizerError> {
        config.validate()?;
        let initial_pose = config.initial_pose;

        let mut localizer = Self {
            config,
            strategy,
            initialized: false,
            pending_update: false,
            global_tf: DAffine3::IDENTITY,
            last_odom: DAffine3::IDENTITY,
            last_update_time: None,
            pending_time: None,
            imu_attitude: None,
        };

        if let Some(pose) = initial_pose {
            localizer.set_initial_pose(pose, DAffine3::IDENTITY);
        }

        Ok(localizer)
    }

    /// The configuration.
    pub fn config(&self) -> &LocalizerConfig {
        &self.config
    }

    /// The registration strategy.
    pub fn strategy(&self) -> &R {
        &self.strategy
    }

    /// Whether an initial pose was set.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the next scan will be registered.
    pub fn has_pending_update(&self) -> bool {
        self.pending_update
    }

    /// Reset the localizer to a pose in the map frame.
    ///
    /// Roll and pitch are taken from the IMU when enabled, otherwise from the
    /// odometry. The configured z offset is added to the height.
    ///
    /// # Arguments
    ///
    /// * `pose` - The platform pose in the map frame.
    /// * `odom` - The odometry reading at the time of the pose.
    pub fn set_initial_pose(&mut self, pose: Pose4, odom: DAffine3) {
        let attitude = self.current_attitude(&odom);
        let pose = Pose4 {
            z: pose.z + self.config.initial_z_offset,
            ..pose
        };

        log::info!(
            "Initial pose x: {:.3} y: {:.3} z: {:.3} yaw: {:.3}",
            pose.x,
            pose.y,
            pose.z,
            pose.yaw
        );

        self.global_tf = pose.to_rigid(attitude) * odom.inverse();
        self.last_odom = odom;
        self.last_update_time = None;
        self.pending_time = None;
        self.pending_update = false;
        self.initialized = true;
    }

    /// Store the roll and pitch measured by the IMU.
    ///
    /// A reading with a non finite angle is discarded as a whole and the
    /// previous attitude is kept. Returns whether the reading was stored, which
    /// is never the case when the IMU is disabled in the configuration.
    pub fn update_imu(&mut self, roll: f64, pitch: f64) -> bool {
        if !self.config.use_imu {
            return false;
        }

        let attitude = Attitude::new(roll, pitch);
        if !attitude.is_finite() {
            log::debug!("Discarding IMU reading roll: {roll} pitch: {pitch}");
            return false;
        }

        self.imu_attitude = Some(attitude);
        true
    }

    /// Decide whether the next scan must be registered.
    ///
    /// An update is requested when the odometry moved more than
    /// `update_min_d`, turned more than `update_min_a`, or when more than
    /// `update_min_time` seconds passed since the last update.
    ///
    /// # Arguments
    ///
    /// * `odom` - The current odometry reading.
    /// * `timestamp` - The time of the reading in seconds.
    pub fn check_update(&mut self, odom: &DAffine3, timestamp: f64) -> bool {
        if !self.initialized {
            return false;
        }

        if self.pending_update {
            return true;
        }

        let (delta, _) = Pose4::from_rigid(&(self.last_odom.inverse() * *odom));
        let moved = delta.translation().length() > self.config.update_min_d
            || delta.yaw.abs() > self.config.update_min_a;
        let elapsed = match self.last_update_time {
            Some(last) => timestamp - last > self.config.update_min_time,
            None => true,
        };

        if moved || elapsed {
            log::debug!(
                "Update requested at {timestamp:.3}: moved {:.3} m, {:.3} rad",
                delta.translation().length(),
                delta.yaw
            );
            self.pending_update = true;
            self.pending_time = Some(timestamp);
        }

        self.pending_update
    }

    /// Register a scan when an update is pending.
    ///
    /// Returns `None` when the localizer is not initialized or no update is
    /// pending. Failed registrations keep the previous global transform.
    ///
    /// # Arguments
    ///
    /// * `points` - The scan in the base frame of the platform.
    /// * `odom` - The odometry reading at the time of the scan.
    pub fn process_scan(
        &mut self,
        points: &[[f64; 3]],
        odom: &DAffine3,
    ) -> Result<Option<RegistrationResult>, LocalizerError> {
        if !self.initialized || !self.pending_update {
            return Ok(None);
        }

        let guess_tf = self.global_tf * *odom;
        let (guess, _) = Pose4::from_rigid(&guess_tf);
        let attitude = self.current_attitude(&guess_tf);

        let mut scan = filter_by_range(points, self.config.min_range, self.config.max_range)?;
        if let Some(voxel_size) = self.config.voxel_size {
            scan = voxel_downsample(&scan, voxel_size)?;
        }

        log::debug!(
            "Registering {} of {} points from x: {:.3} y: {:.3} z: {:.3} yaw: {:.3}",
            scan.len(),
            points.len(),
            guess.x,
            guess.y,
            guess.z,
            guess.yaw
        );

        let result = self.strategy.register(&scan, guess, attitude);

        self.pending_update = false;
        self.last_update_time = self.pending_time.take();

        if result.status.is_failure() {
            log::warn!("Registration failed ({:?}), keeping the previous estimate", result.status);
            return Ok(Some(result));
        }

        if result.status.is_low_confidence() {
            log::warn!(
                "Low confidence registration with {} valid points",
                result.valid_point_count
            );
        }

        self.global_tf = result.pose.to_rigid(attitude) * odom.inverse();
        self.last_odom = *odom;

        Ok(Some(result))
    }

    /// The map to odometry transform.
    pub fn global_transform(&self) -> DAffine3 {
        self.global_tf
    }

    /// The platform pose in the map frame at the last update.
    pub fn pose(&self) -> Option<Pose4> {
        self.initialized
            .then(|| Pose4::from_rigid(&(self.global_tf * self.last_odom)).0)
    }

    fn current_attitude(&self, transform: &DAffine3) -> Attitude {
        match self.imu_attitude {
            Some(attitude) if self.config.use_imu => attitude,
            _ => Pose4::from_rigid(transform).1,
        }
    }
}
