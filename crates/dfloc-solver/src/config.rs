use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// Controls how the per point contributions are accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionStrategy {
    /// Run sequentially on the current thread.
    ///
    /// Useful for small scans, debugging, or reproducible summation order.
    Serial,

    /// Use the global Rayon thread pool with a fold and reduce over the points.
    #[default]
    Parallel,
}

/// Loss applied to the point distances.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LossFunction {
    /// Plain sum of squared distances.
    #[default]
    Squared,
    /// Cauchy loss `c^2 ln(1 + r^2 / c^2)`, applied through reweighting.
    Cauchy {
        /// The distance at which the loss starts to flatten, in meters.
        scale: f64,
    },
}

impl LossFunction {
    /// The loss of a squared residual and its derivative, used as the point weight.
    #[inline]
    pub fn evaluate(&self, squared_residual: f64) -> (f64, f64) {
        match *self {
            LossFunction::Squared => (squared_residual, 1.0),
            LossFunction::Cauchy { scale } => {
                let c2 = scale * scale;
                let s = 1.0 + squared_residual / c2;
                (c2 * s.ln(), 1.0 / s)
            }
        }
    }
}

/// Parameters of the pose solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum number of iterations, accepted or rejected.
    pub max_iterations: usize,
    /// The solve stops when the norm of an accepted step is below this value.
    pub convergence_threshold: f64,
    /// Minimum number of points inside the field for a pose to be evaluated.
    pub min_valid_points: usize,
    /// Maximum norm of the translation part of a step in meters.
    pub max_translation_step: f64,
    /// Maximum magnitude of the heading part of a step in radians.
    pub max_yaw_step: f64,
    /// Initial damping factor (lambda).
    pub initial_lambda: f64,
    /// Factor by which lambda shrinks after an accepted step and grows after a rejected one.
    pub lambda_factor: f64,
    /// Lower bound of lambda.
    pub min_lambda: f64,
    /// Upper bound of lambda.
    pub max_lambda: f64,
    /// Jacobi scaled determinant of `J^T J` below which the problem is singular.
    pub singular_threshold: f64,
    /// Loss applied to the distances.
    pub loss: LossFunction,
    /// How the normal equations are accumulated.
    pub execution: ExecutionStrategy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            convergence_threshold: 1e-5,
            min_valid_points: 10,
            max_translation_step: 0.5,
            max_yaw_step: 0.2,
            initial_lambda: 1e-3,
            lambda_factor: 10.0,
            min_lambda: 1e-9,
            max_lambda: 1e7,
            singular_threshold: 1e-10,
            loss: LossFunction::Squared,
            execution: ExecutionStrategy::Parallel,
        }
    }
}

impl SolverConfig {
    /// Create default solver parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence threshold on the step norm.
    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Set the minimum number of valid points.
    pub fn with_min_valid_points(mut self, min_valid_points: usize) -> Self {
        self.min_valid_points = min_valid_points;
        self
    }

    /// Set the translation and heading step caps.
    pub fn with_max_step(mut self, translation: f64, yaw: f64) -> Self {
        self.max_translation_step = translation;
        self.max_yaw_step = yaw;
        self
    }

    /// Set initial lambda.
    pub fn with_initial_lambda(mut self, lambda: f64) -> Self {
        self.initial_lambda = lambda;
        self
    }

    /// Set the loss function.
    pub fn with_loss(mut self, loss: LossFunction) -> Self {
        self.loss = loss;
        self
    }

    /// Set the execution strategy.
    pub fn with_execution(mut self, execution: ExecutionStrategy) -> Self {
        self.execution = execution;
        self
    }

    /// Check that the parameters are in their valid ranges.
    pub fn validate(&self) -> Result<(), SolverError> {
        let non_negative = [
            ("convergence_threshold", self.convergence_threshold),
            ("max_translation_step", self.max_translation_step),
            ("max_yaw_step", self.max_yaw_step),
            ("singular_threshold", self.singular_threshold),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(SolverError::InvalidConfig(format!(
                    "{name} must be finite and non negative, got {value}"
                )));
            }
        }

        if !(self.lambda_factor > 1.0 && self.lambda_factor.is_finite()) {
            return Err(SolverError::InvalidConfig(format!(
                "lambda_factor must be greater than 1, got {}",
                self.lambda_factor
            )));
        }

        if !(self.min_lambda > 0.0
            && self.min_lambda <= self.initial_lambda
            && self.initial_lambda <= self.max_lambda
            && self.max_lambda.is_finite())
        {
            return Err(SolverError::InvalidConfig(format!(
                "lambdas must satisfy 0 < min <= initial <= max, got {} {} {}",
                self.min_lambda, self.initial_lambda, self.max_lambda
            )));
        }

        if let LossFunction::Cauchy { scale } = self.loss {
            if !(scale > 0.0 && scale.is_finite()) {
                return Err(SolverError::InvalidConfig(format!(
                    "Cauchy scale must be positive, got {scale}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cauchy_loss() {
        let loss = LossFunction::Cauchy { scale: 0.5 };
        let (rho, weight) = loss.evaluate(0.0);
        assert_relative_eq!(rho, 0.0);
        assert_relative_eq!(weight, 1.0);

        // large residuals are down weighted
        let (rho, weight) = loss.evaluate(1.0);
        assert_relative_eq!(rho, 0.25 * 5.0f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(weight, 0.2, epsilon = 1e-12);
        assert_eq!(LossFunction::Squared.evaluate(4.0), (4.0, 1.0));
    }

    #[test]
    fn test_builders() {
        let config = SolverConfig::new()
            .with_max_iterations(3)
            .with_max_step(0.1, 0.05)
            .with_execution(ExecutionStrategy::Serial);
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.max_translation_step, 0.1);
        assert_eq!(config.max_yaw_step, 0.05);
        assert_eq!(config.execution, ExecutionStrategy::Serial);
        assert_eq!(config.min_valid_points, 10);
    }

    #[test]
    fn test_validate() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(SolverConfig::default().validate(), Ok(()));

        let config: SolverConfig = serde_json::from_str(r#"{ "max_yaw_step": -0.1 }"#)?;
        assert!(matches!(config.validate(), Err(SolverError::InvalidConfig(_))));

        let config = SolverConfig::default().with_max_step(f64::NAN, 0.2);
        assert!(config.validate().is_err());

        let config = SolverConfig::default().with_loss(LossFunction::Cauchy { scale: 0.0 });
        assert!(config.validate().is_err());

        let config = SolverConfig {
            lambda_factor: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SolverConfig::default().with_initial_lambda(1e8);
        assert!(config.validate().is_err());
        Ok(())
    }
}
