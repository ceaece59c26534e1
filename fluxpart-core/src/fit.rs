//! Bounded nonlinear least-squares fit of the respiration model.
//!
//! The solver is a projected Levenberg-Marquardt iteration: every trial point
//! is clamped into the parameter box, and parameters pinned against a bound
//! with the gradient pushing outward are held fixed for that iteration.
//! Convergence is declared when the predicted Gauss-Newton reduction of the
//! cost, or the parameter step, falls below the relative tolerance.
//!
//! Standard errors come from the scaled covariance of the fit,
//! $$ \mathrm{cov} = (J^T J)^{-1} \frac{\sum r_i^2}{n - k} $$
//! evaluated at the optimum, where $k$ counts the free parameters only.

use crate::errors::FitError;
use crate::parameters::{FitParameters, ParameterBounds};
use crate::respiration::{ecosystem_respiration, ecosystem_respiration_gradient};
use crate::timeseries::FloatValue;
use nalgebra::{DMatrix, DVector};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fmt;

const INITIAL_DAMPING: FloatValue = 1e-3;
const MIN_DAMPING: FloatValue = 1e-12;
const MAX_DAMPING: FloatValue = 1e16;
const DIAGONAL_FLOOR: FloatValue = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterName {
    /// $E_0$
    Sensitivity,
    /// $R_{10}$
    ReferenceRate,
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterName::Sensitivity => write!(f, "sensitivity"),
            ParameterName::ReferenceRate => write!(f, "reference_rate"),
        }
    }
}

/// Fitted value of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub value: FloatValue,
    /// `None` for held parameters, or when the covariance could not be estimated
    pub stderr: Option<FloatValue>,
    /// Whether the parameter varied in the fit
    pub free: bool,
}

impl ParameterEstimate {
    pub fn free(value: FloatValue, stderr: Option<FloatValue>) -> Self {
        Self {
            value,
            stderr,
            free: true,
        }
    }

    pub fn fixed(value: FloatValue) -> Self {
        Self {
            value,
            stderr: None,
            free: false,
        }
    }
}

/// A converged fit of the respiration model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespirationFit {
    pub sensitivity: ParameterEstimate,
    pub reference_rate: ParameterEstimate,
    /// Complete observations used in the fit
    pub n_observations: usize,
    pub sum_squared_residuals: FloatValue,
    pub evaluations: usize,
}

impl RespirationFit {
    /// Parameters in the order they are checked.
    pub fn parameters(&self) -> [(ParameterName, &ParameterEstimate); 2] {
        [
            (ParameterName::ReferenceRate, &self.reference_rate),
            (ParameterName::Sensitivity, &self.sensitivity),
        ]
    }
}

/// Fits the respiration model to a window of observations.
///
/// Implementations must drop observations with a missing temperature or flux
/// before fitting and must keep the sensitivity at `fixed_sensitivity` when it
/// is given.
pub trait RespirationFitter: Sync {
    fn fit(
        &self,
        flux: ArrayView1<FloatValue>,
        temperature: ArrayView1<FloatValue>,
        fixed_sensitivity: Option<FloatValue>,
    ) -> Result<RespirationFit, FitError>;
}

/// Projected Levenberg-Marquardt fitter.
#[derive(Debug, Clone, Default)]
pub struct LeastSquaresFitter {
    parameters: FitParameters,
}

impl LeastSquaresFitter {
    pub fn from_parameters(parameters: FitParameters) -> Self {
        Self { parameters }
    }
}

impl RespirationFitter for LeastSquaresFitter {
    fn fit(
        &self,
        flux: ArrayView1<FloatValue>,
        temperature: ArrayView1<FloatValue>,
        fixed_sensitivity: Option<FloatValue>,
    ) -> Result<RespirationFit, FitError> {
        let (temperature, flux): (Vec<FloatValue>, Vec<FloatValue>) = temperature
            .iter()
            .zip(flux.iter())
            .filter(|(t, f)| t.is_finite() && f.is_finite())
            .map(|(t, f)| (*t, *f))
            .unzip();

        let problem = Problem::new(&temperature, &flux, fixed_sensitivity, &self.parameters);
        if problem.n_observations() <= problem.n_free() {
            return Err(FitError::TooFewObservations {
                n_observations: problem.n_observations(),
                n_parameters: problem.n_free(),
            });
        }

        let solution = problem.solve(self.parameters.max_evaluations, self.parameters.tolerance)?;
        Ok(problem.summarise(solution))
    }
}

struct Solution {
    parameters: DVector<FloatValue>,
    cost: FloatValue,
    evaluations: usize,
}

/// Free parameters are packed as `[reference_rate, sensitivity?]`.
struct Problem<'a> {
    temperature: &'a [FloatValue],
    flux: &'a [FloatValue],
    fixed_sensitivity: Option<FloatValue>,
    bounds: Vec<ParameterBounds>,
    initial: Vec<FloatValue>,
}

impl<'a> Problem<'a> {
    fn new(
        temperature: &'a [FloatValue],
        flux: &'a [FloatValue],
        fixed_sensitivity: Option<FloatValue>,
        parameters: &FitParameters,
    ) -> Self {
        let mut bounds = vec![parameters.reference_rate_bounds];
        let mut initial = vec![parameters
            .reference_rate_bounds
            .clamp(parameters.reference_rate_guess)];
        if fixed_sensitivity.is_none() {
            bounds.push(parameters.sensitivity_bounds);
            initial.push(
                parameters
                    .sensitivity_bounds
                    .clamp(parameters.sensitivity_guess),
            );
        }
        Self {
            temperature,
            flux,
            fixed_sensitivity,
            bounds,
            initial,
        }
    }

    fn n_observations(&self) -> usize {
        self.flux.len()
    }

    fn n_free(&self) -> usize {
        self.bounds.len()
    }

    /// `(sensitivity, reference_rate)`
    fn unpack(&self, p: &DVector<FloatValue>) -> (FloatValue, FloatValue) {
        (self.fixed_sensitivity.unwrap_or_else(|| p[1]), p[0])
    }

    fn residuals(&self, p: &DVector<FloatValue>) -> DVector<FloatValue> {
        let (sensitivity, reference_rate) = self.unpack(p);
        DVector::from_iterator(
            self.n_observations(),
            self.temperature
                .iter()
                .zip(self.flux)
                .map(|(&t, &y)| ecosystem_respiration(t, sensitivity, reference_rate) - y),
        )
    }

    fn jacobian(&self, p: &DVector<FloatValue>) -> DMatrix<FloatValue> {
        let (sensitivity, reference_rate) = self.unpack(p);
        let mut jacobian = DMatrix::zeros(self.n_observations(), self.n_free());
        for (i, &t) in self.temperature.iter().enumerate() {
            let (d_sensitivity, d_reference_rate) =
                ecosystem_respiration_gradient(t, sensitivity, reference_rate);
            jacobian[(i, 0)] = d_reference_rate;
            if self.n_free() > 1 {
                jacobian[(i, 1)] = d_sensitivity;
            }
        }
        jacobian
    }

    fn solve(&self, max_evaluations: usize, tolerance: FloatValue) -> Result<Solution, FitError> {
        let n_free = self.n_free();
        let mut p = DVector::from_vec(self.initial.clone());
        let mut residuals = self.residuals(&p);
        let mut evaluations = 1;
        let mut cost = residuals.norm_squared();
        if !cost.is_finite() {
            return Err(FitError::NonFiniteResiduals);
        }
        let mut damping = INITIAL_DAMPING;

        'outer: loop {
            if cost == 0.0 {
                break;
            }
            let jacobian = self.jacobian(&p);
            let gradient = jacobian.tr_mul(&residuals);
            let hessian = jacobian.tr_mul(&jacobian);

            // Parameters pinned against a bound by the descent direction stay put
            let active: Vec<usize> = (0..n_free)
                .filter(|&i| {
                    let bounds = &self.bounds[i];
                    !((p[i] <= bounds.min && gradient[i] > 0.0)
                        || (p[i] >= bounds.max && gradient[i] < 0.0))
                })
                .collect();
            if active.is_empty() {
                break;
            }
            let m = active.len();
            let g = DVector::from_iterator(m, active.iter().map(|&i| gradient[i]));
            let h = DMatrix::from_fn(m, m, |a, b| hessian[(active[a], active[b])]);

            if let Some(cholesky) = h.clone().cholesky() {
                let predicted_reduction = g.dot(&cholesky.solve(&g));
                if predicted_reduction <= tolerance * cost {
                    break;
                }
            }

            loop {
                if evaluations >= max_evaluations {
                    return Err(FitError::DidNotConverge { evaluations });
                }

                let mut damped = h.clone();
                for a in 0..m {
                    damped[(a, a)] += damping * h[(a, a)].max(DIAGONAL_FLOOR);
                }
                let step = match damped.cholesky() {
                    Some(cholesky) => -cholesky.solve(&g),
                    None => {
                        damping *= 10.0;
                        if damping > MAX_DAMPING {
                            return Err(FitError::DidNotConverge { evaluations });
                        }
                        continue;
                    }
                };

                let mut candidate = p.clone();
                for (a, &i) in active.iter().enumerate() {
                    candidate[i] = self.bounds[i].clamp(p[i] + step[a]);
                }
                if (0..n_free).all(|i| (candidate[i] - p[i]).abs() <= tolerance * (p[i].abs() + tolerance)) {
                    break 'outer;
                }

                let candidate_residuals = self.residuals(&candidate);
                evaluations += 1;
                let candidate_cost = candidate_residuals.norm_squared();
                if candidate_cost.is_finite() && candidate_cost < cost {
                    p = candidate;
                    residuals = candidate_residuals;
                    cost = candidate_cost;
                    damping = (damping / 10.0).max(MIN_DAMPING);
                    continue 'outer;
                }

                damping *= 10.0;
                if damping > MAX_DAMPING {
                    return Err(FitError::DidNotConverge { evaluations });
                }
            }
        }

        Ok(Solution {
            parameters: p,
            cost,
            evaluations,
        })
    }

    fn summarise(&self, solution: Solution) -> RespirationFit {
        let n_free = self.n_free();
        let dof = (self.n_observations() - n_free) as FloatValue;
        let jacobian = self.jacobian(&solution.parameters);
        let covariance = jacobian
            .tr_mul(&jacobian)
            .try_inverse()
            .map(|inverse| inverse * (solution.cost / dof));
        let stderr = |i: usize| {
            covariance
                .as_ref()
                .map(|c| c[(i, i)])
                .filter(|variance| variance.is_finite() && *variance >= 0.0)
                .map(FloatValue::sqrt)
        };

        let (sensitivity, reference_rate) = self.unpack(&solution.parameters);
        RespirationFit {
            sensitivity: match self.fixed_sensitivity {
                Some(value) => ParameterEstimate::fixed(value),
                None => ParameterEstimate::free(sensitivity, stderr(1)),
            },
            reference_rate: ParameterEstimate::free(reference_rate, stderr(0)),
            n_observations: self.n_observations(),
            sum_squared_residuals: solution.cost,
            evaluations: solution.evaluations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array1;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn gaussian(rng: &mut StdRng) -> FloatValue {
        let u1: FloatValue = 1.0 - rng.random::<FloatValue>();
        let u2: FloatValue = rng.random();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    fn synthetic(
        n: usize,
        sensitivity: FloatValue,
        reference_rate: FloatValue,
        noise: FloatValue,
    ) -> (Array1<FloatValue>, Array1<FloatValue>) {
        let mut rng = StdRng::seed_from_u64(7);
        let temperature = Array1::linspace(278.0, 293.0, n);
        let flux = temperature
            .mapv(|t| ecosystem_respiration(t, sensitivity, reference_rate))
            .mapv(|f| f + noise * gaussian(&mut rng));
        (flux, temperature)
    }

    #[test]
    fn recovers_both_parameters() {
        let (flux, temperature) = synthetic(40, 200.0, 0.3, 0.005);
        let fit = LeastSquaresFitter::default()
            .fit(flux.view(), temperature.view(), None)
            .unwrap();

        assert_relative_eq!(fit.sensitivity.value, 200.0, max_relative = 0.05);
        assert_relative_eq!(fit.reference_rate.value, 0.3, max_relative = 0.05);
        assert!(fit.sensitivity.free && fit.reference_rate.free);
        assert!(fit.sensitivity.stderr.unwrap() > 0.0);
        assert!(fit.reference_rate.stderr.unwrap() > 0.0);
        assert_eq!(fit.n_observations, 40);
    }

    #[test]
    fn exact_data_converges_to_truth() {
        let (flux, temperature) = synthetic(25, 150.0, 0.1, 0.0);
        let fit = LeastSquaresFitter::default()
            .fit(flux.view(), temperature.view(), None)
            .unwrap();

        assert_relative_eq!(fit.sensitivity.value, 150.0, max_relative = 1e-6);
        assert_relative_eq!(fit.reference_rate.value, 0.1, max_relative = 1e-6);
    }

    #[test]
    fn fixed_sensitivity_is_held() {
        let (flux, temperature) = synthetic(30, 200.0, 0.3, 0.005);
        let fit = LeastSquaresFitter::default()
            .fit(flux.view(), temperature.view(), Some(200.0))
            .unwrap();

        assert_eq!(fit.sensitivity, ParameterEstimate::fixed(200.0));
        assert_relative_eq!(fit.reference_rate.value, 0.3, max_relative = 0.02);
        assert!(fit.reference_rate.stderr.is_some());
    }

    #[test]
    fn missing_values_are_dropped() {
        let (mut flux, mut temperature) = synthetic(30, 200.0, 0.3, 0.0);
        flux[3] = FloatValue::NAN;
        temperature[10] = FloatValue::NAN;

        let fit = LeastSquaresFitter::default()
            .fit(flux.view(), temperature.view(), Some(200.0))
            .unwrap();
        assert_eq!(fit.n_observations, 28);
        assert_relative_eq!(fit.reference_rate.value, 0.3, max_relative = 1e-6);
    }

    #[test]
    fn bounds_are_honoured() {
        // Negative fluxes drive the reference rate towards zero
        let temperature = Array1::linspace(280.0, 290.0, 25);
        let flux = Array1::from_elem(25, -0.1);
        let fit = LeastSquaresFitter::default()
            .fit(flux.view(), temperature.view(), Some(200.0))
            .unwrap();

        assert_eq!(fit.reference_rate.value, 1e-7);
    }

    #[test]
    fn too_few_observations() {
        let temperature = Array1::from_vec(vec![280.0, 285.0]);
        let flux = Array1::from_vec(vec![0.2, 0.3]);
        let result = LeastSquaresFitter::default().fit(flux.view(), temperature.view(), None);
        assert_eq!(
            result.unwrap_err(),
            FitError::TooFewObservations {
                n_observations: 2,
                n_parameters: 2
            }
        );
    }

    #[test]
    fn evaluation_budget_is_enforced() {
        let (flux, temperature) = synthetic(40, 200.0, 0.3, 0.005);
        let fitter = LeastSquaresFitter::from_parameters(FitParameters {
            max_evaluations: 2,
            ..FitParameters::default()
        });
        let result = fitter.fit(flux.view(), temperature.view(), None);
        assert!(matches!(result, Err(FitError::DidNotConverge { .. })));
    }
}
