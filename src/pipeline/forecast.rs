//! Short-term consumption forecast.
//!
//! Fits `energy ~ poly3(elapsed_seconds)` with every polynomial term min-max
//! scaled to `[0, 1]` over the training range, then solves ordinary least
//! squares with an intercept. The normal equations are solved through a
//! pseudo-inverse, so constant or collinear inputs produce a poor fit rather
//! than an error.

use serde::Serialize;

use super::event::Event;

pub const POLYNOMIAL_DEGREE: usize = 3;

/// Relative cut-off below which Gram eigenvalues are treated as zero.
const EIGEN_TOLERANCE: f64 = 1e-12;
const MAX_JACOBI_SWEEPS: usize = 64;

type Vector = [f64; POLYNOMIAL_DEGREE];
type Matrix = [[f64; POLYNOMIAL_DEGREE]; POLYNOMIAL_DEGREE];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub elapsed_seconds: f64,
    pub predicted_energy_wh: f64,
}

/// Goodness of fit, measured by re-predicting the training inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitMetrics {
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub degree: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub points: Vec<ForecastPoint>,
    pub metrics: FitMetrics,
}

/// A fitted polynomial regression pipeline.
#[derive(Debug, Clone)]
pub struct PolynomialRegression {
    mins: Vector,
    ranges: Vector,
    weights: Vector,
    intercept: f64,
}

impl PolynomialRegression {
    pub fn fit(x: &[f64], y: &[f64]) -> Self {
        let n = x.len().min(y.len());
        if n == 0 {
            return Self {
                mins: [0.0; POLYNOMIAL_DEGREE],
                ranges: [1.0; POLYNOMIAL_DEGREE],
                weights: [0.0; POLYNOMIAL_DEGREE],
                intercept: 0.0,
            };
        }

        let raw: Vec<Vector> = x[..n].iter().map(|&t| powers(t)).collect();

        let mut mins = [f64::INFINITY; POLYNOMIAL_DEGREE];
        let mut maxs = [f64::NEG_INFINITY; POLYNOMIAL_DEGREE];
        for row in &raw {
            for j in 0..POLYNOMIAL_DEGREE {
                mins[j] = mins[j].min(row[j]);
                maxs[j] = maxs[j].max(row[j]);
            }
        }
        let mut ranges = [1.0; POLYNOMIAL_DEGREE];
        for j in 0..POLYNOMIAL_DEGREE {
            let range = maxs[j] - mins[j];
            // A constant column keeps unit scale and maps to 0.
            if range > 0.0 && range.is_finite() {
                ranges[j] = range;
            }
        }

        let scaled: Vec<Vector> = raw
            .iter()
            .map(|row| scale(row, &mins, &ranges))
            .collect();

        let mut feature_means = [0.0; POLYNOMIAL_DEGREE];
        for row in &scaled {
            for j in 0..POLYNOMIAL_DEGREE {
                feature_means[j] += row[j];
            }
        }
        for mean in &mut feature_means {
            *mean /= n as f64;
        }
        let target_mean = y[..n].iter().sum::<f64>() / n as f64;

        // Centered normal equations: G w = b.
        let mut gram = [[0.0; POLYNOMIAL_DEGREE]; POLYNOMIAL_DEGREE];
        let mut moment = [0.0; POLYNOMIAL_DEGREE];
        for (row, &target) in scaled.iter().zip(&y[..n]) {
            let centered = sub(row, &feature_means);
            let dy = target - target_mean;
            for i in 0..POLYNOMIAL_DEGREE {
                moment[i] += centered[i] * dy;
                for j in 0..POLYNOMIAL_DEGREE {
                    gram[i][j] += centered[i] * centered[j];
                }
            }
        }

        let weights = pseudo_inverse_solve(gram, &moment);
        let intercept = target_mean - dot(&weights, &feature_means);

        Self {
            mins,
            ranges,
            weights,
            intercept,
        }
    }

    pub fn predict(&self, x: f64) -> f64 {
        let features = scale(&powers(x), &self.mins, &self.ranges);
        dot(&self.weights, &features) + self.intercept
    }

    /// R², RMSE and MAE of this model against observed data.
    pub fn evaluate(&self, x: &[f64], y: &[f64]) -> FitMetrics {
        let n = x.len().min(y.len());
        if n == 0 {
            return FitMetrics {
                r2: 0.0,
                rmse: 0.0,
                mae: 0.0,
                degree: POLYNOMIAL_DEGREE,
            };
        }

        let target_mean = y[..n].iter().sum::<f64>() / n as f64;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        let mut abs_sum = 0.0;
        for (&t, &observed) in x[..n].iter().zip(&y[..n]) {
            let residual = observed - self.predict(t);
            ss_res += residual * residual;
            abs_sum += residual.abs();
            ss_tot += (observed - target_mean).powi(2);
        }

        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res <= f64::EPSILON {
            1.0
        } else {
            0.0
        };

        FitMetrics {
            r2,
            rmse: (ss_res / n as f64).sqrt(),
            mae: abs_sum / n as f64,
            degree: POLYNOMIAL_DEGREE,
        }
    }
}

/// Sample points over the half-open window `[t_last, t_last + horizon)`.
pub fn prediction_grid(t_last: f64, horizon_seconds: u32, step_seconds: u32) -> Vec<f64> {
    if step_seconds == 0 {
        return Vec::new();
    }
    let count = horizon_seconds.div_ceil(step_seconds);
    (0..count)
        .map(|k| t_last + f64::from(k * step_seconds))
        .collect()
}

/// Fit on the whole series and predict forward from its last elapsed time.
pub fn forecast(events: &[Event], horizon_seconds: u32, step_seconds: u32) -> ForecastResult {
    let x: Vec<f64> = events.iter().map(|e| e.elapsed_seconds).collect();
    let y: Vec<f64> = events.iter().map(|e| e.event_energy_wh).collect();

    let model = PolynomialRegression::fit(&x, &y);
    let metrics = model.evaluate(&x, &y);

    let t_last = x.last().copied().unwrap_or(0.0);
    let points = prediction_grid(t_last, horizon_seconds, step_seconds)
        .into_iter()
        .map(|t| ForecastPoint {
            elapsed_seconds: t,
            predicted_energy_wh: model.predict(t),
        })
        .collect();

    ForecastResult { points, metrics }
}

fn powers(t: f64) -> Vector {
    let mut out = [0.0; POLYNOMIAL_DEGREE];
    let mut acc = 1.0;
    for slot in &mut out {
        acc *= t;
        *slot = acc;
    }
    out
}

fn scale(row: &Vector, mins: &Vector, ranges: &Vector) -> Vector {
    let mut out = [0.0; POLYNOMIAL_DEGREE];
    for j in 0..POLYNOMIAL_DEGREE {
        out[j] = (row[j] - mins[j]) / ranges[j];
    }
    out
}

fn sub(a: &Vector, b: &Vector) -> Vector {
    let mut out = [0.0; POLYNOMIAL_DEGREE];
    for j in 0..POLYNOMIAL_DEGREE {
        out[j] = a[j] - b[j];
    }
    out
}

fn dot(a: &Vector, b: &Vector) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Minimum-norm solution of `gram * w = rhs` for a symmetric PSD `gram`.
fn pseudo_inverse_solve(gram: Matrix, rhs: &Vector) -> Vector {
    let (eigenvalues, eigenvectors) = symmetric_eigen(gram);

    let largest = eigenvalues.iter().fold(0.0_f64, |acc, &l| acc.max(l));
    let mut solution = [0.0; POLYNOMIAL_DEGREE];
    if largest <= 0.0 || !largest.is_finite() {
        return solution;
    }
    let cutoff = largest * EIGEN_TOLERANCE;

    for (k, &lambda) in eigenvalues.iter().enumerate() {
        if lambda <= cutoff {
            continue;
        }
        let mut projection = 0.0;
        for i in 0..POLYNOMIAL_DEGREE {
            projection += eigenvectors[i][k] * rhs[i];
        }
        let coeff = projection / lambda;
        for i in 0..POLYNOMIAL_DEGREE {
            solution[i] += coeff * eigenvectors[i][k];
        }
    }
    solution
}

/// Cyclic Jacobi eigendecomposition. Eigenvectors are the columns of the
/// returned matrix.
fn symmetric_eigen(mut a: Matrix) -> (Vector, Matrix) {
    let mut v = [[0.0; POLYNOMIAL_DEGREE]; POLYNOMIAL_DEGREE];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for _ in 0..MAX_JACOBI_SWEEPS {
        let mut off = 0.0;
        let mut diag = 0.0;
        for i in 0..POLYNOMIAL_DEGREE {
            diag += a[i][i] * a[i][i];
            for j in 0..POLYNOMIAL_DEGREE {
                if i != j {
                    off += a[i][j] * a[i][j];
                }
            }
        }
        if off <= f64::MIN_POSITIVE || off <= 1e-30 * diag {
            break;
        }

        for p in 0..POLYNOMIAL_DEGREE {
            for q in (p + 1)..POLYNOMIAL_DEGREE {
                if a[p][q].abs() <= f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..POLYNOMIAL_DEGREE {
                    let (akp, akq) = (a[k][p], a[k][q]);
                    a[k][p] = c * akp - s * akq;
                    a[k][q] = s * akp + c * akq;
                }
                for k in 0..POLYNOMIAL_DEGREE {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let (vkp, vkq) = (row[p], row[q]);
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut eigenvalues = [0.0; POLYNOMIAL_DEGREE];
    for (i, value) in eigenvalues.iter_mut().enumerate() {
        *value = a[i][i];
    }
    (eigenvalues, v)
}
