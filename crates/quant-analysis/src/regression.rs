//! Ordinary least squares with an intercept, solved through SVD.

use analysis_core::AnalysisError;
use nalgebra::{DMatrix, DVector};

/// Result of one OLS fit. Slopes follow the order of the regressors passed in.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub intercept: f64,
    pub slopes: Vec<f64>,
    /// `NaN` when the response is constant.
    pub r_squared: f64,
    pub observations: usize,
}

impl OlsFit {
    pub fn has_defined_r_squared(&self) -> bool {
        self.r_squared.is_finite()
    }
}

/// Fit `response = b0 + b1*x1 + ... + bk*xk` by least squares.
///
/// The design matrix is a ones column followed by the regressor columns. The
/// system is solved with a truncated SVD (singular values below
/// `eps * max(n, p) * sigma_max` are zeroed), giving the minimum-norm solution
/// when regressors are collinear.
pub fn fit_ols(regressors: &[&[f64]], response: &[f64]) -> Result<OlsFit, AnalysisError> {
    let n = response.len();
    let p = regressors.len() + 1;

    if regressors.iter().any(|column| column.len() != n) {
        return Err(AnalysisError::InvalidData(
            "Regressor length does not match response length".to_string(),
        ));
    }
    if n < p {
        return Err(AnalysisError::DegenerateFit(format!(
            "{} observations for {} parameters",
            n, p
        )));
    }
    let all_finite = response.iter().all(|v| v.is_finite())
        && regressors.iter().all(|c| c.iter().all(|v| v.is_finite()));
    if !all_finite {
        return Err(AnalysisError::InvalidData(
            "Regression input contains non-finite values".to_string(),
        ));
    }

    let design = DMatrix::from_fn(n, p, |i, j| if j == 0 { 1.0 } else { regressors[j - 1][i] });
    let y = DVector::from_column_slice(response);

    let coefficients = solve_least_squares(&design, &y)?;
    let fitted = &design * &coefficients;
    let sse = (&y - &fitted).norm_squared();

    Ok(OlsFit {
        intercept: coefficients[0],
        slopes: coefficients.iter().skip(1).copied().collect(),
        r_squared: r_squared(response, sse),
        observations: n,
    })
}

fn solve_least_squares(
    design: &DMatrix<f64>,
    y: &DVector<f64>,
) -> Result<DVector<f64>, AnalysisError> {
    let (n, p) = design.shape();
    let svd = design.clone().svd(true, true);
    let tolerance = f64::EPSILON * n.max(p) as f64 * svd.singular_values.max();

    svd.solve(y, tolerance)
        .map_err(|e| AnalysisError::DegenerateFit(format!("SVD solve failed: {}", e)))
}

/// `1 - SSE/SST`, or `NaN` when SST vanishes (constant response).
///
/// "Vanishes" means `SST <= f64::EPSILON * sum(y^2)`, so a response that is
/// constant up to rounding counts as constant, not only an exact `SST == 0`.
pub fn r_squared(actual: &[f64], sse: f64) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let sst: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let scale: f64 = actual.iter().map(|y| y * y).sum();

    if sst <= f64::EPSILON * scale {
        return f64::NAN;
    }
    1.0 - sse / sst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_linear_fit() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v| 0.5 + 2.0 * v).collect();
        let fit = fit_ols(&[&x], &y).unwrap();
        assert!((fit.intercept - 0.5).abs() < 1e-9);
        assert!((fit.slopes[0] - 2.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert_eq!(fit.observations, 5);
    }

    #[test]
    fn test_matches_closed_form_slope() {
        let x = [0.01, -0.02, 0.03, 0.015, -0.005, 0.02];
        let y = [0.012, -0.018, 0.041, 0.01, 0.002, 0.017];
        let n = x.len() as f64;
        let mx = x.iter().sum::<f64>() / n;
        let my = y.iter().sum::<f64>() / n;
        let cov: f64 = x.iter().zip(&y).map(|(a, b)| (a - mx) * (b - my)).sum();
        let var: f64 = x.iter().map(|a| (a - mx).powi(2)).sum();
        let slope = cov / var;

        let fit = fit_ols(&[&x], &y).unwrap();
        assert!((fit.slopes[0] - slope).abs() < 1e-9);
        assert!((fit.intercept - (my - slope * mx)).abs() < 1e-9);
        assert!(fit.r_squared > 0.0 && fit.r_squared < 1.0);
    }

    #[test]
    fn test_three_regressors_recovered() {
        let x1 = [0.01, 0.02, -0.01, 0.03, 0.00, -0.02, 0.015];
        let x2 = [0.005, -0.003, 0.002, 0.001, -0.004, 0.006, 0.0];
        let x3 = [-0.002, 0.004, 0.001, -0.003, 0.002, 0.0, 0.005];
        let y: Vec<f64> = (0..7)
            .map(|i| 0.001 + 1.2 * x1[i] + 0.4 * x2[i] - 0.3 * x3[i])
            .collect();
        let fit = fit_ols(&[&x1, &x2, &x3], &y).unwrap();
        assert!((fit.slopes[0] - 1.2).abs() < 1e-8);
        assert!((fit.slopes[1] - 0.4).abs() < 1e-8);
        assert!((fit.slopes[2] + 0.3).abs() < 1e-8);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_response_has_nan_r_squared() {
        let x = [0.01, 0.02, 0.03, 0.04];
        let y = [0.5, 0.5, 0.5, 0.5];
        let fit = fit_ols(&[&x], &y).unwrap();
        assert!(fit.r_squared.is_nan());
        assert!(!fit.has_defined_r_squared());

        // Constant up to rounding: mean subtraction leaves SST at ulp scale.
        let y = [0.1 + 0.2, 0.3, 0.1 + 0.2, 0.3];
        assert!(fit_ols(&[&x], &y).unwrap().r_squared.is_nan());

        let zeros = [0.0; 4];
        assert!(fit_ols(&[&x], &zeros).unwrap().r_squared.is_nan());
    }

    #[test]
    fn test_too_few_rows_is_degenerate() {
        let err = fit_ols(&[&[0.01]], &[0.02]).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateFit(_)));

        let x = [0.1, 0.2, 0.3];
        let err = fit_ols(&[&x, &x, &x], &[0.1, 0.2, 0.3]).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateFit(_)));

        let err = fit_ols(&[&[]], &[]).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateFit(_)));
    }

    #[test]
    fn test_collinear_regressors_stay_finite() {
        let x1 = [0.01, 0.02, -0.01, 0.03, 0.005];
        let x2: Vec<f64> = x1.iter().map(|v| 2.0 * v).collect();
        let y: Vec<f64> = x1.iter().map(|v| 0.002 + 1.5 * v).collect();
        let fit = fit_ols(&[&x1, &x2], &y).unwrap();
        assert!(fit.slopes.iter().all(|b| b.is_finite()));
        // Minimum-norm split of the combined coefficient 1.5 = b1 + 2*b2.
        assert!((fit.slopes[0] + 2.0 * fit.slopes[1] - 1.5).abs() < 1e-8);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let err = fit_ols(&[&[0.1, 0.2]], &[0.1, 0.2, 0.3]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));
    }
}
