//! CAPM and Fama-French three-factor models over an aligned panel.
//!
//! Both expected-return formulas leave the fitted intercept out: the estimate
//! is the risk-free mean plus factor loadings times factor means. Alpha is
//! still reported on each estimate but never enters the expected return.

use analysis_core::{AlignedPanel, AnalysisError, CapmEstimate, Ff3Estimate, FactorModel};
use statrs::statistics::Statistics;

use crate::regression::fit_ols;

/// Compound a monthly return to an annual one: `(1 + m)^12 - 1`.
pub fn annualize_monthly(monthly: f64) -> f64 {
    (1.0 + monthly).powi(12) - 1.0
}

fn check_panel(panel: &AlignedPanel, model: FactorModel) -> Result<(), AnalysisError> {
    if panel.is_empty() {
        return Err(AnalysisError::AlignmentEmpty);
    }
    if panel.len() < model.parameter_count() {
        return Err(AnalysisError::DegenerateFit(format!(
            "{} needs at least {} aligned months, got {}",
            model.label(),
            model.parameter_count(),
            panel.len()
        )));
    }
    Ok(())
}

/// Regress excess stock return on excess market return.
///
/// Expected monthly return = mean(rf) + beta * mean(excess market).
pub fn fit_capm(panel: &AlignedPanel) -> Result<CapmEstimate, AnalysisError> {
    check_panel(panel, FactorModel::Capm)?;

    let excess_market = panel.excess_market();
    let excess_stock = panel.excess_stock();
    let rf = panel.rf();

    let fit = fit_ols(&[&excess_market], &excess_stock)?;
    let beta = fit.slopes[0];

    let expected_monthly = rf.iter().mean() + beta * excess_market.iter().mean();

    Ok(CapmEstimate {
        intercept: fit.intercept,
        beta,
        expected_return_monthly: expected_monthly,
        expected_return_annual: annualize_monthly(expected_monthly),
        r_squared: fit.r_squared,
        observations: fit.observations,
    })
}

/// Regress excess stock return on Mkt-RF, SMB and HML.
///
/// Expected monthly return = sum(beta_i * mean(factor_i)) + mean(rf).
pub fn fit_ff3(panel: &AlignedPanel) -> Result<Ff3Estimate, AnalysisError> {
    check_panel(panel, FactorModel::Ff3)?;

    let mkt_rf = panel.mkt_rf();
    let smb = panel.smb();
    let hml = panel.hml();
    let rf = panel.rf();
    let excess_stock = panel.excess_stock();

    let fit = fit_ols(&[&mkt_rf, &smb, &hml], &excess_stock)?;
    let (beta_mkt, beta_smb, beta_hml) = (fit.slopes[0], fit.slopes[1], fit.slopes[2]);

    let expected_monthly = beta_mkt * mkt_rf.iter().mean()
        + beta_smb * smb.iter().mean()
        + beta_hml * hml.iter().mean()
        + rf.iter().mean();

    Ok(Ff3Estimate {
        intercept: fit.intercept,
        beta_mkt,
        beta_smb,
        beta_hml,
        expected_return_monthly: expected_monthly,
        expected_return_annual: annualize_monthly(expected_monthly),
        r_squared: fit.r_squared,
        observations: fit.observations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{AlignedRow, MonthEnd};

    fn panel(stock: &[f64], excess_market: &[f64], rf: f64, smb: &[f64], hml: &[f64]) -> AlignedPanel {
        let rows = stock
            .iter()
            .enumerate()
            .map(|(i, &s)| AlignedRow {
                month: MonthEnd::from_year_month(2020, i as u32 + 1).unwrap(),
                stock: s,
                market: excess_market[i] + rf,
                mkt_rf: excess_market[i],
                smb: smb[i],
                hml: hml[i],
                rf,
                excess_stock: s - rf,
                excess_market: excess_market[i],
            })
            .collect();
        AlignedPanel { rows }
    }

    #[test]
    fn test_annualize_boundaries() {
        assert_eq!(annualize_monthly(0.0), 0.0);
        assert_eq!(annualize_monthly(-1.0), -1.0);
        assert!((annualize_monthly(0.01) - (1.01f64.powi(12) - 1.0)).abs() < 1e-15);
    }

    #[test]
    fn test_capm_synthetic_scenario() {
        let stock = [0.01, 0.02, -0.01, 0.03];
        let excess_market = [0.008, 0.015, -0.005, 0.02];
        let rf = 0.001;
        let p = panel(&stock, &excess_market, rf, &[0.0; 4], &[0.0; 4]);

        let y: Vec<f64> = stock.iter().map(|s| s - rf).collect();
        let mx = excess_market.iter().sum::<f64>() / 4.0;
        let my = y.iter().sum::<f64>() / 4.0;
        let cov: f64 = excess_market.iter().zip(&y).map(|(x, y)| (x - mx) * (y - my)).sum();
        let var: f64 = excess_market.iter().map(|x| (x - mx).powi(2)).sum();
        let beta = cov / var;

        let est = fit_capm(&p).unwrap();
        assert!((est.beta - beta).abs() < 1e-9);
        assert!((est.beta - 1.572_237_960_339_943).abs() < 1e-9);
        assert!((est.intercept - (my - beta * mx)).abs() < 1e-9);

        let expected_monthly = rf + beta * mx;
        assert!((est.expected_return_monthly - expected_monthly).abs() < 1e-12);
        let expected_annual = (1.0 + expected_monthly).powi(12) - 1.0;
        assert!((est.expected_return_annual - expected_annual).abs() < 1e-12);
        assert_eq!(est.observations, 4);
    }

    #[test]
    fn test_capm_ignores_intercept_in_expected_return() {
        // Stock = 5% alpha + market; the alpha must not show up in the estimate.
        let excess_market = [0.01, -0.02, 0.03, 0.0, 0.015];
        let stock: Vec<f64> = excess_market.iter().map(|m| 0.05 + m).collect();
        let p = panel(&stock, &excess_market, 0.0, &[0.0; 5], &[0.0; 5]);
        let est = fit_capm(&p).unwrap();
        assert!((est.intercept - 0.05).abs() < 1e-9);
        let mean_mkt = excess_market.iter().sum::<f64>() / 5.0;
        assert!((est.expected_return_monthly - mean_mkt).abs() < 1e-9);
    }

    #[test]
    fn test_ff3_recovers_loadings() {
        let mkt = [0.01, 0.02, -0.01, 0.03, 0.0, -0.02, 0.015, 0.005];
        let smb = [0.005, -0.003, 0.002, 0.001, -0.004, 0.006, 0.0, 0.002];
        let hml = [-0.002, 0.004, 0.001, -0.003, 0.002, 0.0, 0.005, -0.001];
        let rf = 0.002;
        let stock: Vec<f64> = (0..8)
            .map(|i| rf + 0.001 + 1.1 * mkt[i] + 0.5 * smb[i] - 0.2 * hml[i])
            .collect();
        let p = panel(&stock, &mkt, rf, &smb, &hml);

        let est = fit_ff3(&p).unwrap();
        assert!((est.beta_mkt - 1.1).abs() < 1e-8);
        assert!((est.beta_smb - 0.5).abs() < 1e-8);
        assert!((est.beta_hml + 0.2).abs() < 1e-8);
        assert!((est.intercept - 0.001).abs() < 1e-8);
        assert!((est.r_squared - 1.0).abs() < 1e-9);

        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        let expected = 1.1 * mean(&mkt) + 0.5 * mean(&smb) - 0.2 * mean(&hml) + rf;
        assert!((est.expected_return_monthly - expected).abs() < 1e-8);
    }

    #[test]
    fn test_empty_panel_reports_alignment_empty_for_both() {
        let empty = AlignedPanel::default();
        assert_eq!(fit_capm(&empty).unwrap_err(), AnalysisError::AlignmentEmpty);
        assert_eq!(fit_ff3(&empty).unwrap_err(), AnalysisError::AlignmentEmpty);
    }

    #[test]
    fn test_models_degenerate_independently() {
        let p = panel(&[0.01, 0.02, 0.03], &[0.01, 0.015, 0.02], 0.001, &[0.0; 3], &[0.0; 3]);
        assert!(fit_capm(&p).is_ok());
        assert!(matches!(fit_ff3(&p).unwrap_err(), AnalysisError::DegenerateFit(_)));
    }
}
