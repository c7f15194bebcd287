//! Result Assembler: shapes the two model outcomes into one report.

use analysis_core::{
    AlignedPanel, AnalysisError, CapmEstimate, ExpectedReturnReport, FactorModel, Ff3Estimate,
    ModelWarning,
};

fn warning(model: FactorModel, err: &AnalysisError) -> ModelWarning {
    ModelWarning {
        model,
        kind: err.kind().to_string(),
        reason: err.to_string(),
    }
}

fn undefined_r_squared(model: FactorModel) -> ModelWarning {
    ModelWarning {
        model,
        kind: "degenerate_fit".to_string(),
        reason: "Excess stock return is constant; R2 is undefined".to_string(),
    }
}

pub fn assemble_report(
    ticker: &str,
    benchmark: &str,
    panel: &AlignedPanel,
    capm: Result<CapmEstimate, AnalysisError>,
    ff3: Result<Ff3Estimate, AnalysisError>,
) -> ExpectedReturnReport {
    let mut warnings = Vec::new();

    let capm = match capm {
        Ok(est) => {
            if !est.r_squared.is_finite() {
                warnings.push(undefined_r_squared(FactorModel::Capm));
            }
            Some(est)
        }
        Err(e) => {
            warnings.push(warning(FactorModel::Capm, &e));
            None
        }
    };

    let ff3 = match ff3 {
        Ok(est) => {
            if !est.r_squared.is_finite() {
                warnings.push(undefined_r_squared(FactorModel::Ff3));
            }
            Some(est)
        }
        Err(e) => {
            warnings.push(warning(FactorModel::Ff3, &e));
            None
        }
    };

    ExpectedReturnReport {
        ticker: ticker.to_string(),
        benchmark: benchmark.to_string(),
        capm,
        ff3,
        observations: panel.len(),
        start_month: panel.first_month().map(|m| m.date()),
        end_month: panel.last_month().map(|m| m.date()),
        warnings,
    }
}
