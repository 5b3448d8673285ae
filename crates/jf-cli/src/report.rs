//! Fit result reports: console summary, flat text dump, JSON summary.

use anyhow::Result;
use jf_core::FitResult;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Run metadata stored alongside the fit results in the JSON summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub period: String,
    pub variant: String,
    pub corr_form: String,
    pub constraint: Option<String>,
}

#[derive(Serialize)]
struct ParameterEntry<'a> {
    name: &'a str,
    value: f64,
    error: f64,
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    status: i32,
    converged: bool,
    message: &'a str,
    covariance_status: i32,
    min_value: f64,
    parameters: Vec<ParameterEntry<'a>>,
    covariance_matrix: Vec<Vec<f64>>,
    ndf: i64,
    p_value: f64,
    #[serde(flatten)]
    run: &'a RunInfo,
}

fn status_code(result: &FitResult) -> i32 {
    if result.converged { 0 } else { 1 }
}

fn parameter_name(result: &FitResult, i: usize) -> String {
    result.parameter_names.get(i).cloned().unwrap_or_else(|| format!("par{i}"))
}

fn covariance_rows(result: &FitResult) -> Vec<Vec<f64>> {
    let n = result.n_params();
    (0..n)
        .map(|i| (0..n).map(|j| result.covariance_at(i, j).unwrap_or(f64::NAN)).collect())
        .collect()
}

/// Human-readable summary printed after a fit.
pub fn summary(result: &FitResult) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Summary:");
    let status = if result.converged {
        "converged".to_string()
    } else {
        format!("not converged ({})", result.message)
    };
    let _ = writeln!(s, "  Status: {status}");
    let _ = writeln!(
        s,
        "  Covariance matrix status: {} ({:?})",
        result.covariance_status.code(),
        result.covariance_status
    );
    let _ = writeln!(s, "  Minimal value: {}", result.chi2);
    let _ = writeln!(s, "  NDF: {}", result.ndf);
    let _ = writeln!(s, "  p-value: {}", result.p_value);
    let _ = writeln!(s, "  Parameters:");
    for i in 0..result.n_params() {
        let _ = writeln!(
            s,
            "    {}:  {} +- {}",
            parameter_name(result, i),
            result.parameters[i],
            result.uncertainties[i]
        );
    }

    let n = result.n_params();
    let pairs: Vec<(usize, usize, f64)> = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .filter_map(|(i, j)| result.correlation(i, j).map(|rho| (i, j, rho)))
        .collect();
    if !pairs.is_empty() {
        let _ = writeln!(s, "  Correlations:");
        for (i, j, rho) in pairs {
            let _ = writeln!(
                s,
                "    {} / {}:  {rho:.3}",
                parameter_name(result, i),
                parameter_name(result, j)
            );
        }
    }
    s
}

/// Flat text dump: parameter values, covariance matrix and fit quality, each
/// block preceded by a `#` header line.
pub fn format_text(result: &FitResult) -> String {
    let join = |values: &[f64]| values.iter().map(f64::to_string).collect::<Vec<_>>().join(" ");

    let mut s = String::from("# Fitted parameters\n");
    s.push_str(&join(&result.parameters[..]));
    s.push_str("\n\n# Covariance matrix:\n");
    for row in covariance_rows(result) {
        s.push_str(&join(&row[..]));
        s.push('\n');
    }
    s.push_str("\n# Minimal chi^2, NDF, p-value:\n");
    let _ = writeln!(s, "{} {} {}", result.chi2, result.ndf, result.p_value);
    s
}

/// Write [`format_text`] to `path`.
pub fn write_text(path: &Path, result: &FitResult) -> Result<()> {
    std::fs::write(path, format_text(result))?;
    Ok(())
}

/// JSON summary of a fit together with the run metadata.
pub fn to_json(result: &FitResult, run: &RunInfo) -> Result<serde_json::Value> {
    let parameters = (0..result.n_params())
        .map(|i| ParameterEntry {
            name: result.parameter_names.get(i).map(String::as_str).unwrap_or(""),
            value: result.parameters[i],
            error: result.uncertainties[i],
        })
        .collect();

    let summary = JsonSummary {
        status: status_code(result),
        converged: result.converged,
        message: &result.message,
        covariance_status: result.covariance_status.code(),
        min_value: result.chi2,
        parameters,
        covariance_matrix: covariance_rows(result),
        ndf: result.ndf,
        p_value: result.p_value,
        run,
    };
    Ok(serde_json::to_value(summary)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jf_core::CovarianceStatus;

    fn result() -> FitResult {
        FitResult::with_covariance(
            vec![0.5, -0.25],
            vec![0.1, 0.2],
            vec![0.01, 0.002, 0.002, 0.04],
            CovarianceStatus::Accurate,
            3.5,
            true,
            7,
        )
        .with_names(vec!["p0".into(), "p1".into()])
        .with_quality(4, 0.25)
    }

    #[test]
    fn test_text_layout() {
        let text = format_text(&result());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "# Fitted parameters",
                "0.5 -0.25",
                "",
                "# Covariance matrix:",
                "0.01 0.002",
                "0.002 0.04",
                "",
                "# Minimal chi^2, NDF, p-value:",
                "3.5 4 0.25",
            ]
        );
    }

    #[test]
    fn test_summary_lists_parameters() {
        let s = summary(&result());
        assert!(s.contains("Status: converged"));
        assert!(s.contains("Covariance matrix status: 3"));
        assert!(s.contains("NDF: 4"));
        assert!(s.contains("p1:  -0.25 +- 0.2"));
        assert!(s.contains("Correlations:"));
        assert!(s.contains("p0 / p1:  0.100"));
    }

    #[test]
    fn test_summary_skips_correlations_without_covariance() {
        let r = FitResult::new(vec![0.5, -0.25], vec![0.1, 0.2], 1.0, true, 3);
        assert!(!summary(&r).contains("Correlations:"));
    }

    #[test]
    fn test_json_summary() {
        let run = RunInfo {
            period: "2016".into(),
            variant: "PtBal".into(),
            corr_form: "2p".into(),
            constraint: None,
        };
        let v = to_json(&result(), &run).unwrap();
        assert_eq!(v["status"], 0);
        assert_eq!(v["covariance_status"], 3);
        assert_eq!(v["min_value"], 3.5);
        assert_eq!(v["parameters"][1]["name"], "p1");
        assert_eq!(v["parameters"][1]["error"], 0.2);
        assert_eq!(v["covariance_matrix"][1][1], 0.04);
        assert_eq!(v["ndf"], 4);
        assert_eq!(v["period"], "2016");
        assert_eq!(v["corr_form"], "2p");
        assert!(v["constraint"].is_null());
    }
}
