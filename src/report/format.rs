//! Formatted terminal output for a [`ResultsTable`].
//!
//! Formatting lives here so the fitting code stays free of presentation
//! concerns and output changes stay localized.

use crate::domain::{FitResult, ResultsTable};
use crate::math::mean_variance;

const UNIT_WIDTH: usize = 6;
const VALUE_WIDTH: usize = 18;

/// One line per unit: `value ± error` for every parameter, then the scores.
pub fn format_results_table(table: &ResultsTable) -> String {
    let mut out = String::new();

    let mut header = format!("{:>UNIT_WIDTH$}", "unit");
    let mut rule = format!("{:->UNIT_WIDTH$}", "");
    for name in &table.parameter_names {
        header.push_str(&format!(" {:>VALUE_WIDTH$}", truncate(name, VALUE_WIDTH)));
        rule.push_str(&format!(" {:->VALUE_WIDTH$}", ""));
    }
    header.push_str(&format!(" {:>10} {:>8} {:>5}", "chi2/dof", "p", "ok"));
    rule.push_str(&format!(" {:->10} {:->8} {:->5}", "", "", ""));
    out.push_str(header.trim_end());
    out.push('\n');
    out.push_str(rule.trim_end());
    out.push('\n');

    for (unit, row) in table.rows.iter().enumerate() {
        out.push_str(&format_row(unit, row));
        out.push('\n');
    }

    out
}

fn format_row(unit: usize, row: &FitResult) -> String {
    let mut line = format!("{unit:>UNIT_WIDTH$}");
    for p in &row.parameters {
        let cell = if p.fixed {
            format!("{} (fixed)", fmt_num(p.value))
        } else {
            format!("{} ± {}", fmt_num(p.value), fmt_num(p.error))
        };
        line.push_str(&format!(" {cell:>VALUE_WIDTH$}"));
    }
    line.push_str(&format!(
        " {:>10} {:>8} {:>5}",
        fmt_num(row.scores.reduced_chi2),
        fmt_num(row.scores.p_value),
        if row.success { "yes" } else { "no" }
    ));
    line.trim_end().to_string()
}

/// Batch summary: counts, failure reasons, and the spread of each parameter
/// over the converged units.
pub fn format_summary(table: &ResultsTable) -> String {
    let mut out = String::new();
    let n_ok = table.len() - table.n_failed();

    out.push_str("=== spe - batch fit summary ===\n");
    out.push_str(&format!(
        "Units: {} | converged: {} | failed: {}\n",
        table.len(),
        n_ok,
        table.n_failed()
    ));

    let failures: Vec<(usize, &str)> = table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.success)
        .map(|(unit, r)| (unit, r.message.as_deref().unwrap_or("unknown")))
        .collect();
    if !failures.is_empty() {
        out.push_str("\nFailed units:\n");
        for (unit, reason) in failures {
            out.push_str(&format!("  {unit:>UNIT_WIDTH$}: {reason}\n"));
        }
    }

    if n_ok == 0 {
        return out;
    }

    out.push_str("\nParameters over converged units:\n");
    for (idx, name) in table.parameter_names.iter().enumerate() {
        let values: Vec<f64> = table
            .rows
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.parameters.get(idx))
            .map(|p| p.value)
            .filter(|v| v.is_finite())
            .collect();
        match mean_variance(&values) {
            Some((mean, var)) => out.push_str(&format!(
                "  {:<14} mean={} std={}\n",
                truncate(name, 14),
                fmt_num(mean),
                fmt_num(var.sqrt())
            )),
            None => out.push_str(&format!("  {:<14} (no finite values)\n", truncate(name, 14))),
        }
    }

    out
}

fn fmt_num(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v != 0.0 && (v.abs() < 1e-3 || v.abs() >= 1e5) {
        format!("{v:.2e}")
    } else {
        format!("{v:.4}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitScores, FittedParameter};

    fn ok_row(pe: f64) -> FitResult {
        FitResult {
            parameters: vec![
                FittedParameter {
                    name: "pe".to_string(),
                    value: pe,
                    error: 0.01,
                    fixed: false,
                },
                FittedParameter {
                    name: "lambda_0".to_string(),
                    value: 1.5,
                    error: 0.0,
                    fixed: true,
                },
            ],
            scores: FitScores {
                cost: 40.0,
                chi2: 80.0,
                reduced_chi2: 1.02,
                p_value: 0.41,
                dof: 78,
            },
            success: true,
            iterations: 12,
            message: None,
        }
    }

    fn table() -> ResultsTable {
        let names = vec!["pe".to_string(), "lambda_0".to_string()];
        ResultsTable {
            rows: vec![
                ok_row(1.0),
                FitResult::failed(&names, "degenerate charge data"),
                ok_row(1.2),
            ],
            parameter_names: names,
        }
    }

    #[test]
    fn table_has_header_rule_and_one_line_per_unit() {
        let text = format_results_table(&table());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2 + 3);
        assert!(lines[0].contains("unit") && lines[0].contains("lambda_0"));
        assert!(lines[1].chars().all(|c| c == '-' || c == ' '));
        assert!(lines[2].contains("1.0000 ± 0.0100"));
        assert!(lines[2].contains("1.5000 (fixed)"));
        assert!(lines[3].contains("nan") && lines[3].ends_with("no"));
        assert!(lines.iter().all(|l| l == &l.trim_end()));
    }

    #[test]
    fn summary_counts_failures_and_averages_converged_units() {
        let text = format_summary(&table());
        assert!(text.contains("Units: 3 | converged: 2 | failed: 1"));
        assert!(text.contains("degenerate charge data"));
        assert!(text.contains("mean=1.1000"));
        assert!(text.contains("std=0.1000"));
    }

    #[test]
    fn summary_of_empty_table() {
        let text = format_summary(&ResultsTable {
            parameter_names: vec![],
            rows: vec![],
        });
        assert!(text.contains("Units: 0 | converged: 0 | failed: 0"));
        assert!(!text.contains("Parameters"));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(fmt_num(f64::NAN), "nan");
        assert_eq!(fmt_num(0.0), "0.0000");
        assert_eq!(fmt_num(1.23456), "1.2346");
        assert_eq!(fmt_num(2.5e-5), "2.50e-5");
        assert_eq!(truncate("reduced_chi2", 6), "reduc.");
    }
}
