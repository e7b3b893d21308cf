use anyhow::Result;
use topoverify_domain::Case;
use topoverify_verifier::RunReport;

use crate::cli::OutputFormat;

pub fn render_report(report: &RunReport, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => report.render_text(),
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
    })
}

/// One line per case: name, expected networks and project stack directory.
pub fn render_cases(cases: &[Case], format: OutputFormat) -> Result<String> {
    if let OutputFormat::Json = format {
        return Ok(serde_json::to_string_pretty(cases)?);
    }
    if cases.is_empty() {
        return Ok("No cases.".to_string());
    }
    let width = cases.iter().map(|c| c.name.len()).max().unwrap_or(0);
    let lines: Vec<String> = cases
        .iter()
        .map(|c| {
            format!(
                "{:<width$}  {}  {}  {}",
                c.name,
                c.base_network,
                c.restricted_network,
                c.stack_dir(c.environment.as_str()).display(),
                width = width
            )
        })
        .collect();
    Ok(lines.join("\n"))
}
