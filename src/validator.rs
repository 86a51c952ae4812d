use crate::models::ParsedLine;

/// Lines whose engaged amount exceeds `ae * ratio`. Reported, never dropped.
pub fn is_anomalous(line: &ParsedLine, ratio: f64) -> bool {
    line.engaged > line.ae * ratio
}

fn is_valid(line: &ParsedLine) -> bool {
    line.paragraph_code.chars().count() == 6
        && line.ae >= 0.0
        && line.cp >= 0.0
        && line.engaged >= 0.0
}

#[derive(Debug, Default)]
pub struct CleanResult {
    pub lines: Vec<ParsedLine>,
    pub dropped: usize,
    pub anomalies: usize,
}

/// Drop malformed lines (bad paragraph code, negative amounts). Anomalous
/// lines pass through with a warning.
pub fn clean_lines(lines: Vec<ParsedLine>, anomaly_ratio: f64) -> CleanResult {
    let total = lines.len();
    let kept: Vec<ParsedLine> = lines.into_iter().filter(is_valid).collect();
    let anomalies = kept
        .iter()
        .filter(|l| is_anomalous(l, anomaly_ratio))
        .inspect(|l| {
            tracing::warn!(
                sheet = %l.sheet,
                row = l.row,
                paragraph = %l.paragraph_code,
                ae = l.ae,
                engaged = l.engaged,
                "engaged amount far exceeds AE"
            )
        })
        .count();
    CleanResult {
        dropped: total - kept.len(),
        lines: kept,
        anomalies,
    }
}
