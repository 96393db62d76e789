//! Plain text tables and headings for terminal output.

use std::fmt::Write as _;
use std::time::Duration;

use fct_common::units::trim_float;
use fct_stats::Stats;
use fct_workload::WorkloadPlan;

/// Column-aligned table. Every cell but the last in a row is padded to its
/// column's widest cell plus `pad` spaces.
#[derive(Debug, Clone)]
pub struct TableWriter {
    pad: usize,
    indent: String,
    rows: Vec<Vec<String>>,
}

impl Default for TableWriter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TableWriter {
    pub fn new(pad: usize) -> Self {
        Self {
            pad,
            indent: String::new(),
            rows: Vec::new(),
        }
    }

    pub fn with_indent(mut self, indent: &str) -> Self {
        self.indent = indent.to_string();
        self
    }

    pub fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.rows
            .push(cells.into_iter().map(|c| c.to_string()).collect());
    }

    /// A row followed by a row of dashes as wide as each cell.
    pub fn urow<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let cells: Vec<String> = cells.into_iter().map(|c| c.to_string()).collect();
        let dashes: Vec<String> = cells.iter().map(|c| "-".repeat(c.chars().count())).collect();
        self.rows.push(cells);
        self.rows.push(dashes);
    }

    /// A tab separated line.
    pub fn line(&mut self, line: &str) {
        self.row(line.split('\t'));
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = Vec::new();
        for row in &self.rows {
            let aligned = row.len().saturating_sub(1);
            for (i, cell) in row.iter().take(aligned).enumerate() {
                let w = cell.chars().count();
                match widths.get_mut(i) {
                    Some(max) => *max = (*max).max(w),
                    None => widths.push(w),
                }
            }
        }

        let mut out = String::new();
        for row in &self.rows {
            let mut line = self.indent.clone();
            let last = row.len().saturating_sub(1);
            for (i, cell) in row.iter().enumerate() {
                if i < last {
                    let _ = write!(line, "{cell:<width$}", width = widths[i] + self.pad);
                } else {
                    line.push_str(cell);
                }
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}

/// `title` followed by a line of dashes.
pub fn underline(title: &str) -> String {
    rule(title, '-')
}

/// `title` followed by a line of equals signs.
pub fn underline_double(title: &str) -> String {
    rule(title, '=')
}

fn rule(title: &str, ch: char) -> String {
    let title = title.trim();
    let line: String = std::iter::repeat_n(ch, title.chars().count()).collect();
    format!("{title}\n{line}\n")
}

/// Compact duration: `200ms`, `2.5ms`, `20s`, `3m0s`, `1h2m3s`.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d < Duration::from_secs(1) {
        return format!("{}ms", trim_float(d.as_secs_f64() * 1000.0, 3));
    }
    if d < Duration::from_secs(60) {
        return format!("{}s", trim_float(d.as_secs_f64(), 3));
    }
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    let frac = d.as_secs_f64() - total as f64;
    let secs = trim_float(s as f64 + frac, 3);
    if h > 0 {
        format!("{h}h{m}m{secs}s")
    } else {
        format!("{m}m{secs}s")
    }
}

pub fn join_durations(ds: &[Duration], sep: &str) -> String {
    ds.iter()
        .map(|d| format_duration(*d))
        .collect::<Vec<_>>()
        .join(sep)
}

/// What a workload will do, before it runs.
pub fn plan_summary(plan: &WorkloadPlan) -> String {
    let mut tw = TableWriter::default();
    tw.row(["Server URL:", plan.url.as_str()]);
    tw.row(["CCA:", plan.cca.as_deref().unwrap_or("(system default)")]);
    tw.row(["Duration:".to_string(), format_duration(plan.duration)]);
    tw.row(["Flows:".to_string(), plan.flows.to_string()]);
    tw.row([
        "Mean arrival time:".to_string(),
        format_duration(plan.mean_arrival),
    ]);
    tw.row(["Est. bandwidth:".to_string(), plan.bandwidth.to_string()]);
    tw.line("Flow lengths:\t");
    tw.row(["|- P5:".to_string(), plan.len_p5.to_string()]);
    tw.row(["|- Mean:".to_string(), plan.mean_flow_len.to_string()]);
    tw.row(["|- P95:".to_string(), plan.len_p95.to_string()]);
    tw.render()
}

/// Summary statistics of one run, preceded by a blank line.
pub fn stats_summary(stats: &Stats) -> String {
    let mut tw = TableWriter::default();
    for (label, fct) in stats.rows() {
        tw.row([format!("{label}:"), fct.to_string()]);
    }
    format!("\n{}", tw.render())
}

/// One row of the harness results table.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub rtt: Duration,
    /// Competitor CCA, or [`SOLO_ID`](crate::harness::SOLO_ID).
    pub cca: String,
    pub stats: Stats,
}

pub fn results_table(results: &[ResultRow]) -> String {
    let mut tw = TableWriter::new(2);
    tw.urow(["RTT", "CCA", "GeoMean (Harm)", "Median (Harm)", "P95 (Harm)"]);
    for r in results {
        tw.row([
            format_duration(r.rtt),
            r.cca.clone(),
            r.stats.geomean.to_string(),
            r.stats.median.to_string(),
            r.stats.p95.to_string(),
        ]);
    }
    tw.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fct_common::ProtocolConfig;
    use fct_stats::Fct;
    use fct_workload::WorkloadParams;

    #[test]
    fn columns_align_and_last_cell_is_unpadded() {
        let mut tw = TableWriter::new(2);
        tw.row(["a", "bb", "c"]);
        tw.row(["aaa", "b", "cccc"]);
        assert_eq!(tw.render(), "a    bb  c\naaa  b   cccc\n");
    }

    #[test]
    fn urow_underlines_each_cell() {
        let mut tw = TableWriter::new(1);
        tw.urow(["RTT", "CCA"]);
        assert_eq!(tw.render(), "RTT CCA\n--- ---\n");
    }

    #[test]
    fn tab_lines_split_into_cells() {
        let mut tw = TableWriter::new(1).with_indent("  ");
        tw.line("Flows:\t10");
        tw.line("Mean arrival time:\t200ms");
        assert_eq!(
            tw.render(),
            "  Flows:             10\n  Mean arrival time: 200ms\n"
        );
    }

    #[test]
    fn underlines() {
        assert_eq!(underline(" Test Parameters: "), "Test Parameters:\n----------------\n");
        assert_eq!(underline_double("FCT"), "FCT\n===\n");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(200)), "200ms");
        assert_eq!(format_duration(Duration::from_micros(2500)), "2.5ms");
        assert_eq!(format_duration(Duration::from_secs(20)), "20s");
        assert_eq!(format_duration(Duration::from_secs(180)), "3m0s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(
            join_durations(&[Duration::from_millis(10), Duration::from_millis(20)], ", "),
            "10ms, 20ms"
        );
    }

    #[test]
    fn plan_summary_lists_parameters() {
        let plan = WorkloadParams::default()
            .resolve(&ProtocolConfig::default())
            .unwrap();
        let out = plan_summary(&plan);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 10);
        assert!(lines[0].starts_with("Server URL:"));
        assert!(lines[0].ends_with("http://localhost:8188/fct"));
        assert!(lines[1].ends_with("cubic"));
        assert!(lines[2].ends_with("10s"));
        assert!(lines[3].ends_with("50"));
        assert_eq!(lines[6], "Flow lengths:");
        assert!(lines[7].starts_with("|- P5:"));
        assert!(lines[7].ends_with("65536"));
        assert!(lines[9].ends_with("2097152"));
    }

    fn stats(ms: [u64; 3]) -> Stats {
        Stats {
            geomean: Fct::new(Duration::from_millis(ms[0])),
            median: Fct::new(Duration::from_millis(ms[1])),
            p95: Fct::new(Duration::from_millis(ms[2])),
        }
    }

    #[test]
    fn stats_summary_has_three_rows() {
        let out = stats_summary(&stats([10, 12, 40]));
        assert_eq!(out, "\nGeoMean: 10.0ms\nMedian:  12.0ms\nP95:     40.0ms\n");
    }

    #[test]
    fn results_show_harm_against_solo() {
        let solo = stats([10, 10, 40]);
        let mut competed = stats([20, 10, 80]);
        competed.set_harm(&solo);
        let out = results_table(&[
            ResultRow {
                rtt: Duration::from_millis(10),
                cca: "-".to_string(),
                stats: solo,
            },
            ResultRow {
                rtt: Duration::from_millis(10),
                cca: "bbr".to_string(),
                stats: competed,
            },
        ]);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("RTT   CCA  GeoMean (Harm)"));
        assert!(lines[1].starts_with("---   ---  --------------"));
        assert!(lines[2].starts_with("10ms  -    10.0ms"));
        assert!(lines[3].starts_with("10ms  bbr  20.0ms (0.500)"));
        assert!(lines[3].ends_with("80.0ms (0.500)"));
        // zero harm is not shown
        assert!(lines[3].contains("  10.0ms  "));
    }
}
