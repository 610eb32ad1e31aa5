//! Validation report and verdict

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Overall outcome of a validation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl Verdict {
    /// Process exit status for this verdict
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Warn => 2,
            Self::Fail => 1,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        })
    }
}

/// Summary of a closed raw log
///
/// Produced once by the validator and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub path: String,
    pub file_size: u64,

    pub total_frames: u64,
    pub message_counts: BTreeMap<String, u64>,
    pub corrupt_frames: u64,
    pub skipped_bytes: u64,
    pub truncated_bytes: u64,

    /// Seconds since the GPS epoch of the earliest and latest timed message
    pub first_gps_time: Option<f64>,
    pub last_gps_time: Option<f64>,
    pub duration_seconds: Option<f64>,

    pub raw_observation_count: u64,
    pub ephemeris_count: u64,
    pub position_count: u64,
    pub raw_observation_rate_hz: Option<f64>,
    pub position_rate_hz: Option<f64>,
    pub expected_rate_hz: f64,

    pub fix_types: BTreeMap<String, u64>,
    pub carrier_solutions: BTreeMap<String, u64>,
    pub fix_3d_or_better_percent: Option<f64>,
    pub max_satellites: u8,

    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub verdict: Verdict,
}

impl ValidationReport {
    /// Report for a file that could not be analysed at all
    pub fn unreadable(path: &str, file_size: u64, error: String, expected_rate_hz: f64) -> Self {
        Self {
            path: path.to_string(),
            file_size,
            total_frames: 0,
            message_counts: BTreeMap::new(),
            corrupt_frames: 0,
            skipped_bytes: 0,
            truncated_bytes: 0,
            first_gps_time: None,
            last_gps_time: None,
            duration_seconds: None,
            raw_observation_count: 0,
            ephemeris_count: 0,
            position_count: 0,
            raw_observation_rate_hz: None,
            position_rate_hz: None,
            expected_rate_hz,
            fix_types: BTreeMap::new(),
            carrier_solutions: BTreeMap::new(),
            fix_3d_or_better_percent: None,
            max_satellites: 0,
            warnings: Vec::new(),
            errors: vec![error],
            verdict: Verdict::Fail,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }

    /// Render as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn rate(value: Option<f64>) -> String {
    value.map(|r| format!(" ({:.1} Hz)", r)).unwrap_or_default()
}

fn histogram(f: &mut fmt::Formatter<'_>, title: &str, entries: &BTreeMap<String, u64>, total: u64) -> fmt::Result {
    if entries.is_empty() {
        return Ok(());
    }
    writeln!(f, "{}:", title)?;
    for (name, count) in entries {
        let percent = if total > 0 { 100.0 * *count as f64 / total as f64 } else { 0.0 };
        writeln!(f, "  {:20}: {:5} ({:5.1}%)", name, count, percent)?;
    }
    writeln!(f)
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(80);
        writeln!(f, "{}", rule)?;
        writeln!(f, "VALIDATION REPORT")?;
        writeln!(f, "{}", rule)?;
        writeln!(f)?;
        writeln!(f, "File: {}", self.path)?;
        writeln!(
            f,
            "Size: {} bytes ({:.2} MB)",
            self.file_size,
            self.file_size as f64 / (1024.0 * 1024.0)
        )?;
        writeln!(f)?;

        if let (Some(first), Some(last), Some(duration)) =
            (self.first_gps_time, self.last_gps_time, self.duration_seconds)
        {
            writeln!(f, "Time Span (GPS seconds):")?;
            writeln!(f, "  Start:    {:.3}", first)?;
            writeln!(f, "  End:      {:.3}", last)?;
            writeln!(f, "  Duration: {:.1} seconds", duration)?;
            writeln!(f)?;
        }

        writeln!(f, "Message Statistics:")?;
        writeln!(f, "  Total frames:   {}", self.total_frames)?;
        writeln!(f, "  Corrupt frames: {}", self.corrupt_frames)?;
        if self.skipped_bytes > 0 || self.truncated_bytes > 0 {
            writeln!(f, "  Skipped bytes:  {}", self.skipped_bytes)?;
            writeln!(f, "  Truncated tail: {} bytes", self.truncated_bytes)?;
        }
        writeln!(f)?;

        writeln!(f, "Critical Messages for Post-Processing:")?;
        writeln!(
            f,
            "  RXM-RAWX (raw observations): {}{}",
            self.raw_observation_count,
            rate(self.raw_observation_rate_hz)
        )?;
        writeln!(f, "  RXM-SFRBX (ephemeris):       {}", self.ephemeris_count)?;
        writeln!(
            f,
            "  NAV-PVT (position):          {}{}",
            self.position_count,
            rate(self.position_rate_hz)
        )?;
        writeln!(f)?;

        histogram(f, "Fix Type Distribution", &self.fix_types, self.position_count)?;
        histogram(f, "RTK Carrier Solution Distribution", &self.carrier_solutions, self.position_count)?;

        writeln!(f, "Satellites:")?;
        writeln!(f, "  Max satellites observed: {}", self.max_satellites)?;
        if let Some(percent) = self.fix_3d_or_better_percent {
            writeln!(f, "  3D fix or better:        {:.1}%", percent)?;
        }
        writeln!(f)?;

        writeln!(f, "All Message Types:")?;
        let mut by_count: Vec<_> = self.message_counts.iter().collect();
        by_count.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (name, count) in by_count {
            writeln!(f, "  {:20}: {}", name, count)?;
        }
        writeln!(f)?;

        if !self.warnings.is_empty() {
            writeln!(f, "WARNINGS:")?;
            for warning in &self.warnings {
                writeln!(f, "  - {}", warning)?;
            }
            writeln!(f)?;
        }

        if !self.errors.is_empty() {
            writeln!(f, "ERRORS:")?;
            for error in &self.errors {
                writeln!(f, "  - {}", error)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "{}", rule)?;
        match self.verdict {
            Verdict::Pass => writeln!(f, "PASS: file is suitable for post-processing")?,
            Verdict::Warn => writeln!(f, "WARN: file is usable for post-processing, review the warnings above")?,
            Verdict::Fail => writeln!(f, "FAIL: file is NOT suitable for post-processing")?,
        }
        write!(f, "{}", rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Verdict::Pass.exit_code(), 0);
        assert_eq!(Verdict::Warn.exit_code(), 2);
        assert_eq!(Verdict::Fail.exit_code(), 1);
    }

    #[test]
    fn test_unreadable_report_fails() {
        let report = ValidationReport::unreadable("missing.ubx", 0, "file not found".to_string(), 10.0);
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(report.errors, vec!["file not found".to_string()]);

        let text = report.to_string();
        assert!(text.contains("ERRORS:\n  - file not found"));
        assert!(text.contains("FAIL: file is NOT suitable"));
    }

    #[test]
    fn test_json_uses_uppercase_verdict() {
        let report = ValidationReport::unreadable("x.ubx", 0, "empty".to_string(), 10.0);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["verdict"], "FAIL");
        assert_eq!(json["errors"][0], "empty");
        assert_eq!(json["expected_rate_hz"], 10.0);
    }
}
