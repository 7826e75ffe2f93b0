//! Output formatting for scan reports

use crate::error::{Error, Result};
use crate::kb::{Finding, Severity};
use crate::request::FuzzableRequest;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL,
};
use serde::Serialize;
use std::io::Write;
use std::str::FromStr;

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable table output
    #[default]
    Human,
    /// JSON output
    Json,
    /// No output (silent mode)
    None,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "none" => Ok(Self::None),
            _ => Err(Error::InvalidOutputFormat(s.to_string())),
        }
    }
}

/// Sort order for findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSort {
    /// Most severe first, then by plugin and URL (default)
    #[default]
    Severity,
    /// By plugin, then by URL
    Plugin,
    /// By URL only
    Url,
}

impl FromStr for OutputSort {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "severity" => Ok(Self::Severity),
            "plugin" => Ok(Self::Plugin),
            "url" => Ok(Self::Url),
            _ => Err(Error::InvalidOutputSort(s.to_string())),
        }
    }
}

/// Configuration for output formatting
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,
    /// Sort order
    pub sort: OutputSort,
}

impl OutputConfig {
    /// Create a new output config
    pub fn new(format: OutputFormat, sort: OutputSort) -> Self {
        Self { format, sort }
    }
}

/// What a finished scan found
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Scanned targets
    pub targets: Vec<String>,
    /// Scan duration, human readable
    pub elapsed: String,
    /// Every URL registered during the scan, sorted
    pub urls: Vec<String>,
    /// Request points handed to the audit phase
    pub fuzzable_requests: Vec<FuzzableRequest>,
    /// Findings recorded by the plugins
    pub findings: Vec<Finding>,
}

/// Output a scan report
pub fn output_report<W: Write>(report: &ScanReport, config: &OutputConfig, writer: &mut W) -> Result<()> {
    match config.format {
        OutputFormat::Human => output_human(report, config, writer),
        OutputFormat::Json => output_json(report, writer),
        OutputFormat::None => Ok(()),
    }
}

/// Output JSON format
fn output_json<W: Write>(report: &ScanReport, writer: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, report)?;
    writeln!(writer).map_err(Error::OutputFailed)?;
    Ok(())
}

/// Output human-readable table format
fn output_human<W: Write>(report: &ScanReport, config: &OutputConfig, writer: &mut W) -> Result<()> {
    writeln!(
        writer,
        "Scanned {} in {}",
        report.targets.join(", "),
        report.elapsed
    )
    .map_err(Error::OutputFailed)?;
    writeln!(
        writer,
        "Found {} URLs and {} different points of injection.",
        report.urls.len(),
        report.fuzzable_requests.len()
    )
    .map_err(Error::OutputFailed)?;

    if report.findings.is_empty() {
        return writeln!(writer, "No findings.").map_err(Error::OutputFailed);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Severity").add_attribute(Attribute::Bold),
            Cell::new("Plugin").add_attribute(Attribute::Bold),
            Cell::new("Title").add_attribute(Attribute::Bold),
            Cell::new("URL").add_attribute(Attribute::Bold),
        ]);

    let mut findings: Vec<&Finding> = report.findings.iter().collect();
    match config.sort {
        OutputSort::Severity => {
            findings.sort_by(|a, b| {
                b.severity
                    .cmp(&a.severity)
                    .then_with(|| a.plugin.cmp(&b.plugin))
                    .then_with(|| a.url.cmp(&b.url))
            });
        }
        OutputSort::Plugin => {
            findings.sort_by(|a, b| a.plugin.cmp(&b.plugin).then_with(|| a.url.cmp(&b.url)));
        }
        OutputSort::Url => {
            findings.sort_by(|a, b| a.url.cmp(&b.url));
        }
    }

    for finding in findings {
        add_finding_row(&mut table, finding);
    }

    writeln!(writer, "{}", table).map_err(Error::OutputFailed)
}

/// Add a row for a finding to the table
fn add_finding_row(table: &mut Table, finding: &Finding) {
    let color = match finding.severity {
        Severity::High => Color::Red,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Cyan,
        Severity::Information => Color::DarkGrey,
    };

    table.add_row(vec![
        Cell::new(finding.severity.to_string())
            .fg(color)
            .set_alignment(CellAlignment::Center),
        Cell::new(&finding.plugin),
        Cell::new(&finding.title),
        Cell::new(&finding.url),
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(plugin: &str, url: &str, severity: Severity) -> Finding {
        Finding {
            plugin: plugin.to_string(),
            title: "Directory indexing".to_string(),
            url: url.to_string(),
            severity,
            description: String::new(),
        }
    }

    fn report() -> ScanReport {
        ScanReport {
            targets: vec!["http://a.com/".to_string()],
            elapsed: "3 seconds.".to_string(),
            urls: vec!["http://a.com/".to_string(), "http://a.com/files/".to_string()],
            fuzzable_requests: Vec::new(),
            findings: vec![
                finding("robots_txt", "http://a.com/robots.txt", Severity::Information),
                finding("directory_listing", "http://a.com/files/", Severity::Low),
            ],
        }
    }

    #[test]
    fn parse_output_format() {
        assert_eq!("human".parse::<OutputFormat>().unwrap(), OutputFormat::Human);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn parse_output_sort() {
        assert_eq!("url".parse::<OutputSort>().unwrap(), OutputSort::Url);
        assert!("status".parse::<OutputSort>().is_err());
    }

    #[test]
    fn human_output_sorts_by_severity() {
        let mut out = Vec::new();
        output_report(&report(), &OutputConfig::default(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Found 2 URLs and 0 different points of injection."));
        let low = text.find("directory_listing").unwrap();
        let info = text.find("robots_txt").unwrap();
        assert!(low < info);
    }

    #[test]
    fn json_output_is_parseable() {
        let mut out = Vec::new();
        let config = OutputConfig::new(OutputFormat::Json, OutputSort::Url);
        output_report(&report(), &config, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["findings"].as_array().unwrap().len(), 2);
        assert_eq!(value["elapsed"], "3 seconds.");
    }

    #[test]
    fn none_output_writes_nothing() {
        let mut out = Vec::new();
        let config = OutputConfig::new(OutputFormat::None, OutputSort::default());
        output_report(&report(), &config, &mut out).unwrap();
        assert!(out.is_empty());
    }
}
