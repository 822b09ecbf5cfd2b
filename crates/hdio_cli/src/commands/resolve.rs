//! Resolve command implementation.
//!
//! Runs one offline resolver pass over a markup file, as a fresh session
//! would, and reports the mapping, the batch and per-entity failures.

use hdio_protocol::{resolve, EntityKind, HdmlParser, KnownFiles, MarkupParser, Resolution};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Result of an offline pass.
#[derive(Debug, Serialize)]
pub struct ResolveReport {
    /// Source file.
    pub path: String,
    /// Number of HDML entities found in the markup.
    pub entities: usize,
    /// Local reference to server path.
    pub mapping: BTreeMap<String, String>,
    /// Bundled entities per kind.
    pub batch: BatchSummary,
    /// Size of the packaged batch in bytes.
    pub bytes: usize,
    /// Per-entity failures.
    pub errors: Vec<String>,
}

/// Entity counts of a batch.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    /// Connections.
    pub connections: usize,
    /// Models.
    pub models: usize,
    /// Frames.
    pub frames: usize,
}

impl ResolveReport {
    fn new(path: &Path, entities: usize, resolution: &Resolution) -> Self {
        Self {
            path: path.display().to_string(),
            entities,
            mapping: resolution
                .mapping
                .iter()
                .map(|(reference, path)| (reference.to_string(), path.to_string()))
                .collect(),
            batch: BatchSummary {
                connections: resolution.batch.count(EntityKind::Connection),
                models: resolution.batch.count(EntityKind::Model),
                frames: resolution.batch.count(EntityKind::Frame),
            },
            bytes: resolution.data.len(),
            errors: resolution.errors.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Parses and resolves `path`, returning the report and the packaged batch.
pub fn analyze(path: &Path) -> Result<(ResolveReport, Vec<u8>), Box<dyn std::error::Error>> {
    let markup = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let document = HdmlParser::new().parse(&markup)?;
    let resolution = resolve(&KnownFiles::new(), &document)?;
    let report = ResolveReport::new(path, document.len(), &resolution);
    Ok((report, resolution.data))
}

/// Runs the resolve command.
pub fn run(
    path: &Path,
    output: Option<&Path>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (report, data) = analyze(path)?;

    if let Some(output) = output {
        std::fs::write(output, &data)?;
        tracing::info!(path = %output.display(), bytes = data.len(), "wrote batch");
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(format!("{} entities failed to resolve", report.errors.len()).into())
    }
}

fn print_text_output(report: &ResolveReport) {
    println!("HDML Resolution");
    println!("===============");
    println!("Source:     {}", report.path);
    println!("Entities:   {}", report.entities);
    println!();
    println!("Mapping:");
    if report.mapping.is_empty() {
        println!("  (none)");
    }
    for (reference, path) in &report.mapping {
        println!("  {reference} -> {path}");
    }
    println!();
    println!("Batch:");
    println!("  Connections: {}", report.batch.connections);
    println!("  Models:      {}", report.batch.models);
    println!("  Frames:      {}", report.batch.frames);
    println!("  Size:        {}", format_bytes(report.bytes));

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &report.errors {
            println!("  {error}");
        }
    }
}

fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}
