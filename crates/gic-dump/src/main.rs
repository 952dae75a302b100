//! Inspects an NDJSON checkpoint/backup file written by the collector's
//! `Backup` command (§4.E) — one line per system, each carrying a jump
//! histogram and a dock histogram per station.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};

use gic_core::geometry::Point3D;

#[derive(Parser)]
#[command(name = "gic-dump", about = "Inspect collector checkpoint files")]
struct Cli {
    /// Path to an NDJSON checkpoint file written by the collector's Backup command.
    path: PathBuf,

    /// List every station histogram, not just per-system totals.
    #[arg(long)]
    stations: bool,

    /// Output as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// ── On-disk shape (mirrors `gic_core::collector::actor`'s private backup types) ──

#[derive(Debug, Deserialize)]
struct Visit {
    time_mark: i64,
    visit_count: u32,
}

#[derive(Debug, Deserialize)]
struct BackupHistogram {
    timeframe: i64,
    #[serde(rename = "Visits")]
    visits: Vec<Visit>,
}

impl BackupHistogram {
    fn total_count(&self) -> u64 {
        self.visits.iter().map(|v| v.visit_count as u64).sum()
    }

    fn time_range(&self) -> Option<(i64, i64)> {
        let marks = self.visits.iter().map(|v| v.time_mark * self.timeframe);
        let min = marks.clone().min()?;
        let max = marks.max()?;
        Some((min, max))
    }
}

#[derive(Debug, Deserialize)]
struct BackupRecord {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Coords")]
    coords: Point3D,
    systems_visits: BackupHistogram,
    stations_visits: HashMap<String, BackupHistogram>,
}

fn fmt_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

// ── JSON output ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TimeRangeJson {
    first: String,
    last: String,
}

#[derive(Serialize)]
struct StationJson {
    name: String,
    dock_count: u64,
    time_range: Option<TimeRangeJson>,
}

#[derive(Serialize)]
struct SystemJson {
    name: String,
    coords: Point3D,
    jump_count: u64,
    jump_time_range: Option<TimeRangeJson>,
    station_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    stations: Option<Vec<StationJson>>,
}

#[derive(Serialize)]
struct DumpJson {
    file: String,
    systems: usize,
    total_jumps: u64,
    total_docks: u64,
    records: Vec<SystemJson>,
}

fn main() {
    let cli = Cli::parse();

    let content = fs::read_to_string(&cli.path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", cli.path.display());
        std::process::exit(1);
    });

    let mut records = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<BackupRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => eprintln!("skipping malformed record at line {}: {e}", line_no + 1),
        }
    }

    let total_jumps: u64 = records.iter().map(|r| r.systems_visits.total_count()).sum();
    let total_docks: u64 = records
        .iter()
        .flat_map(|r| r.stations_visits.values())
        .map(|h| h.total_count())
        .sum();

    if cli.json {
        let json = DumpJson {
            file: cli.path.display().to_string(),
            systems: records.len(),
            total_jumps,
            total_docks,
            records: records
                .iter()
                .map(|r| SystemJson {
                    name: r.name.clone(),
                    coords: r.coords,
                    jump_count: r.systems_visits.total_count(),
                    jump_time_range: r.systems_visits.time_range().map(|(f, l)| TimeRangeJson {
                        first: fmt_ts(f),
                        last: fmt_ts(l),
                    }),
                    station_count: r.stations_visits.len(),
                    stations: cli.stations.then(|| {
                        r.stations_visits
                            .iter()
                            .map(|(name, h)| StationJson {
                                name: name.clone(),
                                dock_count: h.total_count(),
                                time_range: h.time_range().map(|(f, l)| TimeRangeJson {
                                    first: fmt_ts(f),
                                    last: fmt_ts(l),
                                }),
                            })
                            .collect(),
                    }),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
        return;
    }

    println!("File: {}", cli.path.display());
    println!(
        "Systems: {}, total jumps: {}, total docks: {}",
        records.len(),
        total_jumps,
        total_docks
    );
    println!();
    println!("  {:<24} {:>10} {:>10} {:>24}", "System", "Jumps", "Stations", "Last jump");
    println!("  {}", "─".repeat(72));

    for record in &records {
        let range = record.systems_visits.time_range();
        println!(
            "  {:<24} {:>10} {:>10} {:>24}",
            record.name,
            record.systems_visits.total_count(),
            record.stations_visits.len(),
            range.map(|(_, last)| fmt_ts(last)).unwrap_or_else(|| "-".to_string()),
        );

        if cli.stations {
            for (name, hist) in &record.stations_visits {
                let station_range = hist.time_range();
                println!(
                    "      {:<20} {:>10} docks, last {}",
                    name,
                    hist.total_count(),
                    station_range.map(|(_, last)| fmt_ts(last)).unwrap_or_else(|| "-".to_string()),
                );
            }
        }
    }
}
