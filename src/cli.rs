use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;

use crate::signal_processing::{CleanerConfig, ContractionDetector, DetectorConfig, Episode, SignalCleaner};
use crate::streaming::read_series_csv;

/// CTG Monitor - real-time fetal monitoring pipeline
#[derive(Parser)]
#[command(name = "ctg-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (default)
    Serve,

    /// Detect contractions in a recorded uterine-activity series
    Detect(DetectArgs),
}

#[derive(Args)]
pub struct DetectArgs {
    /// CSV file with `time,value` rows
    pub csv: PathBuf,

    /// Run the signal cleaner before detection
    #[arg(long)]
    pub clean: bool,

    /// Deviation that opens an episode
    #[arg(long)]
    pub th_high: Option<f64>,

    /// Deviation at or below which an episode closes
    #[arg(long)]
    pub th_low: Option<f64>,

    /// Print episodes as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl DetectArgs {
    pub fn detector_config(&self) -> DetectorConfig {
        let mut config = DetectorConfig::default();
        if let Some(th) = self.th_high {
            config.th_high = th;
        }
        if let Some(th) = self.th_low {
            config.th_low = th;
        }
        config
    }

    /// Load the series and return the detected episodes
    pub fn detect(&self) -> anyhow::Result<Vec<Episode>> {
        let file = File::open(&self.csv)
            .with_context(|| format!("Failed to open {}", self.csv.display()))?;
        let mut series = read_series_csv(file)
            .with_context(|| format!("Failed to read {}", self.csv.display()))?;
        series.sort_by(|a, b| a.time.total_cmp(&b.time));

        if self.clean {
            series = SignalCleaner::new(CleanerConfig::default()).clean(&series);
        }

        Ok(ContractionDetector::new(self.detector_config()).detect(&series))
    }

    pub fn execute(&self) -> anyhow::Result<()> {
        let episodes = self.detect()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&episodes)?);
            return Ok(());
        }

        println!(
            "{:<4} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "#", "Start", "End", "Peak at", "Peak", "Amplitude"
        );
        println!("{}", "-".repeat(59));
        for (i, ep) in episodes.iter().enumerate() {
            println!(
                "{:<4} {:>10.1} {:>10.1} {:>10.1} {:>10.2} {:>10.2}",
                i + 1,
                ep.start,
                ep.end,
                ep.peak_time,
                ep.peak_value,
                ep.amplitude
            );
        }
        println!("{} contraction(s)", episodes.len());
        Ok(())
    }
}
