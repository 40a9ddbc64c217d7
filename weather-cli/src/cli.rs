use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use inquire::{Password, Text};
use tracing::info;
use weather_etl_core::{
    Config, OpenWeatherSource, Pipeline, StorageCredentials, encode_csv,
    schedule::{FailurePolicy, next_daily_tick, run_daily},
    transform,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-etl", version, about = "Daily weather extract/transform/load job")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively set city, API key and destination bucket.
    Configure,

    /// Run the pipeline once: readiness check, fetch, transform and upload.
    Run,

    /// Run the pipeline every day at midnight UTC until interrupted.
    Schedule {
        /// Stop with a non-zero exit status when a run fails for good, so the
        /// process supervisor can alert. By default the loop keeps going.
        #[arg(long)]
        exit_on_failure: bool,
    },

    /// Transform a saved API response and print the CSV artifact to stdout.
    Transform {
        /// Path to a JSON document as returned by the weather API.
        file: PathBuf,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(self.config)?,
            Command::Run => {
                let pipeline = build_pipeline(&load_config(self.config.as_deref())?)?;
                let report = pipeline.run_once().await?;

                println!(
                    "Wrote {} ({}: {:.2} °F, {})",
                    report.key,
                    report.record.city,
                    report.record.temperature_f,
                    report.record.description
                );
            }
            Command::Schedule { exit_on_failure } => {
                let pipeline = build_pipeline(&load_config(self.config.as_deref())?)?;
                let on_failure = if exit_on_failure {
                    FailurePolicy::Exit
                } else {
                    FailurePolicy::Continue
                };
                info!(first_run = %next_daily_tick(Utc::now()), ?on_failure, "scheduler started");

                tokio::select! {
                    res = run_daily(&pipeline, on_failure) => res?,
                    res = tokio::signal::ctrl_c() => {
                        res.context("Failed to listen for shutdown signal")?;
                        info!("shutdown signal received, scheduler stopped");
                    }
                }
            }
            Command::Transform { file } => {
                let contents = fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let document: serde_json::Value = serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse JSON in {}", file.display()))?;

                let record = transform(&document)?;
                std::io::stdout()
                    .write_all(&encode_csv(&record)?)
                    .context("Failed to write CSV to stdout")?;
            }
        }

        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline<OpenWeatherSource>> {
    let credentials = StorageCredentials::from_env();
    info!(
        city = %config.api.city,
        bucket = %config.storage.bucket,
        credentials = ?credentials,
        "loaded configuration"
    );
    Pipeline::from_config(config, &credentials)
}

fn configure(path: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = load_config(path.as_deref())?;

    config.api.city = Text::new("City:").with_default(&config.api.city).prompt()?;

    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_help_message("Leave empty to keep the current key")
        .prompt()?;
    if !api_key.is_empty() {
        config.api.api_key = Some(api_key);
    }

    config.storage.bucket = Text::new("S3 bucket:").with_default(&config.storage.bucket).prompt()?;
    config.storage.region = Text::new("S3 region:").with_default(&config.storage.region).prompt()?;

    let saved_to = match path {
        Some(path) => {
            config.save_to(&path)?;
            path
        }
        None => config.save()?,
    };

    println!("Configuration saved to {}", saved_to.display());
    if !config.is_configured() {
        println!("Note: no API key set yet; `weather-etl run` will fail until one is configured.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["weather-etl", "run", "--log-level", "debug", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Run));
        assert_eq!(cli.log_level, "debug");
        assert!(cli.json);
    }

    #[test]
    fn transform_requires_a_file() {
        assert!(Cli::try_parse_from(["weather-etl", "transform"]).is_err());

        let cli = Cli::try_parse_from(["weather-etl", "transform", "obs.json"]).unwrap();
        match cli.command {
            Command::Transform { file } => assert_eq!(file, PathBuf::from("obs.json")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn schedule_keeps_running_after_failures_unless_asked() {
        let cli = Cli::try_parse_from(["weather-etl", "schedule"]).unwrap();
        assert!(matches!(cli.command, Command::Schedule { exit_on_failure: false }));

        let cli = Cli::try_parse_from(["weather-etl", "schedule", "--exit-on-failure"]).unwrap();
        assert!(matches!(cli.command, Command::Schedule { exit_on_failure: true }));
    }

    #[test]
    fn missing_override_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("weather-etl-cli-test-does-not-exist.toml");
        let cfg = load_config(Some(path.as_path())).unwrap();
        assert_eq!(cfg.api.city, "Portland");
    }
}
