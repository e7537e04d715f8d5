use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use colored::*;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use runsight::{
    Activity, AnalyticsEngine, AthleteProfile, EngineConfig, FatigueAnalysis, LogFormat,
    PerformancePrediction, RaceCategory, RiskLevel, TrainingLoad, TrainingReadiness,
    TrainingTrends,
};

/// runsight - Running analytics and race time prediction
///
/// Computes training load, fatigue, feature vectors and race predictions from
/// a JSON array of activities, and trains the global race-time model from
/// CSV datasets.
#[derive(Parser)]
#[command(name = "runsight")]
#[command(version)]
#[command(about = "Running analytics and race time prediction", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Console log format (pretty, json, compact)
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<LogFormat>,

    /// Reference time (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS), defaults to now
    #[arg(long, value_name = "TIME", global = true, value_parser = parse_reference_time)]
    as_of: Option<NaiveDateTime>,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acute:chronic training load and injury risk
    Load {
        /// JSON array of activities ("-" for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Fatigue score and recovery recommendation
    Fatigue {
        /// JSON array of activities ("-" for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Athlete age in years
        #[arg(long)]
        age: Option<f64>,

        /// Fitness level; "elite" lowers and "beginner" raises the score, others leave it unchanged
        #[arg(long)]
        fitness_level: Option<String>,
    },

    /// Predict a race finishing time
    Predict {
        /// JSON array of activities ("-" for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Race distance in meters
        #[arg(short, long)]
        distance: Option<f64>,

        /// Race type (5k, 10k, half_marathon, marathon)
        #[arg(short = 't', long)]
        race_type: Option<String>,
    },

    /// Model feature vector as of the reference time
    Features {
        /// JSON array of activities ("-" for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Race distance in meters
        #[arg(short, long, default_value = "10000")]
        distance: f64,
    },

    /// Running volume totals and weekly aggregates
    Trends {
        /// JSON array of activities ("-" for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Period in days
        #[arg(short, long, default_value = "30")]
        days: u32,
    },

    /// Train the global race-time model from a dataset directory
    Train {
        /// Directory holding the activities/races CSV pair
        #[arg(long)]
        data_dir: PathBuf,

        /// Directory holding a session summaries export
        #[arg(long)]
        secondary_dir: Option<PathBuf>,

        /// Artifact output path, overrides the configured one
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show a progress bar while fitting
        #[arg(long)]
        progress: bool,
    },

    /// Show or initialise the configuration file
    Config {
        /// Print the effective configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default configuration file
        #[arg(short, long)]
        init: bool,
    },
}

fn parse_reference_time(value: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|_| format!("Invalid reference time: {}", value))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load_from_file(path),
        None => Ok(EngineConfig::load_or_default()),
    }
}

fn read_activities(input: &Path) -> Result<Vec<Activity>> {
    let content = if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read activities from stdin")?;
        buf
    } else {
        fs::read_to_string(input)
            .with_context(|| format!("Failed to read activities file: {}", input.display()))?
    };

    let activities: Vec<Activity> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse activities JSON: {}", input.display()))?;

    for activity in &activities {
        activity
            .validate()
            .with_context(|| format!("Invalid activity {}", activity.id))?;
    }
    tracing::debug!(count = activities.len(), "Read activities");
    Ok(activities)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

fn show_load(load: &TrainingLoad) {
    println!("{}", "Training load".blue().bold());
    if load.insufficient_data {
        println!("  {}", load.recommendation.yellow());
        return;
    }
    println!("  Acute (7d):   {:.1}", load.acute_load);
    println!("  Chronic (28d): {:.1}", load.chronic_load);
    let risk = match load.risk_level {
        RiskLevel::Low => "low".green(),
        RiskLevel::Moderate => "moderate".yellow(),
        RiskLevel::High => "high".red(),
    };
    println!("  Ratio:        {:.2} ({} risk)", load.ratio, risk);
    println!("  {}", load.recommendation);
}

fn show_fatigue(analysis: &FatigueAnalysis) {
    println!("{}", "Fatigue".cyan().bold());
    let readiness = match analysis.training_readiness {
        TrainingReadiness::High => "high".green(),
        TrainingReadiness::Medium => "medium".yellow(),
        TrainingReadiness::Low => "low".red(),
    };
    println!("  Score:     {:.1} / 100", analysis.fatigue_score);
    println!("  Readiness: {}", readiness);
    println!("  Recovery:  {} day(s)", analysis.days_to_full_recovery);
    println!("  {}", analysis.recovery_recommendation);

    #[derive(Tabled)]
    struct ComponentRow {
        #[tabled(rename = "Component")]
        name: &'static str,
        #[tabled(rename = "Score")]
        score: String,
    }
    let c = &analysis.components;
    let rows = [
        ("Training load", c.training_load),
        ("Intensity", c.intensity),
        ("Volume", c.volume),
        ("Recovery debt", c.recovery_debt),
    ]
    .into_iter()
    .map(|(name, score)| ComponentRow {
        name,
        score: format!("{:.1}", score),
    });
    println!("{}", Table::new(rows).with(Style::rounded()));

    println!("  Contributing factors:");
    for factor in &analysis.contributing_factors {
        println!("    - {}", factor);
    }
}

fn show_prediction(prediction: &PerformancePrediction) {
    println!("{}", "Race prediction".magenta().bold());
    println!("  Distance:   {:.2} km", prediction.race_distance / 1000.0);
    println!(
        "  Predicted:  {}",
        format_duration(prediction.predicted_time).bold()
    );
    println!(
        "  Range:      {} - {}",
        format_duration(prediction.confidence_interval.min),
        format_duration(prediction.confidence_interval.max)
    );
    println!("  Confidence: {:.0}%", prediction.confidence * 100.0);

    #[derive(Tabled)]
    struct EstimatorRow {
        #[tabled(rename = "Estimator")]
        name: String,
        #[tabled(rename = "Prediction")]
        time: String,
        #[tabled(rename = "Weight")]
        weight: String,
    }
    let rows = prediction.estimators.iter().map(|e| EstimatorRow {
        name: e.estimator.clone(),
        time: if e.predicted_time > 0.0 {
            format_duration(e.predicted_time)
        } else {
            "-".to_string()
        },
        weight: format!("{:.2}", e.weight),
    });
    println!("{}", Table::new(rows).with(Style::rounded()));

    if !prediction.pacing_strategy.is_empty() {
        #[derive(Tabled)]
        struct SplitRow {
            #[tabled(rename = "Km")]
            km: u32,
            #[tabled(rename = "Pace (min/km)")]
            pace: String,
            #[tabled(rename = "Elapsed (min)")]
            elapsed: String,
        }
        let rows = prediction.pacing_strategy.iter().map(|s| SplitRow {
            km: s.km,
            pace: s.target_pace_min_per_km.to_string(),
            elapsed: s.cumulative_time_min.to_string(),
        });
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
}

fn show_trends(trends: &TrainingTrends, days: u32) {
    println!("{}", format!("Trends (last {} days)", days).green().bold());
    if trends.is_empty() {
        println!("  {}", "No runs in period".yellow());
        return;
    }
    println!("  Runs:     {}", trends.total_runs);
    println!("  Distance: {:.1} km", trends.total_distance_km);
    println!("  Time:     {}", format_duration(trends.total_time_min * 60.0));
    println!("  Avg pace: {:.2} min/km", trends.avg_pace_min_per_km);

    #[derive(Tabled)]
    struct WeekRow {
        #[tabled(rename = "Week")]
        week: String,
        #[tabled(rename = "Runs")]
        runs: usize,
        #[tabled(rename = "Distance (km)")]
        distance: String,
        #[tabled(rename = "Effort")]
        effort: String,
    }
    let rows = trends.weekly.iter().map(|w| WeekRow {
        week: format!("{}-W{:02}", w.iso_year, w.iso_week),
        runs: w.runs,
        distance: format!("{:.1}", w.distance_km),
        effort: format!("{:.0}", w.effort),
    });
    println!("{}", Table::new(rows).with(Style::rounded()));
}

fn engine_for(config: EngineConfig, as_of: Option<NaiveDateTime>) -> AnalyticsEngine {
    let engine = AnalyticsEngine::new(config);
    match as_of {
        Some(reference_time) => engine.with_reference_time(reference_time),
        None => engine,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    config.logging.level = config.logging.level.raised_by(cli.verbose);
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    let _log_guard = runsight::logging::init_logging(&config.logging)?;

    match cli.command {
        Commands::Load { input } => {
            let activities = read_activities(&input)?;
            let load = engine_for(config, cli.as_of).compute_training_load(&activities);
            if cli.json {
                print_json(&load)?;
            } else {
                show_load(&load);
            }
        }

        Commands::Fatigue {
            input,
            age,
            fitness_level,
        } => {
            let activities = read_activities(&input)?;
            let profile = (age.is_some() || fitness_level.is_some())
                .then(|| AthleteProfile { age, fitness_level });
            let analysis =
                engine_for(config, cli.as_of).analyze_fatigue(&activities, profile.as_ref());
            if cli.json {
                print_json(&analysis)?;
            } else {
                show_fatigue(&analysis);
            }
        }

        Commands::Predict {
            input,
            distance,
            race_type,
        } => {
            let race_type = match race_type {
                Some(value) => match RaceCategory::parse(&value) {
                    Some(category) => Some(category),
                    None => bail!("Unknown race type: {}", value),
                },
                None => None,
            };
            let distance = match (distance, race_type) {
                (Some(distance), _) => distance,
                (None, Some(category)) => category.distance_meters(),
                (None, None) => bail!("Either --distance or --race-type is required"),
            };

            let activities = read_activities(&input)?;
            let prediction =
                engine_for(config, cli.as_of).predict_race_time(&activities, distance, race_type);
            if cli.json {
                print_json(&prediction)?;
            } else {
                show_prediction(&prediction);
            }
        }

        Commands::Features { input, distance } => {
            let activities = read_activities(&input)?;
            let features = engine_for(config, cli.as_of).features_for(&activities, distance);
            if cli.json {
                print_json(&features)?;
            } else {
                #[derive(Tabled)]
                struct FeatureRow {
                    #[tabled(rename = "Feature")]
                    name: String,
                    #[tabled(rename = "Value")]
                    value: String,
                }
                let rows = features.iter().map(|(name, value)| FeatureRow {
                    name: name.to_string(),
                    value: format!("{:.3}", value),
                });
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }

        Commands::Trends { input, days } => {
            let activities = read_activities(&input)?;
            let trends = engine_for(config, cli.as_of).training_trends(&activities, days);
            if cli.json {
                print_json(&trends)?;
            } else {
                show_trends(&trends, days);
            }
        }

        Commands::Train {
            data_dir,
            secondary_dir,
            output,
            progress,
        } => {
            if let Some(output) = output {
                config.model.artifact_path = output;
            }
            config.training.show_progress |= progress && !cli.json;

            println!("{}", "Training global model...".green().bold());
            let engine = AnalyticsEngine::new(config);
            let report = engine
                .train_from_directory(&data_dir, secondary_dir.as_deref())
                .map_err(|e| {
                    e.report();
                    anyhow::anyhow!(e.user_message())
                })
                .with_context(|| format!("Training failed for {}", data_dir.display()))?;

            if cli.json {
                print_json(&report)?;
            } else {
                println!("  Rows:           {}", report.row_count);
                println!("  Validation MAE: {:.1} s", report.validation_error);
                println!("  Artifact:       {}", report.artifact_path.display());
                println!("{}", "✓ Model trained".green());
            }
        }

        Commands::Config { show, init } => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(EngineConfig::default_config_path);
            if init {
                if path.exists() {
                    bail!("Config file already exists: {}", path.display());
                }
                EngineConfig::default().save_to_file(&path)?;
                println!("{} {}", "✓ Wrote default config to".green(), path.display());
            }
            if show || !init {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}
