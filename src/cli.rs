use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Restaurant chain analytics pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full pipeline and persist processed tables
    Run(RunArgs),
    /// Load and clean the raw datasets, then print the validation report
    Validate(ValidateArgs),
    /// Profile the raw sources without cleaning them
    Profile(ProfileArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Settings document (paths and runtime parameters)
    #[arg(short, long, default_value = "config/settings.yml")]
    pub settings: PathBuf,
    /// Schema map describing canonical columns per dataset
    #[arg(short = 'm', long = "schema-map", default_value = "config/schema_map.yml")]
    pub schema_map: PathBuf,
    /// Deterministic seed override
    #[arg(long)]
    pub seed: Option<u64>,
    /// Forecast horizon in months
    #[arg(long = "forecast-horizon")]
    pub forecast_horizon: Option<u32>,
    /// Number of top ingredients carried into downstream models
    #[arg(long = "top-ingredients")]
    pub top_ingredients: Option<u32>,
    /// Use the hashed aggregation backend
    #[arg(long = "fast-aggregation")]
    pub fast_aggregation: bool,
    /// Character encoding of raw flat-file input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Settings document (paths and runtime parameters)
    #[arg(short, long, default_value = "config/settings.yml")]
    pub settings: PathBuf,
    /// Schema map describing canonical columns per dataset
    #[arg(short = 'm', long = "schema-map", default_value = "config/schema_map.yml")]
    pub schema_map: PathBuf,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Settings document (paths and runtime parameters)
    #[arg(short, long, default_value = "config/settings.yml")]
    pub settings: PathBuf,
    /// Schema map describing canonical columns per dataset
    #[arg(short = 'm', long = "schema-map", default_value = "config/schema_map.yml")]
    pub schema_map: PathBuf,
    /// Also print per-column missing percentages
    #[arg(long)]
    pub missing: bool,
}
