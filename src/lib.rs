pub mod cli;
pub mod clean;
pub mod data;
pub mod features;
pub mod frame;
pub mod io_utils;
pub mod load;
pub mod logger;
pub mod pipeline;
pub mod profile;
pub mod schema_map;
pub mod settings;
pub mod table;
pub mod validate;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("mesa_analytics", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => pipeline::execute_run(&args),
        Commands::Validate(args) => pipeline::execute_validate(&args),
        Commands::Profile(args) => pipeline::execute_profile(&args),
    }
}
