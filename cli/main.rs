//! This module contains the main entrypoint to the hazard cli.

use clap::Parser;
use colored::Colorize;
use hazard_core::{hazards::Hazard, train::ModelSelection};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod train;

#[derive(Parser)]
#[clap(
	about = "Train natural hazard risk models and serve their predictions.",
	setting = clap::AppSettings::DisableHelpSubcommand,
)]
struct Args {
	#[clap(long, global = true, arg_enum, default_value = "text", help = "the format of log lines")]
	log_format: LogFormat,
	#[clap(subcommand)]
	command: Command,
}

#[derive(clap::ArgEnum, Clone, Copy, Debug)]
enum LogFormat {
	Text,
	Json,
}

#[derive(clap::Subcommand)]
enum Command {
	#[clap(name = "train")]
	Train(Box<TrainArgs>),
	#[clap(name = "train-hazard")]
	TrainHazard(TrainHazardArgs),
	#[clap(name = "serve-landslide")]
	ServeLandslide(ServeArgs),
	#[clap(name = "serve-hazards")]
	ServeHazards(ServeHazardsArgs),
}

#[derive(clap::Args, Debug)]
#[clap(about = "train landslide models")]
#[clap(long_about = "train one or every landslide model from a csv file, evaluate it on a held out partition and save it to the models directory")]
pub struct TrainArgs {
	#[clap(short, long, help = "the path to your .csv file")]
	file: Option<PathBuf>,
	#[clap(
		short,
		long,
		default_value = "randomforest",
		help = "randomforest, xgboost, lightgbm, linear_regression or all"
	)]
	model: ModelSelection,
	#[clap(long = "fine-tune", help = "search for the best hyperparameters before training")]
	fine_tune: bool,
	#[clap(short, long, help = "the path to a .json file to merge the evaluation metrics into")]
	output: Option<PathBuf>,
	#[clap(short, long, help = "the path to a config file")]
	config: Option<PathBuf>,
	#[clap(long, help = "the directory to save models to")]
	models_dir: Option<PathBuf>,
	#[clap(long, help = "the number of hyperparameter search trials")]
	n_trials: Option<usize>,
	#[clap(short, long, help = "the name of the column to predict")]
	target: Option<String>,
}

#[derive(clap::Args, Debug)]
#[clap(about = "train an earthquake, flood or forest fire model")]
pub struct TrainHazardArgs {
	#[clap(long, help = "earthquake, flood or forestfire")]
	hazard: Hazard,
	#[clap(short, long, help = "the path to your .csv file")]
	file: PathBuf,
	#[clap(long, default_value = "hazard-models", help = "the directory to save the model to")]
	models_dir: PathBuf,
}

#[derive(clap::Args, Debug)]
#[clap(about = "run the landslide prediction server")]
struct ServeArgs {
	#[clap(long, env = "HOST", default_value = "0.0.0.0")]
	host: std::net::IpAddr,
	#[clap(long, env = "PORT", default_value = "8000")]
	port: u16,
	#[clap(long, env = "MODELS_DIR", default_value = "ml-models")]
	models_dir: PathBuf,
}

#[derive(clap::Args, Debug)]
#[clap(about = "run the hazard prediction server")]
struct ServeHazardsArgs {
	#[clap(long, default_value = "127.0.0.1")]
	host: std::net::IpAddr,
	#[clap(long, default_value = "5000")]
	port: u16,
	#[clap(long, default_value = "hazard-models")]
	models_dir: PathBuf,
}

fn main() {
	let args = Args::parse();
	setup_tracing(args.log_format);
	if let Err(error) = execute(args.command) {
		report_error(&error);
	}
}

fn execute(command: Command) -> hazard_util::error::Result<()> {
	match command {
		Command::Train(args) => self::train::train(*args),
		Command::TrainHazard(args) => self::train::train_hazard(args),
		Command::ServeLandslide(args) => hazard_app::run_landslide(hazard_app::Options {
			host: args.host,
			port: args.port,
			models_dir: args.models_dir,
		}),
		Command::ServeHazards(args) => hazard_app::run_hazards(hazard_app::Options {
			host: args.host,
			port: args.port,
			models_dir: args.models_dir,
		}),
	}
}

/// Log a failed command. The process then exits normally.
fn report_error(error: &hazard_util::error::Error) {
	tracing::error!(error = %format!("{:#}", error), "command failed");
	eprintln!("{}: {:#}", "error".red().bold(), error);
}

/// Log to stderr at the level in `RUST_LOG`, or `info` if it is not set.
fn setup_tracing(format: LogFormat) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let builder = tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr);
	match format {
		LogFormat::Text => builder.init(),
		LogFormat::Json => builder.json().init(),
	}
}
