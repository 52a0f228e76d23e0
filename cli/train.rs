use crate::{TrainArgs, TrainHazardArgs};
use backtrace::Backtrace;
use hazard_core::{hazards::train_hazard as train_hazard_model, train::RunOptions};
use hazard_util::{err, error::Result};
use once_cell::sync::Lazy;
use std::sync::{Mutex, PoisonError};

/// Run `f`, turning a panic into an error that carries the panic message and backtrace, so a panic deep in training is reported like any other error.
fn catch_panic<T>(f: impl FnOnce() -> Result<T> + std::panic::UnwindSafe) -> Result<T> {
	static PANIC_MESSAGE_AND_BACKTRACE: Lazy<Mutex<Option<(String, Backtrace)>>> =
		Lazy::new(|| Mutex::new(None));
	let hook = std::panic::take_hook();
	std::panic::set_hook(Box::new(|panic_info| {
		let value = (panic_info.to_string(), Backtrace::new());
		PANIC_MESSAGE_AND_BACKTRACE
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.replace(value);
	}));
	let result = std::panic::catch_unwind(f);
	std::panic::set_hook(hook);
	match result {
		Ok(result) => result,
		Err(_) => {
			let panic_info = PANIC_MESSAGE_AND_BACKTRACE
				.lock()
				.unwrap_or_else(PoisonError::into_inner)
				.take();
			match panic_info {
				Some((message, backtrace)) => Err(err!("{}\n{:?}", message, backtrace)),
				None => Err(err!("training panicked")),
			}
		}
	}
}

pub fn train(args: TrainArgs) -> Result<()> {
	let options = RunOptions {
		file: args.file,
		models: args.model,
		fine_tuning: args.fine_tune,
		output: args.output,
		config: args.config,
		models_dir: args.models_dir,
		n_trials: args.n_trials,
		target: args.target,
	};
	let metrics = catch_panic(|| hazard_core::run(&options))?;
	for (model_name, metrics) in metrics.iter() {
		eprintln!(
			"{}: mse {:.4}, r2 {:.4}, rmse {:.4}",
			model_name, metrics.mse, metrics.r2, metrics.rmse
		);
	}
	if let Some(output) = &options.output {
		eprintln!("Metrics were written to {}.", output.display());
	}
	Ok(())
}

pub fn train_hazard(args: TrainHazardArgs) -> Result<()> {
	let output = catch_panic(|| train_hazard_model(args.hazard, &args.file, &args.models_dir))?;
	if let Some(mse) = output.test_mse {
		eprintln!("{}: test mse {:.4}", args.hazard, mse);
	}
	if let Some(accuracy) = output.test_accuracy {
		eprintln!("{}: test accuracy {:.4}", args.hazard, accuracy);
	}
	eprintln!("Your model was written to {}.", output.path.display());
	Ok(())
}
