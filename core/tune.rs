/*!
This module implements a seeded random search over hyperparameters. A [`Study`](struct.Study.html) runs a fixed number of trials. Each trial draws values through a [`Trial`](struct.Trial.html) handle, trains a model with them and reports a [`TrialOutcome`](enum.TrialOutcome.html). The study keeps the parameters of the trial with the highest score.
*/

use crate::hyperparameters::Hyperparameters;
use hazard_util::{err, error::Result, finite::Finite};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// The result of a single trial.
#[derive(Clone, Debug, PartialEq)]
pub enum TrialOutcome {
	/// The trial trained successfully and achieved this score. Higher is better.
	Scored(f32),
	/// The trial failed, for example because training returned an error or the score was not finite.
	Rejected(String),
}

/// A trial draws the values of the hyperparameters it is asked about from the study's sampler, and records them.
pub struct Trial<'a> {
	rng: &'a mut Xoshiro256Plus,
	params: Hyperparameters,
}

impl<'a> Trial<'a> {
	/// Draw an integer uniformly from `low..=high`.
	pub fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> i64 {
		let value = if low >= high {
			low
		} else {
			self.rng.gen_range(low..=high)
		};
		self.params.insert(name, value);
		value
	}

	/// Draw a float from `low..high`. If `log` is true the value is drawn uniformly in log space, which requires `low > 0`.
	pub fn suggest_float(&mut self, name: &str, low: f64, high: f64, log: bool) -> f64 {
		let value = if low >= high {
			low
		} else if log && low > 0.0 {
			self.rng.gen_range(low.ln()..high.ln()).exp().max(low).min(high)
		} else {
			self.rng.gen_range(low..high)
		};
		self.params.insert(name, value);
		value
	}

	pub fn params(&self) -> &Hyperparameters {
		&self.params
	}
}

#[derive(Clone, Debug)]
pub struct TrialRecord {
	pub number: usize,
	pub params: Hyperparameters,
	pub outcome: TrialOutcome,
}

/// A `Study` maximizes the score returned by an objective over a fixed number of trials.
pub struct Study {
	rng: Xoshiro256Plus,
	trials: Vec<TrialRecord>,
}

impl Study {
	pub fn new(seed: u64) -> Study {
		Study {
			rng: Xoshiro256Plus::seed_from_u64(seed),
			trials: Vec::new(),
		}
	}

	/// Run `n_trials` trials of `objective` and return the parameters of the best one. Rejected trials never stop the search. An error is returned only if every trial was rejected.
	pub fn optimize<F>(&mut self, n_trials: usize, mut objective: F) -> Result<Hyperparameters>
	where
		F: FnMut(&mut Trial) -> TrialOutcome,
	{
		tracing::info!(n_trials, "starting hyperparameter optimization");
		for _ in 0..n_trials {
			let number = self.trials.len();
			let mut trial = Trial {
				rng: &mut self.rng,
				params: Hyperparameters::new(),
			};
			let outcome = match objective(&mut trial) {
				TrialOutcome::Scored(score) if !score.is_finite() => {
					TrialOutcome::Rejected(format!("score {} is not finite", score))
				}
				outcome => outcome,
			};
			match &outcome {
				TrialOutcome::Scored(score) => {
					tracing::debug!(number, score, params = %trial.params, "trial finished")
				}
				TrialOutcome::Rejected(reason) => {
					tracing::warn!(number, %reason, params = %trial.params, "trial rejected")
				}
			}
			self.trials.push(TrialRecord {
				number,
				params: trial.params,
				outcome,
			});
		}
		let best = self
			.best_trial()
			.ok_or_else(|| err!("all {} trials were rejected", self.trials.len()))?;
		if let TrialOutcome::Scored(score) = best.outcome {
			tracing::info!(number = best.number, score, params = %best.params, "optimization completed");
		}
		Ok(best.params.clone())
	}

	/// The scored trial with the highest score. Ties go to the earliest trial.
	pub fn best_trial(&self) -> Option<&TrialRecord> {
		let mut best: Option<(Finite<f32>, &TrialRecord)> = None;
		for trial in self.trials.iter() {
			let score = match trial.outcome {
				TrialOutcome::Scored(score) => match Finite::new(score) {
					Ok(score) => score,
					Err(_) => continue,
				},
				TrialOutcome::Rejected(_) => continue,
			};
			let is_better = match &best {
				Some((best_score, _)) => score > *best_score,
				None => true,
			};
			if is_better {
				best = Some((score, trial));
			}
		}
		best.map(|(_, trial)| trial)
	}

	pub fn trials(&self) -> &[TrialRecord] {
		&self.trials
	}
}
