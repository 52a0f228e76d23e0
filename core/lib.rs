/*!
This crate is the training pipeline. It turns a csv file into fitted, evaluated and persisted models:

1. [`preprocess`](preprocess/fn.preprocess.html) drops identifier columns, fits feature groups and splits the rows into train and test partitions.
2. [`Model`](model/enum.Model.html) is created from a [`ModelName`](model/enum.ModelName.html) and trains a [`FittedModel`](model/enum.FittedModel.html), optionally after a hyperparameter search with a [`Study`](tune/struct.Study.html).
3. [`train_model`](train/fn.train_model.html) evaluates the fitted model on the test partition and saves a [`ModelArtifact`](persist/struct.ModelArtifact.html).

The [`hazards`](hazards/index.html) module trains the earthquake, flood and forest fire models used by the hazard prediction server.
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod config;
pub mod hazards;
pub mod hyperparameters;
pub mod model;
pub mod persist;
pub mod preprocess;
pub mod train;
pub mod tune;

pub use self::train::{run, train_model};
