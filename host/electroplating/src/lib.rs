#![cfg_attr(not(any(test, feature = "mock")), no_std)]

pub mod anode;
pub mod config;
pub mod controller;
pub mod electroplater;
pub mod error;
pub mod hardware;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::{ControlParameters, PlatingOptions};
pub use controller::RunSummary;
pub use electroplater::Electroplater;
pub use error::ElectroplatingError;
