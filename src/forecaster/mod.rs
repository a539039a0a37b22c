//! The prediction model collaborator.
//!
//! A forecaster receives the assembled history and returns the model's raw
//! response bytes. It reports failures to run the model but does not judge
//! whether the bytes are a well-formed forecast; the prediction service
//! does that.

pub mod http;
pub mod process;

use crate::config::ForecasterConfig;
use crate::error::Result;
use crate::models::ForecastInput;
use async_trait::async_trait;
use std::sync::Arc;

pub use http::HttpForecaster;
pub use process::ProcessForecaster;

#[async_trait]
pub trait Forecaster: Send + Sync {
    /// Run the model on `input` and return its raw, non-empty output
    async fn predict(&self, input: &ForecastInput) -> Result<Vec<u8>>;

    /// Human-readable description used in logs and error messages
    fn describe(&self) -> String;
}

/// Build the forecaster selected by configuration
pub fn from_config(config: &ForecasterConfig) -> Result<Arc<dyn Forecaster>> {
    let forecaster: Arc<dyn Forecaster> = match config {
        ForecasterConfig::Process {
            command,
            args,
            working_dir,
            ..
        } => {
            let mut process = ProcessForecaster::new(command, args.clone(), config.timeout());
            if let Some(dir) = working_dir {
                process = process.with_working_dir(dir);
            }
            Arc::new(process)
        }
        ForecasterConfig::Http { url, .. } => Arc::new(HttpForecaster::new(url, config.timeout())?),
    };

    Ok(forecaster)
}
