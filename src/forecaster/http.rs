use crate::error::{truncate_chars, AppError, Result, OUTPUT_PREFIX_CHARS};
use crate::forecaster::Forecaster;
use crate::models::ForecastInput;
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Sends the input to a remote prediction service instead of a local
/// process. Same contract: JSON body in, raw JSON body out.
pub struct HttpForecaster {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpForecaster {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("iot-forecast/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            error!(
                "Forecaster {} timed out after {:.1}s",
                self.url,
                self.timeout.as_secs_f64()
            );
            AppError::InvocationTimeout {
                command: self.describe(),
                timeout: self.timeout,
            }
        } else {
            error!("Forecaster {} unreachable: {}", self.url, err);
            AppError::ForecasterUnavailable(format!("{}: {}", self.url, err))
        }
    }
}

#[async_trait]
impl Forecaster for HttpForecaster {
    async fn predict(&self, input: &ForecastInput) -> Result<Vec<u8>> {
        debug!(
            "Posting {} readings for {} to {}",
            input.readings.len(),
            input.estacion,
            self.url
        );
        let started = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .json(input)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        debug!(
            "Forecaster {} answered {} after {}ms ({} bytes)",
            self.url,
            status,
            started.elapsed().as_millis(),
            body.len()
        );

        if !status.is_success() || body.is_empty() {
            let text = String::from_utf8_lossy(&body);
            let err = AppError::ForecasterRejected {
                endpoint: self.describe(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body_prefix: if text.trim().is_empty() {
                    None
                } else {
                    Some(truncate_chars(text.trim(), OUTPUT_PREFIX_CHARS))
                },
            };
            error!("{}", err);
            return Err(err);
        }

        Ok(body.to_vec())
    }

    fn describe(&self) -> String {
        format!("POST {}", self.url)
    }
}
