//! CompletionHook implementations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;

use super::http_client::{build_http_client, decode_json, parse_base_url, transport_error};
use crate::domain::{JobStatus, TaskRecord, TrackerError, TrainingStatus};
use crate::ports::CompletionHook;

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl<S: JobStatus> CompletionHook<S> for NoopHook {
    async fn on_terminal_success(&self, _record: &TaskRecord<S>) -> Result<(), TrackerError> {
        Ok(())
    }
}

/// Logs the completion at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook;

#[async_trait]
impl<S: JobStatus> CompletionHook<S> for LoggingHook {
    async fn on_terminal_success(&self, record: &TaskRecord<S>) -> Result<(), TrackerError> {
        tracing::info!(
            tracker = S::TRACKER,
            job_id = %record.job_id,
            correlation_id = %record.correlation_id,
            elapsed_minutes = record.elapsed_minutes,
            "job finished successfully"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RegisterModel<'a> {
    experiment_id: &'a str,
    model_id: &'a str,
}

/// Registers the trained model once an experiment reaches `DONE`.
///
/// `POST {base}/models` with `{"experiment_id": .., "model_id": ..}`.
pub struct HttpModelRegistrar {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpModelRegistrar {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TrackerError> {
        let mut endpoint = parse_base_url(base_url)?;
        endpoint
            .path_segments_mut()
            .map_err(|_| TrackerError::Config(format!("base url '{base_url}' cannot carry a path")))?
            .pop_if_empty()
            .push("models");
        let timeout = timeout.max(Duration::from_millis(1));
        Ok(Self {
            http: build_http_client(timeout)?,
            endpoint,
            timeout,
        })
    }
}

#[async_trait]
impl CompletionHook<TrainingStatus> for HttpModelRegistrar {
    async fn on_terminal_success(
        &self,
        record: &TaskRecord<TrainingStatus>,
    ) -> Result<(), TrackerError> {
        let body = RegisterModel {
            experiment_id: record.job_id.as_str(),
            model_id: record.correlation_id.as_str(),
        };
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(err, self.timeout))?;
        // 作成されたリソースの中身は使わない
        let _created: serde_json::Value = decode_json(response, self.timeout).await?;
        tracing::info!(
            job_id = %record.job_id,
            model_id = %record.correlation_id,
            "registered trained model"
        );
        Ok(())
    }
}
