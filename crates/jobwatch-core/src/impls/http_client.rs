//! HttpStatusClient - REST バックエンド向けの StatusClient
//!
//! `GET {base}/{resource}/{job_id}/status` と `GET {base}/{resource}/{job_id}/metrics`
//! を叩きます。job_id はパスセグメントとしてエンコードされます。

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::domain::{FetchError, JobId, JobStatus, MetricsSnapshot, StatusSnapshot, TrackerError};
use crate::ports::StatusClient;

/// Path layout of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub resource: String,
    pub status: String,
    pub metrics: String,
}

impl Routes {
    /// `/experiments/{id}/status`, `/experiments/{id}/metrics`
    pub fn training() -> Self {
        Self {
            resource: "experiments".to_string(),
            status: "status".to_string(),
            metrics: "metrics".to_string(),
        }
    }

    /// `/deployments/{id}/status`, `/deployments/{id}/metrics`
    pub fn deployment() -> Self {
        Self {
            resource: "deployments".to_string(),
            status: "status".to_string(),
            metrics: "metrics".to_string(),
        }
    }
}

pub struct HttpStatusClient<S> {
    http: reqwest::Client,
    base_url: Url,
    routes: Routes,
    timeout: Duration,
    _status: PhantomData<fn() -> S>,
}

impl<S: JobStatus> HttpStatusClient<S> {
    pub fn new(base_url: &str, routes: Routes, timeout: Duration) -> Result<Self, TrackerError> {
        let base_url = parse_base_url(base_url)?;
        let timeout = timeout.max(Duration::from_millis(1));
        let http = build_http_client(timeout)?;
        Ok(Self {
            http,
            base_url,
            routes,
            timeout,
            _status: PhantomData,
        })
    }

    fn job_url(&self, job_id: &JobId, leaf: &str) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport(format!("base url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .push(&self.routes.resource)
            .push(job_id.as_str())
            .push(leaf);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        tracing::debug!(tracker = S::TRACKER, url = %url, "fetching");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| transport_error(err, self.timeout))?;
        decode_json(response, self.timeout).await
    }
}

#[async_trait]
impl<S: JobStatus> StatusClient<S> for HttpStatusClient<S> {
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusSnapshot<S>, FetchError> {
        let url = self.job_url(job_id, &self.routes.status)?;
        self.get_json(url).await
    }

    async fn fetch_metrics(&self, job_id: &JobId) -> Result<MetricsSnapshot, FetchError> {
        let url = self.job_url(job_id, &self.routes.metrics)?;
        self.get_json(url).await
    }
}

pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, TrackerError> {
    let url = Url::parse(base_url.trim())
        .map_err(|err| TrackerError::Config(format!("invalid base url '{base_url}': {err}")))?;
    if url.cannot_be_a_base() {
        return Err(TrackerError::Config(format!(
            "base url '{base_url}' cannot carry a path"
        )));
    }
    Ok(url)
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, TrackerError> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_static("jobwatch"),
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|err| TrackerError::Config(format!("failed to create http client: {err}")))
}

pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::TimedOut(timeout)
    } else {
        FetchError::Transport(err.to_string())
    }
}

/// Non-success codes are soft failures; a 2xx body that does not decode is malformed.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<T, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::SoftFailure {
            http_status: status.as_u16(),
        });
    }
    let body = response
        .text()
        .await
        .map_err(|err| transport_error(err, timeout))?;
    serde_json::from_str(&body).map_err(|err| FetchError::Malformed(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TrainingStatus;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> HttpStatusClient<TrainingStatus> {
        HttpStatusClient::new(&server.base_url(), Routes::training(), Duration::from_secs(5))
            .unwrap()
    }

    fn job(id: &str) -> JobId {
        JobId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn fetch_status_decodes_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/experiments/exp-1/status");
                then.status(200).json_body(serde_json::json!({
                    "status": "TRAINING",
                    "expectedDurationSeconds": 900
                }));
            })
            .await;

        let snap = client(&server).fetch_status(&job("exp-1")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(snap.status, TrainingStatus::Training);
        assert_eq!(snap.expected_duration_seconds, Some(900.0));
    }

    #[tokio::test]
    async fn fetch_metrics_decodes_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/experiments/exp-1/metrics");
                then.status(200).json_body(serde_json::json!({
                    "epoch": 3,
                    "score": 0.81,
                    "scoreMetricName": "accuracy"
                }));
            })
            .await;

        let snap = client(&server).fetch_metrics(&job("exp-1")).await.unwrap();

        assert_eq!(snap, MetricsSnapshot {
            epoch: 3,
            score: 0.81,
            score_metric_name: Some("accuracy".to_string()),
        });
    }

    #[tokio::test]
    async fn error_codes_are_soft_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/experiments/exp-422/status");
                then.status(422);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/experiments/exp-500/status");
                then.status(500);
            })
            .await;

        let c = client(&server);
        assert_eq!(
            c.fetch_status(&job("exp-422")).await.unwrap_err(),
            FetchError::SoftFailure { http_status: 422 }
        );
        assert_eq!(
            c.fetch_status(&job("exp-500")).await.unwrap_err(),
            FetchError::SoftFailure { http_status: 500 }
        );
    }

    #[tokio::test]
    async fn unknown_status_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/experiments/exp-1/status");
                then.status(200).json_body(serde_json::json!({ "status": "WARMING_UP" }));
            })
            .await;

        let err = client(&server).fetch_status(&job("exp-1")).await.unwrap_err();

        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let c: HttpStatusClient<TrainingStatus> =
            HttpStatusClient::new("http://127.0.0.1:1", Routes::training(), Duration::from_secs(2))
                .unwrap();

        let err = c.fetch_status(&job("exp-1")).await.unwrap_err();

        assert!(matches!(err, FetchError::Transport(_) | FetchError::TimedOut(_)));
    }

    #[test]
    fn job_ids_are_path_encoded() {
        let c: HttpStatusClient<TrainingStatus> =
            HttpStatusClient::new("http://localhost:8000/api/", Routes::training(), Duration::from_secs(1))
                .unwrap();

        let url = c.job_url(&job("run 1/a"), "status").unwrap();

        assert_eq!(url.as_str(), "http://localhost:8000/api/experiments/run%201%2Fa/status");
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let err = HttpStatusClient::<TrainingStatus>::new(
            "not a url",
            Routes::training(),
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(err, TrackerError::Config(_)));
    }
}
