//! Prometheus client (C6 support): executes instant PromQL queries and
//! parses the result set into per-pod samples for the PromQL validator.

use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrometheusError {
    #[error("Prometheus HTTP error: {0}")]
    Http(String),
    #[error("Prometheus returned non-success status: {0}")]
    QueryFailed(String),
    #[error("failed to parse Prometheus response: {0}")]
    Parse(String),
}

/// One `(metric labels, scalar value)` sample from an instant query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: HashMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct InstantQueryResponse {
    status: String,
    data: InstantQueryData,
}

#[derive(Debug, Deserialize)]
struct InstantQueryData {
    result: Vec<InstantQueryResult>,
}

#[derive(Debug, Deserialize)]
struct InstantQueryResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

fn parse_instant_query(body: &str) -> Result<Vec<Sample>, PrometheusError> {
    let response: InstantQueryResponse =
        serde_json::from_str(body).map_err(|e| PrometheusError::Parse(e.to_string()))?;

    if response.status != "success" {
        return Err(PrometheusError::QueryFailed(response.status));
    }

    response
        .data
        .result
        .into_iter()
        .map(|r| {
            let value = r
                .value
                .1
                .parse::<f64>()
                .map_err(|e| PrometheusError::Parse(format!("invalid sample value: {e}")))?;
            Ok(Sample {
                labels: r.metric,
                value,
            })
        })
        .collect()
}

/// Thin wrapper over an instant-query HTTP call. The production variant
/// issues a real `GET`; under `#[cfg(test)]` it is backed by a canned
/// response instead, so [`crate::controller::strategies::validation`]'s
/// PromQL path can be exercised without a live Prometheus.
#[derive(Clone)]
pub struct PrometheusClient {
    #[cfg(not(test))]
    http: reqwest::Client,
    #[cfg(test)]
    mock_response: std::sync::Arc<std::sync::Mutex<Option<Result<String, String>>>>,
}

impl Default for PrometheusClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusClient {
    #[cfg(not(test))]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    pub fn new() -> Self {
        Self {
            mock_response: std::sync::Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Create a mock client for tests. An alias of `new()` under `cfg(test)`,
    /// kept as its own name so call sites read as test setup rather than
    /// production construction.
    #[cfg(test)]
    pub fn new_mock() -> Self {
        Self::new()
    }

    /// Set the body `query_instant` returns on its next call, standing in
    /// for a Prometheus instant-query HTTP response.
    #[cfg(test)]
    pub fn set_mock_response(&self, body: String) {
        if let Ok(mut mock) = self.mock_response.lock() {
            *mock = Some(Ok(body));
        }
    }

    /// Make the next `query_instant` call fail as if the HTTP request
    /// itself had failed, exercising the no-signal/errored path.
    #[cfg(test)]
    pub fn set_mock_error(&self, message: impl Into<String>) {
        if let Ok(mut mock) = self.mock_response.lock() {
            *mock = Some(Err(message.into()));
        }
    }

    /// Query `service` (host:port, no scheme) with `query`, returning the
    /// parsed sample set. `service` is trusted cluster-internal config, not
    /// user input from outside the cluster.
    #[cfg(not(test))]
    pub async fn query_instant(&self, service: &str, query: &str) -> Result<Vec<Sample>, PrometheusError> {
        let url = format!("http://{service}/api/v1/query");
        let response = self
            .http
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| PrometheusError::Http(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| PrometheusError::Http(e.to_string()))?;

        parse_instant_query(&body)
    }

    /// Mock version: returns the canned body set via `set_mock_response`,
    /// or `Err` if `set_mock_error` was used, or a missing-mock error if
    /// neither was set for this call.
    #[cfg(test)]
    pub async fn query_instant(&self, _service: &str, _query: &str) -> Result<Vec<Sample>, PrometheusError> {
        let mock = self
            .mock_response
            .lock()
            .map_err(|_| PrometheusError::Http("mock lock poisoned".to_string()))?;
        match mock.as_ref() {
            Some(Ok(body)) => parse_instant_query(body),
            Some(Err(message)) => Err(PrometheusError::Http(message.clone())),
            None => Err(PrometheusError::Http("no mock response set".to_string())),
        }
    }
}

#[cfg(test)]
#[path = "prometheus_test.rs"]
mod tests;
