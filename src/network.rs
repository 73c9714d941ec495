use anyhow::{ Context, Result };
use async_trait::async_trait;
use reqwest::header::{ ACCEPT, CONTENT_TYPE, USER_AGENT };
use reqwest::{ Response, StatusCode };
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::UpstreamError;
use crate::types::{ FlightRecord, StatesResponse };

/// Upstream traffic feed
///
/// Both calls are bounded by the client's request timeout so a stalled
/// upstream cannot wedge the poll loop.
#[async_trait]
pub trait TrafficSource: Send + Sync {
    /// Fetch the bulk state vectors of every tracked aircraft
    async fn fetch_states(&self) -> Result<StatesResponse, UpstreamError>;

    /// Fetch flight segments of one aircraft between `begin` and `end` (unix seconds)
    async fn fetch_flights(
        &self,
        icao24: &str,
        begin: i64,
        end: i64
    ) -> Result<Vec<FlightRecord>, UpstreamError>;
}

/// REST client for the OpenSky Network API
pub struct OpenSkyClient {
    states_url: String,
    flights_url: String,
    user_agent: String,
    client: reqwest::Client,
}

impl OpenSkyClient {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client
            ::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            states_url: config.states_url.clone(),
            flights_url: config.flights_url.clone(),
            user_agent: config.user_agent.clone(),
            client,
        })
    }
}

#[async_trait]
impl TrafficSource for OpenSkyClient {
    async fn fetch_states(&self) -> Result<StatesResponse, UpstreamError> {
        let resp = self.client
            .get(&self.states_url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send().await?;

        let status = resp.status();
        let content_type = header_value(&resp, CONTENT_TYPE);

        if let Err(e) = check_response(status, content_type.as_deref()) {
            // body is only for the log, an unreadable one must not mask the status
            let excerpt: String = resp.text().await.unwrap_or_default().chars().take(200).collect();
            tracing::warn!("OpenSky states request failed ({}): {}", status, excerpt);
            return Err(e);
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch_flights(
        &self,
        icao24: &str,
        begin: i64,
        end: i64
    ) -> Result<Vec<FlightRecord>, UpstreamError> {
        let resp = self.client
            .get(&self.flights_url)
            .query(&[("icao24", icao24.to_string()), ("begin", begin.to_string()), ("end", end.to_string())])
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send().await?;

        // OpenSky answers 404 when no flight falls inside the window
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let status = resp.status();
        let content_type = header_value(&resp, CONTENT_TYPE);
        check_response(status, content_type.as_deref())?;

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn header_value(resp: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Reject responses that cannot carry a usable JSON body
pub fn check_response(status: StatusCode, content_type: Option<&str>) -> Result<(), UpstreamError> {
    if !status.is_success() {
        return Err(UpstreamError::Status { status: status.as_u16() });
    }

    match content_type {
        Some(ct) if ct.contains("application/json") => Ok(()),
        other =>
            Err(UpstreamError::NotJson {
                content_type: other.unwrap_or("no content type").to_string(),
            }),
    }
}
