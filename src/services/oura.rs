// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Oura API client for fetching daily metric series.
//!
//! Handles:
//! - Daily score collections (sleep, readiness, activity)
//! - `next_token` pagination
//! - Rate limit detection (429 with `Retry-After`)
//! - Token rejection detection (401) so callers can force a refresh

use chrono::{Days, NaiveDate};
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{DateRange, MetricPoint, MetricSeries, MetricType};

/// Backoff assumed when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Guard against a provider that keeps handing out cursors.
const MAX_PAGES: usize = 50;

/// Oura API client.
#[derive(Clone)]
pub struct OuraClient {
    http: reqwest::Client,
    base_url: String,
}

impl OuraClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: format!("{}/v2/usercollection", config.oura_api_base_url),
        })
    }

    /// Fetch one metric for a date range, following pagination to the end.
    ///
    /// Points are returned in provider order; days with a null score are skipped.
    pub async fn fetch_series(
        &self,
        access_token: &str,
        metric: MetricType,
        range: DateRange,
    ) -> Result<MetricSeries, AppError> {
        let url = format!("{}/{}", self.base_url, metric.endpoint());
        // Oura treats end_date as exclusive on some collections; ask for one
        // extra day and let alignment drop anything outside the range.
        let end_date = range
            .end
            .checked_add_days(Days::new(1))
            .ok_or_else(|| AppError::BadRequest("end_date is out of range".to_string()))?;

        let mut points = Vec::new();
        let mut next_token: Option<String> = None;

        for page in 1..=MAX_PAGES {
            let mut query = vec![
                ("start_date", range.start.to_string()),
                ("end_date", end_date.to_string()),
            ];
            if let Some(token) = &next_token {
                query.push(("next_token", token.clone()));
            }

            let body: DailyPage = self.get_json(&url, access_token, &query).await?;
            points.extend(body.data.into_iter().filter_map(|d| {
                d.score.map(|value| MetricPoint {
                    day: d.day,
                    value,
                })
            }));

            match body.next_token.filter(|t| !t.is_empty()) {
                Some(token) => next_token = Some(token),
                None => {
                    tracing::debug!(%metric, pages = page, points = points.len(), "Fetched series");
                    return Ok(MetricSeries {
                        metric,
                        range,
                        points,
                    });
                }
            }
        }

        Err(AppError::ProviderApi(format!(
            "{} pagination exceeded {} pages",
            metric, MAX_PAGES
        )))
    }

    /// Get the authenticated user's profile.
    pub async fn personal_info(&self, access_token: &str) -> Result<PersonalInfo, AppError> {
        let url = format!("{}/personal_info", self.base_url);
        let info: PersonalInfo = self.get_json(&url, access_token, &[]).await?;
        if info.id.is_empty() {
            return Err(AppError::ProviderApi(
                "personal_info returned an empty user id".to_string(),
            ));
        }
        Ok(info)
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AppError::TemporarilyUnavailable(format!("Oura request failed: {}", e))
                } else {
                    AppError::ProviderApi(e.to_string())
                }
            })?;

        self.check_response_json(response).await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = parse_retry_after(response.headers());
            tracing::warn!(retry_after_secs, "Oura rate limit hit (429)");
            return Err(AppError::RateLimited { retry_after_secs });
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::TokenRejected);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ProviderApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ProviderApi(format!("JSON parse error: {}", e)))
    }
}

fn parse_retry_after(headers: &header::HeaderMap) -> u64 {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// One page of a daily collection.
#[derive(Debug, Deserialize)]
struct DailyPage {
    data: Vec<DailyScore>,
    #[serde(default)]
    next_token: Option<String>,
}

/// The fields we use from a daily document.
#[derive(Debug, Deserialize)]
struct DailyScore {
    day: NaiveDate,
    #[serde(default)]
    score: Option<f64>,
}

/// Oura user profile (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct PersonalInfo {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}
