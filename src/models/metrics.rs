// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Metric series and comparison results.
//!
//! Series are fetched per request and never persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use uuid::Uuid;

use crate::error::AppError;

/// Longest date range a single comparison may request.
pub const MAX_RANGE_DAYS: i64 = 90;

/// Daily metrics we know how to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum MetricType {
    Sleep,
    Readiness,
    Activity,
}

impl MetricType {
    pub const ALL: [MetricType; 3] = [Self::Sleep, Self::Readiness, Self::Activity];

    /// Oura v2 usercollection endpoint carrying this metric's daily score.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Sleep => "daily_sleep",
            Self::Readiness => "daily_readiness",
            Self::Activity => "daily_activity",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sleep => "sleep",
            Self::Readiness => "readiness",
            Self::Activity => "activity",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sleep" => Ok(Self::Sleep),
            "readiness" => Ok(Self::Readiness),
            "activity" => Ok(Self::Activity),
            _ => Err(AppError::BadRequest(format!("Unknown metric: {}", s))),
        }
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::BadRequest(
                "start_date must not be after end_date".to_string(),
            ));
        }
        // Oura is queried up to the day after `end`.
        if end.succ_opt().is_none() {
            return Err(AppError::BadRequest(
                "end_date is out of range".to_string(),
            ));
        }
        let range = Self { start, end };
        if range.len() as i64 > MAX_RANGE_DAYS {
            return Err(AppError::BadRequest(format!(
                "Date range may span at most {} days",
                MAX_RANGE_DAYS
            )));
        }
        Ok(range)
    }

    /// Number of days in the range (both ends included).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Every day in the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        let end = self.end;
        start.iter_days().take_while(move |day| *day <= end)
    }
}

/// One daily value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub day: NaiveDate,
    pub value: f64,
}

/// One user's raw series as returned by Oura (provider order preserved).
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub metric: MetricType,
    pub range: DateRange,
    pub points: Vec<MetricPoint>,
}

impl MetricSeries {
    /// Project this series onto every day of its range. Days without a
    /// point become `None`; the first point for a day wins; points outside
    /// the range are dropped.
    pub fn align(&self) -> Vec<Option<f64>> {
        let mut by_day: HashMap<NaiveDate, f64> = HashMap::with_capacity(self.points.len());
        for point in &self.points {
            if self.range.contains(point.day) {
                by_day.entry(point.day).or_insert(point.value);
            }
        }
        self.range.days().map(|day| by_day.get(&day).copied()).collect()
    }
}

/// Why one side of a comparison has no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum SideFailure {
    /// The user must reconnect their Oura account.
    ReconnectRequired,
    /// Oura or storage is unreachable right now.
    TemporarilyUnavailable,
    /// Oura asked us to back off.
    RateLimited { retry_after_secs: u64 },
    /// Oura returned an unexpected response.
    ProviderError,
}

/// One user's half of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ComparisonSide {
    pub user_id: Uuid,
    /// One entry per day of the range; `null` means no data for that day.
    pub values: Vec<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<SideFailure>,
}

impl ComparisonSide {
    pub fn from_series(user_id: Uuid, series: &MetricSeries) -> Self {
        Self {
            user_id,
            values: series.align(),
            failure: None,
        }
    }

    /// A side whose fetch failed: every day marked as no data.
    pub fn failed(user_id: Uuid, range: &DateRange, failure: SideFailure) -> Self {
        Self {
            user_id,
            values: vec![None; range.len()],
            failure: Some(failure),
        }
    }
}

/// Two users' series for the same metric, aligned on a shared day axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ComparisonResult {
    pub metric: MetricType,
    pub range: DateRange,
    pub days: Vec<NaiveDate>,
    pub first: ComparisonSide,
    pub second: ComparisonSide,
}

impl ComparisonResult {
    pub fn new(
        metric: MetricType,
        range: DateRange,
        first: ComparisonSide,
        second: ComparisonSide,
    ) -> Self {
        Self {
            metric,
            range,
            days: range.days().collect(),
            first,
            second,
        }
    }
}
