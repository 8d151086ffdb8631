// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod friendship;
pub mod metrics;
pub mod user;

pub use friendship::{FriendStatus, FriendshipEdge};
pub use metrics::{
    ComparisonResult, ComparisonSide, DateRange, MetricPoint, MetricSeries, MetricType,
    SideFailure, MAX_RANGE_DAYS,
};
pub use user::{CredentialRecord, UserIdentity};
