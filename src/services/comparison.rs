// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cross-account comparison.
//!
//! Fetches one metric for two friends concurrently and aligns both series
//! on the same day axis. A side that cannot be fetched is reported with a
//! failure reason instead of failing the whole comparison, except for
//! decryption failures, which abort.

use std::time::Duration;

use uuid::Uuid;

use crate::error::{AppError, NotAuthorizedReason};
use crate::models::{ComparisonResult, ComparisonSide, DateRange, MetricSeries, MetricType, SideFailure};
use crate::services::friends::FriendshipRegistry;
use crate::services::oura::OuraClient;
use crate::services::tokens::TokenService;

/// Provider calls allowed per side, first attempt included.
pub const MAX_FETCH_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct ComparisonEngine {
    tokens: TokenService,
    oura: OuraClient,
    friends: FriendshipRegistry,
    max_rate_limit_wait: Duration,
}

impl ComparisonEngine {
    pub fn new(
        tokens: TokenService,
        oura: OuraClient,
        friends: FriendshipRegistry,
        max_rate_limit_wait: Duration,
    ) -> Self {
        Self {
            tokens,
            oura,
            friends,
            max_rate_limit_wait,
        }
    }

    /// Compare `metric` for users `a` and `b` over `range`.
    ///
    /// `first` in the result is always `a`, so swapping the arguments swaps
    /// the sides and nothing else.
    pub async fn compare(
        &self,
        a: Uuid,
        b: Uuid,
        metric: MetricType,
        range: DateRange,
    ) -> Result<ComparisonResult, AppError> {
        if a == b {
            return Err(AppError::InvalidRelation(
                "Cannot compare a user with themselves".to_string(),
            ));
        }

        if !self.friends.are_friends(a, b).await? {
            tracing::info!(user_a = %a, user_b = %b, "Comparison denied, users are not friends");
            return Err(AppError::NotAuthorized(NotAuthorizedReason::NotFriends));
        }

        let (first, second) = tokio::join!(
            self.fetch_with_retry(a, metric, range),
            self.fetch_with_retry(b, metric, range)
        );

        let first = into_side(a, &range, first)?;
        let second = into_side(b, &range, second)?;

        tracing::info!(
            user_a = %a,
            user_b = %b,
            %metric,
            days = range.len(),
            first_failed = first.failure.is_some(),
            second_failed = second.failure.is_some(),
            "Comparison complete"
        );

        Ok(ComparisonResult::new(metric, range, first, second))
    }

    /// Fetch one user's series.
    ///
    /// A 401 from Oura forces one refresh; a 429 is waited out if the
    /// provider's delay fits within `max_rate_limit_wait`. Never more than
    /// `MAX_FETCH_ATTEMPTS` provider calls.
    async fn fetch_with_retry(
        &self,
        user_id: Uuid,
        metric: MetricType,
        range: DateRange,
    ) -> Result<MetricSeries, AppError> {
        let mut token = self.tokens.get_valid_token(user_id).await?;
        let mut refreshed = false;
        let mut attempt = 1;

        loop {
            let err = match self.oura.fetch_series(&token, metric, range).await {
                Ok(series) => return Ok(series),
                Err(e) => e,
            };

            if attempt >= MAX_FETCH_ATTEMPTS {
                tracing::warn!(%user_id, %metric, attempt, error = %err, "Giving up on series fetch");
                return Err(err);
            }
            attempt += 1;

            match err {
                AppError::TokenRejected if !refreshed => {
                    refreshed = true;
                    token = self.tokens.force_refresh(user_id, &token).await?;
                }
                AppError::RateLimited { retry_after_secs }
                    if Duration::from_secs(retry_after_secs) <= self.max_rate_limit_wait =>
                {
                    tracing::info!(%user_id, retry_after_secs, "Rate limited, waiting before retry");
                    tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                }
                other => return Err(other),
            }
        }
    }
}

/// Turn one side's fetch outcome into its half of the result.
fn into_side(
    user_id: Uuid,
    range: &DateRange,
    outcome: Result<MetricSeries, AppError>,
) -> Result<ComparisonSide, AppError> {
    match outcome {
        Ok(series) => Ok(ComparisonSide::from_series(user_id, &series)),
        Err(AppError::Decryption(e)) => {
            tracing::error!(%user_id, error = %e, "Aborting comparison, credentials unreadable");
            Err(AppError::Decryption(e))
        }
        Err(e) => {
            let failure = side_failure(&e);
            tracing::warn!(%user_id, error = %e, ?failure, "Comparison side unavailable");
            Ok(ComparisonSide::failed(user_id, range, failure))
        }
    }
}

fn side_failure(err: &AppError) -> SideFailure {
    match err {
        // A token rejected even after a refresh is as good as revoked.
        AppError::NotAuthorized(_) | AppError::TokenRejected => SideFailure::ReconnectRequired,
        AppError::RateLimited { retry_after_secs } => SideFailure::RateLimited {
            retry_after_secs: *retry_after_secs,
        },
        AppError::TemporarilyUnavailable(_) | AppError::Database(_) => {
            SideFailure::TemporarilyUnavailable
        }
        _ => SideFailure::ProviderError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cipher::CipherError;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_side_failure_mapping() {
        assert_eq!(
            side_failure(&AppError::NotAuthorized(NotAuthorizedReason::ReconnectRequired)),
            SideFailure::ReconnectRequired
        );
        assert_eq!(
            side_failure(&AppError::NotAuthorized(NotAuthorizedReason::NotConnected)),
            SideFailure::ReconnectRequired
        );
        assert_eq!(
            side_failure(&AppError::TokenRejected),
            SideFailure::ReconnectRequired
        );
        assert_eq!(
            side_failure(&AppError::RateLimited {
                retry_after_secs: 120
            }),
            SideFailure::RateLimited {
                retry_after_secs: 120
            }
        );
        assert_eq!(
            side_failure(&AppError::TemporarilyUnavailable("timeout".into())),
            SideFailure::TemporarilyUnavailable
        );
        assert_eq!(
            side_failure(&AppError::ProviderApi("HTTP 500".into())),
            SideFailure::ProviderError
        );
    }

    #[test]
    fn test_into_side_keeps_length_on_failure() {
        let user = Uuid::new_v4();
        let side = into_side(user, &range(), Err(AppError::TokenRejected)).unwrap();
        assert_eq!(side.user_id, user);
        assert_eq!(side.values, vec![None, None, None]);
        assert_eq!(side.failure, Some(SideFailure::ReconnectRequired));
    }

    #[test]
    fn test_into_side_decryption_aborts() {
        let result = into_side(
            Uuid::new_v4(),
            &range(),
            Err(AppError::Decryption(CipherError::Decryption)),
        );
        assert!(matches!(result, Err(AppError::Decryption(_))));
    }
}
