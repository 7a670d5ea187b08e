//! Channel snapshots, period deltas and the recommended feed.

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{Id, Post, StatCounters};
use crate::repo::{Repo, RepoResult};

pub const RECOMMENDED_WINDOW_DAYS: i64 = 7;
pub const RECOMMENDED_PAGE_SIZE: i64 = 10;

/// Per-counter weights of the feed rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingWeights {
    pub views: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub comments: i64,
}

impl RankingWeights {
    pub const DEFAULT: RankingWeights = RankingWeights { views: 1, likes: 3, dislikes: -2, comments: 2 };
}

impl Default for RankingWeights {
    fn default() -> Self { Self::DEFAULT }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    /// Missing or empty means `day`.
    pub fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw.unwrap_or("") {
            "" | "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            _ => Err(ApiError::validation("Invalid period")),
        }
    }

    /// Date of the snapshot `today` is compared against. Month and year
    /// steps are calendar steps, clamped to the end of shorter months.
    pub fn baseline(self, today: NaiveDate) -> NaiveDate {
        let earlier = match self {
            Period::Day => today.checked_sub_days(Days::new(1)),
            Period::Week => today.checked_sub_days(Days::new(7)),
            Period::Month => today.checked_sub_months(Months::new(1)),
            Period::Year => today.checked_sub_months(Months::new(12)),
        };
        earlier.unwrap_or(NaiveDate::MIN)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatisticsReport {
    pub current: StatCounters,
    pub delta: StatCounters,
}

/// Rebuild the channel's row for `today` from live data.
pub async fn refresh_snapshot(repo: &dyn Repo, channel_id: Id, today: NaiveDate) -> RepoResult<StatCounters> {
    repo.reconcile_reaction_counts(channel_id).await?;
    let counters = repo.channel_counters(channel_id).await?;
    let row = repo.replace_snapshot(channel_id, today, counters).await?;
    Ok(row.counters())
}

/// Owner-only view of today's counters and their change over `period`.
pub async fn channel_report(
    repo: &dyn Repo,
    user_id: Id,
    channel_id: Id,
    period: Period,
    today: NaiveDate,
) -> Result<StatisticsReport, ApiError> {
    let channel = repo
        .get_channel(channel_id)
        .await
        .map_err(crate::error::not_found_as("Channel not found"))?;
    if channel.owner_id != user_id {
        return Err(ApiError::forbidden("You are not the owner of this channel"));
    }
    let current = refresh_snapshot(repo, channel_id, today).await?;
    let previous = repo
        .get_snapshot(channel_id, period.baseline(today))
        .await?
        .map(|row| row.counters())
        .unwrap_or_default();
    Ok(StatisticsReport { current, delta: current.delta(&previous) })
}

/// One page of the recommended feed, best rated first.
pub async fn recommended_posts(
    repo: &dyn Repo,
    now: DateTime<Utc>,
    window_days: i64,
    weights: RankingWeights,
    page: i64,
) -> Result<Vec<Post>, ApiError> {
    if page < 1 {
        return Err(ApiError::validation("Invalid page value"));
    }
    let since = now - chrono::Duration::days(window_days);
    let ids = repo
        .ranked_post_ids(since, weights, (page - 1) * RECOMMENDED_PAGE_SIZE, RECOMMENDED_PAGE_SIZE)
        .await?;
    let mut posts = repo.get_posts_by_ids(&ids).await?;
    posts.sort_by_key(|p| ids.iter().position(|id| *id == p.id));
    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn period_parsing() {
        assert_eq!(Period::parse(None).unwrap(), Period::Day);
        assert_eq!(Period::parse(Some("")).unwrap(), Period::Day);
        assert_eq!(Period::parse(Some("week")).unwrap(), Period::Week);
        assert!(matches!(Period::parse(Some("decade")), Err(ApiError::Validation(_))));
    }

    #[test]
    fn baselines_use_calendar_steps() {
        let today = d(2024, 3, 31);
        assert_eq!(Period::Day.baseline(today), d(2024, 3, 30));
        assert_eq!(Period::Week.baseline(today), d(2024, 3, 24));
        assert_eq!(Period::Month.baseline(today), d(2024, 2, 29));
        assert_eq!(Period::Year.baseline(d(2024, 2, 29)), d(2023, 2, 28));
    }

    #[test]
    fn delta_is_elementwise() {
        let cur = StatCounters { views: 10, likes: 4, dislikes: 1, posts: 3, comments: 7 };
        let prev = StatCounters { views: 4, likes: 5, dislikes: 1, posts: 1, comments: 2 };
        assert_eq!(
            cur.delta(&prev),
            StatCounters { views: 6, likes: -1, dislikes: 0, posts: 2, comments: 5 }
        );
        assert_eq!(cur.delta(&StatCounters::default()), cur);
    }

    #[test]
    fn default_weights() {
        let w = RankingWeights::DEFAULT;
        assert_eq!(crate::repo::rating(&w, 10, 2, 1, 3), 10 + 6 - 2 + 6);
    }
}
