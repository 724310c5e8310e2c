//! Karma lookups and level arithmetic.
//!
//! Every 100 karma points is one level, starting at level 1.

use futures::future::try_join;
use serde::Serialize;

use crate::api::client::DEFAULT_KARMA_LIMIT;
use crate::api::{ApiError, ForumClient, Transport};
use crate::auth::tokens::TokenStore;
use crate::models::{KarmaEvent, KarmaSummary};

/// Karma points per level
const POINTS_PER_LEVEL: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryOptions {
    pub limit: u32,
    pub page: u32,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_KARMA_LIMIT,
            page: 1,
        }
    }
}

/// Where a point total sits within its level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub current_level: i64,
    pub points_in_level: i64,
    /// Percent of the way to the next level; equals `points_in_level` at 100 points per level
    pub progress_percent: i64,
    pub points_to_next: i64,
    pub next_level: i64,
}

impl LevelProgress {
    pub fn from_points(points: i64) -> Self {
        // Euclidean division keeps negative totals in a sensible band
        let current_level = points.div_euclid(POINTS_PER_LEVEL) + 1;
        let points_in_level = points.rem_euclid(POINTS_PER_LEVEL);
        Self {
            current_level,
            points_in_level,
            progress_percent: points_in_level * 100 / POINTS_PER_LEVEL,
            points_to_next: POINTS_PER_LEVEL - points_in_level,
            next_level: current_level + 1,
        }
    }
}

pub async fn my_history<T: Transport, S: TokenStore>(
    client: &ForumClient<T, S>,
    options: HistoryOptions,
) -> Result<Vec<KarmaEvent>, ApiError> {
    let summary = client.my_karma(options.limit, options.page).await?;
    Ok(summary.recent_history)
}

pub async fn user_history<T: Transport, S: TokenStore>(
    client: &ForumClient<T, S>,
    username: &str,
    options: HistoryOptions,
) -> Result<Vec<KarmaEvent>, ApiError> {
    let summary = client
        .user_karma(username, options.limit, options.page)
        .await?;
    Ok(summary.recent_history)
}

/// The signed-in user's karma next to the current leaderboard
#[derive(Debug, Clone)]
pub struct KarmaOverview {
    pub mine: KarmaSummary,
    pub progress: LevelProgress,
    pub leaderboard: Vec<KarmaSummary>,
}

impl KarmaOverview {
    /// 1-based leaderboard position of the signed-in user, if listed
    pub fn rank(&self) -> Option<usize> {
        self.leaderboard
            .iter()
            .position(|entry| entry.username == self.mine.username)
            .map(|i| i + 1)
    }
}

/// Fetch own karma and the leaderboard concurrently
pub async fn overview<T: Transport, S: TokenStore>(
    client: &ForumClient<T, S>,
    leaderboard_limit: u32,
) -> Result<KarmaOverview, ApiError> {
    let defaults = HistoryOptions::default();
    let (mine, leaderboard) = try_join(
        client.my_karma(defaults.limit, defaults.page),
        client.leaderboard(leaderboard_limit),
    )
    .await?;

    Ok(KarmaOverview {
        progress: LevelProgress::from_points(mine.karma_points),
        mine,
        leaderboard,
    })
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::api::testing::MockForum;
    use crate::api::SessionController;
    use crate::auth::tokens::{CredentialPair, MemoryTokenStore};

    #[test]
    fn test_level_progress() {
        assert_eq!(
            LevelProgress::from_points(0),
            LevelProgress {
                current_level: 1,
                points_in_level: 0,
                progress_percent: 0,
                points_to_next: 100,
                next_level: 2,
            }
        );

        let p = LevelProgress::from_points(240);
        assert_eq!(p.current_level, 3);
        assert_eq!(p.points_in_level, 40);
        assert_eq!(p.points_to_next, 60);

        let p = LevelProgress::from_points(100);
        assert_eq!(p.current_level, 2);
        assert_eq!(p.points_in_level, 0);

        let p = LevelProgress::from_points(-30);
        assert_eq!(p.current_level, 0);
        assert_eq!(p.points_in_level, 70);
    }

    fn client(forum: MockForum) -> ForumClient<MockForum, MemoryTokenStore> {
        ForumClient::new(SessionController::new(
            forum,
            MemoryTokenStore::with_pair(&CredentialPair::new("A1", "R1")),
        ))
    }

    #[tokio::test]
    async fn test_history_defaults_and_missing_history() {
        let forum = MockForum::new()
            .with_session("A1", "R1")
            .route(
                Method::GET,
                "/karma/my_karma/",
                json!({"username": "scout", "karma_points": 240, "karma_level": 3,
                       "recent_history": [{"points": 5, "reason": "Post liked",
                                           "created_at": "2025-03-01T12:00:00Z"}]}),
            )
            .route(
                Method::GET,
                "/karma/user/ghost/",
                json!({"username": "ghost", "karma_points": 0, "karma_level": 1}),
            );
        let client = client(forum);

        let history = my_history(&client, HistoryOptions::default()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, "Post liked");

        let sent = &client.session().transport().requests_to("/karma/my_karma/")[0];
        assert_eq!(
            sent.query,
            vec![
                ("limit".to_string(), "10".to_string()),
                ("page".to_string(), "1".to_string())
            ]
        );

        let history = user_history(&client, "ghost", HistoryOptions::default())
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_overview_ranks_user() {
        let forum = MockForum::new()
            .with_session("A1", "R1")
            .route(
                Method::GET,
                "/karma/my_karma/",
                json!({"username": "scout", "karma_points": 240, "karma_level": 3}),
            )
            .route(
                Method::GET,
                "/karma/leaderboard/",
                json!([
                    {"username": "top", "karma_points": 900, "karma_level": 10},
                    {"username": "scout", "karma_points": 240, "karma_level": 3}
                ]),
            );
        let client = client(forum);

        let overview = overview(&client, 5).await.unwrap();
        assert_eq!(overview.rank(), Some(2));
        assert_eq!(overview.progress.current_level, 3);
    }
}
