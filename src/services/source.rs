//! Source fetcher boundary: new items from a monitored external account

use crate::error::FetchError;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// One item from the external source (e.g. a post)
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub id: String,
    pub text: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// Fetches new items for a monitored source since a watermark cursor.
///
/// Implementations must return items in ascending chronological order and
/// accept `since = None` as "no prior watermark: most recent items only,
/// not full history".
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_new(
        &self,
        source_ref: &str,
        since: Option<&str>,
        max_items: usize,
    ) -> Result<Vec<SourceItem>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    data: Option<UserData>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<TimelineItem>,
}

#[derive(Debug, Deserialize)]
struct TimelineItem {
    id: String,
    text: String,
    created_at: Option<DateTime<Utc>>,
}

/// HTTP adapter for an X-style timeline API.
///
/// Resolves the account ref to a user id, then pages the user timeline
/// with `since_id`, excluding reposts and replies. Transient request
/// failures are retried briefly; anything that still fails surfaces as a
/// `FetchError` and is retried on the next scheduler tick.
pub struct HttpSourceFetcher {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpSourceFetcher {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let send = || async {
            self.client
                .get(url)
                .bearer_auth(&self.bearer_token)
                .query(query)
                .send()
                .await
        };

        let response = send
            .retry(ExponentialBuilder::default().with_max_times(2))
            .when(|e: &reqwest::Error| e.is_timeout() || e.is_connect())
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::SourceNotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Request(format!("{} returned {}", url, status)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }

    async fn resolve_user_id(&self, source_ref: &str) -> Result<String, FetchError> {
        let username = source_ref.trim_start_matches('@');
        let url = format!("{}/users/by/username/{}", self.base_url, username);
        let lookup: UserLookupResponse = self.get_json(&url, &[]).await?;
        let user = lookup
            .data
            .ok_or_else(|| FetchError::SourceNotFound(username.to_string()))?;
        debug!(username = %user.username, user_id = %user.id, "resolved source account");
        Ok(user.id)
    }
}

#[async_trait::async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch_new(
        &self,
        source_ref: &str,
        since: Option<&str>,
        max_items: usize,
    ) -> Result<Vec<SourceItem>, FetchError> {
        let user_id = self.resolve_user_id(source_ref).await?;
        let url = format!("{}/users/{}/tweets", self.base_url, user_id);

        // API lower bound is 5 per page
        let mut query = vec![
            ("max_results", max_items.clamp(5, 100).to_string()),
            ("tweet.fields", "id,text,created_at,author_id".to_string()),
            ("exclude", "retweets,replies".to_string()),
        ];
        if let Some(since_id) = since {
            query.push(("since_id", since_id.to_string()));
        }

        let timeline: TimelineResponse = self.get_json(&url, &query).await?;

        let author = source_ref.trim_start_matches('@').to_string();
        let mut items: Vec<SourceItem> = timeline
            .data
            .into_iter()
            .map(|t| SourceItem {
                id: t.id,
                text: t.text,
                author: author.clone(),
                created_at: t.created_at.unwrap_or_else(Utc::now),
            })
            .collect();

        // API returns newest first; callers expect ascending order
        items.reverse();
        items.truncate(max_items);

        debug!(
            source_ref = %author,
            count = items.len(),
            since = ?since,
            "fetched new source items"
        );
        Ok(items)
    }
}
