//! PostgREST Row Store
//!
//! Talks to a managed row store over its REST surface: `?column=eq.x`
//! point filters, `Prefer: return=representation` writes, and a
//! conditional insert (`on_conflict` + ignore-duplicates) for the
//! upsert on the unique email column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use nest_core::{Couple, Reward, User};

use crate::error::{Result, StoreError};
use crate::store::{CoupleChanges, NestStore};

/// Row store configuration
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base URL of the managed store
    pub base_url: String,

    /// API key, sent both as `apikey` and bearer token
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl StoreConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_secs: 30,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("NEST_STORE_URL")
            .map_err(|_| StoreError::Config("NEST_STORE_URL not set".into()))?;
        let api_key = std::env::var("NEST_STORE_KEY")
            .map_err(|_| StoreError::Config("NEST_STORE_KEY not set".into()))?;
        Ok(Self::new(base_url, api_key))
    }
}

/// HTTP implementation of [`NestStore`]
pub struct RestStore {
    client: Client,
    config: StoreConfig,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(StoreConfig::from_env()?))
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{table}",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    /// Send a request and decode the row list the store answers with.
    async fn rows<T: DeserializeOwned>(request: RequestBuilder) -> Result<Vec<T>> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            message: parse_error_message(&body),
        })
    }

    /// Send a request where only the status matters.
    async fn execute(request: RequestBuilder) -> Result<()> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            message: parse_error_message(&body),
        })
    }
}

/// Pull a human-readable message out of an error body, falling back to
/// the raw body.
fn parse_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "hint"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                if !msg.is_empty() {
                    return msg.to_string();
                }
            }
        }
    }
    if body.is_empty() {
        "request failed".to_string()
    } else {
        body.chars().take(200).collect()
    }
}

#[async_trait]
impl NestStore for RestStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let rows: Vec<User> = Self::rows(
            self.request(Method::GET, "users")
                .query(&[("select", "*".to_string()), ("email", format!("eq.{email}"))]),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn ensure_user(&self, email: &str) -> Result<User> {
        // Conditional insert on the unique email column: duplicates are
        // ignored server-side, so concurrent signups cannot double-create.
        let candidate = User::new(email);
        let rows: Vec<User> = Self::rows(
            self.request(Method::POST, "users")
                .query(&[("on_conflict", "email")])
                .header("Prefer", "resolution=ignore-duplicates,return=representation")
                .json(&vec![&candidate]),
        )
        .await?;

        if let Some(user) = rows.into_iter().next() {
            tracing::info!(email = %user.email, "Created user");
            return Ok(user);
        }

        // Insert was a duplicate; the row must exist.
        self.find_user_by_email(email).await?.ok_or(StoreError::Api {
            status: 500,
            message: format!("upsert for {email} returned no row"),
        })
    }

    async fn link_user_to_couple(&self, user_id: Uuid, couple_id: Uuid) -> Result<()> {
        Self::execute(
            self.request(Method::PATCH, "users")
                .query(&[("id", format!("eq.{user_id}"))])
                .json(&json!({ "couple_id": couple_id })),
        )
        .await
    }

    async fn get_couple(&self, couple_id: Uuid) -> Result<Option<Couple>> {
        let rows: Vec<Couple> = Self::rows(
            self.request(Method::GET, "couples")
                .query(&[("select", "*".to_string()), ("id", format!("eq.{couple_id}"))]),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_couple_by_invite_code(&self, code: &str) -> Result<Option<Couple>> {
        let rows: Vec<Couple> = Self::rows(
            self.request(Method::GET, "couples")
                .query(&[("select", "*".to_string()), ("invite_code", format!("eq.{code}"))]),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_couple(&self, couple: &Couple) -> Result<Couple> {
        let rows: Vec<Couple> = Self::rows(
            self.request(Method::POST, "couples")
                .header("Prefer", "return=representation")
                .json(&vec![couple]),
        )
        .await?;
        rows.into_iter().next().ok_or(StoreError::Api {
            status: 500,
            message: "insert returned no row".into(),
        })
    }

    async fn update_couple(
        &self,
        couple_id: Uuid,
        changes: &CoupleChanges,
    ) -> Result<Option<Couple>> {
        if changes.is_empty() {
            return self.get_couple(couple_id).await;
        }
        let rows: Vec<Couple> = Self::rows(
            self.request(Method::PATCH, "couples")
                .query(&[("id", format!("eq.{couple_id}"))])
                .header("Prefer", "return=representation")
                .json(changes),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn reset_streak(&self, couple_id: Uuid, now: DateTime<Utc>) -> Result<Option<Couple>> {
        let Some(mut couple) = self.get_couple(couple_id).await? else {
            return Ok(None);
        };
        couple.reset_streak(now);

        let rows: Vec<Couple> = Self::rows(
            self.request(Method::PATCH, "couples")
                .query(&[("id", format!("eq.{couple_id}"))])
                .header("Prefer", "return=representation")
                .json(&json!({
                    "current_start_date": couple.current_start_date,
                    "high_scores": couple.high_scores,
                })),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn rewards_for_couple(&self, couple_id: Uuid) -> Result<Vec<Reward>> {
        Self::rows(
            self.request(Method::GET, "rewards").query(&[
                ("select", "*".to_string()),
                ("couple_id", format!("eq.{couple_id}")),
                ("order", "days_required.asc".to_string()),
            ]),
        )
        .await
    }

    async fn add_reward(&self, reward: &Reward) -> Result<Reward> {
        let rows: Vec<Reward> = Self::rows(
            self.request(Method::POST, "rewards")
                .header("Prefer", "return=representation")
                .json(&vec![reward]),
        )
        .await?;
        rows.into_iter().next().ok_or(StoreError::Api {
            status: 500,
            message: "insert returned no row".into(),
        })
    }

    async fn delete_reward(&self, reward_id: Uuid) -> Result<()> {
        Self::execute(
            self.request(Method::DELETE, "rewards")
                .query(&[("id", format!("eq.{reward_id}"))]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let store = RestStore::new(StoreConfig::new("https://db.example.com/", "key"));
        assert_eq!(store.table_url("users"), "https://db.example.com/rest/v1/users");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(parse_error_message(r#"{"message":"nope"}"#), "nope");
        assert_eq!(parse_error_message(r#"{"error":"bad key"}"#), "bad key");
        assert_eq!(parse_error_message(""), "request failed");
        assert_eq!(parse_error_message("boom"), "boom");
    }
}
