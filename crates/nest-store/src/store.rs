//! Store Trait
//!
//! The seam between domain logic and the managed row store. Point
//! lookups return `Ok(None)` on miss; only transport or protocol
//! problems are errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use nest_core::{Couple, Reward, Theme, User};

use crate::error::Result;

/// Partial update for a couple row. Only set fields are written.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CoupleChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub couple_photo: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_names: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_count: Option<u32>,
}

impl CoupleChanges {
    pub fn is_empty(&self) -> bool {
        self.theme.is_none()
            && self.pix_key.is_none()
            && self.couple_photo.is_none()
            && self.partner_names.is_none()
            && self.expires_at.is_none()
            && self.referral_count.is_none()
    }
}

/// Row-store access for users, couples and rewards.
#[async_trait]
pub trait NestStore: Send + Sync {
    /// Point lookup by email. Unregistered email is a miss, not an error.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Idempotent create-or-fetch keyed on the unique email column.
    /// A single conditional insert, not read-then-write.
    async fn ensure_user(&self, email: &str) -> Result<User>;

    /// Point the user row at a couple.
    async fn link_user_to_couple(&self, user_id: Uuid, couple_id: Uuid) -> Result<()>;

    /// Point lookup by couple id.
    async fn get_couple(&self, couple_id: Uuid) -> Result<Option<Couple>>;

    /// Point lookup by invite code. Callers normalize the code first.
    async fn find_couple_by_invite_code(&self, code: &str) -> Result<Option<Couple>>;

    /// Insert a new couple row.
    async fn create_couple(&self, couple: &Couple) -> Result<Couple>;

    /// Partial update; returns the updated row, or `None` if the id is
    /// unknown.
    async fn update_couple(&self, couple_id: Uuid, changes: &CoupleChanges)
        -> Result<Option<Couple>>;

    /// Fold the current streak into the hall of fame and restart the
    /// clock at `now`. Returns the updated row, or `None` for an
    /// unknown id.
    async fn reset_streak(&self, couple_id: Uuid, now: DateTime<Utc>) -> Result<Option<Couple>>;

    /// Rewards for a couple, ordered by day threshold ascending.
    async fn rewards_for_couple(&self, couple_id: Uuid) -> Result<Vec<Reward>>;

    /// Insert a reward row.
    async fn add_reward(&self, reward: &Reward) -> Result<Reward>;

    /// Delete a reward row. Unknown ids delete nothing and succeed.
    async fn delete_reward(&self, reward_id: Uuid) -> Result<()>;
}
