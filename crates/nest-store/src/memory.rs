//! In-Memory Store
//!
//! For development and tests. Mirrors the row semantics of the remote
//! store, including the conditional-insert upsert on email.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use nest_core::{Couple, Reward, User};

use crate::error::Result;
use crate::store::{CoupleChanges, NestStore};

/// In-memory implementation of [`NestStore`]
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    couples: RwLock<HashMap<Uuid, Couple>>,
    rewards: RwLock<HashMap<Uuid, Reward>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a couple row directly (test helper).
    pub fn insert_couple(&self, couple: Couple) {
        self.couples.write().unwrap().insert(couple.id, couple);
    }
}

#[async_trait]
impl NestStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn ensure_user(&self, email: &str) -> Result<User> {
        let mut users = self.users.write().unwrap();
        if let Some(existing) = users.values().find(|u| u.email == email) {
            return Ok(existing.clone());
        }
        let user = User::new(email);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn link_user_to_couple(&self, user_id: Uuid, couple_id: Uuid) -> Result<()> {
        let mut users = self.users.write().unwrap();
        if let Some(user) = users.get_mut(&user_id) {
            user.couple_id = Some(couple_id);
        }
        Ok(())
    }

    async fn get_couple(&self, couple_id: Uuid) -> Result<Option<Couple>> {
        let couples = self.couples.read().unwrap();
        Ok(couples.get(&couple_id).cloned())
    }

    async fn find_couple_by_invite_code(&self, code: &str) -> Result<Option<Couple>> {
        let couples = self.couples.read().unwrap();
        Ok(couples.values().find(|c| c.invite_code == code).cloned())
    }

    async fn create_couple(&self, couple: &Couple) -> Result<Couple> {
        let mut couples = self.couples.write().unwrap();
        couples.insert(couple.id, couple.clone());
        Ok(couple.clone())
    }

    async fn update_couple(
        &self,
        couple_id: Uuid,
        changes: &CoupleChanges,
    ) -> Result<Option<Couple>> {
        let mut couples = self.couples.write().unwrap();
        let Some(couple) = couples.get_mut(&couple_id) else {
            return Ok(None);
        };
        if let Some(theme) = changes.theme {
            couple.theme = theme;
        }
        if let Some(ref pix_key) = changes.pix_key {
            couple.pix_key = Some(pix_key.clone());
        }
        if let Some(ref photo) = changes.couple_photo {
            couple.couple_photo = Some(photo.clone());
        }
        if let Some(ref names) = changes.partner_names {
            couple.partner_names = names.clone();
        }
        if let Some(expires_at) = changes.expires_at {
            couple.expires_at = Some(expires_at);
        }
        if let Some(referral_count) = changes.referral_count {
            couple.referral_count = referral_count;
        }
        Ok(Some(couple.clone()))
    }

    async fn reset_streak(&self, couple_id: Uuid, now: DateTime<Utc>) -> Result<Option<Couple>> {
        let mut couples = self.couples.write().unwrap();
        let Some(couple) = couples.get_mut(&couple_id) else {
            return Ok(None);
        };
        couple.reset_streak(now);
        Ok(Some(couple.clone()))
    }

    async fn rewards_for_couple(&self, couple_id: Uuid) -> Result<Vec<Reward>> {
        let rewards = self.rewards.read().unwrap();
        let mut list: Vec<Reward> = rewards
            .values()
            .filter(|r| r.couple_id == couple_id)
            .cloned()
            .collect();
        list.sort_by_key(|r| r.days_required);
        Ok(list)
    }

    async fn add_reward(&self, reward: &Reward) -> Result<Reward> {
        let mut rewards = self.rewards.write().unwrap();
        rewards.insert(reward.id, reward.clone());
        Ok(reward.clone())
    }

    async fn delete_reward(&self, reward_id: Uuid) -> Result<()> {
        let mut rewards = self.rewards.write().unwrap();
        rewards.remove(&reward_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nest_core::invite;

    #[tokio::test]
    async fn test_ensure_user_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.ensure_user("a@x.com").await.unwrap();
        let second = store.ensure_user("a@x.com").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.users.read().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_invite_code_is_a_miss() {
        let store = MemoryStore::new();
        let found = store.find_couple_by_invite_code("ZZZZZZ").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_reset_streak_updates_hall_of_fame() {
        let store = MemoryStore::new();
        let start = Utc::now() - Duration::days(14);
        let couple = Couple::new(invite::generate(), start, false, Some(Utc::now() + Duration::days(30)));
        let id = couple.id;
        store.insert_couple(couple);

        let updated = store.reset_streak(id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(updated.high_scores, vec![14]);
        assert_eq!(updated.elapsed_days(Utc::now()), 0);
    }

    #[tokio::test]
    async fn test_rewards_ordered_by_threshold() {
        let store = MemoryStore::new();
        let couple_id = Uuid::new_v4();
        for days in [30, 7, 14] {
            store
                .add_reward(&Reward::new(couple_id, days, format!("{days}-day treat")))
                .await
                .unwrap();
        }
        let list = store.rewards_for_couple(couple_id).await.unwrap();
        let thresholds: Vec<i64> = list.iter().map(|r| r.days_required).collect();
        assert_eq!(thresholds, vec![7, 14, 30]);
    }

    #[tokio::test]
    async fn test_partial_update_touches_only_set_fields() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let couple = Couple::new("AB12CD", now, false, Some(now + Duration::days(30)));
        let id = couple.id;
        let expires = couple.expires_at;
        store.insert_couple(couple);

        let changes = CoupleChanges {
            pix_key: Some("chave-pix".into()),
            ..CoupleChanges::default()
        };
        let updated = store.update_couple(id, &changes).await.unwrap().unwrap();
        assert_eq!(updated.pix_key.as_deref(), Some("chave-pix"));
        assert_eq!(updated.expires_at, expires);
        assert_eq!(updated.theme, nest_core::Theme::Pink);
    }
}
