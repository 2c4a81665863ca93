//! Activation Committer
//!
//! Turns an approved charge into a provisioned couple: ensure the
//! paying identity exists, create the couple, link the identity, and
//! credit the referrer. The steps are separate remote writes with no
//! compensation if a later one fails; that gap is deliberate and
//! documented rather than papered over.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use nest_core::{invite, Couple, User};
use nest_store::{CoupleChanges, NestStore};

use crate::charge::{Plan, REFERRAL_BONUS_DAYS, REFERRED_SIGNUP_WINDOW_DAYS, SIGNUP_WINDOW_DAYS};
use crate::error::Result;

/// Result of a committed activation.
#[derive(Clone, Debug)]
pub struct Activation {
    pub user: User,
    pub couple: Couple,
    /// False when the identity already belonged to a couple and the
    /// existing one was returned instead of creating a second.
    pub created: bool,
}

/// Commits activations against the row store.
pub struct Activator {
    store: Arc<dyn NestStore>,
}

impl Activator {
    pub fn new(store: Arc<dyn NestStore>) -> Self {
        Self { store }
    }

    /// Provision a paid couple for `email`.
    ///
    /// A referral code grants the new couple the longer signup window
    /// only when it resolves to an existing couple; resolution failures
    /// forfeit the bonus but never fail the activation. Couple creation
    /// and identity linking are fatal on failure.
    pub async fn activate(
        &self,
        email: &str,
        plan: Plan,
        referrer_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Activation> {
        let user = self.store.ensure_user(email).await?;

        // Idempotence at the flow edge: a second activation for an
        // already-linked identity answers with its existing couple.
        if let Some(couple_id) = user.couple_id {
            if let Some(couple) = self.store.get_couple(couple_id).await? {
                tracing::info!(email = %user.email, couple_id = %couple.id, "Already activated");
                return Ok(Activation { user, couple, created: false });
            }
        }

        let referrer = match referrer_code {
            Some(code) => self.resolve_referrer(code).await,
            None => None,
        };

        let window = if referrer.is_some() {
            REFERRED_SIGNUP_WINDOW_DAYS
        } else {
            SIGNUP_WINDOW_DAYS
        };
        let expires_at = (!plan.is_lifetime()).then(|| now + Duration::days(window));

        let couple = Couple::new(invite::generate(), now, plan.is_lifetime(), expires_at);
        let couple = self.store.create_couple(&couple).await?;
        self.store.link_user_to_couple(user.id, couple.id).await?;

        tracing::info!(
            email = %user.email,
            couple_id = %couple.id,
            plan = plan.as_str(),
            referred = referrer.is_some(),
            "Activated couple"
        );

        if let Some(referrer) = referrer {
            // Best-effort: a failed credit never fails the activation.
            if let Err(e) = apply_referral_credit(self.store.as_ref(), &referrer).await {
                tracing::warn!(
                    referrer_id = %referrer.id,
                    error = %e,
                    "Referral credit could not be applied"
                );
            }
        }

        let mut user = user;
        user.couple_id = Some(couple.id);
        Ok(Activation { user, couple, created: true })
    }

    /// Case-insensitive referral lookup. A miss or a store failure both
    /// resolve to `None`; neither may disturb the signup.
    async fn resolve_referrer(&self, code: &str) -> Option<Couple> {
        let code = invite::normalize(code);
        if code.is_empty() {
            return None;
        }
        match self.store.find_couple_by_invite_code(&code).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(code = %code, error = %e, "Referral lookup failed");
                None
            }
        }
    }
}

/// Credit a referrer for a referred signup: the counter always moves;
/// the access window extends only when there is a window to extend
/// (not lifetime, non-null expiration).
///
/// Self-referral is not guarded against here; that is a recorded
/// policy gap, not an oversight.
pub async fn apply_referral_credit(store: &dyn NestStore, referrer: &Couple) -> Result<()> {
    let mut changes = CoupleChanges {
        referral_count: Some(referrer.referral_count + 1),
        ..CoupleChanges::default()
    };

    if !referrer.is_lifetime {
        if let Some(expires) = referrer.expires_at {
            changes.expires_at = Some(expires + Duration::days(REFERRAL_BONUS_DAYS));
        }
    }

    store.update_couple(referrer.id, &changes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nest_store::MemoryStore;

    fn seeded_referrer(store: &MemoryStore, lifetime: bool, now: DateTime<Utc>) -> Couple {
        let expires = (!lifetime).then(|| now + Duration::days(12));
        let couple = Couple::new("FRIEND", now, lifetime, expires);
        store.insert_couple(couple.clone());
        couple
    }

    #[tokio::test]
    async fn test_monthly_signup_gets_thirty_days() {
        let store = Arc::new(MemoryStore::new());
        let activator = Activator::new(store.clone());
        let now = Utc::now();

        let activation = activator
            .activate("a@x.com", Plan::Monthly, None, now)
            .await
            .unwrap();

        let couple = &activation.couple;
        assert_eq!(couple.expires_at, Some(now + Duration::days(30)));
        assert!(!couple.is_lifetime);
        assert!(couple.high_scores.is_empty());
        assert_eq!(couple.referral_count, 0);
        assert!(couple.is_paid);
        assert_eq!(activation.user.couple_id, Some(couple.id));
    }

    #[tokio::test]
    async fn test_referred_signup_gets_thirty_five_days() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        seeded_referrer(&store, false, now);

        let activation = Activator::new(store)
            .activate("a@x.com", Plan::Monthly, Some("friend"), now)
            .await
            .unwrap();

        assert_eq!(activation.couple.expires_at, Some(now + Duration::days(35)));
    }

    #[tokio::test]
    async fn test_unknown_referral_code_forfeits_bonus() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        let activation = Activator::new(store)
            .activate("a@x.com", Plan::Monthly, Some("NOBODY"), now)
            .await
            .unwrap();

        assert_eq!(activation.couple.expires_at, Some(now + Duration::days(30)));
    }

    #[tokio::test]
    async fn test_lifetime_never_expires_even_with_referral() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        seeded_referrer(&store, false, now);

        let activation = Activator::new(store)
            .activate("a@x.com", Plan::Lifetime, Some("FRIEND"), now)
            .await
            .unwrap();

        assert!(activation.couple.is_lifetime);
        assert!(activation.couple.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_referrer_window_extends_by_five_days() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let referrer = seeded_referrer(&store, false, now);

        Activator::new(store.clone())
            .activate("a@x.com", Plan::Monthly, Some("FRIEND"), now)
            .await
            .unwrap();

        let credited = store.get_couple(referrer.id).await.unwrap().unwrap();
        assert_eq!(credited.referral_count, 1);
        assert_eq!(
            credited.expires_at,
            Some(referrer.expires_at.unwrap() + Duration::days(5))
        );
    }

    #[tokio::test]
    async fn test_lifetime_referrer_keeps_null_expiration() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let referrer = seeded_referrer(&store, true, now);

        Activator::new(store.clone())
            .activate("a@x.com", Plan::Monthly, Some("FRIEND"), now)
            .await
            .unwrap();

        let credited = store.get_couple(referrer.id).await.unwrap().unwrap();
        assert_eq!(credited.referral_count, 1);
        assert!(credited.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_double_activation_returns_existing_couple() {
        let store = Arc::new(MemoryStore::new());
        let activator = Activator::new(store);
        let now = Utc::now();

        let first = activator
            .activate("a@x.com", Plan::Monthly, None, now)
            .await
            .unwrap();
        let second = activator
            .activate("a@x.com", Plan::Monthly, None, now)
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.couple.id, second.couple.id);
    }

    #[tokio::test]
    async fn test_referral_code_matching_is_case_insensitive() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let referrer = seeded_referrer(&store, false, now);

        Activator::new(store.clone())
            .activate("a@x.com", Plan::Monthly, Some("  friend "), now)
            .await
            .unwrap();

        let credited = store.get_couple(referrer.id).await.unwrap().unwrap();
        assert_eq!(credited.referral_count, 1);
    }
}
