//! Domain Models
//!
//! Core data types for harmony-nest. A `User` is an email-addressed
//! identity linked to at most one `Couple`; the couple carries the
//! streak clock, the subscription window and the couple-owned rewards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How many historical best streaks a couple keeps.
pub const HIGH_SCORE_SLOTS: usize = 3;

const SECS_PER_DAY: i64 = 86_400;

/// An email-addressed identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    /// Row id
    pub id: Uuid,

    /// Email, used as the bare login identifier (never verified)
    pub email: String,

    /// Couple this user belongs to, if any
    pub couple_id: Option<Uuid>,

    /// Display avatar
    pub avatar_url: String,
}

impl User {
    /// Create a new user with a deterministic placeholder avatar.
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        let avatar_url = default_avatar(&email);
        Self {
            id: Uuid::new_v4(),
            email,
            couple_id: None,
            avatar_url,
        }
    }
}

/// Placeholder avatar derived from the email.
pub fn default_avatar(email: &str) -> String {
    format!("https://api.dicebear.com/7.x/avataaars/svg?seed={email}")
}

/// Visual theme for a couple's nest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Pink,
    Lavender,
    Mint,
    Sunset,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pink => "pink",
            Self::Lavender => "lavender",
            Self::Mint => "mint",
            Self::Sunset => "sunset",
        }
    }

    /// Parse from user input, falling back to the default theme.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "lavender" => Self::Lavender,
            "mint" => Self::Mint,
            "sunset" => Self::Sunset,
            _ => Self::Pink,
        }
    }
}

/// The shared record for two partners: the unit of subscription and
/// streak tracking.
///
/// Invariant: `is_lifetime` implies `expires_at` is `None`, and
/// `high_scores` stays sorted descending with at most
/// [`HIGH_SCORE_SLOTS`] entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Couple {
    /// Row id
    pub id: Uuid,

    /// 6-character code a partner uses to join
    pub invite_code: String,

    /// Start of the current harmony streak
    pub current_start_date: DateTime<Utc>,

    /// End of the paid access window; `None` for lifetime access
    pub expires_at: Option<DateTime<Utc>>,

    /// Lifetime plan flag
    pub is_lifetime: bool,

    /// How many signups used this couple's invite code
    pub referral_count: u32,

    /// Best past streak lengths in days, descending, at most 3
    pub high_scores: Vec<i64>,

    /// Display names of the partners
    pub partner_names: Vec<String>,

    /// Visual theme
    pub theme: Theme,

    /// Shared photo as inline base64 image data
    pub couple_photo: Option<String>,

    /// Shared Pix key the partners use between themselves
    pub pix_key: Option<String>,

    /// Whether activation payment went through
    pub is_paid: bool,
}

impl Couple {
    /// Create a freshly activated couple.
    ///
    /// `expires_at` must be `None` exactly when `is_lifetime` is set;
    /// this constructor enforces it by ignoring the expiration for
    /// lifetime couples.
    pub fn new(
        invite_code: impl Into<String>,
        now: DateTime<Utc>,
        is_lifetime: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            invite_code: invite_code.into(),
            current_start_date: now,
            expires_at: if is_lifetime { None } else { expires_at },
            is_lifetime,
            referral_count: 0,
            high_scores: Vec::new(),
            partner_names: Vec::new(),
            theme: Theme::default(),
            couple_photo: None,
            pix_key: None,
            is_paid: true,
        }
    }

    /// Whole days elapsed since the current streak started.
    pub fn elapsed_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.current_start_date).num_days().max(0)
    }

    /// Days of paid access left, rounded up. `None` for lifetime.
    pub fn remaining_days(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.is_lifetime {
            return None;
        }
        let expires = self.expires_at?;
        let secs = (expires - now).num_seconds();
        if secs <= 0 {
            return Some(0);
        }
        Some((secs + SECS_PER_DAY - 1) / SECS_PER_DAY)
    }

    /// Record a finished streak in the hall of fame: append, keep
    /// descending, keep the best three.
    pub fn record_high_score(&mut self, days: i64) {
        self.high_scores.push(days);
        self.high_scores.sort_unstable_by(|a, b| b.cmp(a));
        self.high_scores.truncate(HIGH_SCORE_SLOTS);
    }

    /// Reset the streak: the elapsed days go into the hall of fame and
    /// the clock restarts at `now`. Returns the recorded streak length.
    pub fn reset_streak(&mut self, now: DateTime<Utc>) -> i64 {
        let days = self.elapsed_days(now);
        self.record_high_score(days);
        self.current_start_date = now;
        days
    }

    /// Extend the access window. No-op for lifetime couples or couples
    /// without an expiration.
    pub fn extend_access(&mut self, days: i64) {
        if self.is_lifetime {
            return;
        }
        if let Some(expires) = self.expires_at {
            self.expires_at = Some(expires + Duration::days(days));
        }
    }
}

/// A milestone reward a couple promises itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reward {
    /// Row id
    pub id: Uuid,

    /// Owning couple
    pub couple_id: Uuid,

    /// Streak days needed to unlock
    pub days_required: i64,

    /// Free-text description
    pub description: String,
}

impl Reward {
    pub fn new(couple_id: Uuid, days_required: i64, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            couple_id,
            days_required,
            description: description.into(),
        }
    }

    /// Whether the reward is unlocked at the given streak length.
    /// Derived, never stored.
    pub fn achieved(&self, current_days: i64) -> bool {
        self.days_required <= current_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn couple_at(start: DateTime<Utc>) -> Couple {
        Couple::new("AB12CD", start, false, Some(start + Duration::days(30)))
    }

    #[test]
    fn test_lifetime_never_expires() {
        let now = Utc::now();
        let couple = Couple::new("AB12CD", now, true, Some(now + Duration::days(30)));
        assert!(couple.expires_at.is_none());
        assert_eq!(couple.remaining_days(now), None);
    }

    #[test]
    fn test_elapsed_days() {
        let start = Utc::now();
        let couple = couple_at(start);
        assert_eq!(couple.elapsed_days(start + Duration::days(7)), 7);
        // Clock skew must not produce a negative streak
        assert_eq!(couple.elapsed_days(start - Duration::hours(1)), 0);
    }

    #[test]
    fn test_remaining_days_rounds_up_and_clamps() {
        let start = Utc::now();
        let couple = couple_at(start);
        assert_eq!(couple.remaining_days(start + Duration::hours(12)), Some(30));
        assert_eq!(couple.remaining_days(start + Duration::days(29)), Some(1));
        assert_eq!(couple.remaining_days(start + Duration::days(31)), Some(0));
    }

    #[test]
    fn test_reset_keeps_best_three_descending() {
        let start = Utc::now();
        let mut couple = couple_at(start);
        for days in [5, 12, 3, 20] {
            couple.current_start_date = Utc::now() - Duration::days(days);
            couple.reset_streak(Utc::now());
        }
        assert_eq!(couple.high_scores, vec![20, 12, 5]);
    }

    #[test]
    fn test_reset_records_previous_streak() {
        let start = Utc::now() - Duration::days(9);
        let mut couple = couple_at(start);
        let recorded = couple.reset_streak(Utc::now());
        assert_eq!(recorded, 9);
        assert!(couple.high_scores.contains(&9));
        assert_eq!(couple.elapsed_days(Utc::now()), 0);
    }

    #[test]
    fn test_extend_access_skips_lifetime() {
        let now = Utc::now();
        let mut lifetime = Couple::new("AB12CD", now, true, None);
        lifetime.extend_access(5);
        assert!(lifetime.expires_at.is_none());

        let mut monthly = couple_at(now);
        let before = monthly.expires_at.unwrap();
        monthly.extend_access(5);
        assert_eq!(monthly.expires_at.unwrap(), before + Duration::days(5));
    }

    #[test]
    fn test_reward_achievement_is_derived() {
        let reward = Reward::new(Uuid::new_v4(), 7, "Movie night");
        assert!(!reward.achieved(6));
        assert!(reward.achieved(7));
        assert!(reward.achieved(30));
    }

    #[test]
    fn test_theme_roundtrip() {
        assert_eq!(Theme::from_str("sunset"), Theme::Sunset);
        assert_eq!(Theme::from_str("whatever"), Theme::Pink);
        let json = serde_json::to_string(&Theme::Lavender).unwrap();
        assert_eq!(json, "\"lavender\"");
    }
}
