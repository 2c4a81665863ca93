//! Signup Flow State Machine
//!
//! One explicit finite-state description of the signup/payment flow
//! instead of a pile of independent dialog flags:
//!
//! ```text
//! Unauthenticated → AwaitingPlanChoice → AwaitingCharge
//!     → AwaitingConfirmation → Activated
//!                 ↘ Abandoned (cancellation)
//! ```
//!
//! The confirmed transition is latched: however many approved
//! observations race in, exactly one activation commit runs per charge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use nest_store::NestStore;

use crate::activation::{Activation, Activator};
use crate::charge::{Charge, ChargeRequest, Plan};
use crate::error::{PaymentError, Result};
use crate::gateway::PixGateway;
use crate::watcher::{CancelToken, PaymentWatcher, WatchOutcome, POLL_INTERVAL};

/// Where the signup flow currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Unauthenticated,
    AwaitingPlanChoice,
    AwaitingCharge,
    AwaitingConfirmation,
    Activated,
    Abandoned,
}

impl FlowState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::AwaitingPlanChoice => "awaiting-plan-choice",
            Self::AwaitingCharge => "awaiting-charge",
            Self::AwaitingConfirmation => "awaiting-confirmation",
            Self::Activated => "activated",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one signup from email entry to activation.
pub struct SignupFlow {
    gateway: Arc<dyn PixGateway>,
    activator: Activator,
    state: FlowState,
    email: Option<String>,
    plan: Option<Plan>,
    referrer_code: Option<String>,
    charge: Option<Charge>,
    activation: Option<Activation>,
    poll_interval: Duration,
    committed: AtomicBool,
}

impl SignupFlow {
    pub fn new(gateway: Arc<dyn PixGateway>, store: Arc<dyn NestStore>) -> Self {
        Self {
            gateway,
            activator: Activator::new(store),
            state: FlowState::Unauthenticated,
            email: None,
            plan: None,
            referrer_code: None,
            charge: None,
            activation: None,
            poll_interval: POLL_INTERVAL,
            committed: AtomicBool::new(false),
        }
    }

    /// Override the poll cadence (tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn charge(&self) -> Option<&Charge> {
        self.charge.as_ref()
    }

    pub fn activation(&self) -> Option<&Activation> {
        self.activation.as_ref()
    }

    /// Record the signing identity.
    pub fn sign_in(&mut self, email: impl Into<String>) -> Result<()> {
        self.expect(FlowState::Unauthenticated, "sign_in")?;
        self.email = Some(email.into());
        self.state = FlowState::AwaitingPlanChoice;
        Ok(())
    }

    /// Pick a plan (and optionally a referral code). Allowed again from
    /// `AwaitingCharge` so a failed charge can be retried with another
    /// plan.
    pub fn choose_plan(&mut self, plan: Plan, referrer_code: Option<String>) -> Result<()> {
        if self.state != FlowState::AwaitingPlanChoice && self.state != FlowState::AwaitingCharge {
            return Err(PaymentError::InvalidState(format!(
                "choose_plan in {}",
                self.state
            )));
        }
        self.plan = Some(plan);
        self.referrer_code = referrer_code.filter(|c| !c.trim().is_empty());
        self.state = FlowState::AwaitingCharge;
        Ok(())
    }

    /// Charge Initiator: ask the gateway for a Pix charge. On failure
    /// the flow stays in `AwaitingCharge` with no partial state; the
    /// user re-triggers manually.
    pub async fn generate_charge(&mut self) -> Result<Charge> {
        self.expect(FlowState::AwaitingCharge, "generate_charge")?;
        let email = self.email.clone().ok_or_else(|| {
            PaymentError::InvalidState("generate_charge without an email".into())
        })?;
        let plan = self
            .plan
            .ok_or_else(|| PaymentError::InvalidState("generate_charge without a plan".into()))?;

        let request = ChargeRequest::for_plan(email, plan);
        let charge = self.gateway.create_charge(&request).await?;

        tracing::info!(charge_id = %charge.id, plan = plan.as_str(), "Charge created");
        self.charge = Some(charge.clone());
        self.state = FlowState::AwaitingConfirmation;
        Ok(charge)
    }

    /// Status Poller: watch the charge until approval or cancellation,
    /// then commit. The token comes from [`crate::cancel_pair`] and its
    /// handle belongs to the payment dialog.
    pub async fn await_confirmation(&mut self, cancel: CancelToken) -> Result<FlowState> {
        self.expect(FlowState::AwaitingConfirmation, "await_confirmation")?;
        let charge_id = self
            .charge
            .as_ref()
            .map(|c| c.id.clone())
            .ok_or_else(|| PaymentError::InvalidState("no charge to watch".into()))?;

        let watcher = PaymentWatcher::new(self.gateway.clone(), charge_id)
            .with_interval(self.poll_interval);

        match watcher.watch(cancel).await {
            WatchOutcome::Abandoned => {
                // The charge is discarded with the dialog; the gateway
                // owns whatever becomes of it.
                self.charge = None;
                self.state = FlowState::Abandoned;
                Ok(self.state)
            }
            WatchOutcome::Confirmed => self.commit().await,
        }
    }

    /// Activation Committer entry point, latched to run at most once
    /// per charge. A racing second confirmation observes the latch and
    /// returns without touching the store.
    async fn commit(&mut self) -> Result<FlowState> {
        if self.committed.swap(true, Ordering::SeqCst) {
            self.state = FlowState::Activated;
            return Ok(self.state);
        }

        let email = self
            .email
            .clone()
            .ok_or_else(|| PaymentError::InvalidState("commit without an email".into()))?;
        let plan = self
            .plan
            .ok_or_else(|| PaymentError::InvalidState("commit without a plan".into()))?;

        match self
            .activator
            .activate(&email, plan, self.referrer_code.as_deref(), Utc::now())
            .await
        {
            Ok(activation) => {
                self.activation = Some(activation);
                self.charge = None;
                self.state = FlowState::Activated;
                Ok(self.state)
            }
            Err(e) => {
                // Fatal to the flow: release the latch so nothing looks
                // half-committed, surface the error, halt.
                self.committed.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn expect(&self, state: FlowState, operation: &str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(PaymentError::InvalidState(format!(
                "{operation} in {}",
                self.state
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockPixGateway;
    use crate::watcher::cancel_pair;
    use nest_store::{MemoryStore, NestStore};

    const TICK: Duration = Duration::from_millis(5);

    fn flow_with(gateway: MockPixGateway, store: Arc<MemoryStore>) -> SignupFlow {
        SignupFlow::new(Arc::new(gateway), store).with_poll_interval(TICK)
    }

    #[tokio::test]
    async fn test_full_flow_activates() {
        let store = Arc::new(MemoryStore::new());
        let mut flow = flow_with(MockPixGateway::approving_after(1), store.clone());

        flow.sign_in("a@x.com").unwrap();
        flow.choose_plan(Plan::Monthly, None).unwrap();
        flow.generate_charge().await.unwrap();
        assert_eq!(flow.state(), FlowState::AwaitingConfirmation);

        let (_handle, token) = cancel_pair();
        let state = flow.await_confirmation(token).await.unwrap();
        assert_eq!(state, FlowState::Activated);

        let activation = flow.activation().unwrap();
        assert!(activation.created);
        let user = store.find_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(user.couple_id, Some(activation.couple.id));
    }

    #[tokio::test]
    async fn test_charge_failure_halts_with_gateway_message() {
        let store = Arc::new(MemoryStore::new());
        let mut flow = flow_with(MockPixGateway::failing_charge("x"), store.clone());

        flow.sign_in("a@x.com").unwrap();
        flow.choose_plan(Plan::Monthly, None).unwrap();

        let err = flow.generate_charge().await.unwrap_err();
        assert!(err.user_message().contains('x'));
        // No partial state: flow still awaiting a charge, nothing stored.
        assert_eq!(flow.state(), FlowState::AwaitingCharge);
        assert!(flow.charge().is_none());
        assert!(store.find_user_by_email("a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_is_latched_to_run_once() {
        let store = Arc::new(MemoryStore::new());
        let mut flow = flow_with(MockPixGateway::approving_after(0), store.clone());

        flow.sign_in("a@x.com").unwrap();
        flow.choose_plan(Plan::Monthly, None).unwrap();
        flow.generate_charge().await.unwrap();

        // Two approved observations racing into the commit.
        flow.commit().await.unwrap();
        let first_couple = flow.activation().unwrap().couple.id;
        flow.commit().await.unwrap();

        assert_eq!(flow.activation().unwrap().couple.id, first_couple);
        let user = store.find_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(user.couple_id, Some(first_couple));
    }

    #[tokio::test]
    async fn test_cancellation_abandons_without_committing() {
        let store = Arc::new(MemoryStore::new());
        // Never settles
        let mut flow = flow_with(MockPixGateway::new(), store.clone());

        flow.sign_in("a@x.com").unwrap();
        flow.choose_plan(Plan::Lifetime, None).unwrap();
        flow.generate_charge().await.unwrap();

        let (handle, token) = cancel_pair();
        handle.cancel();
        let state = flow.await_confirmation(token).await.unwrap();

        assert_eq!(state, FlowState::Abandoned);
        assert!(flow.activation().is_none());
        assert!(store.find_user_by_email("a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_operations_out_of_order_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut flow = flow_with(MockPixGateway::new(), store);

        let err = flow.generate_charge().await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidState(_)));
        assert!(flow.choose_plan(Plan::Monthly, None).is_err());
    }
}
