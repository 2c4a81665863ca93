//! # nest-payments
//!
//! The payment activation flow for harmony-nest, built around a Pix
//! charge at an external gateway:
//!
//! ```text
//! ┌──────────────┐    ┌───────────────┐    ┌──────────────────┐
//! │   generate   │───▶│  poll status  │───▶│ commit activation │
//! │    charge    │    │  every 5 s    │    │ (couple + link +  │
//! │              │    │  until paid   │    │  referral credit) │
//! └──────────────┘    └───────────────┘    └──────────────────┘
//! ```
//!
//! The gateway is an opaque collaborator behind [`PixGateway`]; the
//! poll is a cancellable task bound to the lifetime of the payment
//! dialog, never a bare timer; and the confirmed transition is guarded
//! so one charge commits at most one activation.
//!
//! Error severity follows the call site: charge and couple creation
//! failures are fatal to the flow, status-poll failures are transient
//! and silently retried, referral credit is best-effort.

mod activation;
mod charge;
mod error;
mod flow;
mod gateway;
mod watcher;

pub use activation::{Activation, Activator};
pub use charge::{
    Charge, ChargeRequest, PaymentStatus, Plan, PlanPricing, REFERRAL_BONUS_DAYS,
    REFERRED_SIGNUP_WINDOW_DAYS, SIGNUP_WINDOW_DAYS,
};
pub use error::{PaymentError, Result};
pub use flow::{FlowState, SignupFlow};
pub use gateway::{GatewayConfig, HttpPixGateway, MockPixGateway, PixGateway};
pub use watcher::{cancel_pair, CancelHandle, CancelToken, PaymentWatcher, WatchOutcome, POLL_INTERVAL};
