//! Subscription domain - the reconciliation state machine.
//!
//! Store-specific input is normalized into [`SubscriptionFact`]s carrying a
//! [`CanonicalEvent`], which [`Subscription::apply`] folds into one of five
//! statuses.

mod aggregate;
mod canonical_event;
mod errors;
mod events;
mod platform;
mod status;
pub(crate) mod transaction;

pub use aggregate::{
    Subscription, TransitionOutcome, CANCELLATION_REASON_REFUND, CANCELLATION_REASON_REVOKED,
};
pub use canonical_event::CanonicalEvent;
pub use errors::ReconcileError;
pub use events::SubscriptionChanged;
pub use platform::{OfferType, Platform, StoreEnvironment};
pub use status::SubscriptionStatus;
pub use transaction::{
    RenewalInfo, StoreSubscriptionStatus, StoreTransaction, SubscriptionFact, SubscriptionKey,
};
