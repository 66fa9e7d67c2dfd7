//! Slack webhook adapter for turnwire.
//!
//! Turns signed HTTP webhooks into canonical turns and canonical replies
//! back into Web API calls:
//! - **Signature** (`signature`) - HMAC request signing and replay window
//! - **Credentials** (`credentials`) - single- and multi-tenant token resolution
//! - **Events** (`events`) - payload classification and normalization
//! - **Middleware** (`middleware`) - direct message / mention tagging
//! - **Outbound** (`outbound`) - delivery-mode routing to the wire client
//! - **Dispatcher** (`dispatcher`) - the per-request state machine
//!
//! # Architecture
//!
//! ```text
//! webhook bytes → SignatureVerifier → classify → CredentialResolver → BotLogic
//!                                                                      ↓
//!                          Web API / response URL ← OutboundFormatter ←┘
//! ```

pub mod api;
pub mod credentials;
pub mod dialog;
pub mod dispatcher;
pub mod events;
pub mod middleware;
pub mod oauth;
pub mod outbound;
pub mod signature;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use dispatcher::{
    BotError, BotLogic, DispatchOutcome, DispatchState, InboundRequest, NoopBot, TurnContext,
    TurnDispatcher, WebhookResponse,
};
