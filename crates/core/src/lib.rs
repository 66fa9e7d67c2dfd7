pub mod config;
pub mod domain;
pub mod errors;

pub use domain::outbound::{CanonicalOutboundMessage, DeliveryMode, ResponseVisibility};
pub use domain::scratchpad::{DialogFieldError, ResponseScratchpad};
pub use domain::turn::{ActivityType, CanonicalTurn, EventTag, RawPayload, TurnKind};
pub use errors::{CredentialError, DeliveryError, RejectionError};
