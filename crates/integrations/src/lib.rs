//! Demoflow external-service adapters.
//!
//! | Type | Capability | Wire |
//! |------|------------|------|
//! | [`HttpMeetingSource`] | [`pipeline::MeetingSource`] | `GET {base}/meetings/{ref}/features` |
//! | [`WebhookPusher`] | [`pipeline::DownstreamPusher`] | `POST {push_url}` with the run record |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. HTTP
//! details (URLs, status codes, response shapes) stay here; the [`pipeline`]
//! crate only sees [`pipeline::CapabilityError`].

mod error;
mod meetings;
mod push;

pub use error::IntegrationError;
pub use meetings::HttpMeetingSource;
pub use push::WebhookPusher;
