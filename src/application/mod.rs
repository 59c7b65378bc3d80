//! Application layer: the donation pipeline and the pieces it orchestrates.
//!
//! `DonationPipeline` runs each request through the `ValidationChain`, charges
//! it with the selected `PaymentStrategy`, persists the result through the
//! repositories and announces it on the `NotificationBus`.

pub mod notification;
pub mod payment;
pub mod pipeline;
pub mod subscribers;
pub mod validation;
