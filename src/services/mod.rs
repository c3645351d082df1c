// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.
//!
//! Every service is a trait with a local-document and a remote-backend
//! implementation. Callers hold `Arc<dyn Trait>` from the
//! [`ServiceContainer`](crate::container::ServiceContainer).

pub mod ai;
pub mod auth;
pub mod ledger;
pub mod payment;
pub mod security;
pub mod trainer;
pub mod workout;

pub use ai::{AiService, ContentGenerator, LocalAiService, RemoteAiService};
pub use auth::{AuthService, LocalAuthService, RemoteAuthService};
pub use payment::{LocalPaymentService, PaymentService, PriceIds, RemotePaymentService};
pub use security::{LocalSecurityService, RateLimiter, RemoteSecurityService, SecurityService};
pub use trainer::{LocalTrainerService, RemoteTrainerService, SessionRange, TrainerService};
pub use workout::{LocalWorkoutService, RemoteWorkoutService, WorkoutService};
