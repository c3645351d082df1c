//! Database layer: local JSON document store and remote relational client.

pub mod local;
pub mod remote;

pub use local::{LocalDatabase, LocalStore};
pub use remote::RemoteDb;

/// Table names as constants.
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const TRAINER_PROFILES: &str = "trainer_profiles";
    pub const STUDENT_PROFILES: &str = "student_profiles";
    pub const SESSIONS: &str = "sessions";
    pub const EXERCISES: &str = "exercises";
    pub const WORKOUT_PLANS: &str = "workout_plans";
    pub const WORKOUT_PLAN_EXERCISES: &str = "workout_plan_exercises";
    pub const DIET_PLANS: &str = "diet_plans";
    pub const MEALS: &str = "meals";
    pub const INGREDIENTS: &str = "ingredients";
    pub const CREDIT_TRANSACTIONS: &str = "credit_transactions";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const PAYMENT_INTENTS: &str = "payment_intents";
    pub const SECURITY_LOGS: &str = "security_logs";
    pub const AUDIT_LOGS: &str = "audit_logs";
    pub const LGPD_CONSENTS: &str = "lgpd_consents";
}

/// Server-side callable functions on the remote backend.
pub mod functions {
    pub const CREATE_PAYMENT_INTENT: &str = "create-payment-intent";
    pub const CREATE_SUBSCRIPTION: &str = "create-subscription";
}
