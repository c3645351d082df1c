// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod ai;
pub mod billing;
pub mod credits;
pub mod diet;
pub mod profile;
pub mod security;
pub mod session;
pub mod workout;

pub use ai::{
    DietPlanRequest, Generated, GeneratedExercise, GeneratedWorkout, WorkoutPlanRequest,
};
pub use billing::{
    CreditPackage, PaymentEvent, PaymentIntent, PaymentPurpose, PaymentStatus, PlanLimits,
    PlanTier, Subscription, SubscriptionCheckout, SubscriptionStatus,
};
pub use credits::{AiFeature, CreditBalance, CreditTransaction, TransactionKind};
pub use diet::{
    DietPlan, DietPlanDetail, Ingredient, MacroTotals, Meal, MealDetail, NewDietPlan,
    NewIngredient, NewMeal,
};
pub use profile::{
    normalize_email, FitnessLevel, NewStudent, Profile, ProfileUpdate, Role, SignUp, StudentProfile,
    StudentSummary, TrainerProfile, TrainerSummary, UserProfile,
};
pub use security::{
    current_consents, AuditLog, ConsentType, LgpdConsent, NewAuditLog, NewConsent, NewSecurityLog,
    SecurityEventType, SecurityLog, Severity, UserDataExport,
};
pub use session::{NewSession, SessionStatus, SessionUpdate, TrainingSession};
pub use workout::{
    Exercise, NewExercise, NewPlanExercise, NewWorkoutPlan, WorkoutPlan, WorkoutPlanDetail,
    WorkoutPlanExercise,
};
