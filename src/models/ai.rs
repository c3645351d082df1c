//! AI generation requests and results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::credits::CreditTransaction;
use crate::models::profile::FitnessLevel;

fn default_meals_per_day() -> u8 {
    4
}

fn default_days_per_week() -> u8 {
    3
}

/// Request for an AI-generated diet plan.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DietPlanRequest {
    #[serde(default)]
    pub student_id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub goal: String,
    #[serde(default)]
    #[validate(range(min = 800, max = 8000))]
    pub target_calories: Option<u32>,
    #[serde(default = "default_meals_per_day")]
    #[validate(range(min = 1, max = 8))]
    pub meals_per_day: u8,
    /// Free-text restrictions such as "vegetarian" or "lactose intolerant"
    #[serde(default)]
    pub restrictions: Vec<String>,
}

/// Request for an AI-suggested workout plan.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WorkoutPlanRequest {
    #[serde(default)]
    pub student_id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub goal: String,
    #[serde(default)]
    pub fitness_level: FitnessLevel,
    #[serde(default = "default_days_per_week")]
    #[validate(range(min = 1, max = 7))]
    pub days_per_week: u8,
    #[serde(default)]
    pub focus: Option<String>,
}

/// Workout content as produced by a generator.
///
/// Exercises are referenced by name and resolved against the catalog when
/// the plan is stored.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GeneratedWorkout {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(length(min = 1), nested)]
    pub exercises: Vec<GeneratedExercise>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GeneratedExercise {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 60))]
    pub muscle_group: String,
    #[serde(default)]
    #[validate(range(max = 6))]
    pub day_of_week: Option<u8>,
    #[validate(range(min = 1, max = 20))]
    pub sets: u32,
    #[validate(length(min = 1, max = 20))]
    pub reps: String,
    #[validate(range(max = 600))]
    pub rest_seconds: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A stored AI artifact with the charge that paid for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generated<T> {
    pub artifact: T,
    pub transaction: CreditTransaction,
    /// Balance after the charge
    pub balance: i64,
}
