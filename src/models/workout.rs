//! Exercise catalog and workout plans.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Catalog exercise (`exercises` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: Uuid,
    pub name: String,
    pub muscle_group: String,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewExercise {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 60))]
    pub muscle_group: String,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub video_url: Option<String>,
}

impl NewExercise {
    pub fn into_exercise(self, created_by: Option<Uuid>, now: DateTime<Utc>) -> Exercise {
        Exercise {
            id: Uuid::new_v4(),
            name: self.name,
            muscle_group: self.muscle_group,
            equipment: self.equipment,
            instructions: self.instructions,
            video_url: self.video_url,
            created_by,
            created_at: now,
        }
    }
}

/// Workout plan header (`workout_plans` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutPlan {
    pub id: Uuid,
    pub trainer_id: Uuid,
    #[serde(default)]
    pub student_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub is_ai_generated: bool,
    #[serde(default)]
    pub starts_on: Option<NaiveDate>,
    #[serde(default)]
    pub ends_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkoutPlan {
    /// Trainer owner or assigned student.
    pub fn visible_to(&self, user_id: Uuid) -> bool {
        self.trainer_id == user_id || self.student_id == Some(user_id)
    }
}

/// One exercise assignment inside a plan (`workout_plan_exercises` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutPlanExercise {
    pub id: Uuid,
    pub workout_plan_id: Uuid,
    pub exercise_id: Uuid,
    /// Order inside the plan, starting at 0
    pub position: u32,
    /// 0 = Monday .. 6 = Sunday
    #[serde(default)]
    pub day_of_week: Option<u8>,
    pub sets: u32,
    /// Rep scheme, e.g. "10" or "8-12"
    pub reps: String,
    pub rest_seconds: u32,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Plan with its ordered exercises.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutPlanDetail {
    #[serde(flatten)]
    pub plan: WorkoutPlan,
    pub exercises: Vec<WorkoutPlanExercise>,
}

impl WorkoutPlanDetail {
    /// Build the rows for a new plan owned by `trainer_id`.
    pub fn build(
        trainer_id: Uuid,
        new: NewWorkoutPlan,
        is_ai_generated: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let plan = WorkoutPlan {
            id: Uuid::new_v4(),
            trainer_id,
            student_id: new.student_id,
            name: new.name,
            description: new.description,
            goal: new.goal,
            is_template: new.is_template,
            is_ai_generated,
            starts_on: new.starts_on,
            ends_on: new.ends_on,
            created_at: now,
            updated_at: now,
        };
        let exercises = new
            .exercises
            .into_iter()
            .enumerate()
            .map(|(position, e)| WorkoutPlanExercise {
                id: Uuid::new_v4(),
                workout_plan_id: plan.id,
                exercise_id: e.exercise_id,
                position: position as u32,
                day_of_week: e.day_of_week,
                sets: e.sets,
                reps: e.reps,
                rest_seconds: e.rest_seconds,
                weight_kg: e.weight_kg,
                notes: e.notes,
            })
            .collect();

        Self { plan, exercises }
    }

    /// Copy a template into a new plan assigned to `student_id`.
    ///
    /// The copy gets fresh ids for the plan and every exercise row.
    pub fn instantiate_for(&self, student_id: Uuid, now: DateTime<Utc>) -> Self {
        let plan = WorkoutPlan {
            id: Uuid::new_v4(),
            student_id: Some(student_id),
            is_template: false,
            created_at: now,
            updated_at: now,
            ..self.plan.clone()
        };
        let exercises = self
            .exercises
            .iter()
            .map(|e| WorkoutPlanExercise {
                id: Uuid::new_v4(),
                workout_plan_id: plan.id,
                ..e.clone()
            })
            .collect();

        Self { plan, exercises }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewWorkoutPlan {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub student_id: Option<Uuid>,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub starts_on: Option<NaiveDate>,
    #[serde(default)]
    pub ends_on: Option<NaiveDate>,
    #[serde(default)]
    #[validate(nested)]
    pub exercises: Vec<NewPlanExercise>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewPlanExercise {
    pub exercise_id: Uuid,
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
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}
