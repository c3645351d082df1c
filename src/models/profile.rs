//! User identity and role-specific profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::billing::PlanTier;

/// The three user roles and their dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Trainer,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Trainer => "trainer",
            Role::Student => "student",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitnessLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// Identity record shared by every role (`profiles` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Trainer plan state (`trainer_profiles` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainerProfile {
    pub id: Uuid,
    /// Owning profile id; also the trainer id used by every other record
    pub user_id: Uuid,
    pub plan: PlanTier,
    pub max_students: u32,
    pub ai_credits: i64,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainerProfile {
    /// New trainer on the free tier.
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        let limits = PlanTier::Free.limits();
        Self {
            id: Uuid::new_v4(),
            user_id,
            plan: PlanTier::Free,
            max_students: limits.max_students,
            ai_credits: limits.ai_credits,
            specialties: Vec::new(),
            bio: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reset limits and credits to the tier defaults. Returns the credit delta.
    pub fn apply_plan(&mut self, plan: PlanTier, now: DateTime<Utc>) -> i64 {
        let limits = plan.limits();
        let delta = limits.ai_credits - self.ai_credits;
        self.plan = plan;
        self.max_students = limits.max_students;
        self.ai_credits = limits.ai_credits;
        self.updated_at = now;
        delta
    }
}

/// Student details (`student_profiles` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Trainer's user id when the student is linked
    #[serde(default)]
    pub trainer_id: Option<Uuid>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub fitness_level: FitnessLevel,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub medical_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentProfile {
    pub fn new(user_id: Uuid, trainer_id: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            trainer_id,
            goals: Vec::new(),
            fitness_level: FitnessLevel::default(),
            weight_kg: None,
            height_cm: None,
            medical_notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Profile joined with its role-specific record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trainer: Option<TrainerProfile>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub student: Option<StudentProfile>,
}

/// A trainer's student as listed on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentSummary {
    pub profile: Profile,
    pub student: StudentProfile,
}

/// Trainer as listed for admins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainerSummary {
    pub profile: Profile,
    pub trainer: TrainerProfile,
    pub student_count: usize,
}

/// Sign-up request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignUp {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
    /// Students may sign up already linked to a trainer
    #[serde(default)]
    pub trainer_id: Option<Uuid>,
}

/// Editable profile fields.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(url)]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn apply(self, profile: &mut Profile, now: DateTime<Utc>) {
        if let Some(name) = self.full_name {
            profile.full_name = name;
        }
        if let Some(phone) = self.phone {
            profile.phone = Some(phone);
        }
        if let Some(url) = self.avatar_url {
            profile.avatar_url = Some(url);
        }
        profile.updated_at = now;
    }
}

/// Student added by a trainer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewStudent {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub fitness_level: FitnessLevel,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub medical_notes: Option<String>,
}

impl NewStudent {
    /// Copy the trainer-provided details onto a student record.
    pub fn apply(&self, student: &mut StudentProfile) {
        student.goals = self.goals.clone();
        student.fitness_level = self.fitness_level;
        student.weight_kg = self.weight_kg;
        student.height_cm = self.height_cm;
        student.medical_notes = self.medical_notes.clone();
    }
}

/// Normalize an email for lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_plan_resets_regardless_of_usage() {
        let now = Utc::now();
        let mut trainer = TrainerProfile::new(Uuid::new_v4(), now);
        trainer.ai_credits = 3;

        let delta = trainer.apply_plan(PlanTier::Elite, now);

        assert_eq!(trainer.ai_credits, 500);
        assert_eq!(trainer.max_students, 100);
        assert_eq!(delta, 497);

        let delta = trainer.apply_plan(PlanTier::Free, now);
        assert_eq!(trainer.ai_credits, 10);
        assert_eq!(trainer.max_students, 5);
        assert_eq!(delta, -490);
    }

    #[test]
    fn test_user_profile_flattens_profile_fields() {
        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            full_name: "Ana".to_string(),
            role: Role::Trainer,
            phone: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(UserProfile {
            trainer: Some(TrainerProfile::new(profile.id, now)),
            profile,
            student: None,
        })
        .unwrap();

        assert_eq!(value["role"], "trainer");
        assert_eq!(value["trainer"]["plan"], "free");
        assert!(value.get("student").is_none());
    }
}
