// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Content generators behind the AI features.
//!
//! [`OpenAiGenerator`] talks to any OpenAI-compatible chat completions
//! endpoint. [`TemplateGenerator`] builds deterministic plans from fixed
//! tables and is used when no provider key is configured.

use crate::config::Config;
use crate::error::AppError;
use crate::models::{
    DietPlanRequest, FitnessLevel, GeneratedExercise, GeneratedWorkout, MacroTotals, NewDietPlan,
    NewIngredient, NewMeal, WorkoutPlanRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn diet_plan(&self, request: &DietPlanRequest) -> Result<NewDietPlan, AppError>;

    async fn workout_plan(&self, request: &WorkoutPlanRequest)
        -> Result<GeneratedWorkout, AppError>;
}

/// Pick the generator for this deployment.
pub fn from_config(config: &Config) -> Arc<dyn ContentGenerator> {
    match &config.ai_api_key {
        Some(key) => Arc::new(OpenAiGenerator::new(
            &config.ai_base_url,
            key,
            &config.ai_model,
        )),
        None => {
            tracing::info!("No AI provider key configured, using template generator");
            Arc::new(TemplateGenerator)
        }
    }
}

// ─── Template Generator ──────────────────────────────────────────

const DEFAULT_CALORIES: u32 = 2000;

// Share of each meal's calories by macronutrient.
const PROTEIN_SHARE: f64 = 0.30;
const CARB_SHARE: f64 = 0.45;
const FAT_SHARE: f64 = 0.25;

struct Food {
    name: &'static str,
    /// Per 100 g
    per_100g: MacroTotals,
    animal: bool,
    dairy: bool,
}

const fn food(
    name: &'static str,
    calories: f64,
    protein_g: f64,
    carbs_g: f64,
    fat_g: f64,
    animal: bool,
    dairy: bool,
) -> Food {
    Food {
        name,
        per_100g: MacroTotals {
            calories,
            protein_g,
            carbs_g,
            fat_g,
        },
        animal,
        dairy,
    }
}

const PROTEINS: &[Food] = &[
    food("Chicken breast", 165.0, 31.0, 0.0, 3.6, true, false),
    food("Greek yogurt", 59.0, 10.0, 3.6, 0.4, true, true),
    food("Salmon", 208.0, 20.0, 0.0, 13.0, true, false),
    food("Tofu", 144.0, 17.3, 2.8, 8.7, false, false),
    food("Lentils", 116.0, 9.0, 20.0, 0.4, false, false),
    food("Chickpeas", 164.0, 8.9, 27.4, 2.6, false, false),
];

const CARBS: &[Food] = &[
    food("Rolled oats", 389.0, 16.9, 66.3, 6.9, false, false),
    food("Brown rice", 112.0, 2.6, 23.5, 0.9, false, false),
    food("Sweet potato", 86.0, 1.6, 20.1, 0.1, false, false),
    food("Whole wheat pasta", 124.0, 5.3, 26.5, 0.5, false, false),
];

const FATS: &[Food] = &[
    food("Olive oil", 884.0, 0.0, 0.0, 100.0, false, false),
    food("Almonds", 579.0, 21.2, 21.6, 49.9, false, false),
    food("Avocado", 160.0, 2.0, 8.5, 14.7, false, false),
];

/// Meal names by meals per day.
const MEAL_NAMES: &[&[&str]] = &[
    &["Main meal"],
    &["Breakfast", "Dinner"],
    &["Breakfast", "Lunch", "Dinner"],
    &["Breakfast", "Lunch", "Afternoon snack", "Dinner"],
    &["Breakfast", "Morning snack", "Lunch", "Afternoon snack", "Dinner"],
    &["Breakfast", "Morning snack", "Lunch", "Afternoon snack", "Dinner", "Supper"],
];

struct Restrictions {
    no_animal: bool,
    no_dairy: bool,
}

impl Restrictions {
    fn parse(restrictions: &[String]) -> Self {
        let lowered: Vec<String> = restrictions.iter().map(|r| r.to_lowercase()).collect();
        let mentions = |words: &[&str]| -> bool {
            lowered
                .iter()
                .any(|r| words.iter().any(|w| r.contains(*w)))
        };
        let no_animal = mentions(&["vegan", "vegetarian", "plant"][..]);
        Self {
            no_animal,
            no_dairy: no_animal || mentions(&["lactose", "dairy"][..]),
        }
    }

    fn allows(&self, food: &Food) -> bool {
        !(self.no_animal && food.animal) && !(self.no_dairy && food.dairy)
    }
}

fn scaled(per_100g: MacroTotals, grams: f64) -> MacroTotals {
    let round = |v: f64| (v * grams / 10.0).round() / 10.0;
    MacroTotals {
        calories: round(per_100g.calories),
        protein_g: round(per_100g.protein_g),
        carbs_g: round(per_100g.carbs_g),
        fat_g: round(per_100g.fat_g),
    }
}

fn meal_name(index: usize, count: usize) -> String {
    MEAL_NAMES
        .get(count.wrapping_sub(1))
        .and_then(|names| names.get(index))
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("Meal {}", index + 1))
}

/// Build a meal hitting `calories` with the macro split above.
fn template_meal(
    name: String,
    time_of_day: String,
    calories: f64,
    picks: [&Food; 3],
) -> NewMeal {
    let [protein, carb, fat] = picks;
    // First pass sizes each food for its own macro, second pass scales the
    // whole meal so side macros do not push it over the target.
    let mut grams = [
        calories * PROTEIN_SHARE / 4.0 / protein.per_100g.protein_g.max(1.0) * 100.0,
        calories * CARB_SHARE / 4.0 / carb.per_100g.carbs_g.max(1.0) * 100.0,
        calories * FAT_SHARE / 9.0 / fat.per_100g.fat_g.max(1.0) * 100.0,
    ];
    let total: f64 = picks
        .iter()
        .zip(grams.iter())
        .map(|(f, g)| f.per_100g.calories * g / 100.0)
        .sum();
    if total > 0.0 {
        for g in grams.iter_mut() {
            *g = (*g * calories / total).round().max(1.0);
        }
    }

    NewMeal {
        name,
        time_of_day: Some(time_of_day),
        ingredients: picks
            .iter()
            .zip(grams)
            .map(|(f, g)| NewIngredient {
                name: f.name.to_string(),
                quantity: g,
                unit: "g".to_string(),
                macros: scaled(f.per_100g, g),
            })
            .collect(),
    }
}

struct Split {
    label: &'static str,
    exercises: &'static [(&'static str, &'static str)],
}

const FULL_BODY: Split = Split {
    label: "full body",
    exercises: &[
        ("Back Squat", "legs"),
        ("Bench Press", "chest"),
        ("Bent-over Row", "back"),
        ("Plank", "core"),
    ],
};

const UPPER: Split = Split {
    label: "upper body",
    exercises: &[
        ("Bench Press", "chest"),
        ("Overhead Press", "shoulders"),
        ("Pull-up", "back"),
        ("Biceps Curl", "arms"),
    ],
};

const LOWER: Split = Split {
    label: "lower body",
    exercises: &[
        ("Back Squat", "legs"),
        ("Romanian Deadlift", "hamstrings"),
        ("Walking Lunge", "legs"),
        ("Calf Raise", "calves"),
    ],
};

fn volume(level: FitnessLevel) -> (u32, &'static str, u32) {
    match level {
        FitnessLevel::Beginner => (3, "12", 60),
        FitnessLevel::Intermediate => (4, "8-12", 90),
        FitnessLevel::Advanced => (5, "5", 150),
    }
}

/// Deterministic plans from fixed food and exercise tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn diet_plan(&self, request: &DietPlanRequest) -> Result<NewDietPlan, AppError> {
        let target = request.target_calories.unwrap_or(DEFAULT_CALORIES);
        let count = usize::from(request.meals_per_day.max(1));
        let per_meal = f64::from(target) / count as f64;

        let restrictions = Restrictions::parse(&request.restrictions);
        let pick = |foods: &'static [Food], index: usize| -> Result<&'static Food, AppError> {
            let allowed: Vec<&Food> = foods.iter().filter(|f| restrictions.allows(f)).collect();
            if allowed.is_empty() {
                return Err(AppError::BadRequest(
                    "No foods satisfy the requested restrictions".to_string(),
                ));
            }
            Ok(allowed[index % allowed.len()])
        };

        let mut meals = Vec::with_capacity(count);
        for i in 0..count {
            // Spread meals between 07:00 and 21:00.
            let hour = 7 + (i * 14) / (count - 1).max(1);
            let picks = [pick(PROTEINS, i)?, pick(CARBS, i)?, pick(FATS, i)?];
            meals.push(template_meal(
                meal_name(i, count),
                format!("{:02}:00", hour),
                per_meal,
                picks,
            ));
        }

        Ok(NewDietPlan {
            name: format!("{} kcal diet plan", target),
            description: Some(format!("Generated for goal: {}", request.goal)),
            goal: Some(request.goal.clone()),
            student_id: request.student_id,
            target_calories: Some(target),
            meals,
        })
    }

    async fn workout_plan(
        &self,
        request: &WorkoutPlanRequest,
    ) -> Result<GeneratedWorkout, AppError> {
        let days = usize::from(request.days_per_week.clamp(1, 7));
        let (sets, reps, rest_seconds) = volume(request.fitness_level);

        let split_for = |day: usize| match days {
            1..=3 => &FULL_BODY,
            _ if day % 2 == 0 => &UPPER,
            _ => &LOWER,
        };

        let mut exercises = Vec::new();
        for day in 0..days {
            let split = split_for(day);
            // Spread training days over the week, Sunday = 0.
            let day_of_week = u8::try_from(day * 7 / days).unwrap_or(6);
            for (name, muscle_group) in split.exercises {
                exercises.push(GeneratedExercise {
                    name: name.to_string(),
                    muscle_group: muscle_group.to_string(),
                    day_of_week: Some(day_of_week),
                    sets,
                    reps: reps.to_string(),
                    rest_seconds,
                    notes: Some(format!("Day {}: {}", day + 1, split.label)),
                });
            }
        }

        let label = if days <= 3 { "full body" } else { "upper/lower" };
        let mut description = format!("{}-day {} split for: {}", days, label, request.goal);
        if let Some(focus) = &request.focus {
            description.push_str(&format!(" (focus: {})", focus));
        }

        Ok(GeneratedWorkout {
            name: format!("{}-day {} plan", days, label),
            description: Some(description),
            exercises,
        })
    }
}

// ─── OpenAI-compatible Generator ─────────────────────────────────

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = "You are an assistant for personal trainers. \
Answer with a single JSON object and nothing else.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn diet_prompt(request: &DietPlanRequest) -> String {
    let restrictions = if request.restrictions.is_empty() {
        "none".to_string()
    } else {
        request.restrictions.join(", ")
    };
    format!(
        "Create a diet plan.\n\
         Goal: {goal}\n\
         Daily calories: {calories}\n\
         Meals per day: {meals}\n\
         Restrictions: {restrictions}\n\n\
         Respond with JSON: {{\"name\": string, \"description\": string, \
         \"target_calories\": number, \"meals\": [{{\"name\": string, \
         \"time_of_day\": \"HH:MM\", \"ingredients\": [{{\"name\": string, \
         \"quantity\": number, \"unit\": string, \"calories\": number, \
         \"protein_g\": number, \"carbs_g\": number, \"fat_g\": number}}]}}]}}",
        goal = request.goal,
        calories = request
            .target_calories
            .map(|c| c.to_string())
            .unwrap_or_else(|| "choose a suitable amount".to_string()),
        meals = request.meals_per_day,
    )
}

fn workout_prompt(request: &WorkoutPlanRequest) -> String {
    format!(
        "Create a weekly workout plan.\n\
         Goal: {goal}\n\
         Fitness level: {level:?}\n\
         Training days per week: {days}\n\
         Focus: {focus}\n\n\
         Respond with JSON: {{\"name\": string, \"description\": string, \
         \"exercises\": [{{\"name\": string, \"muscle_group\": string, \
         \"day_of_week\": 0-6 with 0 = Sunday, \"sets\": number, \"reps\": string, \
         \"rest_seconds\": number, \"notes\": string}}]}}",
        goal = request.goal,
        level = request.fitness_level,
        days = request.days_per_week,
        focus = request.focus.as_deref().unwrap_or("balanced"),
    )
}

/// Generator backed by an OpenAI-compatible chat completions API.
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    async fn complete<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, AppError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.7,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Backend(format!("AI provider request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Backend(format!("AI provider response unreadable: {}", e)))?;

        if !status.is_success() {
            tracing::warn!(status = %status, model = %self.model, "AI provider returned error");
            return Err(AppError::Backend(format!(
                "AI provider returned {}",
                status.as_u16()
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::Backend(format!("AI provider response invalid: {}", e)))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Backend("AI provider returned no content".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| AppError::Backend(format!("AI content was not the expected JSON: {}", e)))
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn diet_plan(&self, request: &DietPlanRequest) -> Result<NewDietPlan, AppError> {
        self.complete(&diet_prompt(request)).await
    }

    async fn workout_plan(
        &self,
        request: &WorkoutPlanRequest,
    ) -> Result<GeneratedWorkout, AppError> {
        self.complete(&workout_prompt(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn diet_request(restrictions: &[&str]) -> DietPlanRequest {
        DietPlanRequest {
            student_id: None,
            name: None,
            goal: "fat loss".to_string(),
            target_calories: Some(2000),
            meals_per_day: 4,
            restrictions: restrictions.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn workout_request(days: u8, level: FitnessLevel) -> WorkoutPlanRequest {
        WorkoutPlanRequest {
            student_id: None,
            name: None,
            goal: "hypertrophy".to_string(),
            fitness_level: level,
            days_per_week: days,
            focus: None,
        }
    }

    #[tokio::test]
    async fn test_template_diet_hits_calorie_target() {
        let plan = TemplateGenerator
            .diet_plan(&diet_request(&[]))
            .await
            .unwrap();

        assert!(plan.validate().is_ok());
        assert_eq!(plan.meals.len(), 4);
        assert_eq!(plan.meals[0].name, "Breakfast");

        let total: f64 = plan
            .meals
            .iter()
            .flat_map(|m| m.ingredients.iter())
            .map(|i| i.macros.calories)
            .sum();
        assert!((total - 2000.0).abs() < 100.0, "total was {}", total);
    }

    #[tokio::test]
    async fn test_template_diet_respects_vegetarian() {
        let plan = TemplateGenerator
            .diet_plan(&diet_request(&["Vegetarian"]))
            .await
            .unwrap();

        let names: Vec<&str> = plan
            .meals
            .iter()
            .flat_map(|m| m.ingredients.iter())
            .map(|i| i.name.as_str())
            .collect();
        assert!(!names.contains(&"Chicken breast"));
        assert!(!names.contains(&"Salmon"));
        assert!(!names.contains(&"Greek yogurt"));
    }

    #[tokio::test]
    async fn test_template_workout_splits_by_days() {
        let full = TemplateGenerator
            .workout_plan(&workout_request(3, FitnessLevel::Beginner))
            .await
            .unwrap();
        assert!(full.validate().is_ok());
        assert_eq!(full.exercises.len(), 12);
        assert!(full.exercises.iter().all(|e| e.sets == 3 && e.reps == "12"));

        let split = TemplateGenerator
            .workout_plan(&workout_request(5, FitnessLevel::Advanced))
            .await
            .unwrap();
        let mut days: Vec<u8> = split.exercises.iter().filter_map(|e| e.day_of_week).collect();
        days.dedup();
        assert_eq!(days, vec![0, 1, 2, 4, 5]);
        assert!(split.exercises.iter().any(|e| e.name == "Romanian Deadlift"));
        assert!(split.exercises.iter().all(|e| e.rest_seconds == 150));
    }

    #[tokio::test]
    async fn test_openai_generator_parses_content() {
        let server = MockServer::start().await;
        let content = serde_json::json!({
            "name": "Strength block",
            "exercises": [{
                "name": "Deadlift",
                "muscle_group": "back",
                "day_of_week": 1,
                "sets": 5,
                "reps": "5",
                "rest_seconds": 180
            }]
        })
        .to_string();

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            })))
            .mount(&server)
            .await;

        let generator =
            OpenAiGenerator::new(&format!("{}/v1/", server.uri()), "sk-test", "gpt-4o-mini");
        let workout = generator
            .workout_plan(&workout_request(1, FitnessLevel::Advanced))
            .await
            .unwrap();
        assert_eq!(workout.name, "Strength block");
        assert_eq!(workout.exercises[0].rest_seconds, 180);
    }

    #[tokio::test]
    async fn test_openai_generator_maps_failures_to_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "not json at all"}}]
            })))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(&server.uri(), "sk-test", "gpt-4o-mini");
        let err = generator
            .diet_plan(&diet_request(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Backend(_)));
    }
}
