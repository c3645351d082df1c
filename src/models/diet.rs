//! Diet plans, meals and ingredients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::Add;
use uuid::Uuid;
use validator::Validate;

/// Calories and macronutrients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroTotals {
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein_g: f64,
    #[serde(default)]
    pub carbs_g: f64,
    #[serde(default)]
    pub fat_g: f64,
}

impl Add for MacroTotals {
    type Output = MacroTotals;

    fn add(self, rhs: MacroTotals) -> MacroTotals {
        MacroTotals {
            calories: self.calories + rhs.calories,
            protein_g: self.protein_g + rhs.protein_g,
            carbs_g: self.carbs_g + rhs.carbs_g,
            fat_g: self.fat_g + rhs.fat_g,
        }
    }
}

impl Sum for MacroTotals {
    fn sum<I: Iterator<Item = MacroTotals>>(iter: I) -> Self {
        iter.fold(MacroTotals::default(), Add::add)
    }
}

/// Diet plan header (`diet_plans` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DietPlan {
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
    pub target_calories: Option<u32>,
    #[serde(default)]
    pub is_ai_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DietPlan {
    pub fn visible_to(&self, user_id: Uuid) -> bool {
        self.trainer_id == user_id || self.student_id == Some(user_id)
    }
}

/// Meal inside a diet plan (`meals` table). Totals are the sum of its ingredients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meal {
    pub id: Uuid,
    pub diet_plan_id: Uuid,
    pub name: String,
    /// "HH:MM"
    #[serde(default)]
    pub time_of_day: Option<String>,
    pub position: u32,
    #[serde(flatten)]
    pub totals: MacroTotals,
}

/// Ingredient row (`ingredients` table).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ingredient {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(flatten)]
    pub macros: MacroTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MealDetail {
    #[serde(flatten)]
    pub meal: Meal,
    pub ingredients: Vec<Ingredient>,
}

/// Plan with meals and their ingredients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DietPlanDetail {
    #[serde(flatten)]
    pub plan: DietPlan,
    pub meals: Vec<MealDetail>,
}

impl DietPlanDetail {
    /// Build the rows for a new plan, computing each meal's totals.
    pub fn build(
        trainer_id: Uuid,
        new: NewDietPlan,
        is_ai_generated: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let plan = DietPlan {
            id: Uuid::new_v4(),
            trainer_id,
            student_id: new.student_id,
            name: new.name,
            description: new.description,
            goal: new.goal,
            target_calories: new.target_calories,
            is_ai_generated,
            created_at: now,
            updated_at: now,
        };

        let meals = new
            .meals
            .into_iter()
            .enumerate()
            .map(|(position, m)| {
                let meal_id = Uuid::new_v4();
                let ingredients: Vec<Ingredient> = m
                    .ingredients
                    .into_iter()
                    .map(|i| Ingredient {
                        id: Uuid::new_v4(),
                        meal_id,
                        name: i.name,
                        quantity: i.quantity,
                        unit: i.unit,
                        macros: i.macros,
                    })
                    .collect();
                MealDetail {
                    meal: Meal {
                        id: meal_id,
                        diet_plan_id: plan.id,
                        name: m.name,
                        time_of_day: m.time_of_day,
                        position: position as u32,
                        totals: ingredients.iter().map(|i| i.macros).sum(),
                    },
                    ingredients,
                }
            })
            .collect();

        Self { plan, meals }
    }

    /// Whole-plan totals.
    pub fn totals(&self) -> MacroTotals {
        self.meals.iter().map(|m| m.meal.totals).sum()
    }

    /// Split into table rows.
    pub fn into_rows(self) -> (DietPlan, Vec<Meal>, Vec<Ingredient>) {
        let mut meals = Vec::with_capacity(self.meals.len());
        let mut ingredients = Vec::new();
        for detail in self.meals {
            meals.push(detail.meal);
            ingredients.extend(detail.ingredients);
        }
        (self.plan, meals, ingredients)
    }

    /// Reassemble from table rows, ordering meals by position.
    pub fn from_rows(plan: DietPlan, mut meals: Vec<Meal>, ingredients: Vec<Ingredient>) -> Self {
        meals.sort_by_key(|m| m.position);
        let meals = meals
            .into_iter()
            .map(|meal| {
                let ingredients = ingredients
                    .iter()
                    .filter(|i| i.meal_id == meal.id)
                    .cloned()
                    .collect();
                MealDetail { meal, ingredients }
            })
            .collect();
        Self { plan, meals }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewDietPlan {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub student_id: Option<Uuid>,
    #[serde(default)]
    #[validate(range(min = 800, max = 8000))]
    pub target_calories: Option<u32>,
    #[serde(default)]
    #[validate(nested)]
    pub meals: Vec<NewMeal>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewMeal {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub ingredients: Vec<NewIngredient>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewIngredient {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    #[validate(range(min = 0.0))]
    pub quantity: f64,
    pub unit: String,
    #[serde(flatten)]
    pub macros: MacroTotals,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(name: &str, calories: f64, protein_g: f64) -> NewIngredient {
        NewIngredient {
            name: name.to_string(),
            quantity: 100.0,
            unit: "g".to_string(),
            macros: MacroTotals {
                calories,
                protein_g,
                carbs_g: 0.0,
                fat_g: 0.0,
            },
        }
    }

    #[test]
    fn test_meal_totals_sum_ingredients() {
        let new = NewDietPlan {
            name: "Cut".to_string(),
            description: None,
            goal: None,
            student_id: None,
            target_calories: Some(1800),
            meals: vec![
                NewMeal {
                    name: "Breakfast".to_string(),
                    time_of_day: Some("07:00".to_string()),
                    ingredients: vec![ingredient("Eggs", 155.0, 13.0), ingredient("Oats", 389.0, 17.0)],
                },
                NewMeal {
                    name: "Lunch".to_string(),
                    time_of_day: None,
                    ingredients: vec![ingredient("Chicken", 165.0, 31.0)],
                },
            ],
        };

        let detail = DietPlanDetail::build(Uuid::new_v4(), new, false, Utc::now());

        assert_eq!(detail.meals[0].meal.totals.calories, 544.0);
        assert_eq!(detail.meals[0].meal.totals.protein_g, 30.0);
        assert_eq!(detail.meals[1].meal.position, 1);
        assert_eq!(detail.totals().calories, 709.0);
    }

    #[test]
    fn test_rows_round_trip_keeps_meal_order() {
        let new = NewDietPlan {
            name: "Bulk".to_string(),
            description: None,
            goal: None,
            student_id: None,
            target_calories: None,
            meals: vec![
                NewMeal {
                    name: "First".to_string(),
                    time_of_day: None,
                    ingredients: vec![ingredient("Rice", 130.0, 2.7)],
                },
                NewMeal {
                    name: "Second".to_string(),
                    time_of_day: None,
                    ingredients: vec![],
                },
            ],
        };
        let detail = DietPlanDetail::build(Uuid::new_v4(), new, true, Utc::now());
        let (plan, mut meals, ingredients) = detail.clone().into_rows();
        meals.reverse();

        let rebuilt = DietPlanDetail::from_rows(plan, meals, ingredients);
        assert_eq!(rebuilt, detail);
    }
}
