//! Simulated business metadata attached to each completed step.
//!
//! The keys depend only on the step's category, which is picked from
//! keywords in the step name. The values are random within fixed bounds.

use rand::Rng;
use serde_json::{Value, json};

/// Business category a step name falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCategory {
    Discovery,
    Awareness,
    Consideration,
    Purchase,
    Completion,
    PostPurchase,
    Generic,
}

impl StepCategory {
    /// First matching keyword group wins.
    pub fn from_step_name(step_name: &str) -> Self {
        let lower = step_name.to_lowercase();
        let mentions = |keywords: &[&str]| keywords.iter().any(|keyword| lower.contains(keyword));

        if mentions(&["discover", "explor"]) {
            StepCategory::Discovery
        } else if mentions(&["aware", "market"]) {
            StepCategory::Awareness
        } else if mentions(&["consider", "select", "evaluat"]) {
            StepCategory::Consideration
        } else if mentions(&["purchase", "process", "transaction", "start"]) {
            StepCategory::Purchase
        } else if mentions(&["complet", "retain", "finish"]) {
            StepCategory::Completion
        } else if mentions(&["post", "advocacy", "follow"]) {
            StepCategory::PostPurchase
        } else {
            StepCategory::Generic
        }
    }
}

/// Metadata for a step, keyed by its category.
pub fn generate_metadata(step_name: &str) -> Value {
    let mut rng = rand::rng();
    generate_with(StepCategory::from_step_name(step_name), &mut rng)
}

fn generate_with<R: Rng + ?Sized>(category: StepCategory, rng: &mut R) -> Value {
    match category {
        StepCategory::Discovery => json!({
            "itemsDiscovered": rng.random_range(50..150),
            "touchpointsAnalyzed": rng.random_range(10..30),
            "dataSourcesConnected": rng.random_range(3..8),
        }),
        StepCategory::Awareness => json!({
            "impressionsGenerated": rng.random_range(5_000..15_000),
            "channelsActivated": rng.random_range(4..12),
            "audienceReach": rng.random_range(25_000..75_000),
        }),
        StepCategory::Consideration => json!({
            "optionsEvaluated": rng.random_range(5..20),
            "comparisonsMade": rng.random_range(3..11),
            "criteriaAnalyzed": rng.random_range(10..30),
        }),
        StepCategory::Purchase => {
            let methods = ["automated", "manual", "hybrid"];
            json!({
                "transactionValue": rng.random_range(100..1_100),
                "processingMethod": methods[rng.random_range(0..methods.len())],
                "conversionRate": round_to(rng.random_range(0.02..0.07), 3),
            })
        }
        StepCategory::Completion => json!({
            "completionRate": round_to(rng.random_range(0.6..0.9), 3),
            "satisfactionScore": round_to(rng.random_range(8.0..10.0), 1),
            "issuesResolved": rng.random_range(0..5),
        }),
        StepCategory::PostPurchase => json!({
            "followUpActions": rng.random_range(2..12),
            "referralsGenerated": rng.random_range(1..9),
            "engagementScore": rng.random_range(7..11),
        }),
        StepCategory::Generic => json!({
            "itemsProcessed": rng.random_range(20..70),
            "processingEfficiency": round_to(rng.random_range(0.8..1.0), 3),
            "qualityScore": round_to(rng.random_range(8.0..10.0), 1),
        }),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
