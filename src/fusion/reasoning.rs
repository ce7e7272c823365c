//! Plain-language explanation attached to every decision.

use super::types::DecisionMode;

/// Inputs the explanation is built from.
pub struct ReasoningInput<'a> {
    pub display_name: &'a str,
    pub confidence: f64,
    pub agreement: f64,
    pub mode: DecisionMode,
    pub symptom_count: usize,
    /// Display name of the strongest alternative, if any.
    pub top_alternative: Option<&'a str>,
    pub external_used: bool,
}

pub fn clinical_reasoning(input: &ReasoningInput<'_>) -> String {
    let mut parts = Vec::with_capacity(5);

    let band = if input.confidence > 0.8 {
        "High"
    } else if input.confidence > 0.6 {
        "Moderate"
    } else {
        "Low"
    };
    parts.push(format!("{band} confidence diagnosis of {}", input.display_name));

    match input.mode {
        DecisionMode::HeuristicOnly => {
            parts.push("Classifier ensemble unavailable; ranking based on symptom overlap only".to_string())
        }
        DecisionMode::Ensemble if input.agreement > 0.8 => {
            parts.push("Strong consensus among ensemble models".to_string())
        }
        DecisionMode::Ensemble if input.agreement > 0.6 => {
            parts.push("Moderate consensus among ensemble models".to_string())
        }
        DecisionMode::Ensemble => parts.push(
            "Limited consensus among ensemble models; consider the differential diagnoses".to_string(),
        ),
    }

    if input.symptom_count >= 3 {
        parts.push(format!("Based on {} reported symptoms", input.symptom_count));
    } else {
        parts.push("Limited symptom information; additional assessment recommended".to_string());
    }

    if let Some(alt) = input.top_alternative {
        parts.push(format!("Consider {alt} as alternative diagnosis"));
    }

    if input.external_used {
        parts.push("External opinion incorporated".to_string());
    }

    parts.join(". ") + "."
}
