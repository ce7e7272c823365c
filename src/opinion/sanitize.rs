use std::borrow::Cow;

use serde_json::Value;

use super::patterns::UNSAFE_PATTERNS;
use super::types::{ConfidenceField, DifferentialItem, ExternalOpinionPayload, PrimaryDiagnosis};

pub const REDACTION: &str = "[REMOVED: UNSAFE ADVICE]";

/// Confidence substituted when the supplied one is unusable.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Replace every unsafe-advice match in `text`.
pub fn sanitize_text(text: &str) -> Cow<'_, str> {
    let mut out = Cow::Borrowed(text);
    for p in UNSAFE_PATTERNS.iter() {
        if p.regex.is_match(&out) {
            out = Cow::Owned(p.regex.replace_all(&out, REDACTION).into_owned());
        }
    }
    out
}

fn sanitize_value(value: &mut Value) {
    match value {
        Value::String(s) => sanitize_string(s),
        Value::Array(items) => items.iter_mut().for_each(sanitize_value),
        Value::Object(map) => map.values_mut().for_each(sanitize_value),
        _ => {}
    }
}

fn sanitize_string(s: &mut String) {
    let replaced = match sanitize_text(s) {
        Cow::Owned(clean) => Some(clean),
        Cow::Borrowed(_) => None,
    };
    if let Some(clean) = replaced {
        *s = clean;
    }
}

/// Copy of the payload with unsafe advice redacted from every text field
/// and an unusable confidence replaced by 0.5. A missing confidence stays
/// missing. Idempotent.
pub fn sanitize(payload: &ExternalOpinionPayload) -> ExternalOpinionPayload {
    let mut clean = payload.clone();

    if let Some(reasoning) = clean.clinical_reasoning.as_mut() {
        sanitize_string(reasoning);
    }
    for field in [
        &mut clean.immediate_management,
        &mut clean.patient_education,
        &mut clean.recommended_investigations,
        &mut clean.red_flags,
        &mut clean.referral_criteria,
    ] {
        if let Some(value) = field.as_mut() {
            sanitize_value(value);
        }
    }
    clean.extra.values_mut().for_each(sanitize_value);

    match clean.primary_diagnosis.as_mut() {
        Some(PrimaryDiagnosis::Text(name)) => sanitize_string(name),
        Some(PrimaryDiagnosis::Structured {
            disease_name,
            disease_code,
        }) => {
            sanitize_string(disease_name);
            if let Some(code) = disease_code.as_mut() {
                sanitize_string(code);
            }
        }
        None => {}
    }
    for item in clean.differential_diagnoses.iter_mut() {
        match item {
            DifferentialItem::Name(name) => sanitize_string(name),
            DifferentialItem::Scored { disease_name, .. } => {
                sanitize_string(disease_name)
            }
        }
    }

    if let ConfidenceField::Invalid(raw) = payload.confidence_field() {
        tracing::debug!(confidence = %raw, "Replacing invalid opinion confidence");
        clean.confidence = Some(Value::from(FALLBACK_CONFIDENCE));
    }

    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opinion::patterns::find_unsafe;
    use serde_json::json;

    fn payload(value: Value) -> ExternalOpinionPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn redacts_management_and_reasoning() {
        let p = payload(json!({
            "primary_diagnosis": "Malaria",
            "confidence": 0.8,
            "immediate_management": "Rest at home and don't see a doctor",
            "clinical_reasoning": "Patients may self-medicate with leftovers",
        }));
        let clean = sanitize(&p);
        assert_eq!(
            clean.immediate_management,
            Some(json!("Rest at home and [REMOVED: UNSAFE ADVICE]"))
        );
        assert!(clean.reasoning().contains(REDACTION));
        assert!(find_unsafe(&clean.searchable_text()).is_empty());
    }

    #[test]
    fn redacts_nested_and_extra_fields() {
        let p = payload(json!({
            "red_flags": ["Home surgery attempts", "fever"],
            "follow_up": {"note": "unproven cure available"},
        }));
        let clean = sanitize(&p);
        assert!(find_unsafe(&clean.searchable_text()).is_empty());
        assert_eq!(clean.red_flags.as_ref().unwrap()[1], "fever");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let p = payload(json!({
            "confidence": "very high",
            "patient_education": "Ignore medical advice; experimental treatment works",
        }));
        let once = sanitize(&p);
        let twice = sanitize(&once);
        assert_eq!(once, twice);
        assert_eq!(once.confidence, Some(json!(0.5)));
    }

    #[test]
    fn missing_confidence_stays_missing() {
        let clean = sanitize(&payload(json!({"primary_diagnosis": "Malaria"})));
        assert!(clean.confidence.is_none());
    }

    #[test]
    fn redacts_structured_primary_code() {
        let p = payload(json!({
            "primary_diagnosis": {"disease_name": "Malaria", "disease_code": "self-medicate"},
            "confidence": 0.5,
        }));
        let clean = sanitize(&p);
        assert!(find_unsafe(&clean.searchable_text()).is_empty());
        assert_eq!(clean.primary_diagnosis.as_ref().and_then(|d| d.code()), Some(REDACTION));
        assert_eq!(clean.primary_diagnosis.as_ref().map(|d| d.name()), Some("Malaria"));
    }

    #[test]
    fn phrase_split_across_list_entries_is_not_a_match() {
        let p = payload(json!({
            "primary_diagnosis": "Malaria",
            "red_flags": ["do not", "see a doctor"],
        }));
        assert!(find_unsafe(&p.searchable_text()).is_empty());
        assert!(find_unsafe(&sanitize(&p).searchable_text()).is_empty());
    }

    #[test]
    fn clean_text_is_borrowed() {
        assert!(matches!(sanitize_text("drink fluids"), Cow::Borrowed(_)));
    }
}
