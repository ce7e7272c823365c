use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Ordered symptom vocabulary shared by every member of a snapshot.
/// One feature dimension per symptom.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureVocabulary {
    symptoms: Vec<String>,
    index: HashMap<String, usize>,
}

impl FeatureVocabulary {
    /// Build from symptom ids; duplicates keep their first position.
    pub fn new<I, S>(symptoms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered = Vec::new();
        let mut index = HashMap::new();
        for symptom in symptoms {
            let symptom = symptom.into();
            if !index.contains_key(&symptom) {
                index.insert(symptom.clone(), ordered.len());
                ordered.push(symptom);
            }
        }
        Self {
            symptoms: ordered,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.symptoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty()
    }

    pub fn position(&self, symptom: &str) -> Option<usize> {
        self.index.get(symptom).copied()
    }

    pub fn symptoms(&self) -> &[String] {
        &self.symptoms
    }

    /// 1.0 for each vocabulary symptom present, 0.0 otherwise.
    /// Symptoms outside the vocabulary are ignored.
    pub fn encode(&self, canonical: &[String]) -> Vec<f64> {
        let mut vector = vec![0.0; self.symptoms.len()];
        for symptom in canonical {
            if let Some(i) = self.position(symptom) {
                vector[i] = 1.0;
            }
        }
        vector
    }
}

impl From<Vec<String>> for FeatureVocabulary {
    fn from(symptoms: Vec<String>) -> Self {
        Self::new(symptoms)
    }
}

impl From<FeatureVocabulary> for Vec<String> {
    fn from(vocab: FeatureVocabulary) -> Self {
        vocab.symptoms
    }
}
