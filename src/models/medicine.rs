use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::fingerprint::ContentHash;

/// Summary identification of the medicine shown in a scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentificationResult {
    pub fingerprint: ContentHash,
    /// Empty when the recognizer could not tie the image to a catalog entry.
    pub medicine_id: String,
    pub name: String,
    pub confidence: f64,
    pub description: String,
    pub low_confidence: bool,
    pub computed_at: DateTime<Utc>,
}

/// Full medicine record returned by detail expansion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicineDetail {
    pub medicine_id: String,
    pub name: String,
    pub category: String,
    pub dose: String,
    #[serde(default)]
    pub forms: Vec<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    pub description: String,
}
