use reqwest::Client;
use serde::Deserialize;

use crate::models::medicine::MedicineDetail;

const OPENFDA_LABEL_URL: &str = "https://api.fda.gov/drug/label.json";

/// Client for the openFDA drug label endpoint.
pub struct OpenFdaClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    #[serde(default)]
    results: Vec<DrugLabel>,
}

#[derive(Debug, Default, Deserialize)]
struct DrugLabel {
    #[serde(default)]
    purpose: Vec<String>,
    #[serde(default)]
    indications_and_usage: Vec<String>,
    #[serde(default)]
    dosage_and_administration: Vec<String>,
    #[serde(default)]
    active_ingredient: Vec<String>,
    #[serde(default)]
    openfda: OpenFdaFields,
}

#[derive(Debug, Default, Deserialize)]
struct OpenFdaFields {
    #[serde(default)]
    brand_name: Vec<String>,
    #[serde(default)]
    generic_name: Vec<String>,
    #[serde(default)]
    dosage_form: Vec<String>,
}

impl OpenFdaClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(OPENFDA_LABEL_URL.to_string(), api_key)
    }

    pub fn with_base_url(base_url: String, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key,
        }
    }

    /// Look up the first label whose generic name matches the medicine id.
    pub async fn lookup(&self, medicine_id: &str) -> Result<Option<MedicineDetail>, OpenFdaError> {
        let generic = generic_name_for(medicine_id);
        let search = format!("openfda.generic_name:\"{}\"", generic);

        let mut query = vec![("search", search), ("limit", "1".to_string())];
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.clone()));
        }

        let response = self.http.get(&self.base_url).query(&query).send().await?;
        // openFDA answers 404 when the search matches nothing.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: LabelResponse = response.error_for_status()?.json().await?;
        Ok(body
            .results
            .into_iter()
            .next()
            .map(|label| label_to_detail(medicine_id, &generic, label)))
    }
}

/// `ibuprofen-400mg-tablet` -> `ibuprofen 400mg tablet`
fn generic_name_for(medicine_id: &str) -> String {
    medicine_id
        .split(['-', '_'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_or(values: &[String], fallback: &str) -> String {
    values
        .first()
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn label_to_detail(medicine_id: &str, generic: &str, label: DrugLabel) -> MedicineDetail {
    let name = label
        .openfda
        .generic_name
        .first()
        .cloned()
        .unwrap_or_else(|| generic.to_uppercase());

    MedicineDetail {
        medicine_id: medicine_id.to_string(),
        name,
        category: first_or(&label.purpose, "N/A"),
        dose: first_or(&label.dosage_and_administration, "N/A"),
        forms: label.openfda.dosage_form,
        ingredients: label.active_ingredient,
        expiry: None,
        brand: label.openfda.brand_name.into_iter().next(),
        description: first_or(&label.indications_and_usage, ""),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpenFdaError {
    #[error("openFDA request failed: {0}")]
    Http(#[from] reqwest::Error),
}
