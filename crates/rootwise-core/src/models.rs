//! Domain records and their document-store schema.
//!
//! Documents are validated at the boundary: a document missing a required
//! field is rejected with `CoreError::MalformedResponse` rather than
//! surfacing half-populated records.

use chrono::{DateTime, Utc};
use rootwise_store::Document;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Field names of a plant record document.
pub mod record_fields {
    /// Owner identity (email)
    pub const OWNER: &str = "name";
    pub const PLANT_NAME: &str = "plantname";
    pub const DISEASE: &str = "disease";
    /// Blob id of the stored image
    pub const IMAGE: &str = "image";
}

/// Field names of a disease catalogue document.
pub mod disease_fields {
    pub const NAME: &str = "name";
    pub const CURE: &str = "cure";
    pub const IMAGE: &str = "image";
}

/// A persisted classification of one plant photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantRecord {
    pub id: String,
    pub owner: String,
    pub plant_name: String,
    pub disease: String,
    pub blob_id: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<Document> for PlantRecord {
    type Error = CoreError;

    fn try_from(doc: Document) -> CoreResult<Self> {
        let owner = required(&doc, record_fields::OWNER)?;
        let plant_name = required(&doc, record_fields::PLANT_NAME)?;
        if plant_name.trim().is_empty() {
            return Err(CoreError::MalformedResponse(format!(
                "record {} has an empty plant name",
                doc.id
            )));
        }
        let disease = required(&doc, record_fields::DISEASE)?;
        let blob_id = required(&doc, record_fields::IMAGE)?;
        Ok(PlantRecord {
            id: doc.id,
            owner,
            plant_name,
            disease,
            blob_id,
            created_at: doc.created_at,
        })
    }
}

/// A disease catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disease {
    pub id: String,
    pub name: String,
    pub cure: Option<String>,
    /// Illustration URL as stored in the catalogue
    pub image_url: Option<String>,
}

impl TryFrom<Document> for Disease {
    type Error = CoreError;

    fn try_from(doc: Document) -> CoreResult<Self> {
        let name = required(&doc, disease_fields::NAME)?;
        let cure = optional(&doc, disease_fields::CURE);
        let image_url = optional(&doc, disease_fields::IMAGE);
        Ok(Disease {
            id: doc.id,
            name,
            cure,
            image_url,
        })
    }
}

/// What to tell the user about a classified plant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum CareAdvice {
    /// The label says the plant is healthy
    Healthy,
    /// Remedy from the catalogue
    Cure(String),
    /// The catalogue has no remedy for this label
    Unknown,
}

impl CareAdvice {
    /// Healthy labels win; otherwise the catalogue cure, if any.
    pub fn for_label(label: &str, catalogue_cure: Option<&str>) -> Self {
        if label.to_lowercase().contains("healthy") {
            return CareAdvice::Healthy;
        }
        match catalogue_cure.map(str::trim).filter(|c| !c.is_empty()) {
            Some(cure) => CareAdvice::Cure(cure.to_string()),
            None => CareAdvice::Unknown,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CareAdvice::Healthy => "Your plant is healthy! Keep watering it and loving it.",
            CareAdvice::Cure(text) => text,
            CareAdvice::Unknown => {
                "Our database doesn't have a cure for this disease yet, but we are working on it!"
            }
        }
    }
}

/// A plant record together with everything its detail view shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantDetail {
    pub record: PlantRecord,
    pub image_url: String,
    pub advice: CareAdvice,
}

fn required(doc: &Document, field: &str) -> CoreResult<String> {
    doc.str_field(field).map(str::to_string).ok_or_else(|| {
        CoreError::MalformedResponse(format!("document {} missing field `{field}`", doc.id))
    })
}

fn optional(doc: &Document, field: &str) -> Option<String> {
    doc.str_field(field)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
