use serde::{Deserialize, Serialize};

use crate::errors::JobStoreError;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Job {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub email: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
    // Never written by the service, only read back.
    pub expires: Option<String>,
}

/// Writable fields of a job listing as submitted by clients. Absent form
/// fields deserialize to empty strings so that validation, not the form
/// extractor, decides what is missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct JobFields {
    pub title: String,
    pub description: String,
    pub email: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub location: String,
}

/// Which fields must be non-empty before a listing is created or edited.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequiredFields {
    /// title, description and email
    Core,
    /// Core plus type, category and location
    Extended,
}

impl Default for RequiredFields {
    fn default() -> Self {
        RequiredFields::Extended
    }
}

impl RequiredFields {
    fn count(self) -> usize {
        match self {
            RequiredFields::Core => 3,
            RequiredFields::Extended => 6,
        }
    }
}

impl JobFields {
    fn named(&self) -> [(&'static str, &str); 6] {
        [
            ("title", self.title.as_str()),
            ("description", self.description.as_str()),
            ("email", self.email.as_str()),
            ("type", self.kind.as_str()),
            ("category", self.category.as_str()),
            ("location", self.location.as_str()),
        ]
    }

    pub fn validate(&self, required: RequiredFields) -> Result<(), JobStoreError> {
        let missing: Vec<&'static str> = self
            .named()
            .iter()
            .take(required.count())
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(JobStoreError::Validation { missing })
        }
    }

    pub fn kind(&self) -> Option<&str> {
        optional(&self.kind)
    }

    pub fn category(&self) -> Option<&str> {
        optional(&self.category)
    }

    pub fn location(&self) -> Option<&str> {
        optional(&self.location)
    }
}

// Empty optional fields are stored as NULL.
fn optional(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
