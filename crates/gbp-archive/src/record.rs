//! Build records: the metadata a records store keeps for each build.

use crate::build::Build;
use crate::registry::{converters, Fields, Record, RegistryError, TypeRegistry};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A build's record.
///
/// Serializes flat: `machine` and `build_id` sit next to the other fields, and
/// timestamps are RFC 3339 strings (or null).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRecord {
    #[serde(flatten)]
    pub build: Build,
    pub note: Option<String>,
    pub logs: Option<String>,
    pub keep: bool,
    pub submitted: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub built: Option<DateTime<Utc>>,
}

impl BuildRecord {
    pub fn new(build: Build) -> Self {
        Self {
            build,
            note: None,
            logs: None,
            keep: false,
            submitted: None,
            completed: None,
            built: None,
        }
    }

    pub fn build(&self) -> &Build {
        &self.build
    }

    pub fn with_overrides(mut self, overrides: RecordOverrides) -> Self {
        if let Some(note) = overrides.note {
            self.note = Some(note);
        }
        if let Some(logs) = overrides.logs {
            self.logs = Some(logs);
        }
        if let Some(keep) = overrides.keep {
            self.keep = keep;
        }
        if let Some(ts) = overrides.submitted {
            self.submitted = Some(ts);
        }
        if let Some(ts) = overrides.completed {
            self.completed = Some(ts);
        }
        if let Some(ts) = overrides.built {
            self.built = Some(ts);
        }
        self
    }
}

impl Record for BuildRecord {
    const KIND: &'static str = "BuildRecord";
    const FIELDS: &'static [&'static str] = &[
        "machine",
        "build_id",
        "note",
        "logs",
        "keep",
        "submitted",
        "completed",
        "built",
    ];

    fn construct(fields: &mut Fields) -> Result<Self, RegistryError> {
        let machine = fields.required_str("machine")?;
        let build_id = fields.required_str("build_id")?;
        let build =
            Build::new(machine, build_id).map_err(|e| RegistryError::shape(Self::KIND, e.to_string()))?;

        Ok(Self {
            build,
            note: fields.optional_str("note")?,
            logs: fields.optional_str("logs")?,
            keep: fields.bool_or("keep", false)?,
            submitted: fields.optional_timestamp("submitted")?,
            completed: fields.optional_timestamp("completed")?,
            built: fields.optional_timestamp("built")?,
        })
    }
}

/// Field values applied on top of a record when saving it.
///
/// Only `Some` values override; an override cannot clear a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordOverrides {
    pub note: Option<String>,
    pub logs: Option<String>,
    pub keep: Option<bool>,
    pub submitted: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub built: Option<DateTime<Utc>>,
}

impl RecordOverrides {
    pub fn completed(mut self, ts: DateTime<Utc>) -> Self {
        self.completed = Some(ts);
        self
    }

    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = Some(keep);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Register the timestamp converters build records need.
pub fn register_converters(registry: &mut TypeRegistry) {
    for field in ["submitted", "completed", "built"] {
        registry.register::<BuildRecord, _>(field, converters::iso_timestamp);
    }
}
