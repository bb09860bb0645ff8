//! Archive metadata: the first member of every archive.

use crate::build::{Build, IdentityError};
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub const METADATA_VERSION: u32 = 1;

/// Metadata describing an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: u32,
    /// Time of the dump, ISO-8601.
    pub created: String,
    /// Host that created the dump.
    pub hostname: String,
    /// Builds in the archive, as `<machine>.<build_id>`.
    pub manifest: Vec<String>,
}

impl Metadata {
    /// The manifest as build identities.
    pub fn builds(&self) -> Result<Vec<Build>, IdentityError> {
        self.manifest.iter().map(|id| id.parse()).collect()
    }
}

/// Metadata for `builds`, stamped with `timestamp` and the local host name.
pub fn create<Tz>(builds: &[Build], timestamp: &DateTime<Tz>) -> Metadata
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    create_with_hostname(builds, timestamp, hostname())
}

pub fn create_with_hostname<Tz>(
    builds: &[Build],
    timestamp: &DateTime<Tz>,
    hostname: impl Into<String>,
) -> Metadata
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    Metadata {
        version: METADATA_VERSION,
        created: timestamp.to_rfc3339(),
        hostname: hostname.into(),
        manifest: builds.iter().map(ToString::to_string).collect(),
    }
}

pub fn encode(metadata: &Metadata) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(metadata)
}

pub fn decode(bytes: &[u8]) -> serde_json::Result<Metadata> {
    serde_json::from_slice(bytes)
}

pub fn hostname() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}
