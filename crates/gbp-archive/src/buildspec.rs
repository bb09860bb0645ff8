//! Buildspecs: how users name the builds to dump.
//!
//! - `<machine>`: every build of the machine
//! - `<machine>.<build_id>`: one build
//! - `<machine>@<tag>`: the build the tag points at
//! - `<machine>@`: the published build

use crate::build::{is_safe_name, Build, IdentityError};
use crate::record::BuildRecord;
use crate::store::{all_records, ArtifactStorage, RecordStore, StoreError};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSpec {
    Machine(String),
    Build(Build),
    Tag { machine: String, tag: String },
}

impl FromStr for BuildSpec {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((machine, tag)) = s.split_once('@') {
            if machine.is_empty() {
                return Err(IdentityError::EmptyMachine);
            }
            for name in [machine, tag] {
                if !name.is_empty() && !is_safe_name(name) {
                    return Err(IdentityError::InvalidName {
                        value: name.to_string(),
                    });
                }
            }
            return Ok(Self::Tag {
                machine: machine.to_string(),
                tag: tag.to_string(),
            });
        }
        if s.contains('.') {
            return s.parse().map(Self::Build);
        }
        if s.is_empty() {
            return Err(IdentityError::EmptyMachine);
        }
        if !is_safe_name(s) {
            return Err(IdentityError::InvalidName {
                value: s.to_string(),
            });
        }
        Ok(Self::Machine(s.to_string()))
    }
}

impl fmt::Display for BuildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Machine(machine) => f.write_str(machine),
            Self::Build(build) => write!(f, "{}", build),
            Self::Tag { machine, tag } => write!(f, "{}@{}", machine, tag),
        }
    }
}

/// Buildspecs that matched nothing, in the order given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .specs.iter().map(|s| format!("{} not found.", s)).collect::<Vec<_>>().join("\n"))]
pub struct BuildSpecLookupError {
    pub specs: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Lookup(#[from] BuildSpecLookupError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResolveError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lookup(_) => "BuildSpecLookup",
            Self::Store(e) => e.code(),
        }
    }
}

fn lookup(
    spec: &BuildSpec,
    records: &dyn RecordStore,
    storage: &dyn ArtifactStorage,
) -> Result<Vec<BuildRecord>, StoreError> {
    match spec {
        BuildSpec::Machine(machine) => records.for_machine(machine),
        BuildSpec::Build(build) => fetch(build, records),
        BuildSpec::Tag { machine, tag } => match storage.resolve_tag(machine, tag)? {
            Some(build) => fetch(&build, records),
            None => Ok(Vec::new()),
        },
    }
}

fn fetch(build: &Build, records: &dyn RecordStore) -> Result<Vec<BuildRecord>, StoreError> {
    match records.get(build) {
        Ok(record) => Ok(vec![record]),
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Records selected by `specs`, sorted by build and without duplicates.
///
/// No specs selects every record. Every spec is evaluated; if any match
/// nothing, the error lists all of them.
pub fn select_records<S: AsRef<str>>(
    specs: &[S],
    records: &dyn RecordStore,
    storage: &dyn ArtifactStorage,
) -> Result<Vec<BuildRecord>, ResolveError> {
    if specs.is_empty() {
        let mut all = all_records(records)?;
        all.sort_by(|a, b| a.build.cmp(&b.build));
        return Ok(all);
    }

    let mut selected = BTreeMap::new();
    let mut missing = Vec::new();

    for raw in specs {
        let raw = raw.as_ref();
        let found = match raw.parse::<BuildSpec>() {
            Ok(spec) => lookup(&spec, records, storage)?,
            Err(_) => Vec::new(),
        };
        if found.is_empty() {
            missing.push(raw.to_string());
        }
        for record in found {
            selected.insert(record.build.clone(), record);
        }
    }

    if !missing.is_empty() {
        return Err(BuildSpecLookupError { specs: missing }.into());
    }
    Ok(selected.into_values().collect())
}

/// The builds selected by `specs`. See [`select_records`].
pub fn resolve_buildspecs<S: AsRef<str>>(
    specs: &[S],
    records: &dyn RecordStore,
    storage: &dyn ArtifactStorage,
) -> Result<Vec<Build>, ResolveError> {
    Ok(select_records(specs, records, storage)?
        .into_iter()
        .map(|record| record.build)
        .collect())
}

/// Keep records completed on or after the start of `date` (UTC). Records that
/// never completed are dropped.
pub fn filter_newer(records: Vec<BuildRecord>, date: NaiveDate) -> Vec<BuildRecord> {
    let cutoff = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    records
        .into_iter()
        .filter(|record| match (record.completed, cutoff) {
            (Some(completed), Some(cutoff)) => completed >= cutoff,
            _ => false,
        })
        .collect()
}
