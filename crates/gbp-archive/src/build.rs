//! Build identity: `(machine, build_id)`.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("machine name must not be empty")]
    EmptyMachine,

    #[error("build id must not be empty (machine {machine})")]
    EmptyBuildId { machine: String },

    #[error("'{value}' is not a build id; expected <machine>.<build_id>")]
    Malformed { value: String },

    #[error("'{value}' is not a valid name")]
    InvalidName { value: String },
}

/// Whether `name` can be used as a single path component under a storage root.
pub(crate) fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// A single build of a machine.
///
/// The canonical text form is `<machine>.<build_id>`. Builds order by machine
/// name, then by numeric build id; ids that are not numbers sort after numeric
/// ones, by string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Build {
    machine: String,
    build_id: String,
}

impl Build {
    pub fn new(machine: impl Into<String>, build_id: impl Into<String>) -> Result<Self, IdentityError> {
        let machine = machine.into();
        let build_id = build_id.into();

        if machine.is_empty() {
            return Err(IdentityError::EmptyMachine);
        }
        if build_id.is_empty() {
            return Err(IdentityError::EmptyBuildId { machine });
        }
        for name in [&machine, &build_id] {
            if !is_safe_name(name) {
                return Err(IdentityError::InvalidName {
                    value: name.to_string(),
                });
            }
        }

        Ok(Self { machine, build_id })
    }

    pub fn machine(&self) -> &str {
        &self.machine
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// The build id as a number, if it is one.
    pub fn number(&self) -> Option<u64> {
        self.build_id.parse().ok()
    }
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.machine, self.build_id)
    }
}

impl FromStr for Build {
    type Err = IdentityError;

    /// Parse `<machine>.<build_id>`. The split happens at the last dot so that
    /// machine names may themselves contain dots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (machine, build_id) = s.rsplit_once('.').ok_or_else(|| IdentityError::Malformed {
            value: s.to_string(),
        })?;
        Self::new(machine, build_id)
    }
}

impl Ord for Build {
    fn cmp(&self, other: &Self) -> Ordering {
        self.machine
            .cmp(&other.machine)
            .then_with(|| match (self.number(), other.number()) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| self.build_id.cmp(&other.build_id))
    }
}

impl PartialOrd for Build {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
