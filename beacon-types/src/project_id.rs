use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised if a project ID cannot be parsed from a string.
#[derive(Debug, Error, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParseProjectIdError {
    /// Raised if the value is not made up of decimal digits.
    #[error("invalid value for project id")]
    InvalidValue,
    /// Raised if an empty value is parsed.
    #[error("empty or missing project id")]
    EmptyValue,
}

/// Represents a project ID.
///
/// The ingest endpoint only accepts numeric project ids.  The textual form is
/// kept as given so that ids larger than `u64` still round-trip.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    /// Creates a new project ID from its numeric value.
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id.to_string())
    }

    /// Returns the numeric value of this project id, if it fits into a `u64`.
    #[inline]
    pub fn value(&self) -> Option<u64> {
        self.0.parse::<u64>().ok()
    }

    /// Returns the project id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! impl_from {
    ($ty:ty) => {
        impl From<$ty> for ProjectId {
            #[inline]
            fn from(val: $ty) -> Self {
                Self::new(val as u64)
            }
        }
    };
}

impl_from!(u8);
impl_from!(u16);
impl_from!(u32);
impl_from!(u64);

impl FromStr for ProjectId {
    type Err = ParseProjectIdError;

    fn from_str(s: &str) -> Result<ProjectId, ParseProjectIdError> {
        if s.is_empty() {
            return Err(ParseProjectIdError::EmptyValue);
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseProjectIdError::InvalidValue);
        }
        Ok(ProjectId(s.to_owned()))
    }
}

impl TryFrom<String> for ProjectId {
    type Error = ParseProjectIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> String {
        id.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_basic_api() {
        let id: ProjectId = "42".parse().unwrap();
        assert_eq!(id, ProjectId::new(42));
        assert_eq!(
            "42xxx".parse::<ProjectId>(),
            Err(ParseProjectIdError::InvalidValue)
        );
        assert_eq!(
            "".parse::<ProjectId>(),
            Err(ParseProjectIdError::EmptyValue)
        );
        assert_eq!(ProjectId::new(42).to_string(), "42");

        assert_eq!(
            serde_json::to_string(&ProjectId::new(42)).unwrap(),
            "\"42\""
        );
        assert_eq!(
            serde_json::from_str::<ProjectId>("\"42\"").unwrap(),
            ProjectId::new(42)
        );
    }

    #[test]
    fn test_huge_project_id_keeps_text() {
        let id: ProjectId = "123456789012345678901234567890".parse().unwrap();
        assert_eq!(id.value(), None);
        assert_eq!(id.as_str(), "123456789012345678901234567890");
    }
}
