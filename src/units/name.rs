//! Service name normalization
//!
//! `foo` and `foo.service` name the same service. Internally the bare form
//! is kept; the suffix is re-appended only where a unit file name is needed.

use std::fmt;
use std::str::FromStr;

pub const DOT_SERVICE: &str = ".service";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum NameError {
    #[error("empty service name")]
    Empty,

    #[error("invalid service name '{0}'")]
    Invalid(String),
}

/// A service name with any `.service` suffix stripped
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let bare = raw.strip_suffix(DOT_SERVICE).unwrap_or(raw);
        if bare.is_empty() {
            return Err(NameError::Empty);
        }
        // The name becomes a path component under etc/init.d and etc/rcN.d
        if bare == "." || bare == ".." || bare.contains('/') || bare.contains('\0') {
            return Err(NameError::Invalid(raw.to_string()));
        }
        if bare.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(NameError::Invalid(raw.to_string()));
        }
        Ok(Self(bare.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the unit, e.g. `foo.service`
    pub fn unit_file_name(&self) -> String {
        format!("{}{}", self.0, DOT_SERVICE)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ServiceName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
