//! The package request and its `name[@version]` specifier syntax.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::RequestError;

/// A request to bundle one package version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRequest {
    /// Package name, possibly scoped (`@scope/pkg`).
    pub name: String,
    /// Concrete version or the [`PackageRequest::LATEST`] sentinel.
    pub version: String,
}

impl PackageRequest {
    /// Sentinel version meaning "whatever the `latest` dist-tag points at".
    pub const LATEST: &'static str = "latest";

    /// Creates a new request.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Creates a request for the latest version.
    #[must_use]
    pub fn latest(name: impl Into<String>) -> Self {
        Self::new(name, Self::LATEST)
    }

    /// Returns true if the version is the `latest` sentinel.
    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.version == Self::LATEST
    }

    /// Parses a deep-link specifier.
    ///
    /// - no `@` → version `latest`
    /// - trailing bare `@` → version `latest`
    /// - `name@version` → as given
    ///
    /// The split happens at the last `@`; a leading `@` belongs to a scoped
    /// name, so `@scope/pkg` has no version part.
    pub fn parse_specifier(input: &str) -> Result<Self, RequestError> {
        let spec = input.trim();

        let (name, version) = match spec.rfind('@') {
            Some(idx) if idx > 0 => (&spec[..idx], &spec[idx + 1..]),
            _ => (spec, ""),
        };

        let name = name.trim();
        if name.is_empty() || name == "@" {
            return Err(RequestError::new(input, "package name is empty"));
        }

        let version = version.trim();
        let version = if version.is_empty() {
            Self::LATEST
        } else {
            version
        };

        Ok(Self::new(name, version))
    }

    /// The install argument, `name@version`.
    #[must_use]
    pub fn install_spec(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PackageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl FromStr for PackageRequest {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_specifier(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bare_name_is_latest() {
        assert_eq!(
            PackageRequest::parse_specifier("left-pad").unwrap(),
            PackageRequest::new("left-pad", "latest")
        );
    }

    #[test]
    fn test_name_at_version() {
        assert_eq!(
            PackageRequest::parse_specifier("left-pad@1.3.0").unwrap(),
            PackageRequest::new("left-pad", "1.3.0")
        );
    }

    #[test]
    fn test_trailing_at_is_latest() {
        assert_eq!(
            PackageRequest::parse_specifier("left-pad@").unwrap(),
            PackageRequest::latest("left-pad")
        );
    }

    #[test]
    fn test_scoped_with_version() {
        assert_eq!(
            PackageRequest::parse_specifier("@scope/pkg@2.0.0").unwrap(),
            PackageRequest::new("@scope/pkg", "2.0.0")
        );
    }

    #[test]
    fn test_scoped_without_version() {
        assert_eq!(
            PackageRequest::parse_specifier("@scope/pkg").unwrap(),
            PackageRequest::latest("@scope/pkg")
        );
        assert_eq!(
            PackageRequest::parse_specifier("@scope/pkg@").unwrap(),
            PackageRequest::latest("@scope/pkg")
        );
    }

    #[test]
    fn test_tag_versions_pass_through() {
        let req: PackageRequest = "react@next".parse().unwrap();
        assert_eq!(req.version, "next");
        assert!(!req.is_latest());
    }

    #[test]
    fn test_whitespace_trimmed() {
        let req: PackageRequest = "  express@5.1.0 \n".parse().unwrap();
        assert_eq!(req, PackageRequest::new("express", "5.1.0"));
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(PackageRequest::parse_specifier("").is_err());
        assert!(PackageRequest::parse_specifier("   ").is_err());
        assert!(PackageRequest::parse_specifier("@").is_err());
        assert!(PackageRequest::parse_specifier("@@1.0.0").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let req = PackageRequest::new("@scope/pkg", "2.0.0");
        assert_eq!(req.to_string(), "@scope/pkg@2.0.0");
        assert_eq!(req.install_spec().parse::<PackageRequest>().unwrap(), req);
    }
}
