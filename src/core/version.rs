//! Purpose: Structured comparison of a library's discovery version.
//! Exports: `DiscoveryVersion`, `Feature`.
//! Invariants: Ordering is numeric per component, so 22.9 sorts before 22.10.
//! Invariants: Missing components parse as zero; trailing build text is ignored.

use super::error::{Error, ErrorKind};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DiscoveryVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl DiscoveryVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for DiscoveryVersion {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let head = input
            .trim()
            .split(|c: char| c.is_whitespace() || c == '-' || c == '(')
            .next()
            .unwrap_or_default();
        let mut parts = [0u32; 3];
        let mut seen = 0;
        for (slot, piece) in parts.iter_mut().zip(head.split('.')) {
            *slot = piece.parse().map_err(|_| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid discovery version `{input}`"))
                    .with_hint("Expected a dotted version such as 23.01.00.")
            })?;
            seen += 1;
        }
        if seen == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("empty discovery version"));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for DiscoveryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}.{:02}", self.major, self.minor, self.patch)
    }
}

/// Client behaviour gated on the server's discovery version.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Feature {
    ManifestationVolumes,
    CopyDetails,
    BrowseCategoryNavigation,
    SavedSearchItemRoute,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::ManifestationVolumes,
        Feature::CopyDetails,
        Feature::BrowseCategoryNavigation,
        Feature::SavedSearchItemRoute,
    ];

    pub fn min_version(self) -> DiscoveryVersion {
        match self {
            Self::ManifestationVolumes => DiscoveryVersion::new(22, 6, 0),
            Self::CopyDetails => DiscoveryVersion::new(22, 9, 0),
            Self::BrowseCategoryNavigation => DiscoveryVersion::new(22, 10, 0),
            Self::SavedSearchItemRoute => DiscoveryVersion::new(23, 1, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManifestationVolumes => "manifestation_volumes",
            Self::CopyDetails => "copy_details",
            Self::BrowseCategoryNavigation => "browse_category_navigation",
            Self::SavedSearchItemRoute => "saved_search_item_route",
        }
    }

    pub fn supported_by(self, version: DiscoveryVersion) -> bool {
        version >= self.min_version()
    }
}

#[cfg(test)]
mod tests {
    use super::{DiscoveryVersion, Feature};

    fn parse(input: &str) -> DiscoveryVersion {
        input.parse().expect("version")
    }

    #[test]
    fn numeric_ordering_differs_from_string_ordering() {
        assert!("22.9.00" > "22.10.00");
        assert!(parse("22.9.00") < parse("22.10.00"));
    }

    #[test]
    fn tolerates_short_and_suffixed_versions() {
        assert_eq!(parse("23"), DiscoveryVersion::new(23, 0, 0));
        assert_eq!(parse("22.10"), DiscoveryVersion::new(22, 10, 0));
        assert_eq!(parse(" 23.01.00 (build 4)"), DiscoveryVersion::new(23, 1, 0));
        assert_eq!(parse("22.06.01-beta"), DiscoveryVersion::new(22, 6, 1));
        assert_eq!(parse("22.9.0").to_string(), "22.09.00");
        assert!("".parse::<DiscoveryVersion>().is_err());
        assert!("v22".parse::<DiscoveryVersion>().is_err());
    }

    #[test]
    fn feature_gates_follow_min_versions() {
        let version = parse("22.9.5");
        assert!(Feature::ManifestationVolumes.supported_by(version));
        assert!(Feature::CopyDetails.supported_by(version));
        assert!(!Feature::BrowseCategoryNavigation.supported_by(version));
        assert!(!Feature::SavedSearchItemRoute.supported_by(version));
        assert!(Feature::ALL.iter().all(|f| f.supported_by(parse("23.01.00"))));
    }
}
