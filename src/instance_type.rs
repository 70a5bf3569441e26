//! Instance size enumeration and the validated [`InstanceType`] newtype.

use std::fmt;

use serde::Serialize;

/// Scaleway commercial types accepted when no custom enumeration is
/// configured.
pub const DEFAULT_INSTANCE_TYPES: &[&str] = &[
    "DEV1-S", "DEV1-M", "DEV1-L", "DEV1-XL", "GP1-XS", "GP1-S", "GP1-M", "GP1-L", "GP1-XL",
    "PLAY2-PICO", "PLAY2-NANO", "PLAY2-MICRO", "PRO2-XXS", "PRO2-XS", "PRO2-S", "PRO2-M",
    "PRO2-L", "POP2-2C-8G", "POP2-4C-16G", "POP2-8C-32G", "POP2-16C-64G", "POP2-32C-128G",
    "ENT1-XXS", "ENT1-XS", "ENT1-S", "ENT1-M", "ENT1-L", "ENT1-XL", "ENT1-2XL",
];

/// Instance size that is known to belong to an [`InstanceTypeCatalog`].
///
/// Values can only be obtained through [`InstanceTypeCatalog::get`], so a
/// request holding one never carries an unknown size.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct InstanceType(String);

impl InstanceType {
    /// Returns the commercial type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InstanceType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Fixed enumeration of valid instance sizes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceTypeCatalog {
    types: Vec<String>,
}

impl Default for InstanceTypeCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_INSTANCE_TYPES.iter().copied())
    }
}

impl InstanceTypeCatalog {
    /// Builds a catalog from the given sizes, trimming blanks and duplicates.
    #[must_use]
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut collected: Vec<String> = Vec::new();
        for value in types {
            let trimmed = value.as_ref().trim();
            if trimmed.is_empty() || collected.iter().any(|known| known == trimmed) {
                continue;
            }
            collected.push(trimmed.to_owned());
        }
        Self { types: collected }
    }

    /// Returns `true` iff `value` is a member of the enumeration.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.types.iter().any(|known| known == value)
    }

    /// Returns the validated size, or `None` when `value` is not listed.
    #[must_use]
    pub fn get(&self, value: &str) -> Option<InstanceType> {
        self.types
            .iter()
            .find(|known| known.as_str() == value)
            .map(|known| InstanceType(known.clone()))
    }

    /// Iterates over the known sizes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(String::as_str)
    }

    /// Number of known sizes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` when the catalog lists no sizes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_catalog_lists_every_builtin_type() {
        let catalog = InstanceTypeCatalog::default();
        assert_eq!(catalog.len(), DEFAULT_INSTANCE_TYPES.len());
        for value in DEFAULT_INSTANCE_TYPES {
            assert!(catalog.contains(value), "{value} should be known");
        }
    }

    #[test]
    fn catalog_collapses_duplicates_and_blanks() {
        let catalog = InstanceTypeCatalog::new(["DEV1-S", " DEV1-S ", "", "GP1-XS"]);
        assert_eq!(catalog.iter().collect::<Vec<_>>(), vec!["DEV1-S", "GP1-XS"]);
    }

    #[rstest]
    #[case("dev1-s")]
    #[case("DEV1-S ")]
    #[case("m1.small")]
    #[case("")]
    fn catalog_rejects_values_outside_the_enumeration(#[case] value: &str) {
        let catalog = InstanceTypeCatalog::default();
        assert!(!catalog.contains(value));
        assert!(catalog.get(value).is_none());
    }

    #[test]
    fn get_returns_typed_value() {
        let catalog = InstanceTypeCatalog::default();
        let size = catalog.get("GP1-M").expect("GP1-M is built in");
        assert_eq!(size.as_str(), "GP1-M");
        assert_eq!(size.to_string(), "GP1-M");
    }
}
