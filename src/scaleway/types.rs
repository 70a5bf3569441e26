//! Newtypes for Scaleway values to avoid stringly-typed code.

use std::ops::Deref;

macro_rules! newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub(crate) struct $name(String);

        impl $name {
            pub(crate) const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }
    };
}

newtype!(InstanceId);
newtype!(Zone);
newtype!(ServerState);
newtype!(Action);

impl Zone {
    /// First availability zone of `region`. A value that already names a
    /// zone is kept as is.
    pub(crate) fn for_region(region: &str) -> Self {
        let trimmed = region.trim();
        let is_zone = trimmed
            .rsplit_once('-')
            .is_some_and(|(_, suffix)| suffix.chars().all(|c| c.is_ascii_digit()));
        if is_zone {
            Self::from(trimmed)
        } else {
            Self(format!("{trimmed}-1"))
        }
    }
}
