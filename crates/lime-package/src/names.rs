//! String name tables for closed enumerations
//!
//! Every enumeration that appears in manifests or configuration has exactly
//! one constant table mapping values to their canonical spelling. Parsing is a
//! case-insensitive lookup, display and serialization are a lookup by value.

use std::fmt;

/// A closed set of values with canonical string names
pub trait NamedEnum: Sized + Copy + PartialEq + 'static {
    /// Human readable name of the enumeration, used in errors
    const KIND: &'static str;

    /// Bidirectional value/name table
    const NAMES: &'static [(Self, &'static str)];

    /// Value produced by parsing an empty string, if empty is accepted
    const EMPTY: Option<Self> = None;

    /// Canonical name of this value
    fn name(&self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(value, _)| value == self)
            .map(|(_, name)| *name)
            .unwrap_or("")
    }

    /// Parse a name, ignoring ASCII case
    fn parse_name(input: &str) -> Result<Self, UnknownName> {
        if input.is_empty() {
            if let Some(value) = Self::EMPTY {
                return Ok(value);
            }
        }

        Self::NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(input))
            .map(|(value, _)| *value)
            .ok_or_else(|| UnknownName {
                kind: Self::KIND,
                value: input.to_string(),
            })
    }
}

/// A name that is not in an enumeration's table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownName {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownName {}

/// Implements `Display`, `FromStr`, `Serialize` and `Deserialize` through the
/// type's `NamedEnum` table.
macro_rules! impl_named_enum {
    ($ty:ty) => {
        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::names::NamedEnum::name(self))
            }
        }

        impl ::std::str::FromStr for $ty {
            type Err = $crate::names::UnknownName;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                <$ty as $crate::names::NamedEnum>::parse_name(s)
            }
        }

        impl ::serde::Serialize for $ty {
            fn serialize<S: ::serde::Serializer>(
                &self,
                serializer: S,
            ) -> ::std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str($crate::names::NamedEnum::name(self))
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $ty {
            fn deserialize<D: ::serde::Deserializer<'de>>(
                deserializer: D,
            ) -> ::std::result::Result<Self, D::Error> {
                let raw = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                <$ty as $crate::names::NamedEnum>::parse_name(&raw)
                    .map_err(<D::Error as ::serde::de::Error>::custom)
            }
        }
    };
}

pub(crate) use impl_named_enum;
