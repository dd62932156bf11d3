//! Closed string enumerations.
//!
//! Every enum that crosses the API boundary (priority, category, status, the
//! analysis tiers, ...) is declared through [`choice_enum!`], which gives it one
//! wire spelling plus optional aliases and routes both serde and `FromStr`
//! through [`parse_choice`]. Rejections therefore always carry the field name
//! and the allowed set.

use crate::error::{TrackerError, TrackerResult};

/// A closed set of string values.
pub trait Choice: Sized + Copy + 'static {
    /// Field name reported in validation failures.
    const FIELD: &'static str;
    /// Every variant, in declaration order.
    const ALL: &'static [Self];

    /// Canonical wire spelling.
    fn as_str(&self) -> &'static str;

    /// Whether `raw` names this variant (canonical spelling or alias).
    fn matches(&self, raw: &str) -> bool;

    /// Canonical spellings of every variant.
    fn allowed() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.as_str()).collect()
    }
}

/// Parse a raw string into a choice, case-insensitively.
pub fn parse_choice<T: Choice>(raw: &str) -> TrackerResult<T> {
    let trimmed = raw.trim();
    T::ALL
        .iter()
        .copied()
        .find(|c| c.matches(trimmed))
        .ok_or_else(|| TrackerError::invalid_choice(T::FIELD, raw, &T::allowed()))
}

macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($field:literal) {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $wire:literal $(| $alias:literal)*
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $crate::choice::Choice for $name {
            const FIELD: &'static str = $field;
            const ALL: &'static [Self] = &[ $( Self::$variant ),+ ];

            fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $wire ),+
                }
            }

            fn matches(&self, raw: &str) -> bool {
                match self {
                    $( Self::$variant => {
                        raw.eq_ignore_ascii_case($wire) $(|| raw.eq_ignore_ascii_case($alias))*
                    } ),+
                }
            }
        }

        impl $name {
            /// Canonical wire spelling.
            #[allow(dead_code)]
            $vis fn as_str(&self) -> &'static str {
                <Self as $crate::choice::Choice>::as_str(self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::choice::Choice::as_str(self))
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::TrackerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $crate::choice::parse_choice(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str($crate::choice::Choice::as_str(self))
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use choice_enum;
