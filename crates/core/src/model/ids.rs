use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator reserved by the local cache key layout.
pub const KEY_SEPARATOR: char = ':';

/// Error type for parsing an identifier from a string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdError {
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    #[error("{kind} cannot contain ':' or whitespace: {raw:?}")]
    InvalidCharacter { kind: &'static str, raw: String },
}

fn validate(kind: &'static str, raw: &str) -> Result<String, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty { kind });
    }
    if trimmed
        .chars()
        .any(|c| c == KEY_SEPARATOR || c.is_whitespace())
    {
        return Err(IdError::InvalidCharacter {
            kind,
            raw: raw.to_owned(),
        });
    }
    Ok(trimmed.to_owned())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validates and wraps the raw identifier.
            ///
            /// # Errors
            ///
            /// Returns `IdError` if the value is blank or contains a reserved character.
            pub fn new(raw: impl AsRef<str>) -> Result<Self, IdError> {
                validate(stringify!($name), raw.as_ref()).map(Self)
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Stable slug identifying a curriculum, e.g. `html-fundamentals`.
    CourseId
);
string_id!(
    /// Identifier of a curriculum item, unique within its course.
    ///
    /// Completion records key on this value alone, so it must survive reordering.
    ItemId
);
string_id!(
    /// Identifier of a module within a course.
    ModuleId
);
string_id!(
    /// Identifier of a signed-in learner.
    UserId
);

// ─── Tests ─────────────────────────────────────────────────────────────────────
