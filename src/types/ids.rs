//! Strongly-typed identifiers.
//!
//! All IDs are validated at construction time and implement common traits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed ID newtype wrapper.
///
/// Generates: struct, `from_string()`, `as_str()`, Display, Serialize, Deserialize.
/// Optionally generates `new()` (UUID v4) and `Default` if `uuid` flag is passed.
macro_rules! define_id {
    ($name:ident, uuid) => {
        define_id!($name);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            /// Literal constructor for tests. Panics on empty input.
            #[cfg(test)]
            pub fn must(s: &str) -> Self {
                match Self::from_string(s.to_string()) {
                    Ok(id) => id,
                    Err(e) => panic!("{}", e),
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(ClientId);
define_id!(SessionId, uuid);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_rejects_empty() {
        assert!(ClientId::from_string(String::new()).is_err());
        assert_eq!(ClientId::from_string("midlet-1".into()).unwrap().as_str(), "midlet-1");
    }

    #[test]
    #[should_panic(expected = "ClientId cannot be empty")]
    fn test_must_rejects_empty() {
        ClientId::must("");
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
