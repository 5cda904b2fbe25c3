//! Macro for defining opaque ID types.

/// Defines a newtype around a string the resource master assigned.
///
/// Offer and agent identifiers are minted by the master and carry no
/// structure we may rely on, so they are kept verbatim. The generated type
/// provides:
/// - `new()` / `as_str()` accessors
/// - `Display`, `From<&str>`, `From<String>`
/// - transparent `Serialize` / `Deserialize`
/// - `Ord`, `Hash`, and other standard traits
///
/// # Example
///
/// ```ignore
/// define_opaque_id!(OfferId);
///
/// let id = OfferId::new("offer-46443-1");
/// assert_eq!(id.as_str(), "offer-46443-1");
/// ```
#[macro_export]
macro_rules! define_opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw master-assigned identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}
