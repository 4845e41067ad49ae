//! Structural query keys.
//!
//! A [`QueryKey`] is an ordered list of primitive segments such as
//! `["appointments", 2024, 5]`. Two keys are equal when their segments are
//! equal, regardless of where they were built, and a key can act as a prefix
//! filter for every key that starts with the same segments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single primitive component of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeySegment {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<bool> for KeySegment {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! impl_int_segment {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KeySegment {
                fn from(value: $ty) -> Self {
                    Self::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_int_segment!(i8, i16, i32, i64, u8, u16, u32);

impl<T> From<Option<T>> for KeySegment
where
    T: Into<KeySegment>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Identifier of a cached query.
///
/// # Example
///
/// ```
/// use querent::query_key;
///
/// let month = query_key!["appointments", 2024, 5];
/// let all = query_key!["appointments"];
///
/// assert!(month.starts_with(&all));
/// assert_eq!(month.to_string(), r#"["appointments", 2024, 5]"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    /// Creates an empty key, which as a prefix matches every key.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn from_segments(segments: Vec<KeySegment>) -> Self {
        Self(segments)
    }

    /// Returns a copy of this key with one more trailing segment.
    #[must_use]
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if every segment of `prefix` equals the corresponding
    /// leading segment of this key.
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{segment}")?;
        }
        f.write_str("]")
    }
}

impl From<&str> for QueryKey {
    fn from(value: &str) -> Self {
        Self(vec![value.into()])
    }
}

impl From<String> for QueryKey {
    fn from(value: String) -> Self {
        Self(vec![value.into()])
    }
}

impl From<Vec<KeySegment>> for QueryKey {
    fn from(segments: Vec<KeySegment>) -> Self {
        Self(segments)
    }
}

impl FromIterator<KeySegment> for QueryKey {
    fn from_iter<I: IntoIterator<Item = KeySegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Root segment of every user-scoped key.
pub const USER: &str = "user";

/// Key of a user record cached by id only.
///
/// A token refresh keeps the same entry, so `set_query_data` after a
/// profile update overwrites the record the views already observe.
pub fn user_key(id: Option<i64>) -> QueryKey {
    QueryKey::from(USER).with(id)
}

/// Key of a user record cached by id and access token.
///
/// Every new token creates a separate entry. Invalidate or remove by
/// [`user_key`]'s prefix `["user"]` to reach all of them.
pub fn user_key_with_token(id: Option<i64>, token: &str) -> QueryKey {
    user_key(id).with(token)
}

/// Builds a [`QueryKey`] from a list of segment values.
///
/// ```
/// use querent::query_key;
///
/// let key = query_key!["posts", 3];
/// assert_eq!(key.len(), 2);
/// ```
#[macro_export]
macro_rules! query_key {
    () => {
        $crate::query::QueryKey::new()
    };
    ($($segment:expr),+ $(,)?) => {
        $crate::query::QueryKey::from_segments(vec![
            $($crate::query::KeySegment::from($segment)),+
        ])
    };
}
