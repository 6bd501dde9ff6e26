//! Tri-state setting type for sparse, inheritable configuration.
//!
//! Every field of a hierarchical policy record is wrapped in a [`Setting<T>`].
//! A setting is either *inherited* (not declared at this level, so the parent's
//! value applies) or carries an explicit value. This keeps "unset" apart from
//! "explicitly false" and "explicitly empty":
//!
//! | Declared as           | Setting                    |
//! |-----------------------|----------------------------|
//! | field absent / `null` | `Setting::Inherit`         |
//! | `protect = false`     | `Setting::Value(false)`    |
//! | `contexts = []`       | `Setting::Value(vec![])`   |
//!
//! # TOML Format
//!
//! Settings serialize transparently as their inner value:
//!
//! ```toml
//! protect = true
//! exclude = ["^release-"]
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[cfg(test)]
#[path = "setting_tests.rs"]
mod tests;

/// A configuration value that is either inherited from the parent level or
/// explicitly declared.
///
/// # Examples
///
/// ```rust
/// use prow_config::Setting;
///
/// let inherited: Setting<bool> = Setting::Inherit;
/// let disabled = Setting::Value(false);
///
/// assert!(inherited.is_inherit());
/// assert_eq!(disabled.value(), Some(&false));
/// assert_ne!(inherited, disabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Setting<T> {
    /// Not declared at this level.
    #[default]
    Inherit,

    /// Explicitly declared at this level.
    Value(T),
}

impl<T> Setting<T> {
    /// Returns `true` when the setting is not declared at this level.
    pub fn is_inherit(&self) -> bool {
        matches!(self, Setting::Inherit)
    }

    /// Returns `true` when the setting carries an explicit value.
    pub fn is_set(&self) -> bool {
        !self.is_inherit()
    }

    /// Returns the explicit value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Setting::Inherit => None,
            Setting::Value(v) => Some(v),
        }
    }

    /// Converts into an `Option`, dropping the wrapper.
    pub fn into_option(self) -> Option<T> {
        match self {
            Setting::Inherit => None,
            Setting::Value(v) => Some(v),
        }
    }

    /// Map the explicit value while keeping inheritance intact.
    pub fn map<U, F>(self, f: F) -> Setting<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Setting::Inherit => Setting::Inherit,
            Setting::Value(v) => Setting::Value(f(v)),
        }
    }
}

impl<T: Clone> Setting<T> {
    /// Returns the explicit value or `default` when inherited.
    pub fn value_or(&self, default: T) -> T {
        self.value().cloned().unwrap_or(default)
    }
}

impl Setting<bool> {
    /// Returns `true` only when the flag is explicitly `true`.
    pub fn is_true(&self) -> bool {
        matches!(self, Setting::Value(true))
    }

    /// Returns `true` only when the flag is explicitly `false`.
    pub fn is_false(&self) -> bool {
        matches!(self, Setting::Value(false))
    }
}

impl<T> From<Option<T>> for Setting<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Setting::Value(v),
            None => Setting::Inherit,
        }
    }
}

impl<T: Serialize> Serialize for Setting<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Setting::Inherit => serializer.serialize_none(),
            Setting::Value(v) => serializer.serialize_some(v),
        }
    }
}

// Absent fields are handled by `#[serde(default)]` on the containing struct;
// an explicit `null` also means "inherit".
impl<'de, T> Deserialize<'de> for Setting<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Setting::from)
    }
}
