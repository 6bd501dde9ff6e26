//! Policy merge algebra.
//!
//! Hierarchical policies are combined one level at a time with
//! [`Merge::merge`], the parent on the left and the child on the right.
//! Merging is applied independently to every field:
//!
//! - **Scalars and flags**: the child's value wins when declared, otherwise the
//!   parent's value is kept.
//! - **Lists** (contexts, users, teams, exclusions): union of parent and
//!   child, parent entries first, then the child's new entries, without
//!   duplicates. When either side is inherited the other side passes through
//!   deduplicated, so an absent child list never reorders the parent's list.
//! - **Nested records**: merged recursively with the same rules.
//!
//! An explicitly empty child list merged onto a declared parent list yields the
//! parent's entries: a union with nothing does not clear anything.
//!
//! Merging a record with itself yields the record unchanged, as long as its
//! lists hold no duplicates.

use crate::setting::Setting;
use std::collections::HashSet;
use std::hash::Hash;

#[cfg(test)]
#[path = "merger_tests.rs"]
mod tests;

/// A sparse record that can be layered on top of a parent record.
pub trait Merge {
    /// Produces the record obtained by applying `child` on top of `self`.
    ///
    /// Neither input is modified.
    fn merge(&self, child: &Self) -> Self;
}

/// How two explicitly declared values of the same field combine.
pub trait MergeValue: Clone {
    /// Combines a declared parent value with a declared child value.
    fn merge_value(&self, child: &Self) -> Self;

    /// A declared value passed through without a counterpart on the other
    /// level.
    fn normalized(&self) -> Self {
        self.clone()
    }
}

macro_rules! last_write_wins {
    ($($ty:ty),* $(,)?) => {
        $(
            impl MergeValue for $ty {
                fn merge_value(&self, child: &Self) -> Self {
                    child.clone()
                }
            }
        )*
    };
}

last_write_wins!(bool, u32, String);

impl<T: Clone + Eq + Hash> MergeValue for Vec<T> {
    fn merge_value(&self, child: &Self) -> Self {
        union(self, child)
    }

    fn normalized(&self) -> Self {
        union(self, &[])
    }
}

impl<T: MergeValue> Merge for Setting<T> {
    fn merge(&self, child: &Self) -> Self {
        match (self, child) {
            (Setting::Inherit, Setting::Inherit) => Setting::Inherit,
            (Setting::Value(parent), Setting::Inherit) => Setting::Value(parent.normalized()),
            (Setting::Inherit, Setting::Value(child)) => Setting::Value(child.normalized()),
            (Setting::Value(parent), Setting::Value(child)) => {
                Setting::Value(parent.merge_value(child))
            }
        }
    }
}

/// Folds a sequence of layers, lowest precedence first, into a single record.
///
/// # Examples
///
/// ```rust
/// use prow_config::{merger::merge_all, Setting};
///
/// let layers = [Setting::Value(true), Setting::Inherit, Setting::Value(false)];
/// assert_eq!(merge_all(layers.iter()), Setting::Value(false));
/// ```
pub fn merge_all<'a, P, I>(layers: I) -> P
where
    P: Merge + Default + 'a,
    I: IntoIterator<Item = &'a P>,
{
    layers
        .into_iter()
        .fold(P::default(), |merged, layer| merged.merge(layer))
}

/// Order-preserving, deduplicated union of two lists.
///
/// Keeps the first occurrence of every entry, parent entries first.
pub fn union<T: Clone + Eq + Hash>(parent: &[T], child: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    parent
        .iter()
        .chain(child.iter())
        .filter(|entry| seen.insert(*entry))
        .cloned()
        .collect()
}
