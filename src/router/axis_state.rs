//! Per-axis aggregation between flushes.
//!
//! Both variants keep every value and its dirty mark under one mutex, so an
//! update from the reader task and a snapshot-and-clear from a flush task
//! never interleave.
//!
//! | variant      | `update`   | clear keeps value | snapshot              |
//! |--------------|------------|-------------------|-----------------------|
//! | [`AbsState`] | overwrite  | yes               | all non-zero values   |
//! | [`RelState`] | accumulate | no                | non-zero dirty deltas |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::publish::AxisValues;

/// Shared contract of the absolute and relative aggregators.
pub trait AxisState: Send + Sync {
    fn update(&self, code: u16, value: i32);

    fn is_dirty(&self) -> bool;

    /// Clears dirty marks and returns what should be published, or `None`
    /// when nothing needs publishing.
    fn take_dirty(&self) -> Option<AxisValues>;
}

#[derive(Debug, Default)]
struct AbsInner {
    values: BTreeMap<u16, i32>,
    dirty: BTreeSet<u16>,
}

impl AbsInner {
    fn non_zero(&self) -> AxisValues {
        self.values
            .iter()
            .filter(|(_, value)| **value != 0)
            .map(|(code, value)| (*code, *value))
            .collect()
    }
}

/// Absolute axis positions. Values survive a flush.
#[derive(Debug, Default)]
pub struct AbsState {
    inner: Mutex<AbsInner>,
}

impl AbsState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AbsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn value(&self, code: u16) -> Option<i32> {
        self.lock().values.get(&code).copied()
    }

    /// Non-zero positions, dirty or not. Clears the dirty marks.
    pub fn sync(&self) -> AxisValues {
        let mut inner = self.lock();
        inner.dirty.clear();
        inner.non_zero()
    }
}

impl AxisState for AbsState {
    fn update(&self, code: u16, value: i32) {
        let mut inner = self.lock();
        inner.values.insert(code, value);
        inner.dirty.insert(code);
    }

    fn is_dirty(&self) -> bool {
        !self.lock().dirty.is_empty()
    }

    fn take_dirty(&self) -> Option<AxisValues> {
        let mut inner = self.lock();
        if inner.dirty.is_empty() {
            return None;
        }
        inner.dirty.clear();
        // An empty map still tells consumers every axis is back at rest
        Some(inner.non_zero())
    }
}

/// Relative motion accumulated since the last flush.
///
/// A code is dirty exactly when it has an entry; clearing drops the entries.
#[derive(Debug, Default)]
pub struct RelState {
    deltas: Mutex<BTreeMap<u16, i32>>,
}

impl RelState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u16, i32>> {
        self.deltas.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn pending(&self, code: u16) -> Option<i32> {
        self.lock().get(&code).copied()
    }
}

impl AxisState for RelState {
    fn update(&self, code: u16, value: i32) {
        let mut deltas = self.lock();
        let delta = deltas.entry(code).or_insert(0);
        *delta = delta.saturating_add(value);
    }

    fn is_dirty(&self) -> bool {
        !self.lock().is_empty()
    }

    fn take_dirty(&self) -> Option<AxisValues> {
        let taken = std::mem::take(&mut *self.lock());
        let moved: AxisValues = taken.into_iter().filter(|(_, delta)| *delta != 0).collect();
        if moved.is_empty() {
            None
        } else {
            Some(moved)
        }
    }
}
