//! Last-known value cache of a master provider.

use crate::accuracy::Accuracy;
use crate::error::{LocationError, LocationResult};
use crate::location::{Address, Position};

/// A value that can be cached and relayed to clients.
pub(crate) trait CachedValue: Clone {
    /// Value equality ignoring the timestamp.
    fn same_value(&self, other: &Self) -> bool;

    fn accuracy(&self) -> Accuracy;
}

impl CachedValue for Position {
    fn same_value(&self, other: &Self) -> bool {
        self.same_fix(other)
    }

    fn accuracy(&self) -> Accuracy {
        self.accuracy
    }
}

impl CachedValue for Address {
    fn same_value(&self, other: &Self) -> bool {
        self.same_details(other)
    }

    fn accuracy(&self) -> Accuracy {
        self.accuracy
    }
}

/// Outcome of storing into a [`ValueCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stored {
    /// Identical to what was cached.
    Unchanged,
    /// A new value replaced the cached one.
    Value,
    /// An error replaced the cached value.
    Error,
}

/// Cached value or the error of the last fetch.
#[derive(Debug, Clone)]
pub(crate) struct ValueCache<T> {
    value: Option<T>,
    last_error: Option<LocationError>,
}

impl<T> Default for ValueCache<T> {
    fn default() -> Self {
        Self {
            value: None,
            last_error: None,
        }
    }
}

impl<T: CachedValue> ValueCache<T> {
    /// Store a fetch or notification result.
    pub fn store(&mut self, result: LocationResult<T>) -> Stored {
        match result {
            Ok(value) => {
                let unchanged = self.last_error.is_none()
                    && self.value.as_ref().is_some_and(|v| v.same_value(&value));
                self.last_error = None;
                self.value = Some(value);
                if unchanged {
                    Stored::Unchanged
                } else {
                    Stored::Value
                }
            }
            Err(err) => {
                let unchanged = self.value.is_none() && self.last_error.as_ref() == Some(&err);
                self.value = None;
                self.last_error = Some(err);
                if unchanged {
                    Stored::Unchanged
                } else {
                    Stored::Error
                }
            }
        }
    }

    /// Cached value, or a copy of the cached error.
    pub fn read(&self) -> LocationResult<T> {
        if let Some(err) = &self.last_error {
            return Err(err.clone());
        }
        self.value
            .clone()
            .ok_or_else(|| LocationError::NotAvailable("No cached value".to_string()))
    }

    /// Returns true if nothing was stored since the last clear.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.last_error.is_none()
    }

    /// Accuracy of the cached state, or `None` if nothing was fetched.
    ///
    /// A cached error has no accuracy.
    pub fn accuracy(&self) -> Option<Accuracy> {
        if self.last_error.is_some() {
            return Some(Accuracy::NONE);
        }
        self.value.as_ref().map(CachedValue::accuracy)
    }

    pub fn clear(&mut self) {
        self.value = None;
        self.last_error = None;
    }
}
