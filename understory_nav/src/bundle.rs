// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The key/value state bag used for arguments and saved state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use understory_view::HierarchyState;

use crate::error::NavError;

/// A single value stored in a [`Bundle`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BundleValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of strings.
    StringList(Vec<String>),
    /// Nested bag.
    Bundle(Bundle),
    /// Ordered list of nested bags.
    BundleList(Vec<Bundle>),
    /// Sparse array of view states keyed by element id.
    Sparse(HierarchyState),
    /// Sparse array of strings keyed by request code.
    StringSparse(BTreeMap<i32, String>),
    /// Arbitrary JSON.
    Json(serde_json::Value),
}

/// An ordered, serialisable key/value bag.
///
/// Bags nest, round-trip through bytes with [`Bundle::to_bytes`] / [`Bundle::from_bytes`],
/// and readers treat a missing key (or a key of another type) as absent.
///
/// ```
/// use understory_nav::Bundle;
///
/// let mut args = Bundle::new();
/// args.put_string("title", "Inbox");
/// args.put_int("unread", 3);
///
/// let bytes = args.to_bytes().unwrap();
/// let back = Bundle::from_bytes(&bytes).unwrap();
/// assert_eq!(back.get_string("title"), Some("Inbox"));
/// assert_eq!(back.get_int("unread"), Some(3));
/// assert_eq!(back.get_bool("missing"), None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bundle {
    entries: BTreeMap<String, BundleValue>,
}

macro_rules! accessors {
    ($put:ident, $get:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("Store a `", stringify!($ty), "` under `key`.")]
        pub fn $put(&mut self, key: impl Into<String>, value: $ty) -> &mut Self {
            self.put(key, BundleValue::$variant(value))
        }

        #[doc = concat!("Read a `", stringify!($ty), "` stored under `key`.")]
        pub fn $get(&self, key: &str) -> Option<$ty> {
            match self.entries.get(key) {
                Some(BundleValue::$variant(v)) => Some(*v),
                _ => None,
            }
        }
    };
}

impl Bundle {
    /// An empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value under `key`, replacing any previous value.
    pub fn put(&mut self, key: impl Into<String>, value: BundleValue) -> &mut Self {
        self.entries.insert(key.into(), value);
        self
    }

    /// Raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&BundleValue> {
        self.entries.get(key)
    }

    accessors!(put_bool, get_bool, Bool, bool);
    accessors!(put_int, get_int, Int, i64);
    accessors!(put_float, get_float, Float, f64);

    /// Store a string under `key`.
    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.put(key, BundleValue::String(value.into()))
    }

    /// Read a string stored under `key`.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(BundleValue::String(v)) => Some(v),
            _ => None,
        }
    }

    /// Store a list of strings under `key`.
    pub fn put_string_list(&mut self, key: impl Into<String>, value: Vec<String>) -> &mut Self {
        self.put(key, BundleValue::StringList(value))
    }

    /// Read a list of strings stored under `key`.
    pub fn get_string_list(&self, key: &str) -> Option<&[String]> {
        match self.entries.get(key) {
            Some(BundleValue::StringList(v)) => Some(v),
            _ => None,
        }
    }

    /// Store a nested bag under `key`.
    pub fn put_bundle(&mut self, key: impl Into<String>, value: Self) -> &mut Self {
        self.put(key, BundleValue::Bundle(value))
    }

    /// Read a nested bag stored under `key`.
    pub fn get_bundle(&self, key: &str) -> Option<&Self> {
        match self.entries.get(key) {
            Some(BundleValue::Bundle(v)) => Some(v),
            _ => None,
        }
    }

    /// Store a list of nested bags under `key`.
    pub fn put_bundle_list(&mut self, key: impl Into<String>, value: Vec<Self>) -> &mut Self {
        self.put(key, BundleValue::BundleList(value))
    }

    /// Read a list of nested bags stored under `key`.
    pub fn get_bundle_list(&self, key: &str) -> Option<&[Self]> {
        match self.entries.get(key) {
            Some(BundleValue::BundleList(v)) => Some(v),
            _ => None,
        }
    }

    /// Store a sparse array of view states under `key`.
    pub fn put_sparse(&mut self, key: impl Into<String>, value: HierarchyState) -> &mut Self {
        self.put(key, BundleValue::Sparse(value))
    }

    /// Read a sparse array of view states stored under `key`.
    pub fn get_sparse(&self, key: &str) -> Option<&HierarchyState> {
        match self.entries.get(key) {
            Some(BundleValue::Sparse(v)) => Some(v),
            _ => None,
        }
    }

    /// Store a sparse array of strings under `key`.
    pub fn put_string_sparse(
        &mut self,
        key: impl Into<String>,
        value: BTreeMap<i32, String>,
    ) -> &mut Self {
        self.put(key, BundleValue::StringSparse(value))
    }

    /// Read a sparse array of strings stored under `key`.
    pub fn get_string_sparse(&self, key: &str) -> Option<&BTreeMap<i32, String>> {
        match self.entries.get(key) {
            Some(BundleValue::StringSparse(v)) => Some(v),
            _ => None,
        }
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove and return the value under `key`.
    pub fn remove(&mut self, key: &str) -> Option<BundleValue> {
        self.entries.remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Encode the bag into a byte stream.
    pub fn to_bytes(&self) -> Result<Vec<u8>, NavError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a bag previously produced by [`Bundle::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NavError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
