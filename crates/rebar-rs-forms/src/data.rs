//! Submitted form data and uploaded files.
//!
//! [`FormData`] is the multi-valued mapping forms bind to (the equivalent of a
//! POST body). [`FileData`] maps field names to [`UploadedFile`]s. Both are
//! ordered by key so iteration and flattening are deterministic.

use std::collections::btree_map;
use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left unescaped by [`FormData::urlencode`].
const FORM_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A dictionary of submitted form values, possibly several per key.
///
/// [`get`](FormData::get) returns the **last** value for a key while
/// [`get_list`](FormData::get_list) returns all of them.
///
/// # Examples
///
/// ```
/// use rebar_rs_forms::data::FormData;
///
/// let data = FormData::parse("tag=a&tag=b&group-name-first_name=Jo%20Ann");
/// assert_eq!(data.get("tag"), Some("b"));
/// assert_eq!(data.get_list("tag"), Some(&["a".to_string(), "b".to_string()][..]));
/// assert_eq!(data.get("group-name-first_name"), Some("Jo Ann"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    inner: BTreeMap<String, Vec<String>>,
}

impl FormData {
    /// Creates an empty `FormData`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` body.
    pub fn parse(encoded: &str) -> Self {
        let mut data = Self::new();
        for pair in encoded.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .find('=')
                .map_or((pair, ""), |eq_pos| (&pair[..eq_pos], &pair[eq_pos + 1..]));
            data.append(form_decode(key), form_decode(value));
        }
        data
    }

    /// Builds a `FormData` from key/value pairs, appending repeated keys.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut data = Self::new();
        for (k, v) in pairs {
            data.append(k, v);
        }
        data
    }

    /// Returns the last value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .get(key)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    /// Returns every value for `key`.
    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        self.inner.get(key).map(Vec::as_slice)
    }

    /// Replaces all values for `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), vec![value.into()]);
    }

    /// Appends `value` to the values for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    /// Removes `key`, returning its values.
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.inner.remove(key)
    }

    /// Merges every key of `other` into `self`, replacing existing keys.
    pub fn extend(&mut self, other: Self) {
        self.inner.extend(other.inner);
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    /// Returns `(key, values)` pairs in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.inner.iter()
    }

    /// Encodes the data as an `application/x-www-form-urlencoded` string.
    pub fn urlencode(&self) -> String {
        let mut parts = Vec::new();
        for (key, values) in &self.inner {
            for value in values {
                parts.push(format!(
                    "{}={}",
                    utf8_percent_encode(key, FORM_ENCODE_SET),
                    utf8_percent_encode(value, FORM_ENCODE_SET)
                ));
            }
        }
        parts.join("&")
    }
}

impl<'a> IntoIterator for &'a FormData {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

fn form_decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// A file submitted with a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// The original filename as provided by the client.
    pub name: String,
    /// The MIME content type of the file.
    pub content_type: String,
    /// The size of the file content in bytes.
    pub size: usize,
}

impl UploadedFile {
    /// Creates an `UploadedFile` description.
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size,
        }
    }
}

/// Uploaded files keyed by prefixed field name.
pub type FileData = BTreeMap<String, UploadedFile>;
