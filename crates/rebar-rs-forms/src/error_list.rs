//! Error containers.
//!
//! [`ErrorList`] is the default bag of messages for one field or one group.
//! Anything implementing [`ErrorContainer`] can stand in for it where a
//! container type is configurable (form groups take one as a type parameter).
//! [`ErrorDict`] maps field names to their lists.

use std::collections::BTreeMap;
use std::fmt;

/// Key under which form-wide (non-field) errors are stored in an [`ErrorDict`].
pub const NON_FIELD_ERRORS: &str = "__all__";

/// A sequence-like bag of error messages with equality semantics.
pub trait ErrorContainer:
    Default + Clone + fmt::Debug + PartialEq + Send + Sync + From<Vec<String>> + 'static
{
    /// Returns the messages in the order they were raised.
    fn messages(&self) -> &[String];

    /// Returns `true` if the container holds no messages.
    fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }

    /// Returns the number of messages.
    fn len(&self) -> usize {
        self.messages().len()
    }
}

/// The default error container: an ordered list of messages.
///
/// # Examples
///
/// ```
/// use rebar_rs_forms::error_list::{ErrorContainer, ErrorList};
///
/// let errors = ErrorList::from(vec!["Required.".to_string()]);
/// assert_eq!(errors.len(), 1);
/// assert_eq!(errors.as_text(), "* Required.");
/// assert_eq!(errors, vec!["Required."]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList {
    messages: Vec<String>,
}

impl ErrorList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message.
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Appends every message from `messages`.
    pub fn extend<I: IntoIterator<Item = String>>(&mut self, messages: I) {
        self.messages.extend(messages);
    }

    /// Returns `true` if the list holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns an iterator over the messages.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.messages.iter()
    }

    /// Renders the list as an HTML `<ul class="errorlist">`.
    pub fn as_ul(&self) -> String {
        if self.messages.is_empty() {
            return String::new();
        }
        let items: String = self
            .messages
            .iter()
            .map(|m| format!("<li>{m}</li>"))
            .collect();
        format!(r#"<ul class="errorlist">{items}</ul>"#)
    }

    /// Renders the list as plain text, one `* message` per line.
    pub fn as_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("* {m}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ErrorContainer for ErrorList {
    fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl From<Vec<String>> for ErrorList {
    fn from(messages: Vec<String>) -> Self {
        Self { messages }
    }
}

impl FromIterator<String> for ErrorList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl PartialEq<Vec<&str>> for ErrorList {
    fn eq(&self, other: &Vec<&str>) -> bool {
        self.messages.len() == other.len()
            && self.messages.iter().zip(other).all(|(a, b)| a == b)
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ul())
    }
}

/// Field name to error list. Fields without errors are absent.
pub type ErrorDict = BTreeMap<String, ErrorList>;

/// Adds `messages` to `field`'s list in `errors`, creating it if needed.
pub fn add_errors(errors: &mut ErrorDict, field: &str, messages: Vec<String>) {
    if messages.is_empty() {
        return;
    }
    errors
        .entry(field.to_string())
        .or_default()
        .extend(messages);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_renders_nothing() {
        let errors = ErrorList::new();
        assert!(ErrorContainer::is_empty(&errors));
        assert_eq!(errors.as_ul(), "");
        assert_eq!(errors.as_text(), "");
    }

    #[test]
    fn test_as_ul() {
        let errors: ErrorList = vec!["a".to_string(), "b".to_string()].into();
        assert_eq!(
            errors.as_ul(),
            r#"<ul class="errorlist"><li>a</li><li>b</li></ul>"#
        );
    }

    #[test]
    fn test_add_errors_skips_empty() {
        let mut dict = ErrorDict::new();
        add_errors(&mut dict, "name", vec![]);
        assert!(dict.is_empty());
        add_errors(&mut dict, "name", vec!["x".into()]);
        add_errors(&mut dict, "name", vec!["y".into()]);
        assert_eq!(dict["name"], vec!["x", "y"]);
    }
}
