//! Request header map with case-insensitive name lookup.
//!
//! Headers keep insertion order; when a name repeats, lookups see the first
//! occurrence only.

/// A case-insensitive, insertion-ordered HTTP header map.
///
/// # Examples
///
/// ```
/// use rawhttp::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("User-Agent", "curl/8.0");
/// headers.insert("user-agent", "ignored");
///
/// assert_eq!(headers.get("USER-AGENT"), Some("curl/8.0"));
/// assert_eq!(headers.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header entry. Earlier entries with the same name keep precedence.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Parses one raw header line and appends it.
    ///
    /// The line is split once on the first `:`; name and value are trimmed.
    /// Returns `false` (and stores nothing) when the line has no colon.
    pub fn insert_line(&mut self, line: &str) -> bool {
        match line.split_once(':') {
            Some((name, value)) => {
                self.insert(name.trim(), value.trim());
                true
            }
            None => false,
        }
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the `Content-Length` header parsed as a byte count, if present and valid.
    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length")?.parse().ok()
    }

    /// Returns the total number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
