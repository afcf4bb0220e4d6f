use serde::Serialize;

/// Query-string keys that drive pagination, sorting and projection rather than filtering.
pub const RESERVED_KEYS: [&str; 5] = ["page", "limit", "sort", "select", "fields"];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// A query-string value: a single string, or every value of a repeated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    One(String),
    Many(Vec<String>),
}

impl RawValue {
    pub fn first(&self) -> &str {
        match self {
            RawValue::One(v) => v,
            RawValue::Many(vs) => vs.first().map(String::as_str).unwrap_or(""),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            RawValue::One(v) => std::slice::from_ref(v),
            RawValue::Many(vs) => vs,
        };
        slice.iter().map(String::as_str)
    }

    fn push(&mut self, value: String) {
        match self {
            RawValue::One(existing) => {
                let first = std::mem::take(existing);
                *self = RawValue::Many(vec![first, value]);
            }
            RawValue::Many(vs) => vs.push(value),
        }
    }

    pub(crate) fn map_values(&self, f: impl Fn(&str) -> String) -> RawValue {
        match self {
            RawValue::One(v) => RawValue::One(f(v)),
            RawValue::Many(vs) => RawValue::Many(vs.iter().map(|v| f(v)).collect()),
        }
    }
}

/// Decoded query-string parameters in the order they first appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawQuery {
    entries: Vec<(String, RawValue)>,
}

impl RawQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` string, with or without a leading `?`.
    pub fn parse(query_string: &str) -> Self {
        let trimmed = query_string.strip_prefix('?').unwrap_or(query_string);
        Self::from_pairs(url::form_urlencoded::parse(trimmed.as_bytes()).into_owned())
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut query = Self::new();
        for (key, value) in pairs {
            query.append(key, value);
        }
        query
    }

    /// Adds a value, turning the entry into a list when the key repeats.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => existing.push(value),
            None => self.entries.push((key, RawValue::One(value))),
        }
    }

    pub(crate) fn insert_raw(&mut self, key: String, value: RawValue) {
        self.entries.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).map(RawValue::first)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries that are candidates for filtering (everything but the reserved keys).
    pub fn filter_entries(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.iter().filter(|(k, _)| !is_reserved(k))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_brackets_and_plus_signs() {
        let query = RawQuery::parse("?name%5Bcontains%5D=steel+beam&page=2");
        assert_eq!(query.first("name[contains]"), Some("steel beam"));
        assert_eq!(query.first("page"), Some("2"));
    }

    #[test]
    fn repeated_keys_collect_into_a_list() {
        let query = RawQuery::parse("status=open&status=blocked&priority=high");
        assert_eq!(
            query.get("status"),
            Some(&RawValue::Many(vec!["open".into(), "blocked".into()]))
        );
        assert_eq!(query.first("status"), Some("open"));
        assert_eq!(query.len(), 2);
    }

    #[test]
    fn preserves_first_appearance_order() {
        let query = RawQuery::parse("b=1&a=2&b=3");
        let keys: Vec<&str> = query.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn filter_entries_skip_reserved_keys() {
        let query = RawQuery::parse("page=1&limit=5&sort=name&select=name&fields=name&category=steel");
        let keys: Vec<&str> = query.filter_entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["category"]);
    }
}
