/// Ordered tag map with case-insensitive keys, as container metadata is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    entries: Vec<(String, String)>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces an existing value in place, or appends a new entry.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies `set` then `remove` edits on top of `self`.
    pub fn apply_edits(&mut self, set: &[(String, String)], remove: &[String]) {
        for (key, value) in set {
            self.set(key, value);
        }
        for key in remove {
            self.remove(key);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Tags::new();
        for (k, v) in iter {
            let (k, v) = (k.into(), v.into());
            tags.set(&k, &v);
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_case_insensitive_and_keeps_order() {
        let mut tags = Tags::new();
        tags.set("title", "a");
        tags.set("artist", "b");
        tags.set("TITLE", "c");
        let collected: Vec<_> = tags.iter().collect();
        assert_eq!(collected, vec![("title", "c"), ("artist", "b")]);
    }

    #[test]
    fn test_remove() {
        let mut tags: Tags = [("Title", "x"), ("comment", "y")].into_iter().collect();
        tags.remove("title");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.get("title"), None);
        assert_eq!(tags.get("COMMENT"), Some("y"));
    }

    #[test]
    fn test_apply_edits_removes_after_setting() {
        let mut tags: Tags = [("encoder", "old")].into_iter().collect();
        tags.apply_edits(
            &[("title".into(), "t".into()), ("encoder".into(), "new".into())],
            &["title".into()],
        );
        assert_eq!(tags.get("encoder"), Some("new"));
        assert_eq!(tags.get("title"), None);
    }

    #[test]
    fn test_empty() {
        assert!(Tags::new().is_empty());
    }
}
