use log::{debug, warn};

use crate::shared::constants::{GLOBAL_QUALITY_KEY, QP2LAMBDA, QSCALE_KEY};

/// Ordered key/value option set handed to the container or codec library.
///
/// Keys the library recognises are removed from the dictionary when it is
/// consumed, so whatever is left afterwards is unknown to the library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionDictionary {
    entries: Vec<(String, String)>,
}

impl OptionDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dictionary from `key=value` entries, warning about each one
    /// that could not be applied.
    pub fn from_entries(entries: &[String], prefix: &str) -> Self {
        let mut dict = Self::new();
        for entry in entries {
            if !dict.apply(None, entry) {
                if prefix.is_empty() {
                    warn!("could not set option {entry}");
                } else {
                    warn!("{prefix}: could not set option {entry}");
                }
            }
        }
        dict
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key`. `None` deletes it. With `append`, the value is
    /// concatenated onto an existing one.
    pub fn set(&mut self, key: &str, value: Option<&str>, append: bool) {
        let Some(value) = value else {
            self.remove(key);
            return;
        };
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) if append => entry.1.push_str(value),
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Applies one user option. With no `key`, `value` must be `key=value`
    /// and is split at the first `=`.
    ///
    /// `qscale` is turned into a `global_quality` expression scaled by
    /// the quantizer-to-lambda factor. A value starting with `+` or `-`
    /// appends to the existing value; an empty value removes the key.
    pub fn apply(&mut self, key: Option<&str>, value: &str) -> bool {
        let (key, value) = match key {
            Some(key) => (key, value),
            None => match value.split_once('=') {
                Some(pair) => pair,
                None => {
                    warn!("option '{value}' does not contain an equals sign");
                    return false;
                }
            },
        };

        let (key, value) = if key == QSCALE_KEY {
            let (sign, magnitude) = split_sign(value);
            (GLOBAL_QUALITY_KEY, format!("{sign}({magnitude})*{QP2LAMBDA}"))
        } else {
            (key, value.to_string())
        };

        debug!("setting value '{value}' for key '{key}'");

        if value.is_empty() {
            self.set(key, None, false);
        } else {
            let append = value.starts_with('+') || value.starts_with('-');
            self.set(key, Some(&value), append);
        }
        true
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
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

    /// True when the `key` entry's flag expression leaves `flag` enabled.
    pub fn has_flag(&self, key: &str, flag: &str) -> bool {
        value_has_flag(self.get(key).unwrap_or(""), flag)
    }
}

fn split_sign(value: &str) -> (&str, &str) {
    if value.starts_with('+') || value.starts_with('-') {
        value.split_at(1)
    } else {
        ("", value)
    }
}

/// Evaluates a flag expression such as `+pass1-qscale`. Tokens are toggled
/// on by `+` and off by `-`; a bare leading token counts as on. The last
/// mention of `flag` wins.
pub fn value_has_flag(value: &str, flag: &str) -> bool {
    let mut state = true;
    let mut result = false;
    let mut rest = value;
    while let Some(first) = rest.chars().next() {
        if first == '+' || first == '-' {
            state = first == '+';
            rest = &rest[1..];
            continue;
        }
        let end = rest.find(['+', '-']).unwrap_or(rest.len());
        if &rest[..end] == flag {
            result = state;
        }
        rest = &rest[end..];
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_apply_splits_at_first_equals() {
        let mut dict = OptionDictionary::new();
        assert!(dict.apply(None, "x264-params=a=1:b=2"));
        assert_eq!(dict.get("x264-params"), Some("a=1:b=2"));
    }

    #[test]
    fn test_apply_rejects_missing_equals() {
        let mut dict = OptionDictionary::new();
        assert!(!dict.apply(None, "novalue"));
        assert!(dict.is_empty());
    }

    #[test]
    fn test_apply_replaces_plain_value() {
        let mut dict = OptionDictionary::new();
        dict.apply(None, "b=1M");
        dict.apply(None, "b=2M");
        assert_eq!(dict.get("b"), Some("2M"));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_apply_appends_signed_value() {
        let mut dict = OptionDictionary::new();
        dict.apply(Some("flags"), "+pass1");
        dict.apply(Some("flags"), "+global_header");
        assert_eq!(dict.get("flags"), Some("+pass1+global_header"));
    }

    #[test]
    fn test_apply_empty_value_removes_key() {
        let mut dict = OptionDictionary::new();
        dict.apply(None, "g=250");
        dict.apply(None, "g=");
        assert!(!dict.contains_key("g"));
    }

    #[rstest]
    #[case::plain("qscale=4", "(4)*QP2LAMBDA")]
    #[case::plus("qscale=+2", "+(2)*QP2LAMBDA")]
    #[case::minus("qscale=-1.5", "-(1.5)*QP2LAMBDA")]
    fn test_qscale_rewrite(#[case] entry: &str, #[case] expected: &str) {
        let mut dict = OptionDictionary::new();
        dict.apply(None, entry);
        assert_eq!(dict.get("qscale"), None);
        assert_eq!(dict.get("global_quality"), Some(expected));
    }

    #[test]
    fn test_from_entries_skips_malformed() {
        let dict = OptionDictionary::from_entries(
            &["b=1M".to_string(), "broken".to_string(), "g=12".to_string()],
            "vo-lavc",
        );
        let keys: Vec<_> = dict.keys().collect();
        assert_eq!(keys, vec!["b", "g"]);
    }

    #[test]
    fn test_remove_returns_value() {
        let mut dict = OptionDictionary::new();
        dict.set("preset", Some("fast"), false);
        assert_eq!(dict.remove("preset"), Some("fast".to_string()));
        assert_eq!(dict.remove("preset"), None);
    }

    #[rstest]
    #[case::bare("pass1", "pass1", true)]
    #[case::plus("+pass1", "pass1", true)]
    #[case::minus("-pass1", "pass1", false)]
    #[case::toggled_off("+pass1-pass1", "pass1", false)]
    #[case::toggled_on("-pass2+pass2", "pass2", true)]
    #[case::other_flag("+qscale+pass2", "pass1", false)]
    #[case::prefix_only("+pass12", "pass1", false)]
    #[case::empty("", "pass1", false)]
    fn test_value_has_flag(#[case] value: &str, #[case] flag: &str, #[case] expected: bool) {
        assert_eq!(value_has_flag(value, flag), expected);
    }

    #[test]
    fn test_has_flag_reads_entry() {
        let mut dict = OptionDictionary::new();
        dict.apply(Some("flags"), "+pass2");
        assert!(dict.has_flag("flags", "pass2"));
        assert!(!dict.has_flag("flags", "pass1"));
        assert!(!dict.has_flag("missing", "pass2"));
    }
}
