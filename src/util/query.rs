use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

/// Query string parameters with lenient key matching: `excludeSeed` also
/// matches `ExcludeSeed`.
#[derive(Debug, Default)]
pub struct QueryParams {
    map: HashMap<String, String>,
}

impl<'de> Deserialize<'de> for QueryParams {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = HashMap::<String, String>::deserialize(deserializer)?;
        Ok(QueryParams { map })
    }
}

impl QueryParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some(val) = self.map.get(key) {
            return Some(val);
        }

        // Retry with the first letter uppercased.
        let mut chars = key.chars();
        let first = chars.next()?;
        if !first.is_ascii_lowercase() {
            return None;
        }
        let key2: String = first.to_ascii_uppercase().to_string() + chars.as_str();
        self.map.get(&key2).map(|x| x.as_str())
    }

    /// Parse a parameter, returning `Ok(None)` when it is absent and the raw
    /// value as the error when it does not parse.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, String> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| raw.to_string()),
        }
    }

    /// Boolean flags accept `true`/`false`/`1`/`0`, case-insensitively.
    pub fn flag(&self, key: &str) -> Result<Option<bool>, String> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                _ => Err(raw.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        QueryParams {
            map: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_capitalized_key() {
        let q = params(&[("ExcludeSeed", "true"), ("k", "5")]);
        assert_eq!(q.flag("excludeSeed"), Ok(Some(true)));
        assert_eq!(q.parse::<usize>("k"), Ok(Some(5)));
        assert_eq!(q.parse::<usize>("missing"), Ok(None));
    }

    #[test]
    fn test_bad_values() {
        let q = params(&[("k", "ten"), ("excludeSeed", "maybe")]);
        assert_eq!(q.parse::<usize>("k"), Err("ten".to_string()));
        assert_eq!(q.flag("excludeSeed"), Err("maybe".to_string()));
    }
}
