//! Label matchers used by the routing tree.

use std::{fmt, str::FromStr};

use regex::Regex;
use serde::{Deserialize, Deserializer, de};
use thiserror::Error;

use super::labels::LabelSet;

/// Errors that can occur while parsing a matcher expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatcherError {
    /// The expression has no recognised operator.
    #[error("Matcher '{0}' has no operator, expected one of '=', '!=', '=~', '!~'")]
    MissingOperator(String),

    /// The label name is empty.
    #[error("Matcher '{0}' has an empty label name")]
    EmptyName(String),

    /// The regular expression failed to compile.
    #[error("Matcher '{expression}' has an invalid regex: {reason}")]
    InvalidRegex {
        /// The offending matcher expression.
        expression: String,
        /// Why the regex was rejected.
        reason: String,
    },
}

/// The comparison a matcher performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// `name="value"`
    Equal,
    /// `name!="value"`
    NotEqual,
    /// `name=~"regex"`
    Regex,
    /// `name!~"regex"`
    NotRegex,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchType::Equal => "=",
            MatchType::NotEqual => "!=",
            MatchType::Regex => "=~",
            MatchType::NotRegex => "!~",
        })
    }
}

/// A single condition on one label. A missing label matches as the empty
/// string.
#[derive(Debug, Clone)]
pub struct Matcher {
    name: String,
    value: String,
    match_type: MatchType,
    regex: Option<Regex>,
}

impl Matcher {
    /// Creates a matcher, compiling the regex for regex match types.
    pub fn new(
        name: impl Into<String>,
        match_type: MatchType,
        value: impl Into<String>,
    ) -> Result<Self, MatcherError> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() {
            return Err(MatcherError::EmptyName(format!("{}{}{:?}", name, match_type, value)));
        }
        let regex = match match_type {
            MatchType::Regex | MatchType::NotRegex => {
                // Regexes are fully anchored.
                let anchored = format!("^(?:{})$", value);
                Some(Regex::new(&anchored).map_err(|e| MatcherError::InvalidRegex {
                    expression: format!("{}{}{:?}", name, match_type, value),
                    reason: e.to_string(),
                })?)
            }
            MatchType::Equal | MatchType::NotEqual => None,
        };
        Ok(Self { name, value, match_type, regex })
    }

    /// The label name this matcher inspects.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if `labels` satisfy this matcher.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        let value = labels.get(&self.name).unwrap_or_default();
        match (self.match_type, &self.regex) {
            (MatchType::Equal, _) => value == self.value,
            (MatchType::NotEqual, _) => value != self.value,
            (MatchType::Regex, Some(re)) => re.is_match(value),
            (MatchType::NotRegex, Some(re)) => !re.is_match(value),
            (MatchType::Regex | MatchType::NotRegex, None) => false,
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value && self.match_type == other.match_type
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.match_type, self.value)
    }
}

impl FromStr for Matcher {
    type Err = MatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pos =
            s.find(['=', '!']).ok_or_else(|| MatcherError::MissingOperator(s.to_string()))?;
        let (name, rest) = s.split_at(pos);

        let (match_type, value) = if let Some(v) = rest.strip_prefix("=~") {
            (MatchType::Regex, v)
        } else if let Some(v) = rest.strip_prefix("!~") {
            (MatchType::NotRegex, v)
        } else if let Some(v) = rest.strip_prefix("!=") {
            (MatchType::NotEqual, v)
        } else if let Some(v) = rest.strip_prefix('=') {
            (MatchType::Equal, v)
        } else {
            return Err(MatcherError::MissingOperator(s.to_string()));
        };

        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);

        Matcher::new(name.trim(), match_type, value)
    }
}

impl<'de> Deserialize<'de> for Matcher {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Formats a list of matchers as `{a="b", c=~"d"}`.
pub fn format_matchers(matchers: &[Matcher]) -> String {
    let inner: Vec<String> = matchers.iter().map(ToString::to_string).collect();
    format!("{{{}}}", inner.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_operators() {
        let eq: Matcher = "severity=critical".parse().unwrap();
        assert_eq!(eq.match_type, MatchType::Equal);
        assert_eq!(eq.value, "critical");

        let ne: Matcher = "severity != \"info\"".parse().unwrap();
        assert_eq!(ne.match_type, MatchType::NotEqual);
        assert_eq!(ne.name(), "severity");
        assert_eq!(ne.value, "info");

        let re: Matcher = "service=~api|web".parse().unwrap();
        assert_eq!(re.match_type, MatchType::Regex);

        let nre: Matcher = "env!~dev.*".parse().unwrap();
        assert_eq!(nre.match_type, MatchType::NotRegex);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "severity".parse::<Matcher>().unwrap_err(),
            MatcherError::MissingOperator("severity".to_string())
        );
        assert!(matches!("=foo".parse::<Matcher>(), Err(MatcherError::EmptyName(_))));
        assert!(matches!("a=~(".parse::<Matcher>(), Err(MatcherError::InvalidRegex { .. })));
    }

    #[test]
    fn test_regex_is_anchored() {
        let m: Matcher = "service=~api".parse().unwrap();
        assert!(m.matches(&LabelSet::from([("service", "api")])));
        assert!(!m.matches(&LabelSet::from([("service", "api-gateway")])));
    }

    #[test]
    fn test_missing_label_matches_empty_string() {
        let labels = LabelSet::from([("alertname", "Foo")]);
        assert!("team=".parse::<Matcher>().unwrap().matches(&labels));
        assert!("team!=ops".parse::<Matcher>().unwrap().matches(&labels));
        assert!(!"team=ops".parse::<Matcher>().unwrap().matches(&labels));
    }

    #[test]
    fn test_format_matchers() {
        let matchers: Vec<Matcher> =
            vec!["a=b".parse().unwrap(), "c=~d|e".parse().unwrap()];
        assert_eq!(format_matchers(&matchers), r#"{a="b", c=~"d|e"}"#);
        assert_eq!(format_matchers(&[]), "{}");
    }
}
