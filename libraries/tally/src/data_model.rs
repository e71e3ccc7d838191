use std::fmt;

use crate::SyncError;

/// Ids of the counters every user starts with.
pub const DEFAULT_COUNTER_IDS: [&str; 4] = ["1", "2", "3", "4"];

fn validate(kind: &'static str, raw: &str) -> Result<(), SyncError> {
    if raw.trim().is_empty() {
        return Err(SyncError::InvalidIdentity(format!("{kind} is empty")));
    }
    // ids become path segments in the remote store
    if raw.contains('/') {
        return Err(SyncError::InvalidIdentity(format!(
            "{kind} `{raw}` contains '/'"
        )));
    }
    Ok(())
}

/// Stable id of a counter. Assigned once and never reused after deletion.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CounterId(String);

impl CounterId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, SyncError> {
        let raw = raw.into();
        validate("counter id", &raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CounterId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for CounterId {
    type Error = SyncError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CounterId> for String {
    fn from(id: CounterId) -> Self {
        id.0
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The key the remote store partitions a user's documents under.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, SyncError> {
        let raw = raw.into();
        validate("user id", &raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Counter {
    pub id: CounterId,
    pub value: i64,
}

impl Counter {
    pub fn new(id: CounterId, value: i64) -> Self {
        Self { id, value }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    #[default]
    SignedOut,
    SignedIn(UserId),
}

impl Session {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Session::SignedOut => None,
            Session::SignedIn(user_id) => Some(user_id),
        }
    }
}

/// The canonical starting set: ids "1" through "4", all zero.
pub fn default_counters() -> Vec<Counter> {
    DEFAULT_COUNTER_IDS
        .iter()
        .map(|id| Counter::new(CounterId(id.to_string()), 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_ids() {
        assert!(CounterId::parse("").is_err());
        assert!(CounterId::parse("   ").is_err());
        assert!(CounterId::parse("a/b").is_err());
        assert!(UserId::parse("").is_err());
        assert_eq!(CounterId::parse("7").unwrap().as_str(), "7");
    }

    #[test]
    fn invalid_ids_fail_to_deserialize() {
        let err = serde_json::from_str::<Counter>(r#"{"id":"","value":3}"#);
        assert!(err.is_err());

        let counter: Counter = serde_json::from_str(r#"{"id":"x","value":-2}"#).unwrap();
        assert_eq!(counter.value, -2);
    }

    #[test]
    fn defaults_are_four_zeroes() {
        let defaults = default_counters();
        let ids: Vec<_> = defaults.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3", "4"]);
        assert!(defaults.iter().all(|c| c.value == 0));
    }
}
