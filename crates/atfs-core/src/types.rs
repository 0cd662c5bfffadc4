use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Numeric identity of a user, as assigned by the account database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for UserId {
    fn from(id: u32) -> Self {
        UserId(id)
    }
}

/// A point in time together with the user who caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    /// Milliseconds since the Unix epoch
    pub at_ms: i64,
    pub by: UserId,
}

impl Stamp {
    pub fn now(by: UserId) -> Self {
        Stamp {
            at_ms: now_millis(),
            by,
        }
    }
}

/// Current wall clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_now_is_recent() {
        let before = now_millis();
        let stamp = Stamp::now(UserId(3));
        assert!(stamp.at_ms >= before);
        assert_eq!(stamp.by, UserId(3));
    }

    #[test]
    fn test_user_id_serializes_as_number() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            id: UserId,
        }
        let s = toml::to_string(&Wrapper { id: UserId(42) }).unwrap();
        assert_eq!(s.trim(), "id = 42");
    }
}
