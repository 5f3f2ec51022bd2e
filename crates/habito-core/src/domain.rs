use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Subscription tier. Determines how many habits a user may track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Vip,
}

impl Plan {
    /// Maximum number of habits for this tier.
    pub fn habit_limit(self) -> usize {
        match self {
            Plan::Free => 3,
            Plan::Pro => 15,
            Plan::Vip => 999,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Vip => "vip",
        }
    }
}

/// A tracked activity with a daily completion flag.
///
/// Names keep their original casing; uniqueness within a user's habit set is
/// case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub name: String,
    #[serde(default)]
    pub completed_today: bool,
}

impl Habit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            completed_today: false,
        }
    }
}

/// Per-user aggregate: plan plus habits in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub plan: Plan,
    #[serde(default)]
    pub habits: Vec<Habit>,
}
