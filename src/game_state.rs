use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};

/// Lifecycle phase of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Waiting,
    InProgress,
    Finished,
    Draw,
    Abandoned,
}

impl MatchStatus {
    /// `Waiting` and `InProgress` count toward a player's single active session.
    pub fn is_active(self) -> bool {
        matches!(self, MatchStatus::Waiting | MatchStatus::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Only a decided game can be rematched or have its rematch flags read.
    pub fn is_completed(self) -> bool {
        matches!(self, MatchStatus::Finished | MatchStatus::Draw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Waiting => "WAITING",
            MatchStatus::InProgress => "IN_PROGRESS",
            MatchStatus::Finished => "FINISHED",
            MatchStatus::Draw => "DRAW",
            MatchStatus::Abandoned => "ABANDONED",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(MatchStatus::Waiting),
            "IN_PROGRESS" => Ok(MatchStatus::InProgress),
            "FINISHED" => Ok(MatchStatus::Finished),
            "DRAW" => Ok(MatchStatus::Draw),
            "ABANDONED" => Ok(MatchStatus::Abandoned),
            other => Err(format!("unknown match status {:?}", other)),
        }
    }
}
