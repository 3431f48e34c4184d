//! Agent-check response tokens.
//!
//! # Grammar
//! ```text
//! response := "noop" | weight | status | weight "," status
//! weight   := 0..=100 "%"
//! status   := up | down | maint | drain | ready | fail | stopped
//! ```
//!
//! # Design Decisions
//! - Tokens are parsed once at configuration load, never per probe
//! - Rendering always produces a single line without the trailing newline
//! - A bare integer is accepted as a weight (`1` means `1%`)

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a configured response token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("empty response token")]
    Empty,

    #[error("weight {0} is out of range 0..=100")]
    WeightOutOfRange(i64),

    #[error("unknown response keyword '{0}'")]
    UnknownKeyword(String),

    #[error("response '{0}' has more than one weight")]
    DuplicateWeight(String),

    #[error("response '{0}' has more than one status")]
    DuplicateStatus(String),

    #[error("'noop' cannot be combined with other tokens in '{0}'")]
    NoopCombined(String),
}

/// Backend state keywords understood by the balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Up,
    Down,
    Maint,
    Drain,
    Ready,
    Fail,
    Stopped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Down => "down",
            Status::Maint => "maint",
            Status::Drain => "drain",
            Status::Ready => "ready",
            Status::Fail => "fail",
            Status::Stopped => "stopped",
        }
    }
}

impl FromStr for Status {
    type Err = ResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Status::Up),
            "down" => Ok(Status::Down),
            "maint" => Ok(Status::Maint),
            "drain" => Ok(Status::Drain),
            "ready" => Ok(Status::Ready),
            "fail" => Ok(Status::Fail),
            "stopped" => Ok(Status::Stopped),
            _ => Err(ResponseError::UnknownKeyword(s.to_string())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traffic weight as a percentage, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Weight(u8);

impl Weight {
    pub fn new(pct: i64) -> Result<Self, ResponseError> {
        if (0..=100).contains(&pct) {
            Ok(Self(pct as u8))
        } else {
            Err(ResponseError::WeightOutOfRange(pct))
        }
    }

    pub fn percent(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// One agent-check answer.
///
/// `Noop` asks the balancer to keep whatever state it currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AgentResponse {
    #[default]
    Noop,
    Weight(Weight),
    Status(Status),
    Combined(Weight, Status),
}

impl AgentResponse {
    pub fn is_noop(&self) -> bool {
        matches!(self, AgentResponse::Noop)
    }

    pub fn weight(&self) -> Option<Weight> {
        match self {
            AgentResponse::Weight(w) | AgentResponse::Combined(w, _) => Some(*w),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<Status> {
        match self {
            AgentResponse::Status(s) | AgentResponse::Combined(_, s) => Some(*s),
            _ => None,
        }
    }

    fn from_parts(weight: Option<Weight>, status: Option<Status>) -> Self {
        match (weight, status) {
            (None, None) => AgentResponse::Noop,
            (Some(w), None) => AgentResponse::Weight(w),
            (None, Some(s)) => AgentResponse::Status(s),
            (Some(w), Some(s)) => AgentResponse::Combined(w, s),
        }
    }

    /// Overlay `later` on top of `self`.
    ///
    /// Components present in `later` replace those in `self`; `Noop` is the
    /// identity on both sides.
    pub fn merge(self, later: AgentResponse) -> AgentResponse {
        Self::from_parts(
            later.weight().or(self.weight()),
            later.status().or(self.status()),
        )
    }

    /// Parse a response given as a TOML value: integers are weights,
    /// strings go through the token grammar.
    pub fn from_toml(value: &toml::Value) -> Result<Self, ResponseError> {
        match value {
            toml::Value::Integer(pct) => Ok(AgentResponse::Weight(Weight::new(*pct)?)),
            toml::Value::String(s) => s.parse(),
            other => Err(ResponseError::UnknownKeyword(other.to_string())),
        }
    }
}

impl FromStr for AgentResponse {
    type Err = ResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ResponseError::Empty);
        }

        let mut weight = None;
        let mut status = None;
        let mut noop = false;

        for part in trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
        {
            if part.eq_ignore_ascii_case("noop") {
                noop = true;
                continue;
            }

            let digits = part.strip_suffix('%').unwrap_or(part);
            if let Ok(pct) = digits.parse::<i64>() {
                if weight.replace(Weight::new(pct)?).is_some() {
                    return Err(ResponseError::DuplicateWeight(trimmed.to_string()));
                }
                continue;
            }

            if status.replace(part.parse::<Status>()?).is_some() {
                return Err(ResponseError::DuplicateStatus(trimmed.to_string()));
            }
        }

        if noop {
            if weight.is_some() || status.is_some() {
                return Err(ResponseError::NoopCombined(trimmed.to_string()));
            }
            return Ok(AgentResponse::Noop);
        }

        Ok(Self::from_parts(weight, status))
    }
}

impl fmt::Display for AgentResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentResponse::Noop => f.write_str("noop"),
            AgentResponse::Weight(w) => write!(f, "{}", w),
            AgentResponse::Status(s) => write!(f, "{}", s),
            AgentResponse::Combined(w, s) => write!(f, "{},{}", w, s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_shape() {
        assert_eq!("noop".parse::<AgentResponse>().unwrap(), AgentResponse::Noop);
        assert_eq!(
            "75%".parse::<AgentResponse>().unwrap(),
            AgentResponse::Weight(Weight::new(75).unwrap())
        );
        assert_eq!(
            "1".parse::<AgentResponse>().unwrap(),
            AgentResponse::Weight(Weight::new(1).unwrap())
        );
        assert_eq!(
            "DRAIN".parse::<AgentResponse>().unwrap(),
            AgentResponse::Status(Status::Drain)
        );
        assert_eq!(
            "50%,up".parse::<AgentResponse>().unwrap(),
            AgentResponse::Combined(Weight::new(50).unwrap(), Status::Up)
        );
        assert_eq!(
            "ready 20%".parse::<AgentResponse>().unwrap(),
            AgentResponse::Combined(Weight::new(20).unwrap(), Status::Ready)
        );
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert_eq!("".parse::<AgentResponse>(), Err(ResponseError::Empty));
        assert_eq!(
            "101%".parse::<AgentResponse>(),
            Err(ResponseError::WeightOutOfRange(101))
        );
        assert!(matches!(
            "sideways".parse::<AgentResponse>(),
            Err(ResponseError::UnknownKeyword(_))
        ));
        assert!(matches!(
            "10%,20%".parse::<AgentResponse>(),
            Err(ResponseError::DuplicateWeight(_))
        ));
        assert!(matches!(
            "up,down".parse::<AgentResponse>(),
            Err(ResponseError::DuplicateStatus(_))
        ));
        assert!(matches!(
            "noop,up".parse::<AgentResponse>(),
            Err(ResponseError::NoopCombined(_))
        ));
    }

    #[test]
    fn renders_single_line() {
        let combined = AgentResponse::Combined(Weight::new(0).unwrap(), Status::Maint);
        assert_eq!(combined.to_string(), "0%,maint");
        assert_eq!(AgentResponse::Noop.to_string(), "noop");
        assert!(!combined.to_string().contains('\n'));
    }

    #[test]
    fn merge_overlays_components() {
        let weight = AgentResponse::Weight(Weight::new(40).unwrap());
        let down = AgentResponse::Status(Status::Down);
        let up = AgentResponse::Status(Status::Up);

        assert_eq!(
            weight.merge(down),
            AgentResponse::Combined(Weight::new(40).unwrap(), Status::Down)
        );
        assert_eq!(down.merge(up), up);
        assert_eq!(AgentResponse::Noop.merge(weight), weight);
        assert_eq!(weight.merge(AgentResponse::Noop), weight);
    }

    #[test]
    fn toml_integers_are_weights() {
        let value = toml::Value::Integer(1);
        assert_eq!(AgentResponse::from_toml(&value).unwrap().to_string(), "1%");

        let bad = toml::Value::Integer(-3);
        assert_eq!(
            AgentResponse::from_toml(&bad),
            Err(ResponseError::WeightOutOfRange(-3))
        );
    }
}
