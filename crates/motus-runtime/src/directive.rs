//! Fast-path inputs that bypass translation entirely.
//!
//! Two kinds of text are recognised without calling the translator:
//!
//! - raw base directives of the form `<action> [speed] [duration]`, e.g.
//!   `forward 1.0 2.5` or `stop`;
//! - the exact gripper phrases `open gripper` / `close gripper` and their
//!   Korean equivalents.

use std::fmt;
use std::str::FromStr;

/// Speed used when a directive omits it.
pub const DEFAULT_DIRECTIVE_SPEED: f64 = 1.0;
/// Duration in seconds used when a directive omits it.
pub const DEFAULT_DIRECTIVE_DURATION: f64 = 1.0;

const OPEN_PHRASES: [&str; 3] = ["그리퍼 열어", "그리퍼 열기", "open gripper"];
const CLOSE_PHRASES: [&str; 3] = ["그리퍼 닫아", "그리퍼 닫기", "close gripper"];

/// Direction of a differential-drive base move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseDirection {
    Forward,
    Backward,
    Left,
    Right,
}

impl BaseDirection {
    /// Normalised `(left wheel, right wheel)` directions.
    pub fn wheel_signs(self) -> (f64, f64) {
        match self {
            BaseDirection::Forward => (1.0, 1.0),
            BaseDirection::Backward => (-1.0, -1.0),
            BaseDirection::Left => (-1.0, 1.0),
            BaseDirection::Right => (1.0, -1.0),
        }
    }
}

impl FromStr for BaseDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" => Ok(BaseDirection::Forward),
            "backward" => Ok(BaseDirection::Backward),
            "left" => Ok(BaseDirection::Left),
            "right" => Ok(BaseDirection::Right),
            _ => Err(()),
        }
    }
}

impl fmt::Display for BaseDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BaseDirection::Forward => "forward",
            BaseDirection::Backward => "backward",
            BaseDirection::Left => "left",
            BaseDirection::Right => "right",
        };
        f.write_str(s)
    }
}

/// Open or close the gripper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperAction {
    Open,
    Close,
}

impl FromStr for GripperAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(GripperAction::Open),
            "close" => Ok(GripperAction::Close),
            _ => Err(()),
        }
    }
}

impl fmt::Display for GripperAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GripperAction::Open => "open",
            GripperAction::Close => "close",
        })
    }
}

/// A parsed raw directive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Directive {
    Drive {
        direction: BaseDirection,
        speed: f64,
        duration_secs: f64,
    },
    Stop,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Drive {
                direction,
                speed,
                duration_secs,
            } => write!(f, "{direction} at {speed} for {duration_secs}s"),
            Directive::Stop => f.write_str("stop"),
        }
    }
}

/// Parse `text` as a raw directive.
///
/// The first token must be a base action (or `stop`) and be followed by at
/// most two numbers.  Anything else returns `None` so the text can go to the
/// translator instead; "turn left slowly" is natural language, not a
/// directive.
pub fn parse_directive(text: &str) -> Option<Directive> {
    let mut tokens = text.split_whitespace();
    let head = tokens.next()?;
    let numbers: Vec<f64> = tokens
        .map(|t| t.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<_>>()?;
    if numbers.len() > 2 {
        return None;
    }

    if head.eq_ignore_ascii_case("stop") {
        return numbers.is_empty().then_some(Directive::Stop);
    }

    let direction = head.parse::<BaseDirection>().ok()?;
    Some(Directive::Drive {
        direction,
        speed: numbers.first().copied().unwrap_or(DEFAULT_DIRECTIVE_SPEED).abs(),
        duration_secs: numbers
            .get(1)
            .copied()
            .unwrap_or(DEFAULT_DIRECTIVE_DURATION)
            .max(0.0),
    })
}

/// Match one of the exact gripper shortcut phrases.
pub fn parse_gripper_phrase(text: &str) -> Option<GripperAction> {
    let text = text.trim();
    if OPEN_PHRASES.iter().any(|p| text.eq_ignore_ascii_case(p)) {
        Some(GripperAction::Open)
    } else if CLOSE_PHRASES.iter().any(|p| text.eq_ignore_ascii_case(p)) {
        Some(GripperAction::Close)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_directive_parses() {
        assert_eq!(
            parse_directive("forward 2.0 0.5"),
            Some(Directive::Drive {
                direction: BaseDirection::Forward,
                speed: 2.0,
                duration_secs: 0.5,
            })
        );
    }

    #[test]
    fn missing_numbers_use_defaults() {
        assert_eq!(
            parse_directive("left"),
            Some(Directive::Drive {
                direction: BaseDirection::Left,
                speed: DEFAULT_DIRECTIVE_SPEED,
                duration_secs: DEFAULT_DIRECTIVE_DURATION,
            })
        );
        let Some(Directive::Drive {
            speed,
            duration_secs,
            ..
        }) = parse_directive("Backward 3")
        else {
            panic!("expected drive");
        };
        assert_eq!(speed, 3.0);
        assert_eq!(duration_secs, DEFAULT_DIRECTIVE_DURATION);
    }

    #[test]
    fn stop_directive() {
        assert_eq!(parse_directive("stop"), Some(Directive::Stop));
        assert_eq!(parse_directive("  STOP  "), Some(Directive::Stop));
        assert_eq!(parse_directive("stop 1"), None);
    }

    #[test]
    fn natural_language_is_not_a_directive() {
        assert_eq!(parse_directive("turn left"), None);
        assert_eq!(parse_directive("left slowly please"), None);
        assert_eq!(parse_directive("forward 1 2 3"), None);
        assert_eq!(parse_directive("forward fast"), None);
        assert_eq!(parse_directive(""), None);
    }

    #[test]
    fn negative_values_are_sanitised() {
        let Some(Directive::Drive {
            speed,
            duration_secs,
            ..
        }) = parse_directive("right -2 -1")
        else {
            panic!("expected drive");
        };
        assert_eq!(speed, 2.0);
        assert_eq!(duration_secs, 0.0);
    }

    #[test]
    fn wheel_signs_per_direction() {
        assert_eq!(BaseDirection::Forward.wheel_signs(), (1.0, 1.0));
        assert_eq!(BaseDirection::Backward.wheel_signs(), (-1.0, -1.0));
        assert_eq!(BaseDirection::Left.wheel_signs(), (-1.0, 1.0));
        assert_eq!(BaseDirection::Right.wheel_signs(), (1.0, -1.0));
    }

    #[test]
    fn gripper_phrases() {
        assert_eq!(parse_gripper_phrase("open gripper"), Some(GripperAction::Open));
        assert_eq!(parse_gripper_phrase("Close Gripper"), Some(GripperAction::Close));
        assert_eq!(parse_gripper_phrase("그리퍼 열어"), Some(GripperAction::Open));
        assert_eq!(parse_gripper_phrase("그리퍼 닫기"), Some(GripperAction::Close));
        assert_eq!(parse_gripper_phrase("please open the gripper"), None);
    }

    #[test]
    fn gripper_action_from_str() {
        assert_eq!("OPEN".parse::<GripperAction>(), Ok(GripperAction::Open));
        assert!("squeeze".parse::<GripperAction>().is_err());
    }
}
