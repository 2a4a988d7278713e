//! Playback scripts for `lesson simulate`.
//!
//! One command per line; `#` starts a comment.
//!
//! ```text
//! play
//! time 9.8
//! tick 3
//! answer 0
//! seek 40
//! quality 1
//! switched
//! ended
//! ```

use std::str::FromStr;

use lesson_player::{StepId, VariantId};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    Select(StepId),
    Complete(StepId),
    Play,
    Pause,
    Time(f64),
    Seek(f64),
    Duration(f64),
    Answer(usize),
    Quality(VariantId),
    Switched,
    Ended,
    Error(String),
    /// Advance the simulated clock by whole seconds.
    Tick(u32),
}

impl FromStr for ScriptCommand {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

        let seconds = |arg: &str| -> std::result::Result<f64, String> {
            let value: f64 = arg
                .parse()
                .map_err(|_| format!("`{verb}` expects seconds, got `{arg}`"))?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(format!("`{verb}` expects a finite number"))
            }
        };
        let required = |arg: &str| -> std::result::Result<String, String> {
            if arg.is_empty() {
                Err(format!("`{verb}` needs an argument"))
            } else {
                Ok(arg.to_string())
            }
        };

        let command = match verb {
            "select" => Self::Select(StepId::new(required(rest)?)),
            "complete" => Self::Complete(StepId::new(required(rest)?)),
            "play" => Self::Play,
            "pause" => Self::Pause,
            "time" => Self::Time(seconds(rest)?),
            "seek" => Self::Seek(seconds(rest)?),
            "duration" => Self::Duration(seconds(rest)?),
            "answer" => Self::Answer(
                rest.parse()
                    .map_err(|_| format!("`answer` expects an option index, got `{rest}`"))?,
            ),
            "quality" => Self::Quality(
                rest.parse()
                    .map_err(|e: lesson_player::PlayerError| e.to_string())?,
            ),
            // The variant argument is informational; the player knows what it asked for.
            "switched" => Self::Switched,
            "ended" => Self::Ended,
            "error" => Self::Error(if rest.is_empty() {
                "media error".to_string()
            } else {
                rest.to_string()
            }),
            "tick" => Self::Tick(if rest.is_empty() {
                1
            } else {
                rest.parse()
                    .map_err(|_| format!("`tick` expects a whole number of seconds, got `{rest}`"))?
            }),
            other => return Err(format!("unknown command `{other}`")),
        };
        Ok(command)
    }
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptCommand>> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.split('#').next().unwrap_or_default().trim();
            (!line.is_empty()).then_some((index + 1, line))
        })
        .map(|(line, command)| {
            command
                .parse()
                .map_err(|reason| AppError::Script { line, reason })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("play", ScriptCommand::Play)]
    #[case("time 12.5", ScriptCommand::Time(12.5))]
    #[case("seek   40", ScriptCommand::Seek(40.0))]
    #[case("answer 0", ScriptCommand::Answer(0))]
    #[case("tick", ScriptCommand::Tick(1))]
    #[case("tick 15", ScriptCommand::Tick(15))]
    #[case("quality auto", ScriptCommand::Quality(VariantId::Auto))]
    #[case("quality 1", ScriptCommand::Quality(VariantId::Level(1)))]
    #[case("switched 1", ScriptCommand::Switched)]
    #[case("select m1-step3", ScriptCommand::Select(StepId::from("m1-step3")))]
    #[case("error decode failed", ScriptCommand::Error("decode failed".to_string()))]
    fn parses_commands(#[case] line: &str, #[case] expected: ScriptCommand) {
        assert_eq!(line.parse::<ScriptCommand>().unwrap(), expected);
    }

    #[rstest]
    #[case("time")]
    #[case("time soon")]
    #[case("seek NaN")]
    #[case("answer -1")]
    #[case("rewind 4")]
    #[case("select")]
    fn rejects_malformed_lines(#[case] line: &str) {
        assert!(line.parse::<ScriptCommand>().is_err());
    }

    #[test]
    fn errors_carry_line_numbers() {
        let script = "# warm up\nplay\n\ntime 3 # early\nbogus\n";
        match parse_script(script) {
            Err(AppError::Script { line, .. }) => assert_eq!(line, 5),
            other => panic!("unexpected {other:?}"),
        }
        let ok = parse_script("play\ntime 3 # early\n").unwrap();
        assert_eq!(ok, [ScriptCommand::Play, ScriptCommand::Time(3.0)]);
    }
}
