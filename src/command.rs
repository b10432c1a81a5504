//! Remote-control wire grammar.
//!
//! The transport hands over whitespace-split tokens; this module turns them
//! into typed commands or rejects them outright. There is no best-effort
//! recovery: a token list either matches the grammar exactly or the caller
//! gets a [`CommandParseError`].

use std::fmt;

use crate::error::CommandParseError;
use crate::media_library::MediaId;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Media(MediaCommand),
    System(SystemCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaCommand {
    /// `None` resumes the current video. Ids are non-negative integers, so
    /// `play 1.5` or `play -1` is a parse error rather than a missing item.
    Play(Option<MediaId>),
    Pause,
    Stop,
    Fwd,
    Rew,
    /// Seconds.
    Seek(f64),
    /// Milliseconds of the controller's clock.
    Sync(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemCommand {
    Volume(VolumeCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VolumeCommand {
    Mute,
    Unmute,
    Set(f64),
}

impl Command {
    /// Parses a token list from either channel. A leading `volume` selects the
    /// system grammar, everything else is a media command.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CommandParseError> {
        match tokens.first().map(AsRef::as_ref) {
            Some("volume") => SystemCommand::parse(tokens).map(Command::System),
            _ => MediaCommand::parse(tokens).map(Command::Media),
        }
    }
}

impl MediaCommand {
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CommandParseError> {
        let words: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();

        let command = match words.as_slice() {
            ["play"] => MediaCommand::Play(None),
            ["play", id] => MediaCommand::Play(Some(parse_media_id(id, &words)?)),
            ["pause"] => MediaCommand::Pause,
            ["forward"] => MediaCommand::Fwd,
            ["rewind"] => MediaCommand::Rew,
            ["stop"] => MediaCommand::Stop,
            ["seek", seconds] => MediaCommand::Seek(parse_number(seconds, &words)?),
            ["sync", millis] => MediaCommand::Sync(parse_number(millis, &words)?),
            _ => return Err(CommandParseError::unknown(&words)),
        };

        Ok(command)
    }
}

impl SystemCommand {
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CommandParseError> {
        let words: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();

        let volume = match words.as_slice() {
            ["volume", "mute"] => VolumeCommand::Mute,
            ["volume", "unmute"] => VolumeCommand::Unmute,
            ["volume", "set", level] => VolumeCommand::Set(parse_number(level, &words)?),
            _ => return Err(CommandParseError::unknown(&words)),
        };

        Ok(SystemCommand::Volume(volume))
    }
}

fn parse_number(token: &str, words: &[&str]) -> Result<f64, CommandParseError> {
    token
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| CommandParseError::not_a_number(token, words))
}

fn parse_media_id(token: &str, words: &[&str]) -> Result<MediaId, CommandParseError> {
    token
        .parse::<u32>()
        .map(MediaId)
        .map_err(|_| CommandParseError::not_a_number(token, words))
}

impl fmt::Display for MediaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaCommand::Play(None) => write!(f, "play"),
            MediaCommand::Play(Some(id)) => write!(f, "play {}", id),
            MediaCommand::Pause => write!(f, "pause"),
            MediaCommand::Stop => write!(f, "stop"),
            MediaCommand::Fwd => write!(f, "forward"),
            MediaCommand::Rew => write!(f, "rewind"),
            MediaCommand::Seek(seconds) => write!(f, "seek {}", seconds),
            MediaCommand::Sync(millis) => write!(f, "sync {}", millis),
        }
    }
}

impl fmt::Display for SystemCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemCommand::Volume(VolumeCommand::Mute) => write!(f, "volume mute"),
            SystemCommand::Volume(VolumeCommand::Unmute) => write!(f, "volume unmute"),
            SystemCommand::Volume(VolumeCommand::Set(level)) => write!(f, "volume set {}", level),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Media(command) => command.fmt(f),
            Command::System(command) => command.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, CommandParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        Command::parse(&tokens)
    }

    #[test]
    fn parses_every_media_command() {
        assert_eq!(parse("play").unwrap(), Command::Media(MediaCommand::Play(None)));
        assert_eq!(
            parse("play 12").unwrap(),
            Command::Media(MediaCommand::Play(Some(MediaId(12))))
        );
        assert_eq!(parse("pause").unwrap(), Command::Media(MediaCommand::Pause));
        assert_eq!(parse("forward").unwrap(), Command::Media(MediaCommand::Fwd));
        assert_eq!(parse("rewind").unwrap(), Command::Media(MediaCommand::Rew));
        assert_eq!(parse("stop").unwrap(), Command::Media(MediaCommand::Stop));
        assert_eq!(parse("seek 42.5").unwrap(), Command::Media(MediaCommand::Seek(42.5)));
        assert_eq!(parse("sync 1500").unwrap(), Command::Media(MediaCommand::Sync(1500.0)));
    }

    #[test]
    fn parses_volume_commands() {
        assert_eq!(
            parse("volume mute").unwrap(),
            Command::System(SystemCommand::Volume(VolumeCommand::Mute))
        );
        assert_eq!(
            parse("volume unmute").unwrap(),
            Command::System(SystemCommand::Volume(VolumeCommand::Unmute))
        );
        assert_eq!(
            parse("volume set 0.4").unwrap(),
            Command::System(SystemCommand::Volume(VolumeCommand::Set(0.4)))
        );
    }

    #[test]
    fn rejects_token_lists_outside_the_grammar() {
        for line in [
            "invalid command",
            "",
            "seek",
            "sync",
            "play abc",
            "play -1",
            "play 1.5",
            "seek ten",
            "seek NaN",
            "sync inf",
            "pause now",
            "stop 3",
            "play 1 2",
            "volume",
            "volume loud",
            "volume set",
            "volume set max",
            "Play",
        ] {
            assert!(parse(line).is_err(), "{:?} should not parse", line);
        }
    }

    #[test]
    fn error_names_the_offending_tokens() {
        let err = parse("play abc").unwrap_err();
        assert!(err.to_string().contains("play abc"), "{}", err);

        let err = parse("invalid command").unwrap_err();
        assert!(err.to_string().contains("invalid command"), "{}", err);
    }

    #[test]
    fn channels_reject_each_others_commands() {
        assert!(MediaCommand::parse(&["volume", "mute"]).is_err());
        assert!(SystemCommand::parse(&["play"]).is_err());
        assert!(SystemCommand::parse(&["volume", "set", "1"]).is_ok());
    }

    #[test]
    fn display_round_trips_through_the_wire_form() {
        for line in ["play", "play 7", "forward", "seek 3.5", "volume set 0.25"] {
            assert_eq!(parse(line).unwrap().to_string(), line);
        }
    }
}
