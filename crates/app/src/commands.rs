use std::str::FromStr;

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Mute(String),
    UnmuteAll,
    Solo(String),
    Volume(String, f32),
    Marker,
    RemoveMarker(usize),
    Jump(usize),
    Seek(f64),
    Undo,
    Redo,
    Status,
    Snapshot,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("'{0}' needs {1}")]
    MissingArgument(&'static str, &'static str),

    #[error("invalid {what}: '{value}'")]
    InvalidArgument { what: &'static str, value: String },
}

pub const HELP: &str = "\
commands:
  play | pause | stop
  mute <stem>          toggle a stem's mute
  unmute-all
  solo <stem>          solo and play; again to pause
  volume <stem> <0-1>
  marker               drop a marker at the playhead
  remove-marker <n>    markers are numbered from 1
  jump <n>             jump to marker n
  seek <seconds>
  undo | redo
  status | snapshot
  quit";

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ParseCommandError::Empty);
        };
        let rest: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "play" | "p" => Command::Play,
            "pause" => Command::Pause,
            "stop" | "s" => Command::Stop,
            "mute" | "m" => Command::Mute(stem_name("mute", &rest)?),
            "unmute-all" => Command::UnmuteAll,
            "solo" => Command::Solo(stem_name("solo", &rest)?),
            "volume" | "vol" => {
                let (value, name) = rest
                    .split_last()
                    .ok_or(ParseCommandError::MissingArgument("volume", "a stem and a level"))?;
                if name.is_empty() {
                    return Err(ParseCommandError::MissingArgument("volume", "a stem and a level"));
                }
                Command::Volume(name.join(" "), parse("volume", value)?)
            }
            "marker" | "mark" => Command::Marker,
            "remove-marker" => Command::RemoveMarker(marker_index("remove-marker", &rest)?),
            "jump" | "j" => Command::Jump(marker_index("jump", &rest)?),
            "seek" => {
                let value = rest
                    .first()
                    .ok_or(ParseCommandError::MissingArgument("seek", "a time in seconds"))?;
                Command::Seek(parse("seek time", value)?)
            }
            "undo" | "u" => Command::Undo,
            "redo" | "r" => Command::Redo,
            "status" => Command::Status,
            "snapshot" | "json" => Command::Snapshot,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn stem_name(verb: &'static str, rest: &[&str]) -> Result<String, ParseCommandError> {
    if rest.is_empty() {
        return Err(ParseCommandError::MissingArgument(verb, "a stem name"));
    }
    Ok(rest.join(" "))
}

/// Markers are shown 1-based; the transport counts from 0.
fn marker_index(verb: &'static str, rest: &[&str]) -> Result<usize, ParseCommandError> {
    let value = rest
        .first()
        .ok_or(ParseCommandError::MissingArgument(verb, "a marker number"))?;
    let number: usize = parse("marker number", value)?;
    number
        .checked_sub(1)
        .ok_or_else(|| ParseCommandError::InvalidArgument {
            what: "marker number",
            value: value.to_string(),
        })
}

fn parse<T: FromStr>(what: &'static str, value: &str) -> Result<T, ParseCommandError> {
    value.parse().map_err(|_| ParseCommandError::InvalidArgument {
        what,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_verbs() {
        assert_eq!("play".parse::<Command>(), Ok(Command::Play));
        assert_eq!("  PAUSE ".parse::<Command>(), Ok(Command::Pause));
        assert_eq!("unmute-all".parse::<Command>(), Ok(Command::UnmuteAll));
        assert_eq!("q".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn test_stem_names_may_contain_spaces() {
        assert_eq!("mute Vocals".parse::<Command>(), Ok(Command::Mute("Vocals".into())));
        assert_eq!(
            "solo lead guitar.wav".parse::<Command>(),
            Ok(Command::Solo("lead guitar.wav".into()))
        );
        assert_eq!(
            "volume lead guitar.wav 0.5".parse::<Command>(),
            Ok(Command::Volume("lead guitar.wav".into(), 0.5))
        );
    }

    #[test]
    fn test_markers_are_one_based() {
        assert_eq!("jump 1".parse::<Command>(), Ok(Command::Jump(0)));
        assert_eq!("remove-marker 3".parse::<Command>(), Ok(Command::RemoveMarker(2)));
        assert_eq!(
            "jump 0".parse::<Command>(),
            Err(ParseCommandError::InvalidArgument {
                what: "marker number",
                value: "0".into()
            })
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!("".parse::<Command>(), Err(ParseCommandError::Empty));
        assert_eq!(
            "dance".parse::<Command>(),
            Err(ParseCommandError::Unknown("dance".into()))
        );
        assert_eq!(
            "mute".parse::<Command>(),
            Err(ParseCommandError::MissingArgument("mute", "a stem name"))
        );
        assert_eq!(
            "volume 0.5".parse::<Command>(),
            Err(ParseCommandError::MissingArgument("volume", "a stem and a level"))
        );
        assert_eq!(
            "seek soon".parse::<Command>(),
            Err(ParseCommandError::InvalidArgument {
                what: "seek time",
                value: "soon".into()
            })
        );
    }
}
