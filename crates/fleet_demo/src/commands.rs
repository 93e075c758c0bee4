//! Operator commands read line by line from stdin.

use fleet_core::ecs::TargetId;
use fleet_core::geo::GeoPoint;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddVehicle(GeoPoint),
    AddTarget(GeoPoint),
    Ride { pickup: GeoPoint, dropoff: GeoPoint },
    RandomRide,
    /// Send the controlled vehicle to a target, or to the nearest pending one.
    Dispatch(Option<TargetId>),
    Speed(f64),
    Scale(f64),
    Start,
    Pause,
    Reset,
    Status,
    Events,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("`{command}` expects {expected}")]
    Arity {
        command: &'static str,
        expected: &'static str,
    },
    #[error("`{0}` is not a number")]
    Number(String),
    #[error("{0} is not a valid coordinate")]
    Coordinate(GeoPoint),
}

pub const HELP: &str = "\
commands:
  vehicle <lat> <lng>                       add a vehicle
  target <lat> <lng>                        add a pick-up point
  ride <lat> <lng> <lat> <lng>              request a ride (pickup, dropoff)
  random                                    request a random ride in the service area
  dispatch [target]                         send the controlled vehicle to a target
  speed <km/h> | scale <factor>             change fleet speed or time scale
  start | pause | reset                     clock control
  status | events | help | quit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Command>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match head.to_ascii_lowercase().as_str() {
        "vehicle" | "car" => Command::AddVehicle(point(&args, "vehicle", "<lat> <lng>")?),
        "target" | "point" => Command::AddTarget(point(&args, "target", "<lat> <lng>")?),
        "ride" => {
            if args.len() != 4 {
                return Err(ParseError::Arity {
                    command: "ride",
                    expected: "<lat> <lng> <lat> <lng>",
                });
            }
            Command::Ride {
                pickup: point(&args[..2], "ride", "<lat> <lng> <lat> <lng>")?,
                dropoff: point(&args[2..], "ride", "<lat> <lng> <lat> <lng>")?,
            }
        }
        "random" => no_args(&args, "random", Command::RandomRide)?,
        "dispatch" | "go" => match args.as_slice() {
            [] => Command::Dispatch(None),
            [id] => {
                let id = id
                    .trim_start_matches('#')
                    .parse::<u32>()
                    .map_err(|_| ParseError::Number((*id).to_string()))?;
                Command::Dispatch(Some(TargetId(id)))
            }
            _ => {
                return Err(ParseError::Arity {
                    command: "dispatch",
                    expected: "an optional target id",
                })
            }
        },
        "speed" => Command::Speed(single_number(&args, "speed", "a speed in km/h")?),
        "scale" => Command::Scale(single_number(&args, "scale", "a time scale factor")?),
        "start" => no_args(&args, "start", Command::Start)?,
        "pause" => no_args(&args, "pause", Command::Pause)?,
        "reset" => no_args(&args, "reset", Command::Reset)?,
        "status" => no_args(&args, "status", Command::Status)?,
        "events" => no_args(&args, "events", Command::Events)?,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn no_args(args: &[&str], command: &'static str, parsed: Command) -> Result<Command, ParseError> {
    if args.is_empty() {
        Ok(parsed)
    } else {
        Err(ParseError::Arity {
            command,
            expected: "no arguments",
        })
    }
}

fn number(raw: &str) -> Result<f64, ParseError> {
    raw.parse::<f64>()
        .map_err(|_| ParseError::Number(raw.to_string()))
}

fn single_number(args: &[&str], command: &'static str, expected: &'static str) -> Result<f64, ParseError> {
    match args {
        [raw] => number(raw),
        _ => Err(ParseError::Arity { command, expected }),
    }
}

fn point(args: &[&str], command: &'static str, expected: &'static str) -> Result<GeoPoint, ParseError> {
    let [lat, lng] = args else {
        return Err(ParseError::Arity { command, expected });
    };
    let point = GeoPoint::new(number(lat)?, number(lng)?);
    if point.is_valid() {
        Ok(point)
    } else {
        Err(ParseError::Coordinate(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entity_commands() {
        assert_eq!(
            parse_line("vehicle 35.0116 135.7681"),
            Ok(Some(Command::AddVehicle(GeoPoint::new(35.0116, 135.7681))))
        );
        assert_eq!(
            parse_line("  TARGET 35.02 135.77 "),
            Ok(Some(Command::AddTarget(GeoPoint::new(35.02, 135.77))))
        );
        assert_eq!(
            parse_line("ride 35.0 135.7 35.1 135.8"),
            Ok(Some(Command::Ride {
                pickup: GeoPoint::new(35.0, 135.7),
                dropoff: GeoPoint::new(35.1, 135.8),
            }))
        );
        assert_eq!(parse_line("random"), Ok(Some(Command::RandomRide)));
    }

    #[test]
    fn parses_dispatch_with_and_without_target() {
        assert_eq!(parse_line("dispatch"), Ok(Some(Command::Dispatch(None))));
        assert_eq!(
            parse_line("dispatch #2"),
            Ok(Some(Command::Dispatch(Some(TargetId(2)))))
        );
        assert_eq!(
            parse_line("go x"),
            Err(ParseError::Number("x".to_string()))
        );
    }

    #[test]
    fn parses_clock_commands() {
        assert_eq!(parse_line("speed 60"), Ok(Some(Command::Speed(60.0))));
        assert_eq!(parse_line("scale 2.5"), Ok(Some(Command::Scale(2.5))));
        assert_eq!(parse_line("start"), Ok(Some(Command::Start)));
        assert_eq!(parse_line("pause"), Ok(Some(Command::Pause)));
        assert_eq!(parse_line("reset"), Ok(Some(Command::Reset)));
        assert_eq!(parse_line("quit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   \t"), Ok(None));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_line("fly"), Err(ParseError::Unknown("fly".to_string())));
        assert!(matches!(
            parse_line("ride 35.0 135.7"),
            Err(ParseError::Arity { command: "ride", .. })
        ));
        assert!(matches!(
            parse_line("start now"),
            Err(ParseError::Arity { command: "start", .. })
        ));
        assert!(matches!(
            parse_line("vehicle 95 135"),
            Err(ParseError::Coordinate(_))
        ));
        assert_eq!(
            parse_line("speed fast"),
            Err(ParseError::Number("fast".to_string()))
        );
    }
}
