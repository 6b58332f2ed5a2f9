//! Log verbosity flag shared by every subcommand.
//!
//! `-v` may be repeated; `FLOWGATE_LOG_LEVEL` accepts either a level name or
//! the equivalent repeat count.

use clap::{Arg, ArgAction, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names indexed by the `-v` count that selects them.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Highest numeric count accepted from the environment.
const MAX_COUNT: u8 = 5;

fn parse_level(raw: &str) -> Result<u8, String> {
    let raw = raw.trim();
    if let Ok(count) = raw.parse::<u8>() {
        return if count <= MAX_COUNT {
            Ok(count)
        } else {
            Err(format!("verbosity count must be at most {MAX_COUNT}"))
        };
    }

    LEVELS
        .iter()
        .position(|name| name.eq_ignore_ascii_case(raw))
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("unknown log level '{raw}', expected one of {}", LEVELS.join(", ")))
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Raise log verbosity, repeat for more (-v warn ... -vvvv trace)")
            .env("FLOWGATE_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_map_to_counts() {
        assert_eq!(parse_level("error"), Ok(0));
        assert_eq!(parse_level("INFO"), Ok(2));
        assert_eq!(parse_level(" trace "), Ok(4));
    }

    #[test]
    fn numeric_counts_are_bounded() {
        assert_eq!(parse_level("5"), Ok(5));
        assert!(parse_level("6").is_err());
        assert!(parse_level("loud").is_err_and(|err| err.contains("debug")));
    }
}
