use super::*;
use chumsky::{error::SimpleReason, prelude::*, text::whitespace};
use itertools::Itertools;

#[derive(Debug, Snafu)]
#[snafu(display("cannot parse '{input}' - {}", self.combine_errors("\n")))]
pub struct ParseError {
    input: String,
    errors: Vec<Simple<char>>,
}

impl ParseError {
    fn combine_errors(&self, separator: &str) -> String {
        self.errors
            .iter()
            .map(|err| match err.reason() {
                SimpleReason::Custom(msg) => format!("error {}", msg),
                SimpleReason::Unexpected => "unexpected input".to_string(),
                SimpleReason::Unclosed { span, delimiter } => {
                    format!(
                        "unclosed delimiter ({}..{}) in {}",
                        span.start, span.end, delimiter
                    )
                }
            })
            .join(separator)
    }
}

pub fn parse(input: &str) -> Result<Action, ParseError> {
    let action = program().parse(input).map_err(|errors| ParseError {
        input: input.to_string(),
        errors,
    })?;

    Ok(action)
}

fn program() -> impl Parser<char, Action, Error = Simple<char>> {
    choice((
        action_track(),
        action_untrack(),
        action_stats(),
        action_top(),
        action_list(),
        action_reset(),
        action_exit(),
    ))
    .then_ignore(whitespace())
    .then_ignore(end())
}

fn action_track() -> impl Parser<char, Action, Error = Simple<char>> {
    just("track")
        .then_ignore(whitespace().at_least(1))
        .ignore_then(word())
        .then(whitespace().at_least(1).ignore_then(word()).or_not())
        .map(|(target, handle)| Action::Track { target, handle })
}

fn action_untrack() -> impl Parser<char, Action, Error = Simple<char>> {
    just("untrack")
        .then_ignore(whitespace().at_least(1))
        .ignore_then(word())
        .map(|target| Action::Untrack { target })
}

fn action_stats() -> impl Parser<char, Action, Error = Simple<char>> {
    just("stats")
        .then_ignore(whitespace().at_least(1))
        .ignore_then(word())
        .map(|target| Action::Stats { target })
}

fn action_top() -> impl Parser<char, Action, Error = Simple<char>> {
    just("top").to(Action::Top)
}

fn action_list() -> impl Parser<char, Action, Error = Simple<char>> {
    just("list").to(Action::List)
}

fn action_reset() -> impl Parser<char, Action, Error = Simple<char>> {
    just("reset").to(Action::Reset)
}

fn action_exit() -> impl Parser<char, Action, Error = Simple<char>> {
    choice((just("exit"), just("quit"))).to(Action::Exit)
}

fn word() -> impl Parser<char, String, Error = Simple<char>> {
    filter(|c: &char| !c.is_whitespace())
        .repeated()
        .at_least(1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_track_with_id() {
        let action = parse("track 12345").unwrap();

        assert_eq!(
            action,
            Action::Track {
                target: "12345".to_string(),
                handle: None,
            }
        );
    }

    #[test]
    fn parse_track_with_profile_url_and_handle() {
        let action = parse("track https://app.hackthebox.com/users/12345 1001").unwrap();

        assert_eq!(
            action,
            Action::Track {
                target: "https://app.hackthebox.com/users/12345".to_string(),
                handle: Some("1001".to_string()),
            }
        );
    }

    #[test]
    fn parse_untrack() {
        let action = parse("untrack m4verick").unwrap();

        assert_eq!(
            action,
            Action::Untrack {
                target: "m4verick".to_string()
            }
        );
    }

    #[test]
    fn parse_stats() {
        let action = parse("stats 12345").unwrap();

        assert_eq!(
            action,
            Action::Stats {
                target: "12345".to_string()
            }
        );
    }

    #[test]
    fn parse_bare_commands() {
        assert_eq!(parse("top").unwrap(), Action::Top);
        assert_eq!(parse("list").unwrap(), Action::List);
        assert_eq!(parse("reset").unwrap(), Action::Reset);
        assert_eq!(parse("exit").unwrap(), Action::Exit);
        assert_eq!(parse("quit").unwrap(), Action::Exit);
    }

    #[test]
    fn trailing_whitespace_is_tolerated() {
        assert_eq!(parse("top  ").unwrap(), Action::Top);
    }

    #[test]
    fn reject_unknown_commands() {
        let error = parse("snipe 12345").unwrap_err();

        assert!(error.to_string().contains("snipe 12345"));
    }

    #[test]
    fn reject_track_without_a_target() {
        assert!(parse("track").is_err());
    }
}
