//! Line commands understood by the interactive prompt.

use anyhow::{bail, Result};

pub const HELP: &str = "\
Commands:
  load            fetch the first page into the window
  refresh         append one random study now
  poll on|off     start or stop background polling
  fav <id>        toggle a favorite
  show <id>       fetch and print one study
  list            print the window
  favorites       print the favorites
  clear           remove all favorites
  reset           empty the window
  help            this text
  quit            exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load,
    Refresh,
    Poll(bool),
    Fav(String),
    Show(String),
    List,
    Favorites,
    Clear,
    Reset,
    Help,
    Quit,
}

/// Parse one input line. Blank lines give `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        bail!("too many arguments for '{}'", verb);
    }

    let command = match (verb.to_ascii_lowercase().as_str(), arg) {
        ("load", None) => Command::Load,
        ("refresh", None) => Command::Refresh,
        ("poll", Some(state)) => match state.to_ascii_lowercase().as_str() {
            "on" | "start" => Command::Poll(true),
            "off" | "stop" => Command::Poll(false),
            other => bail!("poll expects on or off, got '{}'", other),
        },
        ("fav", Some(id)) => Command::Fav(normalize_id(id)),
        ("show", Some(id)) => Command::Show(normalize_id(id)),
        ("list" | "ls", None) => Command::List,
        ("favorites" | "favs", None) => Command::Favorites,
        ("clear", None) => Command::Clear,
        ("reset", None) => Command::Reset,
        ("help" | "?", None) => Command::Help,
        ("quit" | "exit" | "q", None) => Command::Quit,
        ("poll" | "fav" | "show", None) => bail!("'{}' needs an argument", verb),
        (_, Some(_)) if is_known(verb) => bail!("'{}' takes no argument", verb),
        _ => bail!("unknown command '{}' (try 'help')", verb),
    };
    Ok(Some(command))
}

fn is_known(verb: &str) -> bool {
    matches!(
        verb.to_ascii_lowercase().as_str(),
        "load" | "refresh" | "list" | "ls" | "favorites" | "favs" | "clear" | "reset" | "help" | "?" | "quit" | "exit" | "q"
    )
}

// Catalog ids are upper-case (NCT01234567)
fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("load").unwrap(), Some(Command::Load));
        assert_eq!(parse("  LIST ").unwrap(), Some(Command::List));
        assert_eq!(parse("q").unwrap(), Some(Command::Quit));
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_poll() {
        assert_eq!(parse("poll on").unwrap(), Some(Command::Poll(true)));
        assert_eq!(parse("poll OFF").unwrap(), Some(Command::Poll(false)));
        assert!(parse("poll maybe").is_err());
        assert!(parse("poll").is_err());
    }

    #[test]
    fn test_parse_ids_are_normalized() {
        assert_eq!(
            parse("fav nct01234567").unwrap(),
            Some(Command::Fav("NCT01234567".to_string()))
        );
        assert_eq!(
            parse("show NCT00000001").unwrap(),
            Some(Command::Show("NCT00000001".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse("frobnicate").is_err());
        assert!(parse("load now").is_err());
        assert!(parse("fav a b").is_err());
        assert!(parse("show").is_err());
    }
}
