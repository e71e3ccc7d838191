use std::str::FromStr;

use tally::{CounterId, Snapshot, SyncError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Increment(CounterId),
    Decrement(CounterId),
    Delete(CounterId),
    Reset,
    Restart,
    Login(String),
    Logout,
    Show,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    #[error(transparent)]
    InvalidId(#[from] SyncError),
    #[error("{0}")]
    Disabled(&'static str),
}

pub(crate) const HELP: &str = "\
commands:
  inc <id>      increment a counter
  dec <id>      decrement a counter (not while it shows zero)
  del <id>      delete a counter
  reset         set every counter to zero
  restart       bring back the default counters (only once all are deleted)
  login <user>  sign in
  logout        sign out
  show          print the counters again
  quit";

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(CommandError::Empty);
        };
        let arg = words.next();

        let counter = |name: &'static str| -> Result<CounterId, CommandError> {
            let raw = arg.ok_or(CommandError::MissingArgument(name))?;
            Ok(CounterId::parse(raw)?)
        };

        Ok(match name {
            "inc" | "+" => Command::Increment(counter("inc")?),
            "dec" | "-" => Command::Decrement(counter("dec")?),
            "del" | "rm" => Command::Delete(counter("del")?),
            "reset" => Command::Reset,
            "restart" => Command::Restart,
            "login" => Command::Login(
                arg.ok_or(CommandError::MissingArgument("login"))?
                    .to_string(),
            ),
            "logout" => Command::Logout,
            "show" | "ls" => Command::Show,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        })
    }
}

impl Command {
    /// The same guards the buttons have: a counter showing exactly zero can't be decremented,
    /// reset needs something to reset, and restart is only offered once the list is empty.
    pub(crate) fn check(&self, snapshot: &Snapshot) -> Result<(), CommandError> {
        match self {
            Command::Decrement(id) => {
                let value = snapshot
                    .counters
                    .iter()
                    .find(|c| &c.id == id)
                    .map(|c| c.value);
                match value {
                    Some(0) => Err(CommandError::Disabled("that counter is already at zero")),
                    Some(_) => Ok(()),
                    None => Err(CommandError::Disabled("no such counter")),
                }
            }
            Command::Reset if snapshot.counters.is_empty() => {
                Err(CommandError::Disabled("there is nothing to reset"))
            }
            Command::Restart if !snapshot.counters.is_empty() => Err(CommandError::Disabled(
                "restart is only available once every counter is deleted",
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tally::{Counter, Session};

    use super::*;

    fn snapshot(counters: &[(&str, i64)]) -> Snapshot {
        Snapshot {
            session: Session::SignedOut,
            counters: counters
                .iter()
                .map(|(id, value)| Counter::new(CounterId::parse(*id).unwrap(), *value))
                .collect(),
            pending_writes: 0,
            last_failure: None,
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            "inc 3".parse::<Command>().unwrap(),
            Command::Increment(CounterId::parse("3").unwrap())
        );
        assert_eq!("  reset ".parse::<Command>().unwrap(), Command::Reset);
        assert_eq!(
            "login alice".parse::<Command>().unwrap(),
            Command::Login("alice".to_string())
        );
        assert!(matches!("".parse::<Command>(), Err(CommandError::Empty)));
        assert!(matches!(
            "dec".parse::<Command>(),
            Err(CommandError::MissingArgument("dec"))
        ));
        assert!(matches!(
            "del a/b".parse::<Command>(),
            Err(CommandError::InvalidId(_))
        ));
        assert!(matches!(
            "jump".parse::<Command>(),
            Err(CommandError::Unknown(_))
        ));
    }

    #[test]
    fn decrement_is_disabled_only_at_zero() {
        let snapshot = snapshot(&[("1", 0), ("2", 1), ("3", -2)]);
        let dec = |raw: &str| Command::Decrement(CounterId::parse(raw).unwrap());
        assert!(dec("1").check(&snapshot).is_err());
        assert!(dec("2").check(&snapshot).is_ok());
        // already negative through some other path, still decrementable
        assert!(dec("3").check(&snapshot).is_ok());
        assert!(dec("9").check(&snapshot).is_err());
    }

    #[test]
    fn reset_and_restart_depend_on_the_list() {
        let full = snapshot(&[("1", 4)]);
        let empty = snapshot(&[]);
        assert!(Command::Reset.check(&full).is_ok());
        assert!(Command::Reset.check(&empty).is_err());
        assert!(Command::Restart.check(&full).is_err());
        assert!(Command::Restart.check(&empty).is_ok());
    }
}
