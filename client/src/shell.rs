//! Interactive command parsing for the text client

use sha2::{Digest, Sha256};
use shared::{Request, StatSelection};
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  signup <user> <password>                    create an account
  login <user> <password>                     log in from this terminal
  logins                                      show how often you logged in
  setstats <sword> <shield> <slaying> <healing>
                                              choose your stats
  stats                                       show your stats and health
  users                                       list who is online
  msg <user> <text...>                        send a private message
  attack <user>                               fight another player
  help                                        show this list
  quit                                        leave";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    #[error("unknown command '{0}', type 'help' for the list")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid stat value '{0}', expected a whole number")]
    InvalidStat(String),
}

/// One line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Send(Request),
    Help,
    Quit,
}

/// SHA-256 hex digest; the server only ever sees this
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

impl ShellCommand {
    /// Returns `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<ShellCommand>, ShellError> {
        let mut words = line.split_whitespace();
        let command = match words.next() {
            Some(word) => word.to_ascii_lowercase(),
            None => return Ok(None),
        };

        let parsed = match command.as_str() {
            "signup" | "login" => {
                let usage = if command == "signup" {
                    "signup <user> <password>"
                } else {
                    "login <user> <password>"
                };
                let (username, password) = match (words.next(), words.next()) {
                    (Some(u), Some(p)) => (u.to_string(), hash_password(p)),
                    _ => return Err(ShellError::Usage(usage)),
                };
                ShellCommand::Send(if command == "signup" {
                    Request::Signup {
                        username,
                        password_hash: password,
                    }
                } else {
                    Request::Login {
                        username,
                        password_hash: password,
                    }
                })
            }
            "logins" => ShellCommand::Send(Request::Logins),
            "setstats" => {
                let values: Vec<&str> = words.collect();
                if values.len() != 4 {
                    return Err(ShellError::Usage(
                        "setstats <sword> <shield> <slaying> <healing>",
                    ));
                }
                let mut numbers = [0u32; 4];
                for (slot, raw) in numbers.iter_mut().zip(&values) {
                    *slot = raw
                        .parse()
                        .map_err(|_| ShellError::InvalidStat(raw.to_string()))?;
                }
                ShellCommand::Send(Request::SetStats(StatSelection {
                    sword_damage: numbers[0],
                    shield_defense: numbers[1],
                    slaying_strength: numbers[2],
                    healing_strength: numbers[3],
                }))
            }
            "stats" => ShellCommand::Send(Request::GetStats),
            "users" => ShellCommand::Send(Request::ListUsers),
            "msg" => {
                let target = words.next().ok_or(ShellError::Usage("msg <user> <text...>"))?;
                let text = words.collect::<Vec<_>>().join(" ");
                if text.is_empty() {
                    return Err(ShellError::Usage("msg <user> <text...>"));
                }
                ShellCommand::Send(Request::P2pMessage {
                    target: target.to_string(),
                    text,
                })
            }
            "attack" => {
                let target = words.next().ok_or(ShellError::Usage("attack <user>"))?;
                ShellCommand::Send(Request::Attack {
                    target: target.to_string(),
                })
            }
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            _ => return Err(ShellError::UnknownCommand(command)),
        };

        Ok(Some(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_hash_password_matches_sha256_hex() {
        assert_eq!(
            hash_password("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
        assert_eq!(hash_password("password").len(), 64);
    }

    #[test]
    fn test_login_hashes_password() {
        let command = assert_ok!(ShellCommand::parse("login alice password"));
        assert_eq!(
            command,
            Some(ShellCommand::Send(Request::Login {
                username: "alice".to_string(),
                password_hash: hash_password("password"),
            }))
        );
    }

    #[test]
    fn test_signup_wire_form() {
        let command = assert_ok!(ShellCommand::parse("  SIGNUP bob hunter2 "));
        match command {
            Some(ShellCommand::Send(request)) => {
                assert_eq!(
                    request.to_string(),
                    format!("SIGNUP bob {}", hash_password("hunter2"))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_setstats() {
        let command = assert_ok!(ShellCommand::parse("setstats 2 1 3 4"));
        match command {
            Some(ShellCommand::Send(request)) => {
                assert_eq!(request.to_string(), "SET_STATS:2,1,3,4")
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            ShellCommand::parse("setstats 2 1 3"),
            Err(ShellError::Usage("setstats <sword> <shield> <slaying> <healing>"))
        );
        assert_eq!(
            ShellCommand::parse("setstats 2 x 3 4"),
            Err(ShellError::InvalidStat("x".to_string()))
        );
        assert_err!(ShellCommand::parse("setstats 2 -1 3 4"));
    }

    #[test]
    fn test_msg_joins_text() {
        let command = assert_ok!(ShellCommand::parse("msg bob hello   there"));
        assert_eq!(
            command,
            Some(ShellCommand::Send(Request::P2pMessage {
                target: "bob".to_string(),
                text: "hello there".to_string(),
            }))
        );
        assert_err!(ShellCommand::parse("msg bob"));
        assert_err!(ShellCommand::parse("msg"));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(
            ShellCommand::parse("logins"),
            Ok(Some(ShellCommand::Send(Request::Logins)))
        );
        assert_eq!(
            ShellCommand::parse("stats"),
            Ok(Some(ShellCommand::Send(Request::GetStats)))
        );
        assert_eq!(
            ShellCommand::parse("users"),
            Ok(Some(ShellCommand::Send(Request::ListUsers)))
        );
        assert_eq!(
            ShellCommand::parse("attack bob"),
            Ok(Some(ShellCommand::Send(Request::Attack {
                target: "bob".to_string()
            })))
        );
        assert_eq!(ShellCommand::parse("help"), Ok(Some(ShellCommand::Help)));
        assert_eq!(ShellCommand::parse("quit"), Ok(Some(ShellCommand::Quit)));
        assert_eq!(ShellCommand::parse("   "), Ok(None));
    }

    #[test]
    fn test_unknown_and_usage_errors() {
        assert_eq!(
            ShellCommand::parse("dance"),
            Err(ShellError::UnknownCommand("dance".to_string()))
        );
        assert_eq!(
            ShellCommand::parse("login alice"),
            Err(ShellError::Usage("login <user> <password>"))
        );
        assert_eq!(
            ShellCommand::parse("attack"),
            Err(ShellError::Usage("attack <user>"))
        );
    }
}
