//! Text wire protocol shared by server and client
//!
//! Every datagram is a single ASCII line. Requests start with a verb token
//! followed by space separated arguments; `SET_STATS` is the exception and
//! carries its values inline as `SET_STATS:<s>,<sh>,<sl>,<h>`. Replies and
//! server pushes use the same layout with a result tag instead of a verb.
//!
//! Parsing never panics. A payload whose first token is not a known verb
//! yields [`ParseError::Unknown`], which the server drops without replying;
//! a known verb with bad arguments yields [`ParseError::Malformed`], which
//! the server answers with the verb's `*_FAIL` tag when it has one.

use crate::{StatBlock, StatSelection};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Command verbs understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Login,
    Signup,
    Logins,
    SetStats,
    GetStats,
    Heartbeat,
    ListUsers,
    P2pMessage,
    Attack,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Login => "LOGIN",
            Verb::Signup => "SIGNUP",
            Verb::Logins => "LOGINS",
            Verb::SetStats => "SET_STATS",
            Verb::GetStats => "GET_STATS",
            Verb::Heartbeat => "HEARTBEAT",
            Verb::ListUsers => "LIST_USERS",
            Verb::P2pMessage => "P2P_MESSAGE",
            Verb::Attack => "ATTACK",
        }
    }

    /// Recognises the first token of a datagram.
    ///
    /// `SET_STATS` matches both bare and with its `:`-delimited suffix.
    pub fn from_token(token: &str) -> Option<Verb> {
        let verb = match token {
            "LOGIN" => Verb::Login,
            "SIGNUP" => Verb::Signup,
            "LOGINS" => Verb::Logins,
            "GET_STATS" => Verb::GetStats,
            "HEARTBEAT" => Verb::Heartbeat,
            "LIST_USERS" => Verb::ListUsers,
            "P2P_MESSAGE" => Verb::P2pMessage,
            "ATTACK" => Verb::Attack,
            t if t == "SET_STATS" || t.starts_with("SET_STATS:") => Verb::SetStats,
            _ => return None,
        };
        Some(verb)
    }

    /// LOGIN and SIGNUP are the only commands accepted without a session.
    pub fn requires_session(&self) -> bool {
        !matches!(self, Verb::Login | Verb::Signup)
    }

    /// Builds the failure reply for this verb, if the verb has one.
    pub fn failure(&self, reason: impl Into<String>) -> Option<Reply> {
        let reason = reason.into();
        let reply = match self {
            Verb::Login => Reply::LoginFail { reason },
            Verb::Signup => Reply::SignupFail { reason },
            Verb::Logins => Reply::LoginsFail { reason },
            Verb::SetStats => Reply::SetStatsFail { reason },
            Verb::GetStats => Reply::GetStatsFail { reason },
            Verb::P2pMessage => Reply::P2pFail { reason },
            Verb::Attack => Reply::AttackFail { reason },
            Verb::Heartbeat | Verb::ListUsers => return None,
        };
        Some(reply)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("malformed {verb} command: {reason}")]
    Malformed { verb: Verb, reason: String },
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

impl ParseError {
    fn malformed(verb: Verb, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            verb,
            reason: reason.into(),
        }
    }
}

/// Splits off the first whitespace-delimited token, returning it and the
/// remainder with leading whitespace removed.
fn split_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(i) => (&input[..i], input[i..].trim_start()),
        None => (input, ""),
    }
}

/// Usernames end up inside `LIST_USERS_SUCCESS` (comma separated) and
/// `P2P_MESSAGE_FROM` (colon terminated), so they may contain neither.
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty() && !name.contains([':', ','])
}

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Login {
        username: String,
        password_hash: String,
    },
    Signup {
        username: String,
        password_hash: String,
    },
    Logins,
    SetStats(StatSelection),
    GetStats,
    Heartbeat,
    ListUsers,
    P2pMessage {
        target: String,
        text: String,
    },
    Attack {
        target: String,
    },
}

impl Request {
    pub fn verb(&self) -> Verb {
        match self {
            Request::Login { .. } => Verb::Login,
            Request::Signup { .. } => Verb::Signup,
            Request::Logins => Verb::Logins,
            Request::SetStats(_) => Verb::SetStats,
            Request::GetStats => Verb::GetStats,
            Request::Heartbeat => Verb::Heartbeat,
            Request::ListUsers => Verb::ListUsers,
            Request::P2pMessage { .. } => Verb::P2pMessage,
            Request::Attack { .. } => Verb::Attack,
        }
    }

    /// Parses one datagram payload. Trailing tokens after a complete
    /// command are ignored.
    pub fn parse(payload: &str) -> Result<Request, ParseError> {
        let (head, rest) = split_token(payload.trim());
        if head.is_empty() {
            return Err(ParseError::Empty);
        }

        let verb = Verb::from_token(head).ok_or_else(|| ParseError::Unknown(head.to_string()))?;

        match verb {
            Verb::Login | Verb::Signup => {
                let mut args = rest.split_whitespace();
                let (username, password_hash) = match (args.next(), args.next()) {
                    (Some(u), Some(p)) => (u.to_string(), p.to_string()),
                    _ => {
                        return Err(ParseError::malformed(
                            verb,
                            format!("Usage: {} <username> <password_hash>", verb),
                        ))
                    }
                };
                if verb == Verb::Login {
                    Ok(Request::Login {
                        username,
                        password_hash,
                    })
                } else {
                    Ok(Request::Signup {
                        username,
                        password_hash,
                    })
                }
            }
            Verb::SetStats => {
                let values = head
                    .strip_prefix("SET_STATS:")
                    .ok_or_else(|| ParseError::malformed(verb, "Missing stat values"))?;
                let selection =
                    StatSelection::from_str(values).map_err(|e| ParseError::malformed(verb, e))?;
                Ok(Request::SetStats(selection))
            }
            Verb::P2pMessage => {
                let (target, text) = split_token(rest);
                let text = text.trim_end();
                if target.is_empty() || text.is_empty() {
                    return Err(ParseError::malformed(
                        verb,
                        "Usage: P2P_MESSAGE <target> <text>",
                    ));
                }
                Ok(Request::P2pMessage {
                    target: target.to_string(),
                    text: text.to_string(),
                })
            }
            Verb::Attack => {
                let (target, _) = split_token(rest);
                if target.is_empty() {
                    return Err(ParseError::malformed(verb, "Usage: ATTACK <target>"));
                }
                Ok(Request::Attack {
                    target: target.to_string(),
                })
            }
            Verb::Logins => Ok(Request::Logins),
            Verb::GetStats => Ok(Request::GetStats),
            Verb::Heartbeat => Ok(Request::Heartbeat),
            Verb::ListUsers => Ok(Request::ListUsers),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Login {
                username,
                password_hash,
            }
            | Request::Signup {
                username,
                password_hash,
            } => write!(f, "{} {} {}", self.verb(), username, password_hash),
            Request::SetStats(selection) => write!(f, "SET_STATS:{}", selection),
            Request::P2pMessage { target, text } => write!(f, "P2P_MESSAGE {} {}", target, text),
            Request::Attack { target } => write!(f, "ATTACK {}", target),
            Request::Logins | Request::GetStats | Request::Heartbeat | Request::ListUsers => {
                f.write_str(self.verb().as_str())
            }
        }
    }
}

/// Battle result as seen by one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleOutcome {
    Win,
    Lose,
    Draw,
}

impl BattleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BattleOutcome::Win => "WIN",
            BattleOutcome::Lose => "LOSE",
            BattleOutcome::Draw => "DRAW",
        }
    }

    /// The same result from the other participant's side.
    pub fn opposite(&self) -> BattleOutcome {
        match self {
            BattleOutcome::Win => BattleOutcome::Lose,
            BattleOutcome::Lose => BattleOutcome::Win,
            BattleOutcome::Draw => BattleOutcome::Draw,
        }
    }
}

impl FromStr for BattleOutcome {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WIN" => Ok(BattleOutcome::Win),
            "LOSE" => Ok(BattleOutcome::Lose),
            "DRAW" => Ok(BattleOutcome::Draw),
            other => Err(ParseError::MalformedReply(format!(
                "unknown battle outcome '{}'",
                other
            ))),
        }
    }
}

/// Server replies and unsolicited pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    LoginSuccess { account_id: String },
    LoginFail { reason: String },
    SignupSuccess { account_id: String },
    SignupFail { reason: String },
    LoginsCount { count: u64 },
    LoginsFail { reason: String },
    SetStatsSuccess,
    SetStatsFail { reason: String },
    GetStatsSuccess { stats: StatBlock },
    GetStatsFail { reason: String },
    ListUsers { usernames: Vec<String> },
    P2pMessageFrom { sender: String, text: String },
    P2pFail { reason: String },
    BattleResult { outcome: BattleOutcome, log: String },
    AttackFail { reason: String },
    Error { text: String },
}

impl Reply {
    pub fn not_logged_in() -> Reply {
        Reply::Error {
            text: "Not logged in".to_string(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Reply::LoginSuccess { .. } => "LOGIN_SUCCESS",
            Reply::LoginFail { .. } => "LOGIN_FAIL",
            Reply::SignupSuccess { .. } => "SIGNUP_SUCCESS",
            Reply::SignupFail { .. } => "SIGNUP_FAIL",
            Reply::LoginsCount { .. } => "LOGINS_COUNT",
            Reply::LoginsFail { .. } => "LOGINS_FAIL",
            Reply::SetStatsSuccess => "SET_STATS_SUCCESS",
            Reply::SetStatsFail { .. } => "SET_STATS_FAIL",
            Reply::GetStatsSuccess { .. } => "GET_STATS_SUCCESS",
            Reply::GetStatsFail { .. } => "GET_STATS_FAIL",
            Reply::ListUsers { .. } => "LIST_USERS_SUCCESS",
            Reply::P2pMessageFrom { .. } => "P2P_MESSAGE_FROM",
            Reply::P2pFail { .. } => "P2P_FAIL",
            Reply::BattleResult { .. } => "BATTLE_RESULT",
            Reply::AttackFail { .. } => "ATTACK_FAIL",
            Reply::Error { .. } => "ERROR",
        }
    }

    pub fn parse(payload: &str) -> Result<Reply, ParseError> {
        let (tag, rest) = split_token(payload.trim());
        let rest = rest.trim_end();
        let bad = |what: &str| ParseError::MalformedReply(format!("{}: {}", tag, what));

        let reply = match tag {
            "" => return Err(ParseError::Empty),
            "LOGIN_SUCCESS" => Reply::LoginSuccess {
                account_id: rest.to_string(),
            },
            "LOGIN_FAIL" => Reply::LoginFail {
                reason: rest.to_string(),
            },
            "SIGNUP_SUCCESS" => Reply::SignupSuccess {
                account_id: rest.to_string(),
            },
            "SIGNUP_FAIL" => Reply::SignupFail {
                reason: rest.to_string(),
            },
            "LOGINS_COUNT" => Reply::LoginsCount {
                count: rest.parse().map_err(|_| bad("invalid count"))?,
            },
            "LOGINS_FAIL" => Reply::LoginsFail {
                reason: rest.to_string(),
            },
            "SET_STATS_SUCCESS" => Reply::SetStatsSuccess,
            "SET_STATS_FAIL" => Reply::SetStatsFail {
                reason: rest.to_string(),
            },
            "GET_STATS_SUCCESS" => Reply::GetStatsSuccess {
                stats: rest.parse().map_err(|e: String| bad(&e))?,
            },
            "GET_STATS_FAIL" => Reply::GetStatsFail {
                reason: rest.to_string(),
            },
            "LIST_USERS_SUCCESS" => Reply::ListUsers {
                usernames: rest
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(String::from)
                    .collect(),
            },
            "P2P_MESSAGE_FROM" => {
                let (sender, text) = rest.split_once(':').ok_or_else(|| bad("missing ':'"))?;
                Reply::P2pMessageFrom {
                    sender: sender.to_string(),
                    text: text.to_string(),
                }
            }
            "P2P_FAIL" => Reply::P2pFail {
                reason: rest.to_string(),
            },
            "BATTLE_RESULT" => {
                let (outcome, log) = rest.split_once(':').ok_or_else(|| bad("missing ':'"))?;
                Reply::BattleResult {
                    outcome: outcome.parse()?,
                    log: log.to_string(),
                }
            }
            "ATTACK_FAIL" => Reply::AttackFail {
                reason: rest.to_string(),
            },
            "ERROR" => Reply::Error {
                text: rest.to_string(),
            },
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(reply)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        match self {
            Reply::LoginSuccess { account_id } | Reply::SignupSuccess { account_id } => {
                write!(f, "{} {}", tag, account_id)
            }
            Reply::LoginFail { reason }
            | Reply::SignupFail { reason }
            | Reply::LoginsFail { reason }
            | Reply::SetStatsFail { reason }
            | Reply::GetStatsFail { reason }
            | Reply::P2pFail { reason }
            | Reply::AttackFail { reason } => write!(f, "{} {}", tag, reason),
            Reply::LoginsCount { count } => write!(f, "{} {}", tag, count),
            Reply::SetStatsSuccess => f.write_str(tag),
            Reply::GetStatsSuccess { stats } => write!(f, "{} {}", tag, stats),
            Reply::ListUsers { usernames } => write!(f, "{} {}", tag, usernames.join(",")),
            Reply::P2pMessageFrom { sender, text } => write!(f, "{} {}:{}", tag, sender, text),
            Reply::BattleResult { outcome, log } => {
                write!(f, "{} {}:{}", tag, outcome.as_str(), log)
            }
            Reply::Error { text } => write!(f, "{} {}", tag, text),
        }
    }
}
