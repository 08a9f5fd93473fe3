//! Terminal output shared between the prompt and the listener task

use shared::Reply;
use std::io::{self, Write};
use std::sync::Mutex;

pub const PROMPT: &str = "> ";

/// Serializes writes so pushes never interleave with the prompt
pub struct Console {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Console {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    fn write(&self, text: &str) {
        // A poisoned lock only means another writer panicked mid-line
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
            log::warn!("Console write failed: {}", e);
        }
    }

    pub fn prompt(&self) {
        self.write(PROMPT);
    }

    /// Prints command output followed by a fresh prompt
    pub fn line(&self, text: &str) {
        self.write(&format!("{}\n{}", text, PROMPT));
    }

    /// Prints an asynchronous message over the current prompt line
    pub fn push(&self, text: &str) {
        self.write(&format!("\r\x1b[K{}\n{}", text, PROMPT));
    }
}

/// Human readable rendering of a server reply
pub fn describe(reply: &Reply) -> String {
    match reply {
        Reply::LoginSuccess { account_id } => format!("Logged in (account {})", account_id),
        Reply::LoginFail { reason } => format!("Login failed: {}", reason),
        Reply::SignupSuccess { account_id } => {
            format!("Signed up as account {}, you can now log in", account_id)
        }
        Reply::SignupFail { reason } => format!("Sign-up failed: {}", reason),
        Reply::LoginsCount { count } => format!("You have logged in {} time(s)", count),
        Reply::LoginsFail { reason } => format!("Could not read login count: {}", reason),
        Reply::SetStatsSuccess => "Stats saved".to_string(),
        Reply::SetStatsFail { reason } => format!("Could not save stats: {}", reason),
        Reply::GetStatsSuccess { stats } => format!(
            "Sword {} | Shield {} | Slaying potion {} | Healing potion {} | Health {}",
            stats.sword_damage,
            stats.shield_defense,
            stats.slaying_strength,
            stats.healing_strength,
            stats.health
        ),
        Reply::GetStatsFail { reason } => format!("Could not read stats: {}", reason),
        Reply::ListUsers { usernames } if usernames.is_empty() => "Nobody is online".to_string(),
        Reply::ListUsers { usernames } => format!("Online: {}", usernames.join(", ")),
        Reply::P2pMessageFrom { sender, text } => format!("[{}] {}", sender, text),
        Reply::P2pFail { reason } => format!("Message not delivered: {}", reason),
        Reply::BattleResult { outcome, log } => format!("Battle {}: {}", outcome.as_str(), log),
        Reply::AttackFail { reason } => format!("Attack failed: {}", reason),
        Reply::Error { text } => format!("Server error: {}", text),
    }
}
