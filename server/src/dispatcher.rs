//! Command dispatch and the per-address protocol state machine
//!
//! Each datagram is parsed into a [`Request`], checked against the session
//! table and routed to a handler. Handlers never touch the socket; they
//! return the datagrams to send and the server loop delivers them.
//!
//! An address is either unauthenticated (no session) or authenticated.
//! LOGIN and SIGNUP work in both states. Everything else needs a session
//! and otherwise gets `ERROR Not logged in` and nothing more. Unknown verbs
//! get no reply at all.

use crate::battle::{self, Combatant, Side};
use crate::session::{PlayerSnapshot, SessionTable};
use crate::store::{AccountId, AccountStore, StoreError};
use log::{debug, error, info, warn};
use shared::{
    is_valid_username, ParseError, Reply, Request, StatBlock, StatSelection, DEFAULT_HEALTH,
    MAX_BATTLE_TURNS,
};
use std::net::SocketAddr;
use std::time::Instant;

/// A reply addressed to one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub addr: SocketAddr,
    pub reply: Reply,
}

impl Outbound {
    pub fn new(addr: SocketAddr, reply: Reply) -> Self {
        Self { addr, reply }
    }
}

fn reply_to(addr: SocketAddr, reply: Reply) -> Vec<Outbound> {
    vec![Outbound::new(addr, reply)]
}

pub struct Dispatcher {
    store: AccountStore,
    sessions: SessionTable,
}

impl Dispatcher {
    pub fn new(store: AccountStore, sessions: SessionTable) -> Self {
        Self { store, sessions }
    }

    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Evicts idle sessions and returns how many were removed
    pub fn sweep(&mut self, now: Instant) -> usize {
        self.sessions.sweep(now).len()
    }

    /// Handles one datagram from `from` and returns the replies to send
    pub fn handle(&mut self, payload: &str, from: SocketAddr, now: Instant) -> Vec<Outbound> {
        let request = match Request::parse(payload) {
            Ok(request) => request,
            Err(ParseError::Malformed { verb, reason }) => {
                if verb.requires_session() && !self.sessions.touch(&from, now) {
                    return reply_to(from, Reply::not_logged_in());
                }
                warn!("Malformed {} from {}: {}", verb, from, reason);
                return verb
                    .failure(reason)
                    .map(|reply| Outbound::new(from, reply))
                    .into_iter()
                    .collect();
            }
            Err(ParseError::Empty) => {
                debug!("Ignoring empty datagram from {}", from);
                return Vec::new();
            }
            Err(e) => {
                warn!("Ignoring datagram from {}: {}", from, e);
                return Vec::new();
            }
        };

        let verb = request.verb();
        if verb.requires_session() && !self.sessions.touch(&from, now) {
            info!("{} from {} without a session", verb, from);
            return reply_to(from, Reply::not_logged_in());
        }

        match request {
            Request::Login {
                username,
                password_hash,
            } => self.login(from, &username, &password_hash, now),
            Request::Signup {
                username,
                password_hash,
            } => self.signup(from, &username, &password_hash),
            Request::Logins => self.logins(from),
            Request::SetStats(selection) => self.set_stats(from, selection),
            Request::GetStats => self.get_stats(from),
            Request::Heartbeat => {
                debug!("Heartbeat from {}", from);
                Vec::new()
            }
            Request::ListUsers => reply_to(
                from,
                Reply::ListUsers {
                    usernames: self.sessions.usernames(),
                },
            ),
            Request::P2pMessage { target, text } => self.relay(from, &target, text),
            Request::Attack { target } => self.attack(from, &target),
        }
    }

    /// Account bound to an address that already passed the session check
    fn account_of(&self, addr: &SocketAddr) -> Option<(AccountId, String)> {
        self.sessions
            .get(addr)
            .map(|s| (s.account_id.clone(), s.player.username.clone()))
    }

    fn login(
        &mut self,
        from: SocketAddr,
        username: &str,
        password_hash: &str,
        now: Instant,
    ) -> Vec<Outbound> {
        let Some(id) = self.store.find_by_credentials(username, password_hash) else {
            warn!("Failed login attempt for {} from {}", username, from);
            return reply_to(
                from,
                Reply::LoginFail {
                    reason: "Invalid credentials".to_string(),
                },
            );
        };

        let player = PlayerSnapshot {
            username: self.store.username_of(&id).unwrap_or(username).to_string(),
            stats: self.store.get_stats(&id),
        };
        self.sessions.login(from, id.clone(), player, now);

        if let Err(e) = self.store.increment_login_count(&id) {
            error!("Could not count login for {}: {}", id, e);
        }
        info!("Player {} (ID: {}) logged in from {}", username, id, from);

        reply_to(from, Reply::LoginSuccess { account_id: id })
    }

    fn signup(&mut self, from: SocketAddr, username: &str, password_hash: &str) -> Vec<Outbound> {
        if !is_valid_username(username) {
            warn!("Rejected signup from {} for username {:?}", from, username);
            return reply_to(
                from,
                Reply::SignupFail {
                    reason: "Username may not contain ':' or ','".to_string(),
                },
            );
        }

        let reply = match self.store.create(username, password_hash) {
            Ok(id) => {
                info!("New player {} signed up with ID {}", username, id);
                Reply::SignupSuccess { account_id: id }
            }
            Err(StoreError::UsernameTaken(_)) => {
                warn!("Failed signup from {}, username {} already exists", from, username);
                Reply::SignupFail {
                    reason: "Username taken".to_string(),
                }
            }
            Err(e) => {
                error!("Signup for {} failed: {}", username, e);
                Reply::SignupFail {
                    reason: "Internal error".to_string(),
                }
            }
        };
        reply_to(from, reply)
    }

    fn logins(&mut self, from: SocketAddr) -> Vec<Outbound> {
        let count = self
            .account_of(&from)
            .and_then(|(id, _)| self.store.login_count(&id));

        let reply = match count {
            Some(count) => Reply::LoginsCount { count },
            None => Reply::LoginsFail {
                reason: "Account not found".to_string(),
            },
        };
        reply_to(from, reply)
    }

    fn set_stats(&mut self, from: SocketAddr, selection: StatSelection) -> Vec<Outbound> {
        let Some((id, username)) = self.account_of(&from) else {
            return reply_to(from, Reply::not_logged_in());
        };

        // Health is only seeded on the first selection
        let health = self
            .store
            .get_stats(&id)
            .map(|stats| stats.health)
            .unwrap_or(DEFAULT_HEALTH);
        let stats = StatBlock::new(selection, health);

        let reply = match self.store.set_stats(&id, stats) {
            Ok(()) => {
                self.sessions.refresh_stats(&id, Some(stats));
                info!("Updated stats for player {} (ID: {})", username, id);
                Reply::SetStatsSuccess
            }
            Err(e) => {
                error!("Could not set stats for {}: {}", id, e);
                Reply::SetStatsFail {
                    reason: e.to_string(),
                }
            }
        };
        reply_to(from, reply)
    }

    fn get_stats(&mut self, from: SocketAddr) -> Vec<Outbound> {
        let Some((id, _)) = self.account_of(&from) else {
            return reply_to(from, Reply::not_logged_in());
        };

        let reply = match self.store.get_stats(&id) {
            Some(stats) => {
                self.sessions.refresh_stats(&id, Some(stats));
                Reply::GetStatsSuccess { stats }
            }
            None => Reply::GetStatsFail {
                reason: "No stats set".to_string(),
            },
        };
        reply_to(from, reply)
    }

    fn relay(&mut self, from: SocketAddr, target: &str, text: String) -> Vec<Outbound> {
        let Some((_, sender)) = self.account_of(&from) else {
            return reply_to(from, Reply::not_logged_in());
        };

        match self.sessions.find_by_username(target) {
            Some(session) => {
                debug!("Relaying message from {} to {}", sender, target);
                reply_to(session.addr, Reply::P2pMessageFrom { sender, text })
            }
            None => reply_to(
                from,
                Reply::P2pFail {
                    reason: "User not online".to_string(),
                },
            ),
        }
    }

    fn attack(&mut self, from: SocketAddr, target: &str) -> Vec<Outbound> {
        let fail = |reason: &str| {
            reply_to(
                from,
                Reply::AttackFail {
                    reason: reason.to_string(),
                },
            )
        };

        let Some((attacker_id, attacker_name)) = self.account_of(&from) else {
            return reply_to(from, Reply::not_logged_in());
        };
        let Some(defender) = self.sessions.find_by_username(target) else {
            return fail("target not online");
        };
        let (defender_id, defender_addr, defender_name) = (
            defender.account_id.clone(),
            defender.addr,
            defender.player.username.clone(),
        );
        if defender_id == attacker_id {
            return fail("cannot attack yourself");
        }

        // Stats come from the store, not the session cache
        let Some(attacker_stats) = self.store.get_stats(&attacker_id) else {
            return fail("no stats set");
        };
        let Some(defender_stats) = self.store.get_stats(&defender_id) else {
            return fail("target has no stats set");
        };
        if !attacker_stats.is_alive() {
            return fail("no lives left");
        }
        if !defender_stats.is_alive() {
            return fail("target has no lives left");
        }

        let report = battle::resolve(
            Combatant::from_stats(&attacker_name, &attacker_stats),
            Combatant::from_stats(&defender_name, &defender_stats),
            MAX_BATTLE_TURNS,
        );
        info!(
            "Battle {} vs {}: {:?} after {} turns",
            attacker_name,
            defender_name,
            report.verdict,
            report.turns.len()
        );

        let sides = match report.loser() {
            Some(loser) => vec![loser],
            None => vec![Side::Attacker, Side::Defender],
        };
        for side in sides {
            let (id, stats) = match side {
                Side::Attacker => (&attacker_id, attacker_stats),
                Side::Defender => (&defender_id, defender_stats),
            };
            let updated = StatBlock {
                health: report.combatant(side).stored_health(),
                ..stats
            };
            if let Err(e) = self.store.set_stats(id, updated) {
                error!("Could not store battle result for {}: {}", id, e);
            }
            self.sessions.refresh_stats(id, Some(updated));
        }

        let log = report.log();
        vec![
            Outbound::new(
                from,
                Reply::BattleResult {
                    outcome: report.outcome_for(Side::Attacker),
                    log: log.clone(),
                },
            ),
            Outbound::new(
                defender_addr,
                Reply::BattleResult {
                    outcome: report.outcome_for(Side::Defender),
                    log,
                },
            ),
        ]
    }
}
