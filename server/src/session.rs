//! Session tracking for authenticated client addresses
//!
//! This module handles the server-side view of who is logged in, including:
//! - Session lifecycle (login, supersede, idle eviction)
//! - Activity tracking for the timeout sweeper
//! - Username lookups used by the relay and battle commands
//!
//! Sessions are transient. They are rebuilt from the account store on every
//! LOGIN and never persisted.

use crate::store::AccountId;
use log::info;
use shared::StatBlock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Snapshot of the player taken when the session was created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub username: String,
    pub stats: Option<StatBlock>,
}

/// A logged-in client address and the account bound to it
#[derive(Debug, Clone)]
pub struct Session {
    /// Network address replies are sent to
    pub addr: SocketAddr,
    pub account_id: AccountId,
    /// Display cache loaded at LOGIN, refreshed by stat commands
    pub player: PlayerSnapshot,
    /// Last time any authenticated command arrived from this address
    pub last_activity: Instant,
}

impl Session {
    pub fn new(
        addr: SocketAddr,
        account_id: AccountId,
        player: PlayerSnapshot,
        now: Instant,
    ) -> Self {
        Self {
            addr,
            account_id,
            player,
            last_activity: now,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Returns true if the session has been silent for longer than `ttl`
    pub fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > ttl
    }
}

/// All live sessions keyed by client address
///
/// A single address holds at most one session; logging in again from the
/// same address replaces the previous one.
pub struct SessionTable {
    sessions: HashMap<SocketAddr, Session>,
    ttl: Duration,
}

impl SessionTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    /// Creates or replaces the session for `addr`
    ///
    /// Returns the superseded session, if the address was already logged in.
    pub fn login(
        &mut self,
        addr: SocketAddr,
        account_id: AccountId,
        player: PlayerSnapshot,
        now: Instant,
    ) -> Option<Session> {
        let username = player.username.clone();
        let previous = self
            .sessions
            .insert(addr, Session::new(addr, account_id, player, now));

        match &previous {
            Some(old) => info!(
                "Session at {} switched from {} to {}",
                addr, old.player.username, username
            ),
            None => info!("Session opened for {} from {}", username, addr),
        }
        previous
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Session> {
        self.sessions.get(addr)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.sessions.contains_key(addr)
    }

    /// Refreshes the activity timestamp. Returns false if there is no session.
    pub fn touch(&mut self, addr: &SocketAddr, now: Instant) -> bool {
        match self.sessions.get_mut(addr) {
            Some(session) => {
                session.touch(now);
                true
            }
            None => false,
        }
    }

    /// Finds a live session by the cached username
    pub fn find_by_username(&self, username: &str) -> Option<&Session> {
        self.sessions
            .values()
            .find(|session| session.player.username == username)
    }

    /// Replaces the cached stats of every session bound to `account_id`
    pub fn refresh_stats(&mut self, account_id: &AccountId, stats: Option<StatBlock>) {
        for session in self
            .sessions
            .values_mut()
            .filter(|s| &s.account_id == account_id)
        {
            session.player.stats = stats;
        }
    }

    /// Usernames of all live sessions, sorted and de-duplicated
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sessions
            .values()
            .map(|s| s.player.username.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Evicts sessions idle for longer than the TTL
    ///
    /// Eviction is silent: nothing is sent to the evicted peer. Returns the
    /// removed sessions so the caller can log them.
    pub fn sweep(&mut self, now: Instant) -> Vec<Session> {
        let ttl = self.ttl;
        let expired: Vec<SocketAddr> = self
            .sessions
            .values()
            .filter(|session| session.is_idle(now, ttl))
            .map(|session| session.addr)
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for addr in expired {
            if let Some(session) = self.sessions.remove(&addr) {
                info!(
                    "Session for {} at {} timed out",
                    session.player.username, addr
                );
                evicted.push(session);
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
