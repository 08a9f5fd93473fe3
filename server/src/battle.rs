//! Turn-based battle resolution
//!
//! A battle is a pure function of two stat snapshots: the attacker strikes
//! first, turns alternate, and each strike deals `max(0, sword - shield)`.
//! The fight stops as soon as either side drops to zero health or after a
//! fixed number of turns, whichever comes first.

use shared::{BattleOutcome, StatBlock};

/// One side of a battle, copied from the account store at battle start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combatant {
    pub name: String,
    pub sword: i64,
    pub shield: i64,
    pub health: i64,
}

impl Combatant {
    pub fn new(name: &str, sword: i64, shield: i64, health: i64) -> Self {
        Self {
            name: name.to_string(),
            sword,
            shield,
            health,
        }
    }

    pub fn from_stats(name: &str, stats: &StatBlock) -> Self {
        Self::new(
            name,
            i64::from(stats.sword_damage),
            i64::from(stats.shield_defense),
            i64::from(stats.health),
        )
    }

    pub fn is_down(&self) -> bool {
        self.health <= 0
    }

    /// Health as it may be stored: never below zero
    pub fn stored_health(&self) -> u32 {
        self.health.clamp(0, i64::from(u32::MAX)) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Attacker,
    Defender,
}

/// A single strike
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnEvent {
    pub turn: u32,
    pub striker: Side,
    pub damage: i64,
    /// Health of the struck side after this turn
    pub remaining_health: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    AttackerWins,
    DefenderWins,
    Draw,
}

#[derive(Debug, Clone)]
pub struct BattleReport {
    pub verdict: Verdict,
    pub turns: Vec<TurnEvent>,
    /// Attacker state after the final turn
    pub attacker: Combatant,
    /// Defender state after the final turn
    pub defender: Combatant,
}

/// Damage dealt by one strike; shields never heal
pub fn damage(sword: i64, shield: i64) -> i64 {
    (sword - shield).max(0)
}

/// Runs the battle to completion
pub fn resolve(attacker: Combatant, defender: Combatant, max_turns: u32) -> BattleReport {
    let mut attacker = attacker;
    let mut defender = defender;
    let mut turns = Vec::new();

    for turn in 1..=max_turns {
        if attacker.is_down() || defender.is_down() {
            break;
        }

        let (striker, struck, side) = if turn % 2 == 1 {
            (&attacker, &mut defender, Side::Attacker)
        } else {
            (&defender, &mut attacker, Side::Defender)
        };

        let dealt = damage(striker.sword, struck.shield);
        struck.health -= dealt;
        turns.push(TurnEvent {
            turn,
            striker: side,
            damage: dealt,
            remaining_health: struck.health,
        });
    }

    let verdict = if attacker.is_down() {
        Verdict::DefenderWins
    } else if defender.is_down() {
        Verdict::AttackerWins
    } else {
        Verdict::Draw
    };

    BattleReport {
        verdict,
        turns,
        attacker,
        defender,
    }
}

impl BattleReport {
    /// Result tag from the point of view of `side`
    pub fn outcome_for(&self, side: Side) -> BattleOutcome {
        let attacker_view = match self.verdict {
            Verdict::AttackerWins => BattleOutcome::Win,
            Verdict::DefenderWins => BattleOutcome::Lose,
            Verdict::Draw => BattleOutcome::Draw,
        };
        match side {
            Side::Attacker => attacker_view,
            Side::Defender => attacker_view.opposite(),
        }
    }

    /// The side whose health must be written back, `None` on a draw
    pub fn loser(&self) -> Option<Side> {
        match self.verdict {
            Verdict::AttackerWins => Some(Side::Defender),
            Verdict::DefenderWins => Some(Side::Attacker),
            Verdict::Draw => None,
        }
    }

    pub fn combatant(&self, side: Side) -> &Combatant {
        match side {
            Side::Attacker => &self.attacker,
            Side::Defender => &self.defender,
        }
    }

    /// Human readable turn-by-turn account, single line
    pub fn log(&self) -> String {
        let mut lines: Vec<String> = self
            .turns
            .iter()
            .map(|event| {
                let (striker, struck) = match event.striker {
                    Side::Attacker => (&self.attacker, &self.defender),
                    Side::Defender => (&self.defender, &self.attacker),
                };
                format!(
                    "Turn {}: {} hits {} for {} damage ({} health {})",
                    event.turn,
                    striker.name,
                    struck.name,
                    event.damage,
                    struck.name,
                    event.remaining_health.max(0)
                )
            })
            .collect();

        lines.push(match self.verdict {
            Verdict::AttackerWins => format!("{} wins", self.attacker.name),
            Verdict::DefenderWins => format!("{} wins", self.defender.name),
            Verdict::Draw => format!("Draw after {} turns", self.turns.len()),
        });
        lines.join(" | ")
    }
}
