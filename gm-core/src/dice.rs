//! Dice rolling and notation parsing.
//!
//! All default entry points draw from the operating system's
//! cryptographically secure random source. Neither the narrating model nor
//! a client can predict or bias a roll; the generic `_with` variants exist
//! so tests can substitute a seeded generator.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Roll a single die, returning a uniform integer in `[1, sides]`.
pub fn roll_die(sides: u32) -> u32 {
    roll_die_with(&mut OsRng, sides)
}

/// Roll a single die with a caller-provided RNG.
pub fn roll_die_with<R: Rng>(rng: &mut R, sides: u32) -> u32 {
    let sides = sides.max(1);
    rng.gen_range(1..=sides)
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }
}

/// A d20 roll, possibly made as an advantage/disadvantage pair.
///
/// `rolls` holds every raw die rolled (one or two entries); `natural` is
/// the die that counts, before any modifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct D20Roll {
    pub rolls: Vec<u32>,
    pub natural: u32,
    pub advantage: Advantage,
}

impl D20Roll {
    pub fn is_natural_20(&self) -> bool {
        self.natural == 20
    }

    pub fn is_natural_1(&self) -> bool {
        self.natural == 1
    }
}

/// Roll a d20 under the given advantage state.
pub fn roll_d20(advantage: Advantage) -> D20Roll {
    roll_d20_with(&mut OsRng, advantage)
}

/// Roll a d20 with a caller-provided RNG.
pub fn roll_d20_with<R: Rng>(rng: &mut R, advantage: Advantage) -> D20Roll {
    match advantage {
        Advantage::Normal => {
            let roll = roll_die_with(rng, 20);
            D20Roll {
                rolls: vec![roll],
                natural: roll,
                advantage,
            }
        }
        Advantage::Advantage | Advantage::Disadvantage => {
            let first = roll_die_with(rng, 20);
            let second = roll_die_with(rng, 20);
            let natural = match advantage {
                Advantage::Advantage => first.max(second),
                _ => first.min(second),
            };
            D20Roll {
                rolls: vec![first, second],
                natural,
                advantage,
            }
        }
    }
}

/// Roll two d20s and keep the higher; both raw rolls are reported.
pub fn roll_with_advantage() -> D20Roll {
    roll_d20(Advantage::Advantage)
}

/// Roll two d20s and keep the lower; both raw rolls are reported.
pub fn roll_with_disadvantage() -> D20Roll {
    roll_d20(Advantage::Disadvantage)
}

/// Parsed dice notation: `count` dice of `sides` plus a signed modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceNotation {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceNotation {
    pub const D20: DiceNotation = DiceNotation {
        count: 1,
        sides: 20,
        modifier: 0,
    };

    /// Parse notation like `"2d6+3"`, `"d20"`, or `"1d8-1"`.
    ///
    /// Parsing is deliberately lenient: anything malformed falls back to a
    /// single d20 rather than failing, so a garbled request from the model
    /// still produces a roll the table can see.
    pub fn parse(notation: &str) -> DiceNotation {
        Self::try_parse(notation).unwrap_or(Self::D20)
    }

    fn try_parse(notation: &str) -> Option<DiceNotation> {
        let notation = notation.trim().to_lowercase().replace(' ', "");
        let d_pos = notation.find('d')?;

        let count: u32 = if notation[..d_pos].is_empty() {
            1
        } else {
            notation[..d_pos].parse().ok()?
        };

        let rest = &notation[d_pos + 1..];
        let (sides_str, modifier) = if let Some(sign_pos) = rest.find(|c| c == '+' || c == '-') {
            let modifier: i32 = rest[sign_pos..].parse().ok()?;
            (&rest[..sign_pos], modifier)
        } else {
            (rest, 0)
        };
        let sides: u32 = sides_str.parse().ok()?;

        if count == 0 || sides == 0 || count > 100 || sides > 1000 {
            return None;
        }

        Some(DiceNotation {
            count,
            sides,
            modifier,
        })
    }

    /// Roll this notation, summing every die and adding the modifier.
    pub fn roll(&self) -> NotationRoll {
        self.roll_with(&mut OsRng)
    }

    /// Roll with a caller-provided RNG.
    pub fn roll_with<R: Rng>(&self, rng: &mut R) -> NotationRoll {
        let rolls: Vec<u32> = (0..self.count)
            .map(|_| roll_die_with(rng, self.sides))
            .collect();
        let dice_total: i32 = rolls.iter().map(|&r| r as i32).sum();
        NotationRoll {
            notation: *self,
            rolls,
            total: dice_total + self.modifier,
        }
    }

    /// Roll only the dice portion, ignoring the modifier. Used for the
    /// extra dice of a critical hit.
    pub fn roll_dice_only(&self) -> NotationRoll {
        DiceNotation {
            modifier: 0,
            ..*self
        }
        .roll()
    }
}

impl fmt::Display for DiceNotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier.cmp(&0) {
            std::cmp::Ordering::Greater => write!(f, "+{}", self.modifier),
            std::cmp::Ordering::Less => write!(f, "{}", self.modifier),
            std::cmp::Ordering::Equal => Ok(()),
        }
    }
}

/// The result of rolling a dice notation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotationRoll {
    pub notation: DiceNotation,
    pub rolls: Vec<u32>,
    pub total: i32,
}

impl fmt::Display for NotationRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dice: Vec<String> = self.rolls.iter().map(|r| r.to_string()).collect();
        write!(f, "{} [{}] = {}", self.notation, dice.join(", "), self.total)
    }
}

/// Convenience wrapper: parse notation (leniently) and roll it.
pub fn roll(notation: &str) -> NotationRoll {
    DiceNotation::parse(notation).roll()
}
