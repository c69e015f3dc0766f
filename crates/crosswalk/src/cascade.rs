//! Tier priority as data.
//!
//! A [`Cascade`] is the ordered list of tiers a record walks through. Every
//! record starts [`MatchState::Unmatched`]; the first tier that yields a
//! candidate moves it to [`MatchState::Matched`], and running out of tiers
//! moves it to [`MatchState::Unresolved`]. Both are absorbing.

use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::code::MAX_WIDTH;
use crate::error::CrosswalkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TierMethod {
    /// Same-vocabulary dictionary hit.
    Exact,
    /// Cross-vocabulary hit through the correspondence bridge.
    Bridge,
}

impl std::fmt::Display for TierMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Bridge => write!(f, "bridge"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tier {
    pub method: TierMethod,
    /// Resolution in digits.
    pub level: usize,
}

impl Tier {
    pub const fn exact(level: usize) -> Self {
        Self {
            method: TierMethod::Exact,
            level,
        }
    }

    pub const fn bridge(level: usize) -> Self {
        Self {
            method: TierMethod::Bridge,
            level,
        }
    }

    /// Exact hits at the finest resolution are measured; everything else is inferred.
    pub fn is_measured(&self, finest: usize) -> bool {
        self.method == TierMethod::Exact && self.level == finest
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-L{}", self.method, self.level)
    }
}

/// Accepts `exact:4`, `bridge:3` and the display form `exact-L4`.
impl FromStr for Tier {
    type Err = CrosswalkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CrosswalkError::ConfigValidation(format!("invalid cascade tier '{s}'"));
        let (method, level) = s
            .split_once(':')
            .or_else(|| s.split_once("-L"))
            .ok_or_else(bad)?;
        let method = match method.trim() {
            "exact" => TierMethod::Exact,
            "bridge" => TierMethod::Bridge,
            _ => return Err(bad()),
        };
        let level: usize = level.trim().parse().map_err(|_| bad())?;
        Ok(Tier { method, level })
    }
}

impl Serialize for Tier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchState {
    Unmatched,
    Matched(Tier),
    Unresolved,
}

impl MatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unmatched)
    }

    /// Transition for the outcome of one tier. Terminal states absorb.
    pub fn after(self, tier: Tier, hit: bool) -> MatchState {
        match self {
            Self::Unmatched if hit => Self::Matched(tier),
            other => other,
        }
    }

    /// Transition once the cascade has no tiers left.
    pub fn exhausted(self) -> MatchState {
        match self {
            Self::Unmatched => Self::Unresolved,
            other => other,
        }
    }
}

impl std::fmt::Display for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmatched => write!(f, "unmatched"),
            Self::Matched(tier) => write!(f, "{tier}"),
            Self::Unresolved => write!(f, "unresolved"),
        }
    }
}

impl Serialize for MatchState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

/// Ordered tier table, finest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cascade {
    tiers: Vec<Tier>,
}

impl Cascade {
    /// Exact at every level from `width` down to 1, with a bridge tier after
    /// the exact tier of the two finest levels. For width 4:
    /// `exact-L4, bridge-L4, exact-L3, bridge-L3, exact-L2, exact-L1`.
    pub fn standard(width: usize, with_bridge: bool) -> Self {
        let mut tiers = Vec::new();
        for level in (1..=width).rev() {
            tiers.push(Tier::exact(level));
            if with_bridge && level + 2 > width && level > 1 {
                tiers.push(Tier::bridge(level));
            }
        }
        Self { tiers }
    }

    /// Validated custom cascade.
    pub fn new(tiers: Vec<Tier>, width: usize, with_bridge: bool) -> Result<Self, CrosswalkError> {
        if tiers.is_empty() {
            return Err(CrosswalkError::ConfigValidation("cascade has no tiers".into()));
        }
        if width == 0 || width > MAX_WIDTH {
            return Err(CrosswalkError::ConfigValidation(format!(
                "code width must be between 1 and {MAX_WIDTH}, got {width}"
            )));
        }
        for (i, tier) in tiers.iter().enumerate() {
            if tier.level == 0 || tier.level > width {
                return Err(CrosswalkError::ConfigValidation(format!(
                    "tier {tier} outside 1..={width} digits"
                )));
            }
            if tier.method == TierMethod::Bridge && !with_bridge {
                return Err(CrosswalkError::ConfigValidation(format!(
                    "tier {tier} needs a [bridge] table"
                )));
            }
            if tiers[..i].contains(tier) {
                return Err(CrosswalkError::ConfigValidation(format!(
                    "tier {tier} listed twice"
                )));
            }
            if i > 0 && tiers[i - 1].level < tier.level {
                return Err(CrosswalkError::ConfigValidation(format!(
                    "tier {tier} comes after coarser tier {}; levels must not increase",
                    tiers[i - 1]
                )));
            }
        }
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.tiers.iter().map(Tier::to_string).collect()
    }

    pub fn uses_bridge(&self) -> bool {
        self.tiers.iter().any(|t| t.method == TierMethod::Bridge)
    }

    /// Walk the tiers with `attempt` until one succeeds. Returns the terminal
    /// state plus the successful attempt's payload.
    pub fn run<T>(&self, mut attempt: impl FnMut(Tier) -> Option<T>) -> (MatchState, Option<T>) {
        let mut state = MatchState::Unmatched;
        for &tier in &self.tiers {
            let found = attempt(tier);
            state = state.after(tier, found.is_some());
            if found.is_some() {
                return (state, found);
            }
        }
        (state.exhausted(), None)
    }
}
