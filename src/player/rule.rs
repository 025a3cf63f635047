// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Declarative rule predicates over the timing state.
//!
//! A rule tests one timing dimension (tick, beat, bar, or part) against
//! a value with an equality, modulo, or threshold comparison, optionally
//! scoped to a single part. A player combines its rules with an OR or
//! AND policy.

use serde::{Deserialize, Serialize};

use crate::timing::PulsePosition;

/// Part value that matches any part
pub const ALL_PARTS: i32 = -1;

/// Timing dimension a rule tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOperator {
    /// Tick counter within the beat
    Tick,
    /// Beat counter within the bar
    Beat,
    /// Bar counter
    Bar,
    /// Part grouping tag
    Part,
}

/// Comparison a rule applies to its dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleComparison {
    /// Dimension equals the value
    Equals,
    /// Dimension is divisible by the value (value 0 never matches)
    Modulo,
    /// Dimension is greater than the value
    Greater,
    /// Dimension is less than the value
    Less,
}

/// How a player combines multiple active rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCombination {
    /// Fire when any active rule matches
    Any,
    /// Fire only when all active rules match
    All,
}

impl Default for RuleCombination {
    fn default() -> Self {
        RuleCombination::Any
    }
}

/// A predicate over the current timing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Timing dimension under test
    pub operator: RuleOperator,
    /// Comparison applied to the dimension
    pub comparison: RuleComparison,
    /// Comparison value
    pub value: u32,
    /// Part this rule is scoped to, or `ALL_PARTS`
    #[serde(default = "default_part")]
    pub part: i32,
    /// Inactive rules never match and never veto
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_part() -> i32 {
    ALL_PARTS
}
fn default_active() -> bool {
    true
}

impl Rule {
    /// Create an active rule matching any part
    pub fn new(operator: RuleOperator, comparison: RuleComparison, value: u32) -> Self {
        Self {
            operator,
            comparison,
            value,
            part: ALL_PARTS,
            active: true,
        }
    }

    /// Scope the rule to a single part
    pub fn for_part(mut self, part: i32) -> Self {
        self.part = part;
        self
    }

    /// Whether this rule matches the given position.
    ///
    /// Inactive rules never match; a rule scoped to a part other than
    /// the current one never matches.
    pub fn matches(&self, pos: &PulsePosition) -> bool {
        if !self.active {
            return false;
        }
        if self.part != ALL_PARTS && self.part != pos.part as i32 {
            return false;
        }

        let subject = match self.operator {
            RuleOperator::Tick => pos.tick as u64,
            RuleOperator::Beat => pos.beat as u64,
            RuleOperator::Bar => pos.bar,
            RuleOperator::Part => pos.part as u64,
        };
        let value = self.value as u64;

        match self.comparison {
            RuleComparison::Equals => subject == value,
            RuleComparison::Modulo => value != 0 && subject % value == 0,
            RuleComparison::Greater => subject > value,
            RuleComparison::Less => subject < value,
        }
    }
}

/// Evaluate a rule set under the given combination policy.
///
/// With no active rules the player has nothing to fire on, so the
/// result is false under either policy.
pub fn rules_match(rules: &[Rule], combination: RuleCombination, pos: &PulsePosition) -> bool {
    let mut active = rules.iter().filter(|rule| rule.active).peekable();
    if active.peek().is_none() {
        return false;
    }
    match combination {
        RuleCombination::Any => active.any(|rule| rule.matches(pos)),
        RuleCombination::All => active.all(|rule| rule.matches(pos)),
    }
}
