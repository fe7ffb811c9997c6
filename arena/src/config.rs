//! Match templates and engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DEFAULT_PROMPTS;

/// A named roster shape used at match creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchTemplate {
    /// Template name
    pub name: String,
    /// Total seats in the roster
    pub total_participants: usize,
    /// Seats reserved for humans; the rest auto-fill with automated players
    pub human_quota: usize,
    /// Rounds to play
    pub total_rounds: u32,
}

impl MatchTemplate {
    /// The default template: 4 seats, 2 human, 5 rounds
    pub fn classic() -> Self {
        Self {
            name: "classic".to_string(),
            total_participants: 4,
            human_quota: 2,
            total_rounds: 5,
        }
    }
}

impl Default for MatchTemplate {
    fn default() -> Self {
        Self::classic()
    }
}

/// Configuration shared by the engine and the coordinator
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Roster shape for new matches
    pub template: MatchTemplate,
    /// Prompt rotation, indexed by `(round - 1) % len`
    pub prompts: Vec<String>,
    /// Fixed stagger between automated generation calls: the nth automated
    /// seat waits `n * stagger_step` before calling the generation port
    pub stagger_step: Duration,
    /// Upper bound on a single generation call before falling back
    pub generation_timeout: Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            template: MatchTemplate::classic(),
            prompts: DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
            stagger_step: Duration::from_secs(2),
            generation_timeout: Duration::from_secs(30),
        }
    }
}

impl MatchConfig {
    /// A config with no stagger and no patience, for tests and simulations
    pub fn immediate() -> Self {
        Self {
            stagger_step: Duration::ZERO,
            generation_timeout: Duration::from_millis(250),
            ..Self::default()
        }
    }
}
