//! Roster material: the prompt rotation and the automated personality pool

use serde::{Deserialize, Serialize};

/// Prompts cycled across rounds. Repeats in very long matches are an
/// accepted tradeoff of the fixed rotation.
pub const DEFAULT_PROMPTS: &[&str] = &[
    "What's the most overrated food, and why?",
    "Describe your perfect lazy Sunday.",
    "What's a small thing that always makes your day better?",
    "If you could instantly master one skill, what would it be?",
    "What's the strangest thing you believed as a kid?",
    "What smell takes you straight back to childhood?",
    "What's a hill you're willing to die on?",
    "If animals could talk, which species would be the rudest?",
];

/// The prompt for a 1-based round number, cycling the fixed list
pub fn prompt_for_round(prompts: &[String], round_number: u32) -> String {
    let idx = (round_number as usize - 1) % prompts.len();
    prompts[idx].clone()
}

/// Personality assigned to an automated seat.
///
/// Drawn round-robin from the fixed pool as seats are auto-filled, cycling
/// once the pool is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    /// Dry, precise, allergic to exclamation marks
    Analyst,
    /// Always angling for the joke
    Comedian,
    /// Short answers, no enthusiasm
    Skeptic,
    /// Long-winded and tangential
    Rambler,
    /// Earnest and a little too sincere
    Enthusiast,
}

impl Personality {
    /// The fixed pool, in assignment order
    pub fn pool() -> &'static [Personality] {
        &[
            Personality::Analyst,
            Personality::Comedian,
            Personality::Skeptic,
            Personality::Rambler,
            Personality::Enthusiast,
        ]
    }

    /// The personality for the nth automated seat (0-based), cycling the pool
    pub fn for_seat(seat_index: usize) -> Personality {
        let pool = Self::pool();
        pool[seat_index % pool.len()]
    }

    /// Style instruction handed to the generation port
    pub fn style(&self) -> &'static str {
        match self {
            Personality::Analyst => {
                "Answer precisely and a little dryly, in one or two sentences."
            }
            Personality::Comedian => "Answer with a quick joke or absurd comparison.",
            Personality::Skeptic => "Answer in a short, unimpressed sentence.",
            Personality::Rambler => {
                "Answer with a meandering aside before getting to the point."
            }
            Personality::Enthusiast => "Answer warmly, with slightly too much sincerity.",
        }
    }
}

impl std::fmt::Display for Personality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Personality::Analyst => write!(f, "analyst"),
            Personality::Comedian => write!(f, "comedian"),
            Personality::Skeptic => write!(f, "skeptic"),
            Personality::Rambler => write!(f, "rambler"),
            Personality::Enthusiast => write!(f, "enthusiast"),
        }
    }
}
