//! Local match simulation driver
//!
//! Runs one full match end to end against the in-memory store, queue, and
//! event log: simulated humans submit responses and votes, workers answer
//! for the automated seats via the canned generator, and the projected
//! history is printed as JSON when the match completes.
//!
//! ```bash
//! simulate --humans 2 --rounds 5
//! RUST_LOG=arena=debug simulate
//! ```

use anyhow::Result;
use clap::Parser;
use rand::seq::SliceRandom;
use tracing::info;
use tracing_subscriber::EnvFilter;

use arena::config::{MatchConfig, MatchTemplate};
use arena::coordinator::{InMemoryMatchStore, InMemoryResponseQueue, MatchCoordinator, ResponseWorker};
use arena::domain::{Identity, MatchStatus, RoundPhase};
use arena::events::{EventBus, InMemoryEventLog};
use arena::generation::CannedGenerator;
use arena::projector::HistoryProjector;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Human seats in the roster
    #[arg(long, default_value_t = 2)]
    humans: usize,

    /// Total seats in the roster
    #[arg(long, default_value_t = 4)]
    participants: usize,

    /// Rounds to play
    #[arg(long, default_value_t = 5)]
    rounds: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = MatchConfig {
        template: MatchTemplate {
            name: "simulated".to_string(),
            total_participants: args.participants,
            human_quota: args.humans,
            total_rounds: args.rounds,
        },
        ..MatchConfig::immediate()
    };

    let log = InMemoryEventLog::new().shared();
    let events = EventBus::with_sink(log.clone()).shared();
    let store = InMemoryMatchStore::new().shared();
    let (queue, receiver) = InMemoryResponseQueue::new();

    let worker = ResponseWorker::new(store.clone(), events.clone(), config.clone())
        .with_generation(std::sync::Arc::new(CannedGenerator))
        .shared();
    let worker_task = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(receiver).await })
    };

    let coordinator =
        MatchCoordinator::new(store, queue.shared(), events.clone(), config.clone());

    // Form the roster and start.
    coordinator.create_match("sim-match").await?;
    for n in 1..=args.humans {
        coordinator
            .add_participant("sim-match", &format!("session-{}", n))
            .await?;
    }
    coordinator.start_match("sim-match").await?;

    let record = coordinator.get_match("sim-match").await?;
    let humans: Vec<Identity> = record.human_identities().into_iter().collect();
    let everyone: Vec<Identity> = record.participants.iter().map(|p| p.identity).collect();

    // Play every round: humans respond (workers cover the automated seats),
    // then every seat votes for a random other identity.
    for round in 1..=args.rounds {
        for human in &humans {
            coordinator
                .submit_response("sim-match", *human, format!("round {} thoughts", round))
                .await?;
        }
        wait_for_phase(&coordinator, RoundPhase::Voting).await?;
        info!(round, "responses collected, voting");

        for voter in &everyone {
            let others: Vec<Identity> =
                everyone.iter().copied().filter(|id| id != voter).collect();
            let guess = *others
                .choose(&mut rand::thread_rng())
                .expect("other seats exist");
            coordinator.submit_vote("sim-match", *voter, guess).await?;
        }
    }

    let record = coordinator.get_match("sim-match").await?;
    anyhow::ensure!(
        record.status == MatchStatus::Completed,
        "match did not complete"
    );
    drop(coordinator);
    worker_task.abort();

    // Project the event log and print the history.
    let mut projector = HistoryProjector::new();
    projector.replay(&log.snapshot());
    let history = projector.get("sim-match").expect("match projected");
    println!("{}", serde_json::to_string_pretty(history)?);

    Ok(())
}

/// Poll until the round in play reaches the wanted phase
async fn wait_for_phase(
    coordinator: &MatchCoordinator,
    phase: RoundPhase,
) -> Result<()> {
    for _ in 0..200 {
        let record = coordinator.get_match("sim-match").await?;
        if record
            .round_in_play()
            .map(|r| r.phase == phase)
            .unwrap_or(false)
        {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    anyhow::bail!("timed out waiting for {} phase", phase)
}
