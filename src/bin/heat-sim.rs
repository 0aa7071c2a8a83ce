//! Simulated heat: one director, three pilots with skewed clocks, one judge.
//!
//! Runs a full round against the in-memory adapters with compressed timings:
//! synchronized BUILD and FLIGHT launches, landings, judging, ranking, and
//! the winner reveal. Useful for eyeballing the protocol in the logs.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, bail};
use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apogee_core::{
    MissionConfig, MissionNode, Role, SharedNode,
    bus::{BroadcastChannel, MemoryBus},
    dao::{memory::MemoryMissionStore, mission_store::MissionStore, models::MissionPhase},
    dto::judge::ScoringPatch,
    services::{
        director, judge,
        launch::{self, LaunchOutcome},
        pilot, reconcile, scoring, store_supervisor,
    },
    state::{OffsetSource, reveal::RevealStage},
};

const PILOT_NAMES: [&str; 3] = ["Aquila", "Bellatrix", "Cygnus"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = demo_config();
    let store: Arc<dyn MissionStore> = Arc::new(MemoryMissionStore::new());
    let bus: Arc<dyn BroadcastChannel> = Arc::new(MemoryBus::new());

    let dir = spawn_node(Role::Director, &config, &store, &bus).await?;
    director::bootstrap(&dir).await.context("bootstrapping mission")?;
    tokio::spawn(launch::run_probe_loop(dir.clone()));

    let mut pilots = Vec::new();
    for name in PILOT_NAMES {
        let record = pilot::register_participant(&dir, name)
            .await
            .with_context(|| format!("registering {name}"))?;
        let node = spawn_node(Role::Pilot(record.id), &config, &store, &bus).await?;

        // Simulated clock drift: the launch commit has to correct this.
        let skew_ms = rand::rng().random_range(-15_000..=15_000);
        node.clock().apply_offset(skew_ms, OffsetSource::PollInferred);
        info!(pilot = name, skew_ms, "pilot online with a skewed clock");
        pilots.push((name, node));
    }

    let judge_node = spawn_node(Role::Judge, &config, &store, &bus).await?;

    synced_launch(&dir, MissionPhase::Build).await?;
    info!("build window open");
    sleep(config.build_duration + Duration::from_millis(300)).await;

    synced_launch(&dir, MissionPhase::Flight).await?;
    info!("flight window open");
    for (name, node) in &pilots {
        let offset_ms = node.clock().offset_millis();
        info!(pilot = name, offset_ms, source = ?node.clock().source(), "clock after commit");
    }

    let mut landings = Vec::new();
    for (name, node) in &pilots {
        let name = *name;
        let node = node.clone();
        let airtime = Duration::from_millis(rand::rng().random_range(1_500..4_000));
        landings.push(tokio::spawn(async move {
            sleep(airtime).await;
            let record = pilot::record_landing(&node).await?;
            info!(
                pilot = name,
                duration = record.flight_duration_seconds,
                "touched down"
            );
            Ok::<_, apogee_core::ServiceError>(())
        }));
    }
    for landing in landings {
        landing.await.context("landing task panicked")??;
    }

    director::force_phase(&dir, MissionPhase::Idle)
        .await
        .context("stopping the heat")?;

    for (name, _node) in &pilots {
        let participants = store.list_participants().await?;
        let id = participants
            .iter()
            .find(|p| p.display_name == *name)
            .map(|p| p.id)
            .context("registered pilot vanished")?;
        let patch = ScoringPatch {
            used_budget: Some(rand::rng().random_range(30_000..=50_000)),
            rover_bonus_granted: Some(rand::rng().random_bool(0.5)),
            return_bonus_granted: Some(rand::rng().random_bool(0.3)),
            aesthetics_bonus: Some(rand::rng().random_range(0..=30)),
            landing_grade_text: Some(
                ["perfect soft", "hard", "crunch"][rand::rng().random_range(0..3)].to_string(),
            ),
            ..ScoringPatch::default()
        };
        judge::apply_scoring(&judge_node, id, &patch)
            .await
            .with_context(|| format!("scoring {name}"))?;
    }

    let board = scoring::rank_participants(&store.list_participants().await?, &config);
    for (position, entry) in board.iter().enumerate() {
        info!(
            position = position + 1,
            team = %entry.display_name,
            flight = %entry.flight_label,
            bonuses = entry.total_bonus_seconds,
            penalties = entry.total_penalty_seconds,
            score = %entry.final_label,
            "leaderboard"
        );
    }

    director::announce_winner(&dir).await.context("announcing winner")?;
    loop {
        let record = dir.mission_record().await;
        match apogee_core::state::reveal::reveal_stage(
            record.winner_announcement.as_ref(),
            dir.clock().authoritative_now(),
            &config,
        ) {
            RevealStage::Announced {
                remaining_seconds, ..
            } => {
                info!(remaining_seconds, "reveal countdown");
                sleep(Duration::from_millis(500)).await;
            }
            RevealStage::Revealed { announcement } => {
                info!(winner = %announcement.winner.display_name, "winner revealed");
                break;
            }
            RevealStage::None => bail!("announcement disappeared before reveal"),
        }
    }

    Ok(())
}

/// Bring up a node: supervised store, bus, and the background loops.
async fn spawn_node(
    role: Role,
    config: &MissionConfig,
    store: &Arc<dyn MissionStore>,
    bus: &Arc<dyn BroadcastChannel>,
) -> anyhow::Result<SharedNode> {
    let node = MissionNode::new(role, config.clone());
    let backend = store.clone();
    tokio::spawn(store_supervisor::run(node.clone(), move || {
        let store = backend.clone();
        async move { Ok(store) }
    }));
    node.install_bus(bus.clone()).await;
    node.degraded_watcher()
        .wait_for(|degraded| !*degraded)
        .await
        .context("waiting for the store supervisor")?;
    tokio::spawn(reconcile::run_bus_listener(node.clone()));
    tokio::spawn(reconcile::run_change_listener(node.clone()));
    tokio::spawn(reconcile::run_poll_loop(node.clone()));
    tokio::spawn(reconcile::run_display_ticker(node.clone()));
    Ok(node)
}

/// Open a session, wait for every pilot, commit, and wait for the countdown.
async fn synced_launch(dir: &SharedNode, target: MissionPhase) -> anyhow::Result<()> {
    launch::open_launch(dir, target)
        .await
        .with_context(|| format!("opening launch for {target:?}"))?;

    timeout(Duration::from_secs(5), async {
        loop {
            if let Some((ready, total)) = launch::readiness(dir).await?
                && ready == total
            {
                return Ok::<_, apogee_core::ServiceError>(());
            }
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .context("waiting for sync responses")??;

    match launch::commit_launch(dir, false).await? {
        LaunchOutcome::Committed(commit) => {
            info!(phase = ?target, responses = commit.offsets_by_participant.len(), "launch committed");
        }
        LaunchOutcome::Waiting { ready, total } => {
            bail!("commit refused with {ready}/{total} responses");
        }
    }

    timeout(Duration::from_secs(10), async {
        loop {
            if dir.mission_record().await.phase == target {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .context("waiting for the countdown to fire")?;
    Ok(())
}

/// Compressed timings so a full heat runs in a few seconds.
fn demo_config() -> MissionConfig {
    MissionConfig {
        build_duration: Duration::from_secs(3),
        build_alert_threshold: Duration::from_secs(1),
        countdown_lead: Duration::from_secs(1),
        reveal_hold: Duration::from_secs(2),
        probe_interval: Duration::from_millis(200),
        poll_interval: Duration::from_millis(200),
        display_tick: Duration::from_millis(200),
        ..MissionConfig::default()
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
