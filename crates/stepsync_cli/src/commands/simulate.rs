//! Simulate command implementation.
//!
//! Runs several editing sessions against one in-process server over the
//! loopback transport, then checks that every session and the server log
//! agree on the document text.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stepsync_engine::{
    BackoffConfig, HttpTransport, LoopbackClient, SyncConfig, SyncEngine, SyncScheduler,
};
use stepsync_protocol::{DocId, SessionId, Step, StepTransform};
use stepsync_server::{ServerConfig, SyncServer};
use stepsync_store::{FileStepStore, MemoryStepStore, StepStore};
use stepsync_testkit::{PlainText, TextStep};
use tracing::{debug, info, warn};

type Engine = SyncEngine<PlainText, HttpTransport<LoopbackClient<Arc<SyncServer>>>>;

const BASE_URL: &str = "http://stepsync.local";
const SETTLE_ROUNDS: usize = 200;

/// Parameters of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Number of concurrent sessions.
    pub sessions: usize,
    /// Total local edits across all sessions.
    pub edits: usize,
    /// Seed for the edit schedule.
    pub seed: u64,
    /// Use background schedulers instead of explicit cycles.
    pub background: bool,
    /// Document id.
    pub doc: String,
}

/// Simulation outcome.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    /// Seed used for the schedule.
    pub seed: u64,
    /// Number of sessions.
    pub sessions: usize,
    /// Edits made.
    pub edits: usize,
    /// Final server version.
    pub server_version: u64,
    /// Completed sync cycles, summed over sessions.
    pub cycles: u64,
    /// Push conflicts, summed over sessions.
    pub conflicts: u64,
    /// Own steps recovered from fetched tails.
    pub acknowledged: u64,
    /// Whether every session matches the server log.
    pub converged: bool,
    /// Final document text as replayed from the server log.
    pub document: String,
}

/// Runs the simulate command.
pub fn run(
    path: Option<&Path>,
    options: &SimulateOptions,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn StepStore> = match path {
        Some(path) => Arc::new(FileStepStore::open(path)?),
        None => Arc::new(MemoryStepStore::new()),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(simulate(store, options))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }

    if !report.converged {
        return Err(format!("sessions diverged (seed {})", report.seed).into());
    }
    Ok(())
}

/// Runs one simulation against `store`.
pub async fn simulate(
    store: Arc<dyn StepStore>,
    options: &SimulateOptions,
) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    if options.sessions == 0 {
        return Err("at least one session is required".into());
    }
    let doc = DocId::new(options.doc.as_str())?;
    let server = Arc::new(SyncServer::with_store(ServerConfig::default(), store));
    let mut rng = StdRng::seed_from_u64(options.seed);

    let engines: Vec<Arc<Engine>> = (0..options.sessions)
        .map(|i| {
            let config = SyncConfig::new(doc.clone())
                .with_session_id(SessionId::new(format!("sim-{i}")))
                .with_sync_interval(Duration::from_millis(50))
                .with_debounce(Duration::from_millis(20))
                .with_backoff(BackoffConfig::none());
            let transport = HttpTransport::new(BASE_URL, LoopbackClient::new(Arc::clone(&server)));
            Arc::new(SyncEngine::new(config, PlainText, transport))
        })
        .collect();

    info!(
        %doc,
        seed = options.seed,
        sessions = options.sessions,
        edits = options.edits,
        background = options.background,
        "starting simulation"
    );

    let docs = if options.background {
        run_background(&engines, &server, &doc, options.edits, &mut rng).await?
    } else {
        run_stepped(&engines, &server, &doc, options.edits, &mut rng).await?
    };

    let log = server.get_steps(&doc, 0)?;
    let document = PlainText.apply_all(&String::new(), &log.steps)?;
    let converged = docs.iter().all(|d| *d == document);

    let mut report = SimulationReport {
        seed: options.seed,
        sessions: options.sessions,
        edits: options.edits,
        server_version: log.version,
        cycles: 0,
        conflicts: 0,
        acknowledged: 0,
        converged,
        document,
    };
    for engine in &engines {
        let stats = engine.stats();
        report.cycles += stats.cycles_completed;
        report.conflicts += stats.conflicts;
        report.acknowledged += stats.steps_acknowledged;
    }

    if converged {
        info!(version = report.server_version, conflicts = report.conflicts, "sessions converged");
    } else {
        warn!(seed = report.seed, "sessions diverged");
    }
    Ok(report)
}

/// Edits and explicit cycles in a random interleaving, then settles.
async fn run_stepped(
    engines: &[Arc<Engine>],
    server: &SyncServer,
    doc: &DocId,
    edits: usize,
    rng: &mut StdRng,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    for _ in 0..edits {
        let editor = &engines[rng.gen_range(0..engines.len())];
        editor.local_edit(random_edit(&editor.document(), rng))?;

        if rng.gen_bool(0.3) {
            let syncer = &engines[rng.gen_range(0..engines.len())];
            let result = syncer.sync_cycle().await?;
            debug!(session = %syncer.session_id(), ?result, "cycle");
        }
    }

    // One round pushes everything, the next distributes it.
    for _ in 0..SETTLE_ROUNDS {
        if is_quiescent(engines, server, doc)? {
            break;
        }
        for engine in engines {
            engine.sync_cycle().await?;
        }
    }
    Ok(engines.iter().map(|e| e.document()).collect())
}

/// Edits through background schedulers and waits for them to settle.
async fn run_background(
    engines: &[Arc<Engine>],
    server: &SyncServer,
    doc: &DocId,
    edits: usize,
    rng: &mut StdRng,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let handles: Vec<_> = engines
        .iter()
        .map(|engine| SyncScheduler::spawn(Arc::clone(engine)))
        .collect();

    for _ in 0..edits {
        let handle = &handles[rng.gen_range(0..handles.len())];
        handle.edit(random_edit(&handle.engine().document(), rng))?;
        tokio::time::sleep(Duration::from_millis(rng.gen_range(0..10))).await;
    }

    let mut settled = false;
    for _ in 0..SETTLE_ROUNDS {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if is_quiescent(engines, server, doc)? {
            settled = true;
            break;
        }
    }
    if !settled {
        warn!("schedulers did not settle");
    }

    // Closing a session discards its state, so read documents first.
    let docs = engines.iter().map(|e| e.document()).collect();
    for handle in handles {
        handle.shutdown().await;
    }
    Ok(docs)
}

/// Every session has pushed everything and seen the whole log.
fn is_quiescent(
    engines: &[Arc<Engine>],
    server: &SyncServer,
    doc: &DocId,
) -> Result<bool, Box<dyn std::error::Error>> {
    let version = server.document_version(doc)?;
    Ok(engines
        .iter()
        .all(|e| e.unconfirmed_len() == 0 && e.confirmed_version() == version))
}

fn random_edit(text: &str, rng: &mut StdRng) -> Step {
    let len = text.chars().count();
    if len == 0 || rng.gen_bool(0.7) {
        let word: String = (0..rng.gen_range(1..=4))
            .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
            .collect();
        TextStep::Insert {
            pos: rng.gen_range(0..=len),
            text: word,
        }
        .to_step()
    } else {
        let pos = rng.gen_range(0..len);
        TextStep::Delete {
            pos,
            len: rng.gen_range(1..=(len - pos).min(3)),
        }
        .to_step()
    }
}

fn print_text_output(report: &SimulationReport) {
    println!("Simulation (seed {})", report.seed);
    println!("  Sessions:       {}", report.sessions);
    println!("  Edits:          {}", report.edits);
    println!("  Server version: {}", report.server_version);
    println!("  Sync cycles:    {}", report.cycles);
    println!("  Conflicts:      {}", report.conflicts);
    println!("  Acknowledged:   {}", report.acknowledged);
    println!(
        "  Converged:      {}",
        if report.converged { "yes" } else { "NO" }
    );
    println!();
    println!("{}", report.document);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(seed: u64, background: bool) -> SimulateOptions {
        SimulateOptions {
            sessions: 3,
            edits: 40,
            seed,
            background,
            doc: "sim".to_string(),
        }
    }

    #[tokio::test]
    async fn stepped_simulation_converges() {
        for seed in 0..8 {
            let store = Arc::new(MemoryStepStore::new());
            let report = simulate(store, &options(seed, false)).await.unwrap();
            assert!(report.converged, "seed {seed}");
            assert_eq!(report.server_version, 40);
        }
    }

    #[tokio::test]
    async fn background_simulation_converges() {
        let store = Arc::new(MemoryStepStore::new());
        let report = simulate(store, &options(7, true)).await.unwrap();
        assert!(report.converged);
        assert_eq!(report.server_version, 40);
    }

    #[tokio::test]
    async fn zero_sessions_is_rejected() {
        let mut opts = options(1, false);
        opts.sessions = 0;
        assert!(simulate(Arc::new(MemoryStepStore::new()), &opts).await.is_err());
    }

    #[test]
    fn random_edits_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut text = String::new();
        for _ in 0..200 {
            let step = random_edit(&text, &mut rng);
            let before = text.chars().count();
            match TextStep::from_step(&step).unwrap() {
                TextStep::Insert { pos, .. } => assert!(pos <= before),
                TextStep::Delete { pos, len } => assert!(pos + len <= before && len > 0),
            }
            text = PlainText.apply(&text, &step).unwrap();
        }
    }
}
