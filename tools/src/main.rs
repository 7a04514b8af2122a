//! aml-runner: headless batch runner for the AML engine.
//!
//! Usage:
//!   aml-runner --input entities.json [--db aml.db] [--config engine.json] [--watchlist lists.json]
//!   aml-runner --synthetic 500 --seed 12345
//!   aml-runner --ipc-mode [--db aml.db]

use aml_core::{
    aggregator::RiskLevel,
    alert_manager::RecommendedAction,
    command::{AlertAction, ReportAction},
    config::EngineConfig,
    report::ReportDraft,
    risk_factors::{
        Channel, ComplianceFlags, EntityContext, EntityType, HistoricalBaseline, TransactionContext,
    },
    rng::{StreamRng, StreamSlot},
    screening::WatchlistScreen,
    store::{AmlStore, MemoryStore, SqliteStore},
    AmlEngine, Assessment,
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Assess { context: EntityContext },
    Transition { alert_id: String, action: AlertAction },
    DraftReport { alert_id: String, draft: ReportDraft },
    ReportAction { report_id: String, action: ReportAction },
    SubmitReport { report_id: String },
    Overdue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let seed = parse_arg(&args, "--seed", 42u64);
    let synthetic = parse_arg(&args, "--synthetic", 0usize);
    let input = string_arg(&args, "--input");
    let db = string_arg(&args, "--db");

    let config = match string_arg(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.validate()?;

    let store: Arc<dyn AmlStore> = match db {
        Some(path) => Arc::new(SqliteStore::open(path).with_context(|| format!("opening {path}"))?),
        None => Arc::new(MemoryStore::new()),
    };

    let mut builder = AmlEngine::builder(config, store);
    if let Some(path) = string_arg(&args, "--watchlist") {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        let lists: WatchlistScreen =
            serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
        let lists = Arc::new(lists);
        builder = builder.sanctions_screen(lists.clone()).pep_screen(lists);
    }
    let engine = builder.build();

    if ipc_mode {
        return run_ipc_loop(&engine).await;
    }

    let contexts = match input {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str::<Vec<EntityContext>>(&raw).with_context(|| format!("parsing {path}"))?
        }
        None if synthetic > 0 => synthetic_contexts(synthetic, seed),
        None => anyhow::bail!("nothing to do: pass --input <file>, --synthetic <n> or --ipc-mode"),
    };

    println!("aml-runner: AML risk engine batch run");
    println!("  entities:  {}", contexts.len());
    println!("  db:        {}", db.unwrap_or("(memory)"));
    println!();

    let mut assessments = Vec::with_capacity(contexts.len());
    for ctx in &contexts {
        match engine.assess(ctx).await {
            Ok(a) => assessments.push(a),
            Err(e) => log::warn!("entity={} skipped: {e}", ctx.entity_id),
        }
    }

    print_summary(&engine, &assessments)
}

async fn run_ipc_loop(engine: &AmlEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        if stdin.lock().read_line(&mut buffer)? == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };

        let reply = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Assess { context } => to_reply(engine.assess(&context).await),
            IpcCommand::Transition { alert_id, action } => to_reply(engine.transition(&alert_id, &action)),
            IpcCommand::DraftReport { alert_id, draft } => to_reply(engine.draft_report(&alert_id, draft)),
            IpcCommand::ReportAction { report_id, action } => {
                to_reply(engine.report_transition(&report_id, &action).await)
            }
            IpcCommand::SubmitReport { report_id } => to_reply(engine.submit_report(&report_id).await),
            IpcCommand::Overdue => to_reply(engine.overdue_alerts()),
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn to_reply<T: serde::Serialize>(result: aml_core::AmlResult<T>) -> serde_json::Value {
    match result {
        Ok(value) => serde_json::json!({ "ok": value }),
        Err(e) => serde_json::json!({ "error": e.to_string(), "retryable": e.is_retryable() }),
    }
}

fn print_summary(engine: &AmlEngine, assessments: &[Assessment]) -> Result<()> {
    let mut by_level: BTreeMap<RiskLevel, usize> = BTreeMap::new();
    let mut by_alert_type: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut blocked = 0;
    let mut fallbacks = 0;

    for a in assessments {
        *by_level.entry(a.score.level).or_default() += 1;
        for alert in &a.new_alerts {
            *by_alert_type.entry(alert.alert_type.as_str()).or_default() += 1;
        }
        if a.recommendation.action == RecommendedAction::Block {
            blocked += 1;
        }
        if a.risk_profile.ml_scoring.as_ref().is_some_and(|p| p.is_fallback()) {
            fallbacks += 1;
        }
    }

    println!("=== ASSESSMENTS ===");
    for a in assessments {
        println!(
            "  {:<16} {:.3} {:<9} alerts={} -> {:?}",
            a.risk_profile.entity_id(),
            a.score.overall,
            a.score.level.as_str(),
            a.new_alerts.len(),
            a.recommendation.action
        );
    }

    println!();
    println!("=== RUN SUMMARY ===");
    println!("  assessed:        {}", assessments.len());
    println!("  fallback scored: {fallbacks}");
    println!("  blocked:         {blocked}");
    for (level, count) in &by_level {
        println!("  {:<16} {count}", format!("{}:", level.as_str()));
    }
    for (alert_type, count) in &by_alert_type {
        println!("  {:<24} {count}", format!("{alert_type}:"));
    }
    println!("  overdue alerts:  {}", engine.overdue_alerts()?.len());
    println!("  reports due 72h: {}", engine.reports_due_within(72)?.len());
    Ok(())
}

/// Seeded population of entity contexts for load and smoke runs.
fn synthetic_contexts(n: usize, seed: u64) -> Vec<EntityContext> {
    const JURISDICTIONS: &[&str] = &["US", "GB", "DE", "NG", "AE", "PK", "IR", "SG"];
    const INDUSTRIES: &[&str] = &["retail", "money_services", "real_estate", "crypto", "software"];
    const CHANNELS: &[Channel] =
        &[Channel::Branch, Channel::Online, Channel::Mobile, Channel::Atm, Channel::Wire, Channel::Crypto];

    let mut rng = StreamRng::new(seed, StreamSlot::Runner);
    let mut pick = |len: usize| (rng.next_u64() % len as u64) as usize;

    (0..n)
        .map(|i| {
            let jurisdiction = JURISDICTIONS[pick(JURISDICTIONS.len())].to_string();
            let destination = JURISDICTIONS[pick(JURISDICTIONS.len())].to_string();
            let industry = INDUSTRIES[pick(INDUSTRIES.len())].to_string();
            let channel = CHANNELS[pick(CHANNELS.len())];
            let average_amount = 200.0 + pick(5_000) as f64;
            let spike = 1 + pick(6) as u64;
            let entity_type = if pick(4) == 0 { EntityType::Business } else { EntityType::Individual };

            EntityContext {
                entity_id: format!("syn-{i:05}"),
                entity_type,
                name: None,
                jurisdiction: jurisdiction.clone(),
                transaction: Some(TransactionContext {
                    amount: average_amount * spike as f64,
                    frequency: (2 + pick(20)) as f64,
                    source_country: Some(jurisdiction),
                    destination_country: Some(destination),
                    hour_of_day: Some(pick(24) as u8),
                    channel: Some(channel),
                }),
                baseline: HistoricalBaseline { average_amount, baseline_frequency: (1 + pick(8)) as f64 },
                flags: ComplianceFlags {
                    sanctions_status: pick(200) == 0,
                    pep_status: pick(50) == 0,
                    adverse_media_count: if pick(10) == 0 { pick(5) as u32 } else { 0 },
                    previous_violations: if pick(20) == 0 { 1 } else { 0 },
                },
                industry_code: Some(industry),
                account_age_days: pick(3_000) as u32,
                kyc_level: pick(4) as u8,
            }
        })
        .collect()
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
