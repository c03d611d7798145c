use crate::{load_inventory, EngineArgs};
use anyhow::{anyhow, Result};
use camino::Utf8PathBuf;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use texrestore_app_core::{
    EngineSettings, NoopReloader, NothingRestoredReason, RestoreApplication, RestoreOutcome,
    RestoreRequest, RestoreRunEvent, RestoreState, RestoreStatus,
};
use texrestore_core::score::{score, select_best_session, MatchSignals};
use texrestore_core::{BackupCandidate, BackupSessionInfo, DetectionResult};
use texrestore_pipeline::{owning_mod_folders, FsSessionSource, ModRootResolver, SessionSource};

const SCAN_TIMEOUT: Duration = Duration::from_secs(60);

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

fn print_settings(settings: &EngineSettings) {
    println!("   Backups: {}", settings.backup_root);
    println!("   Mods:    {}", settings.mods_root);
}

/// Detection result once both background scans have settled.
async fn settled_detection(
    app: &RestoreApplication,
    snapshot: &Arc<texrestore_core::TextureInventorySnapshot>,
) -> Result<Arc<DetectionResult>> {
    app.get_relevant_backups(snapshot);
    let detection = app.detection().clone();
    let idle = tokio::task::spawn_blocking(move || detection.wait_idle(SCAN_TIMEOUT)).await?;
    if !idle {
        anyhow::bail!(
            "Backup scan did not finish within {}s",
            SCAN_TIMEOUT.as_secs()
        );
    }
    Ok(app.get_relevant_backups(snapshot))
}

async fn list_sessions(settings: &EngineSettings) -> Result<Vec<BackupSessionInfo>> {
    let backups = settings.backup_root.clone();
    let mods = settings.mods_root.clone();
    let listed =
        tokio::task::spawn_blocking(move || FsSessionSource::new(&backups, mods).try_list_sessions())
            .await?;
    match listed {
        Ok(mut sessions) => {
            sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(sessions)
        }
        Err(e) if e.is_absent() => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

pub async fn cmd_detect(engine: EngineArgs, inventory: Utf8PathBuf) -> Result<DetectionResult> {
    let settings = engine.settings()?;
    println!(":: Detecting backups...");
    print_settings(&settings);

    let snapshot = load_inventory(&inventory)?;
    println!(
        "   Textures in use: {} ({} originally)",
        snapshot.file_paths().count(),
        format_size(snapshot.total_original_bytes(), DECIMAL)
    );

    let app = RestoreApplication::new(settings, Arc::new(NoopReloader));
    let pb = spinner("Scanning backups...");
    let result = settled_detection(&app, &snapshot).await?;
    pb.finish_with_message(format!("Found {} candidate(s)", result.len()));

    for candidate in result.candidates() {
        match &candidate {
            BackupCandidate::PerFile { name, paths } => {
                let newest = paths
                    .first()
                    .and_then(|p| std::fs::metadata(p).ok())
                    .map(|m| format_size(m.len(), DECIMAL))
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "   {:<40} {} copies, newest {}",
                    name,
                    paths.len(),
                    newest
                );
            }
            BackupCandidate::ModScoped { .. } => println!("   {}", candidate),
        }
    }

    Ok((*result).clone())
}

pub async fn cmd_sessions(engine: EngineArgs) -> Result<Vec<BackupSessionInfo>> {
    let settings = engine.settings()?;
    println!(":: Backup sessions");
    print_settings(&settings);

    let sessions = list_sessions(&settings).await?;
    if sessions.is_empty() {
        println!("   No sessions found.");
    }
    for session in &sessions {
        let mods: Vec<String> = session.mod_folders().into_iter().collect();
        println!(
            "   {}  {:<4} {:>4} file(s)  {:<30} [{}]",
            session.created_at.format("%Y-%m-%d %H:%M"),
            if session.is_archive { "zip" } else { "dir" },
            session.entries.len(),
            session.display_name,
            mods.join(", ")
        );
    }
    Ok(sessions)
}

/// Every session with its score against the inventory, best first.
pub async fn cmd_score(engine: EngineArgs, inventory: Utf8PathBuf) -> Result<Vec<(String, u32)>> {
    let settings = engine.settings()?;
    println!(":: Scoring sessions...");
    print_settings(&settings);

    let snapshot = load_inventory(&inventory)?;
    let sessions = list_sessions(&settings).await?;
    let resolver = ModRootResolver::new(settings.mods_root.clone());
    let owning = owning_mod_folders(&resolver, &snapshot);
    let signals = MatchSignals::from_snapshot(&snapshot, &owning);

    let best = select_best_session(&sessions, &signals)
        .filter(|(_, s)| *s > 0)
        .map(|(session, _)| session.source_path.clone());

    let mut scored: Vec<(&BackupSessionInfo, u32)> =
        sessions.iter().map(|s| (s, score(s, &signals))).collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.created_at.cmp(&a.0.created_at)));

    if !owning.is_empty() {
        let owning: Vec<&str> = owning.iter().map(String::as_str).collect();
        println!("   Owning mods: {}", owning.join(", "));
    }
    for (session, points) in &scored {
        let marker = if best.as_ref() == Some(&session.source_path) {
            "*"
        } else {
            " "
        };
        println!(
            " {} {:>4}  {}  {}",
            marker,
            points,
            session.created_at.format("%Y-%m-%d %H:%M"),
            session.display_name
        );
    }
    if best.is_none() && !scored.is_empty() {
        println!("   No session matches; a restore would fall back to the latest one.");
    }

    Ok(scored
        .into_iter()
        .map(|(s, points)| (s.display_name.clone(), points))
        .collect())
}

pub async fn cmd_restore(engine: EngineArgs, inventory: Utf8PathBuf) -> Result<RestoreOutcome> {
    let settings = engine.settings()?;
    println!(":: Restoring textures...");
    print_settings(&settings);

    let snapshot = load_inventory(&inventory)?;
    let mut app = RestoreApplication::new(settings, Arc::new(NoopReloader));
    let detected = settled_detection(&app, &snapshot).await?;

    let request = RestoreRequest::new(snapshot, detected.per_file.clone());
    let run_id = app.start_restore(request)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;
    let mut state = RestoreState::starting(run_id);

    while !state.is_terminal() {
        let mut cancel_now = false;
        tokio::select! {
            maybe_ev = app.next_event() => {
                let Some(event) = maybe_ev else { break };
                if !state.apply(&event) {
                    continue;
                }
                match &event.ev {
                    RestoreRunEvent::StageChanged { stage, detail, .. } => {
                        pb.set_message(format!("{stage}: {detail}"));
                    }
                    RestoreRunEvent::Progress { progress, .. } => {
                        pb.set_length(progress.total as u64);
                        pb.set_position(progress.processed as u64);
                        if !progress.current_file.is_empty() {
                            pb.set_message(progress.current_file.clone());
                        }
                    }
                    _ => {}
                }
            }
            _ = &mut ctrl_c, if !cancel_requested => {
                cancel_now = true;
            }
        }
        if cancel_now {
            cancel_requested = true;
            pb.set_message("Cancelling after the current file...");
            app.cancel_restore();
        }
    }
    pb.finish_and_clear();

    if let Some(message) = state.error {
        anyhow::bail!(message);
    }
    let outcome = state
        .outcome
        .ok_or_else(|| anyhow!("Restore worker stopped without a result"))?;
    print_outcome(&outcome);
    Ok(outcome)
}

fn print_outcome(outcome: &RestoreOutcome) {
    match outcome {
        RestoreOutcome::Completed(report) => {
            let status = match report.status() {
                RestoreStatus::Success => "complete",
                RestoreStatus::Partial => "partially complete",
            };
            println!("\n:: Restore {} ({})", status, report.stage);
            println!("   Restored: {}", report.restored_files);
            println!("   Skipped:  {}", report.skipped_files);
            println!("   Failed:   {}", report.failed_files);
            if !report.restored_mods.is_empty() {
                let mods: Vec<&str> = report.restored_mods.iter().map(String::as_str).collect();
                println!("   Mods:     {}", mods.join(", "));
            }
            for warning in &report.warnings {
                println!("   Warning:  {}", warning);
            }
        }
        RestoreOutcome::NothingRestored { reason } => {
            let why = match reason {
                NothingRestoredReason::NoBackups => "no backup applies to the textures in use",
                NothingRestoredReason::Unmapped => {
                    "per-file backups exist but none matches a texture in use"
                }
                NothingRestoredReason::AllStepsFailed => "every restore attempt failed",
            };
            println!("\n:: Nothing restored: {}", why);
        }
        RestoreOutcome::Cancelled => println!("\n:: Restore cancelled"),
    }
}
