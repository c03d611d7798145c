use camino::Utf8PathBuf;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use texrestore_app_core::{
    EngineSettings, NoopReloader, RestoreApplication, RestoreEvent, RestoreOutcome,
    RestoreRequest, RestoreRunEvent, RestoreRunId, RestoreStage, RestoreState, StepStatus,
};
use texrestore_core::{BackupIndex, TextureInventorySnapshot, TextureUsageEntry};

#[test]
fn stale_run_events_are_ignored() {
    let current: RestoreRunId = uuid::Uuid::new_v4();
    let stale: RestoreRunId = uuid::Uuid::new_v4();
    let mut state = RestoreState::starting(current);

    let applied = state.apply(&RestoreEvent {
        run_id: stale,
        ev: RestoreRunEvent::StageChanged {
            stage: RestoreStage::SessionRestore,
            status: StepStatus::Failed,
            detail: "stale".into(),
        },
    });
    assert!(!applied);
    assert_eq!(
        state.step_status(RestoreStage::SessionRestore),
        StepStatus::Pending
    );

    let applied = state.apply(&RestoreEvent {
        run_id: current,
        ev: RestoreRunEvent::StageChanged {
            stage: RestoreStage::SessionRestore,
            status: StepStatus::Running,
            detail: "current".into(),
        },
    });
    assert!(applied);
    assert!(state.is_running());

    state.apply(&RestoreEvent {
        run_id: stale,
        ev: RestoreRunEvent::Finished {
            outcome: RestoreOutcome::Cancelled,
        },
    });
    assert!(!state.is_terminal());
}

fn snapshot(path: Utf8PathBuf) -> Arc<TextureInventorySnapshot> {
    let mut by_hash = BTreeMap::new();
    by_hash.insert(
        "h".to_string(),
        TextureUsageEntry {
            format: "BC7".into(),
            original_size_bytes: 8,
            file_paths: vec![path],
        },
    );
    let mut objects = BTreeMap::new();
    objects.insert("Player".to_string(), by_hash);
    Arc::new(TextureInventorySnapshot::new(objects))
}

/// Drains events for `run_id` into a state until the run finishes.
fn drive(app: &mut RestoreApplication, run_id: RestoreRunId) -> RestoreState {
    let mut state = RestoreState::starting(run_id);
    let deadline = Instant::now() + Duration::from_secs(10);
    while !state.is_terminal() && Instant::now() < deadline {
        match app.next_event_blocking() {
            Some(event) => {
                state.apply(&event);
            }
            None => break,
        }
    }
    state
}

#[test]
fn orchestrated_restore_runs_on_a_worker_without_caller_runtime() {
    let tmp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    let settings = EngineSettings::new(root.join("backups"), root.join("mods"));

    let target = root.join("mods/ModA/chest.tex");
    fs::create_dir_all(target.parent().unwrap()).unwrap();
    fs::write(&target, "optimized").unwrap();
    let backup = root.join("backups/textures/chest.tex/1700000000_chest.tex");
    fs::create_dir_all(backup.parent().unwrap()).unwrap();
    fs::write(&backup, "original").unwrap();

    let mut app = RestoreApplication::new(settings, Arc::new(NoopReloader));
    let snap = snapshot(target.clone());

    app.get_relevant_backups(&snap);
    assert!(app.detection().wait_idle(Duration::from_secs(5)));
    let detected = app.get_relevant_backups(&snap);
    assert!(detected.per_file.contains_key("chest.tex"));

    let request = RestoreRequest::new(snap, detected.per_file.clone());
    let run_id = app.start_restore(request).unwrap();
    let state = drive(&mut app, run_id);

    let report = state
        .outcome
        .as_ref()
        .and_then(|o| o.report())
        .expect("restore completed");
    assert_eq!(report.stage, RestoreStage::PerFileFallback);
    assert_eq!(
        state.step_status(RestoreStage::LatestSessionFallback),
        StepStatus::Skipped
    );
    assert_eq!(fs::read_to_string(&target).unwrap(), "original");

    // The restore invalidated detection; the consumed backup is gone on the next fill.
    assert!(app.detection().wait_idle(Duration::from_secs(5)));
    let after = app.get_relevant_backups(&snapshot(target));
    assert!(after.per_file.is_empty());
}

#[test]
fn superseded_run_events_are_filtered() {
    let tmp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    let mut app = RestoreApplication::new(
        EngineSettings::new(root.join("backups"), root.join("mods")),
        Arc::new(NoopReloader),
    );

    let request =
        RestoreRequest::new(snapshot(root.join("mods/ModA/a.tex")), BackupIndex::new());
    let first = app.start_restore(request.clone()).unwrap();
    let second = app.start_restore(request).unwrap();
    assert_ne!(first, second);

    // Only the second run is tracked; the first one's events are filtered out.
    let state = drive(&mut app, second);
    assert!(state.is_terminal());
    assert!(matches!(
        state.outcome,
        Some(RestoreOutcome::NothingRestored { .. })
    ));
}
