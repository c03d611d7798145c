use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use texrestore_app_core::{RestoreOutcome, RestoreStage, RestoreStatus};
use texrestore_cli::{commands, EngineArgs};

struct Library {
    _tmp: tempfile::TempDir,
    root: Utf8PathBuf,
    backups: Utf8PathBuf,
    mods: Utf8PathBuf,
}

impl Library {
    fn engine(&self) -> EngineArgs {
        EngineArgs {
            config: None,
            backups: Some(self.backups.clone()),
            mods: Some(self.mods.clone()),
        }
    }
}

const MOD_FILES: &[(&str, &str)] = &[
    ("chara/chest.tex", "chest-original"),
    ("chara/legs.tex", "legs-original"),
];

fn write_session(backups: &Utf8Path) {
    let dir = backups.join("sessions/2024-05-01_ModA");
    let mut entries = Vec::new();
    for (rel, body) in MOD_FILES {
        let path = dir.join("ModA").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        entries.push(serde_json::json!({
            "original_file_name": rel.rsplit('/').next().unwrap(),
            "mod_folder_name": "ModA",
            "mod_relative_path": rel,
        }));
    }
    let manifest = serde_json::json!({
        "display_name": "Before optimizing ModA",
        "created_at": "2024-05-01T10:00:00Z",
        "entries": entries,
    });
    fs::write(dir.join("session.json"), manifest.to_string()).unwrap();
}

/// Mods optimized in place, a session covering ModA, a loose per-file copy of chest.tex,
/// and an inventory that uses both ModA textures.
fn library() -> (Library, Utf8PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
    let backups = root.join("backups");
    let mods = root.join("mods");

    let mut used = Vec::new();
    for (rel, _) in MOD_FILES {
        let path = mods.join("ModA").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "optimized").unwrap();
        used.push(path);
    }
    write_session(&backups);

    let loose = backups.join("textures/chest.tex/1700000000_chest.tex");
    fs::create_dir_all(loose.parent().unwrap()).unwrap();
    fs::write(&loose, "chest-loose").unwrap();

    let inventory = root.join("inventory.json");
    let raw = serde_json::json!({
        "Player": {
            "abc123": {
                "format": "BC7",
                "original_size_bytes": 4096,
                "file_paths": used.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            }
        }
    });
    fs::write(&inventory, raw.to_string()).unwrap();

    (
        Library {
            _tmp: tmp,
            root,
            backups,
            mods,
        },
        inventory,
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn detect_lists_loose_copies_and_owning_mods() {
    let (lib, inventory) = library();
    let result = commands::cmd_detect(lib.engine(), inventory).await.unwrap();

    assert!(result.per_file.contains_key("chest.tex"));
    assert!(result.mod_scoped.contains("ModA"));
    assert_eq!(result.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn sessions_and_scores_are_listed() {
    let (lib, inventory) = library();

    let sessions = commands::cmd_sessions(lib.engine()).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].display_name, "Before optimizing ModA");
    assert_eq!(sessions[0].entries.len(), 2);

    let scored = commands::cmd_score(lib.engine(), inventory).await.unwrap();
    assert_eq!(scored.len(), 1);
    assert!(scored[0].1 > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn sessions_on_an_empty_backup_root_are_empty() {
    let (lib, _) = library();
    let engine = EngineArgs {
        backups: Some(lib.root.join("nowhere")),
        ..lib.engine()
    };
    assert!(commands::cmd_sessions(engine).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn restore_brings_back_the_owning_mod() {
    let (lib, inventory) = library();
    let outcome = commands::cmd_restore(lib.engine(), inventory).await.unwrap();

    let report = match outcome {
        RestoreOutcome::Completed(report) => report,
        other => panic!("expected a completed restore, got {other:?}"),
    };
    assert_eq!(report.stage, RestoreStage::TargetedModRestore);
    assert_eq!(report.status(), RestoreStatus::Success);
    assert_eq!(report.restored_files, 2);
    assert!(report.warnings.is_empty());

    let chest = lib.mods.join("ModA/chara/chest.tex");
    assert_eq!(fs::read_to_string(chest).unwrap(), "chest-original");
    let legs = lib.mods.join("ModA/chara/legs.tex");
    assert_eq!(fs::read_to_string(legs).unwrap(), "legs-original");
}

#[tokio::test(flavor = "multi_thread")]
async fn settings_file_is_overridden_by_flags() {
    let (lib, _) = library();
    let config = lib.root.join("settings.json");
    fs::write(
        &config,
        r#"{ "backup_root": "/elsewhere", "staleness_secs": 9 }"#,
    )
    .unwrap();

    let engine = EngineArgs {
        config: Some(config),
        backups: Some(lib.backups.clone()),
        mods: None,
    };
    let settings = engine.settings().unwrap();
    assert_eq!(settings.backup_root, lib.backups);
    assert_eq!(settings.staleness_secs, 9);
}
