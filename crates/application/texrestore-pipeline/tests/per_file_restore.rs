use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fs;
use texrestore_core::{BackupIndex, TextureInventorySnapshot, TextureUsageEntry};
use texrestore_pipeline::{map_backups_to_targets, restore_pairs, FsPerFileSource, PerFileSource};
use tokio_util::sync::CancellationToken;

fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, root)
}

fn snapshot(paths: &[Utf8PathBuf]) -> TextureInventorySnapshot {
    let mut by_hash = BTreeMap::new();
    by_hash.insert(
        "h".to_string(),
        TextureUsageEntry {
            format: "BC7".into(),
            original_size_bytes: 0,
            file_paths: paths.to_vec(),
        },
    );
    let mut objects = BTreeMap::new();
    objects.insert("Equipment".to_string(), by_hash);
    TextureInventorySnapshot::new(objects)
}

fn write(path: &Utf8Path, body: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

#[test]
fn mapping_matches_exact_normalized_and_nested_names() {
    let used = [
        Utf8PathBuf::from("/mods/ModA/chara/body.tex"),
        Utf8PathBuf::from("/mods/ModA/chara/chest.tex"),
        Utf8PathBuf::from("/mods/ModB/vfx/common/glow.atex"),
    ];
    let mut index = BackupIndex::new();
    index.insert("Body.TEX".into(), vec!["/b/body/2_body.tex".into()]);
    index.insert("chest_dx11.tex".into(), vec!["/b/chest/2_chest.tex".into()]);
    index.insert("common/glow.atex".into(), vec!["/b/glow/1_glow.atex".into()]);
    index.insert("missing.tex".into(), vec!["/b/missing/1_missing.tex".into()]);

    let (pairs, unmapped) = map_backups_to_targets(&index, &snapshot(&used));

    let by_name: BTreeMap<&str, &Utf8PathBuf> =
        pairs.iter().map(|p| (p.name.as_str(), &p.target)).collect();
    assert_eq!(by_name["Body.TEX"], &used[0]);
    assert_eq!(by_name["chest_dx11.tex"], &used[1]);
    assert_eq!(by_name["common/glow.atex"], &used[2]);
    assert_eq!(unmapped, vec!["missing.tex".to_string()]);
}

#[test]
fn a_target_is_claimed_once() {
    let used = [Utf8PathBuf::from("/mods/ModA/chest.tex")];
    let mut index = BackupIndex::new();
    index.insert("chest.tex".into(), vec!["/b/1_chest.tex".into()]);
    index.insert("chest_dx9.tex".into(), vec!["/b/1_chest_dx9.tex".into()]);

    let (pairs, unmapped) = map_backups_to_targets(&index, &snapshot(&used));
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].name, "chest.tex");
    assert_eq!(unmapped, vec!["chest_dx9.tex".to_string()]);
}

#[test]
fn verified_restore_consumes_the_newest_backup_and_retires_older_ones() {
    let (_tmp, root) = utf8_tempdir();
    let target = root.join("mods/ModA/chest.tex");
    write(&target, b"optimized");
    let dir = root.join("backups/textures/chest.tex");
    let newest = dir.join("2000_chest.tex");
    let older = dir.join("1000_chest.tex");
    write(&older, b"older");
    write(&newest, b"original!");
    filetime::set_file_mtime(&older, filetime::FileTime::from_unix_time(1_000, 0)).unwrap();
    filetime::set_file_mtime(&newest, filetime::FileTime::from_unix_time(2_000, 0)).unwrap();

    let index = FsPerFileSource::new(&root.join("backups")).scan();
    let (pairs, unmapped) = map_backups_to_targets(&index, &snapshot(&[target.clone()]));
    assert!(unmapped.is_empty());

    let summary = restore_pairs(&pairs, None, &CancellationToken::new()).unwrap();

    assert_eq!(summary.restored, 1);
    assert_eq!(summary.written, vec![target.clone()]);
    assert_eq!(fs::read(&target).unwrap(), b"original!");
    assert!(!newest.exists(), "consumed backup is deleted");
    assert!(!older.exists(), "older copies would roll the file back");
    assert!(FsPerFileSource::new(&root.join("backups")).scan().is_empty());
    let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with("texrestore-tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn missing_backup_is_counted_as_failed() {
    let (_tmp, root) = utf8_tempdir();
    let target = root.join("mods/ModA/chest.tex");
    write(&target, b"optimized");
    let mut index = BackupIndex::new();
    index.insert("chest.tex".into(), vec![root.join("gone/1_chest.tex")]);

    let (pairs, _) = map_backups_to_targets(&index, &snapshot(&[target.clone()]));
    let summary = restore_pairs(&pairs, None, &CancellationToken::new()).unwrap();

    assert_eq!(summary.restored, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(fs::read(&target).unwrap(), b"optimized");
}

#[test]
fn cancelled_per_file_restore_writes_nothing() {
    let (_tmp, root) = utf8_tempdir();
    let target = root.join("mods/ModA/chest.tex");
    let backup = root.join("backups/textures/chest.tex/1_chest.tex");
    write(&target, b"optimized");
    write(&backup, b"original");

    let mut index = BackupIndex::new();
    index.insert("chest.tex".into(), vec![backup.clone()]);
    let (pairs, _) = map_backups_to_targets(&index, &snapshot(&[target.clone()]));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = restore_pairs(&pairs, None, &cancel).unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(fs::read(&target).unwrap(), b"optimized");
    assert!(backup.exists());
}
