use camino::{Utf8Path, Utf8PathBuf};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::io::Write;
use texrestore_scanner::{PerFileScanner, ScanError, SessionScanner};

fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, root)
}

fn write_copy(dir: &Utf8Path, name: &str, body: &str, mtime: i64) -> Utf8PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    path
}

const MANIFEST: &str = r#"{
  "display_name": "Before BC7 pass",
  "created_at": "2024-05-01T10:00:00Z",
  "entries": [
    { "original_file_name": "chest.tex", "mod_folder_name": "ModA", "mod_relative_path": "chara/chest.tex" }
  ]
}"#;

fn write_zip_session(path: &Utf8Path, manifest: &str) {
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default();
    zip.start_file("session.json", opts).unwrap();
    zip.write_all(manifest.as_bytes()).unwrap();
    zip.start_file("ModB/vfx/glow.tex", opts).unwrap();
    zip.write_all(b"glow").unwrap();
    zip.finish().unwrap();
}

#[test]
fn per_file_copies_are_newest_first() {
    let (_tmp, root) = utf8_tempdir();
    let name_dir = root.join("textures").join("chest.tex");
    let old = write_copy(&name_dir, "1000_chest.tex", "old", 1_000);
    let new = write_copy(&name_dir, "2000_chest.tex", "new!", 2_000);
    write_copy(&root.join("textures").join("empty.tex"), ".keep", "", 10);
    fs::remove_file(root.join("textures").join("empty.tex").join(".keep")).unwrap();

    let scan = PerFileScanner::new(&root).try_scan().unwrap();
    assert_eq!(scan.index.len(), 1, "empty name directories are not backups");
    assert_eq!(scan.index["chest.tex"], vec![new, old]);
    assert_eq!(scan.stats.copies, 2);
    assert_eq!(scan.stats.bytes, 7);
}

#[test]
fn missing_root_is_distinguishable_but_collapses_to_empty() {
    let (_tmp, root) = utf8_tempdir();
    let scanner = PerFileScanner::new(&root.join("nowhere"));

    let err = scanner.try_scan().unwrap_err();
    assert!(matches!(err, ScanError::MissingRoot(_)));
    assert!(err.is_absent());
    assert!(scanner.scan().is_empty());
}

#[test]
fn sessions_are_read_from_directories_and_archives() {
    let (_tmp, root) = utf8_tempdir();
    let sessions_root = root.join("sessions");
    let dir_session = sessions_root.join("2024-05-01_1000");
    fs::create_dir_all(dir_session.join("ModA/chara")).unwrap();
    fs::write(dir_session.join("session.json"), MANIFEST).unwrap();
    fs::write(dir_session.join("ModA/chara/chest.tex"), "chest").unwrap();

    let zip_manifest = r#"{ "entries": [
        { "original_file_name": "glow.tex", "mod_folder_name": "ModB", "mod_relative_path": "vfx/glow.tex" }
    ] }"#;
    write_zip_session(&sessions_root.join("nightly.zip"), zip_manifest);

    // Not a session: no manifest.
    fs::create_dir_all(sessions_root.join("stray")).unwrap();

    let scanner = SessionScanner::new(&root);
    let (mut sessions, stats) = scanner.try_list_sessions().unwrap();
    sessions.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    assert_eq!(stats.sessions, 2);
    assert_eq!(sessions.len(), 2);

    let dir = &sessions[0];
    assert_eq!(dir.display_name, "Before BC7 pass");
    assert!(!dir.is_archive);
    assert_eq!(dir.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");

    let archive = &sessions[1];
    assert_eq!(archive.display_name, "nightly");
    assert!(archive.is_archive);
    assert_eq!(archive.entries[0].mod_folder_name, "ModB");

    assert!(scanner.has_backup_for_mod("moda"));
    assert!(scanner.has_backup_for_mod("ModB"));
    assert!(!scanner.has_backup_for_mod("ModC"));
    let mods = scanner.try_mods_with_backups().unwrap();
    assert_eq!(mods.into_iter().collect::<Vec<_>>(), vec!["ModA", "ModB"]);
}

#[test]
fn broken_session_is_skipped_not_fatal() {
    let (_tmp, root) = utf8_tempdir();
    let sessions_root = root.join("sessions");
    let good = sessions_root.join("good");
    let bad = sessions_root.join("bad");
    fs::create_dir_all(&good).unwrap();
    fs::create_dir_all(&bad).unwrap();
    fs::write(good.join("session.json"), MANIFEST).unwrap();
    fs::write(bad.join("session.json"), "{ not json").unwrap();
    fs::write(sessions_root.join("corrupt.zip"), b"PK-but-not-really").unwrap();

    let (sessions, stats) = SessionScanner::new(&root).try_list_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(stats.sessions_skipped, 2);
}

#[test]
fn missing_session_root_lists_nothing() {
    let (_tmp, root) = utf8_tempdir();
    let scanner = SessionScanner::new(&root);
    assert!(scanner.try_list_sessions().unwrap_err().is_absent());
    assert!(scanner.list_sessions().is_empty());
    assert!(!scanner.has_backup_for_mod("ModA"));
}

#[cfg(unix)]
#[test]
fn unreadable_name_directory_does_not_hide_the_others() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let (_tmp, root) = utf8_tempdir();
    let textures = root.join("textures");
    let good = write_copy(&textures.join("chest.tex"), "1000_chest.tex", "old", 1_000);

    let broken = textures.join("legs.tex");
    fs::create_dir_all(&broken).unwrap();
    let bad_name = broken
        .as_std_path()
        .join(OsStr::from_bytes(b"1000_\xfflegs.tex"));
    fs::write(bad_name, "legs").unwrap();

    let scan = PerFileScanner::new(&root).try_scan().unwrap();
    assert_eq!(scan.index.len(), 1);
    assert_eq!(scan.index["chest.tex"], vec![good]);
    assert_eq!(scan.stats.names_skipped, 1);
}

#[test]
fn manifest_rewritten_within_the_same_second_is_reread() {
    let (_tmp, root) = utf8_tempdir();
    let session = root.join("sessions").join("s1");
    fs::create_dir_all(&session).unwrap();
    let manifest = session.join("session.json");
    let scanner = SessionScanner::new(&root);

    fs::write(&manifest, r#"{ "display_name": "first", "entries": [] }"#).unwrap();
    set_file_mtime(&manifest, FileTime::from_unix_time(1_700_000_000, 100)).unwrap();
    let (sessions, _) = scanner.try_list_sessions().unwrap();
    assert_eq!(sessions[0].display_name, "first");

    // Same length, same second, different content.
    fs::write(&manifest, r#"{ "display_name": "secnd", "entries": [] }"#).unwrap();
    set_file_mtime(&manifest, FileTime::from_unix_time(1_700_000_000, 900)).unwrap();
    let (sessions, _) = scanner.try_list_sessions().unwrap();
    assert_eq!(sessions[0].display_name, "secnd");
}
