use chrono::{TimeZone, Utc};
use texrestore_core::score::{latest_session, score, select_best_session, MatchSignals};
use texrestore_core::{BackupSessionInfo, SessionEntry};

fn entry(name: &str, folder: &str, rel: &str) -> SessionEntry {
    SessionEntry {
        original_file_name: name.into(),
        mod_folder_name: folder.into(),
        mod_relative_path: rel.into(),
    }
}

fn session(name: &str, day: u32, entries: Vec<SessionEntry>) -> BackupSessionInfo {
    BackupSessionInfo {
        display_name: name.into(),
        source_path: format!("/backups/sessions/{name}").into(),
        is_archive: false,
        created_at: Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
        entries,
    }
}

#[test]
fn owning_mod_bonus_beats_coincidental_names() {
    let signals = MatchSignals::new(
        ["chest.tex", "legs.tex"],
        Vec::<String>::new(),
        ["ModB"],
    );

    let a = session(
        "A",
        1,
        vec![
            entry("chest.tex", "ModA", "stored/0001.tex"),
            entry("legs.tex", "ModA", "stored/0002.tex"),
        ],
    );
    let b = session("B", 1, vec![entry("chest.tex", "ModB", "stored/0003.tex")]);

    assert_eq!(score(&a, &signals), 2);
    assert_eq!(score(&b, &signals), 3);

    let sessions = vec![a, b];
    let (best, best_score) = select_best_session(&sessions, &signals).unwrap();
    assert_eq!(best.display_name, "B");
    assert_eq!(best_score, 3);
}

#[test]
fn equal_scores_prefer_latest_session() {
    let signals = MatchSignals::new(["a.tex", "b.tex", "c.tex"], Vec::<String>::new(), Vec::<String>::new());
    let older = session(
        "older",
        2,
        vec![
            entry("a.tex", "X", "x/1.tex"),
            entry("b.tex", "X", "x/2.tex"),
            entry("c.tex", "X", "x/3.tex"),
        ],
    );
    let newer = session(
        "newer",
        9,
        vec![
            entry("a.tex", "Y", "y/1.tex"),
            entry("b.tex", "Y", "y/2.tex"),
            entry("c.tex", "Y", "y/3.tex"),
        ],
    );

    for sessions in [vec![older.clone(), newer.clone()], vec![newer, older]] {
        let (best, s) = select_best_session(&sessions, &signals).unwrap();
        assert_eq!(s, 3);
        assert_eq!(best.display_name, "newer");
    }
}

#[test]
fn all_weights_add_up_per_entry() {
    let signals = MatchSignals::new(["chest.tex"], ["moda"], ["ModA"]);
    let s = session("full", 1, vec![entry("chest_dx11.tex", "ModA", "chara/chest.tex")]);
    // name + dir segment + owning mod + relative base name
    assert_eq!(score(&s, &signals), 1 + 1 + 2 + 1);
}

#[test]
fn score_never_drops_when_signals_grow() {
    let s = session(
        "mono",
        1,
        vec![
            entry("a.tex", "ModA", "chara/a.tex"),
            entry("b.tex", "ModB", "vfx/b.tex"),
            entry("c.tex", "ModC", "c.tex"),
        ],
    );

    let names = ["a.tex", "b.tex", "c.tex", "zzz.tex"];
    let dirs = ["moda", "modb", "textures"];
    let mods = ["ModA", "ModC", "Other"];

    let mut previous = 0;
    for n in 0..=names.len() {
        for d in 0..=dirs.len() {
            for m in 0..=mods.len() {
                let signals = MatchSignals::new(&names[..n], &dirs[..d], &mods[..m]);
                let current = score(&s, &signals);
                if d == dirs.len() && m == mods.len() {
                    assert!(current >= previous, "score dropped when adding names");
                    previous = current;
                }
                let smaller = MatchSignals::new(
                    &names[..n],
                    &dirs[..d.saturating_sub(1)],
                    &mods[..m.saturating_sub(1)],
                );
                assert!(current >= score(&s, &smaller));
            }
        }
    }
}

#[test]
fn empty_signals_score_zero_and_latest_is_newest() {
    let sessions = vec![
        session("one", 3, vec![entry("a.tex", "A", "a.tex")]),
        session("two", 7, vec![entry("b.tex", "B", "b.tex")]),
    ];
    let signals = MatchSignals::default();
    let (_, s) = select_best_session(&sessions, &signals).unwrap();
    assert_eq!(s, 0);
    assert_eq!(latest_session(&sessions).unwrap().display_name, "two");
    assert!(select_best_session(&[], &signals).is_none());
}
