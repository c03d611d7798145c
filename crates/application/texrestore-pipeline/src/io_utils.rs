use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::{self, Read, Write};
use std::time::Duration;
use texrestore_config::{
    RENAME_BACKOFF_CAP_MS, RENAME_BACKOFF_MS, RENAME_MAX_ATTEMPTS, RESTORE_TMP_SUFFIX,
};

pub fn robust_rename(from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
    let mut attempt = 0u32;
    let mut backoff = Duration::from_millis(RENAME_BACKOFF_MS);

    loop {
        match fs::rename(from, to) {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempt += 1;
                if attempt >= RENAME_MAX_ATTEMPTS {
                    return Err(e);
                }
                // Sleep with exponential backoff
                std::thread::sleep(backoff);
                backoff = std::cmp::min(backoff * 2, Duration::from_millis(RENAME_BACKOFF_CAP_MS));
            }
        }
    }
}

fn tmp_sibling(target: &Utf8Path) -> Utf8PathBuf {
    let name = target.file_name().unwrap_or("restore");
    target.with_file_name(format!(".{name}.{RESTORE_TMP_SUFFIX}"))
}

/// Stream `reader` into a temp sibling of `target`, then rename it into place. The target
/// either keeps its old content or receives the full new content.
pub fn atomic_write_from<R: Read>(reader: &mut R, target: &Utf8Path) -> io::Result<u64> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(target);
    let written = (|| {
        let mut out = fs::File::create(&tmp)?;
        let n = io::copy(reader, &mut out)?;
        out.flush()?;
        out.sync_all()?;
        Ok::<u64, io::Error>(n)
    })();

    let written = match written {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    };

    if let Err(e) = robust_rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    let now = filetime::FileTime::now();
    let _ = filetime::set_file_mtime(target, now);
    Ok(written)
}

pub fn atomic_copy(source: &Utf8Path, target: &Utf8Path) -> io::Result<u64> {
    let mut input = fs::File::open(source)?;
    atomic_write_from(&mut input, target)
}
