use std::fs;
use std::iter;
use std::path::Path;

use tempfile::{Builder, TempDir};

use tarstream::{Archive, EntryType, Header, Mode, Options};

macro_rules! t {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => panic!("{} returned {}", stringify!($e), e),
        }
    };
}

fn td() -> TempDir {
    t!(Builder::new().prefix("tarstream").tempdir())
}

fn header(path: &str, kind: EntryType) -> Header {
    let mut h = Header::new();
    t!(h.set_path_bytes(path.as_bytes()));
    h.set_mode(if kind.is_dir() { 0o755 } else { 0o644 });
    h.set_entry_type(kind);
    h
}

// Writes `entries` as an archive at `dir/name`, with the end marker.
fn archive(dir: &Path, name: &str, entries: Vec<(Header, &[u8])>) -> Archive {
    let mut raw = Vec::new();
    for (mut h, data) in entries {
        h.set_size(data.len() as u64);
        h.set_cksum();
        raw.extend_from_slice(h.as_bytes());
        raw.extend_from_slice(data);
        let rem = data.len() % 512;
        if rem != 0 {
            raw.extend(iter::repeat(0).take(512 - rem));
        }
    }
    raw.extend_from_slice(&[0; 1024]);
    let path = dir.join(name);
    t!(fs::write(&path, &raw));
    t!(Archive::open(&path, Mode::Read, Options::empty()))
}

#[test]
fn absolute_link() {
    let td = td();
    let mut h = header("foo", EntryType::Symlink);
    t!(h.set_link_name_bytes(b"/bar"));
    let mut ar = archive(td.path(), "a.tar", vec![(h, &[][..])]);

    let out = td.path().join("out");
    t!(ar.extract_all(Some(out.as_path())));
    t!(out.join("foo").symlink_metadata());
    assert_eq!(t!(fs::read_link(out.join("foo"))), Path::new("/bar"));
}

#[test]
fn directory_already_exists() {
    let td = td();
    let mut ar = archive(
        td.path(),
        "a.tar",
        vec![
            (header("d", EntryType::dir()), &[][..]),
            (header("d/f", EntryType::file()), &b"f"[..]),
        ],
    );
    let out = td.path().join("out");
    t!(fs::create_dir_all(out.join("d")));
    t!(ar.extract_all(Some(out.as_path())));
    assert_eq!(t!(fs::read(out.join("d/f"))), b"f");
}

#[test]
fn metadata_is_restored() {
    let td = td();
    let mut h = header("f", EntryType::file());
    h.set_mtime(1_000_000_000);
    h.set_mode(0o640);
    let mut ar = archive(td.path(), "a.tar", vec![(h, &b"payload"[..])]);

    let out = td.path().join("out");
    t!(ar.extract_all(Some(out.as_path())));
    let meta = t!(fs::metadata(out.join("f")));
    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    assert_eq!(mtime.unix_seconds(), 1_000_000_000);

    #[cfg(unix)]
    {
        use std::os::unix::prelude::*;
        assert_eq!(meta.permissions().mode() & 0o777, 0o640);
    }
}

#[test]
fn unknown_types_are_regular_files() {
    let td = td();
    let mut ar = archive(
        td.path(),
        "a.tar",
        vec![
            (header("odd", EntryType::new(b'X')), &b"abc"[..]),
            (header("next", EntryType::file()), &b"next"[..]),
        ],
    );
    assert!(t!(ar.next_entry()).is_some());
    assert_eq!(t!(ar.entry_type()), EntryType::Other(b'X'));
    assert_eq!(t!(ar.size()), 3);
    let out = td.path().join("odd");
    t!(ar.extract_current(&out));
    assert_eq!(t!(fs::read(&out)), b"abc");

    assert_eq!(t!(ar.next_entry()).unwrap().path_bytes(), b"next");
}

#[test]
fn hard_link_to_extracted_entry() {
    let td = td();
    let mut link = header("b", EntryType::hard_link());
    t!(link.set_link_name_bytes(b"a"));
    let mut ar = archive(
        td.path(),
        "a.tar",
        vec![(header("a", EntryType::file()), &b"shared"[..]), (link, &[][..])],
    );

    // The link target is resolved against where `a` was extracted, not the
    // working directory.
    let out = td.path().join("out");
    t!(ar.extract_all(Some(out.as_path())));
    assert_eq!(t!(fs::read(out.join("b"))), b"shared");
}

#[test]
#[cfg(unix)]
fn fifos() {
    use std::os::unix::prelude::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    let td = td();
    let mut pipe = header("pipe", EntryType::fifo());
    pipe.set_mtime(1_000_000_000);
    let mut ar = archive(
        td.path(),
        "a.tar",
        vec![(pipe, &[][..]), (header("after", EntryType::file()), &b"x"[..])],
    );
    let out = td.path().join("out");

    // Nothing ever opens the other end of the FIFO, so an extraction which
    // opens it never returns.
    let (tx, rx) = mpsc::channel();
    let dst = out.clone();
    thread::spawn(move || {
        let res = ar.extract_all(Some(dst.as_path())).map_err(|e| e.to_string());
        let _ = tx.send(res);
    });
    match rx.recv_timeout(Duration::from_secs(30)) {
        Ok(res) => t!(res),
        Err(_) => panic!("extracting a FIFO did not finish"),
    }

    let meta = t!(fs::symlink_metadata(out.join("pipe")));
    assert!(meta.file_type().is_fifo());
    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    assert_eq!(mtime.unix_seconds(), 1_000_000_000);
    assert_eq!(t!(fs::read(out.join("after"))), b"x");
}

#[test]
fn prefix_is_always_joined() {
    let td = td();
    let mut ar = archive(
        td.path(),
        "a.tar",
        vec![(header("/abs.txt", EntryType::file()), &b"abs"[..])],
    );
    let out = td.path().join("out");
    t!(ar.extract_all(Some(out.as_path())));
    assert_eq!(t!(fs::read(out.join("abs.txt"))), b"abs");
}

#[test]
fn sink_and_skip() {
    let td = td();
    let mut ar = archive(
        td.path(),
        "a.tar",
        vec![
            (header("one", EntryType::file()), &[1; 700][..]),
            (header("two", EntryType::file()), &[2; 10][..]),
        ],
    );
    assert!(t!(ar.next_entry()).is_some());
    t!(ar.skip_current());
    // Skipped data can no longer be extracted.
    assert!(ar.extract_current_to(&mut Vec::new()).is_err());

    assert!(t!(ar.next_entry()).is_some());
    let mut sink = Vec::new();
    assert_eq!(t!(ar.extract_current_to(&mut sink)), Some(10));
    assert_eq!(sink, [2; 10]);
    assert!(t!(ar.next_entry()).is_none());
}

#[test]
fn for_each_entry_extracts_selected() {
    let td = td();
    let mut ar = archive(
        td.path(),
        "a.tar",
        vec![
            (header("keep.txt", EntryType::file()), &b"keep"[..]),
            (header("drop.bin", EntryType::file()), &b"drop"[..]),
        ],
    );
    let out = td.path().join("out");
    t!(ar.for_each_entry(|ar| {
        if tarstream::glob_matches("*.txt", ar.header()?.path_bytes()) {
            let dst = out.join(ar.entry_path()?.into_owned());
            ar.extract_current(dst)?;
        }
        Ok(())
    }));
    assert!(out.join("keep.txt").exists());
    assert!(!out.join("drop.bin").exists());
}
