#![no_main]

use libfuzzer_sys::fuzz_target;

use std::fs;
use std::str;

use tarstream::{Archive, Mode, Options};
use tempfile::tempdir;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir(&src).unwrap();

    // Each chunk becomes a file whose name and contents come from the input.
    for (i, chunk) in data[1..].chunks(37).enumerate() {
        let name = match str::from_utf8(chunk) {
            Ok(s) if !s.is_empty() && !s.contains(&['/', '\0'][..]) && s != "." && s != ".." => {
                s.to_string()
            }
            _ => format!("entry_{}", i),
        };
        let _ = fs::write(src.join(name), chunk);
    }

    let options = if data[0] & 1 == 1 { Options::GNU } else { Options::empty() };
    let tar = dir.path().join("fuzz.tar");
    let mut ar = Archive::open(&tar, Mode::Write, options).unwrap();
    let name = "n".repeat(usize::from(data[0]));
    if ar.append_tree_with_name(&src, &name).is_err() {
        return;
    }
    ar.close().unwrap();

    let mut ar = Archive::open(&tar, Mode::Read, options).unwrap();
    while ar.next_entry().unwrap().is_some() {
        ar.extract_current_to_buffer().unwrap();
    }
});
