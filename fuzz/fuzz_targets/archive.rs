#![no_main]

use libfuzzer_sys::fuzz_target;

use std::fs;
use std::io;

use tarstream::{Archive, Mode, Options};
use tempfile::tempdir;

fuzz_target!(|data: &[u8]| {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fuzz.tar");
    fs::write(&path, data).unwrap();

    // Options come from the first byte so that every validation path is
    // reachable.
    let options = data
        .first()
        .map(|b| Options::from_bits_truncate(u32::from(*b)) - Options::VERBOSE)
        .unwrap_or_default();

    let mut ar = match Archive::open(&path, Mode::Read, options) {
        Ok(ar) => ar,
        Err(_) => return,
    };
    let mut n = 0;
    while let Ok(Some(_)) = ar.next_entry() {
        // Alternate between reading and lazily skipping payloads.
        if n % 2 == 0 {
            let _ = ar.extract_current_to(&mut io::sink());
        }
        n += 1;
    }
    let _ = ar.close();

    let mut ar = match Archive::open(&path, Mode::Read, options) {
        Ok(ar) => ar,
        Err(_) => return,
    };
    let out = dir.path().join("out");
    let _ = ar.extract_all(Some(out.as_path()));
});
