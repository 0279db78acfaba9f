extern crate tarstream;

use std::env::args_os;
use std::io::stdout;

use tarstream::{print_long_ls, Archive, Compression, Mode, Options, DEFAULT_PERMISSIONS};

fn main() {
    let path = args_os().nth(1).expect("usage: list <archive>");
    let compression = Compression::from_path(&path);
    let mut arch =
        Archive::open_with(&path, Mode::Read, compression, DEFAULT_PERMISSIONS, Options::GNU)
            .unwrap();
    let out = stdout();
    for header in arch.entries() {
        print_long_ls(&mut out.lock(), &header.unwrap()).unwrap();
    }
    arch.close().unwrap();
}
