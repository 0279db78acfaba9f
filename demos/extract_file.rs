extern crate tarstream;

use std::env::args_os;
use std::io::stdout;
use std::path::Path;

use tarstream::{Archive, Mode, Options};

fn main() {
    let archive = args_os().nth(1).unwrap();
    let first_arg = args_os().nth(2).unwrap();
    let filename = Path::new(&first_arg);
    let mut arch = Archive::open(&archive, Mode::Read, Options::GNU).unwrap();
    while arch.next_entry().unwrap().is_some() {
        if arch.entry_path().unwrap() == filename {
            arch.extract_current_to(&mut stdout()).unwrap();
        }
    }
}
