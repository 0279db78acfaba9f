//! Human readable renderings of entry headers.

use std::io;
use std::io::prelude::*;

use crate::EntryHeader;

#[rustfmt::skip]
fn symbolic_mode(c: u32, special: bool, special_x: u8, special_no_x: u8) -> [u8; 3] {
    [
        if 0 != c & 4 { b'r' } else { b'-' },
        if 0 != c & 2 { b'w' } else { b'-' },
        match (c & 1, special) {
            (0, false) => b'-',
            (0, true) => special_no_x,
            (_, false) => b'x',
            (_, true) => special_x,
        }
    ]
}

fn mode_string(header: &EntryHeader) -> String {
    // Trwxrwxrwx, with `h` marking hard links
    let mode = header.mode();
    let type_char = if header.is_dir() {
        'd'
    } else if header.is_symlink() {
        'l'
    } else if header.is_hard_link() {
        'h'
    } else if header.is_character_special() {
        'c'
    } else if header.is_block_special() {
        'b'
    } else if header.is_fifo() {
        'p'
    } else {
        '-'
    };

    let fmt_u = symbolic_mode((mode >> 6) & 7, 0 != mode & 0o4000, b's', b'S');
    let fmt_g = symbolic_mode((mode >> 3) & 7, 0 != mode & 0o2000, b's', b'S');
    let fmt_o = symbolic_mode(mode & 7, 0 != mode & 0o1000, b't', b'T');

    let mut s = String::with_capacity(10);
    s.push(type_char);
    s.extend(fmt_u.iter().chain(&fmt_g).chain(&fmt_o).map(|b| *b as char));
    s
}

fn owner_string(header: &EntryHeader) -> String {
    let user = match header.username() {
        Some(name) => name.to_string(),
        None => header.uid().to_string(),
    };
    let group = match header.groupname() {
        Some(name) => name.to_string(),
        None => header.gid().to_string(),
    };
    format!("{}/{}", user, group)
}

/// Writes an `ls -l` style line describing `header` to `w`:
///
/// ```text
/// -rw-r--r-- user/group        5 2024-01-01 12:00 a.txt
/// lrwxrwxrwx user/group        0 2024-01-01 12:00 b -> a.txt
/// ```
///
/// Missing user and group names are replaced by the numeric ids and device
/// entries show `major,minor` in place of the size.
pub fn print_long_ls<W: Write + ?Sized>(w: &mut W, header: &EntryHeader) -> io::Result<()> {
    let size = if header.is_character_special() || header.is_block_special() {
        format!("{},{}", header.device_major(), header.device_minor())
    } else {
        header.size().to_string()
    };

    write!(
        w,
        "{} {:<17} {:>8} {} {}",
        mode_string(header),
        owner_string(header),
        size,
        format_mtime(header.mtime()),
        String::from_utf8_lossy(header.path_bytes()),
    )?;
    if header.is_symlink() {
        write!(w, " -> {}", String::from_utf8_lossy(header.link_name_bytes()))?;
    } else if header.is_hard_link() {
        write!(w, " link to {}", String::from_utf8_lossy(header.link_name_bytes()))?;
    }
    writeln!(w)
}

/// Writes every field of `header`, one per line, to `w`.
pub fn print_header<W: Write + ?Sized>(w: &mut W, header: &EntryHeader) -> io::Result<()> {
    writeln!(w, "   path: {}", String::from_utf8_lossy(header.path_bytes()))?;
    writeln!(w, "   type: {:?} ({:?})", header.entry_type(), header.entry_type().as_byte() as char)?;
    writeln!(w, "   link: {}", String::from_utf8_lossy(header.link_name_bytes()))?;
    writeln!(w, "   mode: {:o} ({})", header.mode(), mode_string(header))?;
    writeln!(w, "    uid: {}", header.uid())?;
    writeln!(w, "    gid: {}", header.gid())?;
    writeln!(w, "  uname: {}", header.username().unwrap_or(""))?;
    writeln!(w, "  gname: {}", header.groupname().unwrap_or(""))?;
    writeln!(w, "   size: {}", header.size())?;
    writeln!(w, "  mtime: {} ({})", header.mtime(), format_mtime(header.mtime()))?;
    writeln!(w, "  major: {}", header.device_major())?;
    writeln!(w, "  minor: {}", header.device_minor())?;
    writeln!(w, "  cksum: {:o}", header.cksum())
}

#[cfg(unix)]
fn format_mtime(mtime: u64) -> String {
    if let Some(s) = strftime_local("%Y-%m-%d %H:%M", mtime as libc::time_t) {
        return s;
    }
    mtime.to_string()
}

#[cfg(not(unix))]
fn format_mtime(mtime: u64) -> String {
    mtime.to_string()
}

#[cfg(unix)]
fn strftime_local(format: &str, epoch: libc::time_t) -> Option<String> {
    use std::ffi::CString;

    let format = CString::new(format).ok()?;
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    if unsafe { libc::localtime_r(&epoch, &mut tm) }.is_null() {
        return None;
    }
    let mut buf = [0u8; 64];
    let len = unsafe {
        libc::strftime(
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            format.as_ptr(),
            &tm,
        )
    };
    if len == 0 {
        return None;
    }
    String::from_utf8(buf[..len].to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryType;

    fn listing(header: &EntryHeader) -> String {
        let mut out = Vec::new();
        print_long_ls(&mut out, header).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn modes() {
        let mut h = EntryHeader::new(b"d", EntryType::dir());
        h.set_mode(0o755);
        assert_eq!(mode_string(&h), "drwxr-xr-x");
        let mut h = EntryHeader::new(b"f", EntryType::file());
        h.set_mode(0o4644);
        assert_eq!(mode_string(&h), "-rwSr--r--");
        h.set_mode(0o1777);
        assert_eq!(mode_string(&h), "-rwxrwxrwt");
    }

    #[test]
    fn long_listing() {
        let mut h = EntryHeader::new(b"a.txt", EntryType::file());
        h.set_mode(0o644);
        h.set_uid(1000);
        h.set_gid(100);
        h.set_size(5);
        let line = listing(&h);
        assert!(line.starts_with("-rw-r--r-- 1000/100 "), "{}", line);
        assert!(line.contains(" 5 "), "{}", line);
        assert!(line.ends_with(" a.txt\n"), "{}", line);

        let mut h = EntryHeader::new(b"b", EntryType::symlink());
        h.set_link_name(b"a.txt");
        assert!(listing(&h).ends_with(" b -> a.txt\n"));

        let mut h = EntryHeader::new(b"c", EntryType::hard_link());
        h.set_link_name(b"a.txt");
        assert!(listing(&h).ends_with(" c link to a.txt\n"));

        let mut h = EntryHeader::new(b"null", EntryType::character_special());
        h.set_device(1, 3);
        assert!(listing(&h).contains(" 1,3 "));
    }
}
