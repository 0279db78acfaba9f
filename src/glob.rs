//! Path-aware shell wildcard matching of entry names.
//!
//! `*` and `?` never match a `/`, and a `.` at the start of a path component
//! is only matched by a literal `.` in the pattern. This is `fnmatch(3)` with
//! `FNM_PATHNAME | FNM_PERIOD`.

/// Returns whether `name` matches the shell wildcard `pattern`.
///
/// Patterns or names containing nul bytes never match.
///
/// ```
/// use tarstream::glob_matches;
///
/// assert!(glob_matches("dir/*", b"dir/b.txt"));
/// assert!(!glob_matches("*", b"dir/b.txt"));
/// assert!(!glob_matches("dir/*", b"dir/.hidden"));
/// ```
pub fn matches(pattern: &str, name: &[u8]) -> bool {
    imp::matches(pattern.as_bytes(), name)
}

#[cfg(unix)]
mod imp {
    use std::ffi::CString;

    use libc::{c_char, c_int};

    const FNM_PATHNAME: c_int = 1 << 0;
    const FNM_PERIOD: c_int = 1 << 2;
    const FNM_NOMATCH: c_int = 1;

    extern "C" {
        fn fnmatch(pattern: *const c_char, string: *const c_char, flags: c_int) -> c_int;
    }

    pub fn matches(pattern: &[u8], name: &[u8]) -> bool {
        let (pattern, name) = match (CString::new(pattern), CString::new(name)) {
            (Ok(p), Ok(n)) => (p, n),
            _ => return false,
        };
        let res = unsafe { fnmatch(pattern.as_ptr(), name.as_ptr(), FNM_PATHNAME | FNM_PERIOD) };
        match res {
            0 => true,
            FNM_NOMATCH => false,
            err => {
                log::warn!("fnmatch failed for pattern {:?}: {}", pattern, err);
                false
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub fn matches(pattern: &[u8], name: &[u8]) -> bool {
        if pattern.contains(&0) || name.contains(&0) {
            return false;
        }
        component(pattern, name, true)
    }

    // `start` is whether `name` begins a path component.
    fn component(pattern: &[u8], name: &[u8], start: bool) -> bool {
        match pattern.split_first() {
            None => name.is_empty(),
            Some((b'*', rest)) => {
                if start && name.first() == Some(&b'.') {
                    return false;
                }
                let mut i = 0;
                loop {
                    if component(rest, &name[i..], start && i == 0) {
                        return true;
                    }
                    if i == name.len() || name[i] == b'/' {
                        return false;
                    }
                    i += 1;
                }
            }
            Some((b'?', rest)) => match name.split_first() {
                Some((b'/', _)) | None => false,
                Some((b'.', _)) if start => false,
                Some((_, tail)) => component(rest, tail, false),
            },
            Some((b'[', rest)) => match (name.split_first(), class(rest)) {
                (Some((&c, tail)), Some((set, negated, after))) => {
                    if c == b'/' || (start && c == b'.') {
                        return false;
                    }
                    if in_class(set, c) != negated {
                        component(after, tail, false)
                    } else {
                        false
                    }
                }
                // An unterminated bracket is matched literally.
                (Some((b'[', tail)), None) => component(rest, tail, false),
                _ => false,
            },
            Some((b'\\', rest)) if !rest.is_empty() => match name.split_first() {
                Some((c, tail)) if *c == rest[0] => component(&rest[1..], tail, rest[0] == b'/'),
                _ => false,
            },
            Some((&p, rest)) => match name.split_first() {
                Some((&c, tail)) if c == p => component(rest, tail, c == b'/'),
                _ => false,
            },
        }
    }

    // Splits `[...]` into its set, whether it is negated and the rest of the
    // pattern. `pattern` starts right after the `[`.
    fn class(pattern: &[u8]) -> Option<(&[u8], bool, &[u8])> {
        let (negated, body) = match pattern.first() {
            Some(b'!') | Some(b'^') => (true, &pattern[1..]),
            _ => (false, pattern),
        };
        // A `]` right after the opening bracket is part of the set.
        let end = body.iter().skip(1).position(|b| *b == b']')? + 1;
        Some((&body[..end], negated, &body[end + 1..]))
    }

    fn in_class(set: &[u8], c: u8) -> bool {
        let mut i = 0;
        while i < set.len() {
            if i + 2 < set.len() && set[i + 1] == b'-' {
                if set[i] <= c && c <= set[i + 2] {
                    return true;
                }
                i += 3;
            } else {
                if set[i] == c {
                    return true;
                }
                i += 1;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn wildcards_stop_at_slashes() {
        assert!(matches("*", b"a.txt"));
        assert!(!matches("*", b"dir/b.txt"));
        assert!(matches("dir/*", b"dir/b.txt"));
        assert!(!matches("dir/*", b"dir/sub/b.txt"));
        assert!(matches("*/*", b"dir/b.txt"));
        assert!(!matches("d?r", b"d/r"));
    }

    #[test]
    fn leading_dots_need_a_literal() {
        assert!(!matches("*", b".profile"));
        assert!(matches(".*", b".profile"));
        assert!(!matches("dir/*", b"dir/.git"));
        assert!(!matches("dir/?git", b"dir/.git"));
        assert!(matches("*.txt", b"notes.txt"));
    }

    #[test]
    fn brackets() {
        assert!(matches("file[0-9]", b"file7"));
        assert!(!matches("file[!0-9]", b"file7"));
        assert!(matches("file[!0-9]", b"filex"));
    }

    #[test]
    fn nul_never_matches() {
        assert!(!matches("a\0", b"a"));
        assert!(!matches("*", b"a\0b"));
    }
}
