use std::iter;

use tarstream::{EntryHeader, EntryType, Header};

#[test]
fn new_is_ustar() {
    let h = Header::new();
    assert!(h.magic_ok());
    assert!(h.version_ok());
    assert!(!h.is_zero());
    assert_eq!(h.as_bytes().len(), 512);
}

#[test]
fn link_name() {
    let mut h = Header::new();
    assert!(h.link_name_bytes().is_none());
    t!(h.set_link_name_bytes(b"foo"));
    assert_eq!(&*h.link_name_bytes().unwrap(), b"foo");
    t!(h.set_link_name_bytes(b"foo/bar"));
    assert_eq!(&*h.link_name_bytes().unwrap(), b"foo/bar");
    t!(h.set_link_name_bytes(b"foo\\ba"));
    assert_eq!(&*h.link_name_bytes().unwrap(), b"foo/ba");

    let name = "foo\\bar\0";
    for (slot, val) in h.linkname.iter_mut().zip(name.as_bytes()) {
        *slot = *val;
    }
    assert_eq!(&*h.link_name_bytes().unwrap(), b"foo/bar");

    assert!(h.set_link_name_bytes(b"\0").is_err());
    let long: Vec<u8> = iter::repeat(b'a').take(101).collect();
    assert!(h.set_link_name_bytes(&long).is_err());
}

#[test]
fn mtime() {
    let mut h = Header::new();
    h.set_mtime(0o12345);
    assert_eq!(t!(h.mtime()), 0o12345);
    assert_eq!(&h.mtime, b"00000012345\0");
}

#[test]
fn user_and_group_name() {
    let mut h = Header::new();
    t!(h.set_username(b"foo"));
    t!(h.set_groupname(b"bar"));
    assert_eq!(h.username_bytes(), Some(&b"foo"[..]));
    assert_eq!(h.groupname_bytes(), Some(&b"bar"[..]));

    let long: Vec<u8> = iter::repeat(b'x').take(33).collect();
    assert!(h.set_username(&long).is_err());
}

#[test]
fn dev_major_minor() {
    let mut h = Header::new();
    h.set_device_major(1);
    h.set_device_minor(2);
    assert_eq!(t!(h.device_major().unwrap()), 1);
    assert_eq!(t!(h.device_minor().unwrap()), 2);

    h.ustar = [0; 6];
    assert!(h.device_major().is_none());
    assert!(h.device_minor().is_none());
}

#[test]
fn set_path() {
    let mut h = Header::new();
    t!(h.set_path_bytes(b"foo"));
    assert_eq!(&*h.path_bytes(), b"foo");
    t!(h.set_path_bytes(b"foo/"));
    assert_eq!(&*h.path_bytes(), b"foo/");
    t!(h.set_path_bytes(b"foo\\bar"));
    assert_eq!(&*h.path_bytes(), b"foo/bar");

    let long_name = iter::repeat("foo").take(100).collect::<String>();
    let medium1 = iter::repeat("foo").take(52).collect::<String>();
    let medium2 = iter::repeat("fo/").take(52).collect::<String>();

    assert!(h.set_path_bytes(long_name.as_bytes()).is_err());
    assert!(h.set_path_bytes(medium1.as_bytes()).is_err());
    t!(h.set_path_bytes(medium2.as_bytes()));
    assert_eq!(&*h.path_bytes(), medium2.as_bytes());

    assert!(h.set_path_bytes(b"\0").is_err());
}

#[test]
fn checksums() {
    let mut h = Header::new();
    t!(h.set_path_bytes(b"a"));
    h.set_size(5);
    h.set_cksum();
    assert!(h.cksum_ok());
    assert_eq!(&h.cksum[6..], b"\0 ");

    h.size[0] ^= 1;
    assert!(!h.cksum_ok());
}

#[test]
fn signed_checksums_are_accepted() {
    let mut h = Header::new();
    h.name[0] = 0xe9;
    h.name[1] = b'a';
    h.set_cksum();
    assert!(h.cksum_ok());

    // Store the signed sum instead, as some historic tar versions did.
    let signed: i64 = h
        .as_bytes()
        .iter()
        .enumerate()
        .map(|(i, b)| if (148..156).contains(&i) { 32 } else { *b as i8 as i64 })
        .sum();
    let o = format!("{:06o}\0 ", signed);
    h.cksum.copy_from_slice(o.as_bytes());
    assert!(h.cksum_ok());
}

#[test]
fn entry_types() {
    assert_eq!(EntryType::new(b'0'), EntryType::Regular);
    assert_eq!(EntryType::new(b'\0'), EntryType::Regular);
    assert_eq!(EntryType::new(b'5'), EntryType::Directory);
    assert_eq!(EntryType::new(b'L'), EntryType::GNULongName);
    assert_eq!(EntryType::new(b'X'), EntryType::Other(b'X'));
    assert!(EntryType::new(b'X').has_payload());
    assert!(!EntryType::dir().has_payload());
    assert_eq!(EntryType::fifo().as_byte(), b'6');
}

#[test]
fn entry_header_parse() {
    let mut h = Header::new();
    t!(h.set_path_bytes(b"dir"));
    h.set_entry_type(EntryType::dir());
    h.set_mode(0o755);
    // A size on a directory is ignored.
    h.set_size(100);
    h.set_cksum();

    let e = t!(EntryHeader::parse(&h, None, None));
    assert!(e.is_dir());
    assert_eq!(e.size(), 0);
    assert_eq!(e.mode(), 0o755);
    assert_eq!(e.path_bytes(), b"dir");
    assert_eq!(e.cksum(), t!(h.cksum()));

    let e = t!(EntryHeader::parse(&h, Some(b"very/long\0".to_vec()), None));
    assert_eq!(e.path_bytes(), b"very/long");
}

#[test]
fn entry_header_setters() {
    let mut e = EntryHeader::new(b"f", EntryType::file());
    e.set_size(10);
    assert_eq!(e.size(), 10);
    e.set_entry_type(EntryType::hard_link());
    assert_eq!(e.size(), 0);
    e.set_size(10);
    assert_eq!(e.size(), 0);
    assert!(e.link_name().unwrap().is_none());
    e.set_link_name(b"g");
    assert_eq!(e.link_name().unwrap().unwrap().to_str(), Some("g"));
}
