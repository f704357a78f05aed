use std::sync::atomic::{AtomicU64, Ordering};

use super::*;

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_path(name: &str) -> path::PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("s4-util-test-{}-{}-{}", std::process::id(), n, name))
}

#[test]
fn test_open_file_w_creates_and_appends() {
    let path = temp_path("w.bin");
    {
        let mut fd = open_file_w(&path, false).unwrap();
        use std::io::Write;
        fd.write_all(b"hello").unwrap();
    }
    {
        let mut fd = open_file_w(&path, true).unwrap();
        use std::io::Write;
        fd.write_all(b" world").unwrap();
    }
    let contents = fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "hello world");
    let _ = fs::remove_file(&path);
}

#[test]
fn test_open_file_r_reads_existing() {
    let path = temp_path("r.bin");
    fs::write(&path, b"data").unwrap();
    let mut fd = open_file_r(&path).unwrap();
    let mut buf = String::new();
    fd.read_to_string(&mut buf).unwrap();
    assert_eq!(buf, "data");
    let _ = fs::remove_file(&path);
}

#[test]
fn test_open_file_r_missing_file_errors() {
    let path = temp_path("missing.bin");
    assert!(open_file_r(&path).is_err());
}

#[test]
fn test_try_convert_succeeds_in_range() {
    let v: Result<u8, Error> = try_convert(200i32, "byte");
    assert_eq!(v.unwrap(), 200u8);
}

#[test]
fn test_try_convert_fails_out_of_range() {
    let v: Result<u8, Error> = try_convert(1000i32, "byte");
    assert!(matches!(v, Err(Error::Incons(_))));
}

#[test]
fn test_read_exact_returns_requested_bytes() {
    let path = temp_path("exact.bin");
    fs::write(&path, b"0123456789").unwrap();
    let mut fd = fs::File::open(&path).unwrap();
    let got = read_exact(&mut fd, 2, 4, "test").unwrap();
    assert_eq!(got, b"2345");
    let _ = fs::remove_file(&path);
}

#[test]
fn test_read_exact_short_read_errors() {
    let path = temp_path("short.bin");
    fs::write(&path, b"abc").unwrap();
    let mut fd = fs::File::open(&path).unwrap();
    let result = read_exact(&mut fd, 0, 10, "test");
    assert!(matches!(result, Err(Error::Incons(_))));
    let _ = fs::remove_file(&path);
}

#[test]
fn test_collate_key_folds_accents_and_case() {
    assert_eq!(collate_key("Béta"), collate_key("beta"));
    assert_ne!(collate_key("Beta"), collate_key("Gamma"));
}

#[test]
fn test_collate_key_is_lowercase() {
    assert_eq!(collate_key("ABC"), "abc");
}
