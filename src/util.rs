//! Module `util` collects small helpers shared across the log, snapshot
//! and value modules: file I/O wrappers with typed errors, integer
//! conversion helpers, and the collation-key stand-in used in place of a
//! full locale collator.

use std::convert::TryInto;
use std::fmt::Display;
use std::{
    fs,
    io::{self, Read, Seek},
    path,
};

use unicode_normalization::UnicodeNormalization;

use crate::error::Error;

/// Open `file` for appending. If `reuse` is false the file (and its
/// parent directory) is created fresh; if true an existing file is
/// opened for append.
pub(crate) fn open_file_w(file: &path::Path, reuse: bool) -> Result<fs::File, Error> {
    let mut opts = fs::OpenOptions::new();
    Ok(match reuse {
        false => {
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)?;
            }
            opts.append(true).create(true).open(file)?
        }
        true => opts.append(true).open(file)?,
    })
}

/// Open `file` for reading.
pub(crate) fn open_file_r(file: &path::Path) -> Result<fs::File, Error> {
    let mut opts = fs::OpenOptions::new();
    Ok(opts.read(true).open(file)?)
}

pub(crate) fn try_convert<T, U>(from: T, msg: &str) -> Result<U, Error>
where
    T: Copy + Display + TryInto<U>,
{
    match from.try_into() {
        Ok(to) => Ok(to),
        Err(_) => Err(Error::Incons(format!("{} for {}", msg, from))),
    }
}

pub(crate) fn read_exact(fd: &mut fs::File, fpos: u64, n: u64, msg: &str) -> Result<Vec<u8>, Error> {
    fd.seek(io::SeekFrom::Start(fpos))?;
    let mut buf = vec![0u8; n as usize];
    let got = fd.read(&mut buf)?;
    if got == buf.len() {
        Ok(buf)
    } else {
        Err(Error::Incons(format!("{}: short read, wanted {} got {}", msg, n, got)))
    }
}

/// A deterministic, locale-agnostic stand-in for a real collation
/// backend: NFKD-decompose, drop combining marks, lowercase. Good enough
/// to place "béta" next to "beta" rather than after every ASCII letter,
/// without pulling in ICU.
pub(crate) fn collate_key(s: &str) -> String {
    s.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF
    )
}

#[cfg(test)]
#[path = "util_test.rs"]
mod util_test;
