//! Persistence of drained result blocks.
//!
//! One text file per block, one scaled sample per line in `%.8e` notation.
//! Files for a run share a timestamp prefix so a directory listing groups
//! them; block numbering in filenames is 1-based.

use crate::core::ResultBlock;
use crate::error::{Error, Result};
use log::{info, warn};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Write every block under `dir`, returning the paths written in block order.
///
/// Each block is retried up to `attempts` times with a short backoff before
/// the whole call fails. Blocks already written stay on disk either way.
pub fn persist_blocks(
    blocks: &[ResultBlock],
    dir: &Path,
    run_stamp: &str,
    attempts: u32,
) -> Result<Vec<PathBuf>> {
    if blocks.is_empty() {
        info!("no result blocks to persist");
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(blocks.len());
    for block in blocks {
        let path = dir.join(format!("{run_stamp}_block{}.txt", block.index + 1));
        write_block(block, &path, attempts)?;
        info!("persisted {} samples to {}", block.len(), path.display());
        written.push(path);
    }
    Ok(written)
}

fn write_block(block: &ResultBlock, path: &Path, attempts: u32) -> Result<()> {
    let body = render(block);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match fs::write(path, &body) {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!(
                    "write attempt {attempt}/{attempts} for {} failed: {err}",
                    path.display()
                );
                last_err = Some(err);
                if attempt < attempts {
                    thread::sleep(Duration::from_millis(50 * u64::from(attempt)));
                }
            }
        }
    }
    Err(Error::Storage {
        attempts,
        // last_err is always set when the loop exhausts.
        source: last_err.unwrap_or_else(|| std::io::Error::other("no write attempted")),
    })
}

fn render(block: &ResultBlock) -> String {
    let mut body = String::with_capacity(block.len() * 16);
    for &sample in &block.samples {
        // writeln! to a String cannot fail.
        let _ = writeln!(body, "{}", format_sample(sample));
    }
    body
}

/// C-style `%.8e`: eight fractional digits and a signed, zero-padded,
/// at-least-two-digit exponent. Rust's `{:.8e}` emits `2.00000000e0`, which
/// the bench's downstream tooling does not accept.
fn format_sample(sample: f64) -> String {
    let rendered = format!("{sample:.8e}");
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_file_per_block_with_one_based_names() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = vec![
            ResultBlock {
                index: 0,
                samples: vec![1.0, 2.5],
            },
            ResultBlock {
                index: 1,
                samples: vec![-3.0],
            },
        ];
        let paths = persist_blocks(&blocks, dir.path(), "20260830_120000", 3).unwrap();
        assert_eq!(
            paths,
            vec![
                dir.path().join("20260830_120000_block1.txt"),
                dir.path().join("20260830_120000_block2.txt"),
            ]
        );
        let first = fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(first, "1.00000000e+00\n2.50000000e+00\n");
        let second = fs::read_to_string(&paths[1]).unwrap();
        assert_eq!(second, "-3.00000000e+00\n");
    }

    #[test]
    fn format_matches_c_style_exponent_notation() {
        assert_eq!(format_sample(0.0), "0.00000000e+00");
        assert_eq!(format_sample(2.0), "2.00000000e+00");
        assert_eq!(format_sample(-3.0), "-3.00000000e+00");
        assert_eq!(format_sample(2.5e-4), "2.50000000e-04");
        assert_eq!(format_sample(1.0e17), "1.00000000e+17");
    }

    #[test]
    fn empty_drain_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = persist_blocks(&[], dir.path(), "stamp", 3).unwrap();
        assert!(paths.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn exhausted_retries_surface_the_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory squatting on the target filename makes every write fail.
        fs::create_dir(dir.path().join("stamp_block1.txt")).unwrap();
        let blocks = vec![ResultBlock {
            index: 0,
            samples: vec![1.0],
        }];
        let err = persist_blocks(&blocks, dir.path(), "stamp", 2).unwrap_err();
        match err {
            Error::Storage { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
