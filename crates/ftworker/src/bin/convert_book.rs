//! Generates the 8 D4-symmetry transforms of a gomoku opening book.
//! Grounded on `original_source/books/gomoku/convert.py`: each opening
//! line is a run of `x,y` stones, expanded into 8 geometric variants
//! (identity, 3 rotations, and their mirrors).
//!
//! Not on the worker's hot path; a standalone book-preparation tool.
//!
//! SPEC_FULL.md §9 Open Question (a): the original calls `check_pos` and
//! discards its result. This port enforces it: a transformed position with
//! an out-of-bounds coordinate is skipped, logged once at `warn`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use regex::Regex;

#[derive(clap::Parser, Debug)]
#[command(about = "expand a gomoku opening book into its 8 D4-symmetry transforms")]
struct Cli {
    /// Source book file: one opening per line, each a run of algebraic stones.
    srcfile: PathBuf,
    /// Destination file to write the 8x-expanded book to.
    dstfile: PathBuf,
    /// Board side length.
    #[arg(long, default_value_t = 15)]
    size: i32,
}

type Pos = (i32, i32);

/// The 8 dihedral-group transforms applied to a zero-based `(x, y)` stone,
/// matching `convert.py`'s `mapping_list` (`sx`/`sy` = `size - 1`).
fn apply_transform(pos: &[Pos], size: i32, transform: usize) -> Vec<Pos> {
    let s = size - 1;
    pos.iter()
        .map(|&(x, y)| match transform {
            0 => (x, y),
            1 => (y, s - x),
            2 => (s - x, s - y),
            3 => (s - y, x),
            4 => (x, s - y),
            5 => (s - x, y),
            6 => (y, x),
            7 => (s - y, s - x),
            _ => unreachable!("only 8 D4 transforms exist"),
        })
        .collect()
}

fn check_pos(pos: &[Pos], size: i32) -> bool {
    pos.iter().all(|&(x, y)| (0..size).contains(&x) && (0..size).contains(&y))
}

fn pos_to_str(pos: &[Pos]) -> String {
    pos.iter().map(|&(x, y)| format!("{}{}", (b'a' + x as u8) as char, y + 1)).collect()
}

fn parse_line(stone_re: &Regex, line: &str) -> Vec<Pos> {
    stone_re
        .find_iter(&line.to_ascii_lowercase())
        .filter_map(|m| {
            let s = m.as_str();
            let (file, rank) = s.split_at(1);
            let x = file.chars().next()?.to_ascii_lowercase() as i32 - 'a' as i32;
            let y: i32 = rank.parse().ok()?;
            Some((x, y - 1))
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let stone_re = Regex::new(r"[a-z][1-9][0-9]?").expect("static regex");

    let text = fs::read_to_string(&cli.srcfile)
        .with_context(|| format!("reading source book {}", cli.srcfile.display()))?;
    let positions: Vec<Vec<Pos>> =
        text.lines().filter(|l| !l.is_empty()).map(|l| parse_line(&stone_re, l)).collect();

    let mut out = String::new();
    let mut skipped = 0u32;
    for transform in 0..8 {
        for pos in &positions {
            let transformed = apply_transform(pos, cli.size, transform);
            if !check_pos(&transformed, cli.size) {
                skipped += 1;
                continue;
            }
            out.push_str(&pos_to_str(&transformed));
            out.push('\n');
        }
    }
    if skipped > 0 {
        log::warn!("skipped {skipped} out-of-bounds transformed openings");
    }
    fs::write(&cli.dstfile, out)
        .with_context(|| format!("writing expanded book {}", cli.dstfile.display()))?;
    log::info!(
        "wrote {} transformed openings ({} source lines x 8) to {}",
        positions.len() * 8 - skipped as usize,
        positions.len(),
        cli.dstfile.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_is_unchanged() {
        let pos = vec![(3, 4), (7, 7)];
        assert_eq!(apply_transform(&pos, 15, 0), pos);
    }

    #[test]
    fn rotation_matches_hand_computed_example() {
        // transform 1: (x,y) -> (y, sy-x), sy=14 for size=15
        let pos = vec![(0, 0)];
        assert_eq!(apply_transform(&pos, 15, 1), vec![(0, 14)]);
    }

    #[test]
    fn out_of_bounds_transform_is_rejected() {
        // A transform never actually produces out-of-range coordinates for
        // in-range input under D4 symmetry; check_pos still guards
        // hypothetically malformed source positions.
        assert!(!check_pos(&[(15, 0)], 15));
        assert!(check_pos(&[(14, 14)], 15));
    }

    #[test]
    fn parses_and_stringifies_roundtrip() {
        let re = Regex::new(r"[a-z][1-9][0-9]?").unwrap();
        let parsed = parse_line(&re, "h8i9");
        assert_eq!(parsed, vec![(7, 7), (8, 8)]);
        assert_eq!(pos_to_str(&parsed), "h8i9");
    }
}
