//! Opening Book (SPEC_FULL.md §4.C): loads per-variant book files and
//! samples openings for a task.
//!
//! Grounded on `original_source/fishtest.py`'s `Tester.load_books`/
//! `add_task`'s sampling and on `original_source/jieqi/game.py`'s
//! `generate_random_board_info_from_fen`.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::match_engine::jieqi::{Cell, JieqiBoardInfo};
use crate::task::Variant;

/// One variant's book directory: file stem -> non-empty lines.
pub type BookSet = HashMap<String, Vec<String>>;

/// Loads every `.txt`/`.epd` file (plain lines) and `.zip` archive
/// (concatenated member contents) in `dir` into a book set, matching
/// `Tester.load_books`.
pub fn load_books(dir: &Path, extensions: &[&str]) -> Result<BookSet> {
    let mut books = BookSet::new();
    if !dir.is_dir() {
        return Ok(books);
    }
    for entry in fs::read_dir(dir).with_context(|| format!("reading book dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name).to_string();
        if extensions.iter().any(|ext| file_name.ends_with(ext)) {
            let text = fs::read_to_string(&path).with_context(|| format!("reading book {}", path.display()))?;
            books.insert(stem, text.lines().filter(|l| !l.is_empty()).map(str::to_string).collect());
        } else if file_name.ends_with(".zip") {
            let file = fs::File::open(&path).with_context(|| format!("opening book archive {}", path.display()))?;
            let mut zip = zip::ZipArchive::new(file).with_context(|| format!("reading zip {}", path.display()))?;
            let mut lines = Vec::new();
            for i in 0..zip.len() {
                let mut member = zip.by_index(i)?;
                let mut text = String::new();
                member.read_to_string(&mut text)?;
                lines.extend(text.lines().filter(|l| !l.is_empty()).map(str::to_string));
            }
            books.insert(stem, lines);
        }
    }
    Ok(books)
}

/// The default per-variant book directory name (§6 filesystem layout).
pub fn book_subdir(variant: Variant) -> &'static str {
    match variant {
        Variant::Xiangqi => "xiangqi",
        Variant::Jieqi => "jieqi",
        Variant::Chess => "chess",
        Variant::GomokuFreestyle20 => "gomoku/f20",
        Variant::GomokuFreestyle15 => "gomoku/f15",
        Variant::GomokuStandard15 => "gomoku/s15",
        Variant::GomokuRenju15 => "gomoku/r15",
    }
}

/// Samples `k` opening lines from `lines`, without replacement when enough
/// exist, otherwise from a `k`-times-replicated pool (matching
/// `Tester.add_task`'s `random.sample(book_extend, count // 2)` fallback).
pub fn sample(lines: &[String], k: usize) -> Vec<String> {
    if lines.is_empty() || k == 0 {
        return Vec::new();
    }
    let mut rng = rand::rng();
    if lines.len() >= k {
        let indices = rand::seq::index::sample(&mut rng, lines.len(), k);
        indices.into_iter().map(|i| lines[i].clone()).collect()
    } else {
        let mut pool: Vec<String> = Vec::with_capacity(lines.len() * k);
        for _ in 0..k {
            pool.extend(lines.iter().cloned());
        }
        let indices = rand::seq::index::sample(&mut rng, pool.len(), k.min(pool.len()));
        indices.into_iter().map(|i| pool[i].clone()).collect()
    }
}

/// Parses a `piece1count1piece2count2...` run (e.g. `r2a2c2p5`) into
/// per-letter counts, matching `JieQi.get_rest_from_str`.
fn parse_rest_counts(s: &str) -> HashMap<char, u32> {
    let mut rest = HashMap::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i + 1 < chars.len() {
        let piece = chars[i];
        let mut j = i + 1;
        while j < chars.len() && chars[j].is_ascii_digit() {
            j += 1;
        }
        let count: u32 = chars[i + 1..j].iter().collect::<String>().parse().unwrap_or(0);
        rest.insert(piece, count);
        i = j;
    }
    rest
}

/// Expands a jieqi book line (`rows rest side`) into a `JieqiBoardInfo` with
/// hidden squares randomly assigned real pieces, matching
/// `JieQi.generate_random_board_info_from_fen`.
pub fn expand_jieqi_fen(fen: &str) -> Result<JieqiBoardInfo> {
    let mut parts = fen.split_whitespace();
    let rows_field = parts.next().context("empty jieqi book line")?;
    let rest_field = parts.next().context("jieqi book line missing rest-piece field")?;
    let side_field = parts.next().unwrap_or("w");
    let side = if side_field == "b" { "b" } else { "w" }.to_string();

    let rest = parse_rest_counts(rest_field);
    let mut rest_red: Vec<char> = Vec::new();
    let mut rest_black: Vec<char> = Vec::new();
    for (piece, count) in &rest {
        if piece.is_uppercase() {
            rest_red.extend(std::iter::repeat(*piece).take(*count as usize));
        } else {
            rest_black.extend(std::iter::repeat(*piece).take(*count as usize));
        }
    }
    let mut rng = rand::rng();
    rest_red.shuffle(&mut rng);
    rest_black.shuffle(&mut rng);

    let mut board = Vec::new();
    for row in rows_field.split('/') {
        let mut board_row = Vec::new();
        for c in row.chars() {
            if let Some(n) = c.to_digit(10) {
                for _ in 0..n {
                    board_row.push(Cell { piece: String::new(), visible: true });
                }
                continue;
            }
            let cell = match c {
                'k' | 'K' => Cell { piece: c.to_string(), visible: true },
                'x' => Cell { piece: pop_random(&mut rest_black)?.to_string(), visible: false },
                'X' => Cell { piece: pop_random(&mut rest_red)?.to_string(), visible: false },
                'f' => Cell { piece: pop_random(&mut rest_black)?.to_string(), visible: true },
                'F' => Cell { piece: pop_random(&mut rest_red)?.to_string(), visible: true },
                other => Cell { piece: other.to_string(), visible: false },
            };
            board_row.push(cell);
        }
        board.push(board_row);
    }
    Ok(JieqiBoardInfo { board, side, moves: Vec::new() })
}

fn pop_random(pool: &mut Vec<char>) -> Result<char> {
    pool.pop().ok_or_else(|| anyhow::anyhow!("jieqi book line exhausted its hidden-piece pool"))
}

pub fn ensure_book_loaded(books: &BookSet, name: &str, default: &str) -> Result<&Vec<String>> {
    if let Some(lines) = books.get(name) {
        return Ok(lines);
    }
    books.get(default).ok_or_else(|| {
        anyhow::Error::msg(format!("neither book '{name}' nor default book '{default}' is loaded"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_without_replacement_when_enough_lines() {
        let lines: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let sampled = sample(&lines, 4);
        assert_eq!(sampled.len(), 4);
        let mut unique = sampled.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn samples_with_replacement_when_too_few_lines() {
        let lines = vec!["a".to_string(), "b".to_string()];
        let sampled = sample(&lines, 5);
        assert_eq!(sampled.len(), 5);
        assert!(sampled.iter().all(|s| s == "a" || s == "b"));
    }

    #[test]
    fn parses_rest_counts() {
        let counts = parse_rest_counts("r2a2c2p5n2b2R2A2C2P5N2B2");
        assert_eq!(counts.get(&'r'), Some(&2));
        assert_eq!(counts.get(&'p'), Some(&5));
        assert_eq!(counts.get(&'P'), Some(&5));
    }

    #[test]
    fn expands_hidden_squares_into_real_pieces() {
        let fen = "xxxxkxxxx/9/1x5x1/x1x1x1x1x/9/4F4/X1X3X1X/1X5X1/9/XXXXKXXXX \
                   r2a2c2p5n2b2R2A2C2P5N2B2 b";
        let info = expand_jieqi_fen(fen).unwrap();
        assert_eq!(info.side, "b");
        assert_eq!(info.board.len(), 10);
        let first_cell = &info.board[0][0];
        assert!(!first_cell.piece.is_empty());
        assert!(!first_cell.visible);
    }
}
