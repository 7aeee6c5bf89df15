//! Thin wrapper over the `tesseract` CLI in TSV mode.
//!
//! Both the layout detector and the OCR engine read the same TSV table:
//! one row per layout element with its level (page, block, paragraph,
//! line, word), bounding box, confidence, and text.

use crate::error::CollaboratorError;
use crate::state::{Region, TextBlock};
use std::path::Path;
use std::process::{Command, Stdio};

/// TSV `level` column values.
pub const LEVEL_BLOCK: u32 = 2;
pub const LEVEL_WORD: u32 = 5;

/// One parsed TSV row.
#[derive(Debug, Clone, PartialEq)]
pub struct TsvRow {
    pub level: u32,
    pub block_num: u32,
    pub par_num: u32,
    pub line_num: u32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub conf: f32,
    pub text: String,
}

/// Parse tesseract TSV output, skipping the header and malformed rows.
pub fn parse_tsv(tsv: &str) -> Vec<TsvRow> {
    tsv.lines()
        .filter(|line| !line.starts_with("level"))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 11 {
                return None;
            }
            let num = |i: usize| cols[i].trim().parse::<u32>().ok();
            Some(TsvRow {
                level: num(0)?,
                block_num: num(2)?,
                par_num: num(3)?,
                line_num: num(4)?,
                left: num(6)?,
                top: num(7)?,
                width: num(8)?,
                height: num(9)?,
                conf: cols[10].trim().parse().ok()?,
                text: cols.get(11).map(|t| t.trim().to_string()).unwrap_or_default(),
            })
        })
        .collect()
}

/// Block-level boxes, in reading order.
pub fn block_regions(rows: &[TsvRow]) -> Vec<Region> {
    rows.iter()
        .filter(|r| r.level == LEVEL_BLOCK && r.width > 0 && r.height > 0)
        .map(|r| Region {
            left: r.left,
            top: r.top,
            width: r.width,
            height: r.height,
        })
        .collect()
}

/// Group recognized words into lines; confidence is the mean word confidence in [0, 1].
pub fn line_blocks(rows: &[TsvRow]) -> Vec<TextBlock> {
    let mut lines: Vec<((u32, u32, u32), Vec<&TsvRow>)> = Vec::new();
    for row in rows
        .iter()
        .filter(|r| r.level == LEVEL_WORD && r.conf >= 0.0 && !r.text.is_empty())
    {
        let key = (row.block_num, row.par_num, row.line_num);
        match lines.last_mut() {
            Some((k, words)) if *k == key => words.push(row),
            _ => lines.push((key, vec![row])),
        }
    }

    lines
        .into_iter()
        .map(|(_, words)| {
            let text = words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let conf = words.iter().map(|w| w.conf).sum::<f32>() / words.len() as f32;
            TextBlock::new(text, conf / 100.0)
        })
        .collect()
}

/// Map short language names to tesseract codes, keeping order: `["hi", "en"]` → `hin+eng`.
pub fn language_codes(languages: &[String]) -> String {
    languages
        .iter()
        .map(|l| match l.as_str() {
            "en" => "eng",
            "hi" => "hin",
            "de" => "deu",
            "fr" => "fra",
            "es" => "spa",
            "ko" => "kor",
            "ja" => "jpn",
            "zh" => "chi_sim",
            other => other,
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// Run `tesseract <image> stdout -l <langs> --psm <psm> tsv` and parse the table.
pub fn run_tsv(
    tool: &str,
    image: &Path,
    languages: &str,
    psm: u8,
) -> Result<Vec<TsvRow>, CollaboratorError> {
    let output = Command::new(tool)
        .arg(image)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--psm")
        .arg(psm.to_string())
        .arg("tsv")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CollaboratorError::new(format!("{tool} not found; install tesseract-ocr"))
            } else {
                CollaboratorError::new(format!("failed to invoke {tool}: {e}"))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CollaboratorError::new(format!(
            "{tool} failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
}
