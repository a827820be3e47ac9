use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

use crate::core::chemistry;
use crate::core::domain::Configuration;
use crate::core::spatial;

#[derive(Debug, Error)]
pub enum PoscarError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unknown element symbol '{0}'")]
    UnknownElement(String),

    #[error("Atomic number {0} has no element symbol")]
    UnknownAtomicNumber(u8),
}

fn parse_err(line: usize, message: impl Into<String>) -> PoscarError {
    PoscarError::Parse {
        line: line + 1,
        message: message.into(),
    }
}

/// Renders a configuration as a VASP 5 POSCAR (cartesian coordinates).
///
/// Consecutive atoms of the same element form one block, so the atom order
/// of the file matches the configuration exactly.
pub fn write_poscar(config: &Configuration, comment: &str) -> Result<String, PoscarError> {
    let mut blocks: Vec<(u8, usize)> = Vec::new();
    for &z in config.species() {
        match blocks.last_mut() {
            Some((last, count)) if *last == z => *count += 1,
            _ => blocks.push((z, 1)),
        }
    }

    let mut s = String::with_capacity(256 + config.len() * 64);
    let header = if comment.is_empty() { "bhmc" } else { comment };
    // Writing into a String cannot fail
    let _ = writeln!(s, "{}", header.lines().next().unwrap_or("bhmc"));
    s.push_str("1.0\n");

    let m = config.cell();
    for r in 0..3 {
        let _ = writeln!(s, "  {:.10} {:.10} {:.10}", m[(r, 0)], m[(r, 1)], m[(r, 2)]);
    }

    let mut symbols = Vec::with_capacity(blocks.len());
    for (z, _) in &blocks {
        symbols.push(chemistry::symbol(*z).ok_or(PoscarError::UnknownAtomicNumber(*z))?);
    }
    let _ = writeln!(s, "  {}", symbols.join(" "));
    let counts: Vec<String> = blocks.iter().map(|(_, n)| n.to_string()).collect();
    let _ = writeln!(s, "  {}", counts.join(" "));

    s.push_str("Cartesian\n");
    for p in config.positions() {
        let _ = writeln!(s, "  {:.10} {:.10} {:.10}", p.x, p.y, p.z);
    }

    Ok(s)
}

pub fn write_poscar_file(
    path: &Path,
    config: &Configuration,
    comment: &str,
) -> Result<(), PoscarError> {
    let text = write_poscar(config, comment)?;
    fs::write(path, text)?;
    Ok(())
}

fn parse_floats(line: &str, idx: usize, count: usize) -> Result<Vec<f64>, PoscarError> {
    let values: Vec<f64> = line
        .split_whitespace()
        .take(count)
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| parse_err(idx, format!("invalid number: {}", e)))?;
    if values.len() < count {
        return Err(parse_err(idx, format!("expected {} numbers", count)));
    }
    Ok(values)
}

fn line_at<'a>(lines: &[&'a str], idx: usize) -> Result<&'a str, PoscarError> {
    lines
        .get(idx)
        .copied()
        .ok_or_else(|| parse_err(idx, "unexpected end of file"))
}

/// Parses a VASP 5 POSCAR/CONTCAR. Direct coordinates are converted to
/// cartesian; the scale factor (or target volume, if negative) is applied.
pub fn parse_poscar(text: &str) -> Result<Configuration, PoscarError> {
    let lines: Vec<&str> = text.lines().collect();
    let line = |idx: usize| line_at(&lines, idx);

    let scale = parse_floats(line(1)?, 1, 1)?[0];

    let mut cell = Matrix3::zeros();
    for r in 0..3 {
        let row = parse_floats(line(2 + r)?, 2 + r, 3)?;
        for c in 0..3 {
            cell[(r, c)] = row[c];
        }
    }

    let factor = if scale < 0.0 {
        let volume = cell.determinant().abs();
        if volume <= 0.0 {
            return Err(parse_err(1, "volume scaling requires a non-singular cell"));
        }
        (scale.abs() / volume).cbrt()
    } else {
        scale
    };
    cell *= factor;

    // VASP 5: element symbols precede the counts
    let symbol_line = line(5)?;
    if symbol_line
        .split_whitespace()
        .next()
        .map_or(true, |t| t.parse::<f64>().is_ok())
    {
        return Err(parse_err(5, "missing element symbols line (VASP 4 format is not supported)"));
    }
    let symbols: Vec<&str> = symbol_line.split_whitespace().collect();
    let counts: Vec<usize> = line(6)?
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| parse_err(6, format!("invalid atom count: {}", e)))?;
    if counts.len() != symbols.len() {
        return Err(parse_err(6, "number of counts does not match number of symbols"));
    }

    let mut species = Vec::new();
    for (sym, &n) in symbols.iter().zip(&counts) {
        let z = chemistry::atomic_number(sym)
            .ok_or_else(|| PoscarError::UnknownElement(sym.to_string()))?;
        species.extend(std::iter::repeat(z).take(n));
    }

    let mut idx = 7;
    if line(idx)?.trim_start().starts_with(|c: char| c == 'S' || c == 's') {
        idx += 1; // Selective dynamics
    }
    let cartesian = line(idx)?
        .trim_start()
        .starts_with(|c: char| matches!(c, 'C' | 'c' | 'K' | 'k'));
    idx += 1;

    let mut positions = Vec::with_capacity(species.len());
    for i in 0..species.len() {
        let v = parse_floats(line(idx + i)?, idx + i, 3)?;
        let p = Vector3::new(v[0], v[1], v[2]);
        positions.push(if cartesian {
            p * factor
        } else {
            spatial::to_cartesian(&cell, &p)
        });
    }

    Configuration::new(positions, cell, species).map_err(|e| parse_err(idx, e.to_string()))
}

pub fn read_poscar(path: &Path) -> Result<Configuration, PoscarError> {
    let text = fs::read_to_string(path)?;
    parse_poscar(&text)
}
