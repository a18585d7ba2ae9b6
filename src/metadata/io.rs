// src/metadata/io.rs

//! Line-oriented serialization of unit sets
//!
//! Each record is one line: `{crc32_hex}|{json}`. A file is a `Header`
//! record carrying the unit count, one `Unit` record per unit, and an `End`
//! record repeating the count. An empty set therefore still produces a
//! two-line file, and a truncated or damaged file is detected instead of
//! reading back as an empty set.

use super::unit::InstallableUnit;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use tracing::debug;

/// Format identifier written into every header
pub const FORMAT_NAME: &str = "provisioner-units";

/// Current format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Record {
    Header { format: String, version: u32, count: usize },
    Unit { unit: InstallableUnit },
    End { count: usize },
}

fn write_record<W: Write>(writer: &mut W, record: &Record) -> Result<()> {
    let json = serde_json::to_string(record)?;
    let crc = crc32fast::hash(json.as_bytes());
    writeln!(writer, "{:08x}|{}", crc, json)?;
    Ok(())
}

/// Serialize a unit set to a writer
pub fn write_units<'a, W, I>(writer: &mut W, units: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a InstallableUnit>,
{
    let units: Vec<&InstallableUnit> = units.into_iter().collect();
    write_record(
        writer,
        &Record::Header {
            format: FORMAT_NAME.to_string(),
            version: FORMAT_VERSION,
            count: units.len(),
        },
    )?;
    for unit in &units {
        write_record(
            writer,
            &Record::Unit {
                unit: (*unit).clone(),
            },
        )?;
    }
    write_record(writer, &Record::End { count: units.len() })?;
    writer.flush()?;
    Ok(())
}

fn parse_line(line: &str, line_num: usize) -> Result<Record> {
    let (crc_hex, json) = line.split_once('|').ok_or_else(|| {
        Error::Deserialization(format!("line {}: missing checksum delimiter", line_num))
    })?;
    let expected = u32::from_str_radix(crc_hex, 16).map_err(|_| {
        Error::Deserialization(format!("line {}: invalid checksum '{}'", line_num, crc_hex))
    })?;
    let actual = crc32fast::hash(json.as_bytes());
    if expected != actual {
        return Err(Error::Deserialization(format!(
            "line {}: checksum mismatch (expected {:08x}, got {:08x})",
            line_num, expected, actual
        )));
    }
    serde_json::from_str(json)
        .map_err(|e| Error::Deserialization(format!("line {}: {}", line_num, e)))
}

/// Undecodable text is damage, not an I/O failure
fn read_line(line: std::io::Result<String>, line_num: usize) -> Result<String> {
    line.map_err(|e| match e.kind() {
        ErrorKind::InvalidData => Error::Deserialization(format!("line {}: {}", line_num, e)),
        _ => e.into(),
    })
}

/// Deserialize a unit set from a reader
///
/// The header count is checked against the records actually read; it is
/// never used to size allocations.
pub fn read_units<R: BufRead>(reader: R) -> Result<Vec<InstallableUnit>> {
    let mut lines = reader.lines().enumerate();

    let declared = match lines.next() {
        Some((_, line)) => match parse_line(&read_line(line, 1)?, 1)? {
            Record::Header {
                format,
                version,
                count,
            } => {
                if format != FORMAT_NAME {
                    return Err(Error::Deserialization(format!(
                        "unknown format '{}'",
                        format
                    )));
                }
                if version > FORMAT_VERSION {
                    return Err(Error::Deserialization(format!(
                        "unsupported format version {}",
                        version
                    )));
                }
                count
            }
            _ => return Err(Error::Deserialization("missing header record".to_string())),
        },
        None => return Err(Error::Deserialization("empty input".to_string())),
    };

    let mut units = Vec::new();
    let mut terminated = false;
    for (idx, line) in lines {
        let line = read_line(line, idx + 1)?;
        if line.is_empty() {
            continue;
        }
        if terminated {
            return Err(Error::Deserialization(format!(
                "line {}: data after end record",
                idx + 1
            )));
        }
        match parse_line(&line, idx + 1)? {
            Record::Unit { unit } => {
                for req in &unit.requirements {
                    req.validate()
                        .map_err(|e| Error::Deserialization(e.to_string()))?;
                }
                if units.len() == declared {
                    return Err(Error::Deserialization(format!(
                        "line {}: more units than the {} declared",
                        idx + 1,
                        declared
                    )));
                }
                units.push(unit);
            }
            Record::End { count } => {
                if count != declared || units.len() != declared {
                    return Err(Error::Deserialization(format!(
                        "count mismatch: header {}, end {}, read {}",
                        declared,
                        count,
                        units.len()
                    )));
                }
                terminated = true;
            }
            Record::Header { .. } => {
                return Err(Error::Deserialization(format!(
                    "line {}: unexpected header",
                    idx + 1
                )));
            }
        }
    }

    if !terminated {
        return Err(Error::Deserialization(format!(
            "truncated input: read {} of {} units without end record",
            units.len(),
            declared
        )));
    }
    Ok(units)
}

/// Write a unit set to `path`, replacing any existing file
pub fn save_units<'a, I>(path: &Path, units: I) -> Result<()>
where
    I: IntoIterator<Item = &'a InstallableUnit>,
{
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write_units(&mut writer, units)?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    debug!("Saved unit set to {}", path.display());
    Ok(())
}

/// Read a unit set from `path`
pub fn load_units(path: &Path) -> Result<Vec<InstallableUnit>> {
    let file = File::open(path)
        .map_err(|e| Error::IoError(format!("{}: {}", path.display(), e)))?;
    read_units(BufReader::new(file))
}
