//! Per-page annotation records.
//!
//! One record per page image, stored next to it as `<page-basename>.ann`.
//! The first line holds the annotation count; each annotation follows as ten
//! lines: x, y, text, point size, family, style, weight, encoding, face name,
//! view mode.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use pageturner_core::{Annotation, Error, FontSpec, Result, ViewMode, single_line};

pub const ANNOTATION_EXTENSION: &str = "ann";

const FIELDS_PER_ANNOTATION: usize = 10;

pub fn annotation_path(page_path: &Path) -> PathBuf {
    page_path.with_extension(ANNOTATION_EXTENSION)
}

pub fn encode_annotations(annotations: &[Annotation]) -> String {
    let mut lines = Vec::with_capacity(1 + annotations.len() * FIELDS_PER_ANNOTATION);
    lines.push(annotations.len().to_string());
    for a in annotations {
        lines.push(a.x.to_string());
        lines.push(a.y.to_string());
        lines.push(single_line(&a.text));
        lines.push(a.font.point_size.to_string());
        lines.push(a.font.family.to_string());
        lines.push(a.font.style.to_string());
        lines.push(a.font.weight.to_string());
        lines.push(a.font.encoding.to_string());
        lines.push(single_line(&a.font.face_name));
        lines.push(a.mode.as_str().to_string());
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Decodes a whole record. Any inconsistency fails the page as a unit.
pub fn decode_annotations(record: &str) -> Result<Vec<Annotation>> {
    let mut lines: Vec<&str> = record
        .lines()
        .map(|line| line.trim_end_matches(['\r', '\n']))
        .collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    let Some(first) = lines.first() else {
        return Ok(Vec::new());
    };

    let count = first.trim().parse::<usize>().map_err(|_| {
        Error::MalformedRecord(format!("annotation count is not a number: {first:?}"))
    })?;
    let expected = count
        .checked_mul(FIELDS_PER_ANNOTATION)
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| Error::MalformedRecord(format!("annotation count too large: {count}")))?;
    if lines.len() != expected {
        return Err(Error::MalformedRecord(format!(
            "expected {expected} lines for {count} annotations, found {}",
            lines.len()
        )));
    }

    let mut out = Vec::with_capacity(count);
    for fields in lines[1..].chunks_exact(FIELDS_PER_ANNOTATION) {
        let mode = fields[9].trim().parse::<ViewMode>().map_err(|_| {
            Error::MalformedRecord(format!("unknown view mode tag: {:?}", fields[9]))
        })?;
        out.push(Annotation {
            x: int_field(fields[0], "x")?,
            y: int_field(fields[1], "y")?,
            text: fields[2].to_string(),
            font: FontSpec {
                point_size: int_field(fields[3], "point size")?,
                family: int_field(fields[4], "font family")?,
                style: int_field(fields[5], "font style")?,
                weight: int_field(fields[6], "font weight")?,
                encoding: int_field(fields[7], "encoding")?,
                face_name: fields[8].to_string(),
            },
            mode,
        });
    }
    Ok(out)
}

/// Loads the record for a page; a missing record means no annotations.
pub fn load_annotations(page_path: &Path) -> Result<Vec<Annotation>> {
    let path = annotation_path(page_path);
    match fs::read_to_string(&path) {
        Ok(record) => decode_annotations(&record),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

pub fn save_annotations(page_path: &Path, annotations: &[Annotation]) -> Result<()> {
    let path = annotation_path(page_path);
    fs::write(&path, encode_annotations(annotations))?;
    tracing::debug!(path = %path.display(), count = annotations.len(), "saved annotations");
    Ok(())
}

fn int_field(value: &str, name: &str) -> Result<i32> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| Error::MalformedRecord(format!("{name} is not a number: {value:?}")))
}
