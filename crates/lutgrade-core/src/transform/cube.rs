//! `.cube` text parsing.
//!
//! Two entry points: [`parse_cube_strict`] reports exactly what is wrong
//! with a file, while [`parse_lut`] never fails and substitutes a generated
//! identity LUT for anything it cannot use.

use crate::error::LutError;
use crate::transform::lut::{
    DEFAULT_LUT_SIZE, LutTable, entry_count, validate_domain, validate_size,
};

/// Header state accumulated while scanning a file.
#[derive(Debug, Default)]
struct CubeHeader {
    size: Option<u32>,
    title: Option<String>,
}

/// Parse `.cube` bytes into a LUT, falling back instead of failing.
///
/// Bytes are decoded as UTF-8 (invalid sequences replaced). When the content
/// is unusable the failure is logged and an identity LUT is returned, sized
/// to the declared `LUT_3D_SIZE` when one was read and [`DEFAULT_LUT_SIZE`]
/// otherwise.
pub fn parse_lut(bytes: &[u8]) -> LutTable {
    let text = String::from_utf8_lossy(bytes);
    match parse_inner(&text) {
        Ok(lut) => lut,
        Err((error, header)) => {
            let size = header.size.unwrap_or(DEFAULT_LUT_SIZE);
            let title = header
                .title
                .unwrap_or_else(|| "Fallback Identity".to_string());
            tracing::warn!(
                "invalid .cube file {title:?}: {error}; using generated identity LUT of size {size}"
            );
            LutTable::identity_unchecked(size).with_title(title)
        }
    }
}

/// Parse `.cube` text, returning the first problem found.
pub fn parse_cube_strict(text: &str) -> Result<LutTable, LutError> {
    parse_inner(text).map_err(|(error, _)| error)
}

fn parse_inner(text: &str) -> Result<LutTable, (LutError, CubeHeader)> {
    let mut header = CubeHeader::default();
    let mut domain_min = [0.0f32; 3];
    let mut domain_max = [1.0f32; 3];
    let mut points: Vec<[f32; 3]> = Vec::new();

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_no = line_no + 1;

        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };

        let step = match keyword {
            "TITLE" => {
                header.title = Some(parse_title(line));
                Ok(())
            }
            "LUT_3D_SIZE" => parse_size(tokens.next(), line_no).map(|size| {
                header.size = Some(size);
                if points.capacity() == 0 {
                    points.reserve(entry_count(size));
                }
            }),
            "LUT_1D_SIZE" => Err(LutError::UnsupportedDimensionality),
            "DOMAIN_MIN" => parse_triplet(tokens, line_no).map(|v| domain_min = v),
            "DOMAIN_MAX" => parse_triplet(tokens, line_no).map(|v| domain_max = v),
            "LUT_3D_INPUT_RANGE" => parse_range(tokens, line_no).map(|(lo, hi)| {
                domain_min = [lo; 3];
                domain_max = [hi; 3];
            }),
            _ if looks_numeric(keyword) => {
                match header.size {
                    None => {
                        tracing::debug!("line {line_no}: data row before LUT_3D_SIZE, skipped");
                    }
                    Some(size) if points.len() >= entry_count(size) => {
                        tracing::debug!("line {line_no}: data row past {size}^3 entries, ignored");
                    }
                    Some(_) => match parse_triplet(line.split_whitespace(), line_no) {
                        Ok(v) => points.push(v),
                        Err(error) => tracing::debug!("skipping data row: {error}"),
                    },
                }
                Ok(())
            }
            _ => {
                tracing::debug!("line {line_no}: skipping unrecognized keyword {keyword:?}");
                Ok(())
            }
        };

        if let Err(error) = step {
            return Err((error, header));
        }
    }

    let Some(size) = header.size else {
        return Err((LutError::MissingSize, header));
    };
    let expected = entry_count(size);
    if points.len() != expected {
        let error = LutError::PointCount {
            size,
            expected,
            found: points.len(),
        };
        return Err((error, header));
    }
    if let Err(error) = validate_domain(domain_min, domain_max) {
        return Err((error, header));
    }

    tracing::debug!(
        "parsed .cube {:?}: size {size}, {} points",
        header.title,
        points.len()
    );

    let mut lut = match LutTable::new(size, points) {
        Ok(lut) => lut,
        Err(error) => return Err((error, header)),
    };
    if domain_min != [0.0; 3] || domain_max != [1.0; 3] {
        lut = match lut.with_domain(domain_min, domain_max) {
            Ok(lut) => lut,
            Err(error) => return Err((error, header)),
        };
    }
    if let Some(title) = header.title {
        lut = lut.with_title(title);
    }
    Ok(lut)
}

/// Text between the first and last double quote; the raw remainder if unquoted.
fn parse_title(line: &str) -> String {
    let rest = line["TITLE".len()..].trim();
    match (rest.find('"'), rest.rfind('"')) {
        (Some(start), Some(end)) if end > start => rest[start + 1..end].to_string(),
        _ => rest.trim_matches('"').to_string(),
    }
}

fn parse_size(token: Option<&str>, line: usize) -> Result<u32, LutError> {
    let token = token.unwrap_or_default();
    let size: i64 = token.parse().map_err(|_| LutError::InvalidNumber {
        line,
        token: token.to_string(),
    })?;
    validate_size(size)
}

fn parse_triplet<'a>(
    mut tokens: impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<[f32; 3], LutError> {
    let mut out = [0.0f32; 3];
    for slot in &mut out {
        let token = tokens.next().unwrap_or_default();
        *slot = parse_float(token, line)?;
    }
    Ok(out)
}

fn parse_range<'a>(
    mut tokens: impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<(f32, f32), LutError> {
    let lo = parse_float(tokens.next().unwrap_or_default(), line)?;
    let hi = parse_float(tokens.next().unwrap_or_default(), line)?;
    Ok((lo, hi))
}

fn parse_float(token: &str, line: usize) -> Result<f32, LutError> {
    token
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LutError::InvalidNumber {
            line,
            token: token.to_string(),
        })
}

fn looks_numeric(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
}
