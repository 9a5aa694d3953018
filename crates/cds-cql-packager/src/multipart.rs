//! Multipart body demultiplexing using nom.
//!
//! The translator answers with one `form-data` part per translated library:
//!
//! ```text
//! --Boundary_1
//! Content-Disposition: form-data; name="Statin-Use"
//! Content-Type: application/elm+json
//!
//! {"library": ...}
//! --Boundary_1--
//! ```
//!
//! Each part becomes one [`CompiledUnit`] named by its field name.

use std::collections::HashSet;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_until, take_while1},
    character::complete::{char, line_ending, multispace0, space0},
    multi::many0,
    sequence::{delimited, preceded, separated_pair, terminated, tuple},
    IResult,
};
use tracing::debug;

use crate::error::{PackagerError, PackagerResult};

/// One translated output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    /// Unit name (the submitted file's name without extension).
    pub name: String,
    /// Compiled content, ELM JSON text.
    pub content: String,
}

impl CompiledUnit {
    /// Creates a unit.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Checks that every unit name is a plain file stem, unique within `units`.
///
/// Unit names become archive entry names (`<name>.json`), so a name must not
/// be empty or carry a path separator, a `..` segment or a NUL byte.
pub fn validate_unit_names(units: &[CompiledUnit]) -> PackagerResult<()> {
    let mut seen = HashSet::with_capacity(units.len());
    for unit in units {
        let name = unit.name.as_str();
        let reason = if name.is_empty() {
            Some("empty name")
        } else if name.contains(['/', '\\']) {
            Some("contains a path separator")
        } else if name.contains("..") {
            Some("contains '..'")
        } else if name.contains('\0') {
            Some("contains a NUL byte")
        } else if !seen.insert(name) {
            Some("duplicate name")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(PackagerError::InvalidUnitName {
                name: name.to_string(),
                reason,
            });
        }
    }
    Ok(())
}

/// Splits a multipart body into compiled units, in part order.
///
/// # Example
///
/// ```rust
/// use cds_cql_packager::demultiplex;
///
/// let body = "--xyz\r\n\
///             Content-Disposition: form-data; name=\"Lib\"\r\n\
///             \r\n\
///             {}\r\n\
///             --xyz--\r\n";
/// let units = demultiplex("multipart/form-data; boundary=xyz", body.as_bytes()).unwrap();
/// assert_eq!(units[0].name, "Lib");
/// assert_eq!(units[0].content, "{}");
/// ```
pub fn demultiplex(content_type: &str, body: &[u8]) -> PackagerResult<Vec<CompiledUnit>> {
    let boundary = boundary(content_type)?;
    let body = std::str::from_utf8(body)
        .map_err(|e| PackagerError::Demultiplex(format!("body is not UTF-8: {e}")))?;

    let parts = match parts(body, boundary) {
        Ok((_, parts)) => parts,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let position = body.len() - e.input.len();
            return Err(PackagerError::Demultiplex(format!(
                "unexpected input at byte {position}: '{}'",
                truncate(e.input, 20)
            )));
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(PackagerError::Demultiplex("incomplete body".to_string()))
        }
    };

    let units = parts
        .into_iter()
        .enumerate()
        .map(|(index, part)| {
            let name = part.field_name().ok_or_else(|| {
                PackagerError::Demultiplex(format!("part {index} has no field name"))
            })?;
            Ok(CompiledUnit::new(name, part.content))
        })
        .collect::<PackagerResult<Vec<_>>>()?;
    validate_unit_names(&units)?;

    debug!(units = units.len(), "Demultiplexed translator response");
    Ok(units)
}

/// Extracts the boundary from a `multipart/*` content type.
fn boundary(content_type: &str) -> PackagerResult<&str> {
    let not_multipart = || PackagerError::NotMultipart {
        content_type: content_type.to_string(),
    };

    let (_, ((kind, _), parameters)) =
        tuple((media_type, many0(parameter)))(content_type.trim()).map_err(|_| not_multipart())?;
    if !kind.eq_ignore_ascii_case("multipart") {
        return Err(not_multipart());
    }

    parameters
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PackagerError::Demultiplex("content type has no boundary".to_string()))
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

// ============================================================================
// Header grammar
// ============================================================================

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))(input)
}

fn media_type(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(token, char('/'), token)(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_till(|c| c == '"'), char('"'))(input)
}

fn bare_value(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != ';' && !c.is_whitespace())(input)
}

/// `; name=value` or `; name="value"`.
fn parameter(input: &str) -> IResult<&str, (&str, &str)> {
    preceded(
        tuple((multispace0, char(';'), multispace0)),
        separated_pair(token, char('='), alt((quoted, bare_value))),
    )(input)
}

/// `Name: value` up to the end of the line.
fn header(input: &str) -> IResult<&str, (&str, &str)> {
    terminated(
        separated_pair(
            take_while1(|c: char| c != ':' && c != '\r' && c != '\n'),
            preceded(char(':'), space0),
            take_till(|c| c == '\r' || c == '\n'),
        ),
        line_ending,
    )(input)
}

// ============================================================================
// Body grammar
// ============================================================================

struct RawPart<'a> {
    headers: Vec<(&'a str, &'a str)>,
    content: &'a str,
}

impl<'a> RawPart<'a> {
    fn field_name(&self) -> Option<&'a str> {
        let disposition = self
            .headers
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-disposition"))
            .map(|(_, value)| *value)?;
        let (_, (_, parameters)) = tuple((token, many0(parameter)))(disposition.trim()).ok()?;
        parameters
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("name"))
            .map(|(_, value)| value)
    }
}

fn closing(input: &str) -> IResult<&str, &str> {
    tag("--")(input)
}

fn parts<'a>(input: &'a str, boundary: &str) -> IResult<&'a str, Vec<RawPart<'a>>> {
    let delimiter = format!("--{boundary}");
    let separator = format!("\r\n--{boundary}");

    let (mut input, _) = preceded(take_until(delimiter.as_str()), tag(delimiter.as_str()))(input)?;
    let mut parts = Vec::new();
    loop {
        if let Ok((rest, _)) = closing(input) {
            return Ok((rest, parts));
        }
        let (rest, headers) = delimited(line_ending, many0(header), line_ending)(input)?;
        let (rest, content) =
            terminated(take_until(separator.as_str()), tag(separator.as_str()))(rest)?;
        parts.push(RawPart { headers, content });
        input = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONTENT_TYPE: &str = "multipart/form-data; boundary=Boundary_1_2";

    fn body(parts: &[(&str, &str)]) -> String {
        let mut body = String::from("preamble\r\n");
        for (name, content) in parts {
            body.push_str("--Boundary_1_2\r\n");
            body.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n"));
            body.push_str("Content-Type: application/elm+json\r\n\r\n");
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str("--Boundary_1_2--\r\n");
        body
    }

    #[test]
    fn test_demultiplex_parts_in_order() {
        let body = body(&[
            ("Statin-Use", "{\"library\":{\"identifier\":{\"id\":\"Statin-Use\"}}}"),
            ("FHIRHelpers", "{\"library\":{}}"),
        ]);
        let units = demultiplex(CONTENT_TYPE, body.as_bytes()).unwrap();
        assert_eq!(
            units,
            vec![
                CompiledUnit::new("Statin-Use", "{\"library\":{\"identifier\":{\"id\":\"Statin-Use\"}}}"),
                CompiledUnit::new("FHIRHelpers", "{\"library\":{}}"),
            ]
        );
    }

    #[test]
    fn test_multiline_content_is_kept() {
        let body = body(&[("Lib", "{\n  \"a\": 1\r\n}")]);
        let units = demultiplex(CONTENT_TYPE, body.as_bytes()).unwrap();
        assert_eq!(units[0].content, "{\n  \"a\": 1\r\n}");
    }

    #[test]
    fn test_quoted_boundary() {
        let body = body(&[("Lib", "{}")]);
        let units = demultiplex("Multipart/Form-Data; boundary=\"Boundary_1_2\"", body.as_bytes())
            .unwrap();
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_empty_multipart() {
        let units = demultiplex(CONTENT_TYPE, b"--Boundary_1_2--\r\n").unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn test_not_multipart() {
        let err = demultiplex("text/html; charset=utf-8", b"<html></html>").unwrap_err();
        assert!(matches!(err, PackagerError::NotMultipart { ref content_type } if content_type.starts_with("text/html")));
        assert!(matches!(
            demultiplex("", b"").unwrap_err(),
            PackagerError::NotMultipart { .. }
        ));
    }

    #[test]
    fn test_missing_boundary() {
        let err = demultiplex("multipart/form-data", b"").unwrap_err();
        assert!(matches!(err, PackagerError::Demultiplex(_)));
    }

    #[test]
    fn test_unterminated_part() {
        let body = "--Boundary_1_2\r\nContent-Disposition: form-data; name=\"Lib\"\r\n\r\n{\"library\":";
        let err = demultiplex(CONTENT_TYPE, body.as_bytes()).unwrap_err();
        assert!(matches!(err, PackagerError::Demultiplex(_)));
    }

    #[test]
    fn test_part_without_name() {
        let body = "--Boundary_1_2\r\nContent-Type: text/plain\r\n\r\nx\r\n--Boundary_1_2--";
        let err = demultiplex(CONTENT_TYPE, body.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Malformed multipart response: part 0 has no field name");
    }

    #[test]
    fn test_traversal_field_name_is_rejected() {
        let body = body(&[("../../etc/evil", "{}")]);
        let err = demultiplex(CONTENT_TYPE, body.as_bytes()).unwrap_err();
        assert!(
            matches!(err, PackagerError::InvalidUnitName { ref name, .. } if name == "../../etc/evil"),
            "{err}"
        );
        assert!(err.is_translator_error());
    }

    #[test]
    fn test_duplicate_field_name_is_rejected() {
        let body = body(&[("Lib", "{}"), ("Lib", "{\"x\":1}")]);
        let err = demultiplex(CONTENT_TYPE, body.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid compiled unit name 'Lib': duplicate name");
    }

    #[test]
    fn test_validate_unit_names() {
        let ok = [CompiledUnit::new("Statin-Use", "{}"), CompiledUnit::new("FHIRHelpers", "{}")];
        assert!(validate_unit_names(&ok).is_ok());

        for bad in ["", "a/b", "a\\b", "..", "x..y", "nul\0"] {
            let err = validate_unit_names(&[CompiledUnit::new(bad, "{}")]).unwrap_err();
            assert!(matches!(err, PackagerError::InvalidUnitName { .. }), "{bad:?}");
        }
    }
}
