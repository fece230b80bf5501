//! Sensor payload parsing.
//!
//! The sensor firmware serves a small markup status page containing a table
//! with elements keyed `spo2` and `heartrate`, each holding an integer as
//! text. Nothing beyond "those two keys exist somewhere in the body" is
//! assumed about the document structure.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;

/// One successfully parsed set of vitals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VitalsReading {
    /// Blood oxygen saturation, percent.
    pub spo2: u32,
    /// Heart rate, beats per minute.
    pub heart_rate: u32,
}

// Matches an element carrying the key as an id/name/class-style attribute and
// captures its text content, e.g. `<td id="spo2"> 98 </td>`.
static SPO2_RE: LazyLock<Regex> = LazyLock::new(|| keyed_element("spo2"));
static HEARTRATE_RE: LazyLock<Regex> = LazyLock::new(|| keyed_element("heartrate"));

fn keyed_element(key: &str) -> Regex {
    // The key must match exactly: quoted values need the closing quote right
    // after it, unquoted values an attribute terminator, so `spo2x` (or a
    // `data-id` attribute) never satisfies the `spo2` pattern.
    let pattern = format!(
        r#"(?is)<[^>]*\s(?:id|name|class)\s*=\s*(?:(?:"{key}"|'{key}'|{key}[\s/])[^>]*|{key})>([^<]*)<"#
    );
    Regex::new(&pattern).expect("valid regex")
}

/// Extract SpO2 and heart rate from a raw sensor payload.
///
/// Fails when either keyed element is absent or its text is not an integer.
/// Pure; no assumptions about surrounding markup.
pub fn parse_vitals(payload: &str) -> Result<VitalsReading, ParseError> {
    let spo2 = extract(&SPO2_RE, "spo2", payload)?;
    let heart_rate = extract(&HEARTRATE_RE, "heartrate", payload)?;
    Ok(VitalsReading { spo2, heart_rate })
}

fn extract(re: &Regex, key: &'static str, payload: &str) -> Result<u32, ParseError> {
    let text = re
        .captures(payload)
        .and_then(|c| c.get(1))
        .ok_or(ParseError::MissingKey(key))?
        .as_str()
        .trim();

    text.parse().map_err(|_| ParseError::InvalidNumber {
        key,
        text: text.to_string(),
    })
}
