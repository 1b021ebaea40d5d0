//! Machine Readable Zone validation
//!
//! Parses ICAO 9303 TD1, TD2 and TD3 zones and verifies their check digits.
//! The pipeline only talks to [`PayloadValidator`]; [`IcaoValidator`] is the
//! default implementation.

pub mod gate;

pub use gate::CompletionGate;

use serde::Serialize;
use std::fmt;
use std::ops::Range;

/// Document layout, named after the ICAO size classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MrzFormat {
    /// Three lines of 30 characters (ID cards)
    Td1,
    /// Two lines of 36 characters
    Td2,
    /// Two lines of 44 characters (passports)
    Td3,
}

impl MrzFormat {
    fn detect(lines: &[&str]) -> Option<Self> {
        match lines {
            [a, b, c] if a.len() == 30 && b.len() == 30 && c.len() == 30 => Some(Self::Td1),
            [a, b] if a.len() == 36 && b.len() == 36 => Some(Self::Td2),
            [a, b] if a.len() == 44 && b.len() == 44 => Some(Self::Td3),
            _ => None,
        }
    }
}

impl fmt::Display for MrzFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Td1 => write!(f, "TD1"),
            Self::Td2 => write!(f, "TD2"),
            Self::Td3 => write!(f, "TD3"),
        }
    }
}

/// Fields of a validated zone. Dates are `YYMMDD` as printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MrzPayload {
    pub format: MrzFormat,
    pub document_code: String,
    pub issuing_state: String,
    pub document_number: String,
    pub nationality: String,
    pub birth_date: String,
    pub expiry_date: String,
    /// `M`, `F`, or `None` when unspecified
    pub sex: Option<char>,
    pub primary_identifier: String,
    pub secondary_identifier: String,
    pub optional_data: String,
    /// The validated lines joined with `\n`
    pub raw: String,
}

/// Confirms that recognized text is a complete document payload
pub trait PayloadValidator: Send {
    fn validate(&self, text: &str) -> Option<MrzPayload>;
}

/// Check digit validation per ICAO 9303
#[derive(Debug, Clone, Copy, Default)]
pub struct IcaoValidator;

impl PayloadValidator for IcaoValidator {
    fn validate(&self, text: &str) -> Option<MrzPayload> {
        parse_mrz(text)
    }
}

fn char_value(c: char) -> Option<u32> {
    match c {
        '0'..='9' => Some(c as u32 - '0' as u32),
        'A'..='Z' => Some(c as u32 - 'A' as u32 + 10),
        '<' => Some(0),
        _ => None,
    }
}

/// Compute the check digit of a field (weights 7, 3, 1 repeating)
pub fn check_digit(field: &str) -> Option<u8> {
    const WEIGHTS: [u32; 3] = [7, 3, 1];

    let mut sum = 0u32;
    for (i, c) in field.chars().enumerate() {
        sum += char_value(c)? * WEIGHTS[i % 3];
    }
    Some((sum % 10) as u8)
}

/// A field followed by its check character.
///
/// A filler check character is accepted only for an empty field.
fn verify(field: &str, check: char) -> bool {
    if check == '<' {
        return field.chars().all(|c| c == '<');
    }
    match (check_digit(field), check.to_digit(10)) {
        (Some(expected), Some(actual)) => expected as u32 == actual,
        _ => false,
    }
}

fn slice(line: &str, range: Range<usize>) -> &str {
    line.get(range).unwrap_or("")
}

fn at(line: &str, index: usize) -> char {
    line.as_bytes().get(index).map(|&b| b as char).unwrap_or('?')
}

fn field(line: &str, range: Range<usize>) -> String {
    slice(line, range).trim_end_matches('<').replace('<', " ")
}

fn names(field: &str) -> (String, String) {
    let (primary, secondary) = match field.split_once("<<") {
        Some((primary, secondary)) => (primary, secondary),
        None => (field, ""),
    };
    let clean = |s: &str| s.replace('<', " ").trim().to_string();
    (clean(primary), clean(secondary))
}

fn sex(c: char) -> Option<char> {
    matches!(c, 'M' | 'F').then_some(c)
}

/// Parse and validate a zone. Blank lines and spaces are ignored.
pub fn parse_mrz(text: &str) -> Option<MrzPayload> {
    let cleaned: Vec<String> = text
        .lines()
        .map(|line| line.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|line| !line.is_empty())
        .collect();
    let lines: Vec<&str> = cleaned.iter().map(String::as_str).collect();

    if !lines
        .iter()
        .all(|line| line.chars().all(|c| char_value(c).is_some()))
    {
        return None;
    }

    match MrzFormat::detect(&lines)? {
        MrzFormat::Td1 => parse_td1(lines[0], lines[1], lines[2]),
        format => parse_two_line(format, lines[0], lines[1]),
    }
}

fn parse_td1(l1: &str, l2: &str, l3: &str) -> Option<MrzPayload> {
    let checks = verify(slice(l1, 5..14), at(l1, 14))
        && verify(slice(l2, 0..6), at(l2, 6))
        && verify(slice(l2, 8..14), at(l2, 14));
    if !checks {
        return None;
    }

    let composite = [slice(l1, 5..30), slice(l2, 0..7), slice(l2, 8..15), slice(l2, 18..29)].concat();
    if !verify(&composite, at(l2, 29)) {
        return None;
    }

    let (primary_identifier, secondary_identifier) = names(l3);
    let optional_data = [field(l1, 15..30), field(l2, 18..29)]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Some(MrzPayload {
        format: MrzFormat::Td1,
        document_code: field(l1, 0..2),
        issuing_state: field(l1, 2..5),
        document_number: field(l1, 5..14),
        nationality: field(l2, 15..18),
        birth_date: slice(l2, 0..6).to_string(),
        expiry_date: slice(l2, 8..14).to_string(),
        sex: sex(at(l2, 7)),
        primary_identifier,
        secondary_identifier,
        optional_data,
        raw: [l1, l2, l3].join("\n"),
    })
}

/// TD2 and TD3 share a layout and differ only in the width of the optional field
fn parse_two_line(format: MrzFormat, l1: &str, l2: &str) -> Option<MrzPayload> {
    let width = l2.len();
    let optional = 28..width - 2;

    let mut checks = verify(slice(l2, 0..9), at(l2, 9))
        && verify(slice(l2, 13..19), at(l2, 19))
        && verify(slice(l2, 21..27), at(l2, 27));
    if format == MrzFormat::Td3 {
        checks = checks && verify(slice(l2, optional.clone()), at(l2, width - 2));
    }
    if !checks {
        return None;
    }

    let composite = [slice(l2, 0..10), slice(l2, 13..20), slice(l2, 21..width - 1)].concat();
    if !verify(&composite, at(l2, width - 1)) {
        return None;
    }

    let (primary_identifier, secondary_identifier) = names(slice(l1, 5..l1.len()));
    let optional_data = match format {
        MrzFormat::Td3 => field(l2, optional),
        _ => field(l2, 28..width - 1),
    };

    Some(MrzPayload {
        format,
        document_code: field(l1, 0..2),
        issuing_state: field(l1, 2..5),
        document_number: field(l2, 0..9),
        nationality: field(l2, 10..13),
        birth_date: slice(l2, 13..19).to_string(),
        expiry_date: slice(l2, 21..27).to_string(),
        sex: sex(at(l2, 20)),
        primary_identifier,
        secondary_identifier,
        optional_data,
        raw: [l1, l2].join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TD3: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\n\
                                  L898902C36UTO7408122F1204159ZE184226B<<<<<10";
    const TD1: &str = "I<UTOD231458907<<<<<<<<<<<<<<<\n\
                       7408122F1204159UTO<<<<<<<<<<<6\n\
                       ERIKSSON<<ANNA<MARIA<<<<<<<<<<";
    const TD2: &str = "I<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<\n\
                       D231458907UTO7408122F1204159<<<<<<<6";

    #[test]
    fn test_check_digit() {
        assert_eq!(check_digit("L898902C3"), Some(6));
        assert_eq!(check_digit("740812"), Some(2));
        assert_eq!(check_digit("120415"), Some(9));
        assert_eq!(check_digit("<<<<"), Some(0));
        assert_eq!(check_digit("ab"), None);
    }

    #[test]
    fn test_parse_td3() {
        let payload = parse_mrz(TD3).unwrap();
        assert_eq!(payload.format, MrzFormat::Td3);
        assert_eq!(payload.document_code, "P");
        assert_eq!(payload.issuing_state, "UTO");
        assert_eq!(payload.document_number, "L898902C3");
        assert_eq!(payload.nationality, "UTO");
        assert_eq!(payload.birth_date, "740812");
        assert_eq!(payload.expiry_date, "120415");
        assert_eq!(payload.sex, Some('F'));
        assert_eq!(payload.primary_identifier, "ERIKSSON");
        assert_eq!(payload.secondary_identifier, "ANNA MARIA");
        assert_eq!(payload.optional_data, "ZE184226B");
    }

    #[test]
    fn test_parse_td1() {
        let payload = parse_mrz(TD1).unwrap();
        assert_eq!(payload.format, MrzFormat::Td1);
        assert_eq!(payload.document_code, "I");
        assert_eq!(payload.document_number, "D23145890");
        assert_eq!(payload.birth_date, "740812");
        assert_eq!(payload.nationality, "UTO");
        assert_eq!(payload.primary_identifier, "ERIKSSON");
        assert_eq!(payload.secondary_identifier, "ANNA MARIA");
        assert_eq!(payload.raw.lines().count(), 3);
    }

    #[test]
    fn test_parse_td2() {
        let payload = parse_mrz(TD2).unwrap();
        assert_eq!(payload.format, MrzFormat::Td2);
        assert_eq!(payload.document_number, "D23145890");
        assert_eq!(payload.expiry_date, "120415");
        assert_eq!(payload.sex, Some('F'));
        assert_eq!(payload.optional_data, "");
    }

    #[test]
    fn test_spaces_and_blank_lines_are_ignored() {
        let spaced = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\n\n\
                      L898902C36 UTO7408122F1204159ZE184226B<<<<<10\n";
        assert!(parse_mrz(spaced).is_some());
    }

    #[test]
    fn test_bad_check_digit_rejected() {
        // Birth date check digit altered
        let tampered = TD3.replace("7408122F", "7408123F");
        assert!(parse_mrz(&tampered).is_none());

        // Document number altered, composite no longer matches either
        let tampered = TD1.replace("D23145890", "D23145891");
        assert!(parse_mrz(&tampered).is_none());
    }

    #[test]
    fn test_wrong_shape_rejected() {
        assert!(parse_mrz("").is_none());
        assert!(parse_mrz("HELLO WORLD\nSECOND LINE").is_none());
        assert!(parse_mrz(&TD3.to_lowercase()).is_none());
    }

    #[test]
    fn test_validator_trait() {
        let validator: Box<dyn PayloadValidator> = Box::new(IcaoValidator);
        assert!(validator.validate(TD2).is_some());
        assert!(validator.validate("P<UTO").is_none());
    }
}
