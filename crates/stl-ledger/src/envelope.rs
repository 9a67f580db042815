//! Active-state response normalization.
//!
//! The query endpoint has answered with several envelope shapes over time.
//! Each known shape is an [`EnvelopeParser`] variant; [`normalize`] tries
//! them in [`EnvelopeParser::ORDER`] and the first that recognizes the
//! body wins. Supporting a new shape means adding a variant.

use serde_json::Value;
use stl_schemas::Contract;

use crate::LedgerError;

/// Keys under which a contract may be nested inside one element, outermost first.
const NESTING_KEYS: [&str; 4] = ["entry", "contractEntry", "JsActiveContract", "createdEvent"];

const WRAPPER_KEYS: [&str; 2] = ["activeRecords", "activeContracts"];

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Vec<Contract>),
    /// The body is not this parser's shape; try the next one.
    NotThisShape,
    /// The body is this parser's shape but its content does not decode.
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeParser {
    /// `[ element, ... ]`
    BareArray,
    /// `{ "activeRecords": [ element, ... ] }`
    WrappedActiveRecords,
    /// `{ "entry": { "createdEvent": {...} } }` for a single contract.
    SingleNestedEntry,
}

impl EnvelopeParser {
    pub const ORDER: [EnvelopeParser; 3] = [
        EnvelopeParser::BareArray,
        EnvelopeParser::WrappedActiveRecords,
        EnvelopeParser::SingleNestedEntry,
    ];

    pub fn parse(self, body: &Value) -> ParseOutcome {
        match self {
            EnvelopeParser::BareArray => match body.as_array() {
                Some(items) => parse_elements(items),
                None => ParseOutcome::NotThisShape,
            },
            EnvelopeParser::WrappedActiveRecords => {
                let Some(obj) = body.as_object() else {
                    return ParseOutcome::NotThisShape;
                };
                match WRAPPER_KEYS.iter().find_map(|k| obj.get(*k)) {
                    Some(Value::Array(items)) => parse_elements(items),
                    Some(Value::Null) => ParseOutcome::Parsed(vec![]),
                    Some(other) => {
                        ParseOutcome::Malformed(format!("active record list is not an array: {other}"))
                    }
                    None => ParseOutcome::NotThisShape,
                }
            }
            EnvelopeParser::SingleNestedEntry => {
                let Some(obj) = body.as_object() else {
                    return ParseOutcome::NotThisShape;
                };
                if !NESTING_KEYS.iter().any(|k| obj.contains_key(*k)) {
                    return ParseOutcome::NotThisShape;
                }
                match parse_element(body) {
                    Element::Contract(c) => ParseOutcome::Parsed(vec![*c]),
                    Element::Skip => ParseOutcome::Parsed(vec![]),
                    Element::Bad(msg) => ParseOutcome::Malformed(msg),
                }
            }
        }
    }
}

/// Flatten any known response body into contracts.
pub fn normalize(body: &Value) -> Result<Vec<Contract>, LedgerError> {
    if body.is_null() {
        return Ok(vec![]);
    }
    for parser in EnvelopeParser::ORDER {
        match parser.parse(body) {
            ParseOutcome::Parsed(contracts) => return Ok(contracts),
            ParseOutcome::NotThisShape => continue,
            ParseOutcome::Malformed(msg) => {
                return Err(LedgerError::decode(format!("{parser:?}: {msg}")))
            }
        }
    }
    Err(LedgerError::decode(format!(
        "unrecognized active-state envelope: {}",
        truncate(&body.to_string(), 200)
    )))
}

enum Element {
    Contract(Box<Contract>),
    /// Stream bookkeeping (offset checkpoints, unassigned entries); carries no contract.
    Skip,
    Bad(String),
}

fn parse_elements(items: &[Value]) -> ParseOutcome {
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match parse_element(item) {
            Element::Contract(c) => out.push(*c),
            Element::Skip => {}
            Element::Bad(msg) => return ParseOutcome::Malformed(format!("element {i}: {msg}")),
        }
    }
    ParseOutcome::Parsed(out)
}

fn parse_element(item: &Value) -> Element {
    let Some(mut obj) = item.as_object() else {
        return Element::Bad("element is not an object".to_string());
    };

    for key in NESTING_KEYS {
        if let Some(inner) = obj.get(key).and_then(Value::as_object) {
            obj = inner;
        }
    }

    if !obj.contains_key("contractId") {
        return Element::Skip;
    }

    match serde_json::from_value::<Contract>(Value::Object(obj.clone())) {
        Ok(c) => Element::Contract(Box::new(c)),
        Err(e) => Element::Bad(e.to_string()),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
