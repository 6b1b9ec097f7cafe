use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{object_mut, DataProcessor};
use crate::event::{Data, START};

fn urn_patterns(entries: &[(&'static str, &str)]) -> Vec<(&'static str, Regex)> {
    entries
        .iter()
        .map(|(name, pattern)| (*name, Regex::new(pattern).expect("urn pattern is valid")))
        .collect()
}

static BUSINESS_UNITS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    urn_patterns(&[
        ("srf", r"^urn:(?:.*:)?srf:.*$"),
        ("rts", r"^urn:(?:.*:)?rts:.*$"),
        ("rsi", r"^urn:(?:.*:)?rsi:.*$"),
        ("rtr", r"^urn:(?:.*:)?rtr:.*$"),
        ("playsuisse", r"^urn:(?:.*:)?rio:.*$"),
        ("swi", r"^urn:(?:.*:)?swi:.*$"),
    ])
});

static MEDIA_TYPES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    urn_patterns(&[("video", r"^urn:.*:video:.*$"), ("audio", r"^urn:.*:audio:.*$")])
});

static SWISSTXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^urn:(?:.*:)?swisstxt:.*$").expect("swisstxt pattern is valid"));

fn first_match(table: &[(&'static str, Regex)], id: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, pattern)| pattern.is_match(id))
        .map(|(name, _)| *name)
}

pub fn business_unit(id: &str) -> Option<&'static str> {
    first_match(&BUSINESS_UNITS, id)
}

pub fn media_type(id: &str) -> Option<&'static str> {
    first_match(&MEDIA_TYPES, id)
}

pub fn is_swisstxt(id: &str) -> bool {
    SWISSTXT.is_match(id)
}

/// Derives `media.bu`, `media.type` and `media.swisstxt` from the media URN on START events.
/// Fields that cannot be resolved are left unset.
pub struct MediaIdProcessor;

impl DataProcessor for MediaIdProcessor {
    fn name(&self) -> &'static str {
        "media_id"
    }

    fn should_process(&self, event_name: &str, data: &Data) -> bool {
        event_name == START
            && data
                .get("media")
                .and_then(|media| media.get("id"))
                .is_some_and(Value::is_string)
    }

    fn process(&self, data: &mut Data) {
        let Some(media) = object_mut(data, "media") else {
            return;
        };
        let Some(id) = media.get("id").and_then(Value::as_str).map(str::to_owned) else {
            return;
        };

        if let Some(bu) = business_unit(&id) {
            media.insert("bu".to_string(), Value::String(bu.to_string()));
        }
        if let Some(media_type) = media_type(&id) {
            media.insert("type".to_string(), Value::String(media_type.to_string()));
        }
        if is_swisstxt(&id) {
            media.insert("swisstxt".to_string(), Value::Bool(true));
        }
    }
}
