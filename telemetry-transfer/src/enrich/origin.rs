use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

use super::{object_mut, DataProcessor};
use crate::event::{Data, START};

static EMBED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/play/embed(?:\?|/)").expect("embed pattern is valid"));

pub fn is_embedded(origin: &str) -> bool {
    EMBED.is_match(origin)
}

/// `host/first-segment` of an absolute origin URL, or just the host when the path is empty.
pub fn short_origin(origin: &str) -> Option<String> {
    let url = Url::parse(origin).ok()?;
    let host = url.host_str()?;

    let first_segment = url
        .path_segments()
        .and_then(|mut segments| segments.find(|segment| !segment.is_empty()));

    Some(match first_segment {
        Some(segment) => format!("{host}/{segment}"),
        None => host.to_string(),
    })
}

/// Flags embedded players and shortens the page URL the player was loaded from, on START events.
pub struct OriginProcessor;

impl DataProcessor for OriginProcessor {
    fn name(&self) -> &'static str {
        "origin"
    }

    fn should_process(&self, event_name: &str, data: &Data) -> bool {
        event_name == START
            && data
                .get("media")
                .and_then(|media| media.get("origin"))
                .is_some_and(Value::is_string)
    }

    fn process(&self, data: &mut Data) {
        let Some(media) = object_mut(data, "media") else {
            return;
        };
        let Some(origin) = media.get("origin").and_then(Value::as_str).map(str::to_owned) else {
            return;
        };

        if let Some(short) = short_origin(&origin) {
            media.insert("short_origin".to_string(), Value::String(short));
        }

        data.insert("embed".to_string(), Value::Bool(is_embedded(&origin)));
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn process(data: serde_json::Value) -> serde_json::Value {
        let mut data = data.as_object().cloned().unwrap();
        OriginProcessor.process(&mut data);
        json!(data)
    }

    #[test]
    fn test_embedded_origin() {
        let origin = "https://www.rts.ch/play/embed?urn=urn:rts:video:1234";

        assert_json_eq!(
            process(json!({"media": {"origin": origin}})),
            json!({
                "media": {"origin": origin, "short_origin": "www.rts.ch/play"},
                "embed": true
            })
        );
    }

    #[test]
    fn test_regular_origin() {
        let origin = "https://www.rts.ch/live?rts1";

        assert_json_eq!(
            process(json!({"media": {"origin": origin}})),
            json!({
                "media": {"origin": origin, "short_origin": "www.rts.ch/live"},
                "embed": false
            })
        );
    }

    #[test]
    fn test_relative_origin_only_sets_embed() {
        let origin = "/play/embed/urn:srf:video:1";

        assert_json_eq!(
            process(json!({"media": {"origin": origin}})),
            json!({"media": {"origin": origin}, "embed": true})
        );
    }

    #[test]
    fn test_missing_origin() {
        assert!(!OriginProcessor.should_process("START", &Data::new()));
        assert_json_eq!(process(json!({"media": {}})), json!({"media": {}}));
    }

    #[rstest]
    #[case("https://www.srf.ch", Some("www.srf.ch"))]
    #[case("https://www.srf.ch/", Some("www.srf.ch"))]
    #[case("https://www.srf.ch//play/tv", Some("www.srf.ch/play"))]
    #[case("https://player.example.org:8443/embed/v?x=1", Some("player.example.org/embed"))]
    #[case("not a url", None)]
    #[case("", None)]
    fn test_short_origin(#[case] origin: &str, #[case] expected: Option<&str>) {
        assert_eq!(short_origin(origin).as_deref(), expected);
    }

    #[rstest]
    #[case("https://www.rts.ch/play/embed?urn=1", true)]
    #[case("https://www.rts.ch/play/embed/urn", true)]
    #[case("https://www.rts.ch/play/embedded", false)]
    #[case("https://www.rts.ch/play/tv", false)]
    fn test_is_embedded(#[case] origin: &str, #[case] expected: bool) {
        assert_eq!(is_embedded(origin), expected);
    }
}
