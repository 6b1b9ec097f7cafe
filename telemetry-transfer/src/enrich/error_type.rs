//! Error classification for ERROR events.
//!
//! Each player platform reports failures differently, so there is one table per platform:
//!
//! - web players send a chronological `log`; every pattern carries a priority and among the
//!   matching ones the highest priority wins, then the one found furthest down the log.
//! - iOS players send a `name` such as `CoreMediaErrorDomain(1)`, matched in full
//!   (case-insensitive); highest priority wins, then declaration order.
//! - Android players send a stack trace in `log` and the exception in `name`; the first category
//!   whose log patterns and expected names both match wins.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::DataProcessor;
use crate::event::{Data, ERROR};

pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

struct WebErrorType {
    name: &'static str,
    pattern: Regex,
    priority: u8,
}

struct IosErrorType {
    name: &'static str,
    matches: Vec<Regex>,
    priority: u8,
}

struct LogPattern {
    pattern: Regex,
    // Stands in for a negative lookahead, which the regex crate does not support.
    unless: Option<Regex>,
}

impl LogPattern {
    fn is_match(&self, log: &str) -> bool {
        self.pattern.is_match(log) && !self.unless.as_ref().is_some_and(|re| re.is_match(log))
    }
}

struct AndroidErrorType {
    name: &'static str,
    patterns: Vec<LogPattern>,
    names: &'static [&'static str],
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("error pattern is valid")
}

/// Full, case-insensitive match of a whole name.
fn name_regex(pattern: &str) -> Regex {
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(true)
        .build()
        .expect("error name pattern is valid")
}

fn log_pattern(pattern: &str) -> LogPattern {
    LogPattern {
        pattern: regex(pattern),
        unless: None,
    }
}

static WEB: Lazy<Vec<WebErrorType>> = Lazy::new(|| {
    let web = |name, pattern, priority| WebErrorType {
        name,
        pattern: regex(pattern),
        priority,
    };

    vec![
        web("CONNECTION_ERROR", r#""httpStatusCode"\s*:\s*418"#, 10),
        web("IL_ERROR", r"il\.srgssr\.ch", 0),
        web("DRM_NOT_SUPPORTED", "ERROR_DRM_NOT_SUPPORTED_MESSAGE", 0),
        web("DRM_ERROR", "MEDIA_ERR_ENCRYPTED", 0),
        web("PLAYBACK_MEDIA_SOURCE_ERROR", "MEDIA_ERR_DECODE", 0),
        web("PLAYBACK_UNSUPPORTED_MEDIA", "MEDIA_ERR_SRC_NOT_SUPPORTED", 0),
        web("PLAYBACK_NETWORK_ERROR", "MEDIA_ERR_NETWORK", 0),
    ]
});

static IOS: Lazy<Vec<IosErrorType>> = Lazy::new(|| {
    let ios = |name, patterns: &[&str], priority| IosErrorType {
        name,
        matches: patterns.iter().map(|p| name_regex(p)).collect(),
        priority,
    };

    vec![
        ios("IL_ERROR", &[r"PillarboxCoreBusiness\.DataError\(1\)"], 10),
        ios("DRM_ERROR", &[r"AVFoundationErrorDomain\(-11870\)"], 10),
        ios(
            "PLAYBACK_MEDIA_SOURCE_ERROR",
            &[
                r"AVFoundationErrorDomain\(.*?\)",
                r"CoreMediaErrorDomain\(.*?\)",
                r"NSCocoaErrorDomain\(.*?\)",
            ],
            0,
        ),
        ios("PLAYBACK_NETWORK_ERROR", &[r"NSURLErrorDomain\(.*?\)"], 0),
        ios("CONNECTION_ERROR", &[r"NSURLErrorDomain\(-1009\)"], 10),
    ]
});

static ANDROID: Lazy<Vec<AndroidErrorType>> = Lazy::new(|| {
    vec![
        AndroidErrorType {
            name: "DRM_ERROR",
            patterns: vec![log_pattern("drm")],
            names: &[],
        },
        AndroidErrorType {
            name: "IL_ERROR",
            patterns: vec![log_pattern(r"SRGAssetLoader\.loadAsset")],
            names: &["HttpResultException", "IOException"],
        },
        AndroidErrorType {
            name: "PLAYBACK_UNSUPPORTED_MEDIA",
            patterns: vec![log_pattern(r"SRGAssetLoader\.loadAsset")],
            names: &["ResourceNotFoundException"],
        },
        AndroidErrorType {
            name: "PLAYBACK_NETWORK_ERROR",
            patterns: vec![
                log_pattern(r"^androidx\.media3\.datasource\.HttpDataSource"),
                log_pattern(r"^androidx\.media3\.exoplayer\..*timeout"),
            ],
            names: &[],
        },
        AndroidErrorType {
            name: "PLAYBACK_MEDIA_SOURCE_ERROR",
            patterns: vec![
                log_pattern(r"^androidx\.media3\.common\.ParserException"),
                LogPattern {
                    pattern: regex(r"^androidx\.media3\.exoplayer\."),
                    unless: Some(regex(r"^androidx\.media3\.exoplayer\..*timeout")),
                },
            ],
            names: &[],
        },
    ]
});

fn classify_web(log: &str) -> Option<&'static str> {
    WEB.iter()
        .filter_map(|error| {
            error
                .pattern
                .find_iter(log)
                .last()
                .map(|found| (error, found.start()))
        })
        // max_by_key keeps the last of equal keys; reversed, ties go to declaration order.
        .rev()
        .max_by_key(|(error, position)| (error.priority, *position))
        .map(|(error, _)| error.name)
}

fn classify_ios(name: &str) -> Option<&'static str> {
    let name = name.trim();

    IOS.iter()
        .filter(|error| error.matches.iter().any(|re| re.is_match(name)))
        .rev()
        .max_by_key(|error| error.priority)
        .map(|error| error.name)
}

fn classify_android(log: &str, name: &str) -> Option<&'static str> {
    ANDROID
        .iter()
        .find(|error| {
            (error.names.is_empty() || error.names.iter().any(|n| n.eq_ignore_ascii_case(name)))
                && error.patterns.iter().any(|p| p.is_match(log))
        })
        .map(|error| error.name)
}

/// Resolve the error category from a payload's `log` and `name` fields.
pub fn classify(data: &Data) -> &'static str {
    let log = data.get("log").and_then(Value::as_str);
    let name = data.get("name").and_then(Value::as_str);

    log.and_then(classify_web)
        .or_else(|| name.and_then(classify_ios))
        .or_else(|| log.and_then(|log| classify_android(log, name.unwrap_or_default())))
        .unwrap_or(UNKNOWN_ERROR)
}

/// Sets `error_type` on ERROR events that are not already explained by a content restriction.
pub struct ErrorTypeProcessor;

impl DataProcessor for ErrorTypeProcessor {
    fn name(&self) -> &'static str {
        "error_type"
    }

    fn should_process(&self, event_name: &str, data: &Data) -> bool {
        event_name == ERROR && data.get("business_error").and_then(Value::as_bool) != Some(true)
    }

    fn process(&self, data: &mut Data) {
        let error_type = classify(data);
        data.insert(
            "error_type".to_string(),
            Value::String(error_type.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn data(value: serde_json::Value) -> Data {
        value.as_object().cloned().unwrap()
    }

    #[rstest]
    #[case("ERROR: Received ERROR_DRM_NOT_SUPPORTED_MESSAGE", "DRM_NOT_SUPPORTED")]
    #[case("ERROR: Unexpected error occurred.", UNKNOWN_ERROR)]
    #[case("ERROR_DRM_NOT_SUPPORTED_MESSAGE [...] MEDIA_ERR_DECODE", "PLAYBACK_MEDIA_SOURCE_ERROR")]
    #[case("MEDIA_ERR_DECODE [...] ERROR_DRM_NOT_SUPPORTED_MESSAGE", "DRM_NOT_SUPPORTED")]
    #[case(
        r#"{"httpStatusCode": 418} [...] https://il.srgssr.ch/integrationlayer failed [...] MEDIA_ERR_NETWORK"#,
        "CONNECTION_ERROR"
    )]
    #[case("MEDIA_ERR_NETWORK [...] https://il.srgssr.ch/integrationlayer", "IL_ERROR")]
    #[case("MEDIA_ERR_DECODE, then MEDIA_ERR_NETWORK, then MEDIA_ERR_DECODE", "PLAYBACK_MEDIA_SOURCE_ERROR")]
    fn test_web_logs(#[case] log: &str, #[case] expected: &str) {
        assert_eq!(classify(&data(json!({ "log": log }))), expected);
    }

    #[rstest]
    #[case("CoreMediaErrorDomain(1)", "PLAYBACK_MEDIA_SOURCE_ERROR")]
    #[case("  coremediaerrordomain(-12648) ", "PLAYBACK_MEDIA_SOURCE_ERROR")]
    #[case("PillarboxCoreBusiness.DataError(1)", "IL_ERROR")]
    #[case("AVFoundationErrorDomain(-11870)", "DRM_ERROR")]
    #[case("AVFoundationErrorDomain(-11800)", "PLAYBACK_MEDIA_SOURCE_ERROR")]
    #[case("NSURLErrorDomain(-1008)", "PLAYBACK_NETWORK_ERROR")]
    #[case("NSURLErrorDomain(-1009)", "CONNECTION_ERROR")]
    #[case("SomethingElse(1)", UNKNOWN_ERROR)]
    fn test_ios_names(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(classify(&data(json!({ "name": name }))), expected);
    }

    #[rstest]
    #[case(
        "ch.srgssr.pillarbox.core.business.SRGAssetLoader.loadAsset(SRGAssetLoader.kt:42)",
        "HttpResultException",
        "IL_ERROR"
    )]
    #[case(
        "ch.srgssr.pillarbox.core.business.SRGAssetLoader.loadAsset(SRGAssetLoader.kt:42)",
        "ResourceNotFoundException",
        "PLAYBACK_UNSUPPORTED_MEDIA"
    )]
    #[case(
        "ch.srgssr.pillarbox.core.business.SRGAssetLoader.loadAsset(SRGAssetLoader.kt:42)",
        "IllegalStateException",
        UNKNOWN_ERROR
    )]
    #[case("androidx.media3.exoplayer.ExoTimeoutException: timeout", "", "PLAYBACK_NETWORK_ERROR")]
    #[case("androidx.media3.datasource.HttpDataSource$HttpDataSourceException", "", "PLAYBACK_NETWORK_ERROR")]
    #[case(
        "androidx.media3.exoplayer.audio.AudioSink$InitializationException\n  at timeout handler",
        "",
        "PLAYBACK_MEDIA_SOURCE_ERROR"
    )]
    #[case("androidx.media3.common.ParserException: bad box", "", "PLAYBACK_MEDIA_SOURCE_ERROR")]
    #[case("android.media.MediaDrm$MediaDrmStateException: drm failure", "", "DRM_ERROR")]
    fn test_android_logs(#[case] log: &str, #[case] name: &str, #[case] expected: &str) {
        assert_eq!(classify(&data(json!({ "log": log, "name": name }))), expected);
    }

    #[test]
    fn test_skips_business_errors_and_other_events() {
        let flagged = data(json!({"business_error": true}));
        let technical = data(json!({"business_error": false}));

        assert!(!ErrorTypeProcessor.should_process("ERROR", &flagged));
        assert!(ErrorTypeProcessor.should_process("ERROR", &technical));
        assert!(ErrorTypeProcessor.should_process("ERROR", &Data::new()));
        assert!(!ErrorTypeProcessor.should_process("START", &technical));
    }

    #[test]
    fn test_process_sets_error_type() {
        let mut payload = data(json!({"log": "nothing useful"}));
        ErrorTypeProcessor.process(&mut payload);

        assert_eq!(payload["error_type"], json!(UNKNOWN_ERROR));
    }
}
