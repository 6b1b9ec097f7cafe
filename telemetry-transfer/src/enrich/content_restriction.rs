use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::Value;

use super::DataProcessor;
use crate::event::{Data, ERROR};

/// Why a piece of content was refused to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    AgeRating,
    Geoblock,
    Commercial,
    EndDate,
    StartDate,
    Journalistic,
    Legal,
    Unknown,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::AgeRating => "AGERATING",
            BlockReason::Geoblock => "GEOBLOCK",
            BlockReason::Commercial => "COMMERCIAL",
            BlockReason::EndDate => "ENDDATE",
            BlockReason::StartDate => "STARTDATE",
            BlockReason::Journalistic => "JOURNALISTIC",
            BlockReason::Legal => "LEGAL",
            BlockReason::Unknown => "UNKNOWN",
        }
    }
}

// The messages the players display for a blocked content, in every language they ship.
const MESSAGES: &[(BlockReason, &[&str])] = &[
    (
        BlockReason::AgeRating,
        &[
            "To protect children, this content is only available between 10PM and 5AM.",
            "To protect children, this content is only available between 8PM and 6AM.",
            "Dieser Inhalt ist aus Jugendschutzgründen nur zwischen 22 und 5 Uhr verfügbar.",
            "Dieser Inhalt ist aus Jugendschutzgründen nur zwischen 20 und 6 Uhr verfügbar.",
            "Afin de protéger les mineurs, ce contenu n'est visible qu'entre 22h et 5h.",
            "Afin de protéger les mineurs, ce contenu n'est visible qu'entre 20h et 6h.",
            "Per proteggere i minori, questo contenuto è disponibile solo tra le 22 e le 5.",
            "Per proteggere i minori, questo contenuto è disponibile solo tra le 20 e le 6.",
            "Per proteger uffants, è quest cuntegn mo disponibel tranter las 22 e las 5.",
            "Per proteger uffants, è quest cuntegn mo disponibel tranter las 20 e las 6.",
        ],
    ),
    (
        BlockReason::Geoblock,
        &[
            "This content is not available outside Switzerland.",
            "Dieser Inhalt ist ausserhalb der Schweiz nicht verfügbar.",
            "Ce contenu n'est pas disponible hors de Suisse.",
            "Questo contenuto non è disponibile fuori dalla Svizzera.",
            "Quest cuntegn n'è betg disponibel ordaifer la Svizra.",
        ],
    ),
    (
        BlockReason::Commercial,
        &[
            "This commercial content is not available.",
            "Dieser Werbeinhalt ist nicht verfügbar.",
            "Ce contenu commercial n'est pas disponible.",
            "Questo contenuto commerciale non è disponibile.",
            "Quest cuntegn commerzial n'è betg disponibel.",
        ],
    ),
    (
        BlockReason::EndDate,
        &[
            "This content is not available anymore.",
            "Dieser Inhalt ist nicht mehr verfügbar.",
            "Ce contenu n'est plus disponible.",
            "Questo contenuto non è più disponibile.",
            "Quest cuntegn n'è betg pli disponibel.",
        ],
    ),
    (
        BlockReason::StartDate,
        &[
            "This content is not available yet.",
            "Dieser Inhalt ist noch nicht verfügbar.",
            "Ce contenu n'est pas encore disponible.",
            "Questo contenuto non è ancora disponibile.",
            "Quest cuntegn n'è betg anc disponibel.",
        ],
    ),
    (
        BlockReason::Journalistic,
        &[
            "This content is temporarily unavailable for journalistic reasons.",
            "Dieser Inhalt ist aus publizistischen Gründen vorübergehend nicht verfügbar.",
            "Ce contenu est temporairement indisponible pour des raisons éditoriales.",
            "Questo contenuto è temporaneamente non disponibile per motivi editoriali.",
            "Quest cuntegn n'è temporarmain betg disponibel per motivs publicistics.",
        ],
    ),
    (
        BlockReason::Legal,
        &[
            "This content is not available due to legal restrictions.",
            "Dieser Inhalt ist aus rechtlichen Gründen nicht verfügbar.",
            "Pour des raisons juridiques, ce contenu n'est pas disponible.",
            "Il contenuto non è fruibile a causa di restrizioni legali.",
            "Quest cuntegn n'è betg disponibel per motivs giuridics.",
        ],
    ),
    (
        BlockReason::Unknown,
        &[
            "This content is not available.",
            "Dieser Inhalt ist nicht verfügbar.",
            "Ce contenu n'est actuellement pas disponible.",
            "Questo contenuto non è disponibile.",
            "Quest cuntegn n'è betg disponibel.",
        ],
    ),
];

static BY_MESSAGE: Lazy<HashMap<&'static str, BlockReason>> = Lazy::new(|| {
    MESSAGES
        .iter()
        .flat_map(|(reason, messages)| messages.iter().map(move |message| (*message, *reason)))
        .collect()
});

/// Classify a player error message. Only exact messages are recognised.
pub fn block_reason(message: &str) -> Option<BlockReason> {
    BY_MESSAGE.get(message).copied()
}

/// Flags ERROR events caused by a content restriction rather than a technical failure.
pub struct ContentRestrictionProcessor;

impl DataProcessor for ContentRestrictionProcessor {
    fn name(&self) -> &'static str {
        "content_restriction"
    }

    fn should_process(&self, event_name: &str, _data: &Data) -> bool {
        event_name == ERROR
    }

    fn process(&self, data: &mut Data) {
        let reason = data
            .get("message")
            .and_then(Value::as_str)
            .and_then(block_reason);

        match reason {
            Some(reason) => {
                data.insert(
                    "block_reason".to_string(),
                    Value::String(reason.as_str().to_string()),
                );
                data.insert("business_error".to_string(), Value::Bool(true));
            }
            None => {
                data.insert("business_error".to_string(), Value::Bool(false));
            }
        }
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
        ContentRestrictionProcessor.process(&mut data);
        json!(data)
    }

    #[rstest]
    #[case("This content is not available outside Switzerland.", "GEOBLOCK")]
    #[case("Dieser Inhalt ist noch nicht verfügbar.", "STARTDATE")]
    #[case("Ce contenu n'est plus disponible.", "ENDDATE")]
    #[case("Questo contenuto non è disponibile.", "UNKNOWN")]
    #[case(
        "To protect children, this content is only available between 10PM and 5AM.",
        "AGERATING"
    )]
    fn test_known_messages(#[case] message: &str, #[case] expected: &str) {
        let data = process(json!({"message": message}));

        assert_json_eq!(
            data,
            json!({"message": message, "block_reason": expected, "business_error": true})
        );
    }

    #[rstest]
    #[case("java.io.IOException")]
    // One character off a known message.
    #[case("This content is not available outside Switzerland")]
    #[case("Der Vorgang konnte nicht abgeschlossen werden. (PillarboxCoreBusiness.DataError-Fehler 1 - Dieser Inhalt ist noch nicht verfügbar.)")]
    fn test_other_messages_are_not_business_errors(#[case] message: &str) {
        let data = process(json!({"message": message}));

        assert_json_eq!(data, json!({"message": message, "business_error": false}));
    }

    #[test]
    fn test_missing_message() {
        assert_json_eq!(process(json!({})), json!({"business_error": false}));
        assert_json_eq!(
            process(json!({"message": 42})),
            json!({"message": 42, "business_error": false})
        );
    }

    #[test]
    fn test_only_error_events() {
        let data = Data::new();
        assert!(ContentRestrictionProcessor.should_process("ERROR", &data));
        assert!(!ContentRestrictionProcessor.should_process("START", &data));
    }

    #[test]
    fn test_messages_are_unique() {
        let total: usize = MESSAGES.iter().map(|(_, messages)| messages.len()).sum();
        assert_eq!(BY_MESSAGE.len(), total);
    }
}
