//! User-Agent analysis for START events.
//!
//! The analyzer recognises the browsers, devices and operating systems the players actually run
//! on, plus crawlers and obvious attack payloads. Anything it cannot resolve is reported as
//! [`UNKNOWN`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{object_entry, object_mut, DataProcessor};
use crate::event::{Data, START};

/// Placeholder for a field the analyzer could not resolve.
pub const UNKNOWN: &str = "??";

/// Structured information extracted from a User-Agent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub agent_name: String,
    pub agent_version: String,
    pub agent_class: String,
    pub agent_security: String,
    pub layout_engine_class: String,
    pub device_name: String,
    pub device_class: String,
    pub os_name: String,
    pub os_version: String,
}

// (token, agent name, device name), checked before any browser rule.
const ROBOTS: &[(&str, &str, &str)] = &[
    ("Applebot", "Applebot", "Apple BOT"),
    ("Googlebot", "Googlebot", "Google BOT"),
    ("AdsBot-Google", "AdsBot-Google", "Google BOT"),
    ("bingbot", "Bingbot", "Microsoft BOT"),
    ("YandexBot", "YandexBot", "Yandex BOT"),
    ("DuckDuckBot", "DuckDuckBot", "DuckDuckGo BOT"),
    ("Baiduspider", "Baiduspider", "Baidu BOT"),
    ("facebookexternalhit", "Facebookexternalhit", "Facebook BOT"),
    ("Twitterbot", "Twitterbot", "Twitter BOT"),
];

// Tokens of the attack tools and payloads seen in the wild.
const HACKER_MARKERS: &[&str] = &[
    "<script",
    "sqlmap",
    "nikto",
    "masscan",
    "' or '",
    "union select",
    "${jndi:",
];

// (version token, reported name). First match wins, so the more specific tokens come first.
const BROWSERS: &[(&str, &str)] = &[
    ("Edg/", "Edge"),
    ("EdgA/", "Edge"),
    ("EdgiOS/", "Edge"),
    ("OPR/", "Opera"),
    ("SamsungBrowser/", "SamsungBrowser"),
    ("YaBrowser/", "Yandex Browser"),
    ("FxiOS/", "Firefox"),
    ("Firefox/", "Firefox"),
    ("CriOS/", "Chrome"),
    ("Chrome/", "Chrome"),
];

// A crawler name must end the word, so device models such as "CUBOT X30" are not robots.
static GENERIC_ROBOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([\w.-]*(?:bot|crawler|spider))\b(?:/([\w.~-]+))?")
        .expect("robot regex is valid")
});

static COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]*)\)").expect("comment regex is valid"));

static MAC_OS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Mac OS X ([0-9]+(?:[_.][0-9]+)*)").expect("mac os regex is valid")
});

static IOS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:iPhone|CPU) OS ([0-9]+(?:_[0-9]+)*)").expect("ios regex is valid")
});

static ANDROID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Android ([0-9]+(?:\.[0-9]+)*)(?:; ([^;)]+))?").expect("android regex is valid")
});

static WINDOWS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Windows NT ([0-9]+\.[0-9]+)").expect("windows regex is valid")
});

impl UserAgentInfo {
    pub fn parse(user_agent: &str) -> Self {
        let user_agent = user_agent.trim();
        if user_agent.is_empty() {
            return Self::unknown();
        }

        if let Some(hacker) = Self::parse_hacker(user_agent) {
            return hacker;
        }

        if let Some(robot) = Self::parse_robot(user_agent) {
            return robot;
        }

        let (agent_name, agent_version) = Self::parse_browser(user_agent);
        let (device_name, device_class) = Self::parse_device(user_agent);
        let (os_name, os_version) = Self::parse_os(user_agent);

        let known_agent = agent_name != UNKNOWN;
        Self {
            agent_name,
            agent_version,
            agent_class: if known_agent { "Browser" } else { UNKNOWN }.to_string(),
            agent_security: UNKNOWN.to_string(),
            layout_engine_class: if known_agent { "Browser" } else { UNKNOWN }.to_string(),
            device_name,
            device_class,
            os_name,
            os_version,
        }
    }

    fn unknown() -> Self {
        Self {
            agent_name: UNKNOWN.to_string(),
            agent_version: UNKNOWN.to_string(),
            agent_class: UNKNOWN.to_string(),
            agent_security: UNKNOWN.to_string(),
            layout_engine_class: UNKNOWN.to_string(),
            device_name: UNKNOWN.to_string(),
            device_class: UNKNOWN.to_string(),
            os_name: UNKNOWN.to_string(),
            os_version: UNKNOWN.to_string(),
        }
    }

    fn parse_hacker(ua: &str) -> Option<Self> {
        let lower = ua.to_lowercase();
        HACKER_MARKERS.iter().any(|marker| lower.contains(marker)).then(|| Self {
            agent_name: "Hacker".to_string(),
            agent_version: UNKNOWN.to_string(),
            agent_class: "Hacker".to_string(),
            agent_security: "Hacker".to_string(),
            layout_engine_class: "Hacker".to_string(),
            device_name: "Hacker".to_string(),
            device_class: "Hacker".to_string(),
            os_name: "Hacker".to_string(),
            os_version: UNKNOWN.to_string(),
        })
    }

    fn parse_robot(ua: &str) -> Option<Self> {
        let known = ROBOTS.iter().find_map(|(token, name, device)| {
            ua.find(token).map(|idx| {
                let version = token_version(&ua[idx + token.len()..]);
                (name.to_string(), version, device.to_string())
            })
        });

        let (agent_name, agent_version, device_name) = match known {
            Some(robot) => robot,
            None => {
                let candidates = robot_candidates(ua);
                let captures = GENERIC_ROBOT.captures(&candidates)?;
                let name = captures.get(1)?.as_str().to_string();
                let version = captures
                    .get(2)
                    .map_or_else(|| UNKNOWN.to_string(), |m| m.as_str().to_string());
                (name, version, "Robot".to_string())
            }
        };

        Some(Self {
            agent_name,
            agent_version,
            agent_class: "Robot".to_string(),
            agent_security: UNKNOWN.to_string(),
            layout_engine_class: "Robot".to_string(),
            device_name,
            device_class: "Robot".to_string(),
            os_name: "Cloud".to_string(),
            os_version: UNKNOWN.to_string(),
        })
    }

    fn parse_browser(ua: &str) -> (String, String) {
        for (token, name) in BROWSERS {
            if let Some(idx) = ua.find(token) {
                let version = token_version(&ua[idx + token.len()..]);
                return (name.to_string(), trim_zero_components(&version));
            }
        }

        if ua.contains("Safari/") {
            if let Some(idx) = ua.find("Version/") {
                let version = token_version(&ua[idx + "Version/".len()..]);
                return ("Safari".to_string(), trim_zero_components(&version));
            }
        }

        if let Some(idx) = ua.find("MSIE ") {
            let version = token_version(&ua[idx + "MSIE ".len()..]);
            return ("Internet Explorer".to_string(), trim_zero_components(&version));
        }
        if ua.contains("Trident/") {
            return ("Internet Explorer".to_string(), "11".to_string());
        }

        (UNKNOWN.to_string(), UNKNOWN.to_string())
    }

    fn parse_device(ua: &str) -> (String, String) {
        let device = |name: &str, class: &str| (name.to_string(), class.to_string());

        if ua.contains("AppleTV") || ua.contains("tvOS") {
            return device("Apple TV", "TV");
        }
        if ua.contains("iPhone") {
            return device("Apple iPhone", "Phone");
        }
        if ua.contains("iPad") {
            return device("Apple iPad", "Tablet");
        }
        if ua.contains("SMART-TV") || ua.contains("SmartTV") || ua.contains("Web0S") {
            return device("Smart TV", "TV");
        }
        if ua.contains("CrKey") {
            return device("Google Chromecast", "TV");
        }
        if let Some(captures) = ANDROID.captures(ua) {
            let model = captures
                .get(2)
                .map(|m| m.as_str().trim())
                .filter(|model| !model.is_empty() && *model != "K")
                .unwrap_or("Android Mobile");
            let class = if ua.contains("Mobile") { "Phone" } else { "Tablet" };
            return device(model, class);
        }
        if ua.contains("Macintosh") {
            return device("Apple Macintosh", "Desktop");
        }
        if ua.contains("Windows NT") || ua.contains("X11") || ua.contains("CrOS") {
            return device("Desktop", "Desktop");
        }

        device(UNKNOWN, UNKNOWN)
    }

    fn parse_os(ua: &str) -> (String, String) {
        if let Some(captures) = IOS.captures(ua) {
            return ("iOS".to_string(), captures[1].replace('_', "."));
        }
        if let Some(captures) = ANDROID.captures(ua) {
            return ("Android".to_string(), captures[1].to_string());
        }
        if let Some(captures) = MAC_OS.captures(ua) {
            let version = captures[1].replace('_', ".");
            // Browsers freeze the reported version at 10.15.7, so it is only a lower bound.
            let version = if version == "10.15.7" {
                ">=10.15.7".to_string()
            } else {
                version
            };
            return ("Mac OS".to_string(), version);
        }
        if let Some(captures) = WINDOWS.captures(ua) {
            let version = match &captures[1] {
                "10.0" => ">=10",
                "6.3" => "8.1",
                "6.2" => "8",
                "6.1" => "7",
                "6.0" => "Vista",
                "5.1" => "XP",
                _ => UNKNOWN,
            };
            return ("Windows NT".to_string(), version.to_string());
        }
        if ua.contains("CrOS") {
            return ("Chrome OS".to_string(), UNKNOWN.to_string());
        }
        if ua.contains("Linux") {
            return ("Linux".to_string(), UNKNOWN.to_string());
        }

        (UNKNOWN.to_string(), UNKNOWN.to_string())
    }

    /// Whether the agent was classified as a crawler or an attack.
    pub fn is_hacker_or_robot(&self) -> bool {
        [
            &self.device_class,
            &self.layout_engine_class,
            &self.agent_class,
            &self.agent_security,
        ]
        .iter()
        .any(|value| {
            starts_with_ignore_case(value, "Hacker") || starts_with_ignore_case(value, "Robot")
        })
    }
}

/// The parts of a User-Agent that may name a crawler: product tokens and `compatible;`
/// comments. Platform comments such as `(Linux; Android 10; CUBOT X30)` only describe the device.
fn robot_candidates(ua: &str) -> String {
    COMMENT
        .replace_all(ua, |captures: &regex::Captures| {
            if captures[1].trim_start().to_ascii_lowercase().starts_with("compatible") {
                captures[0].to_string()
            } else {
                " ".to_string()
            }
        })
        .into_owned()
}

/// The version right after a `name/` token, up to the next separator.
fn token_version(rest: &str) -> String {
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    let version: String = rest
        .chars()
        .take_while(|c| !matches!(c, ' ' | ';' | ')' | '(' | ','))
        .collect();

    if version.is_empty() {
        UNKNOWN.to_string()
    } else {
        version
    }
}

/// `129.0.0.0` is reported as `129`; `17.4` and `17.0.1` are kept as they are.
fn trim_zero_components(version: &str) -> String {
    let mut trimmed = version;
    while let Some(stripped) = trimmed.strip_suffix(".0") {
        trimmed = stripped;
    }
    trimmed.to_string()
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn known(value: String) -> Value {
    if value == UNKNOWN {
        Value::Null
    } else {
        Value::String(value)
    }
}

/// Resolves `browser.user_agent` into browser, device and OS fields on START events.
pub struct UserAgentProcessor;

impl DataProcessor for UserAgentProcessor {
    fn name(&self) -> &'static str {
        "user_agent"
    }

    fn should_process(&self, event_name: &str, _data: &Data) -> bool {
        event_name == START
    }

    fn process(&self, data: &mut Data) {
        let Some(browser) = object_mut(data, "browser") else {
            return;
        };
        let Some(user_agent) = browser.get("user_agent").and_then(Value::as_str) else {
            return;
        };

        let info = UserAgentInfo::parse(user_agent);
        let robot = info.is_hacker_or_robot();

        browser.insert("name".to_string(), known(info.agent_name));
        browser.insert("version".to_string(), known(info.agent_version));

        if let Some(device) = object_entry(data, "device") {
            device.insert("model".to_string(), known(info.device_name));
            device.insert("type".to_string(), known(info.device_class));
        }

        if let Some(os) = object_entry(data, "os") {
            os.insert("name".to_string(), known(info.os_name));
            os.insert("version".to_string(), known(info.os_version));
        }

        data.insert("robot".to_string(), Value::Bool(robot));
    }
}
