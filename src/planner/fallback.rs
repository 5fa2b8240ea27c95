//! Rule-based planner used when the planning model is unavailable or its
//! output cannot be turned into actions.
//!
//! Rules are tried top to bottom against the trimmed intent; the last rule
//! (screenshot + analysis) always matches, so every intent yields a
//! non-empty, valid sequence.
use std::sync::OnceLock;

use regex::Regex;

use crate::agent_engine::state::{Action, ActionSequence, ActionSpec, ScrollDirection};

const GOOGLE_SEARCH: &str = "https://www.google.com/search";
const YOUTUBE_HOME: &str = "https://www.youtube.com";
const YOUTUBE_SEARCH: &str = "https://www.youtube.com/results";

/// Compiled patterns, built once and shared.
struct FallbackRules {
    screenshot: Regex,
    read_screen: Regex,
    search_trigger: Regex,
    search_queries: Vec<Regex>,
    youtube_queries: Vec<Regex>,
    explicit_url: Regex,
    go_to: Regex,
    open_app: Regex,
    switch_app: Regex,
    close_app: Regex,
    type_text: Regex,
    scroll: Regex,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("fallback pattern is valid")
}

fn rules() -> &'static FallbackRules {
    static RULES: OnceLock<FallbackRules> = OnceLock::new();
    RULES.get_or_init(|| FallbackRules {
        screenshot: re(r"(?i)\bscreen\s?shot\b|\bcapture\s+(?:the\s+)?screen\b|\bsnapshot\b"),
        read_screen: re(
            r"(?i)^(?:please\s+)?read\b|\bwhat\s+does\s+(?:the|my)\s+screen\s+say\b|\bextract\s+(?:the\s+)?text\b",
        ),
        search_trigger: re(r"(?i)\bsearch\b|\bgoogle\b|\blook\s+up\b"),
        search_queries: vec![
            re(r"(?i)^(?:please\s+)?(?:search|look\s+up)\s+(?:on\s+)?google\s+for\s+(.+?)[.?!]*$"),
            re(
                r"(?i)^(?:please\s+)?(?:can\s+you\s+)?(?:search|google|look\s+up)\s+(?:the\s+web\s+)?(?:for\s+)?(.+?)(?:\s+(?:on|in|using|with)\s+(?:google|the\s+web|the\s+internet|the\s+browser))?[.?!]*$",
            ),
            re(r"(?i)\b(?:search|google|look\s+up)\s+(?:for\s+)?(.+?)[.?!]*$"),
        ],
        youtube_queries: vec![
            re(
                r"(?i)^(?:please\s+)?(?:play|watch|find|search\s+for|search|look\s+up)\s+(.+?)\s+(?:on|in|from)\s+youtube[.?!]*$",
            ),
            re(r"(?i)^(?:please\s+)?(?:search\s+)?youtube\s+for\s+(.+?)[.?!]*$"),
        ],
        explicit_url: re(r"(?i)\bhttps?://\S+"),
        go_to: re(
            r"(?i)^(?:please\s+)?(?:go\s+to|visit|navigate\s+to|open|browse\s+to)\s+((?:www\.)?[a-z0-9-]+(?:\.[a-z0-9-]+)+(?:/\S*)?)[.?!]*$",
        ),
        open_app: re(
            r"(?i)^(?:please\s+)?(?:open|launch|start|run)\s+(?:the\s+|my\s+)?(.+?)(?:\s+(?:app|application|program))?[.?!]*$",
        ),
        switch_app: re(
            r"(?i)^(?:please\s+)?(?:switch|change|go\s+back)\s+to\s+(?:the\s+|my\s+)?(.+?)(?:\s+(?:app|application|window))?[.?!]*$",
        ),
        close_app: re(
            r"(?i)^(?:please\s+)?(?:close|quit|exit|kill)\s+(?:the\s+|my\s+)?(.+?)(?:\s+(?:app|application|window))?[.?!]*$",
        ),
        type_text: re(r#"(?is)^(?:please\s+)?(?:type|write|enter)\s+(?:the\s+text\s+)?["']?(.+?)["']?$"#),
        scroll: re(r"(?i)\bscroll\s+(up|down|left|right)\b"),
    })
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|p| {
        let captured = p.captures(text)?.get(1)?.as_str().trim();
        (!captured.is_empty()).then(|| captured.to_string())
    })
}

/// Search terms in an intent such as "search for jarvis on google".
pub fn extract_search_query(intent: &str) -> Option<String> {
    first_capture(&rules().search_queries, intent.trim())
}

/// Search terms in an intent such as "play lofi beats on youtube".
pub fn extract_youtube_query(intent: &str) -> Option<String> {
    first_capture(&rules().youtube_queries, intent.trim())
}

fn url_with_query(base: &str, key: &str, value: &str) -> String {
    reqwest::Url::parse_with_params(base, &[(key, value)])
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("{base}?{key}={}", value.replace(' ', "+")))
}

pub fn google_search_url(query: &str) -> String {
    url_with_query(GOOGLE_SEARCH, "q", query)
}

fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches(['.', ',', '!', '?', ')']);
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

#[derive(Debug, Clone)]
pub struct FallbackPlanner {
    browser: String,
}

impl FallbackPlanner {
    pub fn new(browser: impl Into<String>) -> Self {
        let browser = browser.into();
        Self {
            browser: if browser.trim().is_empty() {
                "chrome".to_string()
            } else {
                browser
            },
        }
    }

    pub fn plan(&self, intent: &str) -> ActionSequence {
        let intent = intent.trim();
        let (rule, specs) = self.match_rules(intent);
        tracing::debug!(rule, actions = specs.len(), "fallback rule matched");

        let actions = specs.into_iter().map(Action::new).collect();
        let name = if intent.is_empty() { "screenshot" } else { intent };
        ActionSequence::new(
            name.chars().take(80).collect::<String>(),
            format!("Rule-based plan ({rule})"),
            actions,
        )
    }

    fn browse(&self, url: String) -> Vec<ActionSpec> {
        vec![
            ActionSpec::OpenApp {
                app_name: self.browser.clone(),
            },
            ActionSpec::NavigateUrl { url },
        ]
    }

    fn match_rules(&self, intent: &str) -> (&'static str, Vec<ActionSpec>) {
        let r = rules();
        let lower = intent.to_lowercase();

        if intent.is_empty() || r.screenshot.is_match(intent) {
            return ("screenshot", vec![ActionSpec::Screenshot]);
        }
        if r.read_screen.is_match(intent) {
            return (
                "read_screen",
                vec![
                    ActionSpec::Screenshot,
                    ActionSpec::ExtractText {
                        output: Some("screen_text".to_string()),
                    },
                ],
            );
        }
        if lower.contains("youtube") {
            let url = match extract_youtube_query(intent) {
                Some(query) => url_with_query(YOUTUBE_SEARCH, "search_query", &query),
                None => YOUTUBE_HOME.to_string(),
            };
            return ("youtube", self.browse(url));
        }
        if r.search_trigger.is_match(intent) {
            if let Some(query) = extract_search_query(intent) {
                return ("web_search", self.browse(google_search_url(&query)));
            }
            return ("analyze", analyze(intent));
        }
        if let Some(m) = r.explicit_url.find(intent) {
            return ("url", self.browse(normalize_url(m.as_str())));
        }
        if let Some(site) = r.go_to.captures(intent).and_then(|c| c.get(1)) {
            return ("url", self.browse(normalize_url(site.as_str())));
        }
        if let Some(app) = first_capture(std::slice::from_ref(&r.switch_app), intent) {
            return ("switch_app", vec![ActionSpec::SwitchApp { app_name: app }]);
        }
        if let Some(app) = first_capture(std::slice::from_ref(&r.close_app), intent) {
            return ("close_app", vec![ActionSpec::CloseApp { app_name: app }]);
        }
        if let Some(app) = first_capture(std::slice::from_ref(&r.open_app), intent) {
            return ("open_app", vec![ActionSpec::OpenApp { app_name: app }]);
        }
        if let Some(text) = first_capture(std::slice::from_ref(&r.type_text), intent) {
            return ("type_text", vec![ActionSpec::TypeText { text }]);
        }
        if let Some(dir) = r.scroll.captures(intent).and_then(|c| c.get(1)) {
            let direction = match dir.as_str().to_lowercase().as_str() {
                "up" => ScrollDirection::Up,
                "left" => ScrollDirection::Left,
                "right" => ScrollDirection::Right,
                _ => ScrollDirection::Down,
            };
            return (
                "scroll",
                vec![ActionSpec::Scroll {
                    direction,
                    amount: 3,
                    x: None,
                    y: None,
                }],
            );
        }
        ("analyze", analyze(intent))
    }
}

fn analyze(intent: &str) -> Vec<ActionSpec> {
    vec![
        ActionSpec::Screenshot,
        ActionSpec::AnalyzeScreen {
            objective: intent.to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::ActionKind;

    fn planner() -> FallbackPlanner {
        FallbackPlanner::new("firefox")
    }

    #[test]
    fn search_query_strips_verb_phrase_and_engine() {
        assert_eq!(extract_search_query("search for jarvis on google").as_deref(), Some("jarvis"));
        assert_eq!(extract_search_query("Google rust async traits").as_deref(), Some("rust async traits"));
        assert_eq!(extract_search_query("search google for weather in paris").as_deref(), Some("weather in paris"));
        assert_eq!(extract_search_query("look up tokio select?").as_deref(), Some("tokio select"));
        assert_eq!(extract_search_query("search"), None);
    }

    #[test]
    fn screenshot_intent_is_a_single_action() {
        let seq = planner().plan("take a screenshot");
        assert_eq!(seq.kinds(), vec![ActionKind::Screenshot]);
    }

    #[test]
    fn web_search_opens_browser_with_encoded_query() {
        let seq = planner().plan("search for jarvis on google");
        assert_eq!(seq.kinds(), vec![ActionKind::OpenApp, ActionKind::NavigateUrl]);
        assert_eq!(
            seq.actions[0].spec,
            ActionSpec::OpenApp {
                app_name: "firefox".into()
            }
        );
        assert_eq!(
            seq.actions[1].spec,
            ActionSpec::NavigateUrl {
                url: "https://www.google.com/search?q=jarvis".into()
            }
        );
    }

    #[test]
    fn youtube_with_and_without_query() {
        let seq = planner().plan("play lofi beats on youtube");
        match &seq.actions[1].spec {
            ActionSpec::NavigateUrl { url } => {
                assert_eq!(url, "https://www.youtube.com/results?search_query=lofi+beats")
            }
            other => panic!("unexpected {other:?}"),
        }
        let seq = planner().plan("open youtube");
        assert_eq!(
            seq.actions[1].spec,
            ActionSpec::NavigateUrl {
                url: YOUTUBE_HOME.into()
            }
        );
    }

    #[test]
    fn app_rules() {
        assert_eq!(
            planner().plan("open the notepad app").actions[0].spec,
            ActionSpec::OpenApp {
                app_name: "notepad".into()
            }
        );
        assert_eq!(
            planner().plan("switch to slack").actions[0].spec,
            ActionSpec::SwitchApp {
                app_name: "slack".into()
            }
        );
        assert_eq!(
            planner().plan("close spotify").actions[0].spec,
            ActionSpec::CloseApp {
                app_name: "spotify".into()
            }
        );
    }

    #[test]
    fn go_to_site_adds_scheme() {
        let seq = planner().plan("go to github.com");
        assert_eq!(
            seq.actions[1].spec,
            ActionSpec::NavigateUrl {
                url: "https://github.com".into()
            }
        );
    }

    #[test]
    fn typing_keeps_original_case() {
        let seq = planner().plan("type \"Hello World\"");
        assert_eq!(seq.actions[0].spec, ActionSpec::type_text("Hello World"));
    }

    #[test]
    fn scroll_and_read_rules() {
        assert_eq!(
            planner().plan("scroll up a bit").actions[0].spec,
            ActionSpec::Scroll {
                direction: ScrollDirection::Up,
                amount: 3,
                x: None,
                y: None
            }
        );
        assert_eq!(
            planner().plan("read the screen").kinds(),
            vec![ActionKind::Screenshot, ActionKind::ExtractText]
        );
    }

    #[test]
    fn anything_else_is_analyzed() {
        for intent in ["what is on my screen", "", "   ", "search", "¿qué?"] {
            let seq = planner().plan(intent);
            assert!(!seq.is_empty(), "{intent:?}");
            assert!(seq.actions.iter().all(|a| a.spec.problems().is_empty()), "{intent:?}");
        }
        let seq = planner().plan("what is on my screen");
        assert_eq!(
            seq.actions[1].spec,
            ActionSpec::AnalyzeScreen {
                objective: "what is on my screen".into()
            }
        );
    }

    #[test]
    fn fresh_id_per_plan() {
        let a = planner().plan("take a screenshot");
        let b = planner().plan("take a screenshot");
        assert_ne!(a.id, b.id);
    }
}
