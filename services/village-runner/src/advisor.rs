//! Target Advisor
//!
//! Asks an external text-completion gateway which nearby villages are worth
//! raiding and with what. The gateway is slow, rate-limited and may answer
//! with garbage, so every failure degrades to "no suggestions".

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::farming::FarmCandidate;
use crate::report::Reporter;
use crate::timer::Clock;
use crate::types::{NearbyTarget, Troop};

/// Name given to suggestions that come back without one
pub const DEFAULT_SUGGESTION_NAME: &str = "Advisor target";

/// Produces raid suggestions for the farming manager
#[async_trait(?Send)]
pub trait TargetAdvisor {
    /// Suggested targets for the given surroundings and home troops. Empty on
    /// any failure, on empty input and while rate-limited.
    async fn suggest_targets(&mut self, nearby: &[NearbyTarget], troops: &[Troop]) -> Vec<FarmCandidate>;
}

/// Body sent to the completion gateway
#[derive(Debug, Clone, Serialize)]
pub struct AdviceRequest {
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
struct AdviceResponse {
    text: String,
}

/// Raw completion call, returning the model's text
#[async_trait(?Send)]
pub trait AdviceSource {
    async fn complete(&self, request: &AdviceRequest) -> Result<String, AdvisorError>;
}

/// Completion gateway reached over HTTP
pub struct HttpAdviceSource {
    url: String,
    http_client: Client,
    timeout: Duration,
}

impl HttpAdviceSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AdvisorError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(1)
            .build()?;

        Ok(Self {
            url: url.into(),
            http_client,
            timeout,
        })
    }
}

#[async_trait(?Send)]
impl AdviceSource for HttpAdviceSource {
    /// POST `{model, prompt}`, expect `{text}`
    async fn complete(&self, request: &AdviceRequest) -> Result<String, AdvisorError> {
        debug!(
            "Requesting advice: url={}, model={}, prompt_len={}",
            self.url,
            request.model,
            request.prompt.len()
        );

        let response = self
            .http_client
            .post(&self.url)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: AdviceResponse = response.json().await?;
        Ok(body.text)
    }
}

/// [`TargetAdvisor`] that calls an [`AdviceSource`] at most once per
/// `min_interval`
pub struct RateLimitedAdvisor<S> {
    source: S,
    model: String,
    min_interval: Duration,
    last_call: Option<Instant>,
    clock: Arc<dyn Clock>,
    reporter: Reporter,
}

impl<S: AdviceSource> RateLimitedAdvisor<S> {
    pub fn new(source: S, model: impl Into<String>, min_interval: Duration, clock: Arc<dyn Clock>, reporter: Reporter) -> Self {
        Self {
            source,
            model: model.into(),
            min_interval,
            last_call: None,
            clock,
            reporter,
        }
    }

    /// Time until the next upstream call is allowed, `None` if allowed now
    pub fn rate_limit_remaining(&self) -> Option<Duration> {
        let last = self.last_call?;
        let elapsed = self.clock.now().saturating_duration_since(last);
        (elapsed < self.min_interval).then(|| self.min_interval - elapsed)
    }
}

impl RateLimitedAdvisor<HttpAdviceSource> {
    /// Advisor for the configured HTTP gateway, `None` when disabled
    pub fn from_config(config: &AdvisorConfig, clock: Arc<dyn Clock>, reporter: Reporter) -> Result<Option<Self>, AdvisorError> {
        if !config.enabled {
            return Ok(None);
        }
        let Some(url) = config.url.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(None);
        };
        let source = HttpAdviceSource::new(url, Duration::from_secs(config.timeout_secs))?;
        Ok(Some(Self::new(
            source,
            config.model.clone(),
            Duration::from_secs(config.min_interval_secs),
            clock,
            reporter,
        )))
    }
}

#[async_trait(?Send)]
impl<S: AdviceSource> TargetAdvisor for RateLimitedAdvisor<S> {
    async fn suggest_targets(&mut self, nearby: &[NearbyTarget], troops: &[Troop]) -> Vec<FarmCandidate> {
        if let Some(remaining) = self.rate_limit_remaining() {
            self.reporter.info(format!(
                "Advisor rate limit active, next request allowed in ~{} min",
                remaining.as_secs().div_ceil(60)
            ));
            return Vec::new();
        }
        if nearby.is_empty() {
            self.reporter
                .warn("No nearby villages to send to the advisor");
            return Vec::new();
        }

        let request = AdviceRequest {
            model: self.model.clone(),
            prompt: build_prompt(nearby, troops),
        };

        self.reporter.info(format!(
            "Asking the advisor about {} nearby villages",
            nearby.len()
        ));
        self.last_call = Some(self.clock.now());

        let text = match self.source.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                self.reporter.warn(format!("Advisor request failed: {}", e));
                return Vec::new();
            }
        };

        match parse_suggestions(&text, &self.reporter) {
            Ok(candidates) => {
                self.reporter.info(format!(
                    "Advisor suggested {} raid targets",
                    candidates.len()
                ));
                candidates
            }
            Err(e) => {
                self.reporter.error(format!("{}", e));
                debug!("Unparseable advisor response: {}", text);
                Vec::new()
            }
        }
    }
}

/// Natural-language instruction listing the surroundings and our troops,
/// asking for a JSON list of raid plans
pub fn build_prompt(nearby: &[NearbyTarget], troops: &[Troop]) -> String {
    let mut prompt = String::from(
        "You are an experienced Travian player planning raids for a Roman account.\n\
         Pick the villages from the list below that are worth raiding with the troops at home.\n\
         Prefer inactive players and weakly defended villages. Never suggest a target the \
         available troops cannot cover.\n\n",
    );

    prompt.push_str("Troops at home:\n");
    if troops.is_empty() {
        prompt.push_str("- none\n");
    }
    for troop in troops {
        let _ = writeln!(prompt, "- {}: {}", troop.unit_type, troop.count);
    }

    prompt.push_str("\nNearby villages:\n");
    for target in nearby {
        let _ = writeln!(
            prompt,
            "- name: {}, coords: ({}|{}), population: {}, type: {}, player_status: {}, defense_hint: {}",
            target.name,
            target.coordinates.x,
            target.coordinates.y,
            target.population,
            target.kind,
            target.player_status,
            target.defense_hint
        );
    }

    prompt.push_str(
        "\nAnswer with a JSON list only, one object per raid:\n\
         [{\"village_name\": \"...\", \"target_coords\": {\"x\": 0, \"y\": 0}, \"troops\": {\"Legionnaire\": 10}}]\n\
         Answer [] if nothing is worth raiding.\n",
    );
    prompt
}

/// Body of the first ```json fenced block, or the whole text
pub fn extract_json_block(text: &str) -> &str {
    const FENCE: &str = "```json";
    if let Some(start) = text.find(FENCE) {
        let body = &text[start + FENCE.len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    text.trim()
}

/// Turn the model's text into candidates.
///
/// The response must be a JSON list. Items without a coordinate object
/// holding `x` and `y`, or without a troops object, are dropped; a missing
/// name becomes [`DEFAULT_SUGGESTION_NAME`].
pub fn parse_suggestions(text: &str, reporter: &Reporter) -> Result<Vec<FarmCandidate>, AdvisorError> {
    let value: Value = serde_json::from_str(extract_json_block(text))?;
    let Value::Array(items) = value else {
        return Err(AdvisorError::InvalidResponse(
            "expected a JSON list of raid plans".to_string(),
        ));
    };

    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        let mut obj = match item {
            Value::Object(obj) => obj,
            other => {
                reporter.warn(format!("Ignoring advisor suggestion that is not an object: {}", other));
                continue;
            }
        };

        let coords_ok = obj
            .get("target_coords")
            .and_then(Value::as_object)
            .map(|c| c.contains_key("x") && c.contains_key("y"))
            .unwrap_or(false);
        let troops_ok = obj.get("troops").map(Value::is_object).unwrap_or(false);
        if !coords_ok || !troops_ok {
            reporter.warn(format!(
                "Ignoring malformed advisor suggestion: {}",
                Value::Object(obj)
            ));
            continue;
        }

        if !obj.get("village_name").map(Value::is_string).unwrap_or(false) {
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SUGGESTION_NAME)
                .to_string();
            obj.insert("village_name".to_string(), Value::String(name));
        }
        obj.remove("name");
        if obj.get("source_village_id").map(|v| !v.is_string()).unwrap_or(false) {
            obj.remove("source_village_id");
        }

        match serde_json::from_value::<FarmCandidate>(Value::Object(obj)) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => reporter.warn(format!("Ignoring advisor suggestion: {}", e)),
        }
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryObserver;
    use crate::timer::ManualClock;
    use crate::types::Coordinates;
    use std::cell::{Cell, RefCell};

    /// Source returning canned text and counting calls
    struct CannedSource {
        reply: Result<String, String>,
        calls: Cell<usize>,
        last_prompt: RefCell<String>,
    }

    impl CannedSource {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: Cell::new(0),
                last_prompt: RefCell::new(String::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err("gateway down".to_string()),
                ..Self::ok("")
            }
        }
    }

    #[async_trait(?Send)]
    impl AdviceSource for CannedSource {
        async fn complete(&self, request: &AdviceRequest) -> Result<String, AdvisorError> {
            self.calls.set(self.calls.get() + 1);
            *self.last_prompt.borrow_mut() = request.prompt.clone();
            self.reply.clone().map_err(AdvisorError::InvalidResponse)
        }
    }

    fn nearby() -> Vec<NearbyTarget> {
        vec![NearbyTarget {
            name: "Natar Outpost".to_string(),
            coordinates: Coordinates::new(12, -3),
            population: 45,
            kind: "village".to_string(),
            player_status: "inactive".to_string(),
            defense_hint: "weak".to_string(),
        }]
    }

    fn advisor(source: CannedSource) -> (RateLimitedAdvisor<CannedSource>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let advisor = RateLimitedAdvisor::new(
            source,
            "gemini-pro",
            Duration::from_secs(900),
            clock.clone(),
            Reporter::default(),
        );
        (advisor, clock)
    }

    const FENCED: &str = "Here is my plan:\n```json\n[{\"village_name\": \"Natar Outpost\", \"target_coords\": {\"x\": 12, \"y\": -3}, \"troops\": {\"Legionnaire\": 10}}]\n```\nGood luck!";

    #[tokio::test]
    async fn test_suggestions_from_fenced_reply() {
        let (mut advisor, _) = advisor(CannedSource::ok(FENCED));
        let troops = vec![Troop::new("Legionnaire", 25)];

        let candidates = advisor.suggest_targets(&nearby(), &troops).await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].village_name.as_deref(), Some("Natar Outpost"));
        let prompt = advisor.source.last_prompt.borrow().clone();
        assert!(prompt.contains("Natar Outpost"));
        assert!(prompt.contains("(12|-3)"));
        assert!(prompt.contains("Legionnaire: 25"));
    }

    #[tokio::test]
    async fn test_second_call_inside_interval_is_rate_limited() {
        let (mut advisor, clock) = advisor(CannedSource::ok(FENCED));

        assert_eq!(advisor.suggest_targets(&nearby(), &[]).await.len(), 1);
        clock.advance(Duration::from_secs(600));
        assert!(advisor.suggest_targets(&nearby(), &[]).await.is_empty());
        assert_eq!(advisor.source.calls.get(), 1);

        clock.advance(Duration::from_secs(300));
        assert_eq!(advisor.suggest_targets(&nearby(), &[]).await.len(), 1);
        assert_eq!(advisor.source.calls.get(), 2);
    }

    #[tokio::test]
    async fn test_failed_call_still_starts_interval() {
        let (mut advisor, _) = advisor(CannedSource::failing());

        assert!(advisor.suggest_targets(&nearby(), &[]).await.is_empty());
        assert!(advisor.rate_limit_remaining().is_some());
        assert!(advisor.suggest_targets(&nearby(), &[]).await.is_empty());
        assert_eq!(advisor.source.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_skips_upstream() {
        let (mut advisor, _) = advisor(CannedSource::ok(FENCED));
        assert!(advisor.suggest_targets(&[], &[]).await.is_empty());
        assert_eq!(advisor.source.calls.get(), 0);
        assert!(advisor.rate_limit_remaining().is_none());
    }

    #[tokio::test]
    async fn test_non_list_reply_yields_nothing() {
        let (mut advisor, _) = advisor(CannedSource::ok("{\"targets\": []}"));
        assert!(advisor.suggest_targets(&nearby(), &[]).await.is_empty());
    }

    #[test]
    fn test_extract_json_block() {
        assert_eq!(extract_json_block("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(extract_json_block("  [3]  "), "[3]");
        assert_eq!(extract_json_block("```json\n[4]"), "```json\n[4]");
    }

    #[test]
    fn test_parse_drops_malformed_items() {
        let observer = Arc::new(MemoryObserver::new());
        let reporter = Reporter::new(Some(observer.clone()));
        let text = r#"[
            {"name": "Oasis", "target_coords": {"x": 1, "y": 2}, "troops": {"Legionnaire": 5}},
            {"village_name": "No y", "target_coords": {"x": 1}, "troops": {"Legionnaire": 5}},
            {"village_name": "No troops", "target_coords": {"x": 1, "y": 2}},
            {"target_coords": {"x": 7, "y": 7}, "troops": {"Legionnaire": 5}},
            "junk"
        ]"#;

        let candidates = parse_suggestions(text, &reporter).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].village_name.as_deref(), Some("Oasis"));
        assert_eq!(candidates[1].village_name.as_deref(), Some(DEFAULT_SUGGESTION_NAME));
        assert_eq!(observer.matching("Ignoring").len(), 3);
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let result = parse_suggestions("I think you should raid (12|-3)", &Reporter::default());
        assert!(matches!(result, Err(AdvisorError::Parse(_))));
    }
}
