//! Multi-model routing: every configured model is asked concurrently, each
//! with its own retry budget, and the best-scoring reply wins.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::gemini::{GenerateError, Part, TextGenerator};

// ─── Retry Policy ───────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub factor: f64,
    pub cap_ms: u64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_ms: 500,
            factor: 2.0,
            cap_ms: 8_000,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay before `attempt` (1-based). The first attempt never waits.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2) as i32;
        let mut delay = (self.base_ms as f64) * self.factor.powi(exp);
        if delay > self.cap_ms as f64 {
            delay = self.cap_ms as f64;
        }
        if self.jitter > 0.0 {
            let jitter = rand::thread_rng().gen_range(-self.jitter..self.jitter);
            delay *= 1.0 + jitter;
        }
        Duration::from_millis(delay.max(0.0).round() as u64)
    }
}

// ─── Scoring ────────────────────────────────────────────────────────────────

fn has_markdown_structure(text: &str) -> bool {
    text.lines().map(str::trim_start).any(|l| {
        l.starts_with('#')
            || l.starts_with("- ")
            || l.starts_with("* ")
            || l.starts_with("• ")
            || l.split_once(". ").is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
    })
}

/// Length and line-count heuristic; higher is better, blank is 0.
pub fn score(text: &str) -> i64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0;
    }
    let chars = trimmed.chars().count() as i64;
    let lines = trimmed.lines().filter(|l| !l.trim().is_empty()).count() as i64;

    let mut score = chars.min(4000) / 40 + lines.min(40) * 2;
    if has_markdown_structure(trimmed) {
        score += 10;
    }
    if chars < 20 {
        score -= 20;
    }
    score
}

// ─── Router ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedReply {
    pub model: String,
    pub text: String,
    pub score: i64,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("all models failed: {0}")]
    AllFailed(String),
    #[error("model routing exceeded {0:?}")]
    DeadlineExceeded(Duration),
}

pub struct ModelRouter {
    generator: Arc<dyn TextGenerator>,
    models: Vec<String>,
    policy: RetryPolicy,
    deadline: Duration,
}

impl ModelRouter {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        models: Vec<String>,
        policy: RetryPolicy,
        deadline: Duration,
    ) -> Self {
        Self {
            generator,
            models,
            policy,
            deadline,
        }
    }

    async fn try_model(&self, model: &str, parts: &[Part]) -> Result<String, GenerateError> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            tokio::time::sleep(self.policy.delay_for(attempt)).await;
            match self.generator.generate(model, parts).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < max => {
                    warn!(model, attempt, error = %e, "[router] transient failure, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Asks every model at once. Replies that arrive before the deadline are
    /// kept even if other models are still running when it expires.
    pub async fn generate(&self, parts: &[Part]) -> Result<RoutedReply, RouteError> {
        let mut pending: FuturesUnordered<_> = self
            .models
            .iter()
            .enumerate()
            .map(|(idx, model)| async move { (idx, self.try_model(model, parts).await) })
            .collect();

        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        let mut replies: Vec<(usize, String)> = Vec::new();
        let mut failures = Vec::new();
        let mut timed_out = false;
        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some((idx, Ok(text))) => replies.push((idx, text)),
                    Some((idx, Err(e))) => {
                        let model = &self.models[idx];
                        warn!(model = %model, error = %e, "[router] model failed");
                        failures.push(format!("{}: {}", model, e));
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    warn!(deadline = ?self.deadline, "[router] deadline reached");
                    break;
                }
            }
        }

        replies.sort_by_key(|(idx, _)| *idx);
        match self.pick(replies) {
            Some(reply) => Ok(reply),
            None if timed_out => Err(RouteError::DeadlineExceeded(self.deadline)),
            None => Err(RouteError::AllFailed(failures.join("; "))),
        }
    }

    /// Highest score wins, earlier model on ties. A blank reply is only
    /// returned when no model produced any text.
    fn pick(&self, replies: Vec<(usize, String)>) -> Option<RoutedReply> {
        let mut best: Option<RoutedReply> = None;
        let mut blank: Option<RoutedReply> = None;
        for (idx, text) in replies {
            let model = self.models[idx].clone();
            if text.trim().is_empty() {
                info!(model = %model, "[router] blank reply");
                if blank.is_none() {
                    blank = Some(RoutedReply { model, text, score: 0 });
                }
                continue;
            }
            let s = score(&text);
            info!(model = %model, score = s, chars = text.len(), "[router] reply scored");
            if best.as_ref().map_or(true, |b| s > b.score) {
                best = Some(RoutedReply { model, text, score: s });
            }
        }
        best.or(blank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replies per model are popped front to back; the last one repeats.
    struct Scripted {
        replies: Mutex<HashMap<String, Vec<Result<String, u16>>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(script: &[(&str, Vec<Result<&str, u16>>)]) -> Arc<Self> {
            let replies = script
                .iter()
                .map(|(m, rs)| {
                    let rs: Vec<Result<String, u16>> = rs.iter().map(|r| r.map(str::to_string)).collect();
                    (m.to_string(), rs)
                })
                .collect();
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, model: &str, _parts: &[Part]) -> Result<String, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.get_mut(model).expect("unscripted model");
            let next = if queue.len() > 1 { queue.remove(0) } else { queue[0].clone() };
            next.map_err(|status| GenerateError::Status {
                status,
                body: "scripted".into(),
            })
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_ms: 1,
            factor: 2.0,
            cap_ms: 5,
            jitter: 0.0,
        }
    }

    fn router(generator: Arc<Scripted>, models: &[&str]) -> ModelRouter {
        ModelRouter::new(
            generator,
            models.iter().map(|m| m.to_string()).collect(),
            fast_policy(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn delays_grow_and_cap() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_ms: 100,
            factor: 2.0,
            cap_ms: 250,
            jitter: 0.0,
        };
        assert_eq!(p.delay_for(1), Duration::ZERO);
        assert_eq!(p.delay_for(2), Duration::from_millis(100));
        assert_eq!(p.delay_for(3), Duration::from_millis(200));
        assert_eq!(p.delay_for(4), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_in_band() {
        let p = RetryPolicy::default();
        for _ in 0..50 {
            let d = p.delay_for(2).as_millis();
            assert!((400..=600).contains(&d), "delay {} out of band", d);
        }
    }

    #[test]
    fn scoring_prefers_structured_longer_text() {
        assert_eq!(score("   "), 0);
        assert!(score("ok") < 0);
        let flat = "A reasonably long answer without any structure at all in it.";
        let structured = "# Plan\n- audit the funnel\n- run one A/B test\n1. measure CAC";
        assert!(score(structured) > score(flat));
        assert!(score(&"x".repeat(100_000)) <= 4000 / 40 + 2);
    }

    #[tokio::test]
    async fn best_scoring_model_wins() {
        let script = Scripted::new(&[
            ("flash", vec![Ok("Short but fine answer here.")]),
            ("pro", vec![Ok("# Plan\n- one\n- two\n- three\nDetailed closing paragraph.")]),
        ]);
        let reply = router(script, &["flash", "pro"]).generate(&[Part::text("hi")]).await.unwrap();
        assert_eq!(reply.model, "pro");
    }

    #[tokio::test]
    async fn ties_go_to_earlier_model() {
        let script = Scripted::new(&[
            ("a", vec![Ok("identical reply text here")]),
            ("b", vec![Ok("identical reply text here")]),
        ]);
        let reply = router(script, &["a", "b"]).generate(&[]).await.unwrap();
        assert_eq!(reply.model, "a");
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let script = Scripted::new(&[("flash", vec![Err(503), Err(429), Ok("recovered after retries")])]);
        let reply = router(script.clone(), &["flash"]).generate(&[]).await.unwrap();
        assert_eq!(reply.text, "recovered after retries");
        assert_eq!(script.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_stop_immediately() {
        let script = Scripted::new(&[("flash", vec![Err(400)]), ("pro", vec![Ok("pro still answers fine")])]);
        let reply = router(script.clone(), &["flash", "pro"]).generate(&[]).await.unwrap();
        assert_eq!(reply.model, "pro");
        assert_eq!(script.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let script = Scripted::new(&[("flash", vec![Err(500)])]);
        let err = router(script.clone(), &["flash"]).generate(&[]).await.unwrap_err();
        assert!(matches!(err, RouteError::AllFailed(msg) if msg.contains("500")));
        assert_eq!(script.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn blank_reply_never_beats_text() {
        let script = Scripted::new(&[("a", vec![Ok("")]), ("b", vec![Ok("Yes, raise prices.")])]);
        let reply = router(script, &["a", "b"]).generate(&[]).await.unwrap();
        assert_eq!(reply.model, "b");
        assert_eq!(reply.text, "Yes, raise prices.");
    }

    #[tokio::test]
    async fn blank_reply_is_kept_when_nothing_else_answers() {
        let script = Scripted::new(&[("a", vec![Err(400)]), ("b", vec![Ok("  ")])]);
        let reply = router(script, &["a", "b"]).generate(&[]).await.unwrap();
        assert_eq!(reply.model, "b");
        assert!(reply.text.trim().is_empty());
    }

    /// Models named in `slow` never answer in time; the rest answer at once.
    struct Stalled {
        slow: Vec<&'static str>,
    }

    #[async_trait]
    impl TextGenerator for Stalled {
        async fn generate(&self, model: &str, _parts: &[Part]) -> Result<String, GenerateError> {
            if self.slow.contains(&model) {
                tokio::time::sleep(Duration::from_secs(30)).await;
                return Ok("too late".into());
            }
            Ok(format!("{} answered within the deadline", model))
        }
    }

    fn stalled_router(slow: Vec<&'static str>, models: &[&str]) -> ModelRouter {
        ModelRouter::new(
            Arc::new(Stalled { slow }),
            models.iter().map(|m| m.to_string()).collect(),
            fast_policy(),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn deadline_bounds_the_whole_call() {
        let err = stalled_router(vec!["slow"], &["slow"]).generate(&[]).await.unwrap_err();
        assert!(matches!(err, RouteError::DeadlineExceeded(_)));
    }

    #[tokio::test]
    async fn deadline_keeps_replies_that_already_arrived() {
        let started = std::time::Instant::now();
        let reply = stalled_router(vec!["slow"], &["slow", "fast"])
            .generate(&[])
            .await
            .unwrap();
        assert_eq!(reply.model, "fast");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
