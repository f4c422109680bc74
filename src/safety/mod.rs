//! Pre-admission checks: parameter bounds, sliding-window rate limit with a
//! consecutive-failure circuit, and an advisory scan for obvious
//! non-terminating loops.

use crate::models::RuntimeKey;
use crate::repository::ExecutionRepository;
use chrono::{Duration, Utc};
use regex::Regex;
use std::sync::OnceLock;

pub const MIN_TIME_LIMIT_MS: i64 = 100;
pub const MAX_TIME_LIMIT_MS: i64 = 60_000;
pub const MIN_MEMORY_MB: i64 = 32;
pub const MAX_MEMORY_MB: i64 = 2048;

const ABUSE_WINDOW_SECS: i64 = 60;
const RATE_LIMIT_PER_WINDOW: i64 = 10;
const FAILURE_CIRCUIT_PER_WINDOW: i64 = 5;
const RETRY_AFTER_SECS: u64 = 60;

/// Validate requested limits, returning every violation rather than the
/// first.
pub fn validate_params(time_limit_ms: i64, memory_limit_mb: i64) -> Vec<String> {
    let mut violations = Vec::new();

    if !(MIN_TIME_LIMIT_MS..=MAX_TIME_LIMIT_MS).contains(&time_limit_ms) {
        violations.push(format!(
            "time_limit must be between {MIN_TIME_LIMIT_MS} and {MAX_TIME_LIMIT_MS} ms, got {time_limit_ms}"
        ));
    }
    if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&memory_limit_mb) {
        violations.push(format!(
            "memory_limit must be between {MIN_MEMORY_MB} and {MAX_MEMORY_MB} MB, got {memory_limit_mb}"
        ));
    }

    violations
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbuseVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub retry_after_seconds: u64,
}

impl AbuseVerdict {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after_seconds: RETRY_AFTER_SECS,
        }
    }

    fn blocked(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            retry_after_seconds: RETRY_AFTER_SECS,
        }
    }
}

/// Sliding-window admission check over the last 60 seconds of a session's
/// executions: ≥ 10 submissions trips the rate limit, ≥ 5 FAILED outcomes
/// trips the failure circuit.
///
/// Fails OPEN: if the store cannot be queried, admission proceeds and the
/// failure is logged. Rate limiting is best-effort; admission availability
/// is not allowed to depend on it.
pub async fn check_abuse(repo: &ExecutionRepository, session_id: &str) -> AbuseVerdict {
    let since = Utc::now() - Duration::seconds(ABUSE_WINDOW_SECS);

    let total = match repo.count_recent(session_id, since).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(session_id, "Abuse check failed open (count): {}", e);
            return AbuseVerdict::allowed();
        }
    };
    if total >= RATE_LIMIT_PER_WINDOW {
        return AbuseVerdict::blocked(format!(
            "Rate limit exceeded: {total} executions in the last {ABUSE_WINDOW_SECS}s"
        ));
    }

    let failed = match repo.count_recent_failed(session_id, since).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(session_id, "Abuse check failed open (failures): {}", e);
            return AbuseVerdict::allowed();
        }
    };
    if failed >= FAILURE_CIRCUIT_PER_WINDOW {
        return AbuseVerdict::blocked(format!(
            "Too many failed executions: {failed} failures in the last {ABUSE_WINDOW_SECS}s"
        ));
    }

    AbuseVerdict::allowed()
}

struct LoopPattern {
    regex: Regex,
    description: &'static str,
}

fn loop_patterns(runtime: RuntimeKey) -> &'static [LoopPattern] {
    static PYTHON: OnceLock<Vec<LoopPattern>> = OnceLock::new();
    static NODE: OnceLock<Vec<LoopPattern>> = OnceLock::new();
    static C_FAMILY: OnceLock<Vec<LoopPattern>> = OnceLock::new();

    fn compile(specs: &[(&'static str, &'static str)]) -> Vec<LoopPattern> {
        specs
            .iter()
            .map(|&(pattern, description)| LoopPattern {
                regex: Regex::new(pattern).expect("invalid loop pattern"),
                description,
            })
            .collect()
    }

    match runtime {
        RuntimeKey::Python => PYTHON.get_or_init(|| {
            compile(&[
                (r"while\s+True\s*:", "while True loop"),
                (r"while\s+1\s*:", "while 1 loop"),
                (
                    r"for\s+\w+\s+in\s+iter\(\s*int\s*,\s*1\s*\)",
                    "infinite iter() loop",
                ),
            ])
        }),
        RuntimeKey::Node => NODE.get_or_init(|| {
            compile(&[
                (r"while\s*\(\s*true\s*\)", "while (true) loop"),
                (r"while\s*\(\s*1\s*\)", "while (1) loop"),
                (r"for\s*\(\s*;\s*;\s*\)", "for (;;) loop"),
            ])
        }),
        RuntimeKey::Gcc | RuntimeKey::Gpp => C_FAMILY.get_or_init(|| {
            compile(&[
                (r"while\s*\(\s*1\s*\)", "while (1) loop"),
                (r"while\s*\(\s*true\s*\)", "while (true) loop"),
                (r"for\s*\(\s*;\s*;\s*\)", "for (;;) loop"),
            ])
        }),
        _ => &[],
    }
}

/// Scan source for obvious infinite-loop constructs. Advisory only: a match
/// is logged by the caller and never blocks admission; the runner's
/// wall-clock timeout is the authoritative safeguard.
pub fn scan_loop_patterns(source: &str, runtime: RuntimeKey) -> Option<&'static str> {
    loop_patterns(runtime)
        .iter()
        .find(|pattern| pattern.regex.is_match(source))
        .map(|pattern| pattern.description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{SessionRepository, establish_connection, seed_languages};

    #[test]
    fn validator_accepts_the_documented_bounds() {
        assert!(validate_params(100, 32).is_empty());
        assert!(validate_params(60_000, 2048).is_empty());
        assert!(validate_params(5000, 256).is_empty());
    }

    #[test]
    fn validator_rejects_out_of_range_values() {
        assert_eq!(validate_params(99, 256).len(), 1);
        assert_eq!(validate_params(60_001, 256).len(), 1);
        assert_eq!(validate_params(5000, 31).len(), 1);
        assert_eq!(validate_params(5000, 2049).len(), 1);
    }

    #[test]
    fn validator_reports_every_violation() {
        let violations = validate_params(50, 10_000);
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("time_limit"));
        assert!(violations[1].contains("memory_limit"));
    }

    #[test]
    fn python_loop_patterns() {
        assert!(scan_loop_patterns("while True:\n    pass", RuntimeKey::Python).is_some());
        assert!(scan_loop_patterns("while 1 :\n    pass", RuntimeKey::Python).is_some());
        assert!(scan_loop_patterns("for x in iter(int, 1):", RuntimeKey::Python).is_some());
        assert!(scan_loop_patterns("while x < 10:\n    x += 1", RuntimeKey::Python).is_none());
    }

    #[test]
    fn node_and_c_loop_patterns() {
        assert!(scan_loop_patterns("while(true){}", RuntimeKey::Node).is_some());
        assert!(scan_loop_patterns("for(;;){}", RuntimeKey::Node).is_some());
        assert!(scan_loop_patterns("while (1) {}", RuntimeKey::Gcc).is_some());
        assert!(scan_loop_patterns("for ( ; ; ) {}", RuntimeKey::Gpp).is_some());
        assert!(scan_loop_patterns("while (n--) {}", RuntimeKey::Gcc).is_none());
    }

    #[test]
    fn runtimes_without_patterns_never_match() {
        assert!(scan_loop_patterns("while true; do :; done", RuntimeKey::Shell).is_none());
        assert!(scan_loop_patterns("loop {}", RuntimeKey::Ruby).is_none());
    }

    async fn seeded_repo() -> (ExecutionRepository, String) {
        let pool = establish_connection("sqlite::memory:").await.unwrap();
        seed_languages(&pool, 5000, 256).await.unwrap();
        let session = SessionRepository::new(pool.clone())
            .create("shell", "echo hi")
            .await
            .unwrap();
        (ExecutionRepository::new(pool), session.id)
    }

    #[tokio::test]
    async fn rate_limit_blocks_the_eleventh_submission() {
        let (repo, session_id) = seeded_repo().await;

        for _ in 0..9 {
            repo.create_queued(&session_id).await.unwrap();
        }
        assert!(check_abuse(&repo, &session_id).await.allowed);

        repo.create_queued(&session_id).await.unwrap();
        let verdict = check_abuse(&repo, &session_id).await;
        assert!(!verdict.allowed);
        assert_eq!(verdict.retry_after_seconds, 60);
        assert!(verdict.reason.unwrap().contains("Rate limit"));
    }

    #[tokio::test]
    async fn failure_circuit_blocks_after_five_failures() {
        let (repo, session_id) = seeded_repo().await;

        for _ in 0..5 {
            let execution = repo.create_queued(&session_id).await.unwrap();
            repo.mark_running(&execution.id).await.unwrap();
            repo.mark_failed(&execution.id, "exit 1").await.unwrap();
        }

        let verdict = check_abuse(&repo, &session_id).await;
        assert!(!verdict.allowed);
        assert!(verdict.reason.unwrap().contains("failed executions"));
    }

    #[tokio::test]
    async fn abuse_check_fails_open_when_the_store_is_down() {
        let (repo, session_id) = seeded_repo().await;
        // Simulate a store outage by tearing the pool down.
        let pool = establish_connection("sqlite::memory:").await.unwrap();
        pool.close().await;
        drop(repo);
        let repo = ExecutionRepository::new(pool);

        let verdict = check_abuse(&repo, &session_id).await;
        assert!(verdict.allowed);
    }
}
