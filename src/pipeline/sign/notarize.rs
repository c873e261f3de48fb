//! Notarization state machine.
//!
//! Per artifact: `submitted → {accepted, rejected, timed-out}`. Submission
//! and status polling go through a [`NotaryService`]; time goes through a
//! [`Clock`]. Both are injectable, so the timeout and retry behavior is
//! tested with a scripted service and a virtual clock, no wall-clock
//! waits involved.
//!
//! Rejection is a content/policy verdict and is never retried. Timeouts
//! and transient polling failures are the only retryable conditions, the
//! latter with bounded exponential backoff.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::pipeline::context::RunContext;
use crate::pipeline::error::{Error, Result};
use crate::pipeline::utils::process;

/// Verdict reported by the notarization service for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Still being processed
    InProgress,
    /// Accepted; the artifact meets platform policy
    Accepted,
    /// Rejected for content/policy reasons
    Invalid {
        /// Service-provided explanation
        message: String,
    },
}

/// Interface to the third-party notarization service.
pub trait NotaryService {
    /// Submits an artifact, returning the service's submission id.
    fn submit(&self, artifact: &Path) -> impl Future<Output = Result<String>> + Send;

    /// Queries the status of a submission.
    fn status(&self, submission_id: &str) -> impl Future<Output = Result<SubmissionStatus>> + Send;
}

/// Time source for the poller.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspends for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Wall-clock time via tokio.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Polling bounds.
#[derive(Debug, Clone)]
pub struct NotarizeConfig {
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Total wait budget before the submission counts as timed out.
    pub max_wait: Duration,
    /// Transient (network) failures tolerated per submission before the
    /// last one propagates.
    pub max_transient_retries: u32,
}

impl Default for NotarizeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(30 * 60),
            max_transient_retries: 5,
        }
    }
}

/// Drives one artifact through the notarization state machine.
pub struct Notarizer<S, C> {
    service: S,
    clock: C,
    config: NotarizeConfig,
}

impl<S: NotaryService, C: Clock> Notarizer<S, C> {
    /// Creates a notarizer over the given service and clock.
    pub fn new(service: S, clock: C, config: NotarizeConfig) -> Self {
        Self {
            service,
            clock,
            config,
        }
    }

    /// Submits `artifact` and polls until a verdict or the wait bound.
    ///
    /// Returns the submission id on acceptance. Rejection surfaces as
    /// [`Error::NotarizationRejected`]; exhausting the wait budget is
    /// [`Error::NotarizationTimeout`], which the operator may retry.
    pub async fn notarize(&self, artifact: &Path) -> Result<String> {
        log::info!("Submitting {} for notarization", artifact.display());
        let submission_id = self.service.submit(artifact).await?;
        log::info!("Submission id {submission_id}; polling for verdict");

        let start = self.clock.now();
        let mut polls: u32 = 0;
        let mut transient_failures: u32 = 0;
        let mut backoff = self.config.poll_interval;

        loop {
            let waited = self.clock.now().duration_since(start);
            if waited >= self.config.max_wait {
                return Err(Error::NotarizationTimeout { waited, polls });
            }

            self.clock.sleep(backoff).await;
            polls += 1;

            match self.service.status(&submission_id).await {
                Ok(SubmissionStatus::Accepted) => {
                    log::info!("✓ Notarization accepted for {submission_id}");
                    return Ok(submission_id);
                }
                Ok(SubmissionStatus::Invalid { message }) => {
                    return Err(Error::NotarizationRejected(message));
                }
                Ok(SubmissionStatus::InProgress) => {
                    transient_failures = 0;
                    backoff = self.config.poll_interval;
                }
                Err(e) => {
                    transient_failures += 1;
                    if transient_failures > self.config.max_transient_retries {
                        return Err(e);
                    }
                    log::warn!(
                        "status poll failed ({transient_failures}/{}): {e}; backing off",
                        self.config.max_transient_retries
                    );
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }
}

/// Notarization via `xcrun notarytool`, credentialed by the keychain
/// profile named in the environment.
pub struct XcrunNotary {
    profile: String,
}

impl XcrunNotary {
    /// Builds the service from the run's credentials.
    pub fn from_context(ctx: &RunContext) -> Result<Self> {
        let profile = ctx.secrets().notary_profile.clone().ok_or_else(|| {
            Error::Config(format!(
                "no notarization profile; set {}",
                crate::pipeline::context::ENV_NOTARY_PROFILE
            ))
        })?;
        Ok(Self { profile })
    }
}

impl NotaryService for XcrunNotary {
    async fn submit(&self, artifact: &Path) -> Result<String> {
        let path = artifact.to_str().ok_or_else(|| {
            Error::Generic(format!("path is not valid UTF-8: {}", artifact.display()))
        })?;
        let output = process::run_tool(
            "xcrun",
            &[
                "notarytool",
                "submit",
                path,
                "--keychain-profile",
                &self.profile,
                "--no-wait",
                "--output-format",
                "json",
            ],
            None,
            &[],
        )
        .await?;

        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        parsed
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Generic("notarytool returned no submission id".into()))
    }

    async fn status(&self, submission_id: &str) -> Result<SubmissionStatus> {
        let output = process::run_tool(
            "xcrun",
            &[
                "notarytool",
                "info",
                submission_id,
                "--keychain-profile",
                &self.profile,
                "--output-format",
                "json",
            ],
            None,
            &[],
        )
        .await?;

        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let status = parsed
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("In Progress");

        Ok(match status {
            "Accepted" => SubmissionStatus::Accepted,
            "Invalid" | "Rejected" => SubmissionStatus::Invalid {
                message: parsed
                    .get("statusSummary")
                    .and_then(|v| v.as_str())
                    .unwrap_or("artifact rejected by notarization service")
                    .to_string(),
            },
            _ => SubmissionStatus::InProgress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Virtual clock: sleeping advances time instantly.
    struct FakeClock {
        start: Instant,
        offset: Mutex<Duration>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.start + *self.offset.lock().expect("clock lock")
        }

        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            *self.offset.lock().expect("clock lock") += duration;
            std::future::ready(())
        }
    }

    /// Service that replays a scripted sequence of poll results.
    struct ScriptedNotary {
        responses: Mutex<VecDeque<Result<SubmissionStatus>>>,
    }

    impl ScriptedNotary {
        fn new(responses: Vec<Result<SubmissionStatus>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    impl NotaryService for ScriptedNotary {
        async fn submit(&self, _artifact: &Path) -> Result<String> {
            Ok("sub-0001".to_string())
        }

        async fn status(&self, _submission_id: &str) -> Result<SubmissionStatus> {
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                // Exhausted scripts stay in progress forever.
                .unwrap_or(Ok(SubmissionStatus::InProgress))
        }
    }

    fn config() -> NotarizeConfig {
        NotarizeConfig {
            poll_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
            max_transient_retries: 2,
        }
    }

    #[tokio::test]
    async fn acceptance_after_polls() {
        let service = ScriptedNotary::new(vec![
            Ok(SubmissionStatus::InProgress),
            Ok(SubmissionStatus::InProgress),
            Ok(SubmissionStatus::Accepted),
        ]);
        let notarizer = Notarizer::new(service, FakeClock::new(), config());
        let id = notarizer
            .notarize(Path::new("App.dmg"))
            .await
            .expect("accepted");
        assert_eq!(id, "sub-0001");
    }

    #[tokio::test]
    async fn rejection_is_not_a_timeout_and_is_not_retried() {
        let service = ScriptedNotary::new(vec![
            Ok(SubmissionStatus::InProgress),
            Ok(SubmissionStatus::Invalid {
                message: "unhardened binary".into(),
            }),
            // Never consumed: a rejection ends the run.
            Ok(SubmissionStatus::Accepted),
        ]);
        let notarizer = Notarizer::new(service, FakeClock::new(), config());
        let err = notarizer
            .notarize(Path::new("App.dmg"))
            .await
            .expect_err("rejected");
        match err {
            Error::NotarizationRejected(message) => {
                assert!(message.contains("unhardened"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn endless_in_progress_times_out() {
        // Script is empty: every poll reports InProgress.
        let service = ScriptedNotary::new(vec![]);
        let notarizer = Notarizer::new(service, FakeClock::new(), config());
        let err = notarizer
            .notarize(Path::new("App.dmg"))
            .await
            .expect_err("must time out");
        match err {
            Error::NotarizationTimeout { waited, polls } => {
                assert!(waited >= Duration::from_secs(600));
                // 600s budget at 30s per poll.
                assert_eq!(polls, 20);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(
            Error::NotarizationTimeout {
                waited: Duration::ZERO,
                polls: 0
            }
            .is_retryable(),
            "timeout must remain operator-retryable"
        );
    }

    #[tokio::test]
    async fn transient_failures_back_off_then_propagate() {
        let transient = || {
            Err(Error::Fetch {
                url: "notary".into(),
                reason: "connection reset".into(),
            })
        };
        let service = ScriptedNotary::new(vec![transient(), transient(), transient()]);
        let notarizer = Notarizer::new(service, FakeClock::new(), config());
        let err = notarizer
            .notarize(Path::new("App.dmg"))
            .await
            .expect_err("transient budget exhausted");
        assert!(matches!(err, Error::Fetch { .. }));
    }

    #[tokio::test]
    async fn transient_failures_within_budget_recover() {
        let service = ScriptedNotary::new(vec![
            Err(Error::Fetch {
                url: "notary".into(),
                reason: "connection reset".into(),
            }),
            Ok(SubmissionStatus::InProgress),
            Ok(SubmissionStatus::Accepted),
        ]);
        let notarizer = Notarizer::new(service, FakeClock::new(), config());
        notarizer
            .notarize(Path::new("App.dmg"))
            .await
            .expect("recovers after transient failure");
    }
}
