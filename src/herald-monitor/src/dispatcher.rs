//! The mention dispatcher: poll, classify, batch, persist, sleep.
//!
//! One [`Dispatcher`] owns every piece of mutable process state (seen sets,
//! agent thread registry, rate-limit handler) and threads it through the
//! cycle. Each cycle runs:
//!
//! 1. fetch recent channel messages
//! 2. classify new top-level messages (mark seen first, then test for a mention)
//! 3. pick up to N threads with unseen activity (skipped while recovering
//!    from rate limiting)
//! 4. classify their replies (agent-owned threads need no explicit mention)
//! 5. hand every pending item to the agent in a single invocation
//! 6. persist the seen state, whatever the dispatch result
//!
//! A rate-limited main fetch skips the rest of the cycle; the run loop then
//! sleeps for the (capped) backoff instead of the poll interval.

use std::future::Future;
use std::time::Duration;

use herald_ratelimits::{RateLimitHandler, format_backoff_status};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::agent::{AgentRunner, DispatchOutcome, classify_invocation};
use crate::agents::AgentProfile;
use crate::bus::{BusError, MessageBus};
use crate::config::MonitorOptions;
use crate::error::MonitorResult;
use crate::message::{Message, PendingItem, PendingKind};
use crate::prompt::{build_batch_instruction, load_spec_excerpt};
use crate::state::{MonitorState, StateLimits, StateStore, reply_key};

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every phase ran.
    Completed,
    /// Nothing was attempted because a backoff window is open.
    BackingOff { remaining: Duration },
    /// The main fetch was rate limited; later phases were skipped.
    RateLimited { backoff: Duration },
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Top-level messages not seen before this cycle.
    pub new_messages: usize,
    pub mentions: usize,
    pub thread_replies: usize,
    /// Threads whose replies were fetched.
    pub threads_checked: usize,
    /// Set when any rate-limit signal was observed during the cycle.
    pub rate_limited: bool,
    /// Result of the batched agent call, if one was made.
    pub dispatch: Option<DispatchOutcome>,
}

impl CycleReport {
    fn new(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            new_messages: 0,
            mentions: 0,
            thread_replies: 0,
            threads_checked: 0,
            rate_limited: false,
            dispatch: None,
        }
    }

    /// Items handed to the agent.
    pub fn pending(&self) -> usize {
        self.mentions + self.thread_replies
    }
}

/// Why [`Dispatcher::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown future resolved.
    Interrupted,
    /// The configured maximum runtime elapsed.
    MaxRuntime,
}

/// Totals over a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub dispatches: u64,
    pub items_dispatched: u64,
    pub stop: StopReason,
}

/// Long-lived dispatcher context for one agent identity on one channel.
pub struct Dispatcher<B, A> {
    profile: &'static AgentProfile,
    channel: String,
    options: MonitorOptions,
    bus: B,
    agent: A,
    rate_limits: RateLimitHandler,
    store: StateStore,
    state: MonitorState,
    spec_excerpt: Option<String>,
}

impl<B: MessageBus, A: AgentRunner> Dispatcher<B, A> {
    /// Create a dispatcher, loading persisted state from `options.state_dir`.
    pub fn new(
        profile: &'static AgentProfile,
        channel: impl Into<String>,
        options: MonitorOptions,
        bus: B,
        agent: A,
    ) -> Self {
        let limits = StateLimits {
            seen_messages: options.seen_messages_cap,
            seen_replies: options.seen_replies_cap,
            agent_threads: options.agent_threads_cap,
        };
        let store = StateStore::new(&options.state_dir, limits);
        let state = store.load();
        let spec_excerpt = load_spec_excerpt(&options.workdir, profile);
        let rate_limits = RateLimitHandler::new(options.backoff);

        Self {
            profile,
            channel: channel.into(),
            options,
            bus,
            agent,
            rate_limits,
            store,
            state,
            spec_excerpt,
        }
    }

    pub fn profile(&self) -> &'static AgentProfile {
        self.profile
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn rate_limits(&self) -> &RateLimitHandler {
        &self.rate_limits
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// Run one full poll cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        // The thread phase looks at how the previous cycle ended, before
        // this cycle's calls touch the counter.
        let failures_at_start = self.rate_limits.consecutive_failures();

        if self.rate_limits.is_backing_off() {
            let remaining = self.rate_limits.remaining_backoff();
            debug!(
                status = %format_backoff_status(&self.rate_limits),
                "Skipping cycle while backing off"
            );
            return CycleReport::new(CycleOutcome::BackingOff { remaining });
        }

        let mut report = CycleReport::new(CycleOutcome::Completed);

        let fetched = self.fetch_messages().await;
        let messages = match self.route("fetch_recent_messages", fetched) {
            Ok(messages) => messages,
            Err(BusError::RateLimited { .. }) => {
                report.outcome = CycleOutcome::RateLimited {
                    backoff: self.rate_limits.current_backoff(),
                };
                report.rate_limited = true;
                return report;
            }
            Err(_) => Vec::new(),
        };

        let mut pending = self.classify_mentions(&messages, &mut report);

        if failures_at_start > 0 {
            debug!(
                failures = failures_at_start,
                "Skipping thread checks while recovering from rate limiting"
            );
        } else {
            pending.extend(self.collect_thread_replies(&mut report).await);
        }

        if !pending.is_empty() {
            report.dispatch = Some(self.dispatch(&pending).await);
            if report.dispatch == Some(DispatchOutcome::RateLimited) {
                report.rate_limited = true;
            }
        }

        self.persist();

        if report.pending() > 0 || report.new_messages > 0 {
            info!(
                new_messages = report.new_messages,
                mentions = report.mentions,
                thread_replies = report.thread_replies,
                threads_checked = report.threads_checked,
                "Cycle complete"
            );
        } else {
            debug!(threads_checked = report.threads_checked, "No new mentions");
        }

        report
    }

    /// Poll until the shutdown future resolves or the maximum runtime elapses.
    ///
    /// State is persisted before returning on every path.
    pub async fn run<F>(&mut self, shutdown: F) -> MonitorResult<RunSummary>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let started = Instant::now();
        let mut cycles = 0u64;
        let mut dispatches = 0u64;
        let mut items_dispatched = 0u64;

        let stop = loop {
            if let Some(max) = self.options.max_runtime
                && started.elapsed() >= max
            {
                info!(
                    elapsed_secs = started.elapsed().as_secs(),
                    "Maximum runtime reached, stopping"
                );
                break StopReason::MaxRuntime;
            }

            let step = tokio::select! {
                report = self.run_cycle() => Some(report),
                _ = &mut shutdown => None,
            };
            let Some(report) = step else {
                info!("Interrupted, stopping");
                break StopReason::Interrupted;
            };

            cycles += 1;
            if report.dispatch.is_some() {
                dispatches += 1;
                items_dispatched += report.pending() as u64;
            }

            let mut pause = self.pause_after(&report);
            if let Some(max) = self.options.max_runtime {
                pause = pause.min(max.saturating_sub(started.elapsed()));
            }
            debug!(pause_ms = pause.as_millis() as u64, "Sleeping until next cycle");

            let interrupted = tokio::select! {
                _ = tokio::time::sleep(pause) => false,
                _ = &mut shutdown => true,
            };
            if interrupted {
                info!("Interrupted, stopping");
                break StopReason::Interrupted;
            }
        };

        self.save_state()?;

        Ok(RunSummary {
            cycles,
            dispatches,
            items_dispatched,
            stop,
        })
    }

    /// Run a single cycle unless `shutdown` resolves first, then persist.
    ///
    /// Returns `None` when interrupted.
    pub async fn run_once<F>(&mut self, shutdown: F) -> MonitorResult<Option<CycleReport>>
    where
        F: Future<Output = ()>,
    {
        let report = tokio::select! {
            report = self.run_cycle() => Some(report),
            _ = shutdown => None,
        };
        if report.is_none() {
            info!("Interrupted, stopping");
        }

        self.save_state()?;
        Ok(report)
    }

    /// Write the seen state to disk.
    pub fn save_state(&mut self) -> MonitorResult<()> {
        self.store.save(&mut self.state)
    }

    /// Wait before the next cycle: interval plus jitter, stretched after
    /// recent rate limiting; the capped backoff after a skipped cycle.
    pub fn pause_after(&self, report: &CycleReport) -> Duration {
        match report.outcome {
            CycleOutcome::Completed => self.next_sleep(),
            CycleOutcome::BackingOff { remaining } => {
                remaining.min(self.options.max_rate_limit_sleep)
            }
            CycleOutcome::RateLimited { backoff } => {
                let pause = backoff.min(self.options.max_rate_limit_sleep);
                warn!(
                    pause_secs = pause.as_secs(),
                    status = %format_backoff_status(&self.rate_limits),
                    "Rate limited fetching messages"
                );
                pause
            }
        }
    }

    fn next_sleep(&self) -> Duration {
        let jitter_ms = self.options.poll_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };

        let mut pause = self.options.poll_interval + jitter;
        if self.rate_limits.failed_within(self.options.backoff.max()) {
            pause += self.options.backoff.initial() / 2;
        }
        pause
    }

    fn classify_mentions(
        &mut self,
        messages: &[Message],
        report: &mut CycleReport,
    ) -> Vec<PendingItem> {
        let mut pending = Vec::new();

        for message in messages {
            if !self.state.seen_messages.insert(message.timestamp.clone()) {
                continue;
            }
            report.new_messages += 1;

            // Replies broadcast to the channel are claimed under their thread
            // key so the thread phase does not queue them a second time.
            if let Some(root) = &message.thread_root {
                if let Some(item) = self.classify_reply(message, root, None) {
                    pending.push(item);
                    report.thread_replies += 1;
                }
                continue;
            }

            if self.profile.is_self(&message.author)
                && self.state.agent_threads.record(message.timestamp.clone())
            {
                debug!(ts = %message.timestamp, "Registered agent thread");
            }

            if self.profile.is_mention(&message.author, &message.text) {
                info!(author = %message.author, ts = %message.timestamp, "Mention found");
                pending.push(PendingItem::mention(message));
                report.mentions += 1;
            }
        }

        pending
    }

    async fn collect_thread_replies(&mut self, report: &mut CycleReport) -> Vec<PendingItem> {
        let fetched = self.fetch_raw_messages().await;
        let candidates = match self.route("fetch_recent_messages_raw", fetched) {
            Ok(raw) => self.thread_candidates(raw),
            Err(e) => {
                report.rate_limited |= e.is_rate_limited();
                return Vec::new();
            }
        };

        let mut pending = Vec::new();

        for parent in &candidates {
            let fetched = self.fetch_replies(&parent.timestamp).await;
            let replies = match self.route("fetch_thread_replies", fetched) {
                Ok(replies) => replies,
                Err(BusError::RateLimited { .. }) => {
                    report.rate_limited = true;
                    break;
                }
                Err(_) => continue,
            };
            report.threads_checked += 1;

            let root = parent.timestamp.as_str();

            // The first element is the parent, already handled as a top-level
            // message. Only replies actually returned get marked seen, so a
            // thread whose newest reply was not in the page stays a candidate.
            for reply in replies.iter().skip(1) {
                let parent_author = Some(parent.author.as_str());
                if let Some(item) = self.classify_reply(reply, root, parent_author) {
                    pending.push(item);
                    report.thread_replies += 1;
                }
            }
        }

        pending
    }

    /// Mark a thread reply seen and decide whether it needs a response.
    ///
    /// Replies in agent-owned threads need no explicit mention.
    fn classify_reply(
        &mut self,
        reply: &Message,
        root: &str,
        parent_author: Option<&str>,
    ) -> Option<PendingItem> {
        if !self.state.seen_replies.insert(reply_key(root, &reply.timestamp)) {
            return None;
        }
        if self.profile.is_self(&reply.author) {
            return None;
        }

        let owned = parent_author.is_some_and(|author| self.profile.is_self(author))
            || self.state.agent_threads.contains(root);
        if !owned && !self.profile.is_mention(&reply.author, &reply.text) {
            return None;
        }

        info!(
            author = %reply.author,
            thread = %root,
            owned,
            "Thread reply needs a response"
        );
        Some(PendingItem::thread_reply(reply, root))
    }

    /// Top-level messages with replies not yet seen, capped per cycle.
    fn thread_candidates(&self, raw: Vec<Message>) -> Vec<Message> {
        raw.into_iter()
            .filter(|message| message.has_replies())
            .filter(|message| match &message.latest_reply {
                Some(latest) => !self
                    .state
                    .seen_replies
                    .contains(&reply_key(&message.timestamp, latest)),
                None => true,
            })
            .take(self.options.max_threads_per_cycle)
            .collect()
    }

    async fn dispatch(&mut self, pending: &[PendingItem]) -> DispatchOutcome {
        let instruction = build_batch_instruction(
            self.profile,
            &self.channel,
            pending,
            self.spec_excerpt.as_deref(),
        );
        let threads = pending
            .iter()
            .filter(|item| item.kind == PendingKind::ThreadReply)
            .count();

        info!(
            items = pending.len(),
            thread_replies = threads,
            "{} Dispatching batch to agent",
            self.profile.emoji
        );

        let result = self
            .agent
            .invoke(&instruction, self.options.agent_timeout)
            .await;
        let outcome = classify_invocation(&result);
        debug!(outcome = outcome.label(), "Agent invocation finished");

        match (&outcome, &result) {
            (DispatchOutcome::Success { confirmed: true }, _) => {
                info!(items = pending.len(), "Agent responded");
            }
            (DispatchOutcome::Success { confirmed: false }, Ok(invocation)) => {
                info!(
                    exit_code = ?invocation.exit_code,
                    "Agent finished without a confirmation marker"
                );
            }
            (DispatchOutcome::Timeout, _) => {
                warn!(
                    timeout_secs = self.options.agent_timeout.as_secs(),
                    "Agent timed out; batch will not be retried"
                );
            }
            (DispatchOutcome::RateLimited, _) => {
                self.rate_limits.on_failure();
            }
            (_, Err(e)) => error!(error = %e, "Agent invocation failed"),
            _ => {}
        }

        outcome
    }

    fn persist(&mut self) {
        if let Err(e) = self.save_state() {
            error!(error = %e, "Failed to persist monitor state");
        }
    }

    async fn fetch_messages(&self) -> Result<Vec<Message>, BusError> {
        self.guard()?;
        with_timeout(
            self.options.bus_timeout,
            self.bus
                .fetch_recent_messages(&self.channel, self.options.message_limit),
        )
        .await
    }

    async fn fetch_raw_messages(&self) -> Result<Vec<Message>, BusError> {
        self.guard()?;
        with_timeout(
            self.options.bus_timeout,
            self.bus
                .fetch_recent_messages_raw(&self.channel, self.options.raw_message_limit),
        )
        .await
    }

    async fn fetch_replies(&self, thread_root: &str) -> Result<Vec<Message>, BusError> {
        self.guard()?;
        with_timeout(
            self.options.bus_timeout,
            self.bus.fetch_thread_replies(
                &self.channel,
                thread_root,
                self.options.thread_reply_limit,
            ),
        )
        .await
    }

    fn guard(&self) -> Result<(), BusError> {
        if self.rate_limits.is_backing_off() {
            Err(BusError::BackingOff)
        } else {
            Ok(())
        }
    }

    /// Feed a bus result into the rate-limit handler.
    fn route<T>(&mut self, operation: &str, result: Result<T, BusError>) -> Result<T, BusError> {
        match &result {
            Ok(_) => self.rate_limits.on_success(),
            Err(BusError::RateLimited { retry_after_secs }) => {
                let backoff = self.rate_limits.on_failure();
                warn!(
                    operation,
                    retry_after_secs = ?retry_after_secs,
                    backoff_secs = backoff.as_secs(),
                    "Bus call rate limited"
                );
            }
            Err(BusError::BackingOff) => {
                debug!(operation, "Bus call skipped while backing off");
            }
            Err(e) => warn!(operation, error = %e, "Bus call failed"),
        }
        result
    }
}

async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, BusError>>,
) -> Result<T, BusError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BusError::Timeout(format!("no response after {}s", limit.as_secs()))),
    }
}
