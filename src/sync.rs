//! Keeps displayed processing jobs in step with the backend.
//!
//! Two interchangeable update feeds implement one capability, "tell me when
//! job X may have changed": a fixed-interval polling feed and a per-job
//! event-stream (push) feed. Both emit idempotent invalidation signals; the
//! worker reacts to a signal by refetching, so duplicate or replayed signals
//! are harmless.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::config::{Config, SyncMode};
use crate::jobs::{Job, JobStatus};
use crate::remote::session::SessionManager;

/// A cache-invalidation trigger. Signals carry no job data on purpose: the
/// receiver refetches, it never merges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncSignal {
    /// One job may have changed.
    Invalidate { job_id: String },
    /// The whole current page may have changed.
    InvalidateList,
}

/// Source of invalidation signals for a fixed set of processing jobs. A feed
/// runs until its task is aborted; the controller below owns that lifecycle.
#[async_trait]
pub trait UpdateFeed: Send + Sync {
    async fn run(&self, jobs: Vec<Job>, tx: mpsc::Sender<SyncSignal>);
}

/// Build the feed selected in the config.
pub fn feed_for(cfg: &Config, http: Client, session: Arc<SessionManager>) -> Arc<dyn UpdateFeed> {
    match cfg.sync.mode {
        SyncMode::Polling => Arc::new(PollingFeed {
            interval: Duration::from_millis(cfg.sync.poll_interval_ms),
        }),
        SyncMode::Push => Arc::new(PushFeed {
            http,
            base_url: cfg.api.base_url.trim_end_matches('/').to_string(),
            session,
        }),
    }
}

/// Owns the running feed task. `restart` tears the previous task down and,
/// when the processing subset is non-empty, starts a fresh one against it;
/// nothing keeps ticking once the watched set is empty or the controller is
/// dropped.
pub struct SyncController {
    feed: Arc<dyn UpdateFeed>,
    tx: mpsc::Sender<SyncSignal>,
    task: Option<JoinHandle<()>>,
}

impl SyncController {
    pub fn new(feed: Arc<dyn UpdateFeed>, tx: mpsc::Sender<SyncSignal>) -> Self {
        Self {
            feed,
            tx,
            task: None,
        }
    }

    /// Re-arm the feed against the processing subset of `jobs`.
    pub fn restart(&mut self, jobs: &[Job]) {
        self.stop();
        let processing: Vec<Job> = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Processing)
            .cloned()
            .collect();
        if processing.is_empty() {
            return;
        }
        tracing::debug!("watching {} processing job(s)", processing.len());
        let feed = self.feed.clone();
        let tx = self.tx.clone();
        self.task = Some(tokio::spawn(async move {
            feed.run(processing, tx).await;
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fixed-interval feed: every tick, invalidate each watched job.
pub struct PollingFeed {
    pub interval: Duration,
}

#[async_trait]
impl UpdateFeed for PollingFeed {
    async fn run(&self, jobs: Vec<Job>, tx: mpsc::Sender<SyncSignal>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the jobs were just fetched,
        // so wait one full interval before the first invalidation.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for job in &jobs {
                let signal = SyncSignal::Invalidate {
                    job_id: job.id.clone(),
                };
                if tx.send(signal).await.is_err() {
                    // Receiver gone, the worker is shutting down.
                    return;
                }
            }
        }
    }
}

/// Push feed: one event-stream subscription per watched job, replaying at
/// most one update buffered since the job's creation. Subscription failures
/// are logged, never surfaced; staleness self-heals on the next refetch.
pub struct PushFeed {
    pub http: Client,
    pub base_url: String,
    pub session: Arc<SessionManager>,
}

#[async_trait]
impl UpdateFeed for PushFeed {
    async fn run(&self, jobs: Vec<Job>, tx: mpsc::Sender<SyncSignal>) {
        let mut subscriptions = JoinSet::new();
        for job in jobs {
            let http = self.http.clone();
            let base_url = self.base_url.clone();
            let token = self.session.access_token().await;
            let tx = tx.clone();
            subscriptions.spawn(subscribe_job(http, base_url, token, job, tx));
        }
        // Hold the set so aborting this task tears every stream down with it.
        while subscriptions.join_next().await.is_some() {}
    }
}

/// Follow one job's event stream and translate updates into invalidations.
async fn subscribe_job(
    http: Client,
    base_url: String,
    token: Option<String>,
    job: Job,
    tx: mpsc::Sender<SyncSignal>,
) {
    let url = format!(
        "{}/jobs/{}/events?since={}&replay=1",
        base_url,
        urlencoding::encode(&job.id),
        job.created_at.timestamp_millis()
    );

    let mut req = http
        .get(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream");
    if let Some(token) = &token {
        req = req.bearer_auth(token);
    }

    let mut resp = match req.send().await {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            tracing::warn!("subscribe failed for job {}: {}", job.id, resp.status());
            return;
        }
        Err(e) => {
            tracing::warn!("subscribe failed for job {}: {e}", job.id);
            return;
        }
    };
    tracing::debug!("subscribed to updates for job {}", job.id);

    let mut parser = SseParser::default();
    loop {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                for event in parser.push(&String::from_utf8_lossy(&chunk)) {
                    if event.name != "UPDATE" {
                        continue;
                    }
                    if event.replayed() {
                        tracing::debug!("replayed update for job {}", job.id);
                    }
                    // Invalidate the job and the list; the refetch decides
                    // what actually changed.
                    let one = SyncSignal::Invalidate {
                        job_id: job.id.clone(),
                    };
                    if tx.send(one).await.is_err() || tx.send(SyncSignal::InvalidateList).await.is_err()
                    {
                        return;
                    }
                }
            }
            Ok(None) => {
                tracing::debug!("event stream for job {} ended", job.id);
                return;
            }
            Err(e) => {
                tracing::warn!("event stream for job {} failed: {e}", job.id);
                return;
            }
        }
    }
}

/// One parsed server-sent event.
#[derive(Debug, PartialEq, Eq)]
struct SseEvent {
    name: String,
    data: String,
}

impl SseEvent {
    /// Whether the payload was marked as a replay of a buffered event.
    fn replayed(&self) -> bool {
        serde_json::from_str::<serde_json::Value>(&self.data)
            .ok()
            .and_then(|v| v.pointer("/meta/replayed").and_then(|r| r.as_bool()))
            .unwrap_or(false)
    }
}

/// Incremental server-sent-event parser; chunks may split lines anywhere.
#[derive(Default)]
struct SseParser {
    buffer: String,
    event_name: Option<String>,
    data: String,
}

impl SseParser {
    /// Feed a chunk, returning every event completed by it.
    fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                // Blank line terminates one event.
                if !self.data.is_empty() || self.event_name.is_some() {
                    events.push(SseEvent {
                        name: self.event_name.take().unwrap_or_else(|| "message".into()),
                        data: std::mem::take(&mut self.data),
                    });
                }
            } else if let Some(name) = line.strip_prefix("event:") {
                self.event_name = Some(name.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push_str(data.trim_start());
            }
            // Comments and id fields are ignored.
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job(id: &str, status: JobStatus) -> Job {
        Job {
            id: id.into(),
            title: id.into(),
            status,
            pdf_url: format!("https://s/pdfs/{id}.pdf"),
            file_download_url: None,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polling_invalidates_each_processing_job_per_tick() {
        let (tx, mut rx) = mpsc::channel(16);
        let feed = Arc::new(PollingFeed {
            interval: Duration::from_secs(3),
        });
        let mut controller = SyncController::new(feed, tx);
        controller.restart(&[
            job("a", JobStatus::Processing),
            job("b", JobStatus::Completed),
            job("c", JobStatus::Processing),
        ]);

        // Only the processing subset is watched.
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, SyncSignal::Invalidate { job_id: "a".into() });
        assert_eq!(second, SyncSignal::Invalidate { job_id: "c".into() });

        // The next round fires one interval later and repeats the set.
        let third = rx.recv().await.unwrap();
        assert_eq!(third, SyncSignal::Invalidate { job_id: "a".into() });
    }

    #[tokio::test(start_paused = true)]
    async fn polling_stops_once_no_job_is_processing() {
        let (tx, mut rx) = mpsc::channel(16);
        let feed = Arc::new(PollingFeed {
            interval: Duration::from_secs(3),
        });
        let mut controller = SyncController::new(feed, tx);
        controller.restart(&[job("a", JobStatus::Processing)]);
        assert!(rx.recv().await.is_some());

        // Everything completed: the interval is torn down.
        controller.restart(&[job("a", JobStatus::Completed)]);
        let silence = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(silence.is_err(), "no invalidation may fire after teardown");
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_watched_set() {
        let (tx, mut rx) = mpsc::channel(16);
        let feed = Arc::new(PollingFeed {
            interval: Duration::from_secs(3),
        });
        let mut controller = SyncController::new(feed, tx);
        controller.restart(&[job("a", JobStatus::Processing)]);
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncSignal::Invalidate { job_id: "a".into() }
        );

        controller.restart(&[job("z", JobStatus::Processing)]);
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncSignal::Invalidate { job_id: "z".into() }
        );
    }

    #[test]
    fn sse_parser_handles_split_chunks_and_replay_meta() {
        let mut parser = SseParser::default();

        // A chunk boundary in the middle of a line must not break parsing.
        assert!(parser.push("event: UPD").is_empty());
        let events = parser.push("ATE\ndata: {\"meta\":{\"replayed\":true}}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "UPDATE");
        assert!(events[0].replayed());

        // Fresh events are not marked replayed.
        let events = parser.push("event: UPDATE\ndata: {\"status\":\"completed\"}\n\n");
        assert_eq!(events.len(), 1);
        assert!(!events[0].replayed());

        // Comments and ids are skipped.
        assert!(parser.push(": keep-alive\nid: 7\n").is_empty());
    }
}
