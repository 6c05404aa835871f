//! Background worker handling all remote API work.

use crate::{
    config::Config,
    create::SelectedFile,
    jobs::{CreateJobRequest, Job, JobPage},
    remote::{
        client::JobApiClient, session::SessionManager, session_store::FileSessionStore,
        storage::StorageClient,
    },
    server_status::{
        HEALTH_POLL_INTERVAL, IDLE_CHECK_INTERVAL, ServerMonitor, ServerStatus, WAKE_ATTEMPTS,
        WAKE_RETRY_PAUSE,
    },
    sync::{self, SyncController, SyncSignal},
};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Where the identity session is persisted between runs.
const SESSION_FILE: &str = "session.json";

/// Commands sent from the UI to the worker.
#[derive(Debug)]
pub enum WorkerCmd {
    /// Fetch one page of the job list.
    RefreshJobs { page: u32, limit: u32 },
    /// Run the full creation workflow for a validated file.
    CreateJob { file: SelectedFile },
    /// Delete a job the user confirmed.
    DeleteJob { id: String },
    /// Manual wake-up of a sleeping server.
    WakeServer,
    /// Persist and apply updated settings.
    SaveSettings(Config),
}

/// Events emitted by the worker for UI updates.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    /// A page of jobs replaced the previous one.
    PageLoaded(JobPage),
    /// The page fetch failed; the list shows a blocking error.
    PageError(String),
    /// One job was refetched after an invalidation.
    JobUpdated(Job),
    /// The creation workflow finished.
    JobCreated(Job),
    /// The creation workflow failed; the dialog stays open.
    CreateFailed(String),
    /// A confirmed deletion went through.
    JobDeleted { id: String },
    /// A confirmed deletion failed; shown as a transient notice.
    DeleteFailed(String),
    /// Believed server availability changed.
    ServerStatus(ServerStatus),
    /// Signed-in state changed.
    SessionChanged(bool),
    /// Transient user-visible notification.
    Notice(String),
    /// Informational log message.
    Log(String),
}

/// Everything rebuilt when the settings change. The availability monitor
/// survives rebuilds so its history is not lost.
struct Services {
    client: JobApiClient,
    storage: StorageClient,
    session: Arc<SessionManager>,
    controller: SyncController,
}

impl Services {
    async fn build(
        http: &Client,
        cfg: &Config,
        monitor: &Arc<ServerMonitor>,
        notice_tx: mpsc::Sender<String>,
        sync_tx: mpsc::Sender<SyncSignal>,
    ) -> Self {
        let store = FileSessionStore::new(SESSION_FILE);
        let session = Arc::new(SessionManager::new(
            http.clone(),
            &cfg.auth.base_url,
            &cfg.auth.anon_key,
            store,
        ));
        session.load().await;

        let client = JobApiClient::new(
            http.clone(),
            &cfg.api,
            session.clone(),
            monitor.clone(),
            notice_tx,
        );
        let storage = StorageClient::new(http.clone(), &cfg.storage, session.clone());
        let feed = sync::feed_for(cfg, http.clone(), session.clone());
        let controller = SyncController::new(feed, sync_tx);

        Self {
            client,
            storage,
            session,
            controller,
        }
    }
}

/// Main worker loop: build the service clients, establish availability, then
/// serve commands and invalidation signals until the UI hangs up.
pub async fn run(mut rx: mpsc::Receiver<WorkerCmd>, tx: mpsc::Sender<WorkerEvent>, mut cfg: Config) {
    // Shared HTTP client for all API calls.
    let http = Client::new();
    let monitor = Arc::new(ServerMonitor::new());
    let mut status_rx = monitor.subscribe();
    let (notice_tx, mut notice_rx) = mpsc::channel::<String>(16);
    let (sync_tx, mut sync_rx) = mpsc::channel::<SyncSignal>(64);
    tracing::info!("worker started");

    let mut svc = Services::build(&http, &cfg, &monitor, notice_tx.clone(), sync_tx.clone()).await;
    let mut session_rx = svc.session.subscribe();
    let _ = tx
        .send(WorkerEvent::SessionChanged(svc.session.signed_in().await))
        .await;

    // Availability is established in the background so commands are served
    // right away.
    let mut probe = tokio::spawn(startup_probe(svc.client.clone(), monitor.clone()));

    let mut idle_tick = tokio::time::interval(IDLE_CHECK_INTERVAL);
    idle_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Current page of the job list, replaced wholesale by every refetch.
    let mut page: u32 = 1;
    let mut limit: u32 = cfg.list.page_limit;
    let mut jobs: Vec<Job> = Vec::new();

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    WorkerCmd::RefreshJobs { page: requested, limit: requested_limit } => {
                        page = requested;
                        limit = requested_limit;
                        // The list query is gated on availability; the
                        // transition to online refetches automatically.
                        if monitor.status() == ServerStatus::Online {
                            fetch_page(&mut svc, &tx, page, limit, &mut jobs).await;
                        } else {
                            tracing::info!("refresh deferred: server not online");
                            let _ = tx
                                .send(WorkerEvent::Log("waiting for the server before loading jobs".into()))
                                .await;
                        }
                    }

                    WorkerCmd::CreateJob { file } => {
                        tracing::info!("create job start: {}", file.title);
                        match run_create(&svc, &file).await {
                            Ok(job) => {
                                tracing::info!("create job done: {}", job.id);
                                let _ = tx.send(WorkerEvent::JobCreated(job)).await;
                                fetch_page(&mut svc, &tx, page, limit, &mut jobs).await;
                            }
                            Err(message) => {
                                tracing::error!("create job failed: {message}");
                                let _ = tx.send(WorkerEvent::CreateFailed(message)).await;
                            }
                        }
                    }

                    WorkerCmd::DeleteJob { id } => {
                        tracing::info!("delete job: {id}");
                        match svc.client.delete_job(&id).await {
                            Ok(()) => {
                                // The row disappears with the refetch; no
                                // optimistic removal.
                                let _ = tx.send(WorkerEvent::JobDeleted { id }).await;
                                fetch_page(&mut svc, &tx, page, limit, &mut jobs).await;
                            }
                            Err(e) => {
                                tracing::error!("delete failed: {e}");
                                let _ = tx.send(WorkerEvent::DeleteFailed(e.to_string())).await;
                            }
                        }
                    }

                    WorkerCmd::WakeServer => {
                        wake_server(&svc.client, &monitor, &tx).await;
                    }

                    WorkerCmd::SaveSettings(new_cfg) => {
                        tracing::info!("settings updated");
                        cfg = new_cfg;
                        limit = cfg.list.page_limit;
                        svc = Services::build(&http, &cfg, &monitor, notice_tx.clone(), sync_tx.clone()).await;
                        session_rx = svc.session.subscribe();
                        svc.controller.restart(&jobs);
                        // Re-establish availability against the new endpoint.
                        probe.abort();
                        probe = tokio::spawn(startup_probe(svc.client.clone(), monitor.clone()));
                        let _ = tx.send(WorkerEvent::Log("settings updated".into())).await;
                    }
                }
            }

            Some(signal) = sync_rx.recv() => {
                handle_sync_signal(signal, &mut svc, &tx, page, limit, &mut jobs).await;
            }

            Some(notice) = notice_rx.recv() => {
                let _ = tx.send(WorkerEvent::Notice(notice)).await;
            }

            changed = status_rx.changed() => {
                if changed.is_ok() {
                    let status = *status_rx.borrow_and_update();
                    tracing::info!("server status: {}", status.label());
                    let _ = tx.send(WorkerEvent::ServerStatus(status)).await;
                    if status == ServerStatus::Online {
                        // Whatever was on screen predates the outage.
                        fetch_page(&mut svc, &tx, page, limit, &mut jobs).await;
                    }
                }
            }

            changed = session_rx.changed() => {
                if changed.is_ok() {
                    let signed_in = *session_rx.borrow_and_update();
                    let _ = tx.send(WorkerEvent::SessionChanged(signed_in)).await;
                }
            }

            _ = idle_tick.tick() => {
                if monitor.check_idle() {
                    tracing::warn!("no API activity for 15 minutes, marking server offline");
                }
            }
        }
    }

    probe.abort();
    svc.controller.stop();
    tracing::info!("worker stopped");
}

/// Fetch the current page, re-arm the sync feed against it, and hand the
/// rows to the UI.
async fn fetch_page(
    svc: &mut Services,
    tx: &mpsc::Sender<WorkerEvent>,
    page: u32,
    limit: u32,
    jobs: &mut Vec<Job>,
) {
    match svc.client.list_jobs(page, limit).await {
        Ok(loaded) => {
            tracing::info!(
                "page {} loaded: {} job(s), limit {}",
                loaded.page,
                loaded.data.len(),
                loaded.limit
            );
            *jobs = loaded.data.clone();
            svc.controller.restart(jobs);
            let _ = tx.send(WorkerEvent::PageLoaded(loaded)).await;
        }
        Err(e) => {
            tracing::error!("job list fetch failed: {e}");
            let _ = tx.send(WorkerEvent::PageError(e.to_string())).await;
        }
    }
}

/// React to one invalidation signal: refetch and overwrite.
async fn handle_sync_signal(
    signal: SyncSignal,
    svc: &mut Services,
    tx: &mpsc::Sender<WorkerEvent>,
    page: u32,
    limit: u32,
    jobs: &mut Vec<Job>,
) {
    match signal {
        SyncSignal::InvalidateList => fetch_page(svc, tx, page, limit, jobs).await,
        SyncSignal::Invalidate { job_id } => {
            match svc.client.get_job(&job_id).await {
                Ok(fresh) => {
                    let slot = jobs.iter().position(|j| j.id == fresh.id);
                    let old_status = slot.map(|i| jobs[i].status);
                    if let Some(i) = slot {
                        jobs[i] = fresh.clone();
                    }
                    let transitioned = old_status.is_some_and(|s| s != fresh.status);
                    let _ = tx.send(WorkerEvent::JobUpdated(fresh.clone())).await;
                    if transitioned {
                        if fresh.status.is_terminal() {
                            tracing::info!("job {} reached {}", fresh.id, fresh.status.as_str());
                            // Terminal rows carry new fields (download URL,
                            // error message): refresh the whole page.
                            fetch_page(svc, tx, page, limit, jobs).await;
                        } else {
                            svc.controller.restart(jobs);
                        }
                    }
                }
                // A failed refetch leaves the row stale; the next cycle or
                // full refetch heals it.
                Err(e) => tracing::warn!("refresh of job {job_id} failed: {e}"),
            }
        }
    }
}

/// Upload, resolve a reachable URL, then submit the job. The first failing
/// step aborts the workflow with its message.
async fn run_create(svc: &Services, file: &SelectedFile) -> Result<Job, String> {
    let bytes = tokio::fs::read(&file.path)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", file.path.display()))?;

    let object_path = svc
        .storage
        .upload_pdf(&file.filename, bytes)
        .await
        .map_err(|e| e.to_string())?;

    let pdf_url = svc
        .storage
        .resolve_url(&object_path)
        .await
        .map_err(|e| e.to_string())?;

    let request = CreateJobRequest {
        title: file.title.clone(),
        pdf_url,
    };
    svc.client
        .create_job(&request)
        .await
        .map_err(|e| e.to_string())
}

/// Establish availability at startup: one immediate health check, then a 2s
/// poll until the server answers. Success flips the monitor online through
/// the client's success path.
async fn startup_probe(client: JobApiClient, monitor: Arc<ServerMonitor>) {
    if client.check_health().await.is_ok() {
        tracing::info!("initial health check ok");
        return;
    }
    tracing::warn!("initial health check failed, polling until the server responds");
    monitor.set_status(ServerStatus::Offline);

    let mut ticker = tokio::time::interval(HEALTH_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match client.check_health().await {
            Ok(health) => {
                tracing::info!("server is up: {}", health.status);
                return;
            }
            Err(e) => tracing::debug!("server still waking up: {e}"),
        }
    }
}

/// Manual wake: a bounded burst of health checks with pauses in between.
async fn wake_server(
    client: &JobApiClient,
    monitor: &Arc<ServerMonitor>,
    tx: &mpsc::Sender<WorkerEvent>,
) {
    tracing::info!("manual wake requested");
    monitor.set_status(ServerStatus::Starting);
    for attempt in 1..=WAKE_ATTEMPTS {
        match client.check_health().await {
            Ok(_) => {
                tracing::info!("server answered on wake attempt {attempt}");
                return;
            }
            Err(e) => {
                tracing::warn!("wake attempt {attempt} failed: {e}");
                if attempt < WAKE_ATTEMPTS {
                    tokio::time::sleep(WAKE_RETRY_PAUSE).await;
                }
            }
        }
    }
    monitor.set_status(ServerStatus::Offline);
    let _ = tx
        .send(WorkerEvent::Notice(
            "The server did not wake up. Try again shortly.".into(),
        ))
        .await;
}
