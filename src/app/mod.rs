//! TUIのイベントループ、入力処理、状態管理。

mod handlers;
mod render;

use anyhow::Result;
use crossterm::event::{self, Event};
use std::{path::PathBuf, time::Duration};
use tokio::sync::mpsc;

use crate::{
    config::Config,
    create::SelectedFile,
    events::{Screen, UiState},
    input::InputBoxState,
    jobs::Job,
    server_status::ServerStatus,
    shortcuts::Shortcuts,
    ui::Tui,
    wizard,
    worker::{self, WorkerCmd, WorkerEvent},
};

use handlers::{handle_key, is_ctrl_c};
use render::draw;

/// アップロードダイアログの進行状態。
#[derive(Clone, Debug, Default)]
pub struct CreateState {
    /// 検証済みの選択ファイル（未選択ならNone）。
    pub file: Option<SelectedFile>,
    /// ダイアログ内に表示するエラー。
    pub error: Option<String>,
    /// 送信中かどうか（多重送信の防止用）。
    pub submitting: bool,
}

impl CreateState {
    /// ダイアログを閉じる際に状態を初期化する。
    pub fn reset(&mut self) {
        self.file = None;
        self.error = None;
        self.submitting = false;
    }
}

/// 入力処理と描画で共有するアプリ状態。
pub struct App {
    /// 永続化された設定ファイルのパス。
    pub cfg_path: PathBuf,
    /// メモリ上の現在設定。
    pub cfg: Config,
    /// 選択位置やステータスなどUI固有の状態。
    pub ui: UiState,
    /// 現在ページのジョブ（リフェッチで丸ごと置き換える）。
    pub jobs: Vec<Job>,
    /// Workerへのコマンド送信チャネル。
    pub worker_tx: mpsc::Sender<WorkerCmd>,
    /// Workerからのイベント受信チャネル。
    pub worker_rx: mpsc::Receiver<WorkerEvent>,

    /// 設定画面で編集するジョブAPIのURL。
    pub api_url: String,
    /// 設定画面で編集する認証サービスのURL。
    pub auth_url: String,
    /// 設定画面で編集するストレージのURL。
    pub storage_url: String,
    /// 設定画面で編集するアップロード上限（MB）。
    pub max_upload_mb: String,

    /// アップロードダイアログの状態。
    pub create: CreateState,
    /// 削除確認中のジョブ。
    pub pending_delete: Option<Job>,

    /// 入力ボックスの状態（入力中はSome）。
    pub input_box: Option<InputBoxState>,

    /// 初期設定ウィザードの状態。
    pub wizard_state: wizard::WizardState,

    /// ショートカットキー設定。
    pub shortcuts: Shortcuts,
}

/// ユーザーが終了するまでメインTUIループを回す。
pub async fn run_app(terminal: &mut Tui) -> Result<()> {
    // 設定ファイルを読み込む（初回はデフォルトを生成）。
    let cfg_path = PathBuf::from("config.toml");
    let cfg = Config::load_or_default(&cfg_path)?;

    // ショートカット設定を読み込む（無ければデフォルト）。
    let shortcuts_path = PathBuf::from("shortcut.toml");
    let shortcuts = Shortcuts::load_or_default(&shortcuts_path)?;

    // Worker通信用のコマンド/イベントチャネルを作る。
    let (tx_cmd, rx_cmd) = mpsc::channel::<WorkerCmd>(64);
    let (tx_ev, rx_ev) = mpsc::channel::<WorkerEvent>(256);

    // 初期設定スナップショットでWorkerを起動する。
    tokio::spawn(worker::run(rx_cmd, tx_ev, cfg.clone()));

    // 初回起動時はオンボーディングウィザードを表示する。
    let initial_screen = if cfg.onboarding.completed {
        Screen::Main
    } else {
        Screen::InitialSetup
    };

    // アプリ状態を初期化する。
    let mut app = App {
        cfg_path,
        cfg: cfg.clone(),
        ui: UiState {
            screen: initial_screen.clone(),
            selected: 0,
            log: vec![],
            status: "Ready".into(),
            error: None,
            list_error: None,
            page: 1,
            has_next_page: false,
            loading: false,
            loaded_once: false,
            server: ServerStatus::Starting,
            signed_in: false,
        },
        jobs: vec![],
        worker_tx: tx_cmd,
        worker_rx: rx_ev,
        api_url: cfg.api.base_url.clone(),
        auth_url: cfg.auth.base_url.clone(),
        storage_url: cfg.storage.base_url.clone(),
        max_upload_mb: cfg.upload.max_size_mb.to_string(),
        create: CreateState::default(),
        pending_delete: None,
        input_box: None,
        wizard_state: wizard::WizardState::new(),
        shortcuts,
    };

    // ウィザード以外なら起動時に一覧を更新する。
    if initial_screen == Screen::Main {
        request_refresh(&mut app).await?;
    }

    loop {
        // 現在の状態を描画する。
        terminal.draw(|f| draw(f, &app))?;

        // 入力処理の前にWorkerイベントを消化する。
        while let Ok(ev) = app.worker_rx.try_recv() {
            handle_worker_event(&mut app, ev)?;
        }

        // UIの応答性確保のため短いタイムアウトで入力をポーリングする。
        if event::poll(Duration::from_millis(50))?
            && let Event::Key(k) = event::read()?
        {
            // どのフェーズでもCtrl+Cで終了できるようにする。
            if is_ctrl_c(&k) {
                break;
            }
            if handle_key(&mut app, k).await? {
                break;
            }
        }
    }
    Ok(())
}

/// WorkerイベントをUI状態へ反映する。
fn handle_worker_event(app: &mut App, ev: WorkerEvent) -> Result<()> {
    match ev {
        WorkerEvent::PageLoaded(loaded) => {
            // ページを丸ごと置き換え、新しい順に並べる。
            app.jobs = loaded.data;
            app.jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            app.ui.page = loaded.page;
            app.ui.has_next_page = loaded.has_next_page;
            app.ui.loading = false;
            app.ui.loaded_once = true;
            app.ui.list_error = None;
            // 選択位置が行数を超えないように補正する。
            if app.ui.selected >= app.jobs.len() {
                app.ui.selected = app.jobs.len().saturating_sub(1);
            }
            app.ui.status = format!("Loaded {} jobs", app.jobs.len());
        }
        WorkerEvent::PageError(message) => {
            // 一覧をエラーパネル表示に切り替える。
            app.ui.loading = false;
            app.ui.list_error = Some(message);
        }
        WorkerEvent::JobUpdated(job) => {
            // 対象行だけを新しい取得結果で置き換える。
            if let Some(slot) = app.jobs.iter_mut().find(|j| j.id == job.id) {
                *slot = job;
            }
        }
        WorkerEvent::JobCreated(job) => {
            // ダイアログを閉じて状態をリセットする。
            app.create.reset();
            if app.ui.screen == Screen::CreateJob {
                app.ui.screen = Screen::Main;
            }
            app.ui.status = format!("Job created: {}", job.title);
        }
        WorkerEvent::CreateFailed(message) => {
            // ダイアログは開いたまま、エラーを表示して再送信を許す。
            app.create.submitting = false;
            app.create.error = Some(message);
        }
        WorkerEvent::JobDeleted { id } => {
            // 行はリフェッチで消える（楽観的削除はしない）。
            tracing::info!("job {id} deleted");
            app.ui.status = "Job deleted".into();
        }
        WorkerEvent::DeleteFailed(message) => {
            // 一時通知として表示する。
            app.ui.status = format!("Delete failed: {message}");
        }
        WorkerEvent::ServerStatus(status) => {
            // バッジとゲーティングに使う状態を更新する。
            app.ui.server = status;
        }
        WorkerEvent::SessionChanged(signed_in) => {
            app.ui.signed_in = signed_in;
        }
        WorkerEvent::Notice(message) => {
            // トースト相当：ステータス行とログの両方に出す。
            app.ui.log.push(message.clone());
            app.ui.status = message;
        }
        WorkerEvent::Log(message) => {
            // ログを追加する。
            app.ui.log.push(message);
        }
    }
    Ok(())
}

/// 現在ページの再取得をWorkerへ依頼する。
pub async fn request_refresh(app: &mut App) -> Result<()> {
    // 初回取得のみスケルトン表示にする。
    if !app.ui.loaded_once {
        app.ui.loading = true;
    }
    tracing::info!("refresh requested: page {}", app.ui.page);
    app.worker_tx
        .send(WorkerCmd::RefreshJobs {
            page: app.ui.page,
            limit: app.cfg.list.page_limit,
        })
        .await?;
    app.ui.status = "Refreshing jobs...".into();
    Ok(())
}
