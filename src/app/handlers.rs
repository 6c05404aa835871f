//! キー入力ハンドラー関数。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::Path;

use crate::{
    create,
    events::Screen,
    input::{InputBoxState, InputCallbackId},
    server_status::ServerStatus,
    shortcuts,
    wizard::WizardStep,
    worker::WorkerCmd,
};

use super::{App, request_refresh};

/// キー入力を1件処理し、終了すべきならtrueを返す。
pub async fn handle_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 入力ボックスが開いていれば最優先で処理する。
    if app.input_box.is_some() {
        return handle_input_box_key(app, k).await;
    }

    // 画面ごとのハンドラへ委譲する。
    match app.ui.screen {
        Screen::Main => handle_main_key(app, k).await,
        Screen::Settings => handle_settings_key(app, k).await,
        Screen::CreateJob => handle_create_key(app, k).await,
        Screen::ConfirmDelete => handle_confirm_key(app, k).await,
        Screen::InitialSetup => handle_wizard_key(app, k).await,
    }
}

/// Ctrl+Cかどうかを判定する。
pub fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

/// メイン画面のキー処理。
async fn handle_main_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // メイン画面のショートカットを参照する。
    let sc = &app.shortcuts.main;

    // サーバーがスリープ中はウェイクアップモーダルが操作をブロックする。
    if app.ui.server == ServerStatus::Offline {
        if shortcuts::matches_shortcut(&k, &sc.quit) {
            return Ok(true);
        } else if shortcuts::matches_shortcut(&k, &sc.wake) {
            // 手動ウェイクアップを依頼する。
            app.worker_tx.send(WorkerCmd::WakeServer).await?;
            app.ui.status = "Waking up server...".into();
        }
        return Ok(false);
    }

    if shortcuts::matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if shortcuts::matches_shortcut(&k, &sc.settings) {
        // 設定画面へ遷移し、編集バッファを更新する。
        reload_settings_buffers(app);
        app.ui.screen = Screen::Settings;
        app.ui.status = "Settings".into();
    } else if shortcuts::matches_shortcut(&k, &sc.refresh) {
        // ジョブ一覧の再取得を依頼する。
        request_refresh(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.next_page) {
        // 次ページへ（最終ページでは無効）。
        if app.ui.can_next_page() {
            app.ui.page += 1;
            request_refresh(app).await?;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.prev_page) {
        // 前ページへ（1ページ目では無効）。
        if app.ui.can_prev_page() {
            app.ui.page -= 1;
            request_refresh(app).await?;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.upload) {
        // アップロードダイアログを開き、ファイルパスの入力を促す。
        app.create.reset();
        app.ui.screen = Screen::CreateJob;
        open_file_path_input(app);
    } else if shortcuts::matches_shortcut(&k, &sc.delete) {
        // 削除確認ダイアログを開く。
        if let Some(job) = app.jobs.get(app.ui.selected) {
            app.pending_delete = Some(job.clone());
            app.ui.screen = Screen::ConfirmDelete;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.download) {
        // 完了済みかつURLありのジョブのみダウンロード可能。
        if let Some(job) = app.jobs.get(app.ui.selected) {
            if let Some(url) = job.download_url() {
                tracing::info!("opening download url for job {}", job.id);
                if let Err(e) = webbrowser::open(url) {
                    app.ui.status = format!("Failed to open browser: {e}");
                } else {
                    app.ui.status = format!("Opened download for {}", job.title);
                }
            } else {
                // 未完了・URL未設定は無効状態として扱う。
                app.ui.status = "Download is not ready for this job".into();
            }
        }
    } else if shortcuts::matches_shortcut(&k, &sc.down) {
        // 次の行へ移動する。
        if app.ui.selected + 1 < app.jobs.len() {
            app.ui.selected += 1;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.up) {
        // 前の行へ移動する。
        if app.ui.selected > 0 {
            app.ui.selected -= 1;
        }
    }

    Ok(false)
}

/// 設定画面のキー処理。
async fn handle_settings_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 設定画面のショートカットを参照する。
    let sc = &app.shortcuts.settings;

    if shortcuts::matches_shortcut(&k, &sc.cancel) {
        // 変更を破棄してメイン画面へ戻る。
        reload_settings_buffers(app);
        app.ui.error = None;
        app.ui.screen = Screen::Main;
    } else if shortcuts::matches_shortcut(&k, &sc.save) {
        // 上限値を数値として検証する。
        let max_mb: u64 = match app.max_upload_mb.trim().parse() {
            Ok(v) if v > 0 => v,
            _ => {
                app.ui.error = Some("Max upload size must be a positive number".into());
                return Ok(false);
            }
        };

        // 編集バッファを設定へ反映する。
        app.cfg.api.base_url = app.api_url.clone();
        app.cfg.auth.base_url = app.auth_url.clone();
        app.cfg.storage.base_url = app.storage_url.clone();
        app.cfg.upload.max_size_mb = max_mb;
        // 設定ファイルを保存する。
        app.cfg.save(&app.cfg_path)?;

        // Workerにも設定更新を通知する。
        app.worker_tx
            .send(WorkerCmd::SaveSettings(app.cfg.clone()))
            .await?;
        // 画面状態を更新してメインへ戻る。
        app.ui.error = None;
        app.ui.screen = Screen::Main;
        app.ui.status = "Saved settings".into();
    } else if shortcuts::matches_shortcut(&k, &sc.api_url) {
        // ジョブAPIのURL入力ボックスを開く。
        app.input_box = Some(InputBoxState {
            prompt: "Job API base URL:".into(),
            value: app.api_url.clone(),
            cursor: app.api_url.chars().count(),
            callback_id: InputCallbackId::SettingsApiUrl,
        });
    } else if shortcuts::matches_shortcut(&k, &sc.auth_url) {
        // 認証サービスのURL入力ボックスを開く。
        app.input_box = Some(InputBoxState {
            prompt: "Auth service base URL:".into(),
            value: app.auth_url.clone(),
            cursor: app.auth_url.chars().count(),
            callback_id: InputCallbackId::SettingsAuthUrl,
        });
    } else if shortcuts::matches_shortcut(&k, &sc.storage_url) {
        // ストレージのURL入力ボックスを開く。
        app.input_box = Some(InputBoxState {
            prompt: "Storage base URL:".into(),
            value: app.storage_url.clone(),
            cursor: app.storage_url.chars().count(),
            callback_id: InputCallbackId::SettingsStorageUrl,
        });
    } else if shortcuts::matches_shortcut(&k, &sc.max_upload) {
        // アップロード上限の入力ボックスを開く。
        app.input_box = Some(InputBoxState {
            prompt: "Max upload size (MB):".into(),
            value: app.max_upload_mb.clone(),
            cursor: app.max_upload_mb.chars().count(),
            callback_id: InputCallbackId::SettingsMaxUpload,
        });
    }

    Ok(false)
}

/// アップロードダイアログのキー処理。
async fn handle_create_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // ダイアログのショートカットを参照する。
    let sc = &app.shortcuts.create;

    if shortcuts::matches_shortcut(&k, &sc.cancel) {
        // 送信中でなければダイアログを閉じて状態を破棄する。
        if !app.create.submitting {
            app.create.reset();
            app.ui.screen = Screen::Main;
        }
    } else if shortcuts::matches_shortcut(&k, &sc.pick_file) {
        // ファイルパスの再入力を促す。
        if !app.create.submitting {
            open_file_path_input(app);
        }
    } else if shortcuts::matches_shortcut(&k, &sc.submit) {
        // 検証済みファイルがある場合のみ送信する。
        let Some(file) = app.create.file.clone() else {
            return Ok(false);
        };
        if app.create.submitting {
            return Ok(false);
        }
        // アップロード→URL解決→作成はWorker側で実行する。
        app.create.submitting = true;
        app.create.error = None;
        app.ui.status = format!("Uploading {}...", file.filename);
        app.worker_tx.send(WorkerCmd::CreateJob { file }).await?;
    }

    Ok(false)
}

/// 削除確認ダイアログのキー処理。
async fn handle_confirm_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 確認ダイアログのショートカットを参照する。
    let sc = &app.shortcuts.confirm;

    if shortcuts::matches_shortcut(&k, &sc.confirm) {
        // 確定された削除をWorkerへ1回だけ送る。
        if let Some(job) = app.pending_delete.take() {
            app.worker_tx
                .send(WorkerCmd::DeleteJob { id: job.id.clone() })
                .await?;
            app.ui.status = format!("Deleting {}...", job.title);
        }
        app.ui.screen = Screen::Main;
    } else if shortcuts::matches_shortcut(&k, &sc.cancel) {
        // 削除を取りやめる。
        app.pending_delete = None;
        app.ui.screen = Screen::Main;
    }

    Ok(false)
}

/// 初期設定ウィザード画面のキー処理。
async fn handle_wizard_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // ウィザード画面のショートカットを参照する。
    let sc = &app.shortcuts.wizard;

    if shortcuts::matches_shortcut(&k, &sc.proceed) {
        match &app.wizard_state.current_step {
            WizardStep::Welcome => {
                // 次のステップへ進む。
                app.wizard_state.next_step();
            }
            WizardStep::ApiEndpoint => {
                // ジョブAPIのURL入力を促す。
                app.input_box = Some(InputBoxState {
                    prompt: "Job API base URL:".into(),
                    value: app.api_url.clone(),
                    cursor: app.api_url.chars().count(),
                    callback_id: InputCallbackId::WizardApiUrl,
                });
            }
            WizardStep::AuthEndpoint => {
                // 認証サービスのURL入力を促す。
                app.input_box = Some(InputBoxState {
                    prompt: "Auth service base URL:".into(),
                    value: app.auth_url.clone(),
                    cursor: app.auth_url.chars().count(),
                    callback_id: InputCallbackId::WizardAuthUrl,
                });
            }
            WizardStep::StorageEndpoint => {
                // ストレージのURL入力を促す。
                app.input_box = Some(InputBoxState {
                    prompt: "Storage base URL:".into(),
                    value: app.storage_url.clone(),
                    cursor: app.storage_url.chars().count(),
                    callback_id: InputCallbackId::WizardStorageUrl,
                });
            }
            WizardStep::CheckSession => {
                // サインイン済みセッションの存在チェックを行う。
                if !Path::new("session.json").exists() {
                    app.ui.error =
                        Some("session.json not found. Sign in first, or press ESC to skip.".into());
                } else {
                    // エラーを解除して次へ進む。
                    app.ui.error = None;
                    app.wizard_state.next_step();
                }
            }
            WizardStep::Complete => {
                // 必須項目が揃っているか検証する。
                if app.api_url.is_empty() {
                    app.ui.error = Some("The job API URL is required.".into());
                    app.wizard_state.current_step = WizardStep::ApiEndpoint;
                    return Ok(false);
                }

                // 設定を保存し、ウィザード完了フラグを立てる。
                app.cfg.api.base_url = app.api_url.clone();
                app.cfg.auth.base_url = app.auth_url.clone();
                app.cfg.storage.base_url = app.storage_url.clone();
                app.cfg.onboarding.completed = true;
                app.cfg.save(&app.cfg_path)?;

                // Workerへ設定更新を通知する。
                app.worker_tx
                    .send(WorkerCmd::SaveSettings(app.cfg.clone()))
                    .await?;

                // メイン画面へ移動して一覧を更新する。
                app.ui.error = None;
                app.ui.screen = Screen::Main;
                app.ui.status = "Setup complete!".into();
                request_refresh(app).await?;
            }
        }
    } else if shortcuts::matches_shortcut(&k, &sc.skip) {
        // 現在のステップをスキップする。
        app.ui.error = None;
        app.wizard_state.next_step();
    }

    Ok(false)
}

/// 入力ボックスのキー処理。
async fn handle_input_box_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 入力ボックスが無ければ何もしない。
    let Some(input_state) = &mut app.input_box else {
        return Ok(false);
    };

    // 入力ボックス用ショートカットを参照する。
    let sc = &app.shortcuts.input_box;

    // 入力ボックス中でもCtrl+Cで終了できるようにする。
    if is_ctrl_c(&k) {
        return Ok(true);
    }

    if shortcuts::matches_shortcut(&k, &sc.confirm) {
        // 入力ボックスを閉じる前に値とコールバック種別を保存する。
        let value = input_state.value.clone();
        let callback_id = input_state.callback_id.clone();
        app.input_box = None;

        // コールバック種別に応じて値を反映する。
        apply_input_callback(app, callback_id, value);
    } else if shortcuts::matches_shortcut(&k, &sc.cancel) {
        // 入力を破棄して入力ボックスを閉じる。
        app.input_box = None;
    } else if shortcuts::matches_shortcut(&k, &sc.backspace) {
        // バックスペースを処理する。
        input_state.backspace();
    } else if shortcuts::matches_shortcut(&k, &sc.delete) {
        // デリートを処理する。
        input_state.delete();
    } else if shortcuts::matches_shortcut(&k, &sc.left) {
        // 左移動を処理する。
        input_state.move_left();
    } else if shortcuts::matches_shortcut(&k, &sc.right) {
        // 右移動を処理する。
        input_state.move_right();
    } else if shortcuts::matches_shortcut(&k, &sc.home) {
        // 行頭移動を処理する。
        input_state.move_home();
    } else if shortcuts::matches_shortcut(&k, &sc.end) {
        // 行末移動を処理する。
        input_state.move_end();
    } else if shortcuts::matches_shortcut(&k, &sc.clear_line) {
        // 行をクリアする。
        input_state.clear_line();
    } else if let KeyCode::Char(c) = k.code {
        // 通常の文字入力を処理する。
        if !k.modifiers.contains(KeyModifiers::CONTROL) {
            // コントロールキーでない場合のみ挿入する。
            input_state.insert_char(c);
        }
    }

    Ok(false)
}

/// 入力ボックスのコールバックを適用する。
fn apply_input_callback(app: &mut App, callback_id: InputCallbackId, value: String) {
    match callback_id {
        InputCallbackId::SettingsApiUrl => app.api_url = value,
        InputCallbackId::SettingsAuthUrl => app.auth_url = value,
        InputCallbackId::SettingsStorageUrl => app.storage_url = value,
        InputCallbackId::SettingsMaxUpload => app.max_upload_mb = value,
        InputCallbackId::CreateFilePath => {
            // 選択されたパスをネットワークへ出す前に検証する。
            app.create.error = None;
            match create::validate_pdf(Path::new(&value), app.cfg.upload.max_size_bytes()) {
                Ok(file) => {
                    tracing::info!("file selected: {} ({} bytes)", file.filename, file.size_bytes);
                    app.create.file = Some(file);
                }
                Err(e) => {
                    // 不合格のファイルは保持しない。
                    app.create.file = None;
                    app.create.error = Some(e.to_string());
                }
            }
        }
        InputCallbackId::WizardApiUrl => {
            // ウィザードのAPIのURLを更新し次へ進む。
            app.api_url = value;
            app.wizard_state.next_step();
        }
        InputCallbackId::WizardAuthUrl => {
            // ウィザードの認証URLを更新し次へ進む。
            app.auth_url = value;
            app.wizard_state.next_step();
        }
        InputCallbackId::WizardStorageUrl => {
            // ウィザードのストレージURLを更新し次へ進む。
            app.storage_url = value;
            app.wizard_state.next_step();
        }
    }
}

/// ファイルパス入力ボックスを開く。
fn open_file_path_input(app: &mut App) {
    // 直前に選択したファイルのパスを初期値にする。
    let current = app
        .create
        .file
        .as_ref()
        .map(|f| f.path.display().to_string())
        .unwrap_or_default();
    app.input_box = Some(InputBoxState {
        prompt: "PDF file path:".into(),
        cursor: current.chars().count(),
        value: current,
        callback_id: InputCallbackId::CreateFilePath,
    });
}

/// 設定画面用の編集バッファを設定値から再読み込みする。
fn reload_settings_buffers(app: &mut App) {
    // 設定の現在値を編集用バッファへ反映する。
    app.api_url = app.cfg.api.base_url.clone();
    app.auth_url = app.cfg.auth.base_url.clone();
    app.storage_url = app.cfg.storage.base_url.clone();
    app.max_upload_mb = app.cfg.upload.max_size_mb.to_string();
}
