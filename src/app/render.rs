//! TUI描画関連の関数。

use chrono::{DateTime, Utc};
use ratatui::{
    Frame,
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, Wrap},
};

use crate::{
    create::estimate_processing_time,
    events::Screen,
    input,
    jobs::{Job, JobStatus},
    layout,
    server_status::ServerStatus,
    shortcuts::Shortcuts,
};

use super::App;

/// 画面全体のレイアウトを描画する。
pub fn draw(f: &mut Frame, app: &App) {
    // ウィザード画面は専用描画で処理する。
    if app.ui.screen == Screen::InitialSetup {
        draw_wizard_screen(f, app);
        // 入力ボックスが開いていれば重ねて描画する。
        if let Some(input_state) = &app.input_box {
            input::render_input_box(f, input_state);
        }
        return;
    }

    // メインレイアウト（Body + HELP + STATUS）を作る。
    let main_layout = layout::create_main_layout(f.area());
    let body_layout = layout::create_body_layout(main_layout.body);

    // 一覧領域は 取得エラー → 読込中 → 空 → テーブル の優先順で描く。
    if let Some(message) = &app.ui.list_error {
        draw_list_error(f, body_layout.jobs_table, message);
    } else if app.ui.loading && !app.ui.loaded_once {
        draw_loading(f, body_layout.jobs_table);
    } else if app.jobs.is_empty() {
        draw_empty(f, body_layout.jobs_table);
    } else {
        draw_jobs_table(f, body_layout.jobs_table, app);
    }

    // 右パネル：選択中ジョブの詳細とログを表示する。
    let info_panel = Paragraph::new(build_info_text(app))
        .block(Block::default().borders(Borders::ALL).title("INFO"))
        .wrap(Wrap { trim: true });
    f.render_widget(info_panel, body_layout.info_panel);

    // HELPバー（画面ごとのショートカット）を描画する。
    let help_text = get_help_text(app, &app.shortcuts);
    let help_bar = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title("HELP"))
        .wrap(Wrap { trim: true });
    f.render_widget(help_bar, main_layout.help_bar);

    // STATUSバー（画面名・ジョブ情報・エラー）を描画する。
    let status_bar = build_status_bar(app);
    f.render_widget(status_bar, main_layout.status_bar);

    // ダイアログ類を重ねて描画する。
    if app.ui.screen == Screen::CreateJob {
        draw_create_dialog(f, app);
    }
    if app.ui.screen == Screen::ConfirmDelete {
        draw_confirm_dialog(f, app);
    }
    // スリープ中はウェイクアップモーダルが最前面に出る。
    if app.ui.server == ServerStatus::Offline && app.ui.screen == Screen::Main {
        draw_wake_modal(f, app);
    }

    // 入力ボックスが開いていれば重ねて描画する。
    if let Some(input_state) = &app.input_box {
        input::render_input_box(f, input_state);
    }
}

/// ジョブ一覧テーブルを描画する。
fn draw_jobs_table(f: &mut Frame, area: Rect, app: &App) {
    // ジョブ一覧からテーブル行を組み立てる。
    let rows = app.jobs.iter().enumerate().map(|(i, j)| {
        Row::new(vec![
            format!("{}", i + 1),
            j.title.clone(),
            status_str(j).to_string(),
            format_relative(j.created_at),
            // ダウンロード可否の列（完了かつURLありのみ有効）。
            if j.download_url().is_some() {
                "ready".to_string()
            } else {
                "-".to_string()
            },
        ])
    });

    // ジョブテーブルのウィジェットを構築する。
    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(6),
        ],
    )
    .block(Block::default().borders(Borders::ALL).title("JOBS"))
    .header(Row::new(vec!["#", "title", "status", "created", "csv"]).bold())
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(255, 140, 0)) // オレンジ色の背景
            .fg(Color::Black) // 黒文字
            .add_modifier(Modifier::BOLD),
    );

    // 選択中の行をハイライトする。
    let mut table_state = ratatui::widgets::TableState::default();
    if !app.jobs.is_empty() {
        table_state.select(Some(app.ui.selected));
    }
    // テーブルを描画する。
    f.render_stateful_widget(table, area, &mut table_state);
}

/// 一覧取得エラーのパネルを描画する。
fn draw_list_error(f: &mut Frame, area: Rect, message: &str) {
    let text = format!("Error loading jobs\n\n{message}\n\nPress r to retry.");
    let panel = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("JOBS"))
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: true });
    f.render_widget(panel, area);
}

/// 初回取得中のプレースホルダを描画する。
fn draw_loading(f: &mut Frame, area: Rect) {
    let panel = Paragraph::new("Loading jobs...")
        .block(Block::default().borders(Borders::ALL).title("JOBS"))
        .style(Style::default().fg(Color::Gray));
    f.render_widget(panel, area);
}

/// ジョブが1件もないときの案内を描画する。
fn draw_empty(f: &mut Frame, area: Rect) {
    let text = "No jobs found\n\nYou haven't uploaded any PDFs yet.\nPress u to upload a PDF and start processing.";
    let panel = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("JOBS"))
        .wrap(Wrap { trim: true });
    f.render_widget(panel, area);
}

/// 右側のINFOパネル用テキストを構築する。
fn build_info_text(app: &App) -> String {
    let mut lines = vec![];

    // 選択中のジョブ詳細（無ければプレースホルダ）。
    if let Some(j) = app.jobs.get(app.ui.selected) {
        lines.push(format!("Selected: {}", j.title));
        lines.push(format!("ID: {}", j.id));
        lines.push(format!("Status: {}", j.status.as_str()));
        lines.push(format!("Created: {}", format_relative(j.created_at)));
        if let Some(done) = j.completed_at {
            lines.push(format!("Completed: {}", format_relative(done)));
        }
        if let Some(err) = &j.error_message {
            lines.push(format!("Error: {err}"));
        }
        lines.push(format!(
            "Download: {}",
            if j.download_url().is_some() {
                "ready (press o)"
            } else {
                "not available"
            }
        ));
    } else {
        lines.push("Selected: -".into());
    }

    // 接続情報とページ位置。
    lines.push(String::new());
    lines.push(format!("Server: {}", app.ui.server.label()));
    lines.push(format!(
        "Session: {}",
        if app.ui.signed_in {
            "signed in"
        } else {
            "anonymous"
        }
    ));
    lines.push(format!("Page: {}", app.ui.page));
    lines.push(format!("API: {}", app.cfg.api.base_url));

    // ログの末尾を表示する。
    lines.push(String::new());
    lines.push("Log:".into());
    for entry in app.ui.log.iter().rev().take(6).rev() {
        lines.push(entry.clone());
    }

    lines.join("\n")
}

/// ステータスバーを構築する。
fn build_status_bar(app: &App) -> Paragraph<'static> {
    let screen_name = match app.ui.screen {
        Screen::Main => "Main",
        Screen::Settings => "Settings",
        Screen::CreateJob => "Upload",
        Screen::ConfirmDelete => "Delete",
        Screen::InitialSetup => "Setup",
    };

    // ジョブ件数と処理中の数を集計する。
    let job_info = format!(
        "Jobs: {} total, {} processing",
        app.jobs.len(),
        app.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Processing)
            .count()
    );

    // エラーの有無でステータス文字列を切り替える。
    let status_text = if let Some(err) = &app.ui.error {
        format!(
            "[{}] {} | {} | ERROR: {}",
            screen_name,
            job_info,
            app.ui.server.label(),
            err
        )
    } else {
        format!(
            "[{}] {} | Page {} | {} | {}",
            screen_name,
            job_info,
            app.ui.page,
            app.ui.server.label(),
            app.ui.status
        )
    };

    // ステータスバーのウィジェットを生成する。
    let mut status_bar = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("STATUS"))
        .wrap(Wrap { trim: true });

    // エラー時は赤色で強調表示する。
    if app.ui.error.is_some() {
        status_bar = status_bar.style(Style::default().fg(Color::Red));
    }

    status_bar
}

/// アップロードダイアログを描画する。
fn draw_create_dialog(f: &mut Frame, app: &App) {
    let popup_area = layout::centered_popup(f.area(), 60, 12);
    f.render_widget(Clear, popup_area);

    let mut lines = vec![format!(
        "Upload a PDF (max {}MB) to start processing.",
        app.cfg.upload.max_size_mb
    )];
    lines.push(String::new());

    // エラー → 選択済み情報 → 未選択案内 の順で本文を決める。
    if let Some(err) = &app.create.error {
        lines.push(format!("ERROR: {err}"));
    } else if let Some(file) = &app.create.file {
        lines.push(format!(
            "Selected: {} ({:.2} MB)",
            file.filename,
            file.size_mb()
        ));
        lines.push(format!(
            "Estimated time: {}",
            estimate_processing_time(file.size_bytes)
        ));
    } else {
        lines.push("No file selected yet.".into());
    }

    lines.push(String::new());
    if app.create.submitting {
        lines.push("Uploading & creating job...".into());
    } else {
        lines.push("e=ファイル選択 | Enter=アップロード | Esc=閉じる".into());
    }

    let mut dialog = Paragraph::new(lines.join("\n"))
        .block(Block::default().borders(Borders::ALL).title("Upload PDF"))
        .wrap(Wrap { trim: true });
    if app.create.error.is_some() {
        dialog = dialog.style(Style::default().fg(Color::Red));
    }
    f.render_widget(dialog, popup_area);
}

/// 削除確認ダイアログを描画する。
fn draw_confirm_dialog(f: &mut Frame, app: &App) {
    let popup_area = layout::centered_popup(f.area(), 60, 8);
    f.render_widget(Clear, popup_area);

    // 対象ジョブの名前を出して確認を求める。
    let title = app
        .pending_delete
        .as_ref()
        .map(|j| j.title.clone())
        .unwrap_or_else(|| "-".into());
    let text = format!(
        "Delete job \"{title}\"?\n\nThis cannot be undone.\n\nEnter=削除 | Esc=キャンセル"
    );

    let dialog = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Confirm"))
        .style(Style::default().fg(Color::Yellow))
        .wrap(Wrap { trim: true });
    f.render_widget(dialog, popup_area);
}

/// サーバースリープ時のウェイクアップモーダルを描画する。
fn draw_wake_modal(f: &mut Frame, app: &App) {
    let popup_area = layout::centered_popup(f.area(), 60, 10);
    f.render_widget(Clear, popup_area);

    let sc = &app.shortcuts.main;
    let text = format!(
        "Server is Sleeping\n\nThe server has gone to sleep to save resources.\nIt needs to wake up before you can continue.\nThis usually takes about 30-60 seconds.\n\n{}: wake up server | {}: quit",
        sc.wake.join("/"),
        sc.quit.join("/")
    );

    let modal = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Server"))
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: true });
    f.render_widget(modal, popup_area);
}

/// ウィザード画面を描画する。
fn draw_wizard_screen(f: &mut Frame, app: &App) {
    // 余白込みで縦方向に3分割する。
    let outer_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(20), // 上部マージン
            Constraint::Min(10),        // 本文領域
            Constraint::Percentage(20), // 下部マージン
        ])
        .split(f.area());

    // ステップ番号と総数、プロンプトを取得する。
    let step_num = app.wizard_state.get_step_number();
    let total_steps = app.wizard_state.total_steps;
    let prompt = app.wizard_state.get_prompt();

    // 表示するテキストを組み立てる。
    let content_text = format!(
        "=== Initial Setup Wizard ===\n\nStep {}/{}\n\n{}\n\nPress Enter to proceed, ESC to skip step.",
        step_num, total_steps, prompt
    );

    // メインの本文を描画する。
    let content = Paragraph::new(content_text)
        .block(Block::default().borders(Borders::ALL).title("Setup"))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });

    f.render_widget(content, outer_layout[1]);

    // エラーがあれば下部に表示する。
    if let Some(err) = &app.ui.error {
        // エラー表示用のレイアウトを作成する。
        let error_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(3)])
            .split(f.area());

        // エラー用のパネルを構成する。
        let error_text = Paragraph::new(format!("ERROR: {}", err))
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: true });

        // エラー表示を描画する。
        f.render_widget(error_text, error_layout[1]);
    }
}

/// 現在画面に応じたヘルプ文字列を返す。
fn get_help_text(app: &App, shortcuts: &Shortcuts) -> String {
    match app.ui.screen {
        Screen::Main => format!(
            "{}: quit | {}: refresh | {}: upload | {}: delete | {}: download | {}/{}: page | {}/{}: navigate | {}: settings",
            format_keys(&shortcuts.main.quit),
            format_keys(&shortcuts.main.refresh),
            format_keys(&shortcuts.main.upload),
            format_keys(&shortcuts.main.delete),
            format_keys(&shortcuts.main.download),
            format_keys(&shortcuts.main.prev_page),
            format_keys(&shortcuts.main.next_page),
            format_keys(&shortcuts.main.up),
            format_keys(&shortcuts.main.down),
            format_keys(&shortcuts.main.settings),
        ),
        Screen::Settings => format!(
            "{}: api url | {}: auth url | {}: storage url | {}: max upload | {}: save | {}: cancel",
            format_keys(&shortcuts.settings.api_url),
            format_keys(&shortcuts.settings.auth_url),
            format_keys(&shortcuts.settings.storage_url),
            format_keys(&shortcuts.settings.max_upload),
            format_keys(&shortcuts.settings.save),
            format_keys(&shortcuts.settings.cancel)
        ),
        Screen::CreateJob => format!(
            "{}: pick file | {}: upload & process | {}: cancel",
            format_keys(&shortcuts.create.pick_file),
            format_keys(&shortcuts.create.submit),
            format_keys(&shortcuts.create.cancel)
        ),
        Screen::ConfirmDelete => format!(
            "{}: delete | {}: cancel",
            format_keys(&shortcuts.confirm.confirm),
            format_keys(&shortcuts.confirm.cancel)
        ),
        Screen::InitialSetup => format!(
            "Follow wizard steps | {}: proceed | {}: skip step",
            format_keys(&shortcuts.wizard.proceed),
            format_keys(&shortcuts.wizard.skip)
        ),
    }
}

/// ショートカットキーの配列を表示用文字列に変換する。
fn format_keys(keys: &[String]) -> String {
    keys.join("/")
}

/// ジョブ状態を一覧表示用の短いラベルへ変換する。
fn status_str(job: &Job) -> &'static str {
    match job.status {
        JobStatus::Processing => "Processing",
        JobStatus::Completed => "Completed",
        JobStatus::Failed => "Failed",
    }
}

/// タイムスタンプを相対表記へ変換する。
fn format_relative(ts: DateTime<Utc>) -> String {
    let secs = (Utc::now() - ts).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}
