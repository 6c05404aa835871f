//! ジョブと一覧ページのワイヤモデル。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// バックエンドが管理するジョブの処理状態。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 変換処理中。
    Processing,
    /// 正常完了。
    Completed,
    /// 失敗（error_message付き）。
    Failed,
}

impl JobStatus {
    /// 一覧表示用の短いラベル。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// これ以上状態遷移しないかどうか。
    pub fn is_terminal(self) -> bool {
        // processing だけが非終端。
        !matches!(self, Self::Processing)
    }
}

/// PDF変換タスク1件。状態の変更は常にバックエンド側で行われる。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    /// バックエンドが採番する安定ID。
    pub id: String,
    /// 表示名（アップロード時のファイル名由来）。
    pub title: String,
    /// 現在の処理状態。
    pub status: JobStatus,
    /// 入力PDFの格納先URL。
    pub pdf_url: String,
    /// 変換結果CSVのダウンロードURL（完了後にのみ設定される）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_download_url: Option<String>,
    /// 作成日時。
    pub created_at: DateTime<Utc>,
    /// 完了日時（終端状態で設定）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// 失敗時のエラーメッセージ。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Job {
    /// ダウンロード可能な場合のみURLを返す。
    ///
    /// completed かつ file_download_url が非空のときだけ有効。
    /// completed でもURL未設定の中間状態は「未準備」として扱う。
    pub fn download_url(&self) -> Option<&str> {
        if self.status != JobStatus::Completed {
            return None;
        }
        self.file_download_url
            .as_deref()
            .filter(|url| !url.is_empty())
    }
}

/// ジョブ一覧APIの1ページ分のレスポンス。
#[derive(Clone, Debug, Deserialize)]
pub struct JobPage {
    /// ページ内のジョブ（表示時はそのまま置き換える）。
    pub data: Vec<Job>,
    /// 1始まりのページ番号。
    pub page: u32,
    /// ページサイズ。
    pub limit: u32,
    /// 次ページが存在するか。
    pub has_next_page: bool,
}

/// ジョブ作成リクエストのボディ。
#[derive(Clone, Debug, Serialize)]
pub struct CreateJobRequest {
    /// 拡張子を除いたファイル名。
    pub title: String,
    /// アップロード済みPDFの外部到達可能URL。
    pub pdf_url: String,
}

/// ヘルスチェックのレスポンス。
#[derive(Clone, Debug, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus, download: Option<&str>) -> Job {
        Job {
            id: "42".into(),
            title: "report".into(),
            status,
            pdf_url: "https://storage.example/pdfs/report.pdf".into(),
            file_download_url: download.map(|s| s.to_string()),
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    #[test]
    fn download_url_requires_completed_and_nonempty_url() {
        // completed かつ URLあり → 有効。
        let j = job(JobStatus::Completed, Some("https://x/csv/1"));
        assert_eq!(j.download_url(), Some("https://x/csv/1"));

        // completed でも URL未設定なら無効。
        assert_eq!(job(JobStatus::Completed, None).download_url(), None);
        // 空文字列も未設定扱い。
        assert_eq!(job(JobStatus::Completed, Some("")).download_url(), None);

        // 非completedはURLがあっても無効。
        assert_eq!(
            job(JobStatus::Processing, Some("https://x/csv/1")).download_url(),
            None
        );
        assert_eq!(
            job(JobStatus::Failed, Some("https://x/csv/1")).download_url(),
            None
        );
    }

    #[test]
    fn only_processing_is_non_terminal() {
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn parses_job_page_from_wire_json() {
        // バックエンドの実レスポンス形式を模したJSON。
        let body = r#"{
            "data": [
                {
                    "id": "a1",
                    "title": "invoice",
                    "status": "completed",
                    "pdf_url": "https://s/pdfs/a1.pdf",
                    "file_download_url": "https://s/csvs/a1.csv",
                    "created_at": "2025-12-19T10:00:00Z",
                    "completed_at": "2025-12-19T10:00:30Z"
                },
                {
                    "id": "a2",
                    "title": "ledger",
                    "status": "processing",
                    "pdf_url": "https://s/pdfs/a2.pdf",
                    "created_at": "2025-12-19T10:01:00Z"
                }
            ],
            "page": 1,
            "limit": 10,
            "has_next_page": false
        }"#;

        let page: JobPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.page, 1);
        assert!(!page.has_next_page);
        assert_eq!(page.data[0].status, JobStatus::Completed);
        assert!(page.data[0].download_url().is_some());
        // 任意フィールドは欠けていてもパースできる。
        assert_eq!(page.data[1].file_download_url, None);
        assert_eq!(page.data[1].error_message, None);
    }
}
