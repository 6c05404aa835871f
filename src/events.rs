//! 画面遷移用のUI状態と画面種別。

use crate::server_status::ServerStatus;

/// TUIで現在表示中の画面。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    /// メインのジョブ一覧画面。
    Main,
    /// 設定編集画面。
    Settings,
    /// PDFアップロード（ジョブ作成）ダイアログ。
    CreateJob,
    /// 削除確認ダイアログ。
    ConfirmDelete,
    /// 初期設定ウィザード画面。
    InitialSetup,
}

/// 描画側と共有するUI状態。
#[derive(Clone, Debug)]
pub struct UiState {
    /// 現在の画面。
    pub screen: Screen,
    /// ジョブ一覧の選択行。
    pub selected: usize,
    /// 右側パネルに表示するログ。
    pub log: Vec<String>,
    /// 画面下部のステータス文言。
    pub status: String,
    /// エラーメッセージ（強調表示用）。
    pub error: Option<String>,
    /// 一覧取得失敗時のエラー（エラーパネル表示用）。
    pub list_error: Option<String>,
    /// 現在のページ番号（1始まり）。
    pub page: u32,
    /// 直近のレスポンスが次ページありと答えたか。
    pub has_next_page: bool,
    /// 取得中かどうか。
    pub loading: bool,
    /// 一度でもページを取得できたか（スケルトン表示の判定用）。
    pub loaded_once: bool,
    /// サーバーの状態バッジ。
    pub server: ServerStatus,
    /// サインイン済みかどうか。
    pub signed_in: bool,
}

impl UiState {
    /// 前ページへ移動できるか（1ページ目では無効）。
    pub fn can_prev_page(&self) -> bool {
        self.page > 1
    }

    /// 次ページへ移動できるか（最終ページでは無効）。
    pub fn can_next_page(&self) -> bool {
        self.has_next_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ui(page: u32, has_next: bool) -> UiState {
        UiState {
            screen: Screen::Main,
            selected: 0,
            log: vec![],
            status: String::new(),
            error: None,
            list_error: None,
            page,
            has_next_page: has_next,
            loading: false,
            loaded_once: true,
            server: ServerStatus::Online,
            signed_in: false,
        }
    }

    #[test]
    fn prev_is_disabled_on_the_first_page() {
        // 1ページ目では前へ移動できない。
        assert!(!ui(1, true).can_prev_page());
        assert!(ui(2, true).can_prev_page());
    }

    #[test]
    fn next_follows_has_next_page() {
        // 次ページの有無はレスポンスの申告に従う。
        assert!(ui(1, true).can_next_page());
        assert!(!ui(1, false).can_next_page());
        assert!(!ui(5, false).can_next_page());
    }
}
