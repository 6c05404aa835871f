//! 初期設定ウィザードのステート管理。

/// ウィザードの各ステップ
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WizardStep {
    /// ウェルカムメッセージ
    Welcome,
    /// ジョブAPIのエンドポイント
    ApiEndpoint,
    /// 認証サービスのエンドポイント
    AuthEndpoint,
    /// ストレージサービスのエンドポイント
    StorageEndpoint,
    /// セッションファイルの確認
    CheckSession,
    /// 完了
    Complete,
}

/// ウィザードの状態管理
#[derive(Clone, Debug)]
pub struct WizardState {
    /// 現在のステップ
    pub current_step: WizardStep,
    /// 全ステップ数
    pub total_steps: usize,
}

impl WizardState {
    /// 新しいウィザード状態を作成
    pub fn new() -> Self {
        // 最初はWelcomeステップから開始する。
        Self {
            current_step: WizardStep::Welcome,
            total_steps: 6,
        }
    }

    /// 次のステップへ進む
    pub fn next_step(&mut self) {
        // 現在のステップに応じて次のステップを決定する。
        self.current_step = match self.current_step {
            WizardStep::Welcome => WizardStep::ApiEndpoint,
            WizardStep::ApiEndpoint => WizardStep::AuthEndpoint,
            WizardStep::AuthEndpoint => WizardStep::StorageEndpoint,
            WizardStep::StorageEndpoint => WizardStep::CheckSession,
            WizardStep::CheckSession => WizardStep::Complete,
            WizardStep::Complete => WizardStep::Complete,
        };
    }

    /// 現在のステップのプロンプトメッセージを取得
    pub fn get_prompt(&self) -> String {
        // ステップごとの説明文を返す。
        match self.current_step {
            WizardStep::Welcome => {
                "pdfjobs_tuiへようこそ！\n\nこのウィザードでは、PDF→CSV変換サービスへの接続設定を行います。\nEnterキーを押して開始してください。".to_string()
            }
            WizardStep::ApiEndpoint => {
                "ジョブAPIの設定\n\n変換ジョブを管理するAPIのベースURLを入力してください。\n（例: http://localhost:3000）\nEnterキーで入力画面を開きます。".to_string()
            }
            WizardStep::AuthEndpoint => {
                "認証サービスの設定\n\nセッションを発行する認証サービスのベースURLを入力してください。\nEnterキーで入力画面を開きます。".to_string()
            }
            WizardStep::StorageEndpoint => {
                "ストレージの設定\n\nPDFをアップロードするストレージサービスのベースURLを入力してください。\nEnterキーで入力画面を開きます。".to_string()
            }
            WizardStep::CheckSession => {
                "セッションの確認中...\n\nサインイン済みの session.json が必要です。\nEnterキーで次へ進みます。".to_string()
            }
            WizardStep::Complete => {
                "設定完了！\n\nすべての設定が完了しました。\nEnterキーを押してメイン画面に移動します。".to_string()
            }
        }
    }

    /// 現在のステップ番号を取得（1始まり）
    pub fn get_step_number(&self) -> usize {
        // ステップを番号へ対応付ける。
        match self.current_step {
            WizardStep::Welcome => 1,
            WizardStep::ApiEndpoint => 2,
            WizardStep::AuthEndpoint => 3,
            WizardStep::StorageEndpoint => 4,
            WizardStep::CheckSession => 5,
            WizardStep::Complete => 6,
        }
    }
}

impl Default for WizardState {
    fn default() -> Self {
        Self::new()
    }
}
