pub mod commands; // start / stop / restart の送信
pub mod config_editor; // チャンネル設定の編集と履歴
pub mod config_manager; // コンソール自身の設定ファイル
pub mod engine; // 状態を所有するイベントループ
pub mod events; // キューに流れるイベント
pub mod log_stream; // ログ購読と表示バッファ
pub mod player; // 外部プレイヤーによるプレビュー
pub mod preview; // プレビュー接続管理
pub mod render; // テキスト描画
pub mod session; // 選択中チャンネルの状態
pub mod status_poller; // ステータスの定期取得
pub mod timer_service; // タイマー管理
pub mod utils; // ログ初期化など
pub mod view; // 画面スナップショット

pub use engine::{Console, ConsoleSettings};
pub use view::ConsoleView;
