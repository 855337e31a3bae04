pub mod client; // HTTP APIクライアント
pub mod models; // バックエンドのJSON構造
pub mod push; // ログのプッシュ購読と再接続
pub mod socket_io; // Engine.IO / Socket.IO のフレーム
