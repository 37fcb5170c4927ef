//! ログ出力の初期化

use tracing_subscriber::EnvFilter;

/// 標準エラー出力へのログを初期化する
///
/// `RUST_LOG` で出力レベルを変更できる（デフォルトは `info`、wgpu は `warn`）。
/// ライブラリ側の `log` マクロもこのサブスクライバに流れる。
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wgpu_core=warn,wgpu_hal=warn"));

    // 既に設定済みの場合は何もしない
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
