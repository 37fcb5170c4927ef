//! コマンドライン引数の解釈

use std::path::PathBuf;

/// データセットディレクトリを指定するフラグ
pub const DATASET_DIR_FLAG: &str = "-dataset_dir";

/// `-dataset_dir <path>` の2トークンだけが与えられた場合にそのパスを返す
///
/// それ以外の引数の形は無視され、設定ファイルの値（デフォルト `./data`）が使われる。
pub fn parse_dataset_dir<I, S>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    match args.as_slice() {
        [flag, path] if flag == DATASET_DIR_FLAG => Some(PathBuf::from(path)),
        _ => None,
    }
}
