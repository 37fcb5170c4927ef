//! 学習済み重みのテキスト出力
//!
//! 各全結合層の重み行列を C/C++ の初期化子としてそのまま貼り付けられる
//! 波括弧区切りのリテラルに変換し、層ごとに1ファイルへ書き出します。
//!
//! ファイル形式（3x2 の例）。行の区切りは `, \n`（カンマ・空白・改行）で、
//! 各行末の `}` の後に `, ` が続いてから改行する。末尾の区切りは無い:
//! ```text
//! {{0.1, 0.2},␠
//! {0.3, 0.4},␠
//! {0.5, 0.6}}
//! ```
//! （`␠` は空白1文字）

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::types::{LayerWeights, WeightMatrix};

/// 値の区切り
const VALUE_SEPARATOR: &str = ", ";
/// 行の区切り
const ROW_SEPARATOR: &str = ", \n";

/// 層番号から出力ファイル名を生成
pub fn weight_file_name(layer_index: usize) -> String {
    format!("layer_{}_weights.txt", layer_index)
}

/// 重み行列をリテラルとして書き込む
///
/// 値は `f32` の最短往復表現で出力し、丸めは行わない。
pub fn write_weight_literal<W: Write>(writer: &mut W, matrix: &WeightMatrix) -> std::io::Result<()> {
    writer.write_all(b"{")?;
    for (i, row) in matrix.row_iter().enumerate() {
        if i > 0 {
            writer.write_all(ROW_SEPARATOR.as_bytes())?;
        }
        writer.write_all(b"{")?;
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                writer.write_all(VALUE_SEPARATOR.as_bytes())?;
            }
            write!(writer, "{}", value)?;
        }
        writer.write_all(b"}")?;
    }
    writer.write_all(b"}")
}

/// 重み行列をリテラル文字列に変換
pub fn format_weight_literal(matrix: &WeightMatrix) -> String {
    let mut buffer = Vec::new();
    // Vec への書き込みは失敗しない
    let _ = write_weight_literal(&mut buffer, matrix);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// 1層分の重みを `output_dir/layer_<N>_weights.txt` に書き出す
///
/// 既存ファイルは切り詰めてから書き込む。
pub fn export_layer_weights(output_dir: &Path, layer: &LayerWeights) -> Result<PathBuf> {
    let path = output_dir.join(weight_file_name(layer.index));

    let file = File::create(&path)
        .with_context(|| format!("Failed to create weight file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_weight_literal(&mut writer, &layer.matrix)
        .and_then(|_| writer.flush())
        .with_context(|| format!("Failed to write weight file: {}", path.display()))?;

    log::debug!(
        "layer {} ({}x{}) -> {}",
        layer.index,
        layer.matrix.rows(),
        layer.matrix.cols(),
        path.display()
    );
    Ok(path)
}

/// 全層の重みを順番に書き出す
///
/// 途中で失敗した場合はそこで中断し、以降の層のファイルは作成されない。
pub fn export_all_weights(output_dir: &Path, layers: &[LayerWeights]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    layers
        .iter()
        .map(|layer| export_layer_weights(output_dir, layer))
        .collect()
}
