//! 重み出力マニフェストの定義と永続化
//!
//! `layer_<N>_weights.txt` と同じディレクトリに `weights_manifest.json` を書き出し、
//! FPGA側で重みを組み込む際に必要な形状や入力仕様を記録します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::config::{AppConfig, ChannelOrder};
use crate::model::weight_export::weight_file_name;
use crate::types::{Activation, LayerWeights};

/// マニフェストのファイル名
pub const MANIFEST_FILE_NAME: &str = "weights_manifest.json";

/// 出力済み層1つ分の情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestLayer {
    /// 層番号（Flatten層が0）
    pub index: usize,
    /// 重みファイル名
    pub file: String,
    /// 入力特徴数
    pub rows: usize,
    /// 出力ユニット数
    pub cols: usize,
    pub activation: Activation,
}

/// 重み出力マニフェスト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    /// リサイズ後の画像幅
    pub image_width: u32,
    /// リサイズ後の画像高さ
    pub image_height: u32,
    /// 入力ベクトルのチャネル順序
    pub channel_order: ChannelOrder,
    /// 分類クラス数
    pub num_classes: usize,
    /// 全結合層にバイアスが無いこと
    pub use_bias: bool,
    pub layers: Vec<ManifestLayer>,
    /// 学習エポック数
    pub num_epochs: usize,
    /// テストデータでの損失（テストデータが空なら無し）
    pub test_loss: Option<f32>,
    /// テストデータでの正解率
    pub test_accuracy: Option<f32>,
    /// 出力時刻（RFC3339形式）
    pub exported_at: String,
}

impl ExportManifest {
    /// 新しいマニフェストを作成
    pub fn new(
        config: &AppConfig,
        layers: &[LayerWeights],
        test_loss: Option<f32>,
        test_accuracy: Option<f32>,
    ) -> Self {
        let layers = layers
            .iter()
            .map(|layer| ManifestLayer {
                index: layer.index,
                file: weight_file_name(layer.index),
                rows: layer.matrix.rows(),
                cols: layer.matrix.cols(),
                activation: layer.activation,
            })
            .collect();

        Self {
            image_width: config.dataset.image_width,
            image_height: config.dataset.image_height,
            channel_order: config.dataset.channel_order,
            num_classes: config.dataset.num_classes,
            use_bias: false,
            layers,
            num_epochs: config.training.num_epochs,
            test_loss,
            test_accuracy,
            exported_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// マニフェストをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize manifest to JSON")
    }

    /// JSON文字列からマニフェストを生成
    #[cfg(test)]
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize manifest from JSON")
    }

    /// `output_dir/weights_manifest.json` に保存
    pub fn save(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(MANIFEST_FILE_NAME);
        std::fs::write(&path, self.to_json_string()?)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(path)
    }

    /// マニフェストを読み込む
    #[cfg(test)]
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::from_json_string(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WeightMatrix;

    #[test]
    fn test_manifest_round_trip_through_file() {
        let config = AppConfig::default();
        let layers = vec![
            LayerWeights {
                index: 1,
                activation: Activation::Relu,
                matrix: WeightMatrix::new(2, 3, vec![0.0; 6]).unwrap(),
            },
            LayerWeights {
                index: 2,
                activation: Activation::Softmax,
                matrix: WeightMatrix::new(3, 4, vec![0.0; 12]).unwrap(),
            },
        ];
        let manifest = ExportManifest::new(&config, &layers, Some(0.5), Some(0.75));

        let dir = tempfile::tempdir().unwrap();
        let path = manifest.save(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), MANIFEST_FILE_NAME);

        let loaded = ExportManifest::load(&path).unwrap();
        assert_eq!(loaded.layers, manifest.layers);
        assert_eq!(loaded.layers[1].file, "layer_2_weights.txt");
        assert_eq!(loaded.layers[1].activation, Activation::Softmax);
        assert_eq!(loaded.channel_order, ChannelOrder::Bgr);
        assert_eq!(loaded.test_accuracy, Some(0.75));
        assert!(!loaded.use_bias);
    }
}
