//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、データセット、学習、重み出力の設定をJSON形式で保存・読み込みします。

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 同一プロセス内での学習回数（アーティファクトディレクトリ名用）
static TRAINING_RUN: AtomicUsize = AtomicUsize::new(0);

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
    /// WGPU (GPU) バックエンド（`wgpu` フィーチャが必要）
    Wgpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
        }
    }
}

/// 平坦化ベクトル内のチャネル順序
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// 青・緑・赤（FPGA側の推論器が期待する順序）
    #[default]
    Bgr,
    /// 赤・緑・青
    Rgb,
}

impl ChannelOrder {
    /// RGBピクセルをこの順序に並べ替える
    pub fn arrange(self, rgb: [u8; 3]) -> [u8; 3] {
        match self {
            ChannelOrder::Bgr => [rgb[2], rgb[1], rgb[0]],
            ChannelOrder::Rgb => rgb,
        }
    }
}

/// データセット設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSettings {
    /// クラスごとのサブフォルダ（0, 1, 2, ...）を含むディレクトリ
    pub dataset_dir: PathBuf,
    /// 分類クラス数
    pub num_classes: usize,
    /// リサイズ後の画像幅
    pub image_width: u32,
    /// リサイズ後の画像高さ
    pub image_height: u32,
    /// チャネル順序
    #[serde(default)]
    pub channel_order: ChannelOrder,
    /// テストデータとして取り分ける割合
    pub test_ratio: f64,
    /// シャッフル用ランダムシード（未指定なら毎回ランダム）
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("./data"),
            num_classes: 4,
            image_width: 20,
            image_height: 15,
            channel_order: ChannelOrder::Bgr,
            test_ratio: 0.2,
            seed: None,
        }
    }
}

impl DatasetSettings {
    /// 平坦化後の入力ベクトル長 (H * W * 3)
    pub fn input_len(&self) -> usize {
        self.image_width as usize * self.image_height as usize * 3
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// 学習データの末尾から検証用に取り分ける割合
    pub validation_split: f64,
    /// Learnerのアーティファクト出力先（未指定なら一時ディレクトリ）
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 300,
            batch_size: 1000,
            learning_rate: 1e-3,
            validation_split: 0.1,
            artifact_dir: None,
        }
    }
}

impl TrainingSettings {
    /// Learnerのアーティファクト出力先
    ///
    /// 未指定の場合は呼び出しごとに一時ディレクトリ内の別の場所を返す（プロセスIDと連番）。
    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir.clone().unwrap_or_else(|| {
            let run = TRAINING_RUN.fetch_add(1, Ordering::Relaxed);
            std::env::temp_dir().join(format!("fpga_nn_training_{}_{}", std::process::id(), run))
        })
    }
}

/// 重み出力設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    /// `layer_<N>_weights.txt` の出力先
    pub output_dir: PathBuf,
    /// `weights_manifest.json` を書き出すかどうか
    pub write_manifest: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            write_manifest: true,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// データセット設定
    #[serde(default)]
    pub dataset: DatasetSettings,
    /// トレーニング設定
    #[serde(default)]
    pub training: TrainingSettings,
    /// 重み出力設定
    #[serde(default)]
    pub export: ExportSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("fpga_nn.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しない場合や読めない場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    log::info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {:#}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            log::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// デフォルトパスから設定を読み込む
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 値の整合性を検証
    pub fn validate(&self) -> anyhow::Result<()> {
        let dataset = &self.dataset;
        if dataset.num_classes == 0 {
            anyhow::bail!("dataset.num_classes must be at least 1");
        }
        if dataset.image_width == 0 || dataset.image_height == 0 {
            anyhow::bail!(
                "image size must be non-zero: {}x{}",
                dataset.image_width,
                dataset.image_height
            );
        }
        if !(0.0..1.0).contains(&dataset.test_ratio) {
            anyhow::bail!("dataset.test_ratio must be in [0, 1): {}", dataset.test_ratio);
        }
        if !(0.0..1.0).contains(&self.training.validation_split) {
            anyhow::bail!(
                "training.validation_split must be in [0, 1): {}",
                self.training.validation_split
            );
        }
        if self.training.batch_size == 0 {
            anyhow::bail!("training.batch_size must be at least 1");
        }
        Ok(())
    }

    /// データセットディレクトリを上書き
    pub fn set_dataset_dir<P: Into<PathBuf>>(&mut self, path: P) {
        self.dataset.dataset_dir = path.into();
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!("\n--- データセット設定 ---");
        println!("データセット: {}", self.dataset.dataset_dir.display());
        println!("クラス数: {}", self.dataset.num_classes);
        println!(
            "画像サイズ: {}x{} ({:?})",
            self.dataset.image_width, self.dataset.image_height, self.dataset.channel_order
        );
        println!("テスト割合: {}", self.dataset.test_ratio);
        println!("\n--- トレーニング設定 ---");
        println!("エポック数: {}", self.training.num_epochs);
        println!("バッチサイズ: {}", self.training.batch_size);
        println!("学習率: {}", self.training.learning_rate);
        println!("検証割合: {}", self.training.validation_split);
        println!("\n--- 重み出力 ---");
        println!("出力先: {}", self.export.output_dir.display());
        println!("========================\n");
    }
}
