//! 学習データの読み込みと分割
//!
//! `dataset_dir/0/`, `dataset_dir/1/`, ... の各フォルダ内の画像を読み込み、
//! フォルダ番号をクラスIDとしたサンプル列を作ります。

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

use crate::ml::load_and_normalize_image_with_size;
use crate::model::DatasetSettings;
use crate::types::Sample;

/// 読み込み結果
#[derive(Debug, Default)]
pub struct LoadReport {
    pub samples: Vec<Sample>,
    /// 読み込めずにスキップしたファイル
    pub skipped: Vec<PathBuf>,
    /// クラスごとの読み込み枚数
    pub per_class: Vec<usize>,
}

/// クラスごとのサブフォルダから画像を読み込む
///
/// サブフォルダが存在しない場合はエラー。デコードできないファイルは警告を出してスキップする。
pub fn load_image_folders(settings: &DatasetSettings) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    for class_id in 0..settings.num_classes {
        let class_dir = settings.dataset_dir.join(class_id.to_string());
        let entries = std::fs::read_dir(&class_dir)
            .with_context(|| format!("Failed to read class directory: {}", class_dir.display()))?;

        let mut count = 0;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            match load_and_normalize_image_with_size(
                &path,
                settings.image_width,
                settings.image_height,
                settings.channel_order,
            ) {
                Ok(pixels) => {
                    report.samples.push(Sample { pixels, label: class_id });
                    count += 1;
                }
                Err(e) => {
                    log::warn!("画像読み込み失敗のためスキップ {}: {}", path.display(), e);
                    report.skipped.push(path);
                }
            }
        }

        log::info!("クラス {}: {} 枚", class_id, count);
        report.per_class.push(count);
    }

    if !report.skipped.is_empty() {
        log::warn!("{} 個のファイルを読み込めませんでした", report.skipped.len());
    }

    Ok(report)
}

/// 学習用とテスト用に分割したデータセット
#[derive(Debug)]
pub struct DatasetSplit {
    pub train: Vec<Sample>,
    pub test: Vec<Sample>,
}

/// テストデータの枚数 `round(total * test_ratio)`（偶数丸め）
pub fn test_len(total: usize, test_ratio: f64) -> usize {
    ((total as f64 * test_ratio).round_ties_even() as usize).min(total)
}

/// シャッフルしてから先頭 `test_ratio` をテスト用、残りを学習用に分割
pub fn shuffle_and_split<R: Rng + ?Sized>(
    mut samples: Vec<Sample>,
    test_ratio: f64,
    rng: &mut R,
) -> DatasetSplit {
    samples.shuffle(rng);

    let test_count = test_len(samples.len(), test_ratio);
    let train = samples.split_off(test_count);
    let split = DatasetSplit { train, test: samples };

    if split.test.is_empty() || split.train.is_empty() {
        log::warn!(
            "分割結果が空です (学習: {} 枚, テスト: {} 枚)",
            split.train.len(),
            split.test.len()
        );
    }
    split
}

/// シード指定で分割（未指定ならエントロピーから初期化）
pub fn split_dataset(samples: Vec<Sample>, test_ratio: f64, seed: Option<u64>) -> DatasetSplit {
    let mut rng = match seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    };
    shuffle_and_split(samples, test_ratio, &mut rng)
}

/// 学習データの末尾 `validation_split` を検証用に取り分ける
///
/// # 戻り値
/// - (学習用, 検証用)
pub fn carve_validation(mut train: Vec<Sample>, validation_split: f64) -> (Vec<Sample>, Vec<Sample>) {
    let fit_len = ((train.len() as f64 * (1.0 - validation_split)).floor() as usize).min(train.len());
    let valid = train.split_off(fit_len);
    (train, valid)
}

/// メモリ上のサンプル列
pub struct SampleDataset {
    samples: Vec<Sample>,
}

impl SampleDataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl Dataset<Sample> for SampleDataset {
    fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
