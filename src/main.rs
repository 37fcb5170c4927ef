//! 学習から重み出力までを実行するバイナリ
//!
//! 使い方: `fpga_nn [-dataset_dir <path>]`

use anyhow::Result;

use fpga_nn_lib::cli::parse_dataset_dir;
use fpga_nn_lib::logging::init_logging;
use fpga_nn_lib::ml::{load_image_folders, split_dataset, TrainingContext};
use fpga_nn_lib::model::{export_all_weights, AppConfig, ExportManifest};

fn main() -> Result<()> {
    init_logging();

    let mut config = AppConfig::load_or_default();
    if let Some(dataset_dir) = parse_dataset_dir(std::env::args().skip(1)) {
        config.set_dataset_dir(dataset_dir);
    }
    config.validate()?;
    config.display();

    println!("データセットを読み込んでいます: {}", config.dataset.dataset_dir.display());
    let loaded = load_image_folders(&config.dataset)?;
    println!(
        "{} 枚を読み込みました（スキップ: {} 枚）",
        loaded.samples.len(),
        loaded.skipped.len()
    );

    let split = split_dataset(loaded.samples, config.dataset.test_ratio, config.dataset.seed);
    println!("学習データ: {} 枚, テストデータ: {} 枚", split.train.len(), split.test.len());

    let context = TrainingContext::new(&config)?;
    println!("学習を開始します ({})", context.device_type());
    let report = context.run(split)?;

    println!("\n{}\n", report.summary);

    if let Some(evaluation) = &report.evaluation {
        println!(
            "{} 枚のテスト画像の推論時間: {:.4} 秒",
            evaluation.num_samples,
            evaluation.elapsed.as_secs_f64()
        );
        println!("テスト損失: {:.4}, テスト正解率: {:.4}", evaluation.loss, evaluation.accuracy);
    }

    let paths = export_all_weights(&config.export.output_dir, &report.layers)?;
    for path in &paths {
        println!("重みを書き出しました: {}", path.display());
    }

    if config.export.write_manifest {
        let manifest = ExportManifest::new(
            &config,
            &report.layers,
            report.evaluation.as_ref().map(|e| e.loss),
            report.evaluation.as_ref().map(|e| e.accuracy),
        );
        let path = manifest.save(&config.export.output_dir)?;
        println!("マニフェストを書き出しました: {}", path.display());
    }

    if let Some(prediction) = &report.first_test_prediction {
        println!("テスト画像[0] のラベル: {}", prediction.label);
        println!("NN の予測: {}", prediction.predicted);
    }

    println!("完了");
    Ok(())
}
