//! モデル学習

use anyhow::{Context, Result};
use burn::{
    backend::Autodiff,
    data::dataloader::{batcher::Batcher, DataLoaderBuilder},
    optim::AdamConfig,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
    train::{
        metric::{AccuracyMetric, LossMetric},
        ClassificationOutput, LearnerBuilder, LearningStrategy, TrainOutput, TrainStep, ValidStep,
    },
};
use burn_ndarray::{NdArray, NdArrayDevice};

use crate::ml::dataset::{carve_validation, DatasetSplit, SampleDataset};
use crate::ml::inference::{Evaluation, InferenceEngine, SamplePrediction};
use crate::ml::{DenseClassifier, ModelConfig};
use crate::model::{AppConfig, DatasetSettings, DeviceType, TrainingSettings};
use crate::types::{LayerWeights, Sample};

/// Keras の Adam と同じ epsilon
const ADAM_EPSILON: f32 = 1e-7;

/// バッチャー
#[derive(Clone)]
pub struct SampleBatcher<B: Backend> {
    device: B::Device,
    height: usize,
    width: usize,
}

impl<B: Backend> SampleBatcher<B> {
    pub fn new(device: B::Device, height: usize, width: usize) -> Self {
        Self { device, height, width }
    }
}

impl<B: Backend> Batcher<B, Sample, SampleBatch<B>> for SampleBatcher<B> {
    fn batch(&self, items: Vec<Sample>, _device: &B::Device) -> SampleBatch<B> {
        let batch_size = items.len();
        let mut all_pixels = Vec::with_capacity(batch_size * self.height * self.width * 3);
        let mut targets_vec = Vec::with_capacity(batch_size);

        for item in items {
            all_pixels.extend_from_slice(&item.pixels);
            targets_vec.push(item.label as i64);
        }

        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), &self.device)
            .reshape([batch_size, self.height, self.width, 3]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), &self.device);

        SampleBatch { images, targets }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct SampleBatch<B: Backend> {
    /// [batch_size, height, width, 3]
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// TrainStep実装 (学習時の順伝播 + 逆伝播)
impl<B: AutodiffBackend> TrainStep<SampleBatch<B>, ClassificationOutput<B>> for DenseClassifier<B> {
    fn step(&self, batch: SampleBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

/// ValidStep実装 (検証時の順伝播のみ)
impl<B: Backend> ValidStep<SampleBatch<B>, ClassificationOutput<B>> for DenseClassifier<B> {
    fn step(&self, batch: SampleBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

/// モデル学習を実行
///
/// 学習データの末尾 `validation_split` を検証用に取り分け、残りで学習する。
/// 学習用バッチはエポックごとにシャッフルする。
pub fn train_model<B: AutodiffBackend>(
    device: &B::Device,
    train: Vec<Sample>,
    dataset: &DatasetSettings,
    training: &TrainingSettings,
) -> Result<DenseClassifier<B::InnerBackend>> {
    if train.is_empty() {
        anyhow::bail!("学習データがありません");
    }

    let (fit, valid) = carve_validation(train, training.validation_split);
    if fit.is_empty() {
        anyhow::bail!("検証用を取り分けた後の学習データがありません");
    }
    if valid.is_empty() {
        log::warn!("検証データが空です");
    }
    log::info!("学習データ: {} 枚, 検証データ: {} 枚", fit.len(), valid.len());

    let height = dataset.image_height as usize;
    let width = dataset.image_width as usize;

    let batcher_train = SampleBatcher::<B>::new(device.clone(), height, width);
    let batcher_valid = SampleBatcher::<B::InnerBackend>::new(device.clone(), height, width);

    // データローダー作成（num_workers=0で呼び出しスレッド上でバッチを作る）
    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(training.batch_size)
        .shuffle(dataset.seed.unwrap_or_else(rand::random))
        .num_workers(0)
        .build(SampleDataset::new(fit));

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(training.batch_size)
        .num_workers(0)
        .build(SampleDataset::new(valid));

    let model = ModelConfig::new(dataset.input_len(), dataset.num_classes).init::<B>(device);

    let artifact_dir = training.artifact_dir();
    std::fs::create_dir_all(&artifact_dir).with_context(|| {
        format!("Failed to create artifact directory: {}", artifact_dir.display())
    })?;
    let artifact_dir_str = artifact_dir.to_string_lossy().to_string();

    log::info!(
        "エポック数: {}, バッチサイズ: {}, 学習率: {}",
        training.num_epochs,
        training.batch_size,
        training.learning_rate
    );

    let learner = LearnerBuilder::new(&artifact_dir_str)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .learning_strategy(LearningStrategy::SingleDevice(device.clone()))
        .num_epochs(training.num_epochs)
        .summary()
        .build(
            model,
            AdamConfig::new().with_epsilon(ADAM_EPSILON).init(),
            training.learning_rate,
        );

    let model_trained = learner.fit(dataloader_train, dataloader_valid);

    // 学習済みモデル自体は保存しないのでアーティファクトは破棄する
    if let Err(e) = std::fs::remove_dir_all(&artifact_dir) {
        log::warn!(
            "アーティファクトディレクトリを削除できませんでした {}: {}",
            artifact_dir.display(),
            e
        );
    }

    Ok(model_trained.model)
}

/// 学習から評価までの結果（バックエンド非依存）
#[derive(Debug)]
pub struct TrainingReport {
    /// 層番号順の学習済み重み
    pub layers: Vec<LayerWeights>,
    /// 層構成の要約
    pub summary: String,
    /// テストデータでの評価（テストデータが空なら無し）
    pub evaluation: Option<Evaluation>,
    /// テストデータ先頭1枚の推論結果
    pub first_test_prediction: Option<SamplePrediction>,
}

/// 学習コンテキスト
///
/// 計算デバイスは設定から明示的に受け取り、環境変数などのプロセス全体の状態には触れない。
pub struct TrainingContext {
    device_type: DeviceType,
    dataset: DatasetSettings,
    training: TrainingSettings,
}

impl TrainingContext {
    pub fn new(config: &AppConfig) -> Result<Self> {
        if config.device_type == DeviceType::Wgpu && !cfg!(feature = "wgpu") {
            anyhow::bail!("WGPU デバイスを使うには `wgpu` フィーチャを有効にしてビルドしてください");
        }

        Ok(Self {
            device_type: config.device_type,
            dataset: config.dataset.clone(),
            training: config.training.clone(),
        })
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// 学習・評価・重み取り出しを実行
    pub fn run(&self, split: DatasetSplit) -> Result<TrainingReport> {
        match self.device_type {
            DeviceType::Cpu => self.run_on::<Autodiff<NdArray<f32>>>(NdArrayDevice::Cpu, split),
            #[cfg(feature = "wgpu")]
            DeviceType::Wgpu => self.run_on::<Autodiff<burn::backend::Wgpu>>(
                burn_wgpu::WgpuDevice::DiscreteGpu(0),
                split,
            ),
            #[cfg(not(feature = "wgpu"))]
            DeviceType::Wgpu => anyhow::bail!("`wgpu` フィーチャが無効です"),
        }
    }

    fn run_on<B: AutodiffBackend>(&self, device: B::Device, split: DatasetSplit) -> Result<TrainingReport> {
        log::info!("使用デバイス: {:?}", device);

        let DatasetSplit { train, test } = split;
        let model = train_model::<B>(&device, train, &self.dataset, &self.training)?;

        let engine = InferenceEngine::new(
            model,
            device,
            self.dataset.image_height as usize,
            self.dataset.image_width as usize,
        );

        let layers = engine.model().layer_weights()?;
        let summary = engine.model().summary();

        let evaluation = if test.is_empty() {
            log::warn!("テストデータが空のため評価をスキップします");
            None
        } else {
            Some(engine.evaluate(&test, self.training.batch_size)?)
        };

        let first_test_prediction = test
            .first()
            .map(|sample| engine.classify_sample(sample))
            .transpose()?;

        Ok(TrainingReport {
            layers,
            summary,
            evaluation,
            first_test_prediction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batcher_shapes() {
        let batcher = SampleBatcher::<TestBackend>::new(NdArrayDevice::Cpu, 15, 20);
        let items = vec![
            Sample { pixels: vec![0.5; 900], label: 1 },
            Sample { pixels: vec![0.25; 900], label: 3 },
        ];
        let batch = batcher.batch(items, &NdArrayDevice::Cpu);

        assert_eq!(batch.images.dims(), [2, 15, 20, 3]);
        let targets = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![1, 3]);
    }

    #[test]
    fn test_batcher_keeps_hwc_order() {
        let batcher = SampleBatcher::<TestBackend>::new(NdArrayDevice::Cpu, 1, 2);
        let items = vec![Sample { pixels: vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5], label: 0 }];
        let batch = batcher.batch(items, &NdArrayDevice::Cpu);

        let second_pixel = batch
            .images
            .slice([0..1, 0..1, 1..2, 0..3])
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(second_pixel, vec![0.3, 0.4, 0.5]);
    }

    #[test]
    fn test_train_model_rejects_empty_training_set() {
        let result = train_model::<Autodiff<TestBackend>>(
            &NdArrayDevice::Cpu,
            Vec::new(),
            &DatasetSettings::default(),
            &TrainingSettings::default(),
        );
        assert!(result.is_err());
    }

    fn synthetic_samples(count: usize, input_len: usize) -> Vec<Sample> {
        (0..count)
            .map(|i| {
                let label = i % 4;
                let pixels = (0..input_len)
                    .map(|p| if p % 4 == label { 0.9 } else { ((i + p) % 5) as f32 / 10.0 })
                    .collect();
                Sample { pixels, label }
            })
            .collect()
    }

    fn small_config(artifact_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.dataset.image_width = 4;
        config.dataset.image_height = 3;
        config.dataset.seed = Some(1);
        config.training.num_epochs = 2;
        config.training.batch_size = 16;
        config.training.artifact_dir = Some(artifact_dir.join("artifacts"));
        config
    }

    #[test]
    fn test_train_model_returns_trained_weights() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        let train = synthetic_samples(20, config.dataset.input_len());

        let model = train_model::<Autodiff<TestBackend>>(
            &NdArrayDevice::Cpu,
            train,
            &config.dataset,
            &config.training,
        )
        .unwrap();

        let shapes: Vec<[usize; 2]> = model
            .layer_weights()
            .unwrap()
            .iter()
            .map(|layer| layer.matrix.shape())
            .collect();
        assert_eq!(shapes, vec![[36, 32], [32, 24], [24, 4]]);
        // 学習後はアーティファクトを残さない
        assert!(!dir.path().join("artifacts").exists());
    }

    #[test]
    fn test_context_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        let samples = synthetic_samples(40, config.dataset.input_len());
        let split = crate::ml::split_dataset(samples, config.dataset.test_ratio, config.dataset.seed);
        let test_len = split.test.len();
        assert_eq!(test_len, 8);

        let report = TrainingContext::new(&config).unwrap().run(split).unwrap();

        let shapes: Vec<[usize; 2]> = report.layers.iter().map(|l| l.matrix.shape()).collect();
        assert_eq!(shapes, vec![[36, 32], [32, 24], [24, 4]]);
        let indices: Vec<usize> = report.layers.iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(report.summary.contains("flatten"));

        let evaluation = report.evaluation.unwrap();
        assert_eq!(evaluation.num_samples, test_len);
        assert!(evaluation.loss.is_finite());
        assert!((0.0..=1.0).contains(&evaluation.accuracy));

        let prediction = report.first_test_prediction.unwrap();
        assert!(prediction.predicted < 4);
        assert_eq!(prediction.probabilities.len(), 4);
    }

    #[test]
    fn test_context_run_without_test_data_skips_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        let split = DatasetSplit {
            train: synthetic_samples(12, config.dataset.input_len()),
            test: Vec::new(),
        };

        let report = TrainingContext::new(&config).unwrap().run(split).unwrap();
        assert_eq!(report.layers.len(), 3);
        assert!(report.evaluation.is_none());
        assert!(report.first_test_prediction.is_none());
    }

    #[test]
    fn test_context_rejects_wgpu_without_feature() {
        let mut config = AppConfig::default();
        config.device_type = DeviceType::Wgpu;
        assert_eq!(TrainingContext::new(&config).is_ok(), cfg!(feature = "wgpu"));
    }

    #[test]
    fn test_context_defaults_to_cpu() {
        let context = TrainingContext::new(&AppConfig::default()).unwrap();
        assert_eq!(context.device_type(), DeviceType::Cpu);
    }
}
