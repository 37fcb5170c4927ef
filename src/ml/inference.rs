//! 学習済みモデルの評価と推論

use anyhow::Result;
use burn::data::dataloader::batcher::Batcher;
use burn::tensor::{backend::Backend, Tensor};
use std::time::{Duration, Instant};

use crate::ml::training::SampleBatcher;
use crate::ml::DenseClassifier;
use crate::types::Sample;

/// テストデータでの評価結果
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// サンプル平均のクロスエントロピー損失
    pub loss: f32,
    /// 正解率 (0〜1)
    pub accuracy: f32,
    pub num_samples: usize,
    /// 推論にかかった時間
    pub elapsed: Duration,
}

/// 1サンプル分の推論結果
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePrediction {
    /// 正解ラベル
    pub label: usize,
    /// 予測クラス（確率の argmax）
    pub predicted: usize,
    pub probabilities: Vec<f32>,
}

/// 推論エンジン
pub struct InferenceEngine<B: Backend> {
    model: DenseClassifier<B>,
    batcher: SampleBatcher<B>,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    pub fn new(model: DenseClassifier<B>, device: B::Device, height: usize, width: usize) -> Self {
        Self {
            model,
            batcher: SampleBatcher::new(device.clone(), height, width),
            device,
        }
    }

    pub fn model(&self) -> &DenseClassifier<B> {
        &self.model
    }

    /// バッチ単位で損失と正解率を計算
    pub fn evaluate(&self, samples: &[Sample], batch_size: usize) -> Result<Evaluation> {
        if samples.is_empty() {
            anyhow::bail!("評価データが空です");
        }

        let start = Instant::now();
        let mut loss_sum = 0.0f32;
        let mut correct = 0.0f32;

        for chunk in samples.chunks(batch_size.max(1)) {
            let batch = self.batcher.batch(chunk.to_vec(), &self.device);
            let output = self.model.forward_classification(batch.images, batch.targets);

            loss_sum += scalar(output.loss)? * chunk.len() as f32;

            let [n, _] = output.output.dims();
            let predictions = output.output.argmax(1).reshape([n]);
            correct += scalar(predictions.equal(output.targets).int().sum().float())?;
        }

        let total = samples.len() as f32;
        Ok(Evaluation {
            loss: loss_sum / total,
            accuracy: correct / total,
            num_samples: samples.len(),
            elapsed: start.elapsed(),
        })
    }

    /// 1サンプルを分類
    pub fn classify_sample(&self, sample: &Sample) -> Result<SamplePrediction> {
        let batch = self.batcher.batch(vec![sample.clone()], &self.device);
        let (predictions, probabilities) = self.model.predict(batch.images);

        let predicted = predictions
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))?
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("推論結果が空です"))?;

        let probabilities = probabilities
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("確率の取得エラー: {:?}", e))?;

        Ok(SamplePrediction {
            label: sample.label,
            predicted: predicted as usize,
            probabilities,
        })
    }
}

/// 要素1つのテンソルを f32 として取り出す
fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> Result<f32> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("スカラー値の取得エラー: {:?}", e))?
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("スカラー値が空です"))
}
