//! 機械学習モデルの共通定義
//!
//! FPGA推論器と同じ構成の全結合分類モデルと、入力画像の読み込み・正規化を提供します。

use anyhow::Result;
use burn::{
    config::Config,
    module::Module,
    nn::{loss::CrossEntropyLossConfig, Initializer, Linear, LinearConfig, Relu},
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};
use image::imageops::FilterType;
use std::path::Path;

use crate::model::ChannelOrder;
use crate::types::{Activation, LayerWeights, WeightMatrix};

/// クラス数
pub const NUM_CLASSES: usize = 4;

/// 1層目の出力ユニット数
pub const HIDDEN_1: usize = 32;

/// 2層目の出力ユニット数
pub const HIDDEN_2: usize = 24;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 平坦化後の入力長 (H * W * 3)
    pub input_len: usize,
    /// 分類クラス数
    pub num_classes: usize,
    #[config(default = 32)]
    pub hidden_1: usize,
    #[config(default = 24)]
    pub hidden_2: usize,
}

impl ModelConfig {
    /// モデルを初期化
    ///
    /// 全結合層はすべてバイアス無し、重みは Glorot 一様分布で初期化する。
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseClassifier<B> {
        let dense = |d_input: usize, d_output: usize| {
            LinearConfig::new(d_input, d_output)
                .with_bias(false)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device)
        };

        log::debug!(
            "[Model] {} -> {} -> {} -> {}",
            self.input_len,
            self.hidden_1,
            self.hidden_2,
            self.num_classes
        );

        DenseClassifier {
            dense1: dense(self.input_len, self.hidden_1),
            dense2: dense(self.hidden_1, self.hidden_2),
            dense3: dense(self.hidden_2, self.num_classes),
            activation: Relu::new(),
        }
    }
}

/// 全結合分類モデル
///
/// # アーキテクチャ
/// - 0: Flatten (H x W x 3 -> H*W*3)
/// - 1: Dense 32 + ReLU（バイアス無し）
/// - 2: Dense 24 + ReLU（バイアス無し）
/// - 3: Dense num_classes + Softmax（バイアス無し、学習時は損失側で適用）
#[derive(Module, Debug)]
pub struct DenseClassifier<B: Backend> {
    dense1: Linear<B>,
    dense2: Linear<B>,
    dense3: Linear<B>,
    activation: Relu,
}

/// 学習可能な層への参照
pub struct DenseLayerRef<'a, B: Backend> {
    /// 層番号（Flatten層が0）
    pub index: usize,
    pub activation: Activation,
    linear: &'a Linear<B>,
}

impl<B: Backend> DenseLayerRef<'_, B> {
    /// 重み行列を取り出す (入力特徴数 x 出力ユニット数)
    pub fn weight_matrix(&self) -> Result<WeightMatrix> {
        let weight = self.linear.weight.val();
        let [rows, cols] = weight.dims();
        let values = weight
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("重みの取得エラー (layer {}): {:?}", self.index, e))?;
        WeightMatrix::new(rows, cols, values)
    }

    pub fn weights(&self) -> Result<LayerWeights> {
        Ok(LayerWeights {
            index: self.index,
            activation: self.activation,
            matrix: self.weight_matrix()?,
        })
    }

    /// 出力ユニット数
    pub fn units(&self) -> usize {
        self.linear.weight.val().dims()[1]
    }

    /// パラメータ数
    pub fn num_params(&self) -> usize {
        self.linear.num_params()
    }
}

impl<B: Backend> DenseClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, height, width, 3]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, height, width, channels] = images.dims();

        // Flatten
        let x = images.reshape([batch_size, height * width * channels]);

        let x = self.dense1.forward(x);
        let x = self.activation.forward(x);

        let x = self.dense2.forward(x);
        let x = self.activation.forward(x);

        self.dense3.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 予測を実行
    ///
    /// # 戻り値
    /// - (予測クラスID [batch_size, 1], 確率)
    pub fn predict(&self, images: Tensor<B, 4>) -> (Tensor<B, 2, Int>, Tensor<B, 2>) {
        let probabilities = self.probabilities(images);
        let predictions = probabilities.clone().argmax(1);
        (predictions, probabilities)
    }

    /// 順伝播と損失計算（学習用）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }

    /// 学習可能な層を順番に返す（Flatten層は重みを持たないため含まない）
    pub fn dense_layers(&self) -> [DenseLayerRef<'_, B>; 3] {
        [
            DenseLayerRef { index: 1, activation: Activation::Relu, linear: &self.dense1 },
            DenseLayerRef { index: 2, activation: Activation::Relu, linear: &self.dense2 },
            DenseLayerRef { index: 3, activation: Activation::Softmax, linear: &self.dense3 },
        ]
    }

    /// 全層の重みを取り出す
    pub fn layer_weights(&self) -> Result<Vec<LayerWeights>> {
        self.dense_layers().iter().map(|layer| layer.weights()).collect()
    }

    /// 層構成の要約（Keras の `model.summary()` 相当）
    pub fn summary(&self) -> String {
        let layers = self.dense_layers();
        let input_len = self.dense1.weight.val().dims()[0];

        let mut lines = vec![
            format!("{:<8}{:<20}{:>12}{:>10}", "Index", "Layer", "Output", "Params"),
            format!("{:<8}{:<20}{:>12}{:>10}", 0, "flatten", input_len, 0),
        ];
        for layer in &layers {
            lines.push(format!(
                "{:<8}{:<20}{:>12}{:>10}",
                layer.index,
                format!("dense ({})", layer.activation),
                layer.units(),
                layer.num_params()
            ));
        }
        lines.push(format!("Total params: {}", self.num_params()));
        lines.join("\n")
    }
}

/// 画像を読み込んでリサイズ・正規化
///
/// 三角フィルタ（双一次）で縮小し、各チャネルを 255 で割る。
/// 縮小時はカーネル幅が縮小率に合わせて広がるため、2x2 近傍だけを見る OpenCV の
/// `INTER_LINEAR` とは画素値が一致しない。
///
/// # 戻り値
/// - (H, W, C) の順で平坦化した 0〜1 の値
pub fn load_and_normalize_image_with_size(
    path: &Path,
    width: u32,
    height: u32,
    channel_order: ChannelOrder,
) -> Result<Vec<f32>> {
    let img = image::open(path)?.to_rgb8();
    let resized = image::imageops::resize(&img, width, height, FilterType::Triangle);

    let mut data = Vec::with_capacity(3 * width as usize * height as usize);
    for pixel in resized.pixels() {
        for value in channel_order.arrange(pixel.0) {
            data.push(value as f32 / 255.0);
        }
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    fn model() -> DenseClassifier<TestBackend> {
        ModelConfig::new(15 * 20 * 3, NUM_CLASSES).init::<TestBackend>(&NdArrayDevice::Cpu)
    }

    #[test]
    fn test_layer_shapes() {
        let model = model();
        let shapes: Vec<[usize; 2]> = model
            .layer_weights()
            .unwrap()
            .iter()
            .map(|layer| layer.matrix.shape())
            .collect();
        assert_eq!(shapes, vec![[900, HIDDEN_1], [HIDDEN_1, HIDDEN_2], [HIDDEN_2, NUM_CLASSES]]);

        let indices: Vec<usize> = model.dense_layers().iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_no_bias_parameters() {
        assert_eq!(model().num_params(), 900 * 32 + 32 * 24 + 24 * 4);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = NdArrayDevice::Cpu;
        let images = Tensor::<TestBackend, 4>::ones([2, 15, 20, 3], &device) * 0.5;
        let (predictions, probabilities) = model().predict(images);

        assert_eq!(predictions.dims(), [2, 1]);
        assert_eq!(probabilities.dims(), [2, NUM_CLASSES]);
        let sums = probabilities.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_summary_lists_every_layer() {
        let summary = model().summary();
        assert!(summary.contains("flatten"));
        assert!(summary.contains("dense (softmax)"));
        assert!(summary.ends_with("Total params: 29664"));
    }

    #[test]
    fn test_load_image_normalized_bgr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(40, 30, Rgb([255, 0, 51])).save(&path).unwrap();

        let data = load_and_normalize_image_with_size(&path, 20, 15, ChannelOrder::Bgr).unwrap();
        assert_eq!(data.len(), 900);
        assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((data[0] - 0.2).abs() < 1e-6);
        assert_eq!(data[1], 0.0);
        assert_eq!(data[2], 1.0);
    }

    #[test]
    fn test_load_image_missing_file() {
        let result = load_and_normalize_image_with_size(
            Path::new("/nonexistent/image.png"),
            20,
            15,
            ChannelOrder::Rgb,
        );
        assert!(result.is_err());
    }
}
