use serde::{Deserialize, Serialize};

/// 1枚分の学習サンプル
///
/// `pixels` は (H, W, C) の順で平坦化した 0〜1 の値。
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub pixels: Vec<f32>,
    pub label: usize,
}

/// 全結合層の活性化関数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Softmax,
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::Relu => write!(f, "relu"),
            Activation::Softmax => write!(f, "softmax"),
        }
    }
}

/// 行優先の2次元重み行列 (入力特徴数 x 出力ユニット数)
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f32>,
}

impl WeightMatrix {
    pub fn new(rows: usize, cols: usize, values: Vec<f32>) -> anyhow::Result<Self> {
        if rows * cols != values.len() {
            anyhow::bail!(
                "weight shape {}x{} does not match {} values",
                rows,
                cols,
                values.len()
            );
        }
        Ok(Self { rows, cols, values })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// 行ごとのスライスを返す
    pub fn row_iter(&self) -> impl Iterator<Item = &[f32]> {
        // cols == 0 のときも rows 個の空行を返す
        (0..self.rows).map(move |i| &self.values[i * self.cols..(i + 1) * self.cols])
    }
}

/// 学習済み層1つ分の重み
///
/// `index` は Flatten 層を 0 とした層番号（全結合層は 1 から）。
#[derive(Debug, Clone, PartialEq)]
pub struct LayerWeights {
    pub index: usize,
    pub activation: Activation,
    pub matrix: WeightMatrix,
}
