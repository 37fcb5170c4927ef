//! 4クラス画像分類用の全結合ネットワークを学習し、
//! FPGA推論器に組み込むための重みをテキストで出力するライブラリ

pub mod cli;
pub mod logging;
pub mod ml;
pub mod model;
pub mod preprocess;
pub mod types;

pub use types::{Activation, LayerWeights, Sample, WeightMatrix};
