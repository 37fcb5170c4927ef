pub mod dataset;
pub mod inference;
pub mod ml_model;
pub mod training;

pub use dataset::{load_image_folders, split_dataset, DatasetSplit, LoadReport, SampleDataset};
pub use inference::{Evaluation, InferenceEngine, SamplePrediction};
pub use ml_model::{load_and_normalize_image_with_size, DenseClassifier, DenseLayerRef, ModelConfig, HIDDEN_1, HIDDEN_2, NUM_CLASSES};
pub use training::{train_model, SampleBatch, SampleBatcher, TrainingContext, TrainingReport};
