pub mod config;
pub mod export_manifest;
pub mod weight_export;

pub use config::{AppConfig, ChannelOrder, DatasetSettings, DeviceType, ExportSettings, TrainingSettings};
pub use export_manifest::{ExportManifest, ManifestLayer, MANIFEST_FILE_NAME};
pub use weight_export::{export_all_weights, export_layer_weights, format_weight_literal, weight_file_name};
