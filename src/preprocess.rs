//! 単一画像の前処理
//!
//! FPGA上の推論器に既知の入力を与えて出力済みの重みを確認するため、
//! 画像1枚をグレースケール化・リサイズ・正規化・平坦化して1行のテキストに書き出します。

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{GrayImage, Luma};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// リサイズ後の一辺の長さ
pub const FLATTEN_SIZE: u32 = 20;

/// デフォルトの出力ファイル名
pub const DEFAULT_OUTPUT: &str = "flattened_array.txt";

/// BT.601 の輝度係数でグレースケール化した画像を読み込む
pub fn load_grayscale(path: &Path) -> Result<GrayImage> {
    let rgb = image::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .to_rgb8();

    let gray = GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    });
    Ok(gray)
}

/// グレースケール画像を `size` x `size` に縮小し、行優先で平坦化して 0〜1 に正規化
///
/// 縮小には三角フィルタを使う。カーネル幅が縮小率に比例して広がるため、
/// OpenCV の `INTER_LINEAR` で縮小した値とはビット単位では一致しない。
pub fn flatten_normalized(gray: &GrayImage, size: u32) -> Vec<f32> {
    image::imageops::resize(gray, size, size, FilterType::Triangle)
        .pixels()
        .map(|pixel| pixel.0[0] as f32 / 255.0)
        .collect()
}

/// 値を小数点以下6桁、`, ` 区切りの1行として書き込む
pub fn write_row<W: Write>(writer: &mut W, values: &[f32]) -> std::io::Result<()> {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            writer.write_all(b", ")?;
        }
        write!(writer, "{:.6}", value)?;
    }
    writer.write_all(b"\n")
}

/// 画像1枚を前処理して `output` に書き出す
///
/// # 戻り値
/// - 書き出した平坦化ベクトル
pub fn flatten_image(input: &Path, output: &Path) -> Result<Vec<f32>> {
    let gray = load_grayscale(input)?;
    let values = flatten_normalized(&gray, FLATTEN_SIZE);

    let file = File::create(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    write_row(&mut writer, &values)
        .and_then(|_| writer.flush())
        .with_context(|| format!("Failed to write output file: {}", output.display()))?;

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient_image(path: &Path) {
        RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, ((x + y) * 2) as u8]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_write_row_format() {
        let mut buffer = Vec::new();
        write_row(&mut buffer, &[0.0, 0.5, 1.0 / 3.0]).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "0.000000, 0.500000, 0.333333\n");
    }

    #[test]
    fn test_grayscale_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pure.png");
        RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])).save(&path).unwrap();

        let gray = load_grayscale(&path).unwrap();
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
    }

    #[test]
    fn test_flatten_image_shape_and_range() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.png");
        let output = dir.path().join(DEFAULT_OUTPUT);
        gradient_image(&input);

        let values = flatten_image(&input, &output).unwrap();
        assert_eq!(values.len(), 400);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));

        let content = std::fs::read_to_string(&output).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.ends_with('\n'));
        assert_eq!(content.trim_end().split(", ").count(), 400);
    }

    #[test]
    fn test_flatten_uniform_image_keeps_value() {
        let gray = GrayImage::from_pixel(57, 31, Luma([128]));
        let values = flatten_normalized(&gray, FLATTEN_SIZE);
        assert_eq!(values.len(), 400);
        assert!(values.iter().all(|v| *v == 128.0 / 255.0));
    }

    #[test]
    fn test_flatten_image_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.png");
        gradient_image(&input);

        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        flatten_image(&input, &first).unwrap();
        flatten_image(&input, &second).unwrap();

        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    }

    #[test]
    fn test_flatten_image_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.txt");
        assert!(flatten_image(&dir.path().join("missing.jpg"), &output).is_err());
        assert!(!output.exists());
    }
}
