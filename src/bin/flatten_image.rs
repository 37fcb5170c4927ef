//! 画像1枚をグレースケール 20x20 に縮小・正規化し、1行のテキストとして書き出す
//!
//! 使い方: `flatten_image <input> [output]`（出力のデフォルトは `flattened_array.txt`）

use anyhow::Result;
use std::path::PathBuf;

use fpga_nn_lib::logging::init_logging;
use fpga_nn_lib::preprocess::{flatten_image, DEFAULT_OUTPUT};

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (input, output) = match args.as_slice() {
        [input] => (PathBuf::from(input), PathBuf::from(DEFAULT_OUTPUT)),
        [input, output] => (PathBuf::from(input), PathBuf::from(output)),
        _ => anyhow::bail!("使い方: flatten_image <input> [output]"),
    };

    let values = flatten_image(&input, &output)?;
    println!("正規化・平坦化した配列 ({} 要素): {:?}", values.len(), values);
    println!("書き出しました: {}", output.display());
    Ok(())
}
