use std::fs;
use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};

/// Writes a small synthetic receipt photo with enough pixel variation that
/// crops are never uniform.
pub fn write_receipt_photo(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 200])
    });
    DynamicImage::ImageRgb8(img)
        .to_rgb8()
        .save(path)
        .expect("write photo");
}

/// Writes a detector sidecar for one photo: a high-confidence region and a
/// low-confidence one that the default threshold filters out.
pub fn write_two_region_sidecar(path: &Path, image_name: &str) {
    let json = format!(
        r#"{{
  "{image_name}": [
    {{
      "bbox": [[5.0, 5.0], [70.0, 5.0], [70.0, 18.0], [5.0, 18.0]],
      "text": "SUPERNORMAL",
      "confidence": 0.9
    }},
    {{
      "bbox": [[5.0, 30.0], [70.0, 30.0], [70.0, 42.0], [5.0, 42.0]],
      "text": "smudge",
      "confidence": 0.3
    }}
  ]
}}"#
    );
    fs::write(path, json).expect("write sidecar");
}
