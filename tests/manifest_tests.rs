//! CSV manifests and image decoding through `ManifestDataset`.

use skin_search::Error;
use skin_search::data::{DatasetProvider, ManifestDataset, ManifestSplits, Split};

fn temp_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "skin_search_manifest_test_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_images(dir: &std::path::Path, n: u8) {
    for i in 0..n {
        let shade = i.wrapping_mul(40);
        image::RgbImage::from_pixel(12, 9, image::Rgb([shade, 255 - shade, 128]))
            .save(dir.join(format!("ISIC_{i}.png")))
            .unwrap();
    }
}

fn write_manifest(path: &std::path::Path, rows: &[(u8, u8)]) {
    let mut text = String::from("image_name,target\n");
    for (i, target) in rows {
        text.push_str(&format!("ISIC_{i}.png,{target}\n"));
    }
    std::fs::write(path, text).unwrap();
}

fn splits(dir: &std::path::Path, negatives: [usize; 3]) -> ManifestSplits {
    ManifestSplits {
        image_dir: dir.to_path_buf(),
        train_csv: dir.join("train.csv"),
        validation_csv: dir.join("validation.csv"),
        test_csv: dir.join("test.csv"),
        negatives,
    }
}

#[test]
fn images_are_resized_and_rescaled() {
    let dir = temp_dir();
    write_images(&dir, 6);
    write_manifest(&dir.join("train.csv"), &[(0, 0), (1, 0), (2, 0), (3, 1), (4, 1)]);
    write_manifest(&dir.join("validation.csv"), &[(5, 1)]);
    write_manifest(&dir.join("test.csv"), &[]);

    let ds = ManifestDataset::open(&splits(&dir, [2, 10, 10]), Some(4))
        .unwrap()
        .with_image_size(8, 6);
    // two of three negatives plus both positives
    assert_eq!(ds.len(Split::Train), 4);
    assert_eq!(ds.len(Split::Validation), 1);
    assert!(ds.is_empty(Split::Test));

    let mut seen = 0;
    for batch in ds.batches(Split::Train, 3).unwrap() {
        let batch = batch.unwrap();
        for (input, label) in batch.inputs.iter().zip(&batch.labels) {
            assert_eq!(input.len(), 8 * 6 * 3);
            assert!(input.iter().all(|v| (0.0..=1.0).contains(v)));
            assert!(*label == 0.0 || *label == 1.0);
        }
        seen += batch.len();
    }
    assert_eq!(seen, 4);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_image_surfaces_as_a_data_error() {
    let dir = temp_dir();
    write_images(&dir, 1);
    write_manifest(&dir.join("train.csv"), &[(0, 1), (7, 0)]);
    write_manifest(&dir.join("validation.csv"), &[(0, 1)]);
    write_manifest(&dir.join("test.csv"), &[]);

    let ds = ManifestDataset::open(&splits(&dir, [5, 5, 5]), Some(1))
        .unwrap()
        .with_image_size(4, 4);
    let results: Vec<_> = ds.batches(Split::Train, 1).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(Error::DataProvider(_))))
    );
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_manifest_fails_to_open() {
    let dir = temp_dir();
    assert!(matches!(
        ManifestDataset::open(&splits(&dir, [1, 1, 1]), None),
        Err(Error::DataProvider(_))
    ));
    std::fs::remove_dir_all(&dir).ok();
}
