use std::{fs, path::Path};

use image::{Rgb, RgbImage};
use melanoma::{
    Pipeline, PipelineConfig, PipelineErr,
    config::StageConfig,
};

const TEST_IMAGES: [&str; 3] = ["t2.png", "t0.png", "t1.png"];

/// Lays out a tiny dataset under `root`: dark benign and bright malignant lesions.
fn write_dataset(root: &Path) {
    let train_dir = root.join("jpeg/train");
    let test_dir = root.join("jpeg/test");
    fs::create_dir_all(&train_dir).unwrap();
    fs::create_dir_all(&test_dir).unwrap();

    let mut train_csv = String::from("image_name,patient_id,target\n");
    for i in 0..8 {
        let malignant = i % 2 == 1;
        let value = if malignant { 220 } else { 30 };
        let name = format!("ISIC_{i}.png");
        RgbImage::from_pixel(12, 12, Rgb([value, value / 2, value / 3]))
            .save(train_dir.join(&name))
            .unwrap();
        train_csv.push_str(&format!("{name},IP_{i},{}\n", u8::from(malignant)));
    }
    fs::write(root.join("new_train.csv"), train_csv).unwrap();

    let mut test_csv = String::from("image_name\n");
    let mut template = String::from("image_name,target\n");
    for (i, name) in TEST_IMAGES.iter().enumerate() {
        RgbImage::from_pixel(12, 12, Rgb([40 * i as u8; 3]))
            .save(test_dir.join(name))
            .unwrap();
        test_csv.push_str(&format!("{name}\n"));
        template.push_str(&format!("{name},0\n"));
    }
    fs::write(root.join("new_test.csv"), test_csv).unwrap();
    fs::write(root.join("sample_submission.csv"), template).unwrap();
}

fn config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.root = root.to_path_buf();
    config.paths.output = root.join("submission.csv");
    config.image_size = 8;
    config.batch_size = 4;
    config.epochs = 2;
    config.val_fraction = 0.25;
    config.loader.workers = 2;
    config.loader.max_queue_size = 2;
    config.model.backbone = vec![StageConfig {
        channels: 2,
        stride: 2,
    }];
    config.model.replicas = Some(2);
    config.tracking.runs_dir = root.join("runs");
    config.tracking.run_name = Some("e2e".to_string());
    config
}

#[test]
fn trains_and_writes_a_submission() {
    let root = tempfile::tempdir().unwrap();
    write_dataset(root.path());

    let report = Pipeline::new(config(root.path())).run().unwrap();

    assert!((1..=2).contains(&report.history.epochs()));
    assert_eq!(report.predictions, TEST_IMAGES.len());
    assert_eq!(report.submission, root.path().join("submission.csv"));

    let submission = fs::read_to_string(&report.submission).unwrap();
    let lines: Vec<&str> = submission.lines().collect();
    assert_eq!(lines.len(), TEST_IMAGES.len() + 1);
    assert_eq!(lines[0], "image_name,target");

    for (line, name) in lines[1..].iter().zip(TEST_IMAGES) {
        let (image, target) = line.split_once(',').unwrap();
        assert_eq!(image, name);
        let p: f32 = target.parse().unwrap();
        assert!((0. ..=1.).contains(&p));
    }

    let run_dir = report.run_dir.unwrap();
    assert_eq!(run_dir, root.path().join("runs/kaggle_melanoma/e2e"));
    let metrics = fs::read_to_string(run_dir.join("metrics.jsonl")).unwrap();
    assert_eq!(metrics.lines().count(), report.history.epochs());
    assert!(run_dir.join("config.json").is_file());
    assert!(run_dir.join("weights.safetensors").is_file());
}

#[test]
fn missing_test_images_break_the_submission() {
    let root = tempfile::tempdir().unwrap();
    write_dataset(root.path());
    fs::remove_file(root.path().join("jpeg/test").join(TEST_IMAGES[1])).unwrap();

    let mut config = config(root.path());
    config.epochs = 1;

    let res = Pipeline::new(config).run();
    assert!(matches!(
        res,
        Err(PipelineErr::SubmissionLength {
            predictions: 2,
            rows: 3
        })
    ));
    assert!(!root.path().join("submission.csv").exists());
}

#[test]
fn invalid_configs_fail_before_loading() {
    let root = tempfile::tempdir().unwrap();

    let mut config = config(root.path());
    config.val_fraction = 1.5;

    let res = Pipeline::new(config).run();
    assert!(matches!(res, Err(PipelineErr::InvalidConfig(_))));
}
