use approx::assert_abs_diff_eq;
use georeg_cli::{read_output, ImageRole, NoDebug, Registrar, RegistrationError};
use georeg_core::{Confidence, DetectorVariant, Image, RegistrationConfig, RegistrationConfigBuilder};
use image::{imageops, DynamicImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Random rectangles and discs over a soft gradient, about one shape per
/// 1280 pixels
fn textured_image(width: u32, height: u32, seed: u64) -> Image {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = Image::from_fn(width, height, |x, y| Luma([(60 + (x + y) * 40 / (width + height)) as u8]));
    for _ in 0..(width * height / 1280).max(60) {
        let shade = Luma([rng.gen_range(0..=255u8)]);
        let x = rng.gen_range(0..width as i32 - 20);
        let y = rng.gen_range(0..height as i32 - 20);
        if rng.gen_bool(0.5) {
            let w = rng.gen_range(8..40u32);
            let h = rng.gen_range(8..40u32);
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(w, h), shade);
        } else {
            draw_filled_circle_mut(&mut img, (x + 10, y + 10), rng.gen_range(4..16), shade);
        }
    }
    img
}

fn noise_image(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
}

fn orb_config() -> RegistrationConfig {
    RegistrationConfigBuilder::new()
        .attempt(1, DetectorVariant::orb())
        .build()
        .unwrap()
}

fn assert_near_identity(transform: &georeg_core::Transform) {
    for &(x, y) in &[(10.0, 10.0), (160.0, 120.0), (300.0, 220.0)] {
        let (u, v) = transform.apply(x, y).unwrap();
        assert_abs_diff_eq!(u, x, epsilon = 1.0);
        assert_abs_diff_eq!(v, y, epsilon = 1.0);
    }
}

#[test]
fn test_identical_images_register_with_high_confidence() {
    let img = DynamicImage::ImageLuma8(textured_image(320, 240, 21));
    let registrar = Registrar::new(orb_config()).unwrap();
    let registration = registrar.register(&img, &img, &mut NoDebug).unwrap();

    assert!(registration.result.inliers() > 25, "only {} inliers", registration.result.inliers());
    assert_eq!(registration.result.confidence(), Confidence::High);
    assert_near_identity(registration.result.transform());

    let report = registration.accepted_report().unwrap();
    assert!(report.inliers <= report.good);
    assert!(report.good <= report.unique);
    assert!(report.unique <= report.separated);
    assert!(report.separated <= report.raw_matches);
    let rotation = report.rotation.clone().unwrap().unwrap();
    assert_abs_diff_eq!(rotation.angle, 0.0, epsilon = 1e-3);
}

#[test]
fn test_production_config_registers_identical_images() {
    let img = DynamicImage::ImageLuma8(textured_image(320, 240, 21));
    let registrar = Registrar::new(RegistrationConfig::default()).unwrap();
    let registration = registrar.register(&img, &img, &mut NoDebug).unwrap();

    assert_eq!(registration.reports.len(), 1);
    assert_eq!(registration.accepted_report().unwrap().detector, "AKAZE");
    assert_eq!(registration.result.confidence(), Confidence::High);
    assert_near_identity(registration.result.transform());
}

#[test]
fn test_cropped_view_maps_back_onto_base_map() {
    let (dx, dy) = (40u32, 30u32);
    let base = textured_image(640, 480, 33);
    let crop = imageops::crop_imm(&base, dx, dy, 400, 300).to_image();
    let base = DynamicImage::ImageLuma8(base);
    let crop = DynamicImage::ImageLuma8(crop);

    for config in [RegistrationConfig::default(), orb_config()] {
        let registrar = Registrar::new(config).unwrap();
        let registration = registrar.register(&base, &crop, &mut NoDebug).unwrap();
        assert_eq!(registration.result.confidence(), Confidence::High);

        // match image pixels land on the base map shifted by the crop offset
        let transform = registration.result.transform();
        for &(x, y) in &[(100.0, 100.0), (300.0, 200.0), (20.0, 250.0)] {
            let (u, v) = transform.apply(x, y).unwrap();
            assert_abs_diff_eq!(u, x + dx as f64, epsilon = 1.0);
            assert_abs_diff_eq!(v, y + dy as f64, epsilon = 1.0);
        }
    }
}

#[test]
fn test_fallback_preset_registers_identical_images() {
    let img = DynamicImage::ImageLuma8(textured_image(320, 240, 5));
    let registrar = Registrar::new(RegistrationConfig::fallback_preset()).unwrap();
    let registration = registrar.register(&img, &img, &mut NoDebug).unwrap();
    assert!(registration.result.inliers() >= 10);
    assert_near_identity(registration.result.transform());
    let accepted = registration.accepted_report().unwrap();
    for report in &registration.reports {
        assert!(accepted.score() >= report.score());
    }
}

#[test]
fn test_register_files_writes_result() {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("basemap.png");
    let matched = dir.path().join("geocam.png");
    let output = dir.path().join("result.txt");
    let img = textured_image(320, 240, 9);
    img.save(&reference).unwrap();
    img.save(&matched).unwrap();

    let registrar = Registrar::new(orb_config()).unwrap();
    let registration = registrar.register_files(&reference, &matched, &output, false).unwrap();

    let (label, transform) = read_output(&output).unwrap();
    assert_eq!(label, registration.result.confidence());
    assert_eq!(&transform, registration.result.transform());
    assert!(!dir.path().join("warped.png").exists());
}

#[test]
fn test_debug_images_land_next_to_output() {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("basemap.png");
    let output = dir.path().join("result.txt");
    textured_image(320, 240, 13).save(&reference).unwrap();

    let registrar = Registrar::new(orb_config()).unwrap();
    registrar.register_files(&reference, &reference, &output, true).unwrap();
    for name in [
        "basemap_processed.png",
        "geocam_processed.png",
        "ref_keypoints.png",
        "match_keypoints.png",
        "separated_matches.png",
        "good_matches.png",
        "inlier_matches.png",
        "warped.png",
    ] {
        assert!(dir.path().join(name).exists(), "{name} missing");
    }
}

#[test]
fn test_unrelated_noise_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("a.png");
    let matched = dir.path().join("b.png");
    let output = dir.path().join("result.txt");
    noise_image(200, 160, 1).save(&reference).unwrap();
    noise_image(200, 160, 2).save(&matched).unwrap();

    let registrar = Registrar::new(RegistrationConfig::default()).unwrap();
    let err = registrar.register_files(&reference, &matched, &output, false).unwrap_err();
    assert!(matches!(err, RegistrationError::Registration { required: 10, .. }));
    assert!(!output.exists());
}

#[test]
fn test_missing_image_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("result.txt");
    let present = dir.path().join("present.png");
    textured_image(64, 64, 1).save(&present).unwrap();

    let registrar = Registrar::new(RegistrationConfig::default()).unwrap();
    let err = registrar
        .register_files(Path::new("/nonexistent/basemap.png"), &present, &output, false)
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Load { which: ImageRole::Reference, .. }));

    let err = registrar
        .register_files(&present, &dir.path().join("missing.png"), &output, false)
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Load { which: ImageRole::Match, .. }));
    assert!(!output.exists());
}

#[cfg(unix)]
#[test]
fn test_binary_exit_codes() {
    use std::process::Command;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("result.txt");
    let status = Command::new(env!("CARGO_BIN_EXE_register"))
        .arg(dir.path().join("nope.png"))
        .arg(dir.path().join("nope.png"))
        .arg(&output)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(255));
    assert!(!output.exists());

    let status = Command::new(env!("CARGO_BIN_EXE_register")).arg("only-one").status().unwrap();
    assert_eq!(status.code(), Some(255));

    let reference = dir.path().join("basemap.png");
    textured_image(320, 240, 17).save(&reference).unwrap();
    let config = dir.path().join("orb.json");
    orb_config().save_json(&config).unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_register"))
        .arg(&reference)
        .arg(&reference)
        .arg(&output)
        .arg("--config")
        .arg(&config)
        .status()
        .unwrap();
    assert!(status.success());
    let (label, _) = read_output(&output).unwrap();
    assert_eq!(label, Confidence::High);
}
