mod common;

use std::process::ExitCode;

use clap::Parser;
use common::{gradient, stack_with, temp_dir};
use pixelstack::cli::{self, CliArgs};
use pixelstack::io::{self, ExportFormat};
use pixelstack::settings::Settings;
use pixelstack::{BlendMode, FilterOptions, LayerStack, Project};

fn settings() -> Settings {
    Settings {
        default_width: 6,
        default_height: 4,
        ..Settings::default()
    }
}

#[test]
fn json_round_trip_keeps_layer_properties() {
    let mut stack = stack_with([10, 20, 30, 255], &[([200, 0, 0, 128], 40)], 5);
    {
        let top = stack.layer_mut(1).unwrap();
        top.blend_mode = BlendMode::Screen;
        top.locked = true;
        top.x = 2;
        top.y = -3;
        top.name = "Glow".into();
    }
    stack.active_layer_mut().pixels = gradient(5, 5);

    let json = io::project_to_json(&stack).unwrap();
    assert!(json.contains("\"imageData\": \"data:image/png;base64,"));
    let back = io::project_from_json(&json).unwrap();

    assert_eq!(back.len(), 2);
    assert_eq!(back.active_layer_index(), 1);
    let (a, b) = (&stack.layers()[1], &back.layers()[1]);
    assert_eq!(a.id, b.id);
    assert_eq!(b.name, "Glow");
    assert_eq!(b.opacity, 40);
    assert_eq!(b.blend_mode, BlendMode::Screen);
    assert!(b.locked);
    assert_eq!((b.x, b.y), (2, -3));
    assert_eq!(b.pixels, a.pixels);
    assert!(back.layers()[0].is_background);
}

#[test]
fn malformed_projects_are_rejected() {
    assert!(io::project_from_json("{ not json").is_err());
    assert!(io::project_from_json(r#"{"version":99,"width":1,"height":1,"layers":[]}"#).is_err());
    assert!(io::project_from_json(r#"{"version":1,"width":1,"height":1,"layers":[]}"#).is_err());
}

#[test]
fn export_encodes_the_composite() {
    let stack = stack_with([255, 0, 0, 255], &[([0, 0, 255, 255], 50)], 4);
    let png = io::export_flat_image(stack.layers(), 4, 4, "image/png", 90).unwrap();
    let img = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(img.get_pixel(1, 1).0, [128, 0, 128, 255]);

    let jpg = io::export_flat_image(stack.layers(), 4, 4, "image/jpeg", 80).unwrap();
    assert_eq!(&jpg[..2], &[0xFF, 0xD8]);

    // unknown types fall back to PNG
    let other = io::export_flat_image(stack.layers(), 4, 4, "image/webp", 80).unwrap();
    assert_eq!(&other[..4], &[0x89, b'P', b'N', b'G']);
}

#[test]
fn filter_undo_redo_through_project() {
    let mut project = Project::new_untitled(1, &settings()).unwrap();
    project.stack.active_layer_mut().pixels = gradient(6, 4);
    let original = project.stack.active_buffer().clone();

    project
        .apply_filter("gaussian_blur", &FilterOptions::new().with_number("radius", 1.5))
        .unwrap();
    project.apply_filter("sepia", &FilterOptions::new()).unwrap();
    assert_eq!(project.history.undo_history(), vec!["Sepia", "Gaussian Blur"]);
    let filtered = project.stack.active_buffer().clone();

    project.history.undo_to(2, &mut project.stack);
    assert_eq!(*project.stack.active_buffer(), original);
    project.redo();
    project.redo();
    assert_eq!(*project.stack.active_buffer(), filtered);
    assert_eq!(project.display_title(), "Untitled-1*");
}

#[test]
fn locked_layer_rejects_filters_without_history() {
    let mut project = Project::new_untitled(1, &settings()).unwrap();
    project.stack.active_layer_mut().locked = true;
    assert!(project.apply_filter("invert", &FilterOptions::new()).is_err());
    assert!(!project.history.can_undo());
}

#[test]
fn cli_filters_an_image_file() {
    let dir = temp_dir("cli");
    let input = dir.join("photo.png");
    let stack = LayerStack::new(3, 2, [10, 20, 30, 255]).unwrap();
    let bytes = io::encode_image(stack.active_buffer(), ExportFormat::Png, 90).unwrap();
    io::write_bytes(&input, &bytes).unwrap();

    let out = dir.join("result.png");
    let args = CliArgs::try_parse_from([
        "pixelstack",
        "-i",
        input.to_str().unwrap(),
        "-f",
        "invert",
        "-o",
        out.to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(cli::run_with_settings(args, &settings()), ExitCode::SUCCESS);

    let img = image::open(&out).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (3, 2));
    assert_eq!(img.get_pixel(2, 1).0, [245, 235, 225, 255]);

    let json_args = CliArgs::try_parse_from([
        "pixelstack",
        "-i",
        input.to_str().unwrap(),
        "-f",
        "grayscale",
        "--format",
        "json",
        "--output-dir",
        dir.join("projects").to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(cli::run_with_settings(json_args, &settings()), ExitCode::SUCCESS);
    let reopened = io::load_project(&dir.join("projects").join("photo.json")).unwrap();
    assert_eq!(reopened.layers()[0].name, "photo");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn cli_reports_missing_inputs() {
    let dir = temp_dir("cli-missing");
    let args = CliArgs::try_parse_from([
        "pixelstack",
        "-i",
        dir.join("nothing-*.png").to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(cli::run_with_settings(args, &settings()), ExitCode::FAILURE);
    let _ = std::fs::remove_dir_all(&dir);
}
