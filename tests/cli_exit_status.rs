//! Integration tests for the `stbt` binary: exit status and artifacts.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use image::RgbImage;
use stb_harness::capture::TestPattern;

const SOURCE: &str = "videotestsrc is-live=false width=160 height=120 framerate=5";

fn stbt(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stbt"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("STBT_SYSTEM_CONFIG", dir.join("no-system.conf"))
        .env_remove("STBT_CONFIG_FILE")
        .env_remove("STBT_SOURCE_PIPELINE")
        .env_remove("STBT_SINK_PIPELINE")
        .env_remove("STBT_CONTROL")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run stbt")
}

fn run_script(dir: &Path, source: &str, yaml: &str, extra: &[&str]) -> Output {
    fs::write(dir.join("test.yaml"), yaml).unwrap();
    let mut args = vec![
        "run",
        "test.yaml",
        "--source-pipeline",
        source,
        "--sink-pipeline",
        "fakesink",
        "--control",
        "test",
    ];
    args.extend_from_slice(extra);
    stbt(dir, &args)
}

/// Write a crop of the SMPTE bars and a checkerboard that never appears
fn write_templates(dir: &Path) {
    let bars = TestPattern::Smpte.render(160, 120, 0);
    image::imageops::crop_imm(&bars, 12, 64, 32, 32)
        .to_image()
        .save(dir.join("bars.png"))
        .unwrap();

    let logo = RgbImage::from_fn(32, 32, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            image::Rgb([255, 255, 255])
        } else {
            image::Rgb([0, 0, 0])
        }
    });
    logo.save(dir.join("logo.png")).unwrap();
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_passing_script_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_templates(dir.path());

    let output = run_script(
        dir.path(),
        SOURCE,
        "steps:\n  - action: press\n    key: \"0\"\n  - action: wait_for_match\n    image: bars.png\n    timeout_secs: 5\n",
        &[],
    );

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(!dir.path().join("screenshot.png").exists());
}

#[test]
fn test_match_timeout_exits_one_with_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    write_templates(dir.path());

    let output = run_script(
        dir.path(),
        SOURCE,
        "steps:\n  - action: wait_for_match\n    image: logo.png\n    timeout_secs: 5\n",
        &[],
    );

    assert_eq!(output.status.code(), Some(1), "{}", stderr(&output));
    let message = stderr(&output);
    assert!(message.contains("logo"), "{}", message);
    assert!(message.contains('5'), "{}", message);

    let screenshot = image::open(dir.path().join("screenshot.png")).unwrap();
    assert_eq!((screenshot.width(), screenshot.height()), (160, 120));
}

#[test]
fn test_timeout_without_frames_writes_no_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    write_templates(dir.path());

    let output = run_script(
        dir.path(),
        "videotestsrc is-live=false width=160 height=120 framerate=5 num-buffers=0",
        "steps:\n  - action: wait_for_match\n    image: logo.png\n    timeout_secs: 1\n",
        &[],
    );

    assert_eq!(output.status.code(), Some(1), "{}", stderr(&output));
    assert!(!dir.path().join("screenshot.png").exists());
}

#[test]
fn test_json_summary() {
    let dir = tempfile::tempdir().unwrap();
    write_templates(dir.path());

    let output = run_script(
        dir.path(),
        SOURCE,
        "steps:\n  - action: wait_for_match\n    image: logo.png\n    timeout_secs: 2\n",
        &["--json", "--artifact-dir", "out"],
    );

    assert_eq!(output.status.code(), Some(1), "{}", stderr(&output));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["outcome"], "classified_timeout");
    assert_eq!(summary["exit_code"], 1);
    assert_eq!(summary["timeout"]["kind"], "match");
    assert!(dir.path().join("out").join("screenshot.png").exists());
}

#[test]
fn test_session_init_failure_exits_three() {
    let dir = tempfile::tempdir().unwrap();

    let output = run_script(
        dir.path(),
        "nosuchsrc",
        "steps:\n  - action: press\n    key: \"1\"\n",
        &[],
    );

    assert_eq!(output.status.code(), Some(3), "{}", stderr(&output));
    assert!(stderr(&output).contains("nosuchsrc"));
}

#[test]
fn test_missing_script_exits_two() {
    let dir = tempfile::tempdir().unwrap();

    let output = stbt(dir.path(), &["run", "missing.yaml", "--source-pipeline", SOURCE]);

    assert_eq!(output.status.code(), Some(2), "{}", stderr(&output));
    assert!(stderr(&output).contains("missing.yaml"));
}

#[test]
fn test_record_from_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("keys.txt"), "2\n\n0\n").unwrap();
    let recorder = format!("file://{}", dir.path().join("keys.txt").display());

    let output = stbt(
        dir.path(),
        &[
            "record",
            "--source-pipeline",
            "videotestsrc is-live=false width=64 height=48 framerate=5",
            "--control",
            "test",
            "--control-recorder",
            &recorder,
            "--settle-secs",
            "0.2",
        ],
    );

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    let yaml = fs::read_to_string(dir.path().join("test.yaml")).unwrap();
    assert!(yaml.contains("0001-2-complete.png"), "{}", yaml);
    assert!(yaml.contains("0002-0-complete.png"), "{}", yaml);
    assert!(dir.path().join("0002-0-complete.png").exists());
}

#[test]
fn test_record_rejects_unbounded_settle_secs() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("keys.txt"), "2\n").unwrap();
    let recorder = format!("file://{}", dir.path().join("keys.txt").display());

    let output = stbt(
        dir.path(),
        &[
            "record",
            "--source-pipeline",
            "videotestsrc is-live=false width=64 height=48 framerate=5",
            "--control",
            "test",
            "--control-recorder",
            &recorder,
            "--settle-secs",
            "inf",
        ],
    );

    assert_eq!(output.status.code(), Some(2), "{}", stderr(&output));
    assert!(stderr(&output).contains("--settle-secs"), "{}", stderr(&output));
    assert!(!dir.path().join("test.yaml").exists());
}

#[test]
fn test_unbounded_sleep_exits_two() {
    let dir = tempfile::tempdir().unwrap();

    let output = run_script(
        dir.path(),
        SOURCE,
        "steps:\n  - action: sleep\n    secs: .inf\n",
        &[],
    );

    assert_eq!(output.status.code(), Some(2), "{}", stderr(&output));
    assert!(stderr(&output).contains("step 1"), "{}", stderr(&output));
}
