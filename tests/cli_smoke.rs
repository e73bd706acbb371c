use std::path::PathBuf;

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_lottie-thumb")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "lottie-thumb.exe"
            } else {
                "lottie-thumb"
            });
            p
        })
}

#[test]
fn cli_thumb_writes_png_and_metadata() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();

    let src = dir.join("square.json");
    let out = dir.join("square.png");
    let meta = dir.join("square.meta.json");
    let _ = std::fs::remove_file(&out);
    let _ = std::fs::remove_file(&meta);

    let doc = serde_json::json!({
        "v": "5.6.5", "fr": 24, "ip": 0, "op": 48, "w": 300, "h": 200, "nm": "square",
        "layers": [{"ty": 1, "sw": 300, "sh": 200, "sc": "#ff8800"}]
    });
    std::fs::write(&src, doc.to_string()).unwrap();

    let status = std::process::Command::new(exe())
        .args(["thumb", "--in"])
        .arg(&src)
        .arg("--out")
        .arg(&out)
        .arg("--metadata")
        .arg(&meta)
        .env("LOTTIE_THUMB_DISABLE_BROWSER", "1")
        .env("LOTTIE_THUMB_SETTLE_MS", "0")
        .status()
        .unwrap();
    assert!(status.success());

    let img = image::open(&out).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (300, 200));

    let m: serde_json::Value = serde_json::from_slice(&std::fs::read(&meta).unwrap()).unwrap();
    assert_eq!(m["thumbnailType"], "emulated_dom_canvas");
    assert_eq!(m["duration"], "2s");
    assert_eq!(m["frameRateLabel"], "24fps");
    assert_eq!(m["totalFrames"], 48.0);
    assert_eq!(m["name"], "square");
}

#[test]
fn cli_thumb_fails_on_non_lottie_input() {
    let dir = PathBuf::from("target").join("cli_smoke_bad");
    std::fs::create_dir_all(&dir).unwrap();
    let src = dir.join("nope.json");
    let out = dir.join("nope.png");
    let _ = std::fs::remove_file(&out);
    std::fs::write(&src, "[1, 2, 3]").unwrap();

    let status = std::process::Command::new(exe())
        .args(["thumb", "--in"])
        .arg(&src)
        .arg("--out")
        .arg(&out)
        .env("LOTTIE_THUMB_DISABLE_BROWSER", "1")
        .status()
        .unwrap();
    assert!(!status.success());
    assert!(!out.exists());
}

#[test]
fn cli_probe_reports_the_cascade() {
    let output = std::process::Command::new(exe())
        .arg("probe")
        .env("LOTTIE_THUMB_DISABLE_BROWSER", "1")
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["browser"], serde_json::Value::Null);
    assert_eq!(
        report["cascade"],
        serde_json::json!(["emulated_dom_canvas", "static_composite", "placeholder"])
    );
}
