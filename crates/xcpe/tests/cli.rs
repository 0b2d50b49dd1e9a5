use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const MANIFEST: &str = r#"
id = "aurora-01"
name = "Aurora"
description = "northern lights"
version = "2.1.0"

[tags]
category = "light"

[[passes]]
source = "pass1.hlsl"
parameters = "pass1.params"
images = ["images/image1_1.png", "images/missing.png"]

[[passes]]
source = "pass2.hlsl"
parameters = "pass2.params"
"#;

struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("config")).unwrap();
        fs::create_dir_all(root.path().join("data")).unwrap();
        Self { root }
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    fn project(&self) -> PathBuf {
        let project = self.path().join("project");
        fs::create_dir_all(project.join("images")).unwrap();
        fs::write(project.join("effect.toml"), MANIFEST).unwrap();
        fs::write(project.join("pass1.hlsl"), "float4 first;\n").unwrap();
        fs::write(project.join("pass2.hlsl"), "float4 second;\n").unwrap();
        fs::write(
            project.join("pass1.params"),
            "float exposure = 1.5 [0.1, 5.0] # exposure strength\n\
             bool shadows = true\n\
             enum Material { MAT_LAMBERT, MAT_PBR } material = MAT_PBR\n",
        )
        .unwrap();
        fs::write(
            project.join("pass2.params"),
            "color tint = (1, 0.5, 0.25, 1)\nfloat broken = nope\n",
        )
        .unwrap();
        fs::write(project.join("images/image1_1.png"), b"\x89PNG image bytes").unwrap();
        project
    }

    fn xcpe(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_xcpe"))
            .env("XCPE_CONFIG_DIR", self.path().join("config"))
            .env("XCPE_DATA_DIR", self.path().join("data"))
            .env_remove("XCPE_KEY")
            .env("RUST_LOG", "warn")
            .args(args)
            .output()
            .expect("failed to run xcpe")
    }

    fn pack(&self, extra: &[&str]) -> PathBuf {
        let project = self.project();
        let output = self.path().join("out/aurora.xcpe");
        let mut args = vec![
            "pack",
            project.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ];
        args.extend_from_slice(extra);
        let result = self.xcpe(&args);
        assert!(
            result.status.success(),
            "pack failed: {}",
            String::from_utf8_lossy(&result.stderr)
        );
        output
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn pack_then_params_lists_every_accepted_parameter() {
    let sandbox = Sandbox::new();
    let package = sandbox.pack(&[]);
    assert!(package.exists());

    let output = sandbox.xcpe(&["params", package.to_str().unwrap()]);
    assert!(output.status.success());
    let parameters: Value = serde_json::from_str(&stdout(&output)).unwrap();
    let names: Vec<(i64, &str)> = parameters
        .as_array()
        .unwrap()
        .iter()
        .map(|p| (p["PassId"].as_i64().unwrap(), p["Name"].as_str().unwrap()))
        .collect();
    assert_eq!(
        names,
        vec![(1, "exposure"), (1, "shadows"), (1, "material"), (2, "tint")]
    );
    assert_eq!(parameters[1]["Type"], "int");
    assert_eq!(parameters[1]["DefaultValue"], 1);
    assert_eq!(parameters[2]["Type"], "{MAT_LAMBERT, MAT_PBR}");
    assert_eq!(parameters[3]["Type"], "float4");
}

#[test]
fn pack_reports_placeholder_and_rejected_lines() {
    let sandbox = Sandbox::new();
    let project = sandbox.project();
    let output = sandbox.path().join("aurora.xcpe");
    let result = sandbox.xcpe(&[
        "pack",
        project.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
    ]);
    assert!(result.status.success());
    let text = stdout(&result);
    assert!(text.contains("(placeholder)"), "{text}");
    assert!(text.contains("1 rejected"), "{text}");
    assert!(text.contains("missing.png"), "{text}");
}

#[test]
fn strict_pack_refuses_rejected_lines() {
    let sandbox = Sandbox::new();
    let project = sandbox.project();
    let output = sandbox.path().join("strict.xcpe");
    let result = sandbox.xcpe(&[
        "pack",
        project.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--strict",
    ]);
    assert!(!result.status.success());
    assert!(!output.exists());
}

#[test]
fn pack_defaults_to_effects_directory() {
    let sandbox = Sandbox::new();
    let project = sandbox.project();
    let result = sandbox.xcpe(&["pack", project.to_str().unwrap()]);
    assert!(result.status.success());
    let expected = sandbox.path().join("data/effects/aurora-01.xcpe");
    assert!(expected.exists());

    let listing = sandbox.xcpe(&["list"]);
    assert!(listing.status.success());
    assert!(stdout(&listing).contains("aurora-01"));
}

#[test]
fn inspect_prints_json_summary() {
    let sandbox = Sandbox::new();
    let package = sandbox.pack(&[]);

    let output = sandbox.xcpe(&["inspect", package.to_str().unwrap(), "--json"]);
    assert!(output.status.success());
    let summary: Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(summary["version"], 1);
    assert_eq!(summary["metadata"]["ID"], "aurora-01");
    assert_eq!(summary["metadata"]["Version"], "2.1.0");
    assert_eq!(summary["passes"], 2);
    assert_eq!(summary["images"].as_array().unwrap().len(), 2);
    assert_eq!(summary["sha256"].as_str().unwrap().len(), 64);
    assert_eq!(
        summary["length"].as_u64().unwrap(),
        fs::metadata(&package).unwrap().len()
    );
}

#[test]
fn encrypted_package_needs_key_to_unpack() {
    let sandbox = Sandbox::new();
    let package = sandbox.pack(&["--key", "hunter2"]);
    let target = sandbox.path().join("unpacked");

    let inspect = sandbox.xcpe(&["inspect", package.to_str().unwrap()]);
    assert!(inspect.status.success());
    assert!(stdout(&inspect).contains("(encrypted)"));

    let wrong = sandbox.xcpe(&[
        "unpack",
        package.to_str().unwrap(),
        "-o",
        target.to_str().unwrap(),
        "--key",
        "wrong",
    ]);
    assert!(!wrong.status.success());

    let unpack = sandbox.xcpe(&[
        "unpack",
        package.to_str().unwrap(),
        "-o",
        target.to_str().unwrap(),
        "--key",
        "hunter2",
    ]);
    assert!(
        unpack.status.success(),
        "{}",
        String::from_utf8_lossy(&unpack.stderr)
    );
    assert_eq!(
        fs::read_to_string(target.join("pass1.hlsl")).unwrap(),
        "float4 first;\n"
    );
    assert_eq!(
        fs::read_to_string(target.join("pass2.hlsl")).unwrap(),
        "float4 second;\n"
    );
    assert_eq!(
        fs::read(target.join("images/image1_1.png")).unwrap(),
        b"\x89PNG image bytes"
    );
    let metadata: Value =
        serde_json::from_str(&fs::read_to_string(target.join("metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata["EffectName"], "Aurora");
}

#[test]
fn tampered_package_fails_inspection() {
    let sandbox = Sandbox::new();
    let package = sandbox.pack(&[]);
    let mut bytes = fs::read(&package).unwrap();
    let index = bytes.len() - 3;
    bytes[index] ^= 0x55;
    fs::write(&package, bytes).unwrap();

    let output = sandbox.xcpe(&["inspect", package.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("hash mismatch"));
}

#[test]
fn lint_reports_bad_lines_and_fails() {
    let sandbox = Sandbox::new();
    let file = sandbox.path().join("bad.params");
    fs::write(
        &file,
        "float a = 1\nfloat2 b = (1, 2\nvec3 c = 0\n# comment\nint d = 4 [0, 10]\n",
    )
    .unwrap();

    let output = sandbox.xcpe(&["lint", file.to_str().unwrap(), "--json"]);
    assert!(!output.status.success());
    let report: Value = serde_json::from_str(&stdout(&output)).unwrap();
    let parameters = report["parameters"].as_array().unwrap();
    assert_eq!(parameters.len(), 3);
    let diagnostics = report["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["line_number"], 3);
    assert_eq!(diagnostics[0]["severity"], "error");
}

#[test]
fn lint_accepts_clean_file() {
    let sandbox = Sandbox::new();
    let file = sandbox.path().join("good.params");
    fs::write(&file, "float3 lightPos = (10.0, 5.0, 8.0) [-100, 100]\n").unwrap();
    let output = sandbox.xcpe(&["lint", file.to_str().unwrap(), "--pass", "2"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("[pass 2] float3 lightPos"));
}

#[test]
fn message_add_and_update_use_package_contents() {
    let sandbox = Sandbox::new();
    let package = sandbox.pack(&[]);

    let add = sandbox.xcpe(&["message", "add", package.to_str().unwrap(), "--compact"]);
    assert!(add.status.success());
    let message: Value = serde_json::from_str(stdout(&add).trim()).unwrap();
    assert_eq!(message["MessageType"], "AddEffectMessage");
    assert_eq!(message["ID"], "aurora-01");
    assert_eq!(message["HLSLCode"].as_array().unwrap().len(), 2);
    assert_eq!(message["Parameter"][0]["PassID"], 1);
    assert_eq!(message["ImageData"].as_array().unwrap().len(), 1);
    assert!(message["Timestamp"].as_i64().unwrap() > 0);

    let update = sandbox.xcpe(&[
        "message",
        "update",
        package.to_str().unwrap(),
        "exposure",
        "2.5",
    ]);
    assert!(update.status.success());
    let message: Value = serde_json::from_str(&stdout(&update)).unwrap();
    assert_eq!(message["MessageType"], "UpdateEffectParameterMessage");
    assert_eq!(message["Parameter"]["Value"], 2.5);

    let invalid = sandbox.xcpe(&[
        "message",
        "update",
        package.to_str().unwrap(),
        "material",
        "MAT_NONE",
    ]);
    assert!(!invalid.status.success());
}

#[test]
fn message_sort_lists_ids() {
    let sandbox = Sandbox::new();
    let output = sandbox.xcpe(&["message", "sort", "b", "a", "--compact"]);
    assert!(output.status.success());
    let message: Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(message["MessageType"], "SortEffectsMessage");
    assert_eq!(message["IDs"], serde_json::json!(["b", "a"]));
}

#[test]
fn config_persists_settings_used_by_pack() {
    let sandbox = Sandbox::new();
    let out_dir = sandbox.path().join("configured");
    let result = sandbox.xcpe(&[
        "config",
        "--author",
        "configured author",
        "--output-dir",
        out_dir.to_str().unwrap(),
    ]);
    assert!(result.status.success());
    assert!(sandbox.path().join("config/config.toml").exists());

    let project = sandbox.project();
    assert!(sandbox
        .xcpe(&["pack", project.to_str().unwrap()])
        .status
        .success());
    let package = out_dir.join("aurora-01.xcpe");
    let inspect = sandbox.xcpe(&["inspect", package.to_str().unwrap(), "--json"]);
    let summary: Value = serde_json::from_str(&stdout(&inspect)).unwrap();
    assert_eq!(summary["metadata"]["Author"], "configured author");
}

#[test]
fn where_prints_overridden_directories() {
    let sandbox = Sandbox::new();
    let output = sandbox.xcpe(&["where"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains(&sandbox.path().join("config").display().to_string()));
    assert!(text.contains(&sandbox.path().join("data/effects").display().to_string()));
}
