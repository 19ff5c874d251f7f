use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn triage_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_triage"))
}

struct Case {
    temp: TempDir,
}

impl Case {
    fn new() -> Self {
        let case = Self {
            temp: TempDir::new().expect("Failed to create temp dir"),
        };
        fs::create_dir_all(case.case_dir()).unwrap();
        fs::create_dir_all(case.rules_dir()).unwrap();
        case
    }

    fn case_dir(&self) -> PathBuf {
        self.temp.path().join("case")
    }

    fn rules_dir(&self) -> PathBuf {
        self.temp.path().join("rules")
    }

    fn home(&self) -> PathBuf {
        self.temp.path().join("home")
    }

    fn write(&self, dir: &Path, name: &str, content: impl AsRef<[u8]>) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(triage_bin())
            .args(args)
            .env("TRIAGE_HOME", self.home())
            .env_remove("SYSDIAGNOSE_YARA_RULES_PATH")
            .env_remove("RUST_LOG")
            .output()
            .expect("failed to execute triage CLI")
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

const MZ_RULE: &str = r#"
rule mz_at_start {
    strings:
        $mz = "MZ"
    condition:
        $mz at 0
}
"#;

#[test]
fn test_yarascan_writes_result_file_in_case_dir() {
    let case = Case::new();
    case.write(&case.rules_dir(), "pe.yar", MZ_RULE);
    case.write(&case.case_dir(), "a.bin", b"MZ\x90\x00");
    case.write(&case.case_dir(), "b.txt", b"plain text");

    let case_dir = path_arg(&case.case_dir());
    let rules = path_arg(&case.rules_dir());
    let output = case.run(&["yarascan", &case_dir, "--rules", &rules, "--workers", "2"]);

    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mz_at_start"), "stdout:\n{}", stdout);

    let written = fs::read_to_string(case.case_dir().join("yarascan.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(json["errors"], serde_json::json!([]));
    assert_eq!(json["matches"]["a.bin"]["mz_at_start"]["rule_file"], "pe.yar");
    assert!(json["matches"].get("b.txt").is_none());
}

#[test]
fn test_rescan_does_not_scan_previous_result() {
    let case = Case::new();
    case.write(&case.rules_dir(), "pe.yar", MZ_RULE);
    case.write(&case.case_dir(), "a.bin", b"MZ");

    let case_dir = path_arg(&case.case_dir());
    let rules = path_arg(&case.rules_dir());
    let first = case.run(&["yarascan", &case_dir, "--rules", &rules, "--json"]);
    let second = case.run(&["yarascan", &case_dir, "--rules", &rules, "--json"]);

    assert!(first.status.success());
    assert!(second.status.success());
    let first: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    let second: serde_json::Value = serde_json::from_slice(&second.stdout).unwrap();
    assert_eq!(first, second);
    assert_eq!(second["matches"].as_object().unwrap().len(), 1);
}

#[test]
fn test_rules_from_environment_variable() {
    let case = Case::new();
    case.write(&case.rules_dir(), "pe.yar", MZ_RULE);
    case.write(&case.case_dir(), "a.bin", b"MZ");

    let output = Command::new(triage_bin())
        .args(["yarascan", &path_arg(&case.case_dir()), "--json"])
        .env("TRIAGE_HOME", case.home())
        .env("SYSDIAGNOSE_YARA_RULES_PATH", case.rules_dir())
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["matches"]["a.bin"]["mz_at_start"].is_object());
}

#[test]
fn test_custom_output_path_and_ignore() {
    let case = Case::new();
    case.write(&case.rules_dir(), "pe.yar", MZ_RULE);
    case.write(&case.case_dir(), "a.bin", b"MZ");
    case.write(&case.case_dir(), "skip.me", b"MZ");

    let result_path = case.temp.path().join("reports/run1.json");
    let output = case.run(&[
        "yarascan",
        &path_arg(&case.case_dir()),
        "--rules",
        &path_arg(&case.rules_dir()),
        "--output",
        &path_arg(&result_path),
        "--ignore",
        "skip.me",
    ]);

    assert!(output.status.success());
    assert!(!case.case_dir().join("yarascan.json").exists());
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&result_path).unwrap()).unwrap();
    let files: Vec<_> = json["matches"].as_object().unwrap().keys().cloned().collect();
    assert_eq!(files, ["a.bin"]);
}

#[test]
fn test_compile_errors_do_not_fail_command() {
    let case = Case::new();
    case.write(&case.rules_dir(), "pe.yar", MZ_RULE);
    case.write(&case.rules_dir(), "broken.yar", b"rule broken {");
    case.write(&case.case_dir(), "a.bin", b"MZ");

    let output = case.run(&[
        "yarascan",
        &path_arg(&case.case_dir()),
        "--rules",
        &path_arg(&case.rules_dir()),
        "--json",
    ]);

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let errors = json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().contains("broken.yar"));
}

#[test]
fn test_missing_rules_directory_fails_with_help() {
    let case = Case::new();
    let missing = case.temp.path().join("no-rules");

    let output = case.run(&[
        "yarascan",
        &path_arg(&case.case_dir()),
        "--rules",
        &path_arg(&missing),
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("YARA rules directory not found"), "stderr:\n{}", stderr);
    assert!(stderr.contains("TRY:"));
}

#[test]
fn test_missing_case_folder_json_error() {
    let case = Case::new();
    let missing = case.temp.path().join("no-case");

    let output = case.run(&[
        "yarascan",
        &path_arg(&missing),
        "--rules",
        &path_arg(&case.rules_dir()),
        "--json",
    ]);

    assert!(!output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["error"].as_str().unwrap().starts_with("Case folder not found"));
}
