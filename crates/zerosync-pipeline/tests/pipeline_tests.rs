use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zerosync_pipeline::download::Downloader;
use zerosync_pipeline::{
    stages, FailurePolicy, RunnerConfig, Sequencer, StepError, StepStatus, WorkspaceLayout,
};

/// Stand-in for cairo-run: creates every artifact file it is asked to write
const FAKE_CAIRO_RUN: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --program_input=*) test -s "${arg#*=}" || exit 2 ;;
    --air_public_input=*|--air_private_input=*|--trace_file=*|--memory_file=*) echo '{}' > "${arg#*=}" ;;
  esac
done
echo "Program output:"
echo "  1"
"#;

/// Stand-in for cpu_air_prover: writes a proof to --out_file
const FAKE_PROVER: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --out_file=*) echo '{"proof_hex": "0xbeef"}' > "${arg#*=}" ;;
  esac
done
"#;

/// Stand-in for cargo: the parser writes its output file, the calldata tool echoes stdin
const FAKE_CARGO: &str = r#"#!/bin/sh
if [ "$1" = "+nightly" ]; then
  eval "out=\${$(($# - 1))}"
  echo '{"public_input": {"n_steps": 1}}' > "$out"
else
  cat
fi
"#;

const FAKE_CALL_CONTRACT: &str = r#"#!/bin/sh
test -s calldata
"#;

fn write_script(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, value.to_string()).unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// Workspace with fake external tools and the fixed input files
fn fake_workspace(root: &Path) -> WorkspaceLayout {
    let tools = root.join("tools");
    let mut layout = WorkspaceLayout::new(root);
    layout.cairo_run = tools.join("cairo-run").to_string_lossy().into_owned();
    layout.cargo = tools.join("cargo").to_string_lossy().into_owned();

    write_script(&tools.join("cairo-run"), FAKE_CAIRO_RUN);
    write_script(&tools.join("cargo"), FAKE_CARGO);
    write_script(&layout.prover_bin(), FAKE_PROVER);
    write_script(
        &layout.starknet_file(stages::CALL_CONTRACT_SCRIPT),
        FAKE_CALL_CONTRACT,
    );

    write_json(
        &layout.root_file(stages::INCREMENT_PROGRAM),
        &json!({ "data": ["0x40780017fff7fff", "0x1", "0x208b7fff7fff7ffe"] }),
    );
    write_json(
        &layout.cairo_file(stages::BOOTLOADER_PROGRAM),
        &json!({ "data": ["0x1"] }),
    );
    write_json(&layout.prover_file(stages::PROVER_CONFIG), &json!({}));
    write_json(&layout.prover_file(stages::PROVER_PARAMS), &json!({}));
    write_script(&layout.parser_manifest(), "[package]\nname = \"header_chain_parser\"\n");
    layout
}

fn sequencer(failure_policy: FailurePolicy) -> Sequencer {
    let config = RunnerConfig {
        failure_policy,
        ..RunnerConfig::default()
    };
    Sequencer::new(config, Downloader::with_defaults().unwrap())
}

fn succeeded(status: &StepStatus) -> bool {
    matches!(status, StepStatus::Succeeded { .. })
}

#[tokio::test]
async fn increment_pipeline_chains_previous_proof() {
    let dir = tempfile::tempdir().unwrap();
    let layout = fake_workspace(dir.path());
    let prev_proof = json!({ "proof_parameters": { "stark": { "log_n_cosets": 4 } } });
    write_json(&layout.root_file(stages::INCREMENT_PROOF), &prev_proof);

    let report = sequencer(FailurePolicy::Halt)
        .run(&stages::increment_pipeline(&layout))
        .await;
    assert!(report.is_success(), "{:?}", report);

    let input = read_json(&layout.root_file(stages::INCREMENT_INPUT));
    assert_eq!(input["prev_proof"], prev_proof);
    assert_eq!(input["batch_size"], json!(8));
    assert!(input["increment_program_hash"].is_number());

    let artifacts = stages::increment_artifacts(&layout);
    assert!(artifacts.public_input.exists());
    assert!(artifacts.memory.exists());
}

#[tokio::test]
async fn increment_pipeline_without_previous_proof() {
    let dir = tempfile::tempdir().unwrap();
    let layout = fake_workspace(dir.path());

    let report = sequencer(FailurePolicy::Halt)
        .run(&stages::increment_pipeline(&layout))
        .await;

    assert!(!report.is_success());
    assert!(matches!(
        report.outcomes[0].status,
        StepStatus::Failed(StepError::MissingInput(_))
    ));
    assert!(matches!(report.outcomes[1].status, StepStatus::Skipped));
    assert!(!layout.root_file(stages::INCREMENT_INPUT).exists());
}

#[tokio::test]
async fn bootloader_pipeline_produces_proof() {
    let dir = tempfile::tempdir().unwrap();
    let layout = fake_workspace(dir.path());
    write_json(&layout.root_file(stages::INCREMENT_PROOF), &json!({ "foo": "bar" }));

    let report = sequencer(FailurePolicy::Halt)
        .run(&stages::bootloader_pipeline(&layout))
        .await;
    assert!(report.is_success(), "{:?}", report);

    let bootloader_input = read_json(&layout.cairo_file(stages::BOOTLOADER_INPUT));
    let task = &bootloader_input["tasks"][0];
    assert_eq!(task["type"], json!("RunProgramTask"));
    assert_eq!(task["program"], read_json(&layout.root_file(stages::INCREMENT_PROGRAM)));
    assert_eq!(task["program_input"]["prev_proof"], json!({ "foo": "bar" }));
    assert_eq!(bootloader_input["single_page"], json!(true));

    assert!(layout.prover_file(stages::BOOTLOADER_PROOF).exists());
}

#[tokio::test]
async fn zerosync_pipeline_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/proofs/latest/air-public-input.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"layout": "recursive"}"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/proofs/latest/aggregated_proof.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 1, 2, 3]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut layout = fake_workspace(dir.path());
    layout.proofs_url = format!("{}/proofs/latest", server.uri());

    let report = sequencer(FailurePolicy::Halt)
        .run(&stages::zerosync_pipeline(&layout))
        .await;
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.outcomes.len(), 8);

    assert_eq!(
        fs::read(layout.root_file(stages::AGGREGATED_PROOF)).unwrap(),
        vec![0u8, 1, 2, 3]
    );
    let input = read_json(&layout.root_file(stages::INCREMENT_INPUT));
    assert_eq!(input["prev_proof"], json!({ "public_input": { "n_steps": 1 } }));

    let calldata: PathBuf = layout.starknet_file(stages::CALLDATA);
    assert_eq!(
        read_json(&calldata),
        read_json(&layout.prover_file(stages::BOOTLOADER_PROOF))
    );
}

#[tokio::test]
async fn zerosync_pipeline_halts_after_failed_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut layout = fake_workspace(dir.path());
    layout.proofs_url = format!("{}/proofs/latest", server.uri());

    let report = sequencer(FailurePolicy::Halt)
        .run(&stages::zerosync_pipeline(&layout))
        .await;

    assert!(matches!(
        report.outcomes[0].status,
        StepStatus::Failed(StepError::Download { .. })
    ));
    assert!(report.outcomes[1..]
        .iter()
        .all(|o| matches!(o.status, StepStatus::Skipped)));
}

#[tokio::test]
async fn keep_going_runs_independent_stages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut layout = fake_workspace(dir.path());
    layout.proofs_url = format!("{}/proofs/latest", server.uri());
    // A proof from an earlier run lets the bootloader stages proceed
    write_json(&layout.root_file(stages::INCREMENT_PROOF), &json!({ "foo": "bar" }));

    let report = sequencer(FailurePolicy::KeepGoing)
        .run(&stages::zerosync_pipeline(&layout))
        .await;

    let ok: Vec<bool> = report.outcomes.iter().map(|o| succeeded(&o.status)).collect();
    // Downloads and parsing fail, the bootloader stages and submission still run
    assert_eq!(ok, [false, false, false, true, true, true, true, true]);
}
