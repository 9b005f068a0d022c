//! Steps and pipelines of the Zerosync → Starknet demo.
//!
//! Flags and file names are those expected by the external tools and are kept
//! as the tools define them.

use std::path::{Path, PathBuf};

use zerosync_program_input::{BootloaderInputFiles, IncrementInputFiles};

use crate::command::ExternalCommand;
use crate::layout::WorkspaceLayout;
use crate::step::{Action, Pipeline, Step};

/// Published proof pair
pub const AIR_PUBLIC_INPUT: &str = "air-public-input.json";
pub const AGGREGATED_PROOF: &str = "aggregated_proof.bin";

pub const INCREMENT_PROGRAM: &str = "increment_batch.json";
pub const INCREMENT_PROOF: &str = "increment_batch_proof.json";
pub const INCREMENT_INPUT: &str = "increment_batch_input.json";

pub const BOOTLOADER_PROGRAM: &str = "simple_bootloader.json";
pub const BOOTLOADER_INPUT: &str = "simple_bootloader_input.json";
pub const BOOTLOADER_PROOF: &str = "bootloader_proof.json";

pub const PROVER_CONFIG: &str = "cpu_air_prover_config.json";
pub const PROVER_PARAMS: &str = "cpu_air_params.json";

pub const CALLDATA: &str = "calldata";
pub const CALL_CONTRACT_SCRIPT: &str = "call_contract.sh";

/// Files written by `cairo-run` in proof mode for a program named `prefix`
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub public_input: PathBuf,
    pub private_input: PathBuf,
    pub trace: PathBuf,
    pub memory: PathBuf,
}

impl RunArtifacts {
    pub fn new(dir: PathBuf, prefix: &str) -> Self {
        Self {
            public_input: dir.join(format!("{prefix}_public_input.json")),
            private_input: dir.join(format!("{prefix}_private_input.json")),
            trace: dir.join(format!("{prefix}_trace.bin")),
            memory: dir.join(format!("{prefix}_memory.bin")),
        }
    }

    fn all(&self) -> [&PathBuf; 4] {
        [
            &self.public_input,
            &self.private_input,
            &self.trace,
            &self.memory,
        ]
    }
}

pub fn increment_input_files(layout: &WorkspaceLayout) -> IncrementInputFiles {
    IncrementInputFiles::in_dir(&layout.root)
}

pub fn bootloader_input_files(layout: &WorkspaceLayout) -> BootloaderInputFiles {
    BootloaderInputFiles {
        program: layout.root_file(INCREMENT_PROGRAM),
        program_input: layout.root_file(INCREMENT_INPUT),
        output: layout.cairo_file(BOOTLOADER_INPUT),
    }
}

pub fn increment_artifacts(layout: &WorkspaceLayout) -> RunArtifacts {
    RunArtifacts::new(layout.root.clone(), "increment_batch")
}

pub fn bootloader_artifacts(layout: &WorkspaceLayout) -> RunArtifacts {
    RunArtifacts::new(layout.cairo_dir(), "simple_bootloader")
}

/// Build the increment program input from the previous increment proof
pub fn prepare_increment_step(layout: &WorkspaceLayout) -> Step {
    let files = increment_input_files(layout);
    Step::new("Prepare increment_batch input")
        .input(&files.prev_proof)
        .input(&files.program)
        .output(&files.output)
        .action(Action::PrepareIncrementInput(files))
}

/// Wrap the increment program and its input into a simple bootloader task
pub fn prepare_bootloader_step(layout: &WorkspaceLayout) -> Step {
    let files = bootloader_input_files(layout);
    Step::new("Prepare bootloader_increment_batch input")
        .input(&files.program)
        .input(&files.program_input)
        .output(&files.output)
        .action(Action::PrepareBootloaderInput(files))
}

/// `cairo-run` in proof mode with the recursive layout
fn cairo_run(
    layout: &WorkspaceLayout,
    cwd: PathBuf,
    program: &Path,
    program_input: &Path,
    artifacts: &RunArtifacts,
) -> ExternalCommand {
    ExternalCommand::new(&layout.cairo_run, cwd)
        .path_flag("program", program)
        .arg("--layout=recursive")
        .path_flag("program_input", program_input)
        .path_flag("air_public_input", &artifacts.public_input)
        .path_flag("air_private_input", &artifacts.private_input)
        .path_flag("trace_file", &artifacts.trace)
        .path_flag("memory_file", &artifacts.memory)
        .arg("--print_output")
        .arg("--proof_mode")
        .arg("--print_info")
}

/// Execute the increment program on its own
pub fn run_increment_step(layout: &WorkspaceLayout) -> Step {
    let program = layout.root_file(INCREMENT_PROGRAM);
    let program_input = layout.root_file(INCREMENT_INPUT);
    let artifacts = increment_artifacts(layout);

    let command = cairo_run(
        layout,
        layout.root.clone(),
        &program,
        &program_input,
        &artifacts,
    );
    let mut step = Step::new("Run increment_batch")
        .input(&program)
        .input(&program_input)
        .run(command);
    for artifact in artifacts.all() {
        step = step.output(artifact);
    }
    step
}

/// Execute the increment program inside the simple bootloader
pub fn run_bootloader_step(layout: &WorkspaceLayout) -> Step {
    let program = layout.cairo_file(BOOTLOADER_PROGRAM);
    let program_input = layout.cairo_file(BOOTLOADER_INPUT);
    let artifacts = bootloader_artifacts(layout);

    let command = cairo_run(
        layout,
        layout.cairo_dir(),
        &program,
        &program_input,
        &artifacts,
    );
    let mut step = Step::new("Run bootloader-bridge step")
        .input(&program)
        .input(&program_input)
        .run(command);
    for artifact in artifacts.all() {
        step = step.output(artifact);
    }
    step
}

/// Prove the bootloader execution with the Stone prover
pub fn prove_bootloader_step(layout: &WorkspaceLayout) -> Step {
    let artifacts = bootloader_artifacts(layout);
    let proof = layout.prover_file(BOOTLOADER_PROOF);
    let config = layout.prover_file(PROVER_CONFIG);
    let params = layout.prover_file(PROVER_PARAMS);

    let command = ExternalCommand::new(layout.prover_bin().to_string_lossy(), layout.prover_dir())
        .path_flag("out_file", &proof)
        .path_flag("public_input_file", &artifacts.public_input)
        .path_flag("private_input_file", &artifacts.private_input)
        .path_flag("prover_config_file", &config)
        .path_flag("parameter_file", &params)
        .arg("-generate_annotations");

    Step::new("Prove bootloader program in recursive layout")
        .input(&artifacts.public_input)
        .input(&artifacts.private_input)
        .input(&config)
        .input(&params)
        .output(&proof)
        .run(command)
}

/// Fetch one file of the published proof pair
pub fn download_step(layout: &WorkspaceLayout, name: &str) -> Step {
    let output = layout.root_file(name);
    Step::new(format!("Download Zerosync proof pair: {name}"))
        .output(&output)
        .action(Action::Download {
            url: layout.proof_url(name),
            output,
        })
}

/// Both files of the published proof pair
pub fn download_steps(layout: &WorkspaceLayout) -> Vec<Step> {
    vec![
        download_step(layout, AIR_PUBLIC_INPUT),
        download_step(layout, AGGREGATED_PROOF),
    ]
}

/// Re-encode the binary aggregated proof as the increment program's proof input
pub fn parse_proof_step(layout: &WorkspaceLayout) -> Step {
    let manifest = layout.parser_manifest();
    let proof_bin = layout.root_file(AGGREGATED_PROOF);
    let public_input = layout.root_file(AIR_PUBLIC_INPUT);
    let program = layout.root_file(INCREMENT_PROGRAM);
    let output = layout.root_file(INCREMENT_PROOF);

    let command = ExternalCommand::new(&layout.cargo, layout.root.clone())
        .arg("+nightly")
        .arg("run")
        .arg("--release")
        .arg("--manifest-path")
        .path_arg(&manifest)
        .path_arg(&proof_bin)
        .path_arg(&public_input)
        .path_arg(&program)
        .path_arg(&output)
        .arg("proof");

    Step::new("Parse Sandstorm binary proof to Cairo compatible format")
        .input(&manifest)
        .input(&proof_bin)
        .input(&public_input)
        .input(&program)
        .output(&output)
        .run(command)
}

/// Generate calldata from the bootloader proof and submit it to the verifier contract
pub fn submit_step(layout: &WorkspaceLayout) -> Step {
    let proof = layout.prover_file(BOOTLOADER_PROOF);
    let calldata = layout.starknet_file(CALLDATA);
    let script = layout.starknet_file(CALL_CONTRACT_SCRIPT);

    let generate = ExternalCommand::new(&layout.cargo, layout.starknet_dir())
        .arg("run")
        .arg("--release")
        .stdin_from(&proof)
        .stdout_to(&calldata);
    let call = ExternalCommand::new(script.to_string_lossy(), layout.starknet_dir());

    Step::new("Verify proof on Starknet")
        .input(&proof)
        .input(&script)
        .output(&calldata)
        .run(generate)
        .run(call)
}

/// Prepare the increment input and execute the increment program
pub fn increment_pipeline(layout: &WorkspaceLayout) -> Pipeline {
    Pipeline::new("increment")
        .step(prepare_increment_step(layout))
        .step(run_increment_step(layout))
}

/// Run the increment program inside the bootloader and prove the execution
pub fn bootloader_pipeline(layout: &WorkspaceLayout) -> Pipeline {
    Pipeline::new("bootloader").extend(bootloader_steps(layout))
}

fn bootloader_steps(layout: &WorkspaceLayout) -> Vec<Step> {
    vec![
        prepare_increment_step(layout),
        prepare_bootloader_step(layout),
        run_bootloader_step(layout),
        prove_bootloader_step(layout),
    ]
}

/// Published proof pair only
pub fn fetch_pipeline(layout: &WorkspaceLayout) -> Pipeline {
    Pipeline::new("fetch").extend(download_steps(layout))
}

/// Full flow: fetch the latest Zerosync proof, verify it inside the bootloaded
/// increment program, prove that, and verify the result on Starknet
pub fn zerosync_pipeline(layout: &WorkspaceLayout) -> Pipeline {
    Pipeline::new("zerosync-starknet")
        .extend(download_steps(layout))
        .step(parse_proof_step(layout))
        .extend(bootloader_steps(layout))
        .step(submit_step(layout))
}
