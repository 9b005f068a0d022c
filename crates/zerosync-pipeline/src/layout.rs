//! Workspace layout: where the external tools live and where artifacts are exchanged.

use std::path::PathBuf;

/// Default location of the latest published Zerosync proof pair
pub const DEFAULT_PROOFS_URL: &str = "https://zerosync.org/demo/proofs/latest";

/// Directories, tools and remote locations used by the pipelines
///
/// Relative directories are resolved against `root`. `root` itself should be
/// absolute, since commands run in different working directories.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    pub root: PathBuf,
    /// cairo-lang checkout holding the simple bootloader
    pub cairo_dir: PathBuf,
    /// Stone prover end-to-end test directory
    pub prover_dir: PathBuf,
    /// Starknet calldata tool and contract call script
    pub starknet_dir: PathBuf,
    /// Manifest of the header-chain proof parser
    pub parser_manifest: PathBuf,
    /// Base URL of the published proof pair
    pub proofs_url: String,
    /// Cairo program runner
    pub cairo_run: String,
    /// Stone prover binary, relative to `prover_dir`
    pub prover: PathBuf,
    /// Cargo, used for the parser and calldata tools
    pub cargo: String,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cairo_dir: PathBuf::from("cairo-lang"),
            prover_dir: PathBuf::from("stone-prover/e2e_test"),
            starknet_dir: PathBuf::from("starknet"),
            parser_manifest: PathBuf::from("header_chain_parser/Cargo.toml"),
            proofs_url: DEFAULT_PROOFS_URL.to_string(),
            cairo_run: "cairo-run".to_string(),
            prover: PathBuf::from("cpu_air_prover"),
            cargo: "cargo".to_string(),
        }
    }

    pub fn root_file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn cairo_dir(&self) -> PathBuf {
        self.root.join(&self.cairo_dir)
    }

    pub fn cairo_file(&self, name: &str) -> PathBuf {
        self.cairo_dir().join(name)
    }

    pub fn prover_dir(&self) -> PathBuf {
        self.root.join(&self.prover_dir)
    }

    pub fn prover_file(&self, name: &str) -> PathBuf {
        self.prover_dir().join(name)
    }

    pub fn prover_bin(&self) -> PathBuf {
        self.prover_dir().join(&self.prover)
    }

    pub fn starknet_dir(&self) -> PathBuf {
        self.root.join(&self.starknet_dir)
    }

    pub fn starknet_file(&self, name: &str) -> PathBuf {
        self.starknet_dir().join(name)
    }

    pub fn parser_manifest(&self) -> PathBuf {
        self.root.join(&self.parser_manifest)
    }

    /// URL of a published artifact
    pub fn proof_url(&self, name: &str) -> String {
        format!("{}/{}", self.proofs_url.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = WorkspaceLayout::new("/work");
        assert_eq!(
            layout.cairo_file("simple_bootloader_input.json"),
            PathBuf::from("/work/cairo-lang/simple_bootloader_input.json")
        );
        assert_eq!(
            layout.prover_bin(),
            PathBuf::from("/work/stone-prover/e2e_test/cpu_air_prover")
        );
        assert_eq!(
            layout.parser_manifest(),
            PathBuf::from("/work/header_chain_parser/Cargo.toml")
        );
        assert_eq!(
            layout.proof_url("aggregated_proof.bin"),
            "https://zerosync.org/demo/proofs/latest/aggregated_proof.bin"
        );
    }

    #[test]
    fn test_absolute_overrides() {
        let mut layout = WorkspaceLayout::new("/work");
        layout.prover = PathBuf::from("/opt/stone/cpu_air_prover");
        layout.cairo_dir = PathBuf::from("/opt/cairo-lang");
        layout.proofs_url = "http://localhost:8000/proofs/".to_string();

        assert_eq!(layout.prover_bin(), PathBuf::from("/opt/stone/cpu_air_prover"));
        assert_eq!(layout.cairo_dir(), PathBuf::from("/opt/cairo-lang"));
        assert_eq!(
            layout.proof_url("air-public-input.json"),
            "http://localhost:8000/proofs/air-public-input.json"
        );
    }
}
