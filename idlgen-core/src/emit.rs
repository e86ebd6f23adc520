//! Artifact emission.
//!
//! Writing is the only side-effecting step of a compilation and runs
//! last: every requested generator must succeed before a single file
//! is created, so a failing target can never leave a partially
//! regenerated binding set on disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::compiler::{self, ArtifactSet, Options};
use crate::error::Error;
use crate::ir::Ir;

/// Generate all requested targets and write the artifacts below the
/// output directory. Returns the paths written, in deterministic
/// order.
pub fn emit(ir: &Ir, options: &Options) -> Result<Vec<PathBuf>, Error> {
    let artifacts = compiler::generate(ir, options)?;
    write_artifacts(&options.output_dir, &artifacts)
}

/// Write an already-generated artifact set verbatim below `root`,
/// creating intermediate directories as needed.
pub fn write_artifacts(root: &Path, artifacts: &ArtifactSet) -> Result<Vec<PathBuf>, Error> {
    let mut written = Vec::with_capacity(artifacts.len());
    for (rel, text) in artifacts {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Emission {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, text).map_err(|source| Error::Emission {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), bytes = text.len(), "wrote artifact");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    #[test]
    fn writes_every_target_artifact() {
        let ir = compile(
            "namespace calc;\n\
             interface Calculator { int add(int a, int b); }\n",
        )
        .expect("compile");
        let dir = tempfile::tempdir().expect("tempdir");
        let options = Options::new(dir.path());

        let written = emit(&ir, &options).expect("emit");
        assert!(!written.is_empty());
        assert!(dir.path().join("calc_c_api.h").is_file());
        assert!(dir.path().join("calc_client.cpp").is_file());
        assert!(dir.path().join("calc_wasm_bindings.cpp").is_file());
        assert!(dir.path().join("java/calc/Calculator.java").is_file());

        let header = fs::read_to_string(dir.path().join("calc_c_api.h")).expect("read");
        assert!(header.contains("Calculator_create"));
    }

    #[test]
    fn failing_generator_prevents_all_writes() {
        // Bridgeable in the C targets but not in WASM or JNI, so the
        // compilation as a whole must not touch the file system.
        let ir = compile(
            "namespace app;\n\
             callback OnData(bytes chunk, int len);\n\
             interface Feed { void subscribe(OnData sink); }\n",
        )
        .expect("compile");
        let dir = tempfile::tempdir().expect("tempdir");
        let options = Options::new(dir.path().join("out"));

        let err = emit(&ir, &options).unwrap_err();
        assert!(matches!(err, Error::Generation { .. }));
        assert!(!options.output_dir.exists());
    }

    #[test]
    fn unwritable_output_reports_emission_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocking_file = dir.path().join("occupied");
        fs::write(&blocking_file, "x").expect("write");

        let ir = compile(
            "namespace calc;\n\
             interface Calculator { int add(int a, int b); }\n",
        )
        .expect("compile");
        // The output root is an existing regular file.
        let options = Options::new(&blocking_file);
        let err = emit(&ir, &options).unwrap_err();
        assert!(matches!(err, Error::Emission { .. }));
    }
}
