//! Compiler orchestration: source text -> IR -> artifact sets.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::Error;
use crate::ir::Ir;
use crate::parser::parse;
use crate::resolve::resolve;
use crate::{codegen_c_api, codegen_client, codegen_jni, codegen_wasm};

/// Relative path -> file text, ordered for deterministic emission.
pub type ArtifactSet = BTreeMap<String, String>;

/// Binding targets a compilation can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    CApi,
    Client,
    Wasm,
    Jni,
}

impl Target {
    pub const ALL: [Target; 4] = [Target::CApi, Target::Client, Target::Wasm, Target::Jni];

    pub fn name(self) -> &'static str {
        match self {
            Target::CApi => "c-abi",
            Target::Client => "client",
            Target::Wasm => "wasm",
            Target::Jni => "jni",
        }
    }

    pub fn from_name(name: &str) -> Option<Target> {
        Some(match name {
            "c-abi" => Target::CApi,
            "client" => Target::Client,
            "wasm" => Target::Wasm,
            "jni" => Target::Jni,
            _ => return None,
        })
    }
}

/// Generation options shared by all targets.
#[derive(Debug, Clone)]
pub struct Options {
    pub output_dir: PathBuf,
    /// Overrides the namespace directive from the source file.
    pub namespace: Option<String>,
    /// Header declaring the native implementation types; defaults to
    /// `<namespace>.hpp`.
    pub impl_header: Option<String>,
    pub targets: Vec<Target>,
    /// Java package; defaults to the namespace with `_` -> `.`.
    pub java_package: Option<String>,
    /// Directory for Java sources, relative to `output_dir`.
    pub java_output_dir: Option<String>,
}

impl Options {
    pub fn new(output_dir: impl Into<PathBuf>) -> Options {
        Options {
            output_dir: output_dir.into(),
            namespace: None,
            impl_header: None,
            targets: Target::ALL.to_vec(),
            java_package: None,
            java_output_dir: None,
        }
    }

    pub(crate) fn resolved_namespace<'a>(&'a self, ir: &'a Ir) -> &'a str {
        self.namespace.as_deref().unwrap_or(&ir.namespace)
    }

    pub(crate) fn resolved_impl_header(&self, namespace: &str) -> String {
        self.impl_header
            .clone()
            .unwrap_or_else(|| format!("{namespace}.hpp"))
    }

    pub(crate) fn resolved_java_package(&self, namespace: &str) -> String {
        self.java_package
            .clone()
            .unwrap_or_else(|| namespace.replace('_', "."))
    }

    pub(crate) fn resolved_java_dir(&self) -> &str {
        self.java_output_dir.as_deref().unwrap_or("java")
    }
}

/// Parse and resolve a source file into the immutable IR.
pub fn compile(source: &str) -> Result<Ir, Error> {
    let ast = parse(source)?;
    resolve(&ast)
}

/// Run every requested generator against one IR.
///
/// All generators run even after one fails, so every target's problems
/// surface in logs; the first error is returned and nothing is written.
pub fn generate(ir: &Ir, options: &Options) -> Result<ArtifactSet, Error> {
    let mut artifacts = ArtifactSet::new();
    let mut first_error = None;

    for target in &options.targets {
        let result = match target {
            Target::CApi => codegen_c_api::generate(ir, options),
            Target::Client => codegen_client::generate(ir, options),
            Target::Wasm => codegen_wasm::generate(ir, options),
            Target::Jni => codegen_jni::generate(ir, options),
        };
        match result {
            Ok(set) => {
                debug!(target = target.name(), files = set.len(), "generated");
                for (path, text) in set {
                    if artifacts.insert(path.clone(), text).is_some() {
                        first_error.get_or_insert(Error::generation(
                            target.name(),
                            path,
                            "artifact path collides with another target's output",
                        ));
                    }
                }
            }
            Err(err) => {
                warn!(target = target.name(), %err, "generation failed");
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(artifacts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
namespace demo;

struct Point { int x; int y; }

interface Calculator {
    int add(int a, int b);
}
";

    #[test]
    fn compiles_and_generates_all_targets() {
        let ir = compile(SOURCE).expect("compile");
        let options = Options::new("out");
        let artifacts = generate(&ir, &options).expect("generate");
        assert!(artifacts.contains_key("demo_c_api.h"));
        assert!(artifacts.contains_key("demo_client.hpp"));
        assert!(artifacts.contains_key("demo_wasm_bindings.cpp"));
        assert!(artifacts.contains_key("java/demo/Calculator.java"));
    }

    #[test]
    fn generation_is_deterministic() {
        let ir = compile(SOURCE).expect("compile");
        let options = Options::new("out");
        let first = generate(&ir, &options).expect("generate");
        let second = generate(&ir, &options).expect("generate");
        assert_eq!(first, second);
    }

    #[test]
    fn namespace_override_renames_artifacts() {
        let ir = compile(SOURCE).expect("compile");
        let mut options = Options::new("out");
        options.namespace = Some("calc".to_string());
        options.targets = vec![Target::CApi];
        let artifacts = generate(&ir, &options).expect("generate");
        assert!(artifacts.contains_key("calc_c_api.h"));
        assert!(artifacts["calc_c_api.h"].contains("CALC_C_API_H"));
    }

    #[test]
    fn failing_target_does_not_hide_other_targets_error() {
        // An interface-typed callback parameter is unbridgeable in
        // every target, so generation fails as a whole.
        let ir = compile(
            "namespace demo;\n\
             interface Engine { void run(); }\n\
             callback OnEngine(Engine* engine);\n",
        )
        .expect("compile");
        let err = generate(&ir, &Options::new("out")).unwrap_err();
        assert!(matches!(err, Error::Generation { .. }));
    }
}
