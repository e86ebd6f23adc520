use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result};
use clap::Parser;
use idlgen_core::{Options, Target, compile, emit};

#[derive(Parser, Debug)]
#[command(version, about = "Generate cross-language bindings from an IDL file", long_about = None)]
struct Cli {
    /// IDL source file; reads stdin when omitted.
    #[arg(short, long)]
    input: Option<String>,

    /// Directory the generated artifacts are written into.
    #[arg(short, long, value_name = "DIR")]
    output_dir: String,

    /// Override the namespace declared in the source file.
    #[arg(long)]
    namespace: Option<String>,

    /// Header declaring the native implementation types (defaults to
    /// <namespace>.hpp).
    #[arg(long, value_name = "HEADER")]
    impl_header: Option<String>,

    /// Targets to emit: c-abi, client, wasm, jni.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "c-abi,client,wasm,jni",
        value_name = "TARGETS"
    )]
    targets: Vec<String>,

    /// Java package for the JNI target (defaults to the namespace with
    /// underscores replaced by dots).
    #[arg(long, value_name = "PACKAGE")]
    java_package: Option<String>,

    /// Directory for Java sources, relative to the output directory.
    #[arg(long, value_name = "DIR")]
    java_output_dir: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {path}"))?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut targets = Vec::with_capacity(cli.targets.len());
    for name in &cli.targets {
        let target = Target::from_name(name)
            .ok_or_else(|| anyhow::anyhow!("unknown target: {name}"))?;
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    let mut options = Options::new(&cli.output_dir);
    options.namespace = cli.namespace;
    options.impl_header = cli.impl_header;
    options.targets = targets;
    options.java_package = cli.java_package;
    options.java_output_dir = cli.java_output_dir;

    let ir = compile(&source).context("compilation failed")?;
    let written = emit(&ir, &options).context("generation failed")?;
    for path in &written {
        println!("{}", path.display());
    }
    Ok(())
}
