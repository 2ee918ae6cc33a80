use anyhow::Result;
use clap::Parser;
use sinc::frontend::NoFrontEnd;
use sinc::options::Options;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    // diagnostics (warnings, notes) go to stderr; RUST_LOG tunes verbosity
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let options = Options::parse();
    init_logging();

    if let Err(e) = run(&options) {
        eprintln!("Exception occurred: {e}");
        std::process::exit(1);
    }
}

fn run(options: &Options) -> Result<()> {
    options.validate()?;

    // the SIN front end is supplied as a separate component; builds without
    // one can still drive the compiler library through an AstSource
    let mut source = NoFrontEnd;
    sinc::compile_file(options, &mut source)
}
