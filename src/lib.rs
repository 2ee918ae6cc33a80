pub mod ast;
pub mod compiler;
pub mod error;
pub mod frontend;
pub mod options;
pub mod registers;
pub mod symbols;
pub mod types;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::compiler::Compiler;
use crate::frontend::AstSource;
use crate::options::Options;

/// Compiles one translation unit: parse through the supplied front end,
/// generate the assembly, and write it next to the input (or wherever `-o`
/// points).
pub fn compile_file(options: &Options, source: &mut dyn AstSource) -> Result<()> {
    let filename = options.filename.as_path();
    info!(file = %filename.display(), "compiling");

    let ast = source.create_ast(filename)?;

    let mut compiler = Compiler::new(options.mode);
    let asm = compiler.generate_asm(filename, &ast, source)?;

    let outfile = options.output_path();
    write_assembly(&outfile, &asm)?;
    info!(file = %outfile.display(), "done");

    Ok(())
}

fn write_assembly(path: &Path, asm: &str) -> Result<()> {
    fs::write(path, asm)
        .with_context(|| format!("could not write assembly to \"{}\"", path.display()))
}
