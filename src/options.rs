use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};

/// How strict the compiler is about width/sign/narrowing issues.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Allow unsafe operations without complaint.
    Lax,
    #[default]
    Normal,
    /// Promote width/sign/narrowing warnings to hard errors.
    Strict,
}

impl Mode {
    pub fn is_strict(&self) -> bool {
        matches!(self, Mode::Strict)
    }

    pub fn allows_unsafe(&self) -> bool {
        matches!(self, Mode::Lax)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Lax => "lax",
            Mode::Normal => "normal",
            Mode::Strict => "strict",
        })
    }
}

#[derive(Clone, Debug, Parser)]
#[command(version, about = "Compiler for the SIN programming language (x86-64 target)")]
pub struct Options {
    /// The .sin file to compile
    pub filename: PathBuf,
    /// Output assembly file; defaults to the input with a .s extension
    #[arg(long, short = 'o', required = false)]
    pub outfile: Option<PathBuf>,
    /// Determines how strict the compiler is
    #[arg(long, short = 'm', value_enum, default_value_t = Mode::Normal)]
    pub mode: Mode,
    /// Compile in uSIN mode
    #[arg(long)]
    pub micro: bool,
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        if self.filename.as_os_str().is_empty() {
            return Err(anyhow!("No input file specified"));
        }
        Ok(())
    }

    /// The output path: `-o` if given, else the input with the extension
    /// replaced by `.s`.
    pub fn output_path(&self) -> PathBuf {
        match &self.outfile {
            Some(path) => path.clone(),
            None => self.filename.with_extension("s"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_replaces_extension() {
        let options = Options {
            filename: PathBuf::from("demos/hello.sin"),
            outfile: None,
            mode: Mode::Normal,
            micro: false,
        };
        assert_eq!(options.output_path(), PathBuf::from("demos/hello.s"));
    }

    #[test]
    fn explicit_outfile_wins() {
        let options = Options {
            filename: PathBuf::from("hello.sin"),
            outfile: Some(PathBuf::from("out/asm.s")),
            mode: Mode::Strict,
            micro: false,
        };
        assert_eq!(options.output_path(), PathBuf::from("out/asm.s"));
    }
}
