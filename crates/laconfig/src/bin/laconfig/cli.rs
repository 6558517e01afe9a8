//! laconfig cli interface

use clap::{Parser, Subcommand, ValueEnum};
use laconfig::format::Format;
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; laconfig ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Cascade the inputs and write the resulting tree
    ///
    /// Reads from stdin unless any other source is provided (via --input-*)
    Render(RenderCommand),

    /// Print the evaluated value of a node
    ///
    /// Reads from stdin unless any other source is provided (via --input-*)
    #[command(alias = "eval")]
    Evaluate(EvaluateCommand),

    /// Evaluate $(~NAME) markers in a text against the environment
    Vars(VarsCommand),
}

#[derive(Parser, Debug)]
pub struct RenderCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Run the cascaded tree as a script (_if, _loop, _set, ...)
    #[clap(short = 's', long = "script")]
    pub script: bool,
}

#[derive(Parser, Debug)]
pub struct EvaluateCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    /// Path of the node, e.g. /db[name=main]/$host
    pub path: String,
}

#[derive(Parser, Debug)]
pub struct VarsCommand {
    /// Text with $(~NAME) markers
    pub text: String,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Load files from work directory
    #[clap(short = 'w', long = "input-workdir")]
    pub workdir: bool,

    /// Load a file
    #[clap(short = 'f', long = "input-file")]
    pub files: Vec<PathBuf>,

    /// Load files from given directory
    #[clap(short = 'd', long = "input-dir")]
    pub directories: Vec<PathBuf>,

    /// Format of stdin
    #[clap(long = "input-format", default_value = "laconic")]
    pub format: Format,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,

    /// Write everything on one line (laconic, xml, json)
    #[clap(long = "compact")]
    pub compact: bool,

    /// Write only the content of the root section
    #[clap(long = "omit-root")]
    pub omit_root: bool,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Laconic,
    Xml,
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Laconic => f.write_str("laconic"),
            OutputFormat::Xml => f.write_str("xml"),
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
