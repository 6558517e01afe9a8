mod cli;

use laconfig::documents::ConfigDocuments;
use laconfig::format::{json::Rooted, Style, WriteOptions};
use laconfig::merge::NodeOverrideRules;
use laconfig::script::ScriptRunner;
use laconfig::{ConfigNode, ConfigTree, Section};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("LACONFIG_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!(
                        "Failed to set work directory to {}\n{}",
                        cwd.display(),
                        err,
                    );
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Render(render_cli) => render(render_cli),
        cli::Command::Evaluate(evaluate_cli) => evaluate(evaluate_cli),
        cli::Command::Vars(vars_cli) => vars(vars_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn render(cli: cli::RenderCommand) -> anyhow::Result<()> {
    let tree = load(&cli.input)?;
    let tree = if cli.script {
        ScriptRunner::default().run(tree.root())?
    } else {
        tree
    };

    output(&cli.output, tree.root())
}

pub fn evaluate(cli: cli::EvaluateCommand) -> anyhow::Result<()> {
    let tree = load(&cli.input)?;
    let node = tree.root().navigate(&cli.path)?;
    anyhow::ensure!(node.exists(), "Path {} does not resolve", cli.path);

    println!("{}", node.value()?);
    Ok(())
}

pub fn vars(cli: cli::VarsCommand) -> anyhow::Result<()> {
    let resolver = laconfig::vars::ProcessEnvResolver;
    let text = laconfig::vars::evaluate_env_vars(&cli.text, &resolver)?;
    println!("{text}");
    Ok(())
}

/// Load all inputs and cascade them into one tree
fn load(input: &cli::InputArgs) -> anyhow::Result<ConfigTree> {
    let mut documents = ConfigDocuments::default();

    if !input.workdir && input.files.is_empty() && input.directories.is_empty() {
        let stdin = std::io::read_to_string(std::io::stdin())?;
        documents.add_text("<stdin>", input.format, &stdin)?;
    }

    if input.workdir {
        documents.load_directory(&std::env::current_dir()?)?;
    }

    for file_path in &input.files {
        documents.load_file(file_path)?;
    }

    for dir_path in &input.directories {
        documents.load_directory(dir_path)?;
    }

    anyhow::ensure!(!documents.is_empty(), "No files loaded");

    Ok(documents.cascade(&NodeOverrideRules::default())?)
}

fn output(output: &cli::OutputArgs, section: Section<'_>) -> anyhow::Result<()> {
    let options = WriteOptions {
        style: if output.compact {
            Style::Compact
        } else {
            Style::Pretty
        },
        omit_root: output.omit_root,
    };

    let text = match output.format {
        cli::OutputFormat::Laconic => laconfig::format::Format::Laconic.write(section, &options)?,
        cli::OutputFormat::Xml => laconfig::format::Format::Xml.write(section, &options)?,
        cli::OutputFormat::Json => laconfig::format::Format::Json.write(section, &options)?,
        cli::OutputFormat::Yaml => serde_yaml::to_string(&Rooted::new(section, output.omit_root))?,
    };

    println!("{}", text.trim_end());
    Ok(())
}
