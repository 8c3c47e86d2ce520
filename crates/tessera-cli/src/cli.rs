use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tessera",
    about = "Tessera: inspect model shapes and normalize data through the store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store settings (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a model shape and print its fields
    Inspect(InspectArgs),
    /// Create an instance from data, then apply updates in order
    Normalize(NormalizeArgs),
    /// Normalize a JSON array into a model list
    List(ListArgs),
}

#[derive(Args)]
pub struct ShapeArgs {
    /// JSON file holding the model shape
    pub shape: PathBuf,
    /// Model name used in messages
    #[arg(long, default_value = "model")]
    pub name: String,
}

#[derive(Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub shape: ShapeArgs,
}

#[derive(Args)]
pub struct NormalizeArgs {
    #[command(flatten)]
    pub shape: ShapeArgs,
    /// JSON file with the initial values
    #[arg(long)]
    pub data: Option<PathBuf>,
    /// JSON files with partial updates, applied in order
    #[arg(long)]
    pub update: Vec<PathBuf>,
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub shape: ShapeArgs,
    /// JSON file holding an array of items
    pub items: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_inspect() {
        let cli = Cli::try_parse_from(["tessera", "inspect", "todo.json", "--name", "Todo"]).unwrap();
        if let Command::Inspect(args) = cli.command {
            assert_eq!(args.shape.shape, PathBuf::from("todo.json"));
            assert_eq!(args.shape.name, "Todo");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_normalize_with_updates() {
        let cli = Cli::try_parse_from([
            "tessera", "normalize", "todo.json", "--data", "a.json", "--update", "b.json",
            "--update", "c.json",
        ])
        .unwrap();
        if let Command::Normalize(args) = cli.command {
            assert_eq!(args.shape.name, "model");
            assert_eq!(args.data, Some(PathBuf::from("a.json")));
            assert_eq!(args.update, vec![PathBuf::from("b.json"), PathBuf::from("c.json")]);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_list() {
        let cli = Cli::try_parse_from(["tessera", "list", "todo.json", "items.json"]).unwrap();
        if let Command::List(args) = cli.command {
            assert_eq!(args.items, PathBuf::from("items.json"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_global_options() {
        let cli = Cli::try_parse_from([
            "tessera", "inspect", "todo.json", "-v", "--format", "json", "--config", "store.toml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.config, Some(PathBuf::from("store.toml")));
    }

    #[test]
    fn normalize_requires_a_shape() {
        assert!(Cli::try_parse_from(["tessera", "normalize"]).is_err());
    }
}
