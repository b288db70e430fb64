use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::Result;

use weft::{Image, RunState, Stdio};

/// Weft is a small & convenient virtual machine for LC3 binary images.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide images to load and run
    #[arg(value_name = "IMAGE")]
    paths: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Load one or more binary images and execute from x3000
    Run {
        /// Images to load, in order; later images win on overlap
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Validate images and report their placement without executing
    Check {
        /// Images to check
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,
    },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::Run { images, minimal }) => run(&images, minimal),
        Some(Command::Check { images }) => check(&images),
        None => {
            if args.paths.is_empty() {
                eprintln!("{SHORT_INFO}");
                std::process::exit(2);
            }
            run(&args.paths, false)
        }
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(paths: &[PathBuf], minimal: bool) -> Result<()> {
    let mut state = RunState::new(Stdio);
    for path in paths {
        if !minimal {
            file_message(MsgColor::Green, "Loading", path);
        }
        let image = Image::open(path)?;
        state.load_image(&image);
    }

    if !minimal {
        message(MsgColor::Green, "Running", "from x3000");
    }
    state.run()?;

    if !minimal {
        message(MsgColor::Green, "Completed", "machine halted");
    }
    Ok(())
}

fn check(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        file_message(MsgColor::Green, "Checking", path);
        let image = Image::open(path)?;
        let end = image.origin() as u32 + image.words().len() as u32;
        message(
            MsgColor::Cyan,
            "Mapped",
            &format!(
                "x{:04X}..x{:04X} ({} words)",
                image.origin(),
                end,
                image.words().len()
            ),
        );
    }
    message(MsgColor::Green, "Success", "no errors found!");
    Ok(())
}

const SHORT_INFO: &str = r"
Welcome to weft, a small virtual machine for LC3 binary images.

Usage: weft [IMAGE]...
Please use `-h` or `--help` to access the usage instructions and documentation.
";
