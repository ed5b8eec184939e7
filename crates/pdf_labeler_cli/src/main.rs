//! pdf-labeler CLI - stamps every name of a list onto its own copy of a template PDF

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use pdf_labeler::{EmptyEntryPolicy, FontResource, LabelError, Labeler, NameList, TemplateDocument};

#[derive(Parser, Debug)]
#[command(name = "pdf-labeler")]
#[command(version)]
#[command(
    about = "Label every page of a template PDF with each name from a list",
    long_about = None
)]
struct Cli {
    /// Template PDF
    #[arg(long, value_name = "FILE", default_value = "input.pdf")]
    template: PathBuf,

    /// Name list, one recipient per line
    #[arg(long, value_name = "FILE", default_value = "name_list.txt")]
    names: PathBuf,

    /// TrueType/OpenType font used for the labels
    #[arg(long, value_name = "FILE", default_value = "font/NanumGothicCoding.ttf")]
    font: PathBuf,

    /// Output PDF
    #[arg(short, long, value_name = "FILE", default_value = "output.pdf")]
    output: PathBuf,

    /// Directory relative paths are resolved against (default: current directory)
    #[arg(long, value_name = "DIR", env = "PDF_LABELER_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Stamp recipients on all cores
    #[arg(long)]
    parallel: bool,

    /// Ignore the empty entry after a final newline in the name list
    #[arg(long)]
    drop_trailing_empty: bool,

    /// Write uncompressed streams
    #[arg(long)]
    no_compress: bool,

    /// Write a JSONL timing log
    #[arg(long, value_name = "FILE")]
    perf_log: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{what} is missing or unreadable: {} ({source})", .path.display())]
    Read {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: LabelError,
    },
    #[error(transparent)]
    Label(#[from] LabelError),
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    print_banner();

    if let Err(e) = run(&cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!("{}", "=========================================".dimmed());
    println!("{}", "              PDF Labeler".cyan().bold());
    println!("{}", "=========================================".dimmed());
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn read_input(what: &'static str, path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| CliError::Read {
        what,
        path: path.to_path_buf(),
        source,
    })
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let base = match &cli.base_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(|source| CliError::Read {
            what: "working directory",
            path: PathBuf::from("."),
            source,
        })?,
    };
    let template_path = resolve(&base, &cli.template);
    let names_path = resolve(&base, &cli.names);
    let font_path = resolve(&base, &cli.font);
    let output_path = resolve(&base, &cli.output);

    let template_bytes = read_input("template PDF", &template_path)?;
    let names_text = fs::read_to_string(&names_path).map_err(|source| CliError::Read {
        what: "name list",
        path: names_path.clone(),
        source,
    })?;
    let font_bytes = read_input("font file", &font_path)?;

    let mut builder = Labeler::builder()
        .parallel(cli.parallel)
        .compress(!cli.no_compress);
    if cli.drop_trailing_empty {
        builder = builder.empty_entry_policy(EmptyEntryPolicy::DropTrailing);
    }
    if let Some(path) = &cli.perf_log {
        builder = builder.perf_log(resolve(&base, path));
    }
    let labeler = builder.build()?;

    let template = TemplateDocument::parse(&template_bytes).map_err(|source| CliError::Input {
        path: template_path.clone(),
        source,
    })?;
    let font = FontResource::load(font_bytes).map_err(|source| CliError::Input {
        path: font_path.clone(),
        source,
    })?;
    let names = NameList::parse(&names_text, labeler.empty_entry_policy());

    let pb = ProgressBar::new(names.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Labeling pages |{bar:40.cyan/blue}| {percent}% || {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░"),
    );

    let output = labeler.label(&template, &font, &names, |progress| {
        pb.set_position(progress.completed as u64);
    });
    let output = match output {
        Ok(output) => output,
        Err(err) => {
            pb.abandon();
            return Err(err.into());
        }
    };
    pb.finish();

    println!();
    println!(">> writing labeled file");
    fs::write(&output_path, &output.bytes).map_err(|source| CliError::Write {
        path: output_path.clone(),
        source,
    })?;
    println!(
        "{} {} ({} recipients, {} pages)",
        "Saved to".green(),
        output_path.display(),
        output.summary.recipients,
        output.summary.pages_written
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bundled_file_names() {
        let cli = Cli::try_parse_from(["pdf-labeler"]).expect("parse");
        assert_eq!(cli.template, PathBuf::from("input.pdf"));
        assert_eq!(cli.names, PathBuf::from("name_list.txt"));
        assert_eq!(cli.font, PathBuf::from("font/NanumGothicCoding.ttf"));
        assert_eq!(cli.output, PathBuf::from("output.pdf"));
        assert!(!cli.parallel);
        assert!(!cli.drop_trailing_empty);
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/srv/labels");
        assert_eq!(resolve(base, Path::new("input.pdf")), PathBuf::from("/srv/labels/input.pdf"));
        assert_eq!(resolve(base, Path::new("/tmp/x.pdf")), PathBuf::from("/tmp/x.pdf"));
    }

    #[test]
    fn missing_input_names_the_file() {
        let err = read_input("template PDF", Path::new("/definitely/not/here.pdf"))
            .expect_err("missing");
        let message = err.to_string();
        assert!(message.starts_with("template PDF is missing or unreadable"));
        assert!(message.contains("/definitely/not/here.pdf"));
    }
}
