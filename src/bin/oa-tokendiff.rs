//! oa-tokendiff -- token-level diff of two source files.
//!
//! Usage: oa-tokendiff <old> <new> [--config <options.json>] [--debug] [--aligned]
//!        [--alignment-text <s>] [--min-lines-moved <n>] [--max-matching-offset <n>]

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use oa_tokendiff::{DiffOptions, Mode, Side};

/// Flags followed by a value.
const VALUE_FLAGS: &[&str] = &[
    "--config",
    "--alignment-text",
    "--min-lines-moved",
    "--max-matching-offset",
];

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout only carries the diff.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let files = positionals(&args);
    let [old, new] = files[..] else {
        bail!("usage: oa-tokendiff <old> <new> [--config <options.json>] [--debug] [--aligned]");
    };
    let options = options(&args)?;

    let source_a = read_source(Path::new(old))?;
    let source_b = read_source(Path::new(new))?;
    let diff = oa_tokendiff::diff_sources(&source_a, &source_b, &options)
        .with_context(|| format!("diffing {old} against {new}"))?;

    if args.iter().any(|a| a == "--aligned") {
        for (side, path, source) in [(Side::A, old, &source_a), (Side::B, new, &source_b)] {
            println!("=== {side}: {path}");
            for line in diff.alignment.apply(side, source, &options.alignment_text) {
                println!("{line}");
            }
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&diff)?);
    }
    Ok(())
}

fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            out.push(arg.as_str());
        }
    }
    out
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .skip_while(|a| *a != name)
        .nth(1)
        .map(String::as_str)
}

fn options(args: &[String]) -> anyhow::Result<DiffOptions> {
    let mut options = match flag_value(args, "--config") {
        Some(path) => DiffOptions::from_json_file(&PathBuf::from(path))
            .with_context(|| format!("loading options from {path}"))?,
        None => DiffOptions::default(),
    };

    if args.iter().any(|a| a == "--debug") {
        options.mode = Mode::Debug;
    }
    if let Some(text) = flag_value(args, "--alignment-text") {
        text.clone_into(&mut options.alignment_text);
    }
    if let Some(n) = flag_value(args, "--min-lines-moved") {
        options.minimum_lines_moved = n.parse().context("--min-lines-moved expects a number")?;
    }
    if let Some(n) = flag_value(args, "--max-matching-offset") {
        options.max_matching_offset = n
            .parse()
            .context("--max-matching-offset expects a number")?;
    }
    Ok(options)
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
