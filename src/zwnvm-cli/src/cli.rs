//! CLI argument definitions for zwnvm

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use zwnvm::{Format, FORMATS};

#[derive(Parser)]
#[command(name = "zwnvm")]
#[command(about = "Z-Wave controller NVM <-> JSON converter", long_about = None)]
#[command(override_usage = "zwnvm [-i <format_name>|-e <format_name> ] <src> <dst>")]
pub struct Cli {
    /// Export mode, produce a JSON file from an NVM file
    #[arg(short = 'e', value_name = "format_name", conflicts_with = "import")]
    pub export: Option<String>,

    /// Import mode, produce a NVM file from a JSON file
    #[arg(short = 'i', value_name = "format_name")]
    pub import: Option<String>,

    /// Source file
    pub src: PathBuf,

    /// Destination file
    pub dst: PathBuf,

    /// Raise diagnostic verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only show errors
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// What the mode flags resolved to.
pub enum Mode {
    Export(Format),
    Import(Format),
}

impl Cli {
    /// Resolve the mode flags; `None` means the invocation (or the format
    /// name) is unusable and the caller should print the usage text.
    pub fn mode(&self) -> Option<Mode> {
        match (&self.export, &self.import) {
            (Some(name), None) => name.parse().ok().map(Mode::Export),
            (None, Some(name)) => name.parse().ok().map(Mode::Import),
            _ => None,
        }
    }

    /// Default log filter from the verbosity flags; the `ZWNVM_LOG` env
    /// var overrides it.
    pub fn default_filter(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                _ => "debug",
            }
        }
    }
}

/// The usage text plus the supported-format catalog.
pub fn usage() -> String {
    let mut text = String::from(
        "Usage: zwnvm [-i <format_name>|-e <format_name> ] <src> <dst>\n\
         \t-e Export mode, produce a JSON file from an NVM file.\n\
         \t-i Import mode, produce a NVM file from a JSON file.\n\
         \n\
         Note that for bridge7.16 and onward NVM migration is handled by the Z-Wave\n\
         module automatically so the NVM converter must NOT be used.\n\
         \n\
         supported formats are:\n\
         \n",
    );
    for format in FORMATS {
        let _ = writeln!(text, "\t{} : {}", format.name(), format.converter_id());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_lists_all_formats_in_catalog_order() {
        let text = usage();
        let rows: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with('\t') && l.contains(" : "))
            .collect();
        assert_eq!(rows.len(), 14);
        assert_eq!(
            rows[0],
            "\tbridge_800s_7.18 : NVM Converter for Z-Wave Bridge 7.18"
        );
        assert_eq!(rows[13], "\tstatic6.6 : NVM Converter for Z-Wave Static 6.60");
    }

    #[test]
    fn test_mode_resolution() {
        let cli = Cli::parse_from(["zwnvm", "-e", "bridge7.15", "in.nvm", "out.json"]);
        assert!(matches!(cli.mode(), Some(Mode::Export(Format::Bridge715))));

        let cli = Cli::parse_from(["zwnvm", "-i", "static6.7", "in.json", "out.nvm"]);
        assert!(matches!(cli.mode(), Some(Mode::Import(Format::Static67))));

        // Unknown format name and missing mode flag both fall back to usage.
        let cli = Cli::parse_from(["zwnvm", "-e", "bridge9.9", "a", "b"]);
        assert!(cli.mode().is_none());
        let cli = Cli::parse_from(["zwnvm", "a", "b"]);
        assert!(cli.mode().is_none());
    }

    #[test]
    fn test_verbosity_filter() {
        let cli = Cli::parse_from(["zwnvm", "-e", "bridge7.15", "a", "b"]);
        assert_eq!(cli.default_filter(), "warn");
        let cli = Cli::parse_from(["zwnvm", "-v", "-e", "bridge7.15", "a", "b"]);
        assert_eq!(cli.default_filter(), "info");
        let cli = Cli::parse_from(["zwnvm", "-vv", "-e", "bridge7.15", "a", "b"]);
        assert_eq!(cli.default_filter(), "debug");
        let cli = Cli::parse_from(["zwnvm", "-q", "-e", "bridge7.15", "a", "b"]);
        assert_eq!(cli.default_filter(), "error");
    }
}
