use clap::{Parser, ValueEnum};

use crate::phar::{DuplicatePolicy, ParseOptions};

#[derive(Parser, Debug)]
#[command(name = "runphar")]
#[command(version)]
#[command(about = "A Rust PHAR reader with HTTP URL support", long_about = None)]
#[command(after_help = "Examples:\n  \
  runphar -l composer.phar                         list files in composer.phar\n  \
  runphar -p phar://box.phar/src/Kernel.php | less send one file into less\n  \
  runphar -i https://example.com/tool.phar         show manifest and signature info\n  \
  runphar tool.phar 'src/*' -d out                 extract matching files into out/")]
pub struct Cli {
    /// PHAR file path, phar:// locator, HTTP URL, or - for stdin
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Show archive information (stub, manifest, signature)
    #[arg(short = 'i')]
    pub info: bool,

    /// Show the archive as a directory tree
    #[arg(short = 't')]
    pub tree: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Which entry to keep when the manifest repeats a path
    #[arg(long, value_enum, default_value_t = Duplicates::Last)]
    pub duplicates: Duplicates,

    /// Require the stub to end within this many bytes
    #[arg(long, value_name = "BYTES")]
    pub max_stub: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Duplicates {
    /// Later entries replace earlier ones
    Last,
    /// The first entry is kept
    First,
    /// Refuse archives with repeated paths
    Reject,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn parse_options(&self) -> ParseOptions {
        let policy = match self.duplicates {
            Duplicates::Last => DuplicatePolicy::LastWins,
            Duplicates::First => DuplicatePolicy::FirstWins,
            Duplicates::Reject => DuplicatePolicy::Reject,
        };
        let options = ParseOptions::default().duplicates(policy);
        match self.max_stub {
            Some(max) => options.max_stub_len(max),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_flags() {
        let cli = Cli::parse_from(["runphar", "--duplicates", "reject", "--max-stub", "4096", "a.phar"]);
        let options = cli.parse_options();
        assert_eq!(options.duplicates, DuplicatePolicy::Reject);
        assert_eq!(options.max_stub_len, Some(4096));
    }

    #[test]
    fn pipe_implies_quiet() {
        let cli = Cli::parse_from(["runphar", "-p", "a.phar", "x.php"]);
        assert!(cli.is_quiet());
        assert!(!cli.is_very_quiet());
        assert_eq!(cli.files, vec!["x.php"]);
    }
}
