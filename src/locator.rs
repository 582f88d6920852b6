//! Resolution of `phar://archive.phar/internal/path` style locators.
//!
//! A locator names an archive and, optionally, a file inside it. The archive
//! part ends at the first path segment with a `.phar` extension; everything
//! after it is the internal path handed to [`Archive::get_entry`].
//!
//! [`Archive::get_entry`]: crate::phar::Archive::get_entry

use anyhow::{Result, bail};
use std::path::PathBuf;

const PHAR_EXTENSION: &str = ".phar";

/// Where the archive bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(PathBuf),
    Http(String),
    Stdin,
}

/// An archive source plus a (possibly empty) path inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub source: Source,
    pub internal_path: String,
}

impl Locator {
    /// Parse a command-line argument into a locator.
    ///
    /// Accepted forms:
    /// - `-` for stdin
    /// - plain paths, `file://` and `phar://` URIs
    /// - `http://` and `https://` URLs
    ///
    /// The `phar://` scheme requires a `.phar` segment. Everything else falls
    /// back to treating the whole argument as the archive when there is none.
    pub fn parse(input: &str) -> Result<Self> {
        if input == "-" {
            return Ok(Self {
                source: Source::Stdin,
                internal_path: String::new(),
            });
        }

        if let Some((scheme, rest)) = input.split_once("://") {
            match scheme.to_ascii_lowercase().as_str() {
                "http" | "https" => {
                    let (base, internal) = split_at_phar(rest).unwrap_or((rest, ""));
                    return Ok(Self {
                        source: Source::Http(format!("{}://{}", scheme, base)),
                        internal_path: internal.to_string(),
                    });
                }
                "phar" => {
                    let Some((base, internal)) = split_at_phar(rest) else {
                        bail!("Cannot parse PHAR locator: {}", input);
                    };
                    return Ok(Self::local(base, internal));
                }
                "file" => {
                    let (base, internal) = split_at_phar(rest).unwrap_or((rest, ""));
                    return Ok(Self::local(base, internal));
                }
                _ => bail!("Unsupported scheme in {}", input),
            }
        }

        let (base, internal) = split_at_phar(input).unwrap_or((input, ""));
        Ok(Self::local(base, internal))
    }

    fn local(path: &str, internal: &str) -> Self {
        Self {
            source: Source::Local(PathBuf::from(fix_drive_path(path))),
            internal_path: internal.to_string(),
        }
    }
}

/// Split at the first `/`-separated segment ending in `.phar`.
fn split_at_phar(s: &str) -> Option<(&str, &str)> {
    let mut start = 0;
    for segment in s.split('/') {
        let end = start + segment.len();
        if segment.ends_with(PHAR_EXTENSION) {
            let internal = s.get(end + 1..).unwrap_or("");
            return Some((&s[..end], internal));
        }
        start = end + 1;
    }
    None
}

/// `/C:/dir/app.phar` (from `phar:///C:/...`) becomes `C:/dir/app.phar`.
fn fix_drive_path(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'/' && bytes[1].is_ascii_alphabetic() && bytes[2] == b':' {
        &path[1..]
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(path: &str, internal: &str) -> Locator {
        Locator {
            source: Source::Local(PathBuf::from(path)),
            internal_path: internal.to_string(),
        }
    }

    #[test]
    fn splits_phar_uri() {
        assert_eq!(
            Locator::parse("phar:///srv/app.phar/src/Kernel.php").unwrap(),
            local("/srv/app.phar", "src/Kernel.php")
        );
        assert_eq!(
            Locator::parse("phar:///srv/app.phar").unwrap(),
            local("/srv/app.phar", "")
        );
    }

    #[test]
    fn first_phar_segment_wins() {
        assert_eq!(
            Locator::parse("tools/a.phar/vendor/b.phar/x").unwrap(),
            local("tools/a.phar", "vendor/b.phar/x")
        );
    }

    #[test]
    fn windows_drive_letters() {
        assert_eq!(
            Locator::parse("phar://C:/tools/app.phar/a.php").unwrap(),
            local("C:/tools/app.phar", "a.php")
        );
        assert_eq!(
            Locator::parse("phar:///C:/tools/app.phar/a.php").unwrap(),
            local("C:/tools/app.phar", "a.php")
        );
    }

    #[test]
    fn plain_paths_without_extension() {
        assert_eq!(Locator::parse("build/archive.bin").unwrap(), local("build/archive.bin", ""));
        assert!(Locator::parse("phar:///srv/archive.bin/a").is_err());
    }

    #[test]
    fn http_urls() {
        let loc = Locator::parse("https://example.com/dl/app.phar/bin/run").unwrap();
        assert_eq!(loc.source, Source::Http("https://example.com/dl/app.phar".to_string()));
        assert_eq!(loc.internal_path, "bin/run");
    }

    #[test]
    fn stdin() {
        assert_eq!(Locator::parse("-").unwrap().source, Source::Stdin);
    }
}
