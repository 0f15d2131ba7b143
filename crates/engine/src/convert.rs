//! PDF to GIF page conversion through an external ImageMagick binary.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use pageturner_core::{Error, Result};
use tracing::{debug, info};

pub const MAGICK_HOME_ENV: &str = "MAGICK_HOME";

#[cfg(windows)]
const TOOL_NAMES: &[&str] = &["magick.exe", "convert.exe"];
#[cfg(not(windows))]
const TOOL_NAMES: &[&str] = &["magick", "convert"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converter {
    program: PathBuf,
}

impl Converter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Finds the converter: the configured directory first, then
    /// `MAGICK_HOME`, then each `PATH` entry in order.
    pub fn locate(magick_home: Option<&str>) -> Result<Self> {
        let mut dirs: Vec<PathBuf> = magick_home.map(PathBuf::from).into_iter().collect();
        dirs.extend(std::env::var_os(MAGICK_HOME_ENV).map(PathBuf::from));
        if let Some(path) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&path).filter(|dir| !dir.as_os_str().is_empty()));
        }
        dirs.iter()
            .find_map(|dir| tool_in(dir))
            .map(Self::new)
            .ok_or_else(|| Error::ExternalToolFailure("ImageMagick not found".to_string()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `<dest>/<stem>%02d.gif`, the pattern handed to the converter.
    pub fn output_pattern(pdf: &Path, dest: &Path) -> PathBuf {
        let stem = pdf
            .file_stem()
            .unwrap_or_else(|| OsStr::new("page"))
            .to_string_lossy();
        dest.join(format!("{stem}%02d.gif"))
    }

    /// Writes one GIF per PDF page into `dest`. Anything the tool prints on
    /// stderr is a failure, returned verbatim.
    pub fn convert(&self, pdf: &Path, dest: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest)?;
        let pattern = Self::output_pattern(pdf, dest);
        debug!(program = %self.program.display(), pdf = %pdf.display(), pattern = %pattern.display(), "converting");

        let output = Command::new(&self.program)
            .arg(pdf)
            .arg(&pattern)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                Error::ExternalToolFailure(format!("run {}: {err}", self.program.display()))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(Error::ExternalToolFailure(stderr.into_owned()));
        }
        if !output.status.success() {
            return Err(Error::ExternalToolFailure(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            )));
        }
        info!(pdf = %pdf.display(), dest = %dest.display(), "converted pdf");
        Ok(dest.to_path_buf())
    }
}

/// The first converter binary in `dir` that can be run.
fn tool_in(dir: &Path) -> Option<PathBuf> {
    TOOL_NAMES.iter().map(|name| dir.join(name)).find(|candidate| {
        fs::metadata(candidate).is_ok_and(|meta| meta.is_file() && runnable(&meta))
    })
}

#[cfg(unix)]
fn runnable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn runnable(_meta: &fs::Metadata) -> bool {
    true
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt as _;

    fn script(dir: &Path, name: &str, body: &str) -> anyhow::Result<PathBuf> {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms)?;
        Ok(path)
    }

    #[test]
    fn output_pattern_uses_pdf_stem() {
        assert_eq!(
            Converter::output_pattern(Path::new("/in/Clair de Lune.pdf"), Path::new("/music/Clair")),
            PathBuf::from("/music/Clair/Clair de Lune%02d.gif")
        );
    }

    #[test]
    fn locates_tool_in_configured_home() -> anyhow::Result<()> {
        let home = tempfile::tempdir()?;
        let tool = script(home.path(), TOOL_NAMES[1], "exit 0")?;
        let converter = Converter::locate(Some(&home.path().to_string_lossy()))?;
        assert_eq!(converter.program(), tool.as_path());
        Ok(())
    }

    #[test]
    fn non_executable_file_is_skipped() -> anyhow::Result<()> {
        let home = tempfile::tempdir()?;
        fs::write(home.path().join(TOOL_NAMES[0]), b"")?;
        assert!(tool_in(home.path()).is_none());
        Ok(())
    }

    #[test]
    fn directory_named_like_the_tool_is_skipped() -> anyhow::Result<()> {
        let home = tempfile::tempdir()?;
        fs::create_dir(home.path().join(TOOL_NAMES[0]))?;
        let tool = script(home.path(), TOOL_NAMES[1], "exit 0")?;
        assert_eq!(tool_in(home.path()), Some(tool));
        Ok(())
    }

    #[test]
    fn stderr_output_is_a_failure() -> anyhow::Result<()> {
        let bin = tempfile::tempdir()?;
        let dest = tempfile::tempdir()?;
        let tool = script(bin.path(), "convert", "echo 'no decode delegate for this image format' >&2")?;
        let err = Converter::new(tool)
            .convert(Path::new("score.pdf"), dest.path())
            .unwrap_err();
        match err {
            Error::ExternalToolFailure(message) => {
                assert_eq!(message, "no decode delegate for this image format\n")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn successful_run_returns_destination() -> anyhow::Result<()> {
        let bin = tempfile::tempdir()?;
        let dest = tempfile::tempdir()?;
        let out = dest.path().join("out");
        // Stand-in converter: expands the %02d pattern for two pages.
        let tool = script(
            bin.path(),
            "convert",
            "p=\"$2\"; for n in 00 01; do : > \"$(printf '%s' \"$p\" | sed \"s/%02d/$n/\")\"; done",
        )?;
        let written = Converter::new(tool).convert(Path::new("/in/etude.pdf"), &out)?;
        assert_eq!(written, out);
        assert!(out.join("etude00.gif").is_file());
        assert!(out.join("etude01.gif").is_file());
        Ok(())
    }
}
