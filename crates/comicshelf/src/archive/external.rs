//! RAR and 7z containers, read through the `unrar` and `7z` command line tools.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::ArchiveError;

/// Which command line tool drives the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalTool {
    Unrar,
    SevenZip,
}

impl ExternalTool {
    fn label(self) -> &'static str {
        match self {
            ExternalTool::Unrar => "unrar",
            ExternalTool::SevenZip => "7z",
        }
    }

    fn list_args(self) -> &'static [&'static str] {
        match self {
            // Bare names, no password prompt.
            ExternalTool::Unrar => &["lb", "-p-"],
            // Technical listing without headers.
            ExternalTool::SevenZip => &["l", "-slt", "-ba"],
        }
    }

    fn extract_args(self) -> &'static [&'static str] {
        match self {
            ExternalTool::Unrar => &["p", "-inul", "-p-"],
            ExternalTool::SevenZip => &["e", "-so", "-bd"],
        }
    }
}

/// Archive whose members are listed once at open time and piped out of the
/// tool on demand.
pub struct ExternalBackend {
    tool: ExternalTool,
    program: PathBuf,
    path: PathBuf,
    names: Vec<String>,
}

impl ExternalBackend {
    pub fn open(tool: ExternalTool, program: &Path, path: &Path) -> Result<Self, ArchiveError> {
        let output = run(tool, program, tool.list_args(), path, None)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let names = match tool {
            ExternalTool::Unrar => parse_bare_listing(&stdout),
            ExternalTool::SevenZip => parse_slt_listing(&stdout),
        };

        Ok(Self {
            tool,
            program: program.to_path_buf(),
            path: path.to_path_buf(),
            names,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        if !self.names.iter().any(|n| n == name) {
            return Err(ArchiveError::MemberNotFound(name.to_string()));
        }
        let output = run(
            self.tool,
            &self.program,
            self.tool.extract_args(),
            &self.path,
            Some(name),
        )?;
        Ok(output.stdout)
    }
}

fn run(
    tool: ExternalTool,
    program: &Path,
    args: &[&str],
    archive: &Path,
    member: Option<&str>,
) -> Result<Output, ArchiveError> {
    let mut cmd = Command::new(program);
    cmd.args(args).arg(archive);
    if let Some(member) = member {
        cmd.arg(member);
    }

    log::trace!("Running {} {:?} on {}", tool.label(), args, archive.display());

    let output = cmd.output().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            ArchiveError::UnsupportedFormat(format!(
                "{} archives need '{}', which was not found",
                tool.label(),
                program.display()
            ))
        } else {
            ArchiveError::ToolFailed {
                tool: tool.label().to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ArchiveError::ToolFailed {
            tool: tool.label().to_string(),
            reason: format!("{} ({})", stderr.trim(), output.status),
        });
    }

    Ok(output)
}

/// One member name per line, as printed by `unrar lb`. Lines ending in a
/// path separator are directories.
fn parse_bare_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.ends_with('/') && !line.ends_with('\\'))
        .map(str::to_string)
        .collect()
}

/// `7z l -slt -ba` prints one `Key = Value` block per member, separated by
/// blank lines.
fn parse_slt_listing(stdout: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut path: Option<String> = None;
    let mut is_dir = false;

    let mut flush = |path: &mut Option<String>, is_dir: &mut bool| {
        if let Some(p) = path.take() {
            if !*is_dir {
                names.push(p);
            }
        }
        *is_dir = false;
    };

    for line in stdout.lines().map(|l| l.trim_end_matches('\r')) {
        if line.trim().is_empty() {
            flush(&mut path, &mut is_dir);
            continue;
        }
        if let Some(value) = line.strip_prefix("Path = ") {
            flush(&mut path, &mut is_dir);
            path = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("Folder = ") {
            is_dir = value.trim() == "+";
        } else if let Some(value) = line.strip_prefix("Attributes = ") {
            if value.starts_with('D') {
                is_dir = true;
            }
        }
    }
    flush(&mut path, &mut is_dir);

    names
}
