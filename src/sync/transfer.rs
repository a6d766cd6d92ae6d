// ABOUTME: Moves a local build context onto the remote host.
// ABOUTME: Incremental directory sync first, compressed archive upload as fallback.

use flate2::Compression;
use flate2::write::GzEncoder;
use glob::{MatchOptions, Pattern};
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::config::CONFIG_DIR;
use crate::error::Result;
use crate::remote::{StepRunner, fs};
use crate::ssh;
use crate::transform::LOCAL_ENV_DIR;

/// Patterns never sent to the remote host.
pub const DEFAULT_EXCLUDES: [&str; 4] = [".git", "node_modules", ".next", "*.log"];

/// How a directory reached the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMethod {
    Incremental,
    Archive,
}

/// Default excludes plus the patterns of `dir/.gitignore`, kept verbatim.
pub fn default_excludes(dir: &Path) -> Vec<String> {
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect();
    if let Ok(contents) = std::fs::read_to_string(dir.join(".gitignore")) {
        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            if line.trim_matches('/').is_empty() {
                continue;
            }
            if !excludes.iter().any(|p| p == line) {
                excludes.push(line.to_string());
            }
        }
    }
    excludes
}

/// Anchored excludes for the secrets and merged env files in `workdir`.
///
/// Empty unless `workdir` lies inside `context`.
pub fn generated_excludes(context: &Path, workdir: &Path) -> Vec<String> {
    let canonical = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    let (context, workdir) = (canonical(context), canonical(workdir));
    let Ok(relative) = workdir.strip_prefix(&context) else {
        return Vec::new();
    };
    [CONFIG_DIR, LOCAL_ENV_DIR]
        .iter()
        .map(|entry| {
            let path: PathBuf = relative.join(entry);
            format!("/{}/", path.to_string_lossy().trim_matches('/'))
        })
        .collect()
}

/// One exclude pattern with rsync `--exclude` semantics.
///
/// A leading `/` anchors the pattern at the transfer root, a trailing `/`
/// restricts it to directories, and a pattern without an inner `/` matches
/// the final path component at any depth.
#[derive(Debug, Clone)]
struct ExcludeRule {
    pattern: Pattern,
    anchored: bool,
    dir_only: bool,
    has_separator: bool,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl ExcludeRule {
    fn parse(raw: &str) -> Option<Self> {
        let dir_only = raw.ends_with('/');
        let anchored = raw.starts_with('/');
        let body = raw.trim_matches('/');
        if body.is_empty() {
            return None;
        }
        let pattern = Pattern::new(body)
            .or_else(|_| Pattern::new(&Pattern::escape(body)))
            .ok()?;
        Some(Self {
            pattern,
            anchored,
            dir_only,
            has_separator: body.contains('/'),
        })
    }

    fn matches(&self, relative: &Path, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.anchored {
            return self.pattern.matches_path_with(relative, MATCH_OPTIONS);
        }
        if !self.has_separator {
            return relative.file_name().is_some_and(|name| {
                self.pattern
                    .matches_with(&name.to_string_lossy(), MATCH_OPTIONS)
            });
        }
        let components: Vec<_> = relative.components().collect();
        (0..components.len()).any(|start| {
            let tail: PathBuf = components[start..].iter().collect();
            self.pattern.matches_path_with(&tail, MATCH_OPTIONS)
        })
    }
}

/// Compiled exclude patterns, shared by the incremental and archive transfers.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    rules: Vec<ExcludeRule>,
}

impl ExcludeSet {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            rules: patterns.iter().filter_map(|p| ExcludeRule::parse(p)).collect(),
        }
    }

    /// Whether `relative` (a path below the transfer root) is left out.
    pub fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        self.rules.iter().any(|rule| rule.matches(relative, is_dir))
    }
}

/// Pack `dir` into a gzip-compressed tarball with paths relative to `dir`.
pub fn pack_directory(dir: &Path, excludes: &[String]) -> Result<NamedTempFile> {
    let archive = NamedTempFile::new()?;
    let encoder = GzEncoder::new(File::create(archive.path())?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let excludes = ExcludeSet::new(excludes);
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            !excludes.is_excluded(relative, entry.file_type().is_dir())
        });
    for entry in walker {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if entry.file_type().is_dir() {
            builder.append_dir(relative, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), relative)?;
        }
    }

    builder.into_inner()?.finish()?;
    Ok(archive)
}

/// Mirror `local` into `remote_dir`.
///
/// When incremental sync is unavailable, the directory is packed, uploaded to
/// `upload_path`, and extracted over a wiped `remote_dir`.
pub async fn transfer_directory(
    runner: StepRunner<'_>,
    local: &Path,
    remote_dir: &str,
    upload_path: &str,
    excludes: &[String],
) -> Result<TransferMethod> {
    match runner
        .remote()
        .sync_directory(local, remote_dir, excludes)
        .await
    {
        Ok(()) => return Ok(TransferMethod::Incremental),
        Err(ssh::Error::SyncUnavailable(reason)) => {
            tracing::info!("incremental sync unavailable ({reason}), uploading archive");
        }
        Err(e) => return Err(e.into()),
    }

    let archive = pack_directory(local, excludes)?;
    runner.remote().upload_file(archive.path(), upload_path).await?;
    runner
        .fatal(
            &format!("extract archive into {remote_dir}"),
            &fs::extract_replace(upload_path, remote_dir),
        )
        .await?;
    Ok(TransferMethod::Archive)
}
