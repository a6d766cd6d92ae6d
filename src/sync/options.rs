// ABOUTME: Options controlling a sync run.
// ABOUTME: Cache, heave, and git export selection.

/// Which commit to export for git-sourced builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitSelection {
    pub branch: Option<String>,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Build without cache and purge the builder cache first.
    pub no_cache: bool,
    /// Upload only; no build, start, or prune steps.
    pub heave: bool,
    /// Build from an exported commit instead of the working directory.
    pub git: Option<GitSelection>,
}
