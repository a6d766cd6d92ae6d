// ABOUTME: In-memory remote host implementing RemoteExecutor for integration tests.
// ABOUTME: Interprets the shell, docker, and docker compose commands the engine issues.
// ABOUTME: Directories created with sudo stay root-owned until chowned back.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use scion::manifest::{ComposeFile, REMOTE_MANIFEST_FILENAME};
use scion::remote::RemoteExecutor;
use scion::ssh::{self, CommandOutput};
use scion::sync::ExcludeSet;
use scion::types::normalize_tag;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

/// First line of every fake image archive.
pub const ARCHIVE_MAGIC: &str = "fake-image";

#[derive(Default)]
struct Host {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    /// Directories the login user cannot write to.
    root_owned: BTreeSet<String>,
    images: BTreeMap<String, String>,
    running: BTreeSet<String>,
    log: Vec<String>,
    failures: Vec<String>,
    next_id: u32,
}

pub struct FakeRemote {
    host: Mutex<Host>,
    rsync: bool,
}

type Step = Result<String, String>;

impl FakeRemote {
    pub fn new() -> Self {
        let host = Host {
            dirs: ["/".to_string()].into_iter().collect(),
            ..Default::default()
        };
        Self {
            host: Mutex::new(host),
            rsync: true,
        }
    }

    /// A host without rsync, forcing the archive fallback.
    pub fn without_rsync() -> Self {
        Self {
            rsync: false,
            ..Self::new()
        }
    }

    /// Make every command containing `pattern` exit non-zero.
    pub fn fail_on(&self, pattern: &str) {
        self.host.lock().unwrap().failures.push(pattern.to_string());
    }

    pub fn seed_dir(&self, path: &str) {
        self.host.lock().unwrap().mkdir(path);
    }

    /// A directory created by root, as left behind by an earlier sudo run.
    pub fn seed_root_dir(&self, path: &str) {
        let mut host = self.host.lock().unwrap();
        host.mkdir(path);
        host.root_owned.insert(path.to_string());
    }

    pub fn is_root_owned(&self, path: &str) -> bool {
        self.host.lock().unwrap().root_owned.contains(path)
    }

    pub fn seed_file(&self, path: &str, contents: &str) {
        let mut host = self.host.lock().unwrap();
        if let Some((parent, _)) = path.rsplit_once('/') {
            host.mkdir(parent);
        }
        host.files.insert(path.to_string(), contents.as_bytes().to_vec());
    }

    /// Register a local image under `tag`, returning its ID.
    pub fn seed_image(&self, tag: &str) -> String {
        self.host.lock().unwrap().new_image(tag)
    }

    /// Archive contents as written by `docker save`; an empty tag gives an untagged archive.
    pub fn archive_contents(id: &str, tag: &str) -> String {
        format!("{ARCHIVE_MAGIC}\n{id}\n{tag}\n")
    }

    pub fn remove_image(&self, tag: &str) {
        self.host.lock().unwrap().images.remove(&normalize_tag(tag));
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.host
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.host.lock().unwrap().dirs.contains(path)
    }

    pub fn image_id(&self, tag: &str) -> Option<String> {
        self.host
            .lock()
            .unwrap()
            .images
            .get(&normalize_tag(tag))
            .cloned()
    }

    pub fn running(&self) -> BTreeSet<String> {
        self.host.lock().unwrap().running.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.host.lock().unwrap().log.clone()
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.commands().iter().any(|c| c.contains(fragment))
    }

    pub fn list(&self, dir: &str) -> Vec<String> {
        self.host.lock().unwrap().children(dir)
    }
}

impl Host {
    /// Create `path` and its parents, returning the directories that were new.
    fn mkdir(&mut self, path: &str) -> Vec<String> {
        let mut current = String::new();
        let mut created = Vec::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            if self.dirs.insert(current.clone()) {
                created.push(current.clone());
            }
        }
        created
    }

    fn parent(path: &str) -> &str {
        match path.rsplit_once('/') {
            Some(("", _)) => "/",
            Some((parent, _)) => parent,
            None => "/",
        }
    }

    /// Fails when the login user may not create or remove entries of `path`'s parent.
    fn writable(&self, path: &str, privileged: bool) -> Result<(), String> {
        if privileged || !self.root_owned.contains(Self::parent(path)) {
            Ok(())
        } else {
            Err(format!("{path}: Permission denied"))
        }
    }

    /// `rm -rf` as the login user needs write access to every non-empty directory it empties.
    fn removable(&self, path: &str, privileged: bool) -> Result<(), String> {
        self.writable(path, privileged)?;
        if privileged {
            return Ok(());
        }
        let prefix = format!("{path}/");
        let blocked = self
            .root_owned
            .iter()
            .filter(|d| *d == path || d.starts_with(&prefix))
            .any(|d| !self.children(d).is_empty());
        if blocked {
            Err(format!("{path}: Permission denied"))
        } else {
            Ok(())
        }
    }

    fn new_image(&mut self, tag: &str) -> String {
        self.next_id += 1;
        let id = format!("sha256:{:064x}", self.next_id);
        self.images.insert(normalize_tag(tag), id.clone());
        id
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some(("", _)) => true,
            Some((parent, _)) => self.dirs.contains(parent),
            None => false,
        }
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut names: BTreeSet<String> = BTreeSet::new();
        for path in self.files.keys().chain(self.dirs.iter()) {
            if let Some(rest) = path.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    names.insert(rest.to_string());
                }
            }
        }
        names.into_iter().collect()
    }

    fn remove_tree(&mut self, path: &str) {
        let prefix = format!("{path}/");
        self.files
            .retain(|p, _| p != path && !p.starts_with(&prefix));
        self.dirs.retain(|p| p != path && !p.starts_with(&prefix));
        self.root_owned
            .retain(|p| p != path && !p.starts_with(&prefix));
    }

    fn chown(&mut self, path: &str) {
        let prefix = format!("{path}/");
        self.root_owned
            .retain(|p| p != path && !p.starts_with(&prefix));
    }

    fn copy_tree(&mut self, from: &str, to: &str, privileged: bool) -> Step {
        // `cp -r src/. dst` copies the contents of src into dst.
        let from = from.strip_suffix("/.").unwrap_or(from);
        self.writable(to, privileged)?;
        if !self.dirs.contains(from) {
            return Err(format!("cp: cannot stat '{from}'"));
        }
        let prefix = format!("{from}/");
        let dirs: Vec<String> = self
            .dirs
            .iter()
            .filter_map(|d| d.strip_prefix(&prefix).map(|rest| format!("{to}/{rest}")))
            .collect();
        let files: Vec<(String, Vec<u8>)> = self
            .files
            .iter()
            .filter_map(|(p, c)| p.strip_prefix(&prefix).map(|rest| (format!("{to}/{rest}"), c.clone())))
            .collect();
        let mut created = self.mkdir(to);
        for dir in dirs {
            created.extend(self.mkdir(&dir));
        }
        if privileged {
            self.root_owned.extend(created);
        }
        self.files.extend(files);
        Ok(String::new())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| format!("{path}: No such file or directory"))
    }

    fn run_chain(&mut self, command: &str) -> CommandOutput {
        self.log.push(command.to_string());
        if self.failures.iter().any(|f| command.contains(f.as_str())) {
            return CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "injected failure".to_string(),
            };
        }

        let mut cwd = "/".to_string();
        let mut stdout = String::new();
        for segment in command.split(" && ") {
            let mut words = words(segment);
            let mut privileged = false;
            while words.first().is_some_and(|w| w == "sudo") {
                words.remove(0);
                privileged = true;
            }
            let result = if words.first().is_some_and(|w| w == "cd") {
                let dir = words.get(1).cloned().unwrap_or_default();
                if self.dirs.contains(&dir) {
                    cwd = dir;
                    Ok(String::new())
                } else {
                    Err(format!("cd: {dir}: No such file or directory"))
                }
            } else {
                self.run_words(&words, &cwd, privileged)
            };
            match result {
                Ok(out) => stdout.push_str(&out),
                Err(stderr) => {
                    return CommandOutput {
                        exit_code: 1,
                        stdout,
                        stderr,
                    };
                }
            }
        }
        CommandOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        }
    }

    fn run_words(&mut self, words: &[String], cwd: &str, privileged: bool) -> Step {
        let args: Vec<&str> = words.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["test", flag, path] => {
                let found = match *flag {
                    "-f" => self.files.contains_key(*path),
                    "-d" => self.dirs.contains(*path),
                    _ => self.files.contains_key(*path) || self.dirs.contains(*path),
                };
                if found { Ok(String::new()) } else { Err(String::new()) }
            }
            ["mkdir", "-p", dirs @ ..] => {
                for dir in dirs {
                    if !self.dirs.contains(*dir) {
                        let missing = dir
                            .match_indices('/')
                            .map(|(i, _)| &dir[..i])
                            .filter(|p| !p.is_empty())
                            .find(|p| !self.dirs.contains(*p))
                            .unwrap_or(*dir);
                        self.writable(missing, privileged)?;
                    }
                    let created = self.mkdir(dir);
                    if privileged {
                        self.root_owned.extend(created);
                    }
                }
                Ok(String::new())
            }
            ["chown", "-R", rest @ ..] => {
                if !privileged {
                    return Err("chown: Operation not permitted".to_string());
                }
                for path in rest.iter().filter(|a| a.starts_with('/')) {
                    self.chown(path);
                }
                Ok(String::new())
            }
            ["rm", "-rf", path] | ["rm", "-f", path] => {
                self.removable(path, privileged)?;
                self.remove_tree(path);
                Ok(String::new())
            }
            ["cp", "-r", from, to] => self.copy_tree(from, to, privileged),
            ["cp", from, to] => {
                let contents = self.read(from)?;
                if !self.parent_exists(to) {
                    return Err(format!("cp: cannot create '{to}'"));
                }
                self.writable(to, privileged)?;
                self.files.insert(to.to_string(), contents);
                Ok(String::new())
            }
            ["ls", "-1", dir] => {
                if !self.dirs.contains(*dir) {
                    return Err(format!("ls: cannot access '{dir}'"));
                }
                Ok(self
                    .children(dir)
                    .into_iter()
                    .map(|name| format!("{name}\n"))
                    .collect())
            }
            ["tar", "-xzf", archive, "-C", dir] => self.untar(archive, dir),
            ["docker", "compose", rest @ ..] => self.compose(rest, cwd),
            ["docker", "save", tag, "|", "gzip", ">", archive] => {
                let id = self
                    .images
                    .get(&normalize_tag(tag))
                    .cloned()
                    .ok_or_else(|| format!("No such image: {tag}"))?;
                if !self.parent_exists(archive) {
                    return Err(format!("{archive}: No such file or directory"));
                }
                // The redirect runs as the login user even when docker is sudoed.
                self.writable(archive, false)?;
                self.files.insert(
                    archive.to_string(),
                    FakeRemote::archive_contents(&id, tag).into_bytes(),
                );
                Ok(String::new())
            }
            ["docker", "load", "-i", archive] => {
                let contents = String::from_utf8_lossy(&self.read(archive)?).into_owned();
                let mut lines = contents.lines();
                if lines.next() != Some(ARCHIVE_MAGIC) {
                    return Err("invalid tar header".to_string());
                }
                let id = lines.next().unwrap_or_default().to_string();
                match lines.next().filter(|t| !t.is_empty()) {
                    Some(tag) => {
                        self.images.insert(normalize_tag(tag), id);
                        Ok(format!("Loaded image: {tag}\n"))
                    }
                    None => Ok(format!("Loaded image ID: {id}\n")),
                }
            }
            ["docker", "tag", source, target] => {
                let id = self
                    .images
                    .get(&normalize_tag(source))
                    .cloned()
                    .or_else(|| {
                        source
                            .starts_with("sha256:")
                            .then(|| source.to_string())
                    })
                    .ok_or_else(|| format!("No such image: {source}"))?;
                self.images.insert(normalize_tag(target), id);
                Ok(String::new())
            }
            ["docker", "rmi", "-f", tag] => {
                self.images.remove(&normalize_tag(tag));
                Ok(String::new())
            }
            ["docker", "image", "ls", ..] => Ok(self
                .images
                .iter()
                .map(|(tag, id)| {
                    let (repository, tag) = split_tag(tag);
                    format!(
                        "{{\"Containers\":\"N/A\",\"Repository\":\"{repository}\",\"Tag\":\"{tag}\",\"ID\":\"{id}\"}}\n"
                    )
                })
                .collect()),
            ["docker", "image", "prune", "-f"] | ["docker", "builder", "prune", "-f"] => {
                Ok(String::new())
            }
            other => Err(format!("fake remote: unsupported command {other:?}")),
        }
    }

    fn untar(&mut self, archive: &str, dir: &str) -> Step {
        let bytes = self.read(archive)?;
        let mut tar = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        let entries = tar.entries().map_err(|e| e.to_string())?;
        self.mkdir(dir);
        for entry in entries {
            let mut entry = entry.map_err(|e| e.to_string())?;
            let path = entry.path().map_err(|e| e.to_string())?;
            let target = format!("{dir}/{}", path.to_string_lossy().trim_end_matches('/'));
            if entry.header().entry_type().is_dir() {
                self.mkdir(&target);
            } else {
                let mut contents = Vec::new();
                entry.read_to_end(&mut contents).map_err(|e| e.to_string())?;
                if let Some((parent, _)) = target.rsplit_once('/') {
                    self.mkdir(parent);
                }
                self.files.insert(target, contents);
            }
        }
        Ok(String::new())
    }

    fn manifest(&self, cwd: &str) -> Result<ComposeFile, String> {
        let text = self.read(&format!("{cwd}/{REMOTE_MANIFEST_FILENAME}"))?;
        ComposeFile::from_yaml(&String::from_utf8_lossy(&text)).map_err(|e| e.to_string())
    }

    /// Tag compose uses for a service's image.
    fn service_image(&self, manifest: &ComposeFile, cwd: &str, service: &str) -> Result<String, String> {
        let svc = manifest
            .service(service)
            .ok_or_else(|| format!("no such service: {service}"))?;
        Ok(match &svc.image {
            Some(image) => image.clone(),
            None => {
                let project = cwd.rsplit('/').next().unwrap_or_default();
                format!("{project}-{service}")
            }
        })
    }

    fn compose(&mut self, args: &[&str], cwd: &str) -> Step {
        let manifest = self.manifest(cwd)?;
        let positional: Vec<&str> = args
            .iter()
            .skip(1)
            .copied()
            .filter(|a| !a.starts_with('-') && *a != "never")
            .collect();
        let selected: Vec<String> = if positional.is_empty() {
            manifest.services.names().map(str::to_string).collect()
        } else {
            positional.iter().map(|s| s.to_string()).collect()
        };

        match args.first().copied() {
            Some("config") => {
                let mut out = String::new();
                for name in &selected {
                    out.push_str(&self.service_image(&manifest, cwd, name)?);
                    out.push('\n');
                }
                Ok(out)
            }
            Some("pull") => {
                for name in &selected {
                    let svc = manifest.service(name).ok_or("no such service")?;
                    let image = svc.image.clone().ok_or("service has no image")?;
                    self.new_image(&image);
                }
                Ok(String::new())
            }
            Some("build") => {
                for name in &selected {
                    let svc = manifest.service(name).ok_or("no such service")?;
                    let build = svc.build.as_ref().ok_or("service has no build")?;
                    let context = format!("{cwd}/{}", build.context.trim_start_matches("./"));
                    if !self.files.contains_key(&format!("{context}/{}", build.build_file())) {
                        return Err(format!("unable to prepare context: {context}"));
                    }
                    let tag = self.service_image(&manifest, cwd, name)?;
                    self.new_image(&tag);
                }
                Ok(String::new())
            }
            Some("up") => {
                if args.contains(&"never") {
                    for name in &selected {
                        let tag = self.service_image(&manifest, cwd, name)?;
                        if !self.images.contains_key(&normalize_tag(&tag)) {
                            return Err(format!("{name}: image {tag} not present and pull is never"));
                        }
                    }
                }
                if args.contains(&"--remove-orphans") {
                    self.running.retain(|s| manifest.service(s).is_some());
                }
                self.running.extend(selected);
                Ok(String::new())
            }
            Some("stop") | Some("rm") => {
                for name in &selected {
                    self.running.remove(name);
                }
                Ok(String::new())
            }
            Some("down") => {
                self.running.clear();
                Ok(String::new())
            }
            other => Err(format!("fake compose: unsupported {other:?}")),
        }
    }
}

fn split_tag(tag: &str) -> (&str, &str) {
    match tag.rfind(':') {
        Some(i) if !tag[i..].contains('/') => (&tag[..i], &tag[i + 1..]),
        _ => (tag, "latest"),
    }
}

/// Split a shell command into words, honoring single quotes and backslashes.
fn words(segment: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[async_trait]
impl RemoteExecutor for FakeRemote {
    async fn run(&self, command: &str) -> ssh::Result<CommandOutput> {
        Ok(self.host.lock().unwrap().run_chain(command))
    }

    async fn write_file(&self, contents: &[u8], remote_path: &str) -> ssh::Result<()> {
        let mut host = self.host.lock().unwrap();
        host.log.push(format!("write {remote_path}"));
        if !host.parent_exists(remote_path) {
            return Err(ssh::Error::TransferFailed(format!(
                "{remote_path}: No such file or directory"
            )));
        }
        host.writable(remote_path, false)
            .map_err(ssh::Error::TransferFailed)?;
        host.files.insert(remote_path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn read_file(&self, remote_path: &str) -> ssh::Result<Vec<u8>> {
        self.host
            .lock()
            .unwrap()
            .read(remote_path)
            .map_err(ssh::Error::CommandFailed)
    }

    async fn sync_directory(
        &self,
        local: &Path,
        remote_dir: &str,
        excludes: &[String],
    ) -> ssh::Result<()> {
        if !self.rsync {
            return Err(ssh::Error::SyncUnavailable("rsync: command not found".to_string()));
        }
        let mut host = self.host.lock().unwrap();
        host.log.push(format!("rsync {} {remote_dir}", local.display()));
        host.removable(remote_dir, false)
            .map_err(ssh::Error::CommandFailed)?;
        host.remove_tree(remote_dir);
        host.mkdir(remote_dir);

        let excludes = ExcludeSet::new(excludes);
        let walker = walkdir::WalkDir::new(local)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| {
                let relative = e.path().strip_prefix(local).unwrap_or(e.path());
                !excludes.is_excluded(relative, e.file_type().is_dir())
            });
        for entry in walker {
            let entry = entry.map_err(std::io::Error::other)?;
            let relative = entry.path().strip_prefix(local).unwrap_or(entry.path());
            let target = format!("{remote_dir}/{}", relative.to_string_lossy());
            if entry.file_type().is_dir() {
                host.mkdir(&target);
            } else {
                host.files.insert(target, std::fs::read(entry.path())?);
            }
        }
        Ok(())
    }
}
