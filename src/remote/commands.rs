// ABOUTME: Builders for the docker and docker compose command lines run remotely.
// ABOUTME: Every interpolated value is shell-quoted; sudo is applied per environment.

use super::shell::shell_quote;

fn sudo_prefix(sudo: bool) -> &'static str {
    if sudo { "sudo " } else { "" }
}

/// `docker compose` invocations inside a project directory.
#[derive(Debug, Clone)]
pub struct Compose {
    dir: String,
    sudo: bool,
}

impl Compose {
    pub fn new(dir: impl Into<String>, sudo: bool) -> Self {
        Self {
            dir: dir.into(),
            sudo,
        }
    }

    fn command(&self, args: &str) -> String {
        format!(
            "cd {} && {}docker compose {}",
            shell_quote(&self.dir),
            sudo_prefix(self.sudo),
            args
        )
    }

    pub fn stop_remove(&self, service: &str) -> String {
        let service = shell_quote(service);
        format!(
            "{} && {}docker compose rm -f {}",
            self.command(&format!("stop {service}")),
            sudo_prefix(self.sudo),
            service
        )
    }

    pub fn pull(&self, service: &str) -> String {
        self.command(&format!("pull {}", shell_quote(service)))
    }

    pub fn build(&self, service: &str, no_cache: bool) -> String {
        let flag = if no_cache { "--no-cache " } else { "" };
        self.command(&format!("build {flag}{}", shell_quote(service)))
    }

    pub fn up_service(&self, service: &str) -> String {
        self.command(&format!("up -d {}", shell_quote(service)))
    }

    /// Start everything and drop containers of services no longer in the manifest.
    pub fn up_all(&self) -> String {
        self.command("up -d --remove-orphans")
    }

    pub fn down(&self) -> String {
        self.command("down")
    }

    /// Image tags referenced by the manifest, optionally for one service.
    pub fn config_images(&self, service: Option<&str>) -> String {
        match service {
            Some(service) => self.command(&format!("config --images {}", shell_quote(service))),
            None => self.command("config --images"),
        }
    }

    /// Start everything from locally present images only.
    pub fn up_all_offline(&self) -> String {
        self.command("up -d --remove-orphans --pull never")
    }

    pub fn up_service_offline(&self, service: &str) -> String {
        self.command(&format!("up -d --pull never {}", shell_quote(service)))
    }
}

/// Plain `docker` invocations.
#[derive(Debug, Clone, Copy)]
pub struct Docker {
    sudo: bool,
}

impl Docker {
    pub fn new(sudo: bool) -> Self {
        Self { sudo }
    }

    fn command(&self, args: &str) -> String {
        format!("{}docker {}", sudo_prefix(self.sudo), args)
    }

    pub fn prune_images(&self) -> String {
        self.command("image prune -f")
    }

    pub fn prune_build_cache(&self) -> String {
        self.command("builder prune -f")
    }

    /// One JSON record per local image.
    pub fn list_images(&self) -> String {
        self.command("image ls --no-trunc --format '{{json .}}'")
    }

    pub fn save_compressed(&self, tag: &str, archive: &str) -> String {
        format!(
            "{} | gzip > {}",
            self.command(&format!("save {}", shell_quote(tag))),
            shell_quote(archive)
        )
    }

    pub fn load(&self, archive: &str) -> String {
        self.command(&format!("load -i {}", shell_quote(archive)))
    }

    pub fn remove_image(&self, tag: &str) -> String {
        self.command(&format!("rmi -f {}", shell_quote(tag)))
    }

    pub fn tag(&self, source: &str, target: &str) -> String {
        self.command(&format!("tag {} {}", shell_quote(source), shell_quote(target)))
    }
}

/// Shell file operations.
pub mod fs {
    use super::{shell_quote, sudo_prefix};

    /// Create directories; with sudo the result is handed back to the login user.
    pub fn mkdir(dirs: &[&str], sudo: bool) -> String {
        let quoted: Vec<String> = dirs.iter().map(|d| shell_quote(d)).collect();
        let quoted = quoted.join(" ");
        if sudo {
            format!(
                "{}mkdir -p {quoted} && {}chown -R $(id -u):$(id -g) {quoted}",
                sudo_prefix(true),
                sudo_prefix(true)
            )
        } else {
            format!("mkdir -p {quoted}")
        }
    }

    /// Remove a tree that may sit inside a directory created with sudo.
    pub fn remove_dir(dir: &str, sudo: bool) -> String {
        format!("{}rm -rf {}", sudo_prefix(sudo), shell_quote(dir))
    }

    pub fn remove_file(path: &str) -> String {
        format!("rm -f {}", shell_quote(path))
    }

    pub fn copy_file(from: &str, to: &str) -> String {
        format!("cp {} {}", shell_quote(from), shell_quote(to))
    }

    /// Copy the contents of `from` into the existing directory `to`, overwriting same-named files.
    pub fn copy_contents(from: &str, to: &str) -> String {
        format!(
            "cp -r {} {}",
            shell_quote(&format!("{}/.", from.trim_end_matches('/'))),
            shell_quote(to)
        )
    }

    /// Replace `to` with a recursive copy of `from`.
    pub fn replace_dir(from: &str, to: &str) -> String {
        format!(
            "rm -rf {to} && cp -r {from} {to}",
            from = shell_quote(from),
            to = shell_quote(to)
        )
    }

    pub fn is_file(path: &str) -> String {
        format!("test -f {}", shell_quote(path))
    }

    pub fn is_dir(path: &str) -> String {
        format!("test -d {}", shell_quote(path))
    }

    pub fn exists(path: &str) -> String {
        format!("test -e {}", shell_quote(path))
    }

    pub fn list(dir: &str) -> String {
        format!("ls -1 {}", shell_quote(dir))
    }

    /// Wipe `dir` and unpack a gzipped tarball into it, deleting the tarball.
    pub fn extract_replace(archive: &str, dir: &str) -> String {
        format!(
            "rm -rf {dir} && mkdir -p {dir} && tar -xzf {archive} -C {dir} && rm -f {archive}",
            dir = shell_quote(dir),
            archive = shell_quote(archive)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_commands_run_in_project_dir() {
        let compose = Compose::new("/opt/scion/projects/shop-prod", false);
        assert_eq!(
            compose.pull("web"),
            "cd '/opt/scion/projects/shop-prod' && docker compose pull 'web'"
        );
        assert_eq!(
            compose.stop_remove("web"),
            "cd '/opt/scion/projects/shop-prod' && docker compose stop 'web' && docker compose rm -f 'web'"
        );
        assert_eq!(
            compose.build("api", true),
            "cd '/opt/scion/projects/shop-prod' && docker compose build --no-cache 'api'"
        );
    }

    #[test]
    fn sudo_prefixes_every_docker_call() {
        let compose = Compose::new("/p", true);
        assert_eq!(
            compose.stop_remove("web"),
            "cd '/p' && sudo docker compose stop 'web' && sudo docker compose rm -f 'web'"
        );
        assert_eq!(
            Docker::new(true).save_compressed("app:1", "/b/app_1.tar.gz"),
            "sudo docker save 'app:1' | gzip > '/b/app_1.tar.gz'"
        );
    }

    #[test]
    fn offline_restarts_never_pull() {
        let compose = Compose::new("/p", false);
        assert!(compose.up_all_offline().ends_with("up -d --remove-orphans --pull never"));
        assert!(compose.up_service_offline("api").ends_with("up -d --pull never 'api'"));
    }

    #[test]
    fn mkdir_with_sudo_chowns() {
        assert_eq!(fs::mkdir(&["/a", "/b"], false), "mkdir -p '/a' '/b'");
        assert_eq!(
            fs::mkdir(&["/a"], true),
            "sudo mkdir -p '/a' && sudo chown -R $(id -u):$(id -g) '/a'"
        );
    }

    #[test]
    fn remove_dir_follows_sudo() {
        assert_eq!(fs::remove_dir("/b/1", false), "rm -rf '/b/1'");
        assert_eq!(fs::remove_dir("/b/1", true), "sudo rm -rf '/b/1'");
    }

    #[test]
    fn copy_contents_overlays_target() {
        assert_eq!(
            fs::copy_contents("/b/1/compose/env/", "/p/env"),
            "cp -r '/b/1/compose/env/.' '/p/env'"
        );
    }

    #[test]
    fn extract_replace_wipes_target() {
        assert_eq!(
            fs::extract_replace("/tmp/api.tar.gz", "/p/api"),
            "rm -rf '/p/api' && mkdir -p '/p/api' && tar -xzf '/tmp/api.tar.gz' -C '/p/api' && rm -f '/tmp/api.tar.gz'"
        );
    }
}
