// ABOUTME: Classifies each service into the way it reaches the remote host.
// ABOUTME: Pull for image-only services, upload-and-build for server-side builds.

use std::fmt;

use crate::error::ValidationError;
use crate::manifest::{ComposeService, DeploymentMode, ServiceMode};

/// Where an uploaded build context comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The local working directory as it is.
    WorkdirDirect,
    /// A commit exported from version control.
    GitExport,
}

/// How one service is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStrategy {
    Pull,
    UploadBuild(SourceKind),
}

impl DeployStrategy {
    pub fn is_upload_build(&self) -> bool {
        matches!(self, DeployStrategy::UploadBuild(_))
    }
}

impl fmt::Display for DeployStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStrategy::Pull => f.write_str("pull"),
            DeployStrategy::UploadBuild(SourceKind::WorkdirDirect) => f.write_str("upload-build"),
            DeployStrategy::UploadBuild(SourceKind::GitExport) => {
                f.write_str("upload-build (git export)")
            }
        }
    }
}

/// Decide the strategy of `service`.
///
/// Depends only on the effective mode, whether a build descriptor and an
/// image are present, and whether a git export was requested.
pub fn classify(
    name: &str,
    service: &ComposeService,
    project_mode: DeploymentMode,
    git_export: bool,
) -> Result<DeployStrategy, ValidationError> {
    let mode = service.effective_mode(name, project_mode)?;

    match (&service.build, &service.image) {
        (None, None) => Err(ValidationError::NoImageOrBuild(name.to_string())),
        (None, Some(_)) => Ok(DeployStrategy::Pull),
        (Some(_), _) if mode.builds_on_server() => {
            let kind = if git_export {
                SourceKind::GitExport
            } else {
                SourceKind::WorkdirDirect
            };
            Ok(DeployStrategy::UploadBuild(kind))
        }
        // git-images services have their build replaced by a registry image.
        (Some(_), _) if mode == ServiceMode::GitImages => Ok(DeployStrategy::Pull),
        (Some(_), Some(_)) => Ok(DeployStrategy::Pull),
        (Some(_), None) => Err(ValidationError::UnsupportedBuildMode {
            service: name.to_string(),
            mode: mode.as_str().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ComposeFile;
    use proptest::prelude::*;

    fn service(yaml: &str) -> ComposeService {
        let file = ComposeFile::from_yaml(&format!("services:\n  svc:\n{yaml}")).unwrap();
        file.service("svc").unwrap().clone()
    }

    mod routing {
        use super::*;

        /// Test: an image-only service is pulled regardless of mode.
        /// Expected: Pull.
        #[test]
        fn image_only_is_pull() {
            let svc = service("    image: nginx:1.27\n");
            for mode in [DeploymentMode::DirectServerbuild, DeploymentMode::Cloud] {
                assert_eq!(classify("svc", &svc, mode, false).unwrap(), DeployStrategy::Pull);
            }
        }

        #[test]
        fn server_build_uploads() {
            let svc = service("    build: ./backend\n");
            assert_eq!(
                classify("svc", &svc, DeploymentMode::DirectServerbuild, false).unwrap(),
                DeployStrategy::UploadBuild(SourceKind::WorkdirDirect)
            );
            assert_eq!(
                classify("svc", &svc, DeploymentMode::GitManual, true).unwrap(),
                DeployStrategy::UploadBuild(SourceKind::GitExport)
            );
        }

        #[test]
        fn label_overrides_project_mode() {
            let svc = service(
                "    build: ./web\n    image: acme/web:1\n    labels:\n      - scion.mode=cloud\n",
            );
            assert_eq!(
                classify("svc", &svc, DeploymentMode::DirectServerbuild, false).unwrap(),
                DeployStrategy::Pull
            );
        }

        #[test]
        fn git_images_build_is_pull() {
            let svc = service("    build: ./api\n");
            assert_eq!(
                classify("svc", &svc, DeploymentMode::GitImages, false).unwrap(),
                DeployStrategy::Pull
            );
        }
    }

    mod rejection {
        use super::*;

        #[test]
        fn neither_image_nor_build() {
            let svc = service("    ports: [\"80:80\"]\n");
            assert!(matches!(
                classify("svc", &svc, DeploymentMode::DirectServerbuild, false),
                Err(ValidationError::NoImageOrBuild(_))
            ));
        }

        /// Test: a build-only service under a local-build mode.
        /// Expected: UnsupportedBuildMode naming the mode.
        #[test]
        fn local_build_mode() {
            let svc = service("    build: ./api\n");
            let err = classify("svc", &svc, DeploymentMode::DirectLocalbuild, false).unwrap_err();
            assert!(
                matches!(err, ValidationError::UnsupportedBuildMode { ref mode, .. } if mode == "localbuild")
            );
        }

        #[test]
        fn unknown_label() {
            let svc = service("    image: x\n    labels:\n      scion.mode: sideways\n");
            assert!(matches!(
                classify("svc", &svc, DeploymentMode::DirectServerbuild, false),
                Err(ValidationError::UnknownMode { .. })
            ));
        }
    }

    fn arb_mode() -> impl Strategy<Value = DeploymentMode> {
        prop_oneof![
            Just(DeploymentMode::GitImages),
            Just(DeploymentMode::GitRepoServerbuild),
            Just(DeploymentMode::GitManual),
            Just(DeploymentMode::DirectServerbuild),
            Just(DeploymentMode::DirectLocalbuild),
            Just(DeploymentMode::Cloud),
        ]
    }

    proptest! {
        /// The same inputs always give the same strategy.
        #[test]
        fn classification_is_deterministic(
            mode in arb_mode(),
            has_build in any::<bool>(),
            has_image in any::<bool>(),
            git in any::<bool>(),
        ) {
            let mut yaml = String::from("    restart: always\n");
            if has_build {
                yaml.push_str("    build: ./ctx\n");
            }
            if has_image {
                yaml.push_str("    image: acme/ctx:1\n");
            }
            let svc = service(&yaml);
            let first = classify("svc", &svc, mode, git).map_err(|e| e.to_string());
            let second = classify("svc", &svc, mode, git).map_err(|e| e.to_string());
            prop_assert_eq!(first, second);
        }
    }
}
