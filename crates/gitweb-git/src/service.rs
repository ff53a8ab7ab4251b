//! Pack service descriptor.
//!
//! Maps the two smart HTTP service names onto the git subcommand that
//! serves them. Anything else is rejected before a process is spawned.

use crate::{GitError, Result};
use std::fmt;
use std::str::FromStr;

/// A git pack-protocol service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackService {
    /// `git-upload-pack`, serves fetch and clone.
    UploadPack,
    /// `git-receive-pack`, serves push.
    ReceivePack,
}

impl PackService {
    /// Resolves a service name as it appears in the URL.
    ///
    /// Both the `POST /<repo>.git/<service>` path segment and the
    /// `GET /<repo>.git/info/refs?service=<service>` query value use this.
    pub fn resolve(service_name: &str) -> Result<Self> {
        match service_name {
            "git-upload-pack" => Ok(Self::UploadPack),
            "git-receive-pack" => Ok(Self::ReceivePack),
            other => Err(GitError::UnsupportedService(other.to_string())),
        }
    }

    /// The service name, e.g. `git-upload-pack`.
    pub fn name(self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// The git subcommand, e.g. `upload-pack`.
    pub fn subcommand(self) -> &'static str {
        match self {
            Self::UploadPack => "upload-pack",
            Self::ReceivePack => "receive-pack",
        }
    }

    /// Content type of a ref advertisement response.
    pub fn advertisement_content_type(self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-advertisement",
            Self::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    /// Content type of a pack exchange response.
    pub fn result_content_type(self) -> &'static str {
        match self {
            Self::UploadPack => "application/x-git-upload-pack-result",
            Self::ReceivePack => "application/x-git-receive-pack-result",
        }
    }
}

impl FromStr for PackService {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

impl fmt::Display for PackService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_services() {
        assert_eq!(
            PackService::resolve("git-upload-pack").unwrap(),
            PackService::UploadPack
        );
        assert_eq!(
            PackService::resolve("git-receive-pack").unwrap(),
            PackService::ReceivePack
        );
    }

    #[test]
    fn test_resolve_rejects_everything_else() {
        for name in [
            "",
            "git-nonsense-pack",
            "upload-pack",
            "GIT-UPLOAD-PACK",
            "git-upload-pack ",
            "git-upload-archive",
        ] {
            match PackService::resolve(name) {
                Err(GitError::UnsupportedService(s)) => assert_eq!(s, name),
                other => panic!("expected UnsupportedService for {name:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_name_roundtrip() {
        for service in [PackService::UploadPack, PackService::ReceivePack] {
            assert_eq!(service.name().parse::<PackService>().unwrap(), service);
            assert_eq!(service.to_string(), service.name());
        }
    }

    #[test]
    fn test_content_types() {
        assert_eq!(
            PackService::UploadPack.result_content_type(),
            "application/x-git-upload-pack-result"
        );
        assert_eq!(
            PackService::ReceivePack.advertisement_content_type(),
            "application/x-git-receive-pack-advertisement"
        );
    }

    #[test]
    fn test_content_types_follow_service_name() {
        for service in [PackService::UploadPack, PackService::ReceivePack] {
            assert_eq!(
                service.advertisement_content_type(),
                format!("application/x-{}-advertisement", service.name())
            );
            assert_eq!(
                service.result_content_type(),
                format!("application/x-{}-result", service.name())
            );
        }
    }

    #[test]
    fn test_subcommand() {
        assert_eq!(PackService::UploadPack.subcommand(), "upload-pack");
        assert_eq!(PackService::ReceivePack.subcommand(), "receive-pack");
    }
}
