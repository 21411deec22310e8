// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Container engine command builders.
//!
//! The orchestrator never talks to an engine API directly; it asks a
//! [`ContainerEngine`] for a ready-to-spawn command and drives the process
//! itself. Tests substitute an engine that emits plain shell commands.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::process::Command;

/// Parameters of one image build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Build context directory.
    pub context: PathBuf,
    /// Dockerfile name, relative to the context.
    pub dockerfile: String,
    pub tag: String,
}

/// One `--ulimit` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ulimit {
    pub name: &'static str,
    pub soft: u64,
    pub hard: u64,
}

impl Ulimit {
    pub fn new(name: &'static str, limit: u64) -> Self {
        Self {
            name,
            soft: limit,
            hard: limit,
        }
    }
}

/// Parameters of one container launch.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub image: String,
    pub name: Option<String>,
    pub network: Option<String>,
    /// `host -> address` entries added to the container's hosts file.
    pub extra_hosts: Vec<(String, String)>,
    pub ulimits: Vec<Ulimit>,
    pub sysctls: Vec<(String, String)>,
    pub environment: BTreeMap<String, String>,
    pub privileged: bool,
    pub init: bool,
    pub detach: bool,
    /// Remove the container once it exits.
    pub remove: bool,
    pub command: Vec<String>,
}

/// Source of container engine commands.
///
/// Every method returns an unspawned command; stdio wiring and waiting are
/// up to the caller.
pub trait ContainerEngine: Send + Sync {
    /// Build an image; output is a stream of JSON or plain-text lines.
    fn build(&self, request: &BuildRequest) -> Command;

    /// Start a container. In detached mode stdout carries the container id.
    fn run(&self, request: &RunRequest) -> Command;

    /// Follow a container's combined output until it exits.
    fn logs(&self, container_id: &str) -> Command;

    fn kill(&self, container_id: &str) -> Command;

    /// Exit status tells whether the container is still known.
    fn inspect(&self, container_id: &str) -> Command;

    /// Running containers, one `<id> <image>` pair per line.
    fn running_containers(&self) -> Command;

    /// Local images, one `<id> <repository>:<tag>` pair per line.
    fn images(&self) -> Command;

    fn remove_image(&self, image_id: &str) -> Command;

    /// Remove dangling images.
    fn prune_images(&self) -> Command;
}

/// The `docker` command-line client pointed at one engine address.
#[derive(Debug, Clone)]
pub struct DockerCli {
    host: String,
}

impl DockerCli {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    fn docker(&self) -> Command {
        let mut cmd = Command::new("docker");
        cmd.arg("-H").arg(&self.host);
        cmd
    }

    /// Arguments of `docker run` for `request`, without the leading `docker -H`.
    pub fn run_args(request: &RunRequest) -> Vec<String> {
        let mut args = vec!["run".to_string()];

        if request.detach {
            args.push("--detach".to_string());
        }
        if request.init {
            args.push("--init".to_string());
        }
        if request.privileged {
            args.push("--privileged".to_string());
        }
        if request.remove {
            args.push("--rm".to_string());
        }
        if let Some(name) = &request.name {
            args.push(format!("--name={}", name));
        }
        if let Some(network) = &request.network {
            args.push(format!("--network={}", network));
        }
        for (host, address) in &request.extra_hosts {
            args.push(format!("--add-host={}:{}", host, address));
        }
        for ulimit in &request.ulimits {
            args.push(format!(
                "--ulimit={}={}:{}",
                ulimit.name, ulimit.soft, ulimit.hard
            ));
        }
        for (key, value) in &request.sysctls {
            args.push(format!("--sysctl={}={}", key, value));
        }
        for (key, value) in &request.environment {
            args.push("--env".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(request.image.clone());
        args.extend(request.command.iter().cloned());
        args
    }
}

impl ContainerEngine for DockerCli {
    fn build(&self, request: &BuildRequest) -> Command {
        let mut cmd = self.docker();
        // The legacy builder prints `Step N/M` progress lines.
        cmd.env("DOCKER_BUILDKIT", "0")
            .arg("build")
            .arg("--pull")
            .arg("--force-rm")
            .arg("-f")
            .arg(request.context.join(&request.dockerfile))
            .arg("-t")
            .arg(&request.tag)
            .arg(&request.context);
        cmd
    }

    fn run(&self, request: &RunRequest) -> Command {
        let mut cmd = self.docker();
        cmd.args(Self::run_args(request));
        cmd
    }

    fn logs(&self, container_id: &str) -> Command {
        let mut cmd = self.docker();
        cmd.args(["logs", "--follow", container_id]);
        cmd
    }

    fn kill(&self, container_id: &str) -> Command {
        let mut cmd = self.docker();
        cmd.args(["kill", container_id]);
        cmd
    }

    fn inspect(&self, container_id: &str) -> Command {
        let mut cmd = self.docker();
        cmd.args(["inspect", "--type", "container", container_id]);
        cmd
    }

    fn running_containers(&self) -> Command {
        let mut cmd = self.docker();
        cmd.args(["ps", "--format", "{{.ID}} {{.Image}}"]);
        cmd
    }

    fn images(&self) -> Command {
        let mut cmd = self.docker();
        cmd.args(["images", "--format", "{{.ID}} {{.Repository}}:{{.Tag}}"]);
        cmd
    }

    fn remove_image(&self, image_id: &str) -> Command {
        let mut cmd = self.docker();
        cmd.args(["rmi", "--force", image_id]);
        cmd
    }

    fn prune_images(&self) -> Command {
        let mut cmd = self.docker();
        cmd.args(["image", "prune", "--force"]);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let mut environment = BTreeMap::new();
        environment.insert("name".to_string(), "jekyll".to_string());

        let request = RunRequest {
            image: "ns/ssgberk.test.jekyll".to_string(),
            name: Some("ssgberk-server".to_string()),
            network: Some("ssgberk".to_string()),
            extra_hosts: vec![("ssgberk-server".to_string(), "10.0.0.1".to_string())],
            ulimits: vec![Ulimit::new("nofile", 200000)],
            sysctls: vec![("net.core.somaxconn".to_string(), "65535".to_string())],
            environment,
            privileged: true,
            init: true,
            detach: true,
            remove: true,
            command: vec!["/bin/bash".to_string(), "/build.sh".to_string()],
        };

        let args = DockerCli::run_args(&request);
        assert_eq!(args[0], "run");
        for flag in [
            "--detach",
            "--init",
            "--privileged",
            "--rm",
            "--name=ssgberk-server",
            "--network=ssgberk",
            "--add-host=ssgberk-server:10.0.0.1",
            "--ulimit=nofile=200000:200000",
            "--sysctl=net.core.somaxconn=65535",
            "name=jekyll",
        ] {
            assert!(args.iter().any(|a| a == flag), "missing {flag}");
        }

        let image = args.iter().position(|a| a == "ns/ssgberk.test.jekyll").unwrap();
        assert_eq!(&args[image + 1..], &["/bin/bash", "/build.sh"]);
    }

    #[test]
    fn test_minimal_run_args() {
        let request = RunRequest {
            image: "alpine".to_string(),
            ..Default::default()
        };
        assert_eq!(DockerCli::run_args(&request), vec!["run", "alpine"]);
    }
}
