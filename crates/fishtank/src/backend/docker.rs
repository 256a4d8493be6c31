//! Docker CLI implementation of [`ContainerBackend`].
//!
//! Commands are executed through `tokio::process`; argv construction and
//! output parsing are factored into pure helpers so they can be tested
//! without a docker daemon.

use async_trait::async_trait;
use color_eyre::eyre;
use serde::Deserialize;
use tracing::debug;

use super::{
    ContainerBackend, ContainerDetails, ContainerInfo, CreateNetworkOptions, ListOptions,
    PortMappings, RemoveNetworkOptions, RemoveOptions, RunOptions,
};
use crate::error::CommandError;

const DEFAULT_EXECUTABLE: &str = "docker";

pub struct Docker {
    executable: String,
}

impl Default for Docker {
    fn default() -> Self {
        Self::new()
    }
}

impl Docker {
    pub fn new() -> Self {
        Self { executable: DEFAULT_EXECUTABLE.to_string() }
    }

    pub fn with_executable(executable: impl Into<String>) -> Self {
        Self { executable: executable.into() }
    }

    async fn cmd(&self, args: &[String]) -> eyre::Result<String> {
        debug!(executable = %self.executable, ?args, "running container runtime command");

        let output = tokio::process::Command::new(&self.executable)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                eyre::eyre!("failed to execute `{}`: {e}", self.executable)
            })?;

        if !output.status.success() {
            return Err(CommandError {
                command: format!("{} {}", self.executable, args.join(" ")),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ContainerBackend for Docker {
    async fn create_network(
        &self,
        name: &str,
        options: &CreateNetworkOptions,
    ) -> eyre::Result<()> {
        self.cmd(&create_network_args(name, options)).await?;
        Ok(())
    }

    async fn run_detached(&self, image: &str, options: &RunOptions) -> eyre::Result<()> {
        self.cmd(&run_args(image, options)).await?;
        Ok(())
    }

    async fn inspect(&self, name: &str) -> eyre::Result<ContainerInfo> {
        let stdout = self.cmd(&inspect_args(name)).await?;
        parse_inspect_output(&stdout)
    }

    async fn list(&self, options: &ListOptions) -> eyre::Result<Vec<ContainerDetails>> {
        let stdout = self.cmd(&list_args(options)).await?;
        parse_ps_output(&stdout)
    }

    async fn remove(&self, names: &[String], options: &RemoveOptions) -> eyre::Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        self.cmd(&remove_args(names, options)).await?;
        Ok(())
    }

    async fn remove_networks(
        &self,
        names: &[String],
        options: &RemoveNetworkOptions,
    ) -> eyre::Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        self.cmd(&remove_network_args(names, options)).await?;
        Ok(())
    }
}

fn create_network_args(name: &str, options: &CreateNetworkOptions) -> Vec<String> {
    let mut args = vec!["network".to_string(), "create".to_string()];
    args.push("--driver".to_string());
    args.push("bridge".to_string());
    if options.attachable {
        args.push("--attachable".to_string());
    }
    if options.internal {
        args.push("--internal".to_string());
    }
    for (key, value) in &options.labels {
        args.push("--label".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(name.to_string());
    args
}

fn run_args(image: &str, options: &RunOptions) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--quiet".to_string(), "--detach".to_string()];
    if let Some(name) = &options.name {
        args.push("--name".to_string());
        args.push(name.clone());
    }
    if let Some(hostname) = &options.hostname {
        args.push("--hostname".to_string());
        args.push(hostname.clone());
    }
    for network in &options.networks {
        args.push("--network".to_string());
        args.push(network.clone());
    }
    for port in &options.ports {
        // Publishing without a host port lets the runtime pick an ephemeral
        // one; the engine discovers it later through `inspect`.
        args.push("--publish".to_string());
        args.push(port.to_string());
    }
    for (host, container) in &options.volumes {
        args.push("--volume".to_string());
        args.push(format!("{}:{container}", host.display()));
    }
    for (key, value) in &options.labels {
        args.push("--label".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(image.to_string());
    args.extend(options.args.iter().cloned());
    args
}

fn inspect_args(name: &str) -> Vec<String> {
    vec![
        "inspect".to_string(),
        "--type".to_string(),
        "container".to_string(),
        name.to_string(),
    ]
}

fn list_args(options: &ListOptions) -> Vec<String> {
    let mut args = vec![
        "ps".to_string(),
        "--no-trunc".to_string(),
        "--all".to_string(),
        "--format=json".to_string(),
    ];
    for (key, value) in &options.labels {
        args.push("--filter".to_string());
        args.push(format!("label={key}={value}"));
    }
    args
}

fn remove_args(names: &[String], options: &RemoveOptions) -> Vec<String> {
    let mut args = vec!["rm".to_string()];
    if options.force {
        args.push("--force".to_string());
    }
    if options.volumes {
        args.push("--volumes".to_string());
    }
    args.extend(names.iter().cloned());
    args
}

fn remove_network_args(names: &[String], options: &RemoveNetworkOptions) -> Vec<String> {
    let mut args = vec!["network".to_string(), "remove".to_string()];
    if options.force {
        args.push("--force".to_string());
    }
    args.extend(names.iter().cloned());
    args
}

/// One line of `docker ps --format=json` output.
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image")]
    image: String,
}

fn parse_ps_output(stdout: &str) -> eyre::Result<Vec<ContainerDetails>> {
    let mut containers = Vec::new();
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: PsEntry = serde_json::from_str(line)
            .map_err(|e| eyre::eyre!("unparseable `docker ps` line {line:?}: {e}"))?;
        containers.push(ContainerDetails { id: entry.id, name: entry.names, image: entry.image });
    }
    Ok(containers)
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Config")]
    config: InspectConfig,
    #[serde(rename = "NetworkSettings")]
    network_settings: InspectNetworkSettings,
}

#[derive(Debug, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Image")]
    image: String,
}

#[derive(Debug, Deserialize)]
struct InspectNetworkSettings {
    #[serde(rename = "Ports", default)]
    ports: std::collections::BTreeMap<String, Option<Vec<PortBinding>>>,
}

#[derive(Debug, Deserialize)]
struct PortBinding {
    #[serde(rename = "HostPort")]
    host_port: String,
}

fn parse_inspect_output(stdout: &str) -> eyre::Result<ContainerInfo> {
    let entries: Vec<InspectEntry> = serde_json::from_str(stdout)
        .map_err(|e| eyre::eyre!("unparseable `docker inspect` output: {e}"))?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| eyre::eyre!("`docker inspect` returned no entries"))?;

    let mut ports = PortMappings::default();
    for (key, bindings) in entry.network_settings.ports {
        // Keys look like "8020/tcp"; unpublished ports have no bindings.
        let Some((port, protocol)) = key.split_once('/') else {
            continue;
        };
        let Ok(container_port) = port.parse::<u16>() else {
            continue;
        };
        let Some(host_port) = bindings
            .iter()
            .flatten()
            .find_map(|binding| binding.host_port.parse::<u16>().ok())
        else {
            continue;
        };
        match protocol {
            "tcp" => {
                ports.tcp.insert(container_port, host_port);
            }
            "udp" => {
                ports.udp.insert(container_port, host_port);
            }
            _ => {}
        }
    }

    Ok(ContainerInfo {
        id: entry.id,
        // `docker inspect` reports names with a leading slash.
        name: entry.name.trim_start_matches('/').to_string(),
        image: entry.config.image,
        ports,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::backend::Labels;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn create_network_args_include_flags_and_labels() {
        let options = CreateNetworkOptions {
            attachable: true,
            internal: true,
            labels: labels(&[("fishtank.cluster", "test-1")]),
        };
        assert_eq!(
            create_network_args("test-1", &options),
            [
                "network",
                "create",
                "--driver",
                "bridge",
                "--attachable",
                "--internal",
                "--label",
                "fishtank.cluster=test-1",
                "test-1",
            ]
        );
    }

    #[test]
    fn run_args_place_image_before_entrypoint_args() {
        let options = RunOptions {
            name: Some("test-1_a".to_string()),
            hostname: Some("a".to_string()),
            networks: vec!["test-1".to_string()],
            ports: vec![8020],
            volumes: vec![(PathBuf::from("/tmp/fishtank/test-1/a"), "/root/.ironfish".to_string())],
            labels: labels(&[("fishtank.cluster", "test-1")]),
            args: vec!["start".to_string()],
        };
        assert_eq!(
            run_args("ironfish:latest", &options),
            [
                "run",
                "--quiet",
                "--detach",
                "--name",
                "test-1_a",
                "--hostname",
                "a",
                "--network",
                "test-1",
                "--publish",
                "8020",
                "--volume",
                "/tmp/fishtank/test-1/a:/root/.ironfish",
                "--label",
                "fishtank.cluster=test-1",
                "ironfish:latest",
                "start",
            ]
        );
    }

    #[test]
    fn list_args_filter_by_label() {
        let options = ListOptions { labels: labels(&[("fishtank.cluster", "test-1")]) };
        assert_eq!(
            list_args(&options),
            ["ps", "--no-trunc", "--all", "--format=json", "--filter", "label=fishtank.cluster=test-1"]
        );
    }

    #[test]
    fn remove_args_include_force_and_volumes() {
        let names = vec!["test-1_a".to_string(), "test-1_b".to_string()];
        assert_eq!(
            remove_args(&names, &RemoveOptions { force: true, volumes: true }),
            ["rm", "--force", "--volumes", "test-1_a", "test-1_b"]
        );
        assert_eq!(
            remove_network_args(&names[..1].to_vec(), &RemoveNetworkOptions { force: true }),
            ["network", "remove", "--force", "test-1_a"]
        );
    }

    #[tokio::test]
    async fn remove_with_no_targets_never_invokes_the_runtime() {
        // The executable does not exist; any invocation would fail loudly.
        let docker = Docker::with_executable("fishtank-test-no-such-binary");
        docker.remove(&[], &RemoveOptions { force: true, volumes: true }).await.unwrap();
        docker
            .remove_networks(&[], &RemoveNetworkOptions { force: true })
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_failures_carry_exit_code_and_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-docker");
        std::fs::write(&script, "#!/bin/sh\necho 'No such container: missing' >&2\nexit 1\n")
            .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let docker = Docker::with_executable(script.display().to_string());
        let err = docker.inspect("missing").await.unwrap_err();
        let command = err.downcast_ref::<CommandError>().expect("CommandError");
        assert_eq!(command.exit_code, Some(1));
        assert!(command.stderr.contains("No such container"));
    }

    #[test]
    fn parses_ps_json_lines() {
        let stdout = concat!(
            r#"{"ID":"aaaa","Names":"test-1_bootstrap","Image":"ironfish:latest"}"#,
            "\n",
            r#"{"ID":"bbbb","Names":"test-1_a","Image":"ironfish:latest"}"#,
            "\n",
        );
        let containers = parse_ps_output(stdout).unwrap();
        assert_eq!(
            containers,
            vec![
                ContainerDetails {
                    id: "aaaa".to_string(),
                    name: "test-1_bootstrap".to_string(),
                    image: "ironfish:latest".to_string(),
                },
                ContainerDetails {
                    id: "bbbb".to_string(),
                    name: "test-1_a".to_string(),
                    image: "ironfish:latest".to_string(),
                },
            ]
        );
    }

    #[test]
    fn parses_inspect_port_bindings() {
        let stdout = r#"[
          {
            "Id": "aaaa",
            "Name": "/test-1_a",
            "Config": { "Image": "ironfish:latest" },
            "NetworkSettings": {
              "Ports": {
                "8020/tcp": [{ "HostIp": "0.0.0.0", "HostPort": "49153" }],
                "9033/tcp": null
              }
            }
          }
        ]"#;
        let info = parse_inspect_output(stdout).unwrap();
        assert_eq!(info.name, "test-1_a");
        assert_eq!(info.image, "ironfish:latest");
        assert_eq!(info.ports.tcp.get(&8020), Some(&49153));
        assert!(!info.ports.tcp.contains_key(&9033));
    }
}
