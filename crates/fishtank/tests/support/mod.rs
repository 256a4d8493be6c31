//! Shared test doubles: a recording container backend and a scripted TCP
//! RPC server speaking the node's socket protocol.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::eyre::{self, eyre};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use fishtank::{
    CommandError, ContainerBackend, ContainerDetails, ContainerInfo, CreateNetworkOptions,
    ListOptions, PortMappings, RemoveNetworkOptions, RemoveOptions, RunOptions,
};

/// Every invocation a [`MockBackend`] has received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateNetwork { name: String, options: CreateNetworkOptions },
    RunDetached { image: String, options: RunOptions },
    Inspect { name: String },
    List { options: ListOptions },
    Remove { names: Vec<String>, options: RemoveOptions },
    RemoveNetworks { names: Vec<String>, options: RemoveNetworkOptions },
}

/// A container backend that records every call and replays scripted results.
///
/// `list` results are consumed front to back, with the final script entry
/// repeating once the queue runs dry; an unscripted `list` reports no
/// containers. `inspect` answers from a name-keyed table and fails for
/// unknown names, like the real backend does. `create_network` and
/// `run_detached` can be scripted to fail for a given resource name with a
/// [`CommandError`], mirroring how the runtime rejects duplicates.
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
    list_results: Mutex<VecDeque<Vec<ContainerDetails>>>,
    inspect_results: Mutex<HashMap<String, ContainerInfo>>,
    network_failures: Mutex<HashMap<String, String>>,
    run_failures: Mutex<HashMap<String, String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().await.clone()
    }

    pub async fn script_list(&self, containers: Vec<ContainerDetails>) {
        self.list_results.lock().await.push_back(containers);
    }

    pub async fn script_inspect(&self, info: ContainerInfo) {
        self.inspect_results.lock().await.insert(info.name.clone(), info);
    }

    /// Make `create_network` for `name` fail with `stderr`.
    pub async fn fail_create_network(&self, name: &str, stderr: &str) {
        self.network_failures.lock().await.insert(name.to_string(), stderr.to_string());
    }

    /// Make `run_detached` for the container `name` fail with `stderr`.
    pub async fn fail_run_detached(&self, name: &str, stderr: &str) {
        self.run_failures.lock().await.insert(name.to_string(), stderr.to_string());
    }

    async fn record(&self, call: BackendCall) {
        self.calls.lock().await.push(call);
    }
}

fn command_failure(command: String, stderr: String) -> color_eyre::eyre::Report {
    CommandError { command, exit_code: Some(1), stdout: String::new(), stderr }.into()
}

#[async_trait]
impl ContainerBackend for MockBackend {
    async fn create_network(
        &self,
        name: &str,
        options: &CreateNetworkOptions,
    ) -> eyre::Result<()> {
        self.record(BackendCall::CreateNetwork {
            name: name.to_string(),
            options: options.clone(),
        })
        .await;
        if let Some(stderr) = self.network_failures.lock().await.get(name) {
            return Err(command_failure(format!("docker network create {name}"), stderr.clone()));
        }
        Ok(())
    }

    async fn run_detached(&self, image: &str, options: &RunOptions) -> eyre::Result<()> {
        self.record(BackendCall::RunDetached {
            image: image.to_string(),
            options: options.clone(),
        })
        .await;
        if let Some(name) = &options.name {
            if let Some(stderr) = self.run_failures.lock().await.get(name) {
                return Err(command_failure(format!("docker run {name}"), stderr.clone()));
            }
        }
        Ok(())
    }

    async fn inspect(&self, name: &str) -> eyre::Result<ContainerInfo> {
        self.record(BackendCall::Inspect { name: name.to_string() }).await;
        self.inspect_results
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| eyre!("no such container: {name}"))
    }

    async fn list(&self, options: &ListOptions) -> eyre::Result<Vec<ContainerDetails>> {
        self.record(BackendCall::List { options: options.clone() }).await;
        let mut results = self.list_results.lock().await;
        Ok(match results.len() {
            0 => Vec::new(),
            1 => results.front().cloned().unwrap_or_default(),
            _ => results.pop_front().unwrap_or_default(),
        })
    }

    async fn remove(&self, names: &[String], options: &RemoveOptions) -> eyre::Result<()> {
        self.record(BackendCall::Remove { names: names.to_vec(), options: *options }).await;
        Ok(())
    }

    async fn remove_networks(
        &self,
        names: &[String],
        options: &RemoveNetworkOptions,
    ) -> eyre::Result<()> {
        self.record(BackendCall::RemoveNetworks {
            names: names.to_vec(),
            options: *options,
        })
        .await;
        Ok(())
    }
}

/// An inspect result publishing the node RPC port on `host_port`, shaped the
/// way [`MockBackend::inspect`] expects to serve it.
pub fn inspect_with_rpc_port(name: &str, image: &str, host_port: u16) -> ContainerInfo {
    let mut ports = PortMappings::default();
    ports.tcp.insert(8020, host_port);
    ContainerInfo {
        id: format!("{name}-id"),
        name: name.to_string(),
        image: image.to_string(),
        ports,
    }
}

pub fn container(name: &str) -> ContainerDetails {
    ContainerDetails {
        id: format!("{name}-id"),
        name: name.to_string(),
        image: "ironfish:test".to_string(),
    }
}

const MESSAGE_DELIMITER: u8 = b'\x0c';

struct RpcScript {
    responses: Mutex<HashMap<String, VecDeque<(u16, Value)>>>,
    served: Mutex<Vec<String>>,
}

/// An in-process TCP server speaking the node's form-feed-delimited RPC
/// protocol, replaying scripted responses per route.
///
/// Responses for a route are consumed in order; the last one repeats forever,
/// which lets polling clients observe a progression that settles on a final
/// state. Unscripted routes answer with status 500.
pub struct ScriptedRpc {
    addr: SocketAddr,
    script: Arc<RpcScript>,
}

impl ScriptedRpc {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind scripted rpc");
        let addr = listener.local_addr().expect("scripted rpc addr");
        let script = Arc::new(RpcScript {
            responses: Mutex::new(HashMap::new()),
            served: Mutex::new(Vec::new()),
        });

        let accept_script = Arc::clone(&script);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, Arc::clone(&accept_script)));
            }
        });

        Self { addr, script }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Queue a response for `route`.
    pub async fn script(&self, route: &str, status: u16, data: Value) {
        self.script
            .responses
            .lock()
            .await
            .entry(route.to_string())
            .or_default()
            .push_back((status, data));
    }

    /// Routes served so far, in request order.
    pub async fn served_routes(&self) -> Vec<String> {
        self.script.served.lock().await.clone()
    }
}

async fn serve_connection(stream: TcpStream, script: Arc<RpcScript>) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    loop {
        let mut buf = Vec::new();
        match reader.read_until(MESSAGE_DELIMITER, &mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        if buf.last() == Some(&MESSAGE_DELIMITER) {
            buf.pop();
        }

        let request: Value = match serde_json::from_slice(&buf) {
            Ok(request) => request,
            Err(_) => return,
        };
        let mid = request["data"]["mid"].as_u64().unwrap_or(0);
        let route = request["data"]["type"].as_str().unwrap_or_default().to_string();

        let (status, data) = {
            let mut responses = script.responses.lock().await;
            match responses.get_mut(&route) {
                Some(queue) if queue.len() > 1 => queue.pop_front().expect("non-empty queue"),
                Some(queue) if queue.len() == 1 => queue.front().cloned().expect("front"),
                _ => (500, json!({ "message": format!("unscripted route {route}") })),
            }
        };
        script.served.lock().await.push(route);

        let envelope = json!({
            "type": "message",
            "data": { "id": mid, "status": status, "data": data },
        });
        let mut frame = serde_json::to_vec(&envelope).expect("serialize response");
        frame.push(MESSAGE_DELIMITER);
        if write.write_all(&frame).await.is_err() || write.flush().await.is_err() {
            return;
        }
    }
}

/// A `node/getStatus` payload in the node's wire shape.
pub fn status_payload(status: &str, head_sequence: u64, synced: bool) -> Value {
    let hash = format!("head-{head_sequence}");
    json!({
        "node": { "status": status, "nodeName": "test" },
        "blockchain": {
            "head": { "hash": hash, "sequence": head_sequence },
            "synced": synced,
        },
        "accounts": { "head": { "hash": hash, "sequence": head_sequence } },
    })
}
