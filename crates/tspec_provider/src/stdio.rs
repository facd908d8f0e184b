//! Provider processes speaking JSON-RPC 2.0 over stdio.
//!
//! Each message is preceded by a `Content-Length` header and a blank line.
//! One request is in flight per process at a time; responses are matched to
//! requests by id so a response left behind by an abandoned call is skipped.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::launcher::ProviderCommand;
use crate::protocol::{
    ApplyRequest, ApplyResponse, ConfigureRequest, Diagnostic, PlanRequest, PlanResponse,
    ReadDataRequest, ReadDataResponse, ReadResourceRequest, ReadResourceResponse, Schema,
    ValidateRequest,
};
use crate::transport::{methods, Transport};

/// Largest response body accepted from a provider.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct DiagnosticsResult {
    #[serde(default)]
    diagnostics: Vec<Diagnostic>,
}

type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Provider pipes, plus the child process when we spawned one.
struct ProviderProcess {
    child: Option<Child>,
    writer: Writer,
    reader: Reader,
    stopped: bool,
}

/// Transport to one provider process.
pub struct StdioTransport {
    name: String,
    process: Mutex<ProviderProcess>,
    next_id: AtomicU64,
}

impl StdioTransport {
    /// Spawn `command` and connect to its stdio.
    ///
    /// The process is killed when the transport is dropped.
    pub fn spawn(name: impl Into<String>, command: &ProviderCommand) -> TransportResult<Self> {
        let name = name.into();
        let launch_error = |message: String| TransportError::Launch {
            provider: name.clone(),
            message,
        };

        let (program, args) = command
            .command
            .split_first()
            .ok_or_else(|| launch_error("command is empty".to_string()))?;
        let mut child = Command::new(program)
            .args(args)
            .envs(&command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| launch_error(format!("cannot spawn {}: {}", program, e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_error("stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error("stdout unavailable".to_string()))?;

        debug!(provider = %name, program = %program, "Spawned provider process");
        Ok(Self::connect(name, Some(child), Box::new(stdout), Box::new(stdin)))
    }

    /// Speak to a provider already reachable through `reader` and `writer`.
    pub fn from_pipes<R, W>(name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::connect(name.into(), None, Box::new(reader), Box::new(writer))
    }

    fn connect(
        name: String,
        child: Option<Child>,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Writer,
    ) -> Self {
        Self {
            name,
            process: Mutex::new(ProviderProcess {
                child,
                writer,
                reader: BufReader::new(reader),
                stopped: false,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> TransportResult<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params: serde_json::to_value(params)?,
        };
        let payload = serde_json::to_vec(&request)?;

        let mut process = self.process.lock().await;
        if process.stopped {
            return Err(self.provider_error("provider is stopped".to_string()));
        }
        if let Some(child) = process.child.as_mut() {
            if let Some(status) = child.try_wait()? {
                return Err(self.provider_error(format!("process exited: {}", status)));
            }
        }
        write_framed(&mut process.writer, &payload).await?;

        let response = loop {
            let body = read_framed(&mut process.reader, MAX_RESPONSE_BYTES).await?;
            let response: JsonRpcResponse = serde_json::from_slice(&body)?;
            if response.id == Some(id) {
                break response;
            }
            warn!(provider = %self.name, expected = id, got = ?response.id, "Discarding stale response");
        };
        drop(process);

        if let Some(error) = response.error {
            return Err(self.provider_error(format!("{} (code {})", error.message, error.code)));
        }
        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result)
            .map_err(|e| TransportError::Protocol(format!("invalid {} result from {}: {}", method, self.name, e)))
    }

    fn provider_error(&self, message: String) -> TransportError {
        TransportError::Provider {
            provider: self.name.clone(),
            message,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn get_schema(&self) -> TransportResult<Schema> {
        self.call(methods::GET_SCHEMA, &serde_json::json!({})).await
    }

    async fn configure(&self, request: ConfigureRequest) -> TransportResult<Vec<Diagnostic>> {
        let result: DiagnosticsResult = self.call(methods::CONFIGURE, &request).await?;
        Ok(result.diagnostics)
    }

    async fn validate_resource_config(&self, request: ValidateRequest) -> TransportResult<Vec<Diagnostic>> {
        let result: DiagnosticsResult = self.call(methods::VALIDATE_RESOURCE, &request).await?;
        Ok(result.diagnostics)
    }

    async fn validate_data_source_config(&self, request: ValidateRequest) -> TransportResult<Vec<Diagnostic>> {
        let result: DiagnosticsResult = self.call(methods::VALIDATE_DATA_SOURCE, &request).await?;
        Ok(result.diagnostics)
    }

    async fn plan_resource_change(&self, request: PlanRequest) -> TransportResult<PlanResponse> {
        self.call(methods::PLAN_RESOURCE_CHANGE, &request).await
    }

    async fn read_resource(&self, request: ReadResourceRequest) -> TransportResult<ReadResourceResponse> {
        self.call(methods::READ_RESOURCE, &request).await
    }

    async fn read_data_source(&self, request: ReadDataRequest) -> TransportResult<ReadDataResponse> {
        self.call(methods::READ_DATA_SOURCE, &request).await
    }

    async fn apply_resource_change(&self, request: ApplyRequest) -> TransportResult<ApplyResponse> {
        self.call(methods::APPLY_RESOURCE_CHANGE, &request).await
    }

    async fn shutdown(&self) -> TransportResult<()> {
        let mut process = self.process.lock().await;
        process.stopped = true;
        let Some(child) = process.child.as_mut() else {
            return Ok(());
        };
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child.kill().await?;
        debug!(provider = %self.name, "Stopped provider process");
        Ok(())
    }
}

/// Write one framed payload.
pub async fn write_framed<W>(writer: &mut W, payload: &[u8]) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed payload.
pub async fn read_framed<R>(reader: &mut R, max_body_bytes: usize) -> TransportResult<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(TransportError::Protocol("connection closed".to_string()));
        }
        if line.trim().is_empty() {
            if content_length.is_some() {
                break;
            }
            continue;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let parsed = value
                .trim()
                .parse::<usize>()
                .map_err(|_| TransportError::Protocol(format!("invalid content length: {}", value.trim())))?;
            content_length = Some(parsed);
        }
    }

    let len = content_length.unwrap_or_default();
    if len > max_body_bytes {
        return Err(TransportError::Protocol(format!(
            "response of {} bytes exceeds the {} byte limit",
            len, max_body_bytes
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::{duplex, split, DuplexStream};

    use super::*;

    fn connected() -> (StdioTransport, DuplexStream) {
        let (client, server) = duplex(64 * 1024);
        let (reader, writer) = split(client);
        (StdioTransport::from_pipes("echo", reader, writer), server)
    }

    async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<serde_json::Value> {
        let body = read_framed(reader, MAX_RESPONSE_BYTES).await.ok()?;
        serde_json::from_slice(&body).ok()
    }

    async fn respond<W: AsyncWrite + Unpin>(writer: &mut W, id: &serde_json::Value, result: serde_json::Value) {
        let response = json!({ "jsonrpc": "2.0", "id": id, "result": result });
        write_framed(writer, &serde_json::to_vec(&response).unwrap()).await.unwrap();
    }

    /// Answers every request with its own params.
    fn serve_echo(server: DuplexStream) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let (reader, mut writer) = split(server);
            let mut reader = BufReader::new(reader);
            while let Some(request) = read_request(&mut reader).await {
                respond(&mut writer, &request["id"], request["params"].clone()).await;
            }
        })
    }

    #[tokio::test]
    async fn test_call_returns_result_for_its_id() {
        let (transport, server) = connected();
        serve_echo(server);

        let result: serde_json::Value = transport.call("Echo", &json!({ "n": 1 })).await.unwrap();
        assert_eq!(result, json!({ "n": 1 }));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_connection() {
        let (transport, server) = connected();
        serve_echo(server);
        let transport = Arc::new(transport);

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let transport = transport.clone();
                tokio::spawn(async move {
                    let result: serde_json::Value = transport.call("Echo", &json!({ "n": n })).await.unwrap();
                    assert_eq!(result, json!({ "n": n }));
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_stale_response_from_abandoned_call_is_skipped() {
        let (transport, server) = connected();
        let provider = tokio::spawn(async move {
            let (reader, mut writer) = split(server);
            let mut reader = BufReader::new(reader);
            let first = read_request(&mut reader).await.unwrap();
            let second = read_request(&mut reader).await.unwrap();
            respond(&mut writer, &first["id"], json!("late")).await;
            respond(&mut writer, &second["id"], json!("fresh")).await;
        });

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            transport.call::<_, serde_json::Value>("Slow", &json!({})),
        )
        .await;
        assert!(abandoned.is_err());

        let result: serde_json::Value = transport.call("Fast", &json!({})).await.unwrap();
        assert_eq!(result, json!("fresh"));
        provider.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_response_is_provider_error() {
        let (transport, server) = connected();
        tokio::spawn(async move {
            let (reader, mut writer) = split(server);
            let mut reader = BufReader::new(reader);
            let request = read_request(&mut reader).await.unwrap();
            let response = json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": { "code": -32601, "message": "method not found" },
            });
            write_framed(&mut writer, &serde_json::to_vec(&response).unwrap()).await.unwrap();
        });

        let err = transport.call::<_, serde_json::Value>("Missing", &json!({})).await.unwrap_err();
        match err {
            TransportError::Provider { provider, message } => {
                assert_eq!(provider, "echo");
                assert!(message.contains("method not found (code -32601)"), "{}", message);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_connection_is_an_error() {
        let (transport, server) = connected();
        drop(server);
        assert!(transport.call::<_, serde_json::Value>("Echo", &json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_fail() {
        let (transport, server) = connected();
        serve_echo(server);
        transport.shutdown().await.unwrap();

        let err = transport.call::<_, serde_json::Value>("Echo", &json!({})).await.unwrap_err();
        assert!(matches!(err, TransportError::Provider { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_process_is_reported() {
        let command = ProviderCommand::new(["sh", "-c", "exit 3"]);
        let transport = StdioTransport::spawn("widget", &command).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = transport.call::<_, serde_json::Value>("Echo", &json!({})).await.unwrap_err();
        match err {
            TransportError::Provider { message, .. } => assert!(message.contains("process exited"), "{}", message),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_framing_round_trip() {
        let mut buffer = Vec::new();
        write_framed(&mut buffer, br#"{"id":1}"#).await.unwrap();
        write_framed(&mut buffer, br#"{"id":2}"#).await.unwrap();

        let mut reader = &buffer[..];
        assert_eq!(read_framed(&mut reader, 1024).await.unwrap(), br#"{"id":1}"#);
        assert_eq!(read_framed(&mut reader, 1024).await.unwrap(), br#"{"id":2}"#);
        assert!(matches!(
            read_framed(&mut reader, 1024).await,
            Err(TransportError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mut buffer = Vec::new();
        write_framed(&mut buffer, &[b'x'; 64]).await.unwrap();
        let mut reader = &buffer[..];
        assert!(read_framed(&mut reader, 16).await.is_err());
    }

    #[test]
    fn test_spawn_empty_command() {
        let result = StdioTransport::spawn("widget", &ProviderCommand::default());
        assert!(matches!(result, Err(TransportError::Launch { .. })));
    }
}
