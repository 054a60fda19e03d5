//! Test support: a minimal HTTP server that can stream event frames
//! incrementally, which wiremock cannot do.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Hand-rolled streaming server for the run service surface.
///
/// `POST {base}/runs/execute` pops the next queued script: a channel of
/// chunk strings written to the wire as they arrive (chunked transfer
/// encoding); closing the channel ends the response body. `POST
/// {base}/runs/cancel` records the request body and answers with the
/// configured JSON.
pub struct SseServer {
    base_url: String,
    scripts: Arc<Mutex<VecDeque<mpsc::UnboundedReceiver<String>>>>,
    pub execute_calls: Arc<Mutex<Vec<serde_json::Value>>>,
    pub cancel_calls: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl SseServer {
    pub async fn start(cancel_response: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let scripts: Arc<Mutex<VecDeque<mpsc::UnboundedReceiver<String>>>> =
            Arc::new(Mutex::new(VecDeque::new()));
        let execute_calls: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
        let cancel_calls: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));

        let scripts_srv = scripts.clone();
        let execute_calls_srv = execute_calls.clone();
        let cancel_calls_srv = cancel_calls.clone();
        let cancel_response = cancel_response.to_string();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let scripts = scripts_srv.clone();
                let execute_calls = execute_calls_srv.clone();
                let cancel_calls = cancel_calls_srv.clone();
                let cancel_response = cancel_response.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(
                        stream,
                        scripts,
                        execute_calls,
                        cancel_calls,
                        cancel_response,
                    )
                    .await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            scripts,
            execute_calls,
            cancel_calls,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Queue a script for the next execute request. Send frame text
    /// through the returned channel; drop it to end the stream.
    pub fn queue_execute(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push_back(rx);
        tx
    }

    /// Queue a fully scripted execute response.
    pub fn queue_execute_frames(&self, frames: &[&str]) {
        let tx = self.queue_execute();
        for frame in frames {
            tx.send(frame.to_string()).unwrap();
        }
    }
}

/// `data: <json>` line for an event.
pub fn frame(json: &str) -> String {
    format!("data: {json}\n")
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    scripts: Arc<Mutex<VecDeque<mpsc::UnboundedReceiver<String>>>>,
    execute_calls: Arc<Mutex<Vec<serde_json::Value>>>,
    cancel_calls: Arc<Mutex<Vec<serde_json::Value>>>,
    cancel_response: String,
) -> std::io::Result<()> {
    let (head, body) = read_request(&mut stream).await?;
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("")
        .to_string();

    if path.ends_with("/runs/cancel") {
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&body) {
            cancel_calls.lock().unwrap().push(json);
        }
        let resp = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            cancel_response.len(),
            cancel_response
        );
        stream.write_all(resp.as_bytes()).await?;
        return Ok(());
    }

    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&body) {
        execute_calls.lock().unwrap().push(json);
    }
    let script = scripts.lock().unwrap().pop_front();
    let Some(mut rx) = script else {
        let resp = "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
        stream.write_all(resp.as_bytes()).await?;
        return Ok(());
    };

    stream
        .write_all(
            b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n",
        )
        .await?;
    stream.flush().await?;

    while let Some(chunk) = rx.recv().await {
        let piece = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
        stream.write_all(piece.as_bytes()).await?;
        stream.flush().await?;
    }
    stream.write_all(b"0\r\n\r\n").await?;
    stream.flush().await?;
    Ok(())
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> std::io::Result<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    // Read until end of headers.
    while !buf.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            break;
        }
        buf.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&buf).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        stream.read_exact(&mut body).await?;
    }
    Ok((head, body))
}
