//! Test fixtures: an in-memory retriever and a loopback HTTP stub.

use crate::document::{DocumentRef, RankedList};
use crate::error::{EvalError, Result};
use crate::retrieval::{Retriever, Target};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Answers from a fixed table; unknown or failing pairs return
/// `BackendUnavailable`.
#[derive(Default)]
pub struct FixtureRetriever {
    answers: HashMap<(Target, String), Option<Vec<DocumentRef>>>,
}

impl FixtureRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with bare ids, scored by position.
    pub fn with(self, target: Target, query: &str, ids: &[&str]) -> Self {
        let docs = ids
            .iter()
            .enumerate()
            .map(|(i, id)| DocumentRef::new(*id, 1.0 / (i + 1) as f64))
            .collect();
        self.with_docs(target, query, docs)
    }

    pub fn with_docs(mut self, target: Target, query: &str, docs: Vec<DocumentRef>) -> Self {
        self.answers.insert((target, query.to_string()), Some(docs));
        self
    }

    pub fn failing(mut self, target: Target, query: &str) -> Self {
        self.answers.insert((target, query.to_string()), None);
        self
    }
}

impl Retriever for FixtureRetriever {
    async fn retrieve(&self, target: Target, query: &str, top_k: usize) -> Result<RankedList> {
        match self.answers.get(&(target, query.to_string())) {
            Some(Some(docs)) => {
                let mut list = RankedList::new(query, docs.clone());
                list.truncate(top_k);
                Ok(list)
            }
            _ => Err(EvalError::BackendUnavailable {
                endpoint: format!("fixture://{}", target),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

/// Serve `responses` on successive connections, returning the base URL
/// and a handle yielding the raw requests received.
pub(crate) async fn serve(responses: Vec<(u16, String)>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            let reply = format!(
                "HTTP/1.1 {} OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
        requests
    });

    (format!("http://{}", addr), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|l| {
                    let lower = l.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                })
                .unwrap_or(0);
            if data.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

/// Accept one connection and never answer it; returns the base URL.
pub(crate) async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(socket);
    });
    format!("http://{}", addr)
}
