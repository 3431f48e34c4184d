//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use herald::config::{parse_config, ConfigOverrides};
use herald::{Agent, AgentConfig, FetcherRegistry, Shutdown};

/// Start a programmable mock HTTP backend on an ephemeral port.
///
/// `f` is called once per request and returns the status code and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock backend that always returns `body` with status 200.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, body.to_string()) }).await
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// A running agent plus the handle needed to stop it.
pub struct RunningAgent {
    pub addrs: Vec<(String, SocketAddr)>,
    pub shutdown: Shutdown,
    pub handle: tokio::task::JoinHandle<()>,
}

impl RunningAgent {
    pub fn addr(&self, name: &str) -> SocketAddr {
        self.addrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, addr)| *addr)
            .unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("agent did not stop")
            .unwrap();
    }
}

pub fn config(src: &str) -> AgentConfig {
    parse_config(src, &ConfigOverrides::default()).unwrap()
}

/// Bind and run an agent for `config`.
pub async fn start_agent(config: AgentConfig) -> RunningAgent {
    let agent = Agent::bind(&config, &FetcherRegistry::builtin()).await.unwrap();
    let addrs = agent
        .plugins()
        .iter()
        .map(|p| (p.name().to_string(), agent.local_addr(p.name()).unwrap()))
        .collect();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(agent.run(shutdown.clone()));
    RunningAgent {
        addrs,
        shutdown,
        handle,
    }
}

/// Connect like a load balancer and return everything the agent wrote.
pub async fn probe(addr: SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut out = String::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_string(&mut out))
        .await
        .expect("probe timed out")
        .unwrap();
    out
}

/// Probe until the answer equals `expected`, failing after `deadline`.
pub async fn wait_for_answer(addr: SocketAddr, expected: &str, deadline: Duration) {
    let start = tokio::time::Instant::now();
    loop {
        let answer = probe(addr).await;
        if answer == expected {
            return;
        }
        if start.elapsed() > deadline {
            panic!("expected {:?} within {:?}, last answer {:?}", expected, deadline, answer);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
