//! Shared fixtures: an arithmetic service, a slow echo service, and a
//! helper that serves a registered server on an ephemeral local port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tinyrpc_server::{MethodError, MethodMap, Server, Service};
use tokio::net::TcpListener;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ArithRequest {
    pub a: i32,
    pub b: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ArithResponse {
    pub c: i32,
}

pub struct ArithService;

impl Service for ArithService {
    fn name(&self) -> &'static str {
        "ArithService"
    }

    fn methods(self: Arc<Self>) -> MethodMap {
        MethodMap::new()
            .handle("Add", |args: ArithRequest| async move {
                Ok(ArithResponse { c: args.a + args.b })
            })
            .handle("Sub", |args: ArithRequest| async move {
                Ok(ArithResponse { c: args.a - args.b })
            })
            .handle("Mul", |args: ArithRequest| async move {
                Ok(ArithResponse { c: args.a * args.b })
            })
            .handle("Div", |args: ArithRequest| async move {
                if args.b == 0 {
                    return Err(MethodError::new("divided is zero"));
                }
                Ok(ArithResponse { c: args.a / args.b })
            })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EchoRequest {
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EchoResponse {
    pub msg: String,
}

/// Echoes its input after a fixed delay; the fixture for deadline tests.
pub struct EchoService {
    pub delay: Duration,
}

impl Service for EchoService {
    fn name(&self) -> &'static str {
        "EchoService"
    }

    fn methods(self: Arc<Self>) -> MethodMap {
        let delay = self.delay;
        MethodMap::new().handle("Echo", move |args: EchoRequest| async move {
            tokio::time::sleep(delay).await;
            Ok(EchoResponse { msg: args.msg })
        })
    }
}

/// Bind an ephemeral port, spawn the accept loop, and return its address.
pub async fn spawn_server(server: Server) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(Arc::new(server).serve(listener));
    addr
}

/// A running server hosting only the arithmetic service.
pub async fn serve_arith() -> SocketAddr {
    let mut server = Server::new();
    server.register(ArithService).expect("register ArithService");
    spawn_server(server).await
}
