// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-dual-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server engine
//!
//! Binds a `TcpListener`, serves every accepted client from the local register
//! bank and, when stopped, closes the listener and every open client
//! connection before returning.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::config::TcpConfig;
use crate::modbus::engine::{EngineCounters, LocalRegisters, ModbusEngine};
use crate::modbus::service::LocalRegisterService;

/// Modbus TCP server bound to a configurable address and port.
///
/// Port `0` asks the OS for a free port; [`ModbusEngine::local_port`] reports
/// the one actually bound.
pub struct TcpServerEngine {
    address: String,
    port: u16,
    counters: EngineCounters,
    server_task: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
    bound_port: Option<u16>,
}

impl TcpServerEngine {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            counters: EngineCounters::new(),
            server_task: None,
            shutdown: None,
            bound_port: None,
        }
    }

    pub fn from_config(config: &TcpConfig) -> Self {
        Self::new(config.address.clone(), config.port)
    }
}

#[async_trait]
impl ModbusEngine for TcpServerEngine {
    async fn start(&mut self, registers: LocalRegisters) -> io::Result<()> {
        if self.is_running() {
            return Ok(());
        }

        info!("Starting Modbus TCP server on {}:{}", self.address, self.port);
        let listener = TcpListener::bind((self.address.as_str(), self.port)).await?;
        let local_addr = listener.local_addr()?;
        self.bound_port = Some(local_addr.port());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = self.counters.clone();
        let server = Server::new(listener);

        let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
            let registers = registers.clone();
            let counters = counters.clone();
            let shutdown = shutdown_rx.clone();
            debug!("Modbus TCP client connected from {}", socket_addr);

            async move {
                accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                    Ok(Some(LocalRegisterService::for_connection(
                        registers.clone(),
                        counters.clone(),
                    )))
                })
                .map(|accepted| {
                    accepted.map(|(service, stream)| {
                        (service, StoppableStream::new(stream, shutdown))
                    })
                })
            }
        };

        let on_process_error = |err: io::Error| {
            error!("Modbus TCP connection error: {err}");
        };

        let server_task = tokio::spawn(async move {
            if let Err(e) = server.serve(&on_connected, on_process_error).await {
                error!("Modbus TCP server error: {}", e);
            }
        });

        self.server_task = Some(server_task);
        self.shutdown = Some(shutdown_tx);
        info!("Modbus TCP server listening on {}", local_addr);
        Ok(())
    }

    async fn stop(&mut self) -> io::Result<()> {
        // Ask open client connections to close
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }

        if let Some(task) = self.server_task.take() {
            info!("Shutting down Modbus TCP server...");
            task.abort();
            match task.await {
                Ok(()) => debug!("Modbus TCP server task ended"),
                Err(e) if e.is_cancelled() => debug!("Modbus TCP server task cancelled"),
                Err(e) => warn!("Modbus TCP server task failed: {}", e),
            }
        }

        self.bound_port = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.server_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn counters(&self) -> EngineCounters {
        self.counters.clone()
    }

    fn local_port(&self) -> Option<u16> {
        self.bound_port
    }
}

/// Client stream that reports end-of-file once the engine is stopped.
///
/// `tokio_modbus` spawns one task per client; ending the stream is what makes
/// those tasks return and drop their socket.
struct StoppableStream {
    inner: TcpStream,
    shutdown: Pin<Box<dyn Future<Output = ()> + Send>>,
    closed: bool,
}

impl StoppableStream {
    fn new(inner: TcpStream, mut shutdown: watch::Receiver<bool>) -> Self {
        let shutdown = Box::pin(async move {
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        });
        Self {
            inner,
            shutdown,
            closed: false,
        }
    }

    fn poll_closed(&mut self, cx: &mut Context<'_>) -> bool {
        if !self.closed && self.shutdown.as_mut().poll(cx).is_ready() {
            self.closed = true;
        }
        self.closed
    }
}

impl AsyncRead for StoppableStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_closed(cx) {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for StoppableStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
