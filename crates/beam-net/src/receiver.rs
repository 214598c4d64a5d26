use std::collections::HashSet;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use beam_core::LaserPoint;
use futures_util::future::select_all;

use crate::addressing::{device_groups, identify_device};
use crate::config::{NetConfig, SocketLayout};
use crate::decoder::DecoderAdapter;
use crate::socket::{bind_group_sockets, DatagramReader, MulticastSocket};
use crate::stats::{NetworkStats, StatsCounter};

/// Receives decoded batches as `(device, points)`. Runs on the receiver
/// thread, so it must return quickly.
pub type DataCallback = Box<dyn FnMut(usize, Vec<LaserPoint>) + Send>;

type SharedCallback = Arc<Mutex<Option<DataCallback>>>;

/// Multicast listener for laser controller traffic.
///
/// Binds the configured port, joins every `239.255.{device}.{subnet}`
/// group and decodes datagrams on a background thread. The decoder is
/// moved onto that thread while it runs and handed back on [`stop`].
///
/// [`stop`]: MulticastReceiver::stop
pub struct MulticastReceiver {
    config: NetConfig,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<DecoderAdapter>>,
    decoder: Option<DecoderAdapter>,
    callback: SharedCallback,
    stats: StatsCounter,
}

impl MulticastReceiver {
    pub fn new(config: NetConfig, decoder: DecoderAdapter) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            decoder: Some(decoder),
            callback: Arc::new(Mutex::new(None)),
            stats: StatsCounter::default(),
        }
    }

    /// Open sockets, join groups on `bind_addr` and spawn the receive
    /// thread. `Ipv4Addr::UNSPECIFIED` lets the OS pick the interface.
    /// Does nothing if already running.
    pub fn start(&mut self, bind_addr: Ipv4Addr) -> Result<(), String> {
        if self.is_running() {
            return Ok(());
        }
        // Reap a thread that exited on its own.
        self.stop();

        self.config.bind_addr = bind_addr;

        let sockets = open_sockets(&self.config)?;
        let decoder = self
            .decoder
            .take()
            .unwrap_or_else(|| DecoderAdapter::null(self.config.max_devices));

        self.running.store(true, Ordering::Relaxed);
        let receive_loop = ReceiveLoop {
            running: self.running.clone(),
            callback: self.callback.clone(),
            stats: self.stats.clone(),
            poll_interval: self.config.poll_interval,
            port: self.config.port,
            decoder,
            sockets,
        };

        let spawned = thread::Builder::new()
            .name("beam-net".to_string())
            .spawn(move || receive_loop.run());

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                log::info!("Multicast receiver started on port {}", self.config.port);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Relaxed);
                self.decoder = Some(DecoderAdapter::null(self.config.max_devices));
                Err(format!("Failed to spawn receiver thread: {}", e))
            }
        }
    }

    /// Signal the receive thread and wait for it. Groups are left and
    /// sockets closed before this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(decoder) => self.decoder = Some(decoder),
                Err(_) => {
                    log::error!("Receiver thread panicked");
                    self.decoder = Some(DecoderAdapter::null(self.config.max_devices));
                }
            }
            log::info!("Multicast receiver stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some() && self.running.load(Ordering::Relaxed)
    }

    /// Register the batch callback, replacing any previous one.
    pub fn set_data_callback(&self, callback: impl FnMut(usize, Vec<LaserPoint>) + Send + 'static) {
        let mut slot = self.callback.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Box::new(callback));
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats.snapshot()
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }
}

impl Drop for MulticastReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind sockets for the configured layout and join their groups.
fn open_sockets(config: &NetConfig) -> Result<Vec<MulticastSocket>, String> {
    let mut sockets = Vec::new();

    match config.layout {
        SocketLayout::Shared => {
            let groups = config
                .joined_devices()
                .flat_map(|device| device_groups(device, config.max_subnet));
            sockets = bind_group_sockets(config, None, groups)?;
        }
        SocketLayout::PerDevice => {
            for device in config.joined_devices() {
                let groups = device_groups(device, config.max_subnet);
                sockets.extend(bind_group_sockets(config, Some(device as usize), groups)?);
            }
        }
    }

    let joined: usize = sockets.iter().map(|s| s.joined_groups().len()).sum();
    log::info!("Joined {} multicast groups on {} sockets", joined, sockets.len());
    if joined == 0 {
        return Err(format!("No multicast group could be joined on port {}", config.port));
    }
    Ok(sockets)
}

/// State owned by the receive thread.
struct ReceiveLoop {
    running: Arc<AtomicBool>,
    callback: SharedCallback,
    stats: StatsCounter,
    poll_interval: Duration,
    port: u16,
    decoder: DecoderAdapter,
    sockets: Vec<MulticastSocket>,
}

impl ReceiveLoop {
    fn run(mut self) -> DecoderAdapter {
        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt.block_on(self.receive()),
            Err(e) => log::error!("Failed to create receiver runtime: {}", e),
        }
        self.running.store(false, Ordering::Relaxed);

        // Sockets drop here, leaving their groups.
        let ReceiveLoop { decoder, .. } = self;
        decoder
    }

    async fn receive(&mut self) {
        let mut sockets = Vec::with_capacity(self.sockets.len());
        for socket in &self.sockets {
            match socket.to_async() {
                Ok(handle) => sockets.push((handle, socket.device())),
                Err(e) => log::error!("Failed to register receiver socket: {}", e),
            }
        }
        if sockets.is_empty() {
            return;
        }

        let mut reader = DatagramReader::new();
        let mut reported = HashSet::new();

        while self.running.load(Ordering::Relaxed) {
            let ready = tokio::select! {
                (result, index, _) = select_all(sockets.iter().map(|(s, _)| Box::pin(s.readable()))) => {
                    result.map(|_| index)
                }
                _ = tokio::time::sleep(self.poll_interval) => continue,
            };

            let index = match ready {
                Ok(index) => index,
                Err(e) => {
                    self.report(&mut reported, &e);
                    continue;
                }
            };

            let (socket, tag) = &sockets[index];
            match reader.recv(socket) {
                Ok((0, _)) => {}
                Ok((len, destination)) => {
                    let hint = tag.or_else(|| destination.and_then(identify_device));
                    self.handle_datagram(reader.payload(len), hint);
                }
                Err(e) if is_transient(&e) => {}
                Err(e) => self.report(&mut reported, &e),
            }
        }
    }

    fn handle_datagram(&mut self, payload: &[u8], device_hint: Option<usize>) {
        self.stats.record(payload.len());

        let Some((device, points)) = self.decoder.decode(payload, device_hint) else {
            return;
        };
        let mut callback = self.callback.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(callback) = callback.as_mut() {
            callback(device, points);
        }
    }

    /// Log the first occurrence of each error kind.
    fn report(&self, reported: &mut HashSet<io::ErrorKind>, e: &io::Error) {
        if reported.insert(e.kind()) {
            log::warn!("Receive error on port {}: {}", self.port, e);
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}
