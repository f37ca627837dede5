use crate::modbus::{self, Codec, ModbusRtuCodec, ModbusTcpCodec};
use futures::{SinkExt, StreamExt as _};
use std::collections::BTreeMap;
use std::pin;
use std::sync::atomic::AtomicU16;
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::SendError;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("lookup of `{1}` failed")]
    LookupHost(#[source] std::io::Error, String),
    #[error("could not connect to `{1}` over TCP")]
    Connect(#[source] std::io::Error, String),
    #[error("scheduling a request failed")]
    ScheduleRequest(#[source] SendError<modbus::Request>),
    #[error("could not shut down the connection")]
    Shutdown(#[source] std::io::Error),
}

/// Hands responses (or timeouts) back to the callers awaiting them.
#[derive(Default)]
pub struct ResponseTracker {
    responses: Mutex<BTreeMap<u16, Option<modbus::Response>>>,
    change_notify: Notify,
}

impl ResponseTracker {
    pub fn mark_timeout(&self, transaction_id: u16) {
        let mut guard = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(transaction_id, None);
        self.change_notify.notify_waiters();
        drop(guard);
    }

    pub fn add_response(&self, response: modbus::Response) {
        let mut guard = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(response.transaction_id, Some(response));
        self.change_notify.notify_waiters();
        drop(guard);
    }

    pub async fn wait_for(&self, transaction_id: u16) -> Option<modbus::Response> {
        loop {
            let notified = self.change_notify.notified();
            {
                let mut guard = self.responses.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(v) = guard.remove(&transaction_id) {
                    return v;
                }
            }
            notified.await;
        }
    }
}

#[derive(clap::Parser, Clone)]
#[group(id = "connection::Args")]
pub struct Args {
    #[clap(flatten)]
    how: ConnectionGroup,

    /// The modbus station ID of the ERV.
    ///
    /// Delta units leave the factory configured as 100 (0x64).
    #[arg(long, short = 'i', default_value_t = 100)]
    device_id: u8,

    /// If the modbus response isn't received in this amount of time, consider
    /// the request failed.
    ///
    /// A timed out request is not retried here; the next poll or the next
    /// user command retries naturally.
    #[arg(long, default_value = "1s")]
    read_timeout: humantime::Duration,

    /// Reconnect to the modbus endpoint after the specified number of
    /// consecutive request timeouts.
    #[arg(long, default_value = "3")]
    reconnect_after_timeouts: usize,
}

#[derive(clap::Parser, Clone)]
#[group(required = true)]
pub struct ConnectionGroup {
    /// Connect to the ERV over Modbus TCP (host:port).
    #[arg(long)]
    tcp: Option<String>,

    /// Connect to the ERV through an RTU-over-TCP gateway (host:port).
    ///
    /// The gateway forwards raw RTU frames to the unit's RS485 bus.
    #[arg(long)]
    rtu_over_tcp: Option<String>,
}

/// A single logical connection to the device.
///
/// All register traffic funnels through one background worker which keeps at
/// most one request in flight at a time. Interleaved multi-register command
/// sequences therefore cannot race with concurrent poll reads, which is what
/// keeps cached entity state coherent between polls.
pub struct Connection {
    request_queue: tokio::sync::mpsc::UnboundedSender<modbus::Request>,
    pub worker: tokio::task::JoinHandle<Result<(), Error>>,
    response_tracker: Arc<ResponseTracker>,
    transaction_id_generator: AtomicU16,
    args: Args,
}

impl Connection {
    pub fn new(args: Args) -> Connection {
        let (request_queue, jobs) = tokio::sync::mpsc::unbounded_channel();
        let response_tracker: Arc<ResponseTracker> = Default::default();
        let worker = if let Some(address) = args.how.tcp.clone() {
            Worker::<ModbusTcpCodec> {
                address,
                args: args.clone(),
                responses: Arc::clone(&response_tracker),
                codec: std::marker::PhantomData,
            }
            .spawn(jobs)
        } else if let Some(address) = args.how.rtu_over_tcp.clone() {
            Worker::<ModbusRtuCodec> {
                address,
                args: args.clone(),
                responses: Arc::clone(&response_tracker),
                codec: std::marker::PhantomData,
            }
            .spawn(jobs)
        } else {
            panic!("both `--tcp` and `--rtu-over-tcp` are `None`?");
        };
        Self {
            request_queue,
            worker,
            response_tracker,
            transaction_id_generator: AtomicU16::new(0),
            args,
        }
    }

    pub fn new_transaction_id(&self) -> u16 {
        self.transaction_id_generator.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Issue one register operation and await its outcome.
    ///
    /// `Ok(None)` means the request timed out or was dropped; the caller must
    /// treat the device state as unknown.
    pub async fn send(
        &self,
        operation: modbus::Operation,
    ) -> Result<Option<modbus::Response>, Error> {
        let transaction_id = self.new_transaction_id();
        let request = modbus::Request { device_id: self.args.device_id, transaction_id, operation };
        self.request_queue.send(request).map_err(Error::ScheduleRequest)?;
        Ok(self.response_tracker.wait_for(transaction_id).await)
    }
}

struct Worker<C> {
    address: String,
    args: Args,
    responses: Arc<ResponseTracker>,
    codec: std::marker::PhantomData<C>,
}

impl<C> Worker<C>
where
    C: Codec + Default + Unpin + Send + Sync + 'static,
{
    fn spawn(
        self,
        jobs: UnboundedReceiver<modbus::Request>,
    ) -> tokio::task::JoinHandle<Result<(), Error>> {
        tokio::task::spawn(self.main_loop(jobs))
    }

    async fn main_loop(self, mut jobs: UnboundedReceiver<modbus::Request>) -> Result<(), Error> {
        let result = self.run(&mut jobs).await;
        if result.is_err() {
            // Anybody already queued up must not be left waiting forever.
            jobs.close();
            while let Some(request) = jobs.recv().await {
                self.responses.mark_timeout(request.transaction_id);
            }
        }
        result
    }

    async fn run(&self, jobs: &mut UnboundedReceiver<modbus::Request>) -> Result<(), Error> {
        'reconnect: loop {
            let mut io = self.connect().await?;
            let mut consecutive_timeouts = 0;
            loop {
                let Some(request) = jobs.recv().await else {
                    SinkExt::<&modbus::Request>::close(&mut io).await.map_err(Error::Shutdown)?;
                    return Ok(());
                };
                if let Err(error) = io.send(&request).await {
                    warn!(
                        message = "sending request failed, will reconnect",
                        error = (&error as &dyn std::error::Error)
                    );
                    self.responses.mark_timeout(request.transaction_id);
                    continue 'reconnect;
                }
                // One request in flight at a time: wait this one out before
                // picking up the next job.
                let mut deadline = pin::pin!(tokio::time::sleep(*self.args.read_timeout));
                loop {
                    tokio::select! {
                        response = io.next() => match response {
                            None => {
                                warn!("connection closed by the peer, will reconnect");
                                self.responses.mark_timeout(request.transaction_id);
                                continue 'reconnect;
                            }
                            Some(Err(error)) => {
                                warn!(
                                    message = "could not read a response, will reconnect",
                                    error = (&error as &dyn std::error::Error)
                                );
                                self.responses.mark_timeout(request.transaction_id);
                                continue 'reconnect;
                            }
                            Some(Ok(response))
                                if response.transaction_id == request.transaction_id =>
                            {
                                trace!(
                                    message = "decoded a response",
                                    transaction = response.transaction_id
                                );
                                consecutive_timeouts = 0;
                                self.responses.add_response(response);
                                break;
                            }
                            Some(Ok(stale)) => {
                                // A response to a request we already timed out.
                                debug!(
                                    message = "a response we were not expecting",
                                    transaction = stale.transaction_id
                                );
                            }
                        },
                        _ = &mut deadline => {
                            debug!(
                                message = "request timed out",
                                transaction = request.transaction_id,
                                consecutive_timeouts,
                            );
                            self.responses.mark_timeout(request.transaction_id);
                            consecutive_timeouts += 1;
                            if consecutive_timeouts >= self.args.reconnect_after_timeouts {
                                continue 'reconnect;
                            }
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn connect(&self) -> Result<Framed<TcpStream, C>, Error> {
        info!(message = "connecting...", address = self.address);
        let addresses = tokio::net::lookup_host(&self.address)
            .await
            .map_err(|e| Error::LookupHost(e, self.address.clone()))?
            .collect::<Vec<_>>();
        debug!(message = "resolved", ?addresses);
        let socket = TcpStream::connect(&*addresses)
            .await
            .map_err(|e| Error::Connect(e, self.address.clone()))?;
        let nodelay_result = socket.set_nodelay(true);
        trace!(message = "setting nodelay", is_error = ?nodelay_result.err());
        info!(message = "connected");
        Ok(Framed::new(socket, C::default()))
    }
}
