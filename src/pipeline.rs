use crate::action::{ActionHandle, ActionOutcome, SubmitOptions};
use crate::config::{Config, Role};
use crate::dispatch::{Dispatcher, HandlerTable, InboundHook, MessageHandler};
use crate::error::{RunError, SubmitError};
use crate::fragment::Fragmenter;
use crate::protocol::{MAX_MESSAGE_SIZE, MessageType};
use crate::reassembly::Reassembler;
use crate::scheduler::RetryScheduler;
use crate::stages;
use crate::stats::{CounterSnapshot, PipelineCounters};
use crate::time::{SystemTimeProvider, TimeProvider};
use crate::wiring::{StopCause, StopFlag, Wiring};
use parking_lot::{Mutex, RwLock};
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// How long the accept loop sleeps between polls for a connection or a
/// stop request.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

struct ActiveConn {
    wiring: Arc<Wiring>,
    scheduler: Arc<RetryScheduler>,
}

struct Core {
    config: Config,
    handlers: Arc<RwLock<HandlerTable>>,
    hook: Arc<Mutex<Option<InboundHook>>>,
    counters: Arc<PipelineCounters>,
    time: Arc<dyn TimeProvider>,
    stop: Arc<StopFlag>,
    active: Mutex<Option<ActiveConn>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

/// One MCTP endpoint over one stream connection: the seven-stage
/// pipeline, its supervisor, and the submission interface.
///
/// A server pipeline accepts, serves the connection until it drops, then
/// rebuilds the wiring and accepts again; a client connects once. All
/// per-connection state (queues, pools, tag table) is constructed at
/// connection start and drained at teardown.
pub struct Pipeline {
    core: Arc<Core>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            core: Arc::new(Core {
                config,
                handlers: Arc::new(RwLock::new(HandlerTable::new())),
                hook: Arc::new(Mutex::new(None)),
                counters: Arc::new(PipelineCounters::default()),
                time: Arc::new(SystemTimeProvider),
                stop: Arc::new(StopFlag::new()),
                active: Mutex::new(None),
                local_addr: Mutex::new(None),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Installs the handler serving inbound requests of `msg_type`.
    pub fn set_handler(&self, msg_type: MessageType, handler: Arc<dyn MessageHandler>) {
        self.core.handlers.write().set(msg_type, handler);
    }

    /// Installs a hook that sees every reassembled inbound message
    /// before dispatch and may consume it.
    pub fn set_inbound_hook(&self, hook: InboundHook) {
        *self.core.hook.lock() = Some(hook);
    }

    /// Starts the pipeline and waits for it to come up: a server until
    /// its listener is armed, a client until all stages are running.
    pub fn run(&self) -> Result<(), RunError> {
        let mut supervisor = self.supervisor.lock();
        if supervisor.is_some() {
            return Err(RunError::AlreadyRunning);
        }
        self.core.stop.reset();
        let (tx, rx) = mpsc::channel::<Result<(), RunError>>();
        let addr = self.core.config.addr();
        let core = Arc::clone(&self.core);
        let handle = match self.core.config.role {
            Role::Server => {
                let listener = TcpListener::bind(&addr).map_err(|source| RunError::Bind {
                    addr: addr.clone(),
                    source,
                })?;
                if let Ok(local) = listener.local_addr() {
                    *self.core.local_addr.lock() = Some(local);
                }
                thread::Builder::new()
                    .name("mctp-supervisor".into())
                    .spawn(move || core.supervise_server(listener, tx))
                    .map_err(RunError::Thread)?
            }
            Role::Client => {
                let stream = TcpStream::connect(&addr).map_err(|source| RunError::Connect {
                    addr: addr.clone(),
                    source,
                })?;
                if let Ok(peer) = stream.peer_addr() {
                    *self.core.local_addr.lock() = Some(peer);
                }
                thread::Builder::new()
                    .name("mctp-supervisor".into())
                    .spawn(move || core.supervise_client(stream, tx))
                    .map_err(RunError::Thread)?
            }
        };
        *supervisor = Some(handle);
        drop(supervisor);
        match rx.recv_timeout(self.core.config.startup_timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.stop();
                Err(err)
            }
            Err(_) => {
                self.stop();
                Err(RunError::Startup(self.core.config.startup_timeout))
            }
        }
    }

    /// Enqueues an outbound request. The returned handle resolves when a
    /// response is paired, the retry cap is exhausted, or the transport
    /// fails.
    pub fn submit(
        &self,
        msg_type: MessageType,
        payload: &[u8],
        options: SubmitOptions,
    ) -> Result<ActionHandle, SubmitError> {
        if payload.is_empty() {
            return Err(SubmitError::EmptyPayload);
        }
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(SubmitError::PayloadTooLarge);
        }
        let active = self.core.active.lock();
        let Some(conn) = active.as_ref() else {
            return Err(SubmitError::NotRunning);
        };
        let now = self.core.time.now();
        let Some(mut msg) = conn.wiring.messages.try_acquire() else {
            return Err(SubmitError::Exhausted);
        };
        msg.dest = self.core.config.peer_eid;
        msg.src = self.core.config.local_eid;
        msg.tag_owner = true;
        msg.msg_type = msg_type;
        msg.created = Some(now);
        msg.set_payload(payload);
        let Some(mut action) = conn.wiring.actions.try_acquire() else {
            conn.wiring.messages.release(msg);
            return Err(SubmitError::Exhausted);
        };
        let (notify, rx) = mpsc::sync_channel(1);
        action.request = Some(msg);
        action.created = Some(now);
        action.max = options.retry.cap(self.core.config.default_retries);
        action.outbound = true;
        action.on_submitted = options.on_submitted;
        action.on_completed = options.on_completed;
        action.on_failed = options.on_failed;
        action.notify = Some(notify);
        match conn.wiring.submissions.push(action) {
            Ok(()) => {
                conn.scheduler.wake();
                Ok(ActionHandle { rx })
            }
            Err(err) => {
                conn.wiring.retire(err.into_inner());
                Err(SubmitError::QueueFull)
            }
        }
    }

    /// Submits and blocks up to `timeout` for the outcome.
    pub fn submit_wait(
        &self,
        msg_type: MessageType,
        payload: &[u8],
        options: SubmitOptions,
        timeout: Duration,
    ) -> Result<Option<ActionOutcome>, SubmitError> {
        Ok(self.submit(msg_type, payload, options)?.wait(timeout))
    }

    /// Requests an orderly stop and joins the supervisor.
    pub fn stop(&self) {
        self.core.stop.request(StopCause::Orderly);
        if let Some(conn) = self.core.active.lock().as_ref() {
            conn.scheduler.wake();
        }
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("supervisor thread panicked");
        }
    }

    /// A point-in-time copy of the pipeline counters.
    pub fn counters(&self) -> CounterSnapshot {
        self.core.counters.snapshot()
    }

    /// The bound address of a server, or the peer address of a client,
    /// once `run` has succeeded. Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.core.local_addr.lock()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Core {
    fn supervise_server(
        self: Arc<Core>,
        listener: TcpListener,
        startup: Sender<Result<(), RunError>>,
    ) {
        if let Err(err) = listener.set_nonblocking(true) {
            let _ = startup.send(Err(RunError::Socket(err)));
            return;
        }
        // The listener is armed; the caller's run() can return even
        // though no connection exists yet.
        let _ = startup.send(Ok(()));
        let mut startup = None;
        info!("listening on {}", self.config.addr());
        loop {
            if self.stop.cause() == Some(StopCause::Orderly) {
                break;
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!("accepted connection from {}", peer);
                    if stream.set_nonblocking(false).is_err() {
                        continue;
                    }
                    self.serve_connection(stream, &mut startup);
                    if self.stop.cause() == Some(StopCause::Orderly) {
                        break;
                    }
                    // A stage aborted the connection; rearm and accept
                    // the next one.
                    self.stop.reset();
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(err) => {
                    warn!("accept failed: {}", err);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
    }

    fn supervise_client(self: Arc<Core>, stream: TcpStream, startup: Sender<Result<(), RunError>>) {
        let mut startup = Some(startup);
        self.serve_connection(stream, &mut startup);
    }

    /// Runs one connection to completion: build the wiring, start the
    /// seven stages, wait for a stop request, then tear everything down
    /// in stage order and drain the leftovers back into the pools.
    fn serve_connection(&self, stream: TcpStream, startup: &mut Option<Sender<Result<(), RunError>>>) {
        let wiring = Arc::new(Wiring::new(&self.config, Arc::clone(&self.counters)));
        let scheduler = Arc::new(RetryScheduler::new(
            Arc::clone(&wiring),
            Arc::clone(&self.time),
            self.config.action_delta,
            self.config.tick_delta,
        ));
        *self.active.lock() = Some(ActiveConn {
            wiring: Arc::clone(&wiring),
            scheduler: Arc::clone(&scheduler),
        });

        let stage_handles = stream
            .try_clone()
            .and_then(|reader_conn| {
                let writer_conn = stream.try_clone()?;
                self.start_stages(&wiring, &scheduler, reader_conn, writer_conn)
            });
        let handles = match stage_handles {
            Ok(handles) => handles,
            Err(err) => {
                warn!("failed to start pipeline stages: {}", err);
                if let Some(tx) = startup.take() {
                    let _ = tx.send(Err(RunError::Thread(err)));
                }
                wiring.close_all();
                wiring.drain_into_pools();
                *self.active.lock() = None;
                self.stop.request(StopCause::Abnormal);
                return;
            }
        };
        if let Some(tx) = startup.take() {
            let _ = tx.send(Ok(()));
        }

        self.stop.wait_stopping();

        let _ = stream.shutdown(Shutdown::Both);
        wiring.close_all();
        scheduler.wake();
        for (name, handle) in handles {
            if handle.join().is_err() {
                warn!("stage {} panicked", name);
            }
        }
        wiring.drain_into_pools();
        *self.active.lock() = None;
    }

    /// Spawns the stage threads, returned in the order they are joined
    /// at teardown.
    fn start_stages(
        &self,
        wiring: &Arc<Wiring>,
        scheduler: &Arc<RetryScheduler>,
        reader_conn: TcpStream,
        writer_conn: TcpStream,
    ) -> io::Result<Vec<(&'static str, JoinHandle<()>)>> {
        let mut handles = Vec::with_capacity(7);

        let w = Arc::clone(wiring);
        let stop = Arc::clone(&self.stop);
        let time = Arc::clone(&self.time);
        handles.push((
            "socket-reader",
            thread::Builder::new()
                .name("mctp-rx-sock".into())
                .spawn(move || stages::socket_reader(reader_conn, &w, &stop, &*time))?,
        ));

        let w = Arc::clone(wiring);
        let mut reassembler = Reassembler::new(Arc::clone(&self.counters));
        handles.push((
            "packet-reader",
            thread::Builder::new()
                .name("mctp-rx-pkt".into())
                .spawn(move || stages::reassembler_stage(&w, &mut reassembler))?,
        ));

        let dispatcher = Dispatcher::new(
            Arc::clone(wiring),
            Arc::clone(&self.handlers),
            Arc::clone(&self.hook),
            Arc::clone(&self.time),
        );
        handles.push((
            "dispatcher",
            thread::Builder::new()
                .name("mctp-rx-msg".into())
                .spawn(move || dispatcher.run())?,
        ));

        let w = Arc::clone(wiring);
        let mut fragmenter = Fragmenter::new();
        handles.push((
            "packet-writer",
            thread::Builder::new()
                .name("mctp-tx-pkt".into())
                .spawn(move || stages::fragmenter_stage(&w, &mut fragmenter))?,
        ));

        let w = Arc::clone(wiring);
        let stop = Arc::clone(&self.stop);
        let time = Arc::clone(&self.time);
        handles.push((
            "socket-writer",
            thread::Builder::new()
                .name("mctp-tx-sock".into())
                .spawn(move || stages::socket_writer(writer_conn, &w, &stop, &*time))?,
        ));

        let sched = Arc::clone(scheduler);
        let stop = Arc::clone(&self.stop);
        handles.push((
            "scheduler",
            thread::Builder::new()
                .name("mctp-sched".into())
                .spawn(move || sched.run(&stop))?,
        ));

        let w = Arc::clone(wiring);
        let handlers = Arc::clone(&self.handlers);
        let time = Arc::clone(&self.time);
        handles.push((
            "completion",
            thread::Builder::new()
                .name("mctp-compl".into())
                .spawn(move || stages::completion_stage(&w, &handlers, &*time))?,
        ));

        Ok(handles)
    }
}
