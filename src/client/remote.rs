//! A connected, authenticated endpoint of a remote store, grounded on the
//! original `nugg/client/remotesource.go`. Adapted from a single
//! goroutine-guarded `map[uint64]*Call` to a `whirlwind::ShardMap`, and
//! from an untyped response channel to the typed [`Response`] enum.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::model::{random_call_id, ChunkId, DirectoryEntry, EntryId, Metadata};
use crate::wire::{
    DeleteReq, DeleteResp, FetchReq, FetchResp, ListReq, ListResp, LookupReq, LookupResp, MkdirReq, MkdirResp,
    PingPong, PktTag, ReadDataReq, ReadDataResp, ReadMetaReq, ReadMetaResp, ReadReq, ReadResp, StoreReq,
    StoreResp, Transceiver, WriteReq, WriteResp,
};

use super::call::{error_from_code, Error, Response};

type ClientTlsStream = tokio_rustls::client::TlsStream<TcpStream>;
type ClientTransceiver =
    Transceiver<tokio::io::ReadHalf<ClientTlsStream>, tokio::io::WriteHalf<ClientTlsStream>>;

/// Default per-call RPC timeout (spec.md §4.6).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);
/// Default keep-alive ping interval (spec.md §4.6), used when a caller
/// doesn't override it via [`RemoteSource::open`].
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);

/// A live connection to a remote store over mutual TLS, multiplexing
/// concurrent RPCs behind one wire.
pub struct RemoteSource {
    transceiver: Arc<ClientTransceiver>,
    pending: Arc<whirlwind::ShardMap<u64, oneshot::Sender<Response>>>,
    should_run: Arc<AtomicBool>,
    latency: Arc<TokioMutex<Duration>>,
    timeout: Duration,
}

impl RemoteSource {
    /// Connects to `addr`, validating the peer against `server_name`, and
    /// spawns the read-service and keep-alive loops. `keepalive` sets the
    /// keep-alive ping interval (spec.md §4.6, `ClientConfig::keepalive`).
    /// `fatal_tx`, if given, receives one message when a connection-fatal
    /// error ends the read-service loop.
    pub async fn open(
        addr: &str,
        server_name: &str,
        tls_config: rustls::ClientConfig,
        keepalive: Duration,
        fatal_tx: Option<mpsc::Sender<String>>,
    ) -> Result<Self, Error> {
        let connector = TlsConnector::from(Arc::new(tls_config));
        let tcp = TcpStream::connect(addr).await.map_err(|e| Error::Io(e.to_string()))?;
        let _ = tcp.set_nodelay(true);

        let name = ServerName::try_from(server_name.to_string()).map_err(|e| Error::Io(e.to_string()))?;
        let tls_stream = connector.connect(name, tcp).await.map_err(|e| Error::Io(e.to_string()))?;

        let (read_half, write_half) = tokio::io::split(tls_stream);
        let transceiver = Arc::new(Transceiver::new(read_half, write_half));
        let pending = Arc::new(whirlwind::ShardMap::new());
        let should_run = Arc::new(AtomicBool::new(true));
        let latency = Arc::new(TokioMutex::new(Duration::ZERO));

        tokio::spawn(read_service_loop(
            transceiver.clone(),
            pending.clone(),
            should_run.clone(),
            latency.clone(),
            fatal_tx,
        ));
        tokio::spawn(keep_alive_loop(transceiver.clone(), should_run.clone(), keepalive));

        Ok(RemoteSource { transceiver, pending, should_run, latency, timeout: DEFAULT_TIMEOUT })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True if the read-service loop is still running.
    pub fn is_ready(&self) -> bool {
        self.should_run.load(Ordering::Relaxed)
    }

    /// Last measured round-trip latency from the keep-alive ping.
    pub async fn latency(&self) -> Duration {
        *self.latency.lock().await
    }

    /// Issues one RPC: registers a mailbox under a fresh random id, sends
    /// `req`, and waits for either a matching response or the call
    /// timeout. Unregisters the pending entry on every exit path.
    async fn call(&self, id: u64, tag: PktTag, req: &impl serde::Serialize) -> Result<Response, Error> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx).await;

        if let Err(e) = self.transceiver.send(tag, req).await {
            self.pending.remove(&id).await;
            return Err(Error::Io(e.to_string()));
        }

        let outcome = tokio::time::timeout(self.timeout, rx).await;
        self.pending.remove(&id).await;

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Protocol),
            Err(_elapsed) => Err(Error::Timeout),
        }
    }

    pub async fn lookup(&self, path: &str) -> Result<EntryId, Error> {
        let id = random_call_id();
        match self.call(id, PktTag::LookupReq, &LookupReq { id, path: path.to_string() }).await? {
            Response::Lookup(resp) => match error_from_code(resp.error_code) {
                None => Ok(resp.entry_id),
                Some(e) => Err(e),
            },
            _ => Err(Error::Protocol),
        }
    }

    pub async fn read_meta(&self, entry_id: EntryId) -> Result<Metadata, Error> {
        let id = random_call_id();
        match self.call(id, PktTag::ReadMetaReq, &ReadMetaReq { id, entry_id }).await? {
            Response::ReadMeta(resp) => match error_from_code(resp.error_code) {
                None => Ok(resp.metadata),
                Some(e) => Err(e),
            },
            _ => Err(Error::Protocol),
        }
    }

    pub async fn list(&self, path: &str) -> Result<Vec<DirectoryEntry>, Error> {
        let id = random_call_id();
        match self.call(id, PktTag::ListReq, &ListReq { id, path: path.to_string() }).await? {
            Response::List(resp) => match error_from_code(resp.error_code) {
                None => Ok(resp.entries),
                Some(e) => Err(e),
            },
            _ => Err(Error::Protocol),
        }
    }

    pub async fn fetch(&self, path: &str) -> Result<(EntryId, Metadata, Vec<u8>), Error> {
        let id = random_call_id();
        match self.call(id, PktTag::FetchReq, &FetchReq { id, path: path.to_string() }).await? {
            Response::Fetch(resp) => match error_from_code(resp.error_code) {
                None => Ok((resp.entry_id, resp.metadata, resp.bytes)),
                Some(e) => Err(e),
            },
            _ => Err(Error::Protocol),
        }
    }

    pub async fn read_data(&self, chunk_id: ChunkId) -> Result<Vec<u8>, Error> {
        let id = random_call_id();
        match self.call(id, PktTag::ReadDataReq, &ReadDataReq { id, chunk_id }).await? {
            Response::ReadData(resp) => match error_from_code(resp.error_code) {
                None => Ok(resp.bytes),
                Some(e) => Err(e),
            },
            _ => Err(Error::Protocol),
        }
    }

    pub async fn store(&self, path: &str, bytes: &[u8]) -> Result<(EntryId, Metadata), Error> {
        let id = random_call_id();
        let req = StoreReq { id, path: path.to_string(), bytes: bytes.to_vec() };
        match self.call(id, PktTag::StoreReq, &req).await? {
            Response::Store(resp) => match error_from_code(resp.error_code) {
                None => Ok((resp.entry_id, resp.metadata)),
                Some(e) => Err(e),
            },
            _ => Err(Error::Protocol),
        }
    }

    pub async fn mkdir(&self, path: &str) -> Result<(EntryId, Metadata), Error> {
        let id = random_call_id();
        match self.call(id, PktTag::MkdirReq, &MkdirReq { id, path: path.to_string() }).await? {
            Response::Mkdir(resp) => match error_from_code(resp.error_code) {
                None => Ok((resp.entry_id, resp.metadata)),
                Some(e) => Err(e),
            },
            _ => Err(Error::Protocol),
        }
    }

    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        let id = random_call_id();
        match self.call(id, PktTag::DeleteReq, &DeleteReq { id, path: path.to_string() }).await? {
            Response::Delete(resp) => match error_from_code(resp.error_code) {
                None => Ok(()),
                Some(e) => Err(e),
            },
            _ => Err(Error::Protocol),
        }
    }

    pub async fn write(&self, path: &str, offset: u64, bytes: &[u8]) -> Result<(u64, EntryId, Metadata), Error> {
        let id = random_call_id();
        let req = WriteReq { id, path: path.to_string(), offset, bytes: bytes.to_vec() };
        match self.call(id, PktTag::WriteReq, &req).await? {
            Response::Write(resp) => match error_from_code(resp.error_code) {
                None => Ok((resp.written, resp.entry_id, resp.metadata)),
                Some(e) => Err(e),
            },
            _ => Err(Error::Protocol),
        }
    }

    pub async fn read(&self, path: &str, offset: u64, size: u64) -> Result<Vec<u8>, Error> {
        let id = random_call_id();
        let req = ReadReq { id, path: path.to_string(), offset, size };
        match self.call(id, PktTag::ReadReq, &req).await? {
            Response::Read(resp) => match error_from_code(resp.error_code) {
                None => Ok(resp.bytes),
                Some(e) => Err(e),
            },
            _ => Err(Error::Protocol),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

async fn dispatch_response(
    pending: &whirlwind::ShardMap<u64, oneshot::Sender<Response>>,
    id: u64,
    response: Response,
) {
    if let Some(sender) = pending.remove(&id).await {
        let _ = sender.send(response);
    } else {
        warn!(id, "dropping response for an unregistered or timed-out call");
    }
}

/// Reads and decodes the record following `tag`, producing the matching
/// typed [`Response`] and its call id. Returns `None` for tags that carry
/// no call id (currently only [`PktTag::Pong`], handled by the caller).
async fn read_response(
    transceiver: &ClientTransceiver,
    tag: PktTag,
) -> crate::wire::Result<Option<(u64, Response)>> {
    let pair = match tag {
        PktTag::LookupResp => {
            let r: LookupResp = transceiver.read_record().await?;
            (r.id, Response::Lookup(r))
        }
        PktTag::ReadMetaResp => {
            let r: ReadMetaResp = transceiver.read_record().await?;
            (r.id, Response::ReadMeta(r))
        }
        PktTag::ListResp => {
            let r: ListResp = transceiver.read_record().await?;
            (r.id, Response::List(r))
        }
        PktTag::FetchResp => {
            let r: FetchResp = transceiver.read_record().await?;
            (r.id, Response::Fetch(r))
        }
        PktTag::ReadDataResp => {
            let r: ReadDataResp = transceiver.read_record().await?;
            (r.id, Response::ReadData(r))
        }
        PktTag::StoreResp => {
            let r: StoreResp = transceiver.read_record().await?;
            (r.id, Response::Store(r))
        }
        PktTag::MkdirResp => {
            let r: MkdirResp = transceiver.read_record().await?;
            (r.id, Response::Mkdir(r))
        }
        PktTag::DeleteResp => {
            let r: DeleteResp = transceiver.read_record().await?;
            (r.id, Response::Delete(r))
        }
        PktTag::WriteResp => {
            let r: WriteResp = transceiver.read_record().await?;
            (r.id, Response::Write(r))
        }
        PktTag::ReadResp => {
            let r: ReadResp = transceiver.read_record().await?;
            (r.id, Response::Read(r))
        }
        _ => return Ok(None),
    };
    Ok(Some(pair))
}

async fn read_service_loop(
    transceiver: Arc<ClientTransceiver>,
    pending: Arc<whirlwind::ShardMap<u64, oneshot::Sender<Response>>>,
    should_run: Arc<AtomicBool>,
    latency: Arc<TokioMutex<Duration>>,
    fatal_tx: Option<mpsc::Sender<String>>,
) {
    while should_run.load(Ordering::Relaxed) {
        let tag = match transceiver.decode_tag().await {
            Ok(tag) => tag,
            Err(e) => {
                should_run.store(false, Ordering::Relaxed);
                let msg = e.to_string();
                warn!(%msg, "client read loop ending");
                if let Some(tx) = fatal_tx {
                    let _ = tx.send(msg).await;
                }
                return;
            }
        };

        let outcome = if tag == PktTag::Pong {
            transceiver.read_record::<PingPong>().await.map(|pong| {
                let now = now_millis();
                let rtt = Duration::from_millis(now.saturating_sub(pong.sent_millis));
                let latency = latency.clone();
                tokio::spawn(async move { *latency.lock().await = rtt; });
            })
        } else {
            read_response(&transceiver, tag).await.map(|maybe| {
                if let Some((id, response)) = maybe {
                    tokio::spawn(dispatch_response_owned(pending.clone(), id, response));
                }
            })
        };

        if let Err(e) = outcome {
            should_run.store(false, Ordering::Relaxed);
            warn!(%e, "client read loop decode error");
            if let Some(tx) = fatal_tx {
                let _ = tx.send(e.to_string()).await;
            }
            return;
        }
    }
}

async fn dispatch_response_owned(
    pending: Arc<whirlwind::ShardMap<u64, oneshot::Sender<Response>>>,
    id: u64,
    response: Response,
) {
    dispatch_response(&pending, id, response).await;
}

async fn keep_alive_loop(transceiver: Arc<ClientTransceiver>, should_run: Arc<AtomicBool>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    while should_run.load(Ordering::Relaxed) {
        ticker.tick().await;
        if !should_run.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = transceiver.send(PktTag::Ping, &PingPong { sent_millis: now_millis() }).await {
            debug!(%e, "keepalive ping failed, read loop will observe the fatal error");
            return;
        }
    }
}
