//! Per-connection read/dispatch loop. Grounded on the original
//! `nuggserv/serv/duplex.go`, generalised from a Ping-only dispatcher to
//! all ten RPCs spec.md §4.5 names.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tracing::{debug, warn};

use crate::provider::{self, DataSourceSink};
use crate::wire::{
    DeleteReq, DeleteResp, ErrorCode, FetchReq, FetchResp, ListReq, ListResp, LookupReq, LookupResp,
    MkdirReq, MkdirResp, PingPong, PktTag, ReadDataReq, ReadDataResp, ReadMetaReq, ReadMetaResp, ReadReq,
    ReadResp, StoreReq, StoreResp, Transceiver, WriteReq, WriteResp,
};

fn map_error(e: provider::Error) -> ErrorCode {
    match e {
        provider::Error::PathNotFound | provider::Error::MetaNotFound | provider::Error::ChunkNotFound => {
            ErrorCode::NoEntity
        }
        _ => ErrorCode::Unspec,
    }
}

/// One accepted connection's request/response loop.
pub struct Duplex<S> {
    transceiver: Transceiver<ReadHalf<S>, WriteHalf<S>>,
    provider: Arc<dyn DataSourceSink>,
}

impl<S> Duplex<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, provider: Arc<dyn DataSourceSink>) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Duplex { transceiver: Transceiver::new(read_half, write_half), provider }
    }

    /// Runs the decode-dispatch-respond loop until a fatal decode/encode
    /// error or connection close. The listener this was spawned from
    /// keeps accepting independently.
    pub async fn run(mut self) {
        loop {
            let tag = match self.transceiver.decode_tag().await {
                Ok(tag) => tag,
                Err(e) => {
                    debug!(%e, "connection read loop ending");
                    return;
                }
            };

            if let Err(e) = self.dispatch(tag).await {
                warn!(%e, "connection dispatch failed, closing");
                return;
            }
        }
    }

    async fn dispatch(&mut self, tag: PktTag) -> crate::wire::Result<()> {
        match tag {
            PktTag::Ping => {
                let ping: PingPong = self.transceiver.read_record().await?;
                self.transceiver.send(PktTag::Pong, &ping).await
            }
            PktTag::LookupReq => {
                let req: LookupReq = self.transceiver.read_record().await?;
                let (entry_id, error_code) = match self.provider.lookup(&req.path).await {
                    Ok(id) => (id, ErrorCode::NoError),
                    Err(e) => (crate::model::EntryId([0; 12]), map_error(e)),
                };
                self.transceiver.send(PktTag::LookupResp, &LookupResp { id: req.id, entry_id, error_code }).await
            }
            PktTag::ReadMetaReq => {
                let req: ReadMetaReq = self.transceiver.read_record().await?;
                let (metadata, error_code) = match self.provider.read_meta(req.entry_id).await {
                    Ok(m) => (m, ErrorCode::NoError),
                    Err(e) => (crate::model::Metadata::empty(), map_error(e)),
                };
                self.transceiver.send(PktTag::ReadMetaResp, &ReadMetaResp { id: req.id, metadata, error_code }).await
            }
            PktTag::ListReq => {
                let req: ListReq = self.transceiver.read_record().await?;
                let (entries, error_code) = match self.provider.list(&req.path).await {
                    Ok(e) => (e, ErrorCode::NoError),
                    Err(e) => (Vec::new(), map_error(e)),
                };
                self.transceiver.send(PktTag::ListResp, &ListResp { id: req.id, entries, error_code }).await
            }
            PktTag::FetchReq => {
                let req: FetchReq = self.transceiver.read_record().await?;
                let resp = match self.provider.fetch(&req.path).await {
                    Ok((entry_id, metadata, bytes)) => {
                        FetchResp { id: req.id, entry_id, metadata, bytes, error_code: ErrorCode::NoError }
                    }
                    Err(e) => FetchResp {
                        id: req.id,
                        entry_id: crate::model::EntryId([0; 12]),
                        metadata: crate::model::Metadata::empty(),
                        bytes: Vec::new(),
                        error_code: map_error(e),
                    },
                };
                self.transceiver.send(PktTag::FetchResp, &resp).await
            }
            PktTag::ReadDataReq => {
                let req: ReadDataReq = self.transceiver.read_record().await?;
                let (bytes, error_code) = match self.provider.read_data(req.chunk_id).await {
                    Ok(b) => (b, ErrorCode::NoError),
                    Err(e) => (Vec::new(), map_error(e)),
                };
                self.transceiver.send(PktTag::ReadDataResp, &ReadDataResp { id: req.id, bytes, error_code }).await
            }
            PktTag::StoreReq => {
                let req: StoreReq = self.transceiver.read_record().await?;
                let resp = match self.provider.store(&req.path, &req.bytes).await {
                    Ok((entry_id, metadata)) => {
                        StoreResp { id: req.id, entry_id, metadata, error_code: ErrorCode::NoError }
                    }
                    Err(e) => StoreResp {
                        id: req.id,
                        entry_id: crate::model::EntryId([0; 12]),
                        metadata: crate::model::Metadata::empty(),
                        error_code: map_error(e),
                    },
                };
                self.transceiver.send(PktTag::StoreResp, &resp).await
            }
            PktTag::MkdirReq => {
                let req: MkdirReq = self.transceiver.read_record().await?;
                let resp = match self.provider.mkdir(&req.path).await {
                    Ok((entry_id, metadata)) => {
                        MkdirResp { id: req.id, entry_id, metadata, error_code: ErrorCode::NoError }
                    }
                    Err(e) => MkdirResp {
                        id: req.id,
                        entry_id: crate::model::EntryId([0; 12]),
                        metadata: crate::model::Metadata::empty(),
                        error_code: map_error(e),
                    },
                };
                self.transceiver.send(PktTag::MkdirResp, &resp).await
            }
            PktTag::DeleteReq => {
                let req: DeleteReq = self.transceiver.read_record().await?;
                let error_code = match self.provider.delete(&req.path).await {
                    Ok(()) => ErrorCode::NoError,
                    Err(e) => map_error(e),
                };
                self.transceiver.send(PktTag::DeleteResp, &DeleteResp { id: req.id, error_code }).await
            }
            PktTag::WriteReq => {
                let req: WriteReq = self.transceiver.read_record().await?;
                let resp = self.dispatch_write(req).await;
                self.transceiver.send(PktTag::WriteResp, &resp).await
            }
            PktTag::ReadReq => {
                let req: ReadReq = self.transceiver.read_record().await?;
                let resp = self.dispatch_read(req).await;
                self.transceiver.send(PktTag::ReadResp, &resp).await
            }
            other => {
                warn!(?other, "received a response tag as a request, ignoring");
                Ok(())
            }
        }
    }

    /// `write(path, offset, bytes)` via the provider's optimised path if
    /// it has one, else whole-file fetch + [`provider::do_write`] + store
    /// (spec.md §4.7).
    async fn dispatch_write(&self, req: WriteReq) -> WriteResp {
        if let Some(optimised) = self.provider.optimised() {
            return match optimised.write(&req.path, req.offset, &req.bytes).await {
                Ok(written) => match self.provider.lookup(&req.path).await {
                    Ok(entry_id) => match self.provider.read_meta(entry_id).await {
                        Ok(metadata) => {
                            WriteResp { id: req.id, written, entry_id, metadata, error_code: ErrorCode::NoError }
                        }
                        Err(e) => self.write_err_resp(req.id, e),
                    },
                    Err(e) => self.write_err_resp(req.id, e),
                },
                Err(e) => self.write_err_resp(req.id, e),
            };
        }

        match self.provider.fetch(&req.path).await {
            Ok((_, _, existing)) => {
                let merged = provider::do_write(req.offset, &req.bytes, &existing);
                match self.provider.store(&req.path, &merged).await {
                    Ok((entry_id, metadata)) => WriteResp {
                        id: req.id,
                        written: req.bytes.len() as u64,
                        entry_id,
                        metadata,
                        error_code: ErrorCode::NoError,
                    },
                    Err(e) => self.write_err_resp(req.id, e),
                }
            }
            Err(e) => self.write_err_resp(req.id, e),
        }
    }

    fn write_err_resp(&self, id: u64, e: provider::Error) -> WriteResp {
        WriteResp {
            id,
            written: 0,
            entry_id: crate::model::EntryId([0; 12]),
            metadata: crate::model::Metadata::empty(),
            error_code: map_error(e),
        }
    }

    /// `read(path, offset, size)` via the provider's optimised path if it
    /// has one, else whole-file fetch + in-memory slice.
    async fn dispatch_read(&self, req: ReadReq) -> ReadResp {
        if let Some(optimised) = self.provider.optimised() {
            return match optimised.read(&req.path, req.offset, req.size).await {
                Ok(bytes) => ReadResp { id: req.id, bytes, error_code: ErrorCode::NoError },
                Err(e) => ReadResp { id: req.id, bytes: Vec::new(), error_code: map_error(e) },
            };
        }

        match self.provider.fetch(&req.path).await {
            Ok((_, _, data)) => {
                let offset = req.offset as usize;
                let bytes = if offset >= data.len() {
                    Vec::new()
                } else {
                    let end = (offset + req.size as usize).min(data.len());
                    data[offset..end].to_vec()
                };
                ReadResp { id: req.id, bytes, error_code: ErrorCode::NoError }
            }
            Err(e) => ReadResp { id: req.id, bytes: Vec::new(), error_code: map_error(e) },
        }
    }
}
