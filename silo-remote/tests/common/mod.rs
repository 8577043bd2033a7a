//! In-process fixture server for the remote KV client tests.
//!
//! Implements the `Kv` service over sorted in-memory tables with dup-sort
//! semantics and serves it over the loopback transport. The `Tx` handler is
//! a single sequential task per stream, so replies pair strictly with
//! requests the way a real server's do.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

use silo_kv::Version;
use silo_proto::remote::kv_server::{Kv, KvServer};
use silo_proto::remote::{CursorOp, Empty, Op, Pair, VersionReply};
use silo_remote::{Loopback, RemoteKv, RemoteKvBuilder};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

/// Key to sorted list of values. Non-dup tables hold one value per key.
pub type Table = BTreeMap<Vec<u8>, Vec<Vec<u8>>>;

pub struct FixtureKv {
    version: Version,
    tables: Arc<HashMap<String, Table>>,
}

impl FixtureKv {
    pub fn new(version: Version, tables: HashMap<String, Table>) -> Self {
        Self { version, tables: Arc::new(tables) }
    }
}

/// Build a plain table from `(key, value)` rows.
pub fn table(rows: &[(&[u8], &[u8])]) -> Table {
    rows.iter().map(|(k, v)| (k.to_vec(), vec![v.to_vec()])).collect()
}

/// Build a dup-sort table from `(key, values)` rows; values must be sorted.
pub fn dup_table(rows: &[(&[u8], &[&[u8]])]) -> Table {
    rows.iter()
        .map(|(k, vals)| (k.to_vec(), vals.iter().map(|v| v.to_vec()).collect()))
        .collect()
}

/// Serve the fixture on a fresh loopback transport.
pub fn serve(fixture: FixtureKv) -> Loopback {
    let (loopback, incoming) = Loopback::pair();
    tokio::spawn(async move {
        let _ = tonic::transport::Server::builder()
            .add_service(KvServer::new(fixture))
            .serve_with_incoming(incoming)
            .await;
    });
    loopback
}

/// Open a handle over the loopback with the default chaindata table map.
pub async fn open_db(loopback: Loopback, version: Version) -> RemoteKv {
    RemoteKvBuilder::new(version)
        .in_mem(loopback)
        .open()
        .await
        .expect("open remote kv over loopback")
}

#[tonic::async_trait]
impl Kv for FixtureKv {
    type TxStream = ReceiverStream<Result<Pair, Status>>;

    async fn version(&self, _request: Request<Empty>) -> Result<Response<VersionReply>, Status> {
        Ok(Response::new(self.version.into()))
    }

    async fn tx(
        &self,
        request: Request<Streaming<CursorOp>>,
    ) -> Result<Response<Self::TxStream>, Status> {
        let mut inbound = request.into_inner();
        let tables = self.tables.clone();
        let (reply_tx, reply_rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let mut cursors: HashMap<u32, Cur> = HashMap::new();
            let mut next_id = 0u32;
            loop {
                let req = match inbound.message().await {
                    Ok(Some(req)) => req,
                    Ok(None) | Err(_) => break,
                };
                let reply = apply(&tables, &mut cursors, &mut next_id, req);
                if reply_tx.send(reply).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(reply_rx)))
    }
}

struct Cur {
    table: String,
    pos: Option<(Vec<u8>, usize)>,
}

fn apply(
    tables: &HashMap<String, Table>,
    cursors: &mut HashMap<u32, Cur>,
    next_id: &mut u32,
    req: CursorOp,
) -> Result<Pair, Status> {
    let op = Op::try_from(req.op).map_err(|_| Status::invalid_argument("unknown op"))?;
    match op {
        Op::Open => {
            if !tables.contains_key(&req.bucket_name) {
                return Err(Status::invalid_argument(format!(
                    "unknown bucket {:?}",
                    req.bucket_name
                )));
            }
            *next_id += 1;
            cursors.insert(*next_id, Cur { table: req.bucket_name, pos: None });
            Ok(Pair { k: None, v: None, cursor_id: *next_id })
        }
        Op::Close => {
            cursors
                .remove(&req.cursor)
                .ok_or_else(|| Status::invalid_argument("unknown cursor"))?;
            Ok(Pair::default())
        }
        _ => {
            let cur = cursors
                .get_mut(&req.cursor)
                .ok_or_else(|| Status::invalid_argument("unknown cursor"))?;
            let table = tables
                .get(&cur.table)
                .ok_or_else(|| Status::internal("cursor points at a missing table"))?;
            Ok(step(table, cur, op, req.k.as_deref(), req.v.as_deref()))
        }
    }
}

fn step(t: &Table, cur: &mut Cur, op: Op, k: Option<&[u8]>, v: Option<&[u8]>) -> Pair {
    match op {
        Op::First => position(cur, t.iter().next().map(|(key, vals)| (key.clone(), 0, vals))),
        Op::Last => position(
            cur,
            t.iter().next_back().map(|(key, vals)| (key.clone(), vals.len() - 1, vals)),
        ),
        Op::Current => match cur.pos.clone() {
            Some((key, idx)) => match t.get(&key) {
                Some(vals) if idx < vals.len() => {
                    Pair { k: Some(key), v: Some(vals[idx].clone()), cursor_id: 0 }
                }
                _ => end(),
            },
            None => end(),
        },
        Op::Next => match cur.pos.clone() {
            None => step(t, cur, Op::First, None, None),
            Some((key, idx)) => match t.get(&key) {
                Some(vals) if idx + 1 < vals.len() => position(cur, Some((key, idx + 1, vals))),
                _ => {
                    let after = t.range((Excluded(key), Unbounded)).next();
                    position(cur, after.map(|(key, vals)| (key.clone(), 0, vals)))
                }
            },
        },
        Op::Prev => match cur.pos.clone() {
            None => step(t, cur, Op::Last, None, None),
            Some((key, idx)) if idx > 0 => {
                position(cur, t.get(&key).map(|vals| (key, idx - 1, vals)))
            }
            Some((key, _)) => {
                let before = t.range(..key).next_back();
                position(cur, before.map(|(key, vals)| (key.clone(), vals.len() - 1, vals)))
            }
        },
        Op::Seek => {
            let from = k.unwrap_or_default().to_vec();
            position(cur, t.range(from..).next().map(|(key, vals)| (key.clone(), 0, vals)))
        }
        Op::SeekExact => {
            let key = k.unwrap_or_default();
            position(cur, t.get_key_value(key).map(|(key, vals)| (key.clone(), 0, vals)))
        }
        Op::NextDup => match cur.pos.clone() {
            Some((key, idx)) => match t.get(&key) {
                Some(vals) if idx + 1 < vals.len() => position(cur, Some((key, idx + 1, vals))),
                _ => end(),
            },
            None => end(),
        },
        Op::PrevDup => match cur.pos.clone() {
            Some((key, idx)) if idx > 0 => {
                position(cur, t.get(&key).map(|vals| (key, idx - 1, vals)))
            }
            _ => end(),
        },
        Op::NextNoDup => match cur.pos.clone() {
            None => step(t, cur, Op::First, None, None),
            Some((key, _)) => {
                let after = t.range((Excluded(key), Unbounded)).next();
                position(cur, after.map(|(key, vals)| (key.clone(), 0, vals)))
            }
        },
        Op::PrevNoDup => match cur.pos.clone() {
            None => step(t, cur, Op::Last, None, None),
            Some((key, _)) => {
                let before = t.range(..key).next_back();
                position(cur, before.map(|(key, vals)| (key.clone(), vals.len() - 1, vals)))
            }
        },
        Op::FirstDup => match cur.pos.clone() {
            Some((key, _)) => match t.get(&key) {
                Some(vals) => {
                    cur.pos = Some((key, 0));
                    value_only(Some(vals[0].clone()))
                }
                None => value_only(None),
            },
            None => value_only(None),
        },
        Op::LastDup => match cur.pos.clone() {
            Some((key, _)) => match t.get(&key) {
                Some(vals) => {
                    cur.pos = Some((key, vals.len() - 1));
                    value_only(vals.last().cloned())
                }
                None => value_only(None),
            },
            None => value_only(None),
        },
        Op::SeekBoth => {
            let key = k.unwrap_or_default().to_vec();
            let want = v.unwrap_or_default();
            match t.get(&key) {
                Some(vals) => {
                    let idx = vals.partition_point(|have| have.as_slice() < want);
                    if idx < vals.len() {
                        let found = vals[idx].clone();
                        cur.pos = Some((key, idx));
                        value_only(Some(found))
                    } else {
                        value_only(None)
                    }
                }
                None => value_only(None),
            }
        }
        Op::SeekBothExact => {
            let key = k.unwrap_or_default().to_vec();
            let want = v.unwrap_or_default();
            match t.get(&key).and_then(|vals| {
                vals.binary_search_by(|have| have.as_slice().cmp(want)).ok().map(|idx| (vals, idx))
            }) {
                Some((vals, idx)) => {
                    let found = vals[idx].clone();
                    cur.pos = Some((key.clone(), idx));
                    Pair { k: Some(key), v: Some(found), cursor_id: 0 }
                }
                None => end(),
            }
        }
        Op::Open | Op::Close => unreachable!("handled before step"),
    }
}

fn position(cur: &mut Cur, hit: Option<(Vec<u8>, usize, &Vec<Vec<u8>>)>) -> Pair {
    match hit {
        Some((key, idx, vals)) => {
            let pair = Pair { k: Some(key.clone()), v: Some(vals[idx].clone()), cursor_id: 0 };
            cur.pos = Some((key, idx));
            pair
        }
        None => end(),
    }
}

fn end() -> Pair {
    Pair { k: None, v: None, cursor_id: 0 }
}

fn value_only(v: Option<Vec<u8>>) -> Pair {
    Pair { k: None, v, cursor_id: 0 }
}
