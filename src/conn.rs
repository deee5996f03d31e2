//! The connection façade: a state machine plus the public operations it
//! exposes, built on top of [`crate::engine::Engine`] and the algorithm
//! objects, per spec §3's connection lifecycle and §4.6–§4.8.
//!
//! Grounded in `zero-mysql`'s `tokio/conn.rs` (`Conn`, owning a live
//! `TcpStream` and driving `Query`/`Exec` state machines over it directly)
//! generalized so the socket loop itself lives in `Engine` and this type
//! only tracks handshake results and the not-connected/ready/engaged
//! status spec §3 names.

use std::collections::VecDeque;

use crate::algorithm::close_statement::CloseStatementAlgorithm;
use crate::algorithm::connect::{ConnectAlgorithm, ConnectOutcome};
use crate::algorithm::execute::ExecuteAlgorithm;
use crate::algorithm::ping::PingAlgorithm;
use crate::algorithm::prepare::PrepareAlgorithm;
use crate::algorithm::query::QueryAlgorithm;
use crate::algorithm::quit::QuitAlgorithm;
use crate::algorithm::reset::ResetConnectionAlgorithm;
use crate::algorithm::set_character_set::SetCharacterSetAlgorithm;
use crate::algorithm::{Algorithm, QueryResult};
use crate::constant::CapabilityFlags;
use crate::engine::{Engine, Transport};
use crate::error::{Error, Result};
use crate::opts::ConnectOpts;
use crate::prepared::PreparedStatement;
use crate::protocol::column::MetadataMode;
use crate::protocol::row::Row;
use crate::value::Value;

/// Connection status, per spec §3's connection-state data model
/// (`not-connected`/`ready`/`engaged-in-multi-function`, with `broken`
/// standing in for "a fatal error returned it to not-connected" — the
/// façade keeps the dead transport around rather than dropping it so the
/// caller can still retrieve diagnostics before reconnecting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ready,
    EngagedInMultiFunction,
    Broken,
}

/// Buffered rows left over from a [`Conn::start_execution`] call, drained
/// incrementally by [`Conn::read_some_rows`].
///
/// This is a pragmatic simplification of spec §4.7's incremental read
/// contract: rather than truly streaming rows off the wire as the caller
/// asks for them, `start_execution` runs its query algorithm to completion
/// up front (the algorithm objects in `crate::algorithm` aren't built to
/// suspend mid-resultset) and `read_some_rows` serves the already-buffered
/// rows one resultset at a time. See DESIGN.md.
struct PendingRows {
    current: std::vec::IntoIter<Row>,
    rest: VecDeque<QueryResult>,
}

impl PendingRows {
    fn new(mut results: Vec<QueryResult>) -> Self {
        let mut rest: VecDeque<QueryResult> = results.drain(..).collect();
        let current = rest.pop_front().map(|r| r.rows).unwrap_or_default().into_iter();
        Self { current, rest }
    }

    /// Returns the next non-empty batch of rows, or `None` once every
    /// buffered resultset has been drained.
    fn next_batch(&mut self) -> Option<Vec<Row>> {
        loop {
            let batch: Vec<Row> = self.current.by_ref().collect();
            if !batch.is_empty() {
                return Some(batch);
            }
            match self.rest.pop_front() {
                Some(next) => self.current = next.rows.into_iter(),
                None => return None,
            }
        }
    }
}

/// A live MySQL/MariaDB connection over a generic [`Transport`].
pub struct Conn<T> {
    engine: Engine<T>,
    capabilities: CapabilityFlags,
    connection_id: u32,
    server_version: String,
    is_mariadb: bool,
    metadata_mode: MetadataMode,
    status: Status,
    pending: Option<PendingRows>,
}

impl<T: Transport> Conn<T> {
    /// Drives the handshake algorithm to completion over `transport`,
    /// per spec §4.6. On failure the transport is dropped along with the
    /// half-built engine; nothing is returned to reuse.
    #[tracing::instrument(skip_all, fields(username = %opts.username))]
    pub async fn connect(transport: T, opts: &ConnectOpts) -> Result<Self> {
        let mut engine = Engine::new(transport);
        let mut algorithm = ConnectAlgorithm::new(opts);
        let outcome: ConnectOutcome = engine.run(&mut algorithm).await?;
        Ok(Self {
            engine,
            capabilities: outcome.capabilities,
            connection_id: outcome.connection_id,
            server_version: outcome.server_version,
            is_mariadb: outcome.is_mariadb,
            metadata_mode: if opts.full_metadata { MetadataMode::Full } else { MetadataMode::Minimal },
            status: Status::Ready,
            pending: None,
        })
    }

    pub fn capabilities(&self) -> CapabilityFlags {
        self.capabilities
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn is_mariadb(&self) -> bool {
        self.is_mariadb
    }

    /// Whether a [`Conn::start_execution`] call's rows haven't been fully
    /// drained with [`Conn::read_some_rows`] yet.
    pub fn is_engaged(&self) -> bool {
        self.status == Status::EngagedInMultiFunction
    }

    /// Whether a prior fatal error left the connection in an undefined
    /// protocol state, per spec §7.1. Consulted by [`crate::pool`] to
    /// decide whether a returned connection goes back to idle or is
    /// replaced outright.
    pub fn is_broken(&self) -> bool {
        self.status == Status::Broken
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.status {
            Status::Ready => Ok(()),
            Status::EngagedInMultiFunction => Err(Error::ConnectionBusy),
            Status::Broken => Err(Error::ConnectionClosed),
        }
    }

    /// Runs one algorithm to completion, demoting the connection to
    /// `broken` if it fails with an error spec §7.1 classifies as fatal
    /// (undefined protocol/transport state).
    async fn run<A: Algorithm>(&mut self, mut algorithm: A) -> Result<A::Output> {
        match self.engine.run(&mut algorithm).await {
            Ok(output) => Ok(output),
            Err(err) => {
                if err.is_fatal() {
                    self.status = Status::Broken;
                }
                Err(err)
            }
        }
    }

    /// Runs a text query to completion, per spec §4.7. Ordinarily yields
    /// one resultset; a `CALL` with OUT params or a chained multi-result
    /// statement yields more than one.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<QueryResult>> {
        self.ensure_ready()?;
        self.run(QueryAlgorithm::new(sql, self.metadata_mode)).await
    }

    /// Executes a prepared statement with binary-protocol parameters, per
    /// spec §4.8.
    pub async fn execute(&mut self, statement: &PreparedStatement, params: &[Value]) -> Result<Vec<QueryResult>> {
        self.ensure_ready()?;
        let algorithm = ExecuteAlgorithm::new(statement.statement_id(), statement.param_count(), params, self.metadata_mode)?;
        self.run(algorithm).await
    }

    /// Prepares `sql` on the server, per spec §4.8.
    pub async fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        self.ensure_ready()?;
        self.run(PrepareAlgorithm::new(sql, self.metadata_mode)).await
    }

    /// Destroys a previously prepared statement. Consumes `statement` so
    /// it can't be executed again after the server forgets it.
    pub async fn close_statement(&mut self, statement: PreparedStatement) -> Result<()> {
        self.ensure_ready()?;
        self.run(CloseStatementAlgorithm::new(statement.statement_id())).await
    }

    pub async fn ping(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.run(PingAlgorithm).await
    }

    /// Issues `COM_RESET_CONNECTION`, clearing session state (open
    /// transactions, temp tables, user variables) without reopening the
    /// socket, per spec §4.9's `reset_on_return` pool option.
    pub async fn reset(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.run(ResetConnectionAlgorithm).await
    }

    pub async fn set_character_set(&mut self, charset_name: &str) -> Result<()> {
        self.ensure_ready()?;
        self.run(SetCharacterSetAlgorithm::new(charset_name)).await
    }

    /// Sends `COM_QUIT` and hands back the underlying transport; the
    /// server closes its end without replying, so this never blocks on a
    /// read, per spec §4.7's command table.
    pub async fn quit(mut self) -> Result<T> {
        self.ensure_ready()?;
        self.run(QuitAlgorithm).await?;
        Ok(self.engine.into_transport())
    }

    /// Starts an incremental read: runs `sql` to completion and transitions
    /// to `engaged-in-multi-function` until every buffered resultset has
    /// been drained by [`Conn::read_some_rows`], per spec §4.7. See
    /// [`PendingRows`]'s doc comment for how "incremental" is implemented
    /// here.
    pub async fn start_execution(&mut self, sql: &str) -> Result<()> {
        self.ensure_ready()?;
        let results = self.run(QueryAlgorithm::new(sql, self.metadata_mode)).await?;
        self.status = Status::EngagedInMultiFunction;
        self.pending = Some(PendingRows::new(results));
        Ok(())
    }

    /// Drains the next batch of buffered rows. An empty return means every
    /// resultset opened by [`Conn::start_execution`] has been consumed;
    /// the connection returns to `ready` at that point.
    pub fn read_some_rows(&mut self) -> Result<Vec<Row>> {
        let pending = self.pending.as_mut().ok_or(Error::NotExecuting)?;
        match pending.next_batch() {
            Some(rows) => Ok(rows),
            None => {
                self.pending = None;
                self.status = Status::Ready;
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque as Deque;

    struct ScriptedTransport {
        inbound: Deque<u8>,
        outbound: Vec<u8>,
    }

    impl ScriptedTransport {
        fn new(inbound: Vec<u8>) -> Self {
            Self {
                inbound: inbound.into(),
                outbound: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        async fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbound.pop_front().unwrap();
            }
            Ok(n)
        }

        async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
            self.outbound.extend_from_slice(buf);
            Ok(())
        }
    }

    fn frame(payload: &[u8], seq: u8) -> Vec<u8> {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
        wire.push(seq);
        wire.extend_from_slice(payload);
        wire
    }

    fn greeting_payload() -> Vec<u8> {
        let mut p = Vec::new();
        p.push(10);
        p.extend_from_slice(b"8.0.34\0");
        p.extend_from_slice(&1u32.to_le_bytes());
        p.extend_from_slice(&[1u8; 8]);
        p.push(0);
        let caps = CapabilityFlags::CLIENT_PROTOCOL_41 | CapabilityFlags::CLIENT_PLUGIN_AUTH;
        p.extend_from_slice(&(caps.bits() as u16).to_le_bytes());
        p.push(45);
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(&((caps.bits() >> 16) as u16).to_le_bytes());
        p.push(21);
        p.extend_from_slice(&[0u8; 10]);
        p.extend_from_slice(&[2u8; 12]);
        p.push(0);
        p.extend_from_slice(b"mysql_native_password\0");
        p
    }

    fn ok_payload() -> Vec<u8> {
        let mut p = vec![0x00, 0, 0];
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p
    }

    async fn connected() -> Conn<ScriptedTransport> {
        let mut inbound = Vec::new();
        inbound.extend_from_slice(&frame(&greeting_payload(), 0));
        inbound.extend_from_slice(&frame(&ok_payload(), 2));
        let transport = ScriptedTransport::new(inbound);
        let opts = ConnectOpts {
            username: "root".into(),
            ..ConnectOpts::default()
        };
        Conn::connect(transport, &opts).await.unwrap()
    }

    #[tokio::test]
    async fn connect_populates_handshake_outcome() {
        let conn = connected().await;
        assert_eq!(conn.connection_id(), 1);
        assert!(!conn.is_mariadb());
    }

    #[tokio::test]
    async fn ping_while_engaged_is_rejected() {
        let mut conn = connected().await;
        conn.status = Status::EngagedInMultiFunction;
        let err = conn.ping().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionBusy));
    }

    #[tokio::test]
    async fn read_some_rows_without_start_execution_fails() {
        let mut conn = connected().await;
        let err = conn.read_some_rows().unwrap_err();
        assert!(matches!(err, Error::NotExecuting));
    }

    #[test]
    fn pending_rows_drains_one_resultset_per_batch() {
        let first = QueryResult {
            columns: Vec::new(),
            rows: vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
            ok: Default::default(),
        };
        let second = QueryResult {
            columns: Vec::new(),
            rows: vec![vec![Value::Int64(3)]],
            ok: Default::default(),
        };
        let mut pending = PendingRows::new(vec![first, second]);
        assert_eq!(pending.next_batch().unwrap().len(), 2);
        assert_eq!(pending.next_batch().unwrap().len(), 1);
        assert!(pending.next_batch().is_none());
    }
}
