//! Client/server sync rounds over scripted channels.

use crate::channel::LossyChannel;
use crate::server::LoopbackServer;
use diffsync_engine::{ClientSynchronizer, SyncEngine, SyncError, SyncResult};
use diffsync_protocol::{ClientDocument, DocumentKey};
use diffsync_store::DataStore;

/// What happened during one [`SyncHarness::round`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Client messages the server received.
    pub uplink_delivered: usize,
    /// Server messages the client received.
    pub downlink_delivered: usize,
    /// Edits the client recovered through its backup shadow.
    pub recovered: usize,
}

/// A client engine wired to a [`LoopbackServer`].
///
/// The server only answers when a client message reached it.
pub struct SyncHarness<S: ClientSynchronizer, D> {
    /// The client engine under test.
    pub engine: SyncEngine<S, D>,
    /// The server peer.
    pub server: LoopbackServer<S>,
    /// Client to server.
    pub uplink: LossyChannel,
    /// Server to client.
    pub downlink: LossyChannel,
    key: DocumentKey,
}

impl<S, D> SyncHarness<S, D>
where
    S: ClientSynchronizer + Clone,
    D: DataStore<S::Content>,
{
    /// Adds `document` to the engine and starts a server with the same content.
    pub fn new(engine: SyncEngine<S, D>, document: &ClientDocument<S::Content>) -> SyncResult<Self> {
        engine.add_document(document)?;
        let key = document.key();
        let server = LoopbackServer::new(engine.synchronizer().clone(), &key, document.content.clone());
        Ok(Self {
            engine,
            server,
            uplink: LossyChannel::reliable(),
            downlink: LossyChannel::reliable(),
            key,
        })
    }

    /// Replaces both channels.
    pub fn with_channels(mut self, uplink: LossyChannel, downlink: LossyChannel) -> Self {
        self.uplink = uplink;
        self.downlink = downlink;
        self
    }

    /// Returns the synced key.
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Returns the client's current content.
    pub fn client_content(&self) -> SyncResult<S::Content> {
        self.engine
            .document(&self.key)?
            .map(|d| d.content)
            .ok_or_else(|| SyncError::DocumentNotFound(self.key.clone()))
    }

    /// Runs one exchange, optionally changing the client content first.
    pub fn round(&mut self, local: Option<S::Content>) -> SyncResult<RoundReport> {
        let mut report = RoundReport::default();

        let content = match local {
            Some(content) => content,
            None => self.client_content()?,
        };
        let document = ClientDocument::new(
            self.key.document_id.clone(),
            self.key.client_id.clone(),
            content,
        );
        let message = self.engine.diff(&document)?;

        for delivered in self.uplink.transmit(message) {
            self.server.receive(&delivered)?;
            report.uplink_delivered += 1;
        }
        if report.uplink_delivered == 0 {
            return Ok(report);
        }

        let reply = self.server.reply();
        for delivered in self.downlink.transmit(reply) {
            report.downlink_delivered += 1;
            let outcome = self.engine.patch(&delivered)?;
            report.recovered += outcome.recovered;
            if let Some(resync) = outcome.resync {
                for corrective in self.uplink.transmit(resync) {
                    self.server.receive(&corrective)?;
                }
            }
        }
        Ok(report)
    }

    /// Runs `rounds` exchanges without local changes.
    pub fn settle(&mut self, rounds: usize) -> SyncResult<()> {
        for _ in 0..rounds {
            self.round(None)?;
        }
        Ok(())
    }

    /// Returns true if client and server hold the same content and the
    /// client has nothing left to send.
    pub fn is_converged(&self) -> SyncResult<bool> {
        Ok(&self.client_content()? == self.server.content()
            && self.engine.pending_edits(&self.key)?.is_empty())
    }
}
