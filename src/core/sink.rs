// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Where relayed responses go.
//!
//! A [`ResponseSink`] is the writable half of the caller's exchange.  Status
//! and headers are staged with [`ResponseSink::status`] and
//! [`ResponseSink::set_headers`] and committed by the first body operation:
//! either the single-shot [`ResponseSink::send`] or the streaming
//! [`ResponseSink::write`] / [`ResponseSink::end`] pair.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::StatusCode;

use super::{ForwardError, Headers};

/// Writable response side of an inbound exchange.
#[async_trait]
pub trait ResponseSink: Send {
    /// Stage the status code.  Ignored once the head is committed.
    fn status(&mut self, status: StatusCode);

    /// Merge `headers` into the staged headers.  Ignored once the head is committed.
    fn set_headers(&mut self, headers: &Headers);

    /// Whether status and headers have been committed.
    fn headers_sent(&self) -> bool;

    /// Commit the head together with a complete body.
    fn send(&mut self, body: Bytes) -> Result<(), ForwardError>;

    /// Write one body chunk, committing the head first if needed.
    async fn write(&mut self, chunk: Bytes) -> Result<(), ForwardError>;

    /// Finish a streamed body, committing the head first if needed.
    async fn end(&mut self) -> Result<(), ForwardError>;
}

/// In-memory sink that records everything written to it.
#[derive(Debug, Default)]
pub struct CollectingSink {
    status: Option<StatusCode>,
    headers: Headers,
    body: BytesMut,
    committed: bool,
    finished: bool,
    commits: usize,
    chunks: usize,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed status, `200` if none was staged.
    pub fn response_status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn response_headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the response body is complete.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// How many times the head was committed; anything above one is a bug.
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Number of streamed chunks received.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    fn commit(&mut self) -> Result<(), ForwardError> {
        if self.finished {
            return Err(ForwardError::RelayError("response already finished".to_string()));
        }
        if !self.committed {
            self.committed = true;
            self.commits += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl ResponseSink for CollectingSink {
    fn status(&mut self, status: StatusCode) {
        if !self.committed {
            self.status = Some(status);
        }
    }

    fn set_headers(&mut self, headers: &Headers) {
        if !self.committed {
            self.headers.extend_from(headers);
        }
    }

    fn headers_sent(&self) -> bool {
        self.committed
    }

    fn send(&mut self, body: Bytes) -> Result<(), ForwardError> {
        if self.committed {
            return Err(ForwardError::RelayError("headers already sent".to_string()));
        }
        self.commit()?;
        self.body.extend_from_slice(&body);
        self.finished = true;
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), ForwardError> {
        self.commit()?;
        self.chunks += 1;
        self.body.extend_from_slice(&chunk);
        Ok(())
    }

    async fn end(&mut self) -> Result<(), ForwardError> {
        self.commit()?;
        self.finished = true;
        Ok(())
    }
}
