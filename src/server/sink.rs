// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`ResponseSink`] that feeds a hyper response.
//!
//! The engine runs in its own task while the connection task waits for the
//! response head.  The head travels over a oneshot channel the first time
//! the sink commits; streamed chunks follow over a bounded channel that
//! backs the response body.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::Response;
use reqwest::StatusCode;
use tokio::sync::{mpsc, oneshot};

use crate::core::{ForwardError, Headers, ResponseSink};
use crate::{trace_fmt, warn_fmt};

/// Chunks buffered between the engine and the connection.
const BODY_CHANNEL_CAPACITY: usize = 16;

type Chunk = Result<Bytes, io::Error>;

/// Writable half of a hyper exchange.
#[derive(Debug)]
pub struct HyperSink {
    status: StatusCode,
    headers: Headers,
    head: Option<oneshot::Sender<Response<reqwest::Body>>>,
    body: Option<mpsc::Sender<Chunk>>,
    committed: bool,
    finished: bool,
}

impl HyperSink {
    /// Create a sink and the receiver the connection task awaits the head on.
    ///
    /// The receiver errors if the sink is dropped without committing.
    pub fn channel() -> (Self, oneshot::Receiver<Response<reqwest::Body>>) {
        let (tx, rx) = oneshot::channel();
        let sink = Self {
            status: StatusCode::OK,
            headers: Headers::new(),
            head: Some(tx),
            body: None,
            committed: false,
            finished: false,
        };
        (sink, rx)
    }

    fn commit(&mut self, body: reqwest::Body) -> Result<(), ForwardError> {
        let head = self
            .head
            .take()
            .ok_or_else(|| ForwardError::RelayError("headers already sent".to_string()))?;
        self.committed = true;

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.to_header_map()?;

        head.send(response)
            .map_err(|_| ForwardError::RelayError("caller went away".to_string()))
    }

    fn commit_streaming(&mut self) -> Result<(), ForwardError> {
        if self.committed {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel::<Chunk>(BODY_CHANNEL_CAPACITY);
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        self.body = Some(tx);
        self.commit(reqwest::Body::wrap_stream(stream))
    }
}

#[async_trait]
impl ResponseSink for HyperSink {
    fn status(&mut self, status: StatusCode) {
        if !self.committed {
            self.status = status;
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
        self.commit(reqwest::Body::from(body))?;
        self.finished = true;
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), ForwardError> {
        self.commit_streaming()?;
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| ForwardError::RelayError("response already finished".to_string()))?;

        trace_fmt!("HyperSink", "Writing {} byte chunk", chunk.len());
        body.send(Ok(chunk))
            .await
            .map_err(|_| ForwardError::RelayError("caller went away".to_string()))
    }

    async fn end(&mut self) -> Result<(), ForwardError> {
        self.commit_streaming()?;
        // closing the channel ends the body stream
        self.body = None;
        self.finished = true;
        Ok(())
    }
}

impl Drop for HyperSink {
    fn drop(&mut self) {
        // A streamed body left unfinished must not look complete to the caller.
        if let Some(body) = self.body.take() {
            if !self.finished {
                warn_fmt!("HyperSink", "Aborting unfinished response body");
                let _ = body.try_send(Err(io::Error::other("response body aborted")));
            }
        }
    }
}
