//! JSON-lines request loop.
//!
//! Each stdin line holds one [`Envelope`]. Every request is bracketed by
//! `status: busy` and `status: idle`; stream text and display data are
//! written as they are produced, before the reply.

use std::io::{BufRead, Write};

use nixkernel_foundation::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::completeness::Completeness;
use crate::display::DisplayBundle;
use crate::errors::translate;
use crate::output::{Output, OutputStream};
use crate::protocol::{
    Body, CompleteReply, CompleteRequest, DisplayData, Envelope, ExecuteReplyContent, ExecuteRequest, ExecuteResult,
    ExecutionState, FailedReply, InspectReply, InspectRequest, InterruptReply, IsCompleteReply, IsCompleteRequest, KernelInfoReply,
    Message, Metadata, ShutdownReply, ShutdownRequest, StatusContent, StreamContent,
};
use crate::session::{Session, Status};

/// Whether the loop keeps reading after a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Read the next request.
    Continue,
    /// A shutdown was requested.
    Shutdown,
}

/// Serves a [`Session`] over newline-delimited JSON.
pub struct Kernel<W: Write> {
    session: Session,
    writer: W,
}

impl<W: Write> Kernel<W> {
    /// Creates a kernel writing messages to `writer`.
    pub const fn new(session: Session, writer: W) -> Self {
        Self { session, writer }
    }

    /// Returns the session.
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the message sink.
    pub const fn writer(&self) -> &W {
        &self.writer
    }

    /// Consumes the kernel, returning the message sink.
    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Handles requests from `reader` until end of input or shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if reading requests or writing messages fails.
    /// Malformed requests are logged and skipped.
    pub fn serve<R: BufRead>(&mut self, reader: R) -> Result<()> {
        info!("kernel ready");
        for line in reader.lines() {
            let line = line.map_err(|e| Error::io("cannot read request", &e))?;
            if line.trim().is_empty() {
                continue;
            }
            if self.handle_line(&line)? == Flow::Shutdown {
                break;
            }
        }
        info!("kernel stopped");
        Ok(())
    }

    /// Handles one request line.
    ///
    /// # Errors
    ///
    /// Returns an error if a message cannot be written.
    pub fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "ignoring malformed request");
                return Ok(Flow::Continue);
            }
        };
        self.handle(envelope)
    }

    /// Handles one decoded request.
    ///
    /// # Errors
    ///
    /// Returns an error if a message cannot be written.
    #[instrument(skip(self, envelope), fields(msg_id = %envelope.msg_id, msg_type = %envelope.msg_type))]
    pub fn handle(&mut self, envelope: Envelope) -> Result<Flow> {
        let parent = envelope.msg_id.clone();
        self.send(&parent, Body::Status(StatusContent {
            execution_state: ExecutionState::Busy,
        }))?;
        let flow = self.respond(&parent, envelope);
        self.send(&parent, Body::Status(StatusContent {
            execution_state: ExecutionState::Idle,
        }))?;
        flow
    }

    fn respond(&mut self, parent: &str, envelope: Envelope) -> Result<Flow> {
        let reply = match envelope.msg_type.as_str() {
            "execute_request" => {
                let Some(request) = self.decode::<ExecuteRequest>(parent, &envelope)? else {
                    return Ok(Flow::Continue);
                };
                Body::ExecuteReply(self.execute(parent, &request)?)
            }
            "complete_request" => {
                let Some(request) = self.decode::<CompleteRequest>(parent, &envelope)? else {
                    return Ok(Flow::Continue);
                };
                let completion = self.session.complete(&request.code, request.cursor_pos);
                Body::CompleteReply(CompleteReply {
                    status: Status::Ok,
                    matches: completion.matches,
                    cursor_start: completion.cursor_start,
                    cursor_end: completion.cursor_end,
                    metadata: Metadata::new(),
                })
            }
            "inspect_request" => {
                let Some(request) = self.decode::<InspectRequest>(parent, &envelope)? else {
                    return Ok(Flow::Continue);
                };
                let doc = self.session.inspect(&request.code, request.cursor_pos);
                Body::InspectReply(InspectReply {
                    status: Status::Ok,
                    found: doc.is_some(),
                    data: doc.map(|doc| DisplayBundle::markdown(doc.markdown())).unwrap_or_default(),
                    metadata: Metadata::new(),
                })
            }
            "is_complete_request" => {
                let Some(request) = self.decode::<IsCompleteRequest>(parent, &envelope)? else {
                    return Ok(Flow::Continue);
                };
                let status = self.session.is_complete(&request.code);
                Body::IsCompleteReply(IsCompleteReply {
                    status,
                    indent: (status == Completeness::Incomplete).then(String::new),
                })
            }
            "kernel_info_request" => Body::KernelInfoReply(KernelInfoReply::default()),
            "interrupt_request" => {
                self.session.interrupt().trigger();
                Body::InterruptReply(InterruptReply { status: Status::Ok })
            }
            "shutdown_request" => {
                let request: ShutdownRequest = serde_json::from_value(envelope.content).unwrap_or_default();
                self.send(parent, Body::ShutdownReply(ShutdownReply {
                    status: Status::Ok,
                    restart: request.restart,
                }))?;
                return Ok(Flow::Shutdown);
            }
            other => {
                warn!(msg_type = other, "ignoring unknown request");
                return Ok(Flow::Continue);
            }
        };
        self.send(parent, reply)?;
        Ok(Flow::Continue)
    }

    fn execute(&mut self, parent: &str, request: &ExecuteRequest) -> Result<ExecuteReplyContent> {
        let mut publisher = Publisher {
            writer: &mut self.writer,
            parent,
            silent: request.silent,
            failed: None,
        };
        let reply = self.session.execute(&request.code, &mut publisher);
        if let Some(e) = publisher.failed {
            return Err(Error::io("cannot write message", &e));
        }
        debug!(status = ?reply.status, count = reply.execution_count, "executed");

        if !request.silent {
            if let Some(data) = reply.display {
                self.send(parent, Body::ExecuteResult(ExecuteResult {
                    execution_count: reply.execution_count,
                    data,
                    metadata: Metadata::new(),
                }))?;
            }
            if let Some(error) = &reply.error {
                self.send(parent, Body::Error(error.clone()))?;
            }
        }
        Ok(ExecuteReplyContent {
            status: reply.status,
            execution_count: reply.execution_count,
            error: reply.error,
        })
    }

    /// Decodes request content, answering with an error reply when it is
    /// malformed.
    fn decode<T: DeserializeOwned>(&mut self, parent: &str, envelope: &Envelope) -> Result<Option<T>> {
        match serde_json::from_value(envelope.content.clone()) {
            Ok(request) => Ok(Some(request)),
            Err(e) => {
                warn!(msg_type = %envelope.msg_type, error = %e, "malformed request content");
                let err = Error::eval(format!("malformed {} content: {e}", envelope.msg_type));
                let reply = FailedReply::new(parent, &envelope.msg_type, translate(&err, false));
                write_message(&mut self.writer, &reply).map_err(|e| Error::io("cannot write message", &e))?;
                Ok(None)
            }
        }
    }

    fn send(&mut self, parent: &str, body: Body) -> Result<()> {
        write_message(&mut self.writer, &Message::new(parent, body)).map_err(|e| Error::io("cannot write message", &e))
    }
}

impl<W: Write> std::fmt::Debug for Kernel<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel").field("session", &self.session).finish_non_exhaustive()
    }
}

fn write_message(writer: &mut dyn Write, message: &impl Serialize) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, message).map_err(std::io::Error::from)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Forwards session output as messages while a request runs.
struct Publisher<'a, W: Write> {
    writer: &'a mut W,
    parent: &'a str,
    silent: bool,
    failed: Option<std::io::Error>,
}

impl<W: Write> Publisher<'_, W> {
    fn publish(&mut self, body: Body) {
        if self.silent || self.failed.is_some() {
            return;
        }
        if let Err(e) = write_message(&mut *self.writer, &Message::new(self.parent, body)) {
            self.failed = Some(e);
        }
    }
}

impl<W: Write> Output for Publisher<'_, W> {
    fn stream(&mut self, stream: OutputStream, text: &str) {
        if text.is_empty() {
            return;
        }
        self.publish(Body::Stream(StreamContent {
            name: stream.name().to_string(),
            text: text.to_string(),
        }));
    }

    fn display(&mut self, bundle: DisplayBundle) {
        self.publish(Body::DisplayData(DisplayData {
            data: bundle,
            metadata: Metadata::new(),
        }));
    }
}
