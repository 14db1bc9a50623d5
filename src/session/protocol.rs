//! Wire protocol for daemon↔client IPC.
//!
//! Each frame on the socket is a little-endian u32 body length followed
//! by the body: one tag byte and its payload. Three tags exist — JSON
//! control traffic, and two raw-byte directions for PTY data, each
//! prefixed with the 8-byte PTY id it routes to:
//!
//! ```text
//! ┌─────────────┬──────┬──────────────────────────────┐
//! │ u32 LE len  │ tag  │ payload (len - 1 bytes)      │
//! ├─────────────┼──────┼──────────────────────────────┤
//! │             │ 0x01 │ JSON (request/response/push) │
//! │             │ 0x02 │ u64 LE pty_id + output bytes │
//! │             │ 0x03 │ u64 LE pty_id + input bytes  │
//! └─────────────┴──────┴──────────────────────────────┘
//! ```
//!
//! PTY bytes ride in dedicated binary frames so the hot path never touches
//! JSON and round-trips bit-exact. Control traffic is JSON with stable
//! field names: requests `{op, id, …}`, responses `{id, ok, message?,
//! data?}`, pushes `{push, …}`.

use anyhow::{anyhow, bail, ensure, Result};
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::state::{SessionState, TerminalState};
use crate::tape::TapeCommand;

/// Ceiling on one frame's body. Big enough for a full terminal-state
/// snapshot with scrollback, small enough that a corrupt length prefix
/// can't ask us to buffer gigabytes.
const FRAME_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Frame tag bytes.
pub mod frame_type {
    /// JSON control message.
    pub const JSON: u8 = 0x01;
    /// PTY output binary (daemon → client).
    pub const PTY_OUTPUT: u8 = 0x02;
    /// PTY input binary (client → daemon).
    pub const PTY_INPUT: u8 = 0x03;
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// JSON control message.
    Json(Value),
    /// Raw PTY output (daemon → client).
    PtyOutput {
        /// Source PTY.
        pty_id: u64,
        /// Raw bytes.
        data: Vec<u8>,
    },
    /// Raw PTY input (client → daemon).
    PtyInput {
        /// Target PTY.
        pty_id: u64,
        /// Raw bytes.
        data: Vec<u8>,
    },
}

impl Frame {
    /// Encode into wire form.
    ///
    /// The body is serialized straight after four placeholder bytes and
    /// the length prefix is patched in afterwards — no intermediate
    /// payload buffer, one allocation per frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut wire = vec![0u8; 4];
        match self {
            Frame::Json(value) => {
                wire.push(frame_type::JSON);
                serde_json::to_writer(&mut wire, value)
                    .expect("serializing a serde_json::Value cannot fail");
            }
            Frame::PtyOutput { pty_id, data } => {
                wire.reserve(9 + data.len());
                wire.push(frame_type::PTY_OUTPUT);
                wire.extend_from_slice(&pty_id.to_le_bytes());
                wire.extend_from_slice(data);
            }
            Frame::PtyInput { pty_id, data } => {
                wire.reserve(9 + data.len());
                wire.push(frame_type::PTY_INPUT);
                wire.extend_from_slice(&pty_id.to_le_bytes());
                wire.extend_from_slice(data);
            }
        }
        let body_len = (wire.len() - 4) as u32;
        wire[..4].copy_from_slice(&body_len.to_le_bytes());
        wire
    }

    /// Decode one complete frame body (tag byte already split off).
    fn decode_body(tag: u8, payload: &[u8]) -> Result<Frame> {
        match tag {
            frame_type::JSON => {
                let value: Value = serde_json::from_slice(payload)
                    .map_err(|e| anyhow!("control frame is not valid JSON: {e}"))?;
                Ok(Frame::Json(value))
            }
            frame_type::PTY_OUTPUT => {
                let (pty_id, data) = split_pty_routing(payload)?;
                Ok(Frame::PtyOutput { pty_id, data })
            }
            frame_type::PTY_INPUT => {
                let (pty_id, data) = split_pty_routing(payload)?;
                Ok(Frame::PtyInput { pty_id, data })
            }
            other => bail!("frame tag {other:#04x} is not part of this protocol"),
        }
    }
}

/// Peel the 8-byte PTY id off a binary frame's payload.
fn split_pty_routing(payload: &[u8]) -> Result<(u64, Vec<u8>)> {
    ensure!(
        payload.len() >= 8,
        "PTY frame lacks its routing header ({} of 8 bytes)",
        payload.len()
    );
    let (header, data) = payload.split_at(8);
    let pty_id = u64::from_le_bytes(header.try_into().expect("split at 8"));
    Ok((pty_id, data.to_vec()))
}

/// Incremental frame decoder over a stream of partial reads.
///
/// Bytes accumulate in a [`BytesMut`] and complete frames are split off
/// the front; everything short of a full frame just waits for the next
/// chunk.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    /// Empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every frame it completed.
    ///
    /// # Errors
    ///
    /// A malformed length prefix or frame body poisons the stream — the
    /// caller should drop the connection rather than resynchronize.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.split_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Split one complete frame off the front, or `None` if more bytes
    /// are needed.
    fn split_frame(&mut self) -> Result<Option<Frame>> {
        let Some(prefix) = self.buf.get(..4) else {
            return Ok(None);
        };
        let declared = u32::from_le_bytes(prefix.try_into().expect("4 bytes")) as usize;
        ensure!(declared >= 1, "length prefix declares an empty frame body");
        ensure!(
            declared <= FRAME_BODY_LIMIT,
            "length prefix declares a {declared}-byte body (limit {FRAME_BODY_LIMIT})"
        );
        if self.buf.len() - 4 < declared {
            return Ok(None);
        }

        self.buf.advance(4);
        let body = self.buf.split_to(declared);
        let (tag, payload) = body.split_first().expect("body length checked >= 1");
        Frame::decode_body(*tag, payload).map(Some)
    }

    /// Bytes buffered toward the next (incomplete) frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

// ── Control messages ──────────────────────────────────────────────────────

/// Client → daemon operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Spawn a shell in a new PTY.
    CreatePty {
        /// Window title hint.
        title: String,
        /// Columns.
        cols: u16,
        /// Rows.
        rows: u16,
    },
    /// Resize a PTY (child gets SIGWINCH).
    ResizePty {
        /// Target PTY.
        pty_id: u64,
        /// Columns.
        cols: u16,
        /// Rows.
        rows: u16,
    },
    /// Kill a PTY's child and drop it.
    ClosePty {
        /// Target PTY.
        pty_id: u64,
    },
    /// Start receiving output frames for a PTY.
    SubscribePty {
        /// Target PTY.
        pty_id: u64,
    },
    /// Stop receiving output frames for a PTY.
    UnsubscribePty {
        /// Target PTY.
        pty_id: u64,
    },
    /// Snapshot a PTY's grid, scrollback, and modes.
    GetTerminalState {
        /// Target PTY.
        pty_id: u64,
        /// Include archived scrollback rows.
        #[serde(default)]
        include_scrollback: bool,
    },
    /// Replace the authoritative session state; fanned out to peers.
    UpdateState {
        /// The new state.
        state: SessionState,
    },
    /// Advertise this client's outer TTY size.
    NotifyTerminalSize {
        /// Columns.
        cols: u16,
        /// Rows.
        rows: u16,
    },
    /// Reply to a forwarded remote command.
    SendCommandResult {
        /// Correlation id from the `run_command` push.
        request_id: String,
        /// Whether it succeeded.
        ok: bool,
        /// Human-readable failure text.
        #[serde(default)]
        message: Option<String>,
        /// Inspection payload.
        #[serde(default)]
        data: Option<Value>,
    },
    /// Ask the daemon to route a command to an attached UI client.
    RunCommand {
        /// The command to execute.
        command: TapeCommand,
    },
    /// Session summary (for `ls` / `session-info`).
    SessionInfo,
    /// Orderly detach.
    Detach,
    /// Terminate the daemon (kill-server).
    Shutdown,
}

/// Request envelope with correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id, echoed in the response.
    pub id: u64,
    /// The operation.
    #[serde(flatten)]
    pub request: Request,
}

/// Daemon → client response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id.
    pub id: u64,
    /// Success flag.
    pub ok: bool,
    /// Failure text when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Operation payload (pty ids, terminal state, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    /// A success response.
    pub fn ok(id: u64, data: Option<Value>) -> Self {
        Self {
            id,
            ok: true,
            message: None,
            data,
        }
    }

    /// A failure response.
    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Daemon → client pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "push", rename_all = "snake_case")]
pub enum Push {
    /// Authoritative state replaced by another client.
    StateSync {
        /// The new state.
        state: SessionState,
        /// What caused it.
        trigger: String,
        /// Which client sent it.
        source_id: String,
    },
    /// A client attached.
    ClientJoined {
        /// Its id.
        client_id: String,
        /// Attached client count.
        count: usize,
        /// Effective width.
        width: u16,
        /// Effective height.
        height: u16,
    },
    /// A client detached.
    ClientLeft {
        /// Its id.
        client_id: String,
        /// Remaining client count.
        count: usize,
    },
    /// The effective viewport changed.
    SessionResize {
        /// New effective width.
        width: u16,
        /// New effective height.
        height: u16,
        /// Attached client count.
        count: usize,
    },
    /// Redraw everything.
    ForceRefresh {
        /// Why.
        reason: String,
    },
    /// A PTY's child exited.
    PtyClosed {
        /// Which PTY.
        pty_id: u64,
    },
    /// A remote command routed to this UI client.
    RunCommand {
        /// Correlation id to echo in `send_command_result`.
        request_id: String,
        /// The command.
        command: TapeCommand,
    },
}

/// Any JSON control message. Untagged: requests carry `op`, pushes carry
/// `push`, responses carry `ok`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// A request envelope.
    Request(RequestEnvelope),
    /// A push.
    Push(Push),
    /// A response.
    Response(Response),
}

impl Message {
    /// Parse a JSON frame payload.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| anyhow!("malformed control message: {e}"))
    }

    /// Wrap into a JSON frame.
    pub fn into_frame(self) -> Frame {
        Frame::Json(serde_json::to_value(self).expect("control message serializes"))
    }
}

/// Data payload of a successful `create_pty`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePtyReply {
    /// The new PTY's id.
    pub pty_id: u64,
}

/// Data payload of `get_terminal_state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalStateReply {
    /// The snapshot.
    pub state: TerminalState,
}

/// Data payload of `session_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfoReply {
    /// Session name.
    pub name: String,
    /// Attached clients.
    pub clients: usize,
    /// Live PTYs.
    pub ptys: usize,
    /// Effective width.
    pub width: u16,
    /// Effective height.
    pub height: u16,
    /// Windows known to the session state.
    pub windows: usize,
}

/// Generate a client id: monotonic counter plus random suffix.
pub fn generate_client_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let rand: u16 = rand::random();
    format!("client:{seq:x}{rand:04x}")
}

/// Generate a request id for remote-command correlation.
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every frame shape the protocol carries, for round-trip sweeps.
    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::Json(serde_json::json!({"op": "detach", "id": 1})),
            Frame::PtyOutput {
                pty_id: 42,
                data: (0..=255).collect(),
            },
            Frame::PtyInput {
                pty_id: u64::MAX,
                data: Vec::new(),
            },
        ]
    }

    #[test]
    fn every_frame_shape_round_trips() {
        for frame in sample_frames() {
            let mut decoder = FrameDecoder::new();
            let got = decoder.feed(&frame.encode()).unwrap();
            assert_eq!(got, vec![frame.clone()], "round trip of {frame:?}");
            assert_eq!(decoder.pending(), 0);
        }
    }

    #[test]
    fn encoded_length_prefix_counts_the_body() {
        let frame = Frame::PtyInput {
            pty_id: 3,
            data: b"abc".to_vec(),
        };
        let wire = frame.encode();
        let declared = u32::from_le_bytes(wire[..4].try_into().unwrap()) as usize;
        // Tag + 8-byte routing header + 3 data bytes.
        assert_eq!(declared, 12);
        assert_eq!(wire.len(), 4 + declared);
    }

    #[test]
    fn chunked_delivery_reassembles_regardless_of_split() {
        // A back-to-back stream of all sample frames, delivered in chunk
        // sizes from one byte up to the whole stream at once.
        let expect = sample_frames();
        let stream: Vec<u8> = expect.iter().flat_map(Frame::encode).collect();

        for chunk_size in [1, 3, 7, 64, stream.len()] {
            let mut decoder = FrameDecoder::new();
            let mut got = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                got.extend(decoder.feed(chunk).unwrap());
            }
            assert_eq!(got, expect, "chunk size {chunk_size}");
            assert_eq!(decoder.pending(), 0, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn pending_reports_buffered_partial() {
        let wire = sample_frames()[0].encode();
        let mut decoder = FrameDecoder::new();
        let got = decoder.feed(&wire[..wire.len() - 1]).unwrap();
        assert!(got.is_empty());
        assert_eq!(decoder.pending(), wire.len() - 1);
    }

    #[test]
    fn malformed_streams_poison_the_decoder() {
        // Hand-built bad bodies: (declared length, body bytes).
        let cases: Vec<(u32, Vec<u8>)> = vec![
            // Zero-length body.
            (0, vec![]),
            // Body over the limit.
            (FRAME_BODY_LIMIT as u32 + 1, vec![]),
            // Unknown tag.
            (2, vec![0xEE, b'x']),
            // PTY frame with a truncated routing header.
            (4, vec![frame_type::PTY_OUTPUT, 1, 2, 3]),
            // JSON tag around non-JSON bytes.
            (4, vec![frame_type::JSON, b'{', b'{', b'{']),
        ];
        for (declared, body) in cases {
            let mut wire = declared.to_le_bytes().to_vec();
            wire.extend_from_slice(&body);
            let mut decoder = FrameDecoder::new();
            assert!(
                decoder.feed(&wire).is_err(),
                "declared {declared} with body {body:?} should be rejected"
            );
        }
    }

    #[test]
    fn request_envelope_wire_shape() {
        let envelope = RequestEnvelope {
            id: 3,
            request: Request::CreatePty {
                title: "shell".into(),
                cols: 80,
                rows: 24,
            },
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["op"], "create_pty");
        assert_eq!(value["id"], 3);
        assert_eq!(value["cols"], 80);

        match Message::from_value(value).unwrap() {
            Message::Request(parsed) => assert_eq!(parsed.id, 3),
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn push_wire_shape() {
        let push = Push::SessionResize {
            width: 80,
            height: 24,
            count: 2,
        };
        let value = serde_json::to_value(&push).unwrap();
        assert_eq!(value["push"], "session_resize");

        match Message::from_value(value).unwrap() {
            Message::Push(Push::SessionResize { width, height, count }) => {
                assert_eq!((width, height, count), (80, 24, 2));
            }
            other => panic!("expected push, got {other:?}"),
        }
    }

    #[test]
    fn response_classification() {
        let value = serde_json::to_value(Response::err(9, "nope")).unwrap();
        match Message::from_value(value).unwrap() {
            Message::Response(response) => {
                assert!(!response.ok);
                assert_eq!(response.id, 9);
                assert_eq!(response.message.as_deref(), Some("nope"));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn client_ids_are_unique() {
        let ids: std::collections::HashSet<String> =
            (0..64).map(|_| generate_client_id()).collect();
        assert_eq!(ids.len(), 64);
    }
}
