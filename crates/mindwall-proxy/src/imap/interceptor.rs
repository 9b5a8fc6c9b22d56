//! FETCH body interception
//!
//! Byte-level state machine over the upstream-to-client stream. Lines are
//! relayed as-is until one announces a message-body literal `{N}`; the next
//! N octets are then consumed opaquely (CRLFs included), re-emitted to the
//! client, and captured for analysis. When a verdict is already cached for
//! the message, the FETCH is withheld just long enough to stamp the Subject
//! header and correct the announced octet count.

use super::injector::RiskScoreInjector;
use super::parser::FetchLineParser;
use dashmap::DashMap;
use mindwall_common::Severity;
use std::sync::Arc;
use uuid::Uuid;

/// Verdict cached per message uid after analysis completes.
#[derive(Debug, Clone, Copy)]
pub struct CachedVerdict {
    pub score: f64,
    pub severity: Severity,
}

/// Bodies above this size are relayed untouched and not captured.
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// How annotation timing is resolved when no verdict is cached yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationMode {
    /// Stream the body immediately; the verdict lands in the cache and is
    /// stamped on the next FETCH of the same message.
    AnnotateNextFetch,
    /// Withhold the FETCH and let the session await the verdict, bounded.
    HoldForVerdict,
}

/// A completed body capture ready for analysis submission.
#[derive(Debug)]
pub struct CapturedBody {
    pub uid: String,
    pub bytes: Vec<u8>,
}

/// Side effects surfaced to the session pump.
#[derive(Debug)]
pub enum InterceptEvent {
    /// A body literal finished streaming; submit it for analysis.
    BodyCaptured(CapturedBody),
    /// Hold mode: line and body were withheld from the output. The session
    /// resolves a verdict, annotates (or not), and emits both.
    HeldFetch {
        uid: String,
        line: Vec<u8>,
        body: Vec<u8>,
    },
}

enum Disposition {
    /// Relay literal bytes as they arrive.
    Stream,
    /// Withhold; stamp the cached verdict's badge at completion.
    AnnotateNow { line: Vec<u8>, severity: Severity },
    /// Withhold; hand line and body to the session at completion.
    AwaitVerdict { line: Vec<u8> },
}

enum State {
    Line,
    Literal {
        remaining: usize,
        capture: Option<Vec<u8>>,
        uid: Option<String>,
        disposition: Disposition,
    },
}

/// Streaming interceptor for one upstream-to-client direction.
pub struct FetchInterceptor {
    parser: FetchLineParser,
    verdicts: Arc<DashMap<String, CachedVerdict>>,
    mode: AnnotationMode,
    state: State,
    line_buf: Vec<u8>,
}

impl FetchInterceptor {
    pub fn new(verdicts: Arc<DashMap<String, CachedVerdict>>, mode: AnnotationMode) -> Self {
        Self {
            parser: FetchLineParser::new(),
            verdicts,
            mode,
            state: State::Line,
            line_buf: Vec::new(),
        }
    }

    /// Feed one chunk of upstream bytes. Relay output is appended to `out`;
    /// completed captures and withheld fetches are appended to `events`.
    pub fn process(
        &mut self,
        input: &[u8],
        out: &mut Vec<u8>,
        events: &mut Vec<InterceptEvent>,
    ) {
        let mut pos = 0;
        while pos < input.len() {
            if matches!(self.state, State::Line) {
                match input[pos..].iter().position(|&b| b == b'\n') {
                    None => {
                        self.line_buf.extend_from_slice(&input[pos..]);
                        pos = input.len();
                    }
                    Some(nl) => {
                        self.line_buf.extend_from_slice(&input[pos..pos + nl + 1]);
                        pos += nl + 1;
                        self.handle_line(out, events);
                    }
                }
                continue;
            }

            let (take, emit) = {
                let State::Literal {
                    remaining,
                    capture,
                    disposition,
                    ..
                } = &mut self.state
                else {
                    unreachable!("literal state checked above");
                };
                let take = (*remaining).min(input.len() - pos);
                if let Some(buf) = capture {
                    buf.extend_from_slice(&input[pos..pos + take]);
                }
                *remaining -= take;
                (take, matches!(disposition, Disposition::Stream))
            };
            if emit {
                out.extend_from_slice(&input[pos..pos + take]);
            }
            pos += take;
            if matches!(self.state, State::Literal { remaining: 0, .. }) {
                self.finish_literal(out, events);
            }
        }
    }

    /// Flush any buffered state at stream end. Withheld bytes are released
    /// unannotated so the client never loses data on teardown.
    pub fn flush(&mut self, out: &mut Vec<u8>) {
        match std::mem::replace(&mut self.state, State::Line) {
            State::Line => {}
            State::Literal {
                capture,
                disposition,
                ..
            } => match disposition {
                Disposition::Stream => {}
                Disposition::AnnotateNow { line, .. } | Disposition::AwaitVerdict { line } => {
                    out.extend_from_slice(&line);
                    if let Some(body) = capture {
                        out.extend_from_slice(&body);
                    }
                }
            },
        }
        if !self.line_buf.is_empty() {
            out.extend_from_slice(&self.line_buf);
            self.line_buf.clear();
        }
    }

    fn handle_line(&mut self, out: &mut Vec<u8>, events: &mut Vec<InterceptEvent>) {
        let text = String::from_utf8_lossy(&self.line_buf).into_owned();
        let literal = self.parser.trailing_literal(&text);

        let Some(octets) = literal else {
            out.extend_from_slice(&self.line_buf);
            self.line_buf.clear();
            return;
        };

        let is_body = self.parser.is_body_literal(&text) && octets <= MAX_CAPTURE_BYTES;
        if !is_body {
            // Opaque relay for non-body (or oversized) literals; their
            // contents must never be re-parsed as response lines.
            out.extend_from_slice(&self.line_buf);
            self.line_buf.clear();
            self.state = State::Literal {
                remaining: octets,
                capture: None,
                uid: None,
                disposition: Disposition::Stream,
            };
            if octets == 0 {
                self.state = State::Line;
            }
            return;
        }

        let uid = self
            .parser
            .extract_uid(&text)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::debug!(uid = %uid, expected_bytes = octets, "interceptor.body_detected");

        let cached = self.verdicts.get(&uid).map(|v| *v);
        let disposition = match cached {
            Some(verdict) if verdict.severity > Severity::Low => Disposition::AnnotateNow {
                line: self.line_buf.clone(),
                severity: verdict.severity,
            },
            Some(_) => Disposition::Stream,
            None if self.mode == AnnotationMode::HoldForVerdict => Disposition::AwaitVerdict {
                line: self.line_buf.clone(),
            },
            None => Disposition::Stream,
        };

        if matches!(disposition, Disposition::Stream) {
            out.extend_from_slice(&self.line_buf);
        }
        self.line_buf.clear();
        self.state = State::Literal {
            remaining: octets,
            capture: Some(Vec::with_capacity(octets)),
            uid: Some(uid),
            disposition,
        };
        if octets == 0 {
            self.finish_literal(out, events);
        }
    }

    fn finish_literal(&mut self, out: &mut Vec<u8>, events: &mut Vec<InterceptEvent>) {
        let state = std::mem::replace(&mut self.state, State::Line);
        let State::Literal {
            capture,
            uid,
            disposition,
            ..
        } = state
        else {
            return;
        };
        let Some(body) = capture else {
            return;
        };
        let uid = uid.unwrap_or_default();

        match disposition {
            Disposition::Stream => {
                events.push(InterceptEvent::BodyCaptured(CapturedBody { uid, bytes: body }));
            }
            Disposition::AnnotateNow { line, severity } => {
                emit_fetch(out, &line, &body, Some(severity));
            }
            Disposition::AwaitVerdict { line } => {
                events.push(InterceptEvent::HeldFetch { uid, line, body });
            }
        }
    }
}

/// Emit a withheld FETCH: annotate the body when a badge applies and patch
/// the announced octet count to match, otherwise relay untouched.
pub fn emit_fetch(out: &mut Vec<u8>, line: &[u8], body: &[u8], severity: Option<Severity>) {
    let annotated = severity.and_then(|s| RiskScoreInjector::annotate_message(body, s));
    match annotated {
        Some(new_body) => {
            out.extend_from_slice(&rewrite_literal_length(line, new_body.len()));
            out.extend_from_slice(&new_body);
        }
        None => {
            out.extend_from_slice(line);
            out.extend_from_slice(body);
        }
    }
}

/// Replace the trailing `{N}` of a response line with a new octet count,
/// preserving the line ending and any LITERAL+ marker.
fn rewrite_literal_length(line: &[u8], new_len: usize) -> Vec<u8> {
    let text = String::from_utf8_lossy(line);
    let content = text.trim_end_matches(['\r', '\n']);
    let ending = &text[content.len()..];
    match content.rfind('{') {
        Some(open) => {
            let plus = if content.ends_with("+}") { "+" } else { "" };
            format!("{}{{{}{}}}{}", &content[..open], new_len, plus, ending).into_bytes()
        }
        None => line.to_vec(),
    }
}
