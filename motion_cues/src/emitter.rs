// THEORY:
// The emitter turns one `TickReport` into datagrams and sends them to the
// configured listener. Delivery is best-effort: there is no retry, no queue and
// no acknowledgement. A failed send is logged and the tick moves on.
//
// Two encodings are supported:
// - OSC: bundles with a `/cues/tick` header message, one `/cues/contour`
//   message per contour, a `/cues/flow` summary once flow is available, and
//   optionally the field as row-chunked `/cues/field` messages.
// - JSON: the report itself, plus the field when requested.
//
// A tick normally fits in one datagram. When it does not (large fields, or
// very long contours in JSON), the batch is split so that no datagram exceeds
// `MAX_DATAGRAM`: OSC messages are spread over several bundles, and JSON sends
// the report first and then the field in row chunks. A JSON report that still
// does not fit without contour points is a transport error.
//
// Contour centroids are normalized to 0..1 in OSC so that listeners do not
// need to know the capture size. Activity is sent as -1.0 until it exists.

use crate::config::{EmitterConfig, MessageFormat};
use crate::core_modules::flow_field::FlowField;
use crate::core_modules::osc::{OscMessage, encode_bundles};
use crate::error::{CueError, Result};
use crate::pipeline::TickReport;
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Largest UDP payload that fits in one IPv4 datagram.
pub const MAX_DATAGRAM: usize = 65_507;

/// Room for field vectors in one message, leaving space for its header.
const FIELD_BUDGET: usize = MAX_DATAGRAM - 1024;
/// OSC: a type-tag byte and four data bytes for each of dx and dy.
const OSC_BYTES_PER_BLOCK: usize = 10;
/// JSON: worst-case `-2147483648,` for each of dx and dy.
const JSON_BYTES_PER_BLOCK: usize = 24;

pub struct EventEmitter {
    socket: UdpSocket,
    target: SocketAddr,
    format: MessageFormat,
    send_flow_field: bool,
    frame_size: (u32, u32),
}

#[derive(Serialize)]
struct JsonCue<'a> {
    #[serde(flatten)]
    report: &'a TickReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<FieldRows<'a>>,
}

#[derive(Serialize)]
struct JsonFieldPart<'a> {
    frame: u64,
    field: FieldRows<'a>,
}

/// A run of whole rows of a flow field.
#[derive(Serialize)]
struct FieldRows<'a> {
    cols: u32,
    rows: u32,
    first_row: u32,
    row_count: u32,
    velx: &'a [i32],
    vely: &'a [i32],
}

fn rows_per_chunk(cols: u32, bytes_per_block: usize) -> u32 {
    let row = (cols as usize * bytes_per_block).max(1);
    (FIELD_BUDGET / row).max(1) as u32
}

fn field_rows(field: &FlowField, rows_per_chunk: u32) -> impl Iterator<Item = FieldRows<'_>> {
    let (cols, rows) = field.dim();
    (0..rows)
        .step_by(rows_per_chunk.max(1) as usize)
        .map(move |first_row| {
            let row_count = rows_per_chunk.min(rows - first_row);
            let start = (first_row * cols) as usize;
            let end = ((first_row + row_count) * cols) as usize;
            FieldRows {
                cols,
                rows,
                first_row,
                row_count,
                velx: &field.velx()[start..end],
                vely: &field.vely()[start..end],
            }
        })
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CueError::Transport(e.into()))
}

impl EventEmitter {
    /// Resolves the listener address and binds an ephemeral local socket.
    ///
    /// `frame_size` is the capture size, used to normalize positions.
    pub async fn bind(config: &EmitterConfig, frame_size: (u32, u32)) -> Result<Self> {
        let endpoint = format!("{}:{}", config.host, config.port);
        let target = tokio::net::lookup_host(&endpoint)
            .await
            .map_err(|e| CueError::config(format!("cannot resolve {endpoint}: {e}")))?
            .next()
            .ok_or_else(|| CueError::config(format!("{endpoint} resolved to no address")))?;

        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;

        info!(
            "emitting {:?} cues from {} to {target}",
            config.format,
            socket.local_addr()?
        );

        Ok(Self {
            socket,
            target,
            format: config.format,
            send_flow_field: config.send_flow_field,
            frame_size,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Encodes one tick in the configured format, as one or more datagrams of
    /// at most `MAX_DATAGRAM` bytes.
    pub fn encode(&self, report: &TickReport, field: Option<&FlowField>) -> Result<Vec<Vec<u8>>> {
        let field = field.filter(|_| self.send_flow_field && report.flow.is_some());
        match self.format {
            MessageFormat::Osc => Ok(encode_bundles(&self.osc_messages(report, field), MAX_DATAGRAM)),
            MessageFormat::Json => self.json_datagrams(report, field),
        }
    }

    fn osc_messages(&self, report: &TickReport, field: Option<&FlowField>) -> Vec<OscMessage> {
        let (width, height) = self.frame_size;
        let (width, height) = (width.max(1) as f32, height.max(1) as f32);

        let mut messages = Vec::with_capacity(report.contours.len() + 3);
        messages.push(
            OscMessage::new("/cues/tick")
                .arg(report.frame.min(i32::MAX as u64) as i32)
                .arg(report.activity.unwrap_or(-1.0))
                .arg(report.contours.len() as u32),
        );

        for (rank, contour) in report.contours.iter().enumerate() {
            let (x, y, w, h) = contour.bounding_box;
            messages.push(
                OscMessage::new("/cues/contour")
                    .arg(rank as u32)
                    .arg(contour.centroid.0 / width)
                    .arg(contour.centroid.1 / height)
                    .arg(contour.area as f32)
                    .arg(x)
                    .arg(y)
                    .arg(w)
                    .arg(h),
            );
        }

        if let Some(flow) = &report.flow {
            messages.push(
                OscMessage::new("/cues/flow")
                    .arg(flow.mean_dx)
                    .arg(flow.mean_dy)
                    .arg(flow.mean_magnitude)
                    .arg(flow.moving_blocks),
            );
        }

        if let Some(field) = field {
            let per_chunk = rows_per_chunk(field.dim().0, OSC_BYTES_PER_BLOCK);
            for chunk in field_rows(field, per_chunk) {
                let mut message = OscMessage::new("/cues/field")
                    .arg(chunk.cols)
                    .arg(chunk.rows)
                    .arg(chunk.first_row)
                    .arg(chunk.row_count);
                for (&dx, &dy) in chunk.velx.iter().zip(chunk.vely) {
                    message = message.arg(dx).arg(dy);
                }
                messages.push(message);
            }
        }

        messages
    }

    fn json_datagrams(&self, report: &TickReport, field: Option<&FlowField>) -> Result<Vec<Vec<u8>>> {
        if let Some(field) = field {
            let whole = to_json(&JsonCue {
                report,
                field: field_rows(field, field.dim().1).next(),
            })?;
            if whole.len() <= MAX_DATAGRAM {
                return Ok(vec![whole]);
            }
        }

        let mut datagrams = vec![self.json_report(report)?];
        if let Some(field) = field {
            let per_chunk = rows_per_chunk(field.dim().0, JSON_BYTES_PER_BLOCK);
            for rows in field_rows(field, per_chunk) {
                datagrams.push(to_json(&JsonFieldPart {
                    frame: report.frame,
                    field: rows,
                })?);
            }
        }
        Ok(datagrams)
    }

    /// The report alone, without contour points if that is what it takes to fit.
    fn json_report(&self, report: &TickReport) -> Result<Vec<u8>> {
        let bytes = to_json(&JsonCue { report, field: None })?;
        if bytes.len() <= MAX_DATAGRAM {
            return Ok(bytes);
        }

        let mut compact = report.clone();
        compact.contours.iter_mut().for_each(|c| c.points.clear());
        let bytes = to_json(&JsonCue {
            report: &compact,
            field: None,
        })?;
        if bytes.len() <= MAX_DATAGRAM {
            debug!("tick {}: contour points dropped to fit one datagram", report.frame);
            return Ok(bytes);
        }

        Err(CueError::Transport(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "tick {} report is {} bytes, over the {MAX_DATAGRAM}-byte datagram limit",
                report.frame,
                bytes.len()
            ),
        )))
    }

    /// Sends one tick and reports transport failures to the caller.
    ///
    /// Returns the number of bytes sent over all datagrams.
    pub async fn try_emit(&self, report: &TickReport, field: Option<&FlowField>) -> Result<usize> {
        let mut sent = 0;
        for datagram in self.encode(report, field)? {
            sent += self
                .socket
                .send_to(&datagram, self.target)
                .await
                .map_err(CueError::Transport)?;
        }
        Ok(sent)
    }

    /// Sends one tick. Failures are logged and dropped.
    pub async fn emit(&self, report: &TickReport, field: Option<&FlowField>) {
        match self.try_emit(report, field).await {
            Ok(sent) => trace!("tick {}: sent {sent} bytes", report.frame),
            Err(e) => warn!("tick {}: cue dropped: {e}", report.frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::contour_finder::Contour;
    use crate::core_modules::flow_field::FlowSummary;

    fn report() -> TickReport {
        TickReport {
            frame: 3,
            threshold: 40,
            has_background: true,
            contours: vec![Contour {
                points: vec![(16, 24), (31, 24), (31, 39), (16, 39)],
                area: 256,
                bounding_box: (16, 24, 16, 16),
                centroid: (24.0, 32.0),
            }],
            occupied_cells: vec![(2, 3)],
            activity: Some(0.25),
            flow: Some(FlowSummary {
                mean_dx: 1.0,
                mean_dy: 0.0,
                mean_magnitude: 1.0,
                moving_blocks: 4,
            }),
        }
    }

    /// A 1280x720 frame with 8-pixel blocks.
    fn hd_field() -> FlowField {
        let mut field = FlowField::new(160, 90);
        for row in 0..90 {
            for col in 0..160 {
                field.set(col, row, (-3, 5));
            }
        }
        field
    }

    /// Splits an OSC bundle into its elements.
    fn bundle_elements(bytes: &[u8]) -> Vec<&[u8]> {
        assert_eq!(&bytes[..8], b"#bundle\0");
        let mut elements = Vec::new();
        let mut at = 16;
        while at < bytes.len() {
            let size = i32::from_be_bytes(bytes[at..at + 4].try_into().unwrap()) as usize;
            elements.push(&bytes[at + 4..at + 4 + size]);
            at += 4 + size;
        }
        elements
    }

    fn padded(len: usize) -> usize {
        len / 4 * 4 + 4
    }

    fn address(element: &[u8]) -> String {
        let end = element.iter().position(|&b| b == 0).unwrap();
        String::from_utf8(element[..end].to_vec()).unwrap()
    }

    /// The `index`th argument of a message whose arguments are all int32.
    fn int_arg(element: &[u8], index: usize) -> i32 {
        let tags = padded(address(element).len());
        let tags_len = element[tags..].iter().position(|&b| b == 0).unwrap();
        let at = tags + padded(tags_len) + 4 * index;
        i32::from_be_bytes(element[at..at + 4].try_into().unwrap())
    }

    fn bundle_addresses(bytes: &[u8]) -> Vec<String> {
        bundle_elements(bytes).into_iter().map(address).collect()
    }

    async fn listener() -> (UdpSocket, EmitterConfig) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = EmitterConfig {
            host: "127.0.0.1".to_string(),
            port: socket.local_addr().unwrap().port(),
            ..EmitterConfig::default()
        };
        (socket, config)
    }

    #[tokio::test]
    async fn osc_bundle_reaches_listener() {
        let (socket, config) = listener().await;
        let emitter = EventEmitter::bind(&config, (64, 64)).await.unwrap();

        let sent = emitter.try_emit(&report(), None).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let (received, _) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(received, sent);
        assert_eq!(
            bundle_addresses(&buf[..received]),
            vec!["/cues/tick", "/cues/contour", "/cues/flow"]
        );
    }

    #[tokio::test]
    async fn field_is_sent_only_when_enabled() {
        let (_socket, mut config) = listener().await;
        let mut field = FlowField::new(2, 2);
        field.set(1, 0, (2, -1));

        let emitter = EventEmitter::bind(&config, (64, 64)).await.unwrap();
        let datagrams = emitter.encode(&report(), Some(&field)).unwrap();
        assert_eq!(datagrams.len(), 1);
        assert!(!bundle_addresses(&datagrams[0]).contains(&"/cues/field".to_string()));

        config.send_flow_field = true;
        let emitter = EventEmitter::bind(&config, (64, 64)).await.unwrap();
        let datagrams = emitter.encode(&report(), Some(&field)).unwrap();
        assert_eq!(datagrams.len(), 1);
        let elements = bundle_elements(&datagrams[0]);
        let last = elements.last().unwrap();
        assert_eq!(address(last), "/cues/field");
        // cols, rows, first_row, row_count, then dx, dy per block.
        let args: Vec<i32> = (0..12).map(|i| int_arg(last, i)).collect();
        assert_eq!(args, vec![2, 2, 0, 2, 0, 0, 2, -1, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn large_osc_field_is_split_into_datagrams_that_fit() {
        let (socket, mut config) = listener().await;
        config.send_flow_field = true;
        let emitter = EventEmitter::bind(&config, (1280, 720)).await.unwrap();
        let field = hd_field();

        let datagrams = emitter.encode(&report(), Some(&field)).unwrap();
        assert!(datagrams.len() > 1);
        assert!(datagrams.iter().all(|d| d.len() <= MAX_DATAGRAM));
        assert_eq!(bundle_addresses(&datagrams[0])[0], "/cues/tick");

        let mut next_row = 0;
        for datagram in &datagrams {
            for element in bundle_elements(datagram) {
                if address(element) == "/cues/field" {
                    assert_eq!(int_arg(element, 0), 160);
                    assert_eq!(int_arg(element, 1), 90);
                    assert_eq!(int_arg(element, 2), next_row);
                    next_row += int_arg(element, 3);
                }
            }
        }
        assert_eq!(next_row, 90);

        let sent = emitter.try_emit(&report(), Some(&field)).await.unwrap();
        let mut buf = vec![0u8; MAX_DATAGRAM + 1];
        let mut received = 0;
        for _ in 0..datagrams.len() {
            received += socket.recv_from(&mut buf).await.unwrap().0;
        }
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn json_carries_the_report() {
        let (socket, mut config) = listener().await;
        config.format = MessageFormat::Json;
        config.send_flow_field = true;
        let emitter = EventEmitter::bind(&config, (64, 64)).await.unwrap();
        let field = FlowField::new(2, 1);

        emitter.emit(&report(), Some(&field)).await;

        let mut buf = vec![0u8; 4096];
        let (received, _) = socket.recv_from(&mut buf).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf[..received]).unwrap();
        assert_eq!(value["frame"], 3);
        assert_eq!(value["contours"][0]["area"], 256);
        assert_eq!(value["field"]["cols"], 2);
        assert_eq!(value["field"]["velx"], serde_json::json!([0, 0]));
    }

    #[tokio::test]
    async fn large_json_field_follows_the_report_in_row_chunks() {
        let (_socket, mut config) = listener().await;
        config.format = MessageFormat::Json;
        config.send_flow_field = true;
        let emitter = EventEmitter::bind(&config, (1280, 720)).await.unwrap();
        let field = hd_field();

        let datagrams = emitter.encode(&report(), Some(&field)).unwrap();
        assert!(datagrams.len() > 1);
        assert!(datagrams.iter().all(|d| d.len() <= MAX_DATAGRAM));

        let head: serde_json::Value = serde_json::from_slice(&datagrams[0]).unwrap();
        assert_eq!(head["frame"], 3);
        assert!(head.get("field").is_none());

        let mut next_row = 0;
        let mut last = None;
        for datagram in &datagrams[1..] {
            let part: serde_json::Value = serde_json::from_slice(datagram).unwrap();
            assert_eq!(part["frame"], 3);
            assert_eq!(part["field"]["first_row"], next_row);
            next_row += part["field"]["row_count"].as_u64().unwrap();
            last = Some(part);
        }
        assert_eq!(next_row, 90);
        let last = last.unwrap();
        let velx = last["field"]["velx"].as_array().unwrap();
        assert_eq!(velx.last().unwrap(), -3);
    }

    #[tokio::test]
    async fn oversized_report_is_a_transport_error_and_emit_swallows_it() {
        let (_socket, mut config) = listener().await;
        config.format = MessageFormat::Json;
        let emitter = EventEmitter::bind(&config, (1280, 720)).await.unwrap();
        let mut report = report();
        report.occupied_cells = (0..160).flat_map(|x| (0..135).map(move |y| (x, y))).collect();

        let err = emitter.try_emit(&report, None).await.unwrap_err();
        assert!(matches!(err, CueError::Transport(_)));
        assert!(!err.is_fatal());

        // Same input through the best-effort path: logged, not returned.
        emitter.emit(&report, None).await;
    }
}
