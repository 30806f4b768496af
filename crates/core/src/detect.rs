//! Object detection: the collaborator trait, box post-processing and two
//! detectors (an external model process and a random demo one).

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::error::CollaboratorError;
use crate::types::{BoundingBox, Capture, Detection, Point};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    pub confidence_threshold: f32,
    pub overlap_threshold: f32,
    pub max_results: usize,
    pub action_offset_y: i32,
}

impl From<&DetectorConfig> for DetectParams {
    fn from(c: &DetectorConfig) -> Self {
        Self {
            confidence_threshold: c.confidence_threshold,
            overlap_threshold: c.overlap_threshold,
            max_results: c.max_results,
            action_offset_y: c.action_offset_y,
        }
    }
}

pub trait Detector: Send {
    /// Detect objects in `frame`, which was captured at screen `origin`.
    fn detect(
        &mut self,
        frame: &Capture,
        origin: Point,
        params: &DetectParams,
    ) -> Result<Vec<Detection>, CollaboratorError>;
}

/// A box as reported by a model, in capture coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl RawBox {
    fn bbox(&self) -> BoundingBox {
        BoundingBox { x1: self.x1, y1: self.y1, x2: self.x2, y2: self.y2 }
    }
}

/// Confidence filter, greedy non-maximum suppression, truncation, then
/// mapping to screen coordinates. Output is ordered by confidence.
pub fn postprocess(mut raw: Vec<RawBox>, origin: Point, params: &DetectParams) -> Vec<Detection> {
    raw.retain(|b| b.confidence >= params.confidence_threshold);
    raw.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawBox> = Vec::new();
    for candidate in raw {
        if kept.len() >= params.max_results {
            break;
        }
        let bbox = candidate.bbox();
        if kept.iter().all(|k| k.bbox().iou(&bbox) <= params.overlap_threshold) {
            kept.push(candidate);
        }
    }

    kept.into_iter()
        .map(|b| {
            let bbox = b.bbox();
            let (cx, cy) = bbox.center();
            let screen_position = origin.offset(cx.round() as i32, cy.round() as i32);
            Detection {
                bbox,
                confidence: b.confidence,
                screen_position,
                action_position: screen_position.offset(0, params.action_offset_y),
            }
        })
        .collect()
}

/// Random boxes for demos without a model.
pub struct StubDetector {
    rng: StdRng,
}

impl StubDetector {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Detector for StubDetector {
    fn detect(
        &mut self,
        frame: &Capture,
        origin: Point,
        params: &DetectParams,
    ) -> Result<Vec<Detection>, CollaboratorError> {
        if frame.width <= 60 || frame.height <= 60 {
            return Ok(Vec::new());
        }
        // Mostly empty frames, so the demo also explores.
        let count = match self.rng.gen_range(0..10) {
            0..=5 => 0,
            6..=8 => 1,
            _ => 2,
        };
        let raw = (0..count)
            .map(|_| {
                let x = self.rng.gen_range(0.0..(frame.width - 60) as f32);
                let y = self.rng.gen_range(0.0..(frame.height - 60) as f32);
                RawBox { x1: x, y1: y, x2: x + 60.0, y2: y + 60.0, confidence: self.rng.gen_range(0.1..1.0) }
            })
            .collect();
        Ok(postprocess(raw, origin, params))
    }
}

/// Sent before each frame's raw BGRA bytes.
#[derive(Serialize)]
struct FrameHeader {
    seq: u64,
    width: u32,
    height: u32,
    bytes_per_row: u32,
}

/// One answer line. `seq` echoes the frame it belongs to.
#[derive(Deserialize)]
struct Reply {
    seq: u64,
    boxes: Vec<RawBox>,
}

struct Frame {
    header: String,
    data: Vec<u8>,
}

const PIPE_TIMEOUT: Duration = Duration::from_secs(2);

/// A running model process and the two threads feeding and draining it.
struct ModelProcess {
    child: Child,
    frames: SyncSender<Frame>,
    replies: Receiver<String>,
}

impl ModelProcess {
    fn spawn(cmd: &str) -> Result<Self, CollaboratorError> {
        let mut child = shell(cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CollaboratorError::Detect(format!("spawning '{}': {}", cmd, e)))?;

        let stdin = child.stdin.take().ok_or_else(|| CollaboratorError::Detect("no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| CollaboratorError::Detect("no stdout".into()))?;

        // Writes and reads both happen off the hunt thread, so a model that
        // stops reading or answering only costs one timeout.
        let (frames, pending) = mpsc::sync_channel::<Frame>(1);
        thread::spawn(move || write_frames(stdin, pending));

        let (tx, replies) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
            debug!("detector stdout closed");
        });

        info!("detector process started: {}", cmd);
        Ok(Self { child, frames, replies })
    }
}

fn write_frames(mut stdin: ChildStdin, pending: Receiver<Frame>) {
    for frame in pending {
        let sent = writeln!(stdin, "{}", frame.header)
            .and_then(|_| stdin.write_all(&frame.data))
            .and_then(|_| stdin.flush());
        if let Err(e) = sent {
            debug!("detector stdin closed: {}", e);
            break;
        }
    }
}

impl Drop for ModelProcess {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!("failed to stop detector process: {}", e);
        }
        self.child.wait().ok();
    }
}

/// Runs an external model as a child process. Each frame goes out as one
/// JSON header line followed by the raw pixels; each answer is one JSON
/// line `{"seq": n, "boxes": [RawBox, ...]}`. Answers for other frames are
/// dropped. After a missed deadline or any other failure the process is
/// killed and started again on the next frame.
pub struct PipeDetector {
    cmd: String,
    process: Option<ModelProcess>,
    seq: u64,
    timeout: Duration,
}

impl PipeDetector {
    pub fn spawn(cmd: &str) -> Result<Self, CollaboratorError> {
        let process = ModelProcess::spawn(cmd)?;
        Ok(Self { cmd: cmd.to_string(), process: Some(process), seq: 0, timeout: PIPE_TIMEOUT })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn exchange(&mut self, frame: &Capture) -> Result<Vec<RawBox>, CollaboratorError> {
        if self.process.is_none() {
            self.process = Some(ModelProcess::spawn(&self.cmd)?);
        }
        let Some(process) = self.process.as_ref() else {
            return Err(CollaboratorError::Detect("detector process unavailable".into()));
        };

        self.seq += 1;
        let seq = self.seq;
        let header = FrameHeader { seq, width: frame.width, height: frame.height, bytes_per_row: frame.bytes_per_row };
        let header = serde_json::to_string(&header)
            .map_err(|e| CollaboratorError::Detect(format!("encoding header: {}", e)))?;
        process.frames.try_send(Frame { header, data: frame.data.clone() }).map_err(|e| match e {
            TrySendError::Full(_) => CollaboratorError::Detect("detector is not reading frames".into()),
            TrySendError::Disconnected(_) => CollaboratorError::Detect("detector process exited".into()),
        })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let line = process.replies.recv_timeout(left).map_err(|e| match e {
                RecvTimeoutError::Timeout => CollaboratorError::Detect(format!("no reply within {:?}", self.timeout)),
                RecvTimeoutError::Disconnected => CollaboratorError::Detect("detector process exited".into()),
            })?;
            let reply: Reply = serde_json::from_str(&line)
                .map_err(|e| CollaboratorError::Detect(format!("malformed reply: {}", e)))?;
            if reply.seq == seq {
                return Ok(reply.boxes);
            }
            debug!("dropping reply for frame {} while waiting for {}", reply.seq, seq);
        }
    }
}

#[cfg(windows)]
fn shell(cmd: &str) -> Command {
    let mut c = Command::new("cmd");
    c.args(["/C", cmd]);
    c
}

#[cfg(not(windows))]
fn shell(cmd: &str) -> Command {
    let mut c = Command::new("sh");
    c.args(["-c", cmd]);
    c
}

impl Detector for PipeDetector {
    fn detect(
        &mut self,
        frame: &Capture,
        origin: Point,
        params: &DetectParams,
    ) -> Result<Vec<Detection>, CollaboratorError> {
        match self.exchange(frame) {
            Ok(raw) => Ok(postprocess(raw, origin, params)),
            Err(e) => {
                if self.process.take().is_some() {
                    warn!("restarting detector process after: {}", e);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DetectParams {
        DetectParams::from(&DetectorConfig::default())
    }

    fn raw(x1: f32, y1: f32, size: f32, confidence: f32) -> RawBox {
        RawBox { x1, y1, x2: x1 + size, y2: y1 + size, confidence }
    }

    #[test]
    fn low_confidence_is_dropped() {
        let dets = postprocess(vec![raw(0.0, 0.0, 10.0, 0.2), raw(50.0, 50.0, 10.0, 0.3)], Point::new(0, 0), &params());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].confidence, 0.3);
    }

    #[test]
    fn overlapping_boxes_keep_the_most_confident() {
        let dets = postprocess(
            vec![raw(0.0, 0.0, 40.0, 0.5), raw(2.0, 2.0, 40.0, 0.9), raw(200.0, 0.0, 40.0, 0.6)],
            Point::new(0, 0),
            &params(),
        );
        let confs: Vec<f32> = dets.iter().map(|d| d.confidence).collect();
        assert_eq!(confs, vec![0.9, 0.6]);
    }

    #[test]
    fn positions_are_mapped_to_screen() {
        let dets = postprocess(vec![raw(10.0, 20.0, 40.0, 0.9)], Point::new(100, 100), &params());
        assert_eq!(dets[0].screen_position, Point::new(130, 140));
        assert_eq!(dets[0].action_position, Point::new(130, 150));
    }

    #[test]
    fn results_are_truncated() {
        let mut p = params();
        p.max_results = 2;
        let boxes = (0..5).map(|i| raw(i as f32 * 100.0, 0.0, 40.0, 0.5)).collect();
        assert_eq!(postprocess(boxes, Point::new(0, 0), &p).len(), 2);
    }

    #[test]
    fn stub_detector_is_reproducible() {
        let frame = Capture::filled(400, 300, [0, 0, 0, 255]);
        let run = |seed| {
            let mut d = StubDetector::new(seed);
            (0..20)
                .map(|_| d.detect(&frame, Point::new(100, 100), &params()).unwrap().len())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        assert!(run(7).iter().all(|&n| n <= 2));
    }

    /// Shell model that answers every header line with `reply`, where
    /// `$seq` is the frame's sequence number.
    #[cfg(unix)]
    fn answering(reply: &str) -> String {
        format!(
            r#"while IFS= read -r line; do seq=$(printf '%s' "$line" | sed 's/.*"seq":\([0-9]*\).*/\1/'); {}; done"#,
            reply
        )
    }

    #[cfg(unix)]
    const ONE_BOX: &str = r#"[{"x1":0,"y1":0,"x2":20,"y2":20,"confidence":0.8}]"#;

    #[cfg(unix)]
    fn small_frame() -> Capture {
        Capture::filled(2, 1, [65, 66, 67, 68])
    }

    #[cfg(unix)]
    #[test]
    fn pipe_detector_reads_json_reply() {
        let cmd = answering(&format!(r#"echo "{{\"seq\":$seq,\"boxes\":{}}}""#, ONE_BOX.replace('"', "\\\"")));
        let mut d = PipeDetector::spawn(&cmd).unwrap();
        for _ in 0..2 {
            let dets = d.detect(&small_frame(), Point::new(5, 5), &params()).unwrap();
            assert_eq!(dets.len(), 1);
            assert_eq!(dets[0].screen_position, Point::new(15, 15));
        }
    }

    #[cfg(unix)]
    #[test]
    fn replies_for_other_frames_are_ignored() {
        // A late answer for the previous frame arrives first.
        let stale = format!(r#"echo "{{\"seq\":$((seq-1)),\"boxes\":{}}}""#, ONE_BOX.replace('"', "\\\""));
        let cmd = answering(&format!(r#"{}; echo "{{\"seq\":$seq,\"boxes\":[]}}""#, stale));
        let mut d = PipeDetector::spawn(&cmd).unwrap();
        let dets = d.detect(&small_frame(), Point::new(0, 0), &params()).unwrap();
        assert!(dets.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn model_that_stops_reading_times_out() {
        let mut d = PipeDetector::spawn("exec sleep 30").unwrap().with_timeout(Duration::from_millis(300));
        let frame = Capture::filled(1720, 780, [0, 0, 0, 255]);
        let started = Instant::now();
        assert!(matches!(d.detect(&frame, Point::new(0, 0), &params()), Err(CollaboratorError::Detect(_))));
        assert!(d.detect(&frame, Point::new(0, 0), &params()).is_err());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn silent_model_is_restarted() {
        let marker = std::env::temp_dir().join(format!("hunter-detector-{}", std::process::id()));
        std::fs::remove_file(&marker).ok();
        // The first process never answers; its replacement does.
        let respond = answering(&format!(r#"echo "{{\"seq\":$seq,\"boxes\":{}}}""#, ONE_BOX.replace('"', "\\\"")));
        let cmd = format!("if [ -e '{m}' ]; then {r}; else touch '{m}'; exec sleep 30; fi", m = marker.display(), r = respond);
        let mut d = PipeDetector::spawn(&cmd).unwrap().with_timeout(Duration::from_millis(500));

        assert!(d.detect(&small_frame(), Point::new(0, 0), &params()).is_err());
        let dets = d.detect(&small_frame(), Point::new(0, 0), &params()).unwrap();
        assert_eq!(dets.len(), 1);
        std::fs::remove_file(&marker).ok();
    }

    #[cfg(unix)]
    #[test]
    fn pipe_detector_reports_exit() {
        let mut d = PipeDetector::spawn("true").unwrap();
        let frame = Capture::filled(2, 1, [10, 10, 10, 255]);
        assert!(matches!(d.detect(&frame, Point::new(0, 0), &params()), Err(CollaboratorError::Detect(_))));
    }
}
