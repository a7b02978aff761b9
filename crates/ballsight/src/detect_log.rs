//! Best-effort per-call text log.
//!
//! One timestamp-prefixed, pipe-delimited line per `analyze` call, plus
//! indented reject lines. Every I/O failure is swallowed: the log must
//! never affect detection.

use std::fs::OpenOptions;
use std::io::Write;

use crate::debug_dump::DebugRecord;
use crate::detector::config::LogParams;
use crate::BallDetection;

pub(crate) struct DetectionLog {
    params: LogParams,
    run_id: u64,
}

impl DetectionLog {
    /// Create the logger and reset the file, so each detector instance
    /// starts a fresh, bounded history.
    pub fn new(params: LogParams) -> Self {
        if params.enabled {
            let _ = std::fs::write(&params.path, "");
        }
        Self { params, run_id: 0 }
    }

    /// Append one detection line; silently ignores write failures.
    pub fn append(
        &mut self,
        status: &str,
        reason: &str,
        ball: Option<&BallDetection>,
        record: &DebugRecord,
        top_n_rejects: usize,
    ) {
        if !self.params.enabled {
            return;
        }
        self.run_id += 1;
        let line = self.render(status, reason, ball, record, top_n_rejects);

        // Keep the file bounded: start over once it outgrows the cap.
        if let Ok(meta) = std::fs::metadata(&self.params.path) {
            if meta.len() > self.params.max_bytes {
                let _ = std::fs::write(&self.params.path, "");
            }
        }
        if let Ok(mut f) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.params.path)
        {
            let _ = f.write_all(line.as_bytes());
        }
    }

    fn render(
        &self,
        status: &str,
        reason: &str,
        ball: Option<&BallDetection>,
        record: &DebugRecord,
        top_n_rejects: usize,
    ) -> String {
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let thr = &record.thresholds;
        let counts = &record.counts;
        let best = &record.best;

        let ball_part = match ball {
            Some(b) => format!("ball=({:.1},{:.1}) r={:.1}", b.x, b.y, b.r),
            None => "ball=None".to_string(),
        };
        let mut parts = vec![
            format!("[{ts}] run={:06} status={status}", self.run_id),
            format!("reason={reason}"),
            ball_part,
            format!(
                "thr: a_min={} a_thr={} a_p={:.1} s_min={} v_min={} v_med_min={:.0} h_use={} \
                 h_red_max={} h_red_min2={} h_orange={}-{}",
                thr.a_min,
                thr.a_thr,
                thr.a_p,
                thr.s_min,
                thr.v_min,
                thr.min_v_median,
                thr.hue_enabled,
                thr.h_red_max,
                thr.h_red_min2,
                thr.h_orange_min,
                thr.h_orange_max
            ),
            format!(
                "counts: contours={} considered={} strict={}",
                counts.contours_total, counts.considered, counts.strict
            ),
        ];
        if !record.selection.cand_v_med.is_empty() {
            parts.push(format!("cand_v_med={:?}", record.selection.cand_v_med));
        }
        parts.push(format!(
            "best: score={:.1} adj={:.1} area={:.1} circ={:.3} fill={:.3} inner_cov={:.2} \
             hue_cov={:.2} v_med={:.0} v_cov={:.2} sat_cov={:.2} ring_den={:.3} radial={:.2} cov={:.2}",
            best.score,
            best.score_adj,
            best.area,
            best.circularity,
            best.fill,
            best.inner_cov,
            best.hue_cov,
            best.v_med,
            best.v_cov,
            best.sat_cov,
            best.ring_density,
            best.radial_score,
            best.radial_cov
        ));
        if let Some(roi) = &record.roi_stats {
            parts.push(format!(
                "roi: circ={:.3} fill={:.3} v_med={:.0}",
                roi.circularity, roi.fill, roi.v_med
            ));
        }
        parts.push(format!(
            "refine: attempted={} ok={}",
            record.refine.attempted as u8, record.refine.ok as u8
        ));
        if let Some(fb) = &record.fallback {
            parts.push(format!(
                "fallback: method={} accepted={} center=({:.0},{:.0}) r_est={:.1}",
                fb.method, fb.accepted, fb.center[0], fb.center[1], fb.r_est
            ));
        }

        let mut line = parts.join(" | ");
        line.push('\n');
        for rj in record.rejects.iter().take(top_n_rejects) {
            let mut r = format!("  reject: {} A{:.0}", rj.reason, rj.area);
            if let Some(c) = rj.circularity {
                r.push_str(&format!(" C{c:.3}"));
            }
            if let Some(f) = rj.fill {
                r.push_str(&format!(" F{f:.3}"));
            }
            if let Some(rr) = rj.r {
                r.push_str(&format!(" r{rr:.1}"));
            }
            if let Some(v) = rj.v_med {
                r.push_str(&format!(" V{v:.0}"));
            }
            r.push('\n');
            line.push_str(&r);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_dump::{RejectReason, RejectRecord};

    fn temp_log(name: &str) -> LogParams {
        LogParams {
            enabled: true,
            path: std::env::temp_dir().join(name),
            max_bytes: 4096,
        }
    }

    #[test]
    fn construction_resets_the_file() {
        let params = temp_log("ballsight-test-reset.log");
        std::fs::write(&params.path, "stale").unwrap();
        let _log = DetectionLog::new(params.clone());
        assert_eq!(std::fs::read_to_string(&params.path).unwrap(), "");
    }

    #[test]
    fn lines_are_pipe_delimited_with_rejects_indented() {
        let params = temp_log("ballsight-test-lines.log");
        let mut log = DetectionLog::new(params.clone());
        let mut record = DebugRecord::default();
        let mut rj = RejectRecord::new(RejectReason::VMed, 850.0);
        rj.v_med = Some(72.0);
        record.rejects.push(rj);
        log.append("No Ball", "low-v-med", None, &record, 6);

        let text = std::fs::read_to_string(&params.path).unwrap();
        let first = text.lines().next().unwrap();
        assert!(first.starts_with('['));
        assert!(first.contains("run=000001"));
        assert!(first.contains("status=No Ball"));
        assert!(first.contains(" | reason=low-v-med | ball=None | "));
        assert!(text.lines().nth(1).unwrap().starts_with("  reject: v-med A850"));
    }

    #[test]
    fn oversized_file_is_truncated() {
        let mut params = temp_log("ballsight-test-cap.log");
        params.max_bytes = 64;
        let mut log = DetectionLog::new(params.clone());
        let record = DebugRecord::default();
        for _ in 0..10 {
            log.append("No Ball", "none", None, &record, 0);
        }
        let len = std::fs::metadata(&params.path).unwrap().len();
        // At most the cap plus one appended line.
        assert!(len < 1024, "len = {len}");
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let mut params = temp_log("ballsight-test-off.log");
        params.enabled = false;
        let _ = std::fs::remove_file(&params.path);
        let mut log = DetectionLog::new(params.clone());
        log.append("Detected !", "contour", None, &DebugRecord::default(), 0);
        assert!(!params.path.exists());
    }
}
