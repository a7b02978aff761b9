//! High-level detection API.
//!
//! [`Detector`] owns the tunable configuration, the last-run diagnostics
//! record and the text-log side channel. One instance per camera stream;
//! calls are synchronous and must be serialized by the caller.

pub mod config;

use image::{GrayImage, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;

use crate::color::ColorPlanes;
use crate::confidence::{self, ConfidenceInput};
use crate::contour::{self, fill_contour_mask, ContourShape};
use crate::debug_dump::{
    BestMetrics, DebugRecord, MaskSet, RankedMask, RejectReason, RejectRecord, StageCounts,
    ThresholdsSnapshot,
};
use crate::detect_log::DetectionLog;
use crate::fallback::distance_fallback;
use crate::mask::{build_masks, ColorMasks};
use crate::metrics;
use crate::mosaic::build_mosaic;
use crate::refine::refine_circle;
use crate::score::{composite_score, Candidate, RadialStats};
use crate::select::{select_best, selection_pool};
use crate::split::{split_peanut, SplitHalf};
use crate::BallDetection;
use config::DetectConfig;

/// Primary detection interface.
///
/// Create once, analyze many frames. Not safe for concurrent use: the
/// diagnostics record and thresholds are plain instance state.
pub struct Detector {
    config: DetectConfig,
    last_debug: DebugRecord,
    log: DetectionLog,
}

impl Detector {
    /// Create a detector with calibrated default thresholds.
    pub fn new() -> Self {
        Self::with_config(DetectConfig::default())
    }

    /// Create with full config control.
    pub fn with_config(config: DetectConfig) -> Self {
        let log = DetectionLog::new(config.log.clone());
        Self {
            config,
            last_debug: DebugRecord::default(),
            log,
        }
    }

    /// Access the current configuration.
    pub fn config(&self) -> &DetectConfig {
        &self.config
    }

    /// Mutable access for between-call tuning.
    pub fn config_mut(&mut self) -> &mut DetectConfig {
        &mut self.config
    }

    /// Operator toggle for the radial edge-symmetry gate.
    ///
    /// Disabling swaps the gate's effective thresholds to 0.0; every other
    /// check is untouched.
    pub fn set_radial_gate_enabled(&mut self, enabled: bool) {
        self.config.radial.enabled = enabled;
    }

    /// Last-run diagnostics record; valid until the next [`analyze`] call.
    ///
    /// [`analyze`]: Detector::analyze
    pub fn last_debug(&self) -> &DebugRecord {
        &self.last_debug
    }

    /// Analyze one frame.
    ///
    /// Returns the detected ball (if any) and the combined gate mask. Never
    /// panics; a degenerate frame yields `(None, None)`.
    pub fn analyze(&mut self, frame: &RgbImage) -> (Option<BallDetection>, Option<GrayImage>) {
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            self.last_debug = DebugRecord::default();
            self.last_debug.summary = "empty frame".to_string();
            return (None, None);
        }

        let planes = ColorPlanes::compute(frame);
        let (masks, gate) = build_masks(&planes, &self.config.color);

        let ctx = FrameContext {
            planes: &planes,
            masks: &masks,
            config: &self.config,
            max_r: self.config.max_radius_px(w, h),
            max_area: self.config.max_area_px(w, h),
            width: w,
            height: h,
        };

        let mut counts = StageCounts::default();
        let mut rejects: Vec<RejectRecord> = Vec::new();
        let mut candidates: Vec<Candidate> = Vec::new();

        for points in contour::external_contours(&masks.combined) {
            counts.contours_total += 1;
            process_contour(&ctx, points, &mut candidates, &mut rejects, &mut counts);
        }
        tracing::debug!(
            contours = counts.contours_total,
            considered = counts.considered,
            strict = counts.strict,
            "contour stage done"
        );

        let mut record = DebugRecord {
            thresholds: ThresholdsSnapshot::from_config(
                &self.config,
                gate.a_threshold,
                gate.a_percentile_value,
            ),
            ..Default::default()
        };

        let (pool, strict_only) = selection_pool(&candidates);
        let selected = select_best(&candidates, &pool, &self.config.pair);

        record.masks = build_mask_set(&ctx, &candidates, &pool);
        let outcome = match selected {
            Some((best_idx, mut notes)) => {
                notes.strict_only = strict_only;
                record.selection = notes;
                self.finish_with_candidate(&ctx, &candidates, best_idx, &mut record)
            }
            None => self.finish_without_candidates(&ctx, &mut record),
        };

        record.counts = counts;
        rejects.sort_by(|a, b| {
            b.area
                .partial_cmp(&a.area)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rejects.truncate(self.config.debug_top_n_rejects);
        record.rejects = rejects;

        let (ball, status, reason) = outcome;
        record.summary = render_summary(&record, &candidates, ball.as_ref(), &reason);
        let radial_vis = record.radial_vis.clone();
        record.mosaic = Some(build_mosaic(
            frame,
            &record,
            ball.map(|b| (b.x, b.y, b.r)),
            radial_vis.as_ref(),
        ));

        self.log
            .append(status, &reason, ball.as_ref(), &record, self.config.debug_top_n_rejects);
        tracing::debug!(status, reason = reason.as_str(), "analyze done");

        self.last_debug = record;
        (ball, Some(masks.combined))
    }

    /// Refine, gate, and possibly fall back, starting from the selected
    /// contour candidate.
    fn finish_with_candidate(
        &self,
        ctx: &FrameContext<'_>,
        candidates: &[Candidate],
        best_idx: usize,
        record: &mut DebugRecord,
    ) -> (Option<BallDetection>, &'static str, String) {
        let cfg = ctx.config;
        let best = &candidates[best_idx];
        let (mut bx, mut by, mut br) = (best.cx, best.cy, best.r);

        let (refined, refine_debug) = refine_circle(
            &ctx.planes.gray,
            &ctx.planes.s,
            &ctx.planes.v,
            bx,
            by,
            br,
            &cfg.refine,
            &cfg.coverage,
            cfg.color.s_min,
            cfg.color.v_min,
        );
        let refine_ok = refined.is_some();
        if let Some((rx, ry, rr)) = refined {
            bx = rx;
            by = ry;
            br = rr;
        }
        record.refine = refine_debug;

        // Re-measure the evidence at the (possibly refined) circle.
        let inner_r = br * cfg.coverage.inner_ratio;
        let inner_cov =
            metrics::disc_mask_coverage(&ctx.masks.combined, bx, by, inner_r).unwrap_or(0.0);
        let hue_cov = metrics::disc_mask_coverage(&ctx.masks.hue, bx, by, inner_r).unwrap_or(0.0);
        let v_cov = metrics::disc_v_coverage(&ctx.planes.v, cfg.coverage.v_strong, bx, by, inner_r)
            .unwrap_or(0.0);
        let v_med =
            metrics::disc_v_median(&ctx.planes.v, Some(&ctx.masks.combined), bx, by, inner_r)
                .unwrap_or(0.0);
        let sat_cov = metrics::disc_sat_coverage(
            &ctx.planes.s,
            &ctx.planes.v,
            cfg.color.s_min,
            cfg.color.v_min,
            bx,
            by,
            inner_r,
        )
        .unwrap_or(0.0);
        let ring_density = metrics::ring_edge_density(&ctx.planes.gray, bx, by, br).unwrap_or(0.0);
        let mut radial_sym =
            metrics::radial_edge_symmetry(&ctx.planes.gray, bx, by, br, true).unwrap_or_default();
        record.radial_vis = radial_sym.vis.take();
        let radial = RadialStats::from(&radial_sym);

        let score_adj = if radial.coverage >= cfg.radial.effective_min_coverage() {
            best.score * (0.5 + 0.5 * radial.score)
        } else {
            best.score
        };
        record.best = BestMetrics {
            score: best.score,
            score_adj,
            area: best.area,
            circularity: best.circularity,
            fill: best.fill,
            v_med,
            v_cov,
            sat_cov,
            hue_cov,
            inner_cov,
            ring_density,
            radial_score: radial.score,
            radial_cov: radial.coverage,
            radial_edge_total: radial.edge_total,
            radial_ring_area: radial.ring_area,
        };
        record.roi_stats = metrics::rect_roi_stats(&ctx.masks.combined, &ctx.planes.v, bx, by, br);

        let verdict = confidence::evaluate(
            &ConfidenceInput {
                best: &record.best,
                strict: best.strict,
                refine_ok,
            },
            &cfg.coverage,
            &cfg.radial,
        );

        match verdict {
            Ok(()) => {
                let ball = BallDetection {
                    x: bx,
                    y: by,
                    r: br * cfg.radius_inflation,
                    area: best.area,
                    circularity: best.circularity,
                };
                (Some(ball), "Detected !", "contour".to_string())
            }
            Err(reason) => {
                // Last chance: the stricter distance fallback.
                let (fb, fb_debug, fb_refine) = distance_fallback(ctx.planes, ctx.masks, cfg);
                record.fallback = fb_debug;
                if let Some(rd) = fb_refine {
                    record.refine = rd;
                }
                match fb {
                    Some((x, y, r, comp_area)) => {
                        let ball = BallDetection {
                            x,
                            y,
                            r: r * cfg.radius_inflation,
                            area: comp_area,
                            circularity: 0.0,
                        };
                        (Some(ball), "Detected !", "fallback-distance".to_string())
                    }
                    None => (None, "No Ball", reason),
                }
            }
        }
    }

    /// No contour candidate at all: go straight to the fallback.
    fn finish_without_candidates(
        &self,
        ctx: &FrameContext<'_>,
        record: &mut DebugRecord,
    ) -> (Option<BallDetection>, &'static str, String) {
        let (fb, fb_debug, fb_refine) = distance_fallback(ctx.planes, ctx.masks, ctx.config);
        record.fallback = fb_debug;
        if let Some(rd) = fb_refine {
            record.refine = rd;
        }
        match fb {
            Some((x, y, r, comp_area)) => {
                let ball = BallDetection {
                    x,
                    y,
                    r: r * ctx.config.radius_inflation,
                    area: comp_area,
                    circularity: 0.0,
                };
                (Some(ball), "Detected !", "fallback-distance".to_string())
            }
            None => (None, "No Ball", "no-contour-or-fallback".to_string()),
        }
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only per-frame context shared by the stage helpers.
struct FrameContext<'a> {
    planes: &'a ColorPlanes,
    masks: &'a ColorMasks,
    config: &'a DetectConfig,
    max_r: f32,
    max_area: f32,
    width: u32,
    height: u32,
}

/// Coverage/brightness metrics over a candidate's inner disc.
struct InnerMetrics {
    v_med: f32,
    sat_cov: f32,
    hue_cov: f32,
    inner_cov: f32,
}

fn inner_metrics(ctx: &FrameContext<'_>, cx: f32, cy: f32, r: f32) -> InnerMetrics {
    let cfg = ctx.config;
    let inner_r = r * cfg.coverage.inner_ratio;
    InnerMetrics {
        v_med: metrics::disc_v_median(&ctx.planes.v, Some(&ctx.masks.combined), cx, cy, inner_r)
            .unwrap_or(0.0),
        sat_cov: metrics::disc_sat_coverage(
            &ctx.planes.s,
            &ctx.planes.v,
            cfg.color.s_min,
            cfg.color.v_min,
            cx,
            cy,
            inner_r,
        )
        .unwrap_or(0.0),
        hue_cov: metrics::disc_mask_coverage(&ctx.masks.hue, cx, cy, inner_r).unwrap_or(0.0),
        inner_cov: metrics::disc_mask_coverage(&ctx.masks.combined, cx, cy, inner_r).unwrap_or(0.0),
    }
}

/// Gate one traced contour into candidates (splitting peanuts), recording
/// rejects along the way.
fn process_contour(
    ctx: &FrameContext<'_>,
    points: Vec<imageproc::point::Point<i32>>,
    candidates: &mut Vec<Candidate>,
    rejects: &mut Vec<RejectRecord>,
    counts: &mut StageCounts,
) {
    let cfg = ctx.config;
    let area = contour::polygon_area(&points);
    if area < cfg.shape.min_area || area > ctx.max_area {
        let mut rj = RejectRecord::new(RejectReason::Area, area);
        if points.len() >= 3 {
            let (cx, cy, r) = contour::min_enclosing_circle(&points);
            rj.cx = Some(cx);
            rj.cy = Some(cy);
            rj.r = Some(r);
        }
        rejects.push(rj);
        return;
    }

    let shape = match contour::shape_of(points) {
        Some(s) => s,
        None => {
            rejects.push(RejectRecord::new(RejectReason::Peri, area));
            return;
        }
    };
    if shape.r < cfg.shape.min_radius || shape.r > ctx.max_r {
        let mut rj = RejectRecord::new(RejectReason::Radius, area);
        rj.circularity = Some(shape.circularity);
        rj.r = Some(shape.r);
        rj.cx = Some(shape.cx);
        rj.cy = Some(shape.cy);
        rejects.push(rj);
        return;
    }

    let strict_ok = shape.circularity >= cfg.shape.min_circularity && shape.fill >= cfg.shape.min_fill;
    if strict_ok {
        counts.strict += 1;
    }

    let v_med_c = metrics::disc_v_median(
        &ctx.planes.v,
        Some(&ctx.masks.combined),
        shape.cx,
        shape.cy,
        shape.r * cfg.coverage.inner_ratio,
    )
    .unwrap_or(0.0);

    let halves = split_peanut(
        &shape.points,
        ctx.width,
        ctx.height,
        cfg.shape.min_area,
        cfg.shape.min_radius,
        ctx.max_r,
        &cfg.split,
    );
    if !halves.is_empty() {
        for half in halves {
            process_split_half(ctx, &shape, half, candidates, rejects, counts);
        }
        return;
    }

    if shape.circularity < cfg.shape.loose_circularity {
        let mut rj = RejectRecord::new(RejectReason::Circ, area);
        rj.circularity = Some(shape.circularity);
        rj.fill = Some(shape.fill);
        rj.r = Some(shape.r);
        rj.v_med = Some(v_med_c);
        rj.cx = Some(shape.cx);
        rj.cy = Some(shape.cy);
        rejects.push(rj);
        return;
    }
    if shape.fill < cfg.shape.loose_fill {
        let mut rj = RejectRecord::new(RejectReason::Fill, area);
        rj.circularity = Some(shape.circularity);
        rj.fill = Some(shape.fill);
        rj.r = Some(shape.r);
        rj.v_med = Some(v_med_c);
        rj.cx = Some(shape.cx);
        rj.cy = Some(shape.cy);
        rejects.push(rj);
        return;
    }

    counts.considered += 1;

    let ring_density =
        metrics::ring_edge_density(&ctx.planes.gray, shape.cx, shape.cy, shape.r).unwrap_or(0.0);
    let im = inner_metrics(ctx, shape.cx, shape.cy, shape.r);
    let score = composite_score(
        area,
        shape.circularity,
        shape.fill,
        strict_ok,
        im.v_med,
        im.sat_cov,
        &cfg.coverage,
        &cfg.score,
    );

    if im.v_med < cfg.coverage.min_v_median_candidate {
        let mut rj = RejectRecord::new(RejectReason::VMed, area);
        rj.circularity = Some(shape.circularity);
        rj.fill = Some(shape.fill);
        rj.r = Some(shape.r);
        rj.v_med = Some(im.v_med);
        rj.cx = Some(shape.cx);
        rj.cy = Some(shape.cy);
        rejects.push(rj);
        return;
    }

    candidates.push(Candidate {
        cx: shape.cx,
        cy: shape.cy,
        r: shape.r,
        area,
        circularity: shape.circularity,
        fill: shape.fill,
        ring_density,
        strict: strict_ok,
        score,
        v_med: im.v_med,
        sat_cov: im.sat_cov,
        hue_cov: im.hue_cov,
        inner_cov: im.inner_cov,
        from_split: false,
        points: Some(shape.points),
    });
}

/// Gate one split half as an independent candidate.
fn process_split_half(
    ctx: &FrameContext<'_>,
    parent: &ContourShape,
    half: SplitHalf,
    candidates: &mut Vec<Candidate>,
    rejects: &mut Vec<RejectRecord>,
    counts: &mut StageCounts,
) {
    let cfg = ctx.config;
    if half.r < cfg.shape.min_radius || half.r > ctx.max_r {
        let mut rj = RejectRecord::new(RejectReason::Radius, parent.area);
        rj.circularity = Some(half.circularity);
        rj.r = Some(half.r);
        rj.cx = Some(half.cx);
        rj.cy = Some(half.cy);
        rejects.push(rj);
        return;
    }

    // A split half uses combined-mask disc coverage as its fill ratio: the
    // sub-contour's own enclosing circle is distorted by the cut.
    let fill =
        metrics::disc_mask_coverage(&ctx.masks.combined, half.cx, half.cy, half.r).unwrap_or(0.0);
    let ring_density =
        metrics::ring_edge_density(&ctx.planes.gray, half.cx, half.cy, half.r).unwrap_or(0.0);
    if fill < cfg.shape.loose_fill {
        let mut rj = RejectRecord::new(RejectReason::Fill, parent.area);
        rj.circularity = Some(half.circularity);
        rj.fill = Some(fill);
        rj.r = Some(half.r);
        rj.cx = Some(half.cx);
        rj.cy = Some(half.cy);
        rj.ring_density = Some(ring_density);
        rejects.push(rj);
        return;
    }

    let strict_ok = half.circularity >= cfg.shape.min_circularity && fill >= cfg.shape.min_fill;
    if strict_ok {
        counts.strict += 1;
    }

    let im = inner_metrics(ctx, half.cx, half.cy, half.r);
    if im.v_med < cfg.coverage.min_v_median_candidate {
        let mut rj = RejectRecord::new(RejectReason::VMed, parent.area);
        rj.circularity = Some(half.circularity);
        rj.fill = Some(fill);
        rj.r = Some(half.r);
        rj.v_med = Some(im.v_med);
        rj.cx = Some(half.cx);
        rj.cy = Some(half.cy);
        rj.ring_density = Some(ring_density);
        rejects.push(rj);
        return;
    }

    counts.considered += 1;
    let score = composite_score(
        half.area,
        half.circularity,
        fill,
        strict_ok,
        im.v_med,
        im.sat_cov,
        &cfg.coverage,
        &cfg.score,
    );

    candidates.push(Candidate {
        cx: half.cx,
        cy: half.cy,
        r: half.r,
        area: half.area,
        circularity: half.circularity,
        fill,
        ring_density,
        strict: strict_ok,
        score,
        v_med: im.v_med,
        sat_cov: im.sat_cov,
        hue_cov: im.hue_cov,
        inner_cov: im.inner_cov,
        from_split: true,
        points: half.points,
    });
}

/// Export gate masks plus the ranked / pool candidate masks.
fn build_mask_set(ctx: &FrameContext<'_>, candidates: &[Candidate], pool: &[usize]) -> MaskSet {
    let (w, h) = (ctx.width, ctx.height);
    let mut set = MaskSet {
        redness: ctx.masks.redness.clone(),
        hue: ctx.masks.hue.clone(),
        combined: ctx.masks.combined.clone(),
        refined: None,
        ranked: Vec::new(),
    };

    if !pool.is_empty() {
        let mut refined = GrayImage::new(w, h);
        for &i in pool {
            let c = &candidates[i];
            if c.r > 1.0 {
                draw_filled_circle_mut(
                    &mut refined,
                    (c.cx.round() as i32, c.cy.round() as i32),
                    c.r.round() as i32,
                    image::Luma([255]),
                );
            }
        }
        set.refined = Some(refined);
    }

    // Top-3 pool candidates by (V-median, score).
    let mut order: Vec<usize> = pool.to_vec();
    order.sort_by(|&a, &b| {
        let ka = (candidates[a].v_med, candidates[a].score);
        let kb = (candidates[b].v_med, candidates[b].score);
        kb.partial_cmp(&ka).unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut used = GrayImage::new(w, h);
    for (rank, &i) in order.iter().take(3).enumerate() {
        let c = &candidates[i];
        let m = match &c.points {
            Some(points) => fill_contour_mask(w, h, points),
            None => {
                let mut m = GrayImage::new(w, h);
                if c.r > 1.0 {
                    draw_filled_circle_mut(
                        &mut m,
                        (c.cx.round() as i32, c.cy.round() as i32),
                        c.r.round() as i32,
                        image::Luma([255]),
                    );
                }
                m
            }
        };
        let area = m.as_raw().iter().filter(|&&p| p != 0).count() as f32;
        union_into(&mut used, &m);
        set.ranked.push(RankedMask {
            rank: rank + 1,
            v_med: c.v_med,
            score: c.score,
            area,
            mask: m,
        });
    }

    // Pad to three panes with the largest leftover combined-mask blobs.
    if set.ranked.len() < 3 {
        let mut blobs: Vec<Vec<imageproc::point::Point<i32>>> =
            contour::external_contours(&ctx.masks.combined);
        blobs.sort_by(|a, b| {
            contour::polygon_area(b)
                .partial_cmp(&contour::polygon_area(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for points in blobs {
            if set.ranked.len() >= 3 {
                break;
            }
            if contour::polygon_area(&points) <= 0.0 {
                continue;
            }
            let m = fill_contour_mask(w, h, &points);
            let area = m.as_raw().iter().filter(|&&p| p != 0).count() as f32;
            if area <= 0.0 {
                continue;
            }
            let overlap = overlap_count(&used, &m) as f32;
            if overlap / area > 0.6 {
                continue;
            }
            union_into(&mut used, &m);
            set.ranked.push(RankedMask {
                rank: set.ranked.len() + 1,
                v_med: 0.0,
                score: -1.0,
                area,
                mask: m,
            });
        }
    }
    set
}

fn union_into(dst: &mut GrayImage, src: &GrayImage) {
    for (d, s) in dst.iter_mut().zip(src.as_raw()) {
        if *s != 0 {
            *d = 255;
        }
    }
}

fn overlap_count(a: &GrayImage, b: &GrayImage) -> usize {
    a.as_raw()
        .iter()
        .zip(b.as_raw())
        .filter(|(x, y)| **x != 0 && **y != 0)
        .count()
}

/// Render the text summary pane.
fn render_summary(
    record: &DebugRecord,
    candidates: &[Candidate],
    ball: Option<&BallDetection>,
    reason: &str,
) -> String {
    let thr = &record.thresholds;
    let mut lines = vec![
        "ballsight (Lab a + HSV)".to_string(),
        format!(
            "a>=max({},p{:.0}={:.1}) => {} | S>={} V>={}{}",
            thr.a_min,
            thr.a_percentile,
            thr.a_p,
            thr.a_thr,
            thr.s_min,
            thr.v_min,
            if thr.hue_enabled {
                format!(
                    " | H:red<={} or >={}, orange {}-{}",
                    thr.h_red_max, thr.h_red_min2, thr.h_orange_min, thr.h_orange_max
                )
            } else {
                String::new()
            }
        ),
        format!(
            "contours:{} considered:{} strict:{}",
            record.counts.contours_total, record.counts.considered, record.counts.strict
        ),
    ];

    // Ranked candidate list, brightest first, padded to three rows.
    let mut ranked: Vec<&Candidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| {
        (b.v_med, b.score)
            .partial_cmp(&(a.v_med, a.score))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    // Only a contour-path acceptance marks a candidate row; a fallback hit
    // means every contour candidate was rejected.
    let accepted_score = match (ball, reason) {
        (Some(_), "contour") => Some(record.best.score),
        _ => None,
    };
    for (idx, c) in ranked.iter().enumerate() {
        let accepted = accepted_score.is_some_and(|s| (c.score - s).abs() < 1e-3);
        let status = if accepted { "Accepted" } else { "Rejected" };
        let split_tag = if c.from_split { " (split)" } else { "" };
        let suffix = if accepted { " ***" } else { "" };
        lines.push(format!(
            "#{}. {}: V-med {:.0} ( A{:.0} C{:.3} F{:.3} r{:.1} ring{:.3} ){}{}",
            idx + 1,
            status,
            c.v_med,
            c.area,
            c.circularity,
            c.fill,
            c.r,
            c.ring_density,
            split_tag,
            suffix
        ));
    }
    for idx in ranked.len()..3 {
        lines.push(format!(
            "#{}. Rejected: V-med N/A ( A0 C0.000 F0.000 r0.0 )",
            idx + 1
        ));
    }

    match ball {
        Some(b) => lines.push(format!(
            "circle: ({:.1},{:.1}) r={:.1} (inflated 1.10x)",
            b.x, b.y, b.r
        )),
        None => lines.push(format!("best: none ({reason})")),
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{disc_frame, Disc};

    fn quiet_detector() -> Detector {
        let mut cfg = DetectConfig::default();
        cfg.log.enabled = false;
        Detector::with_config(cfg)
    }

    fn red_disc(cx: f32, cy: f32, r: f32) -> Disc {
        Disc {
            cx,
            cy,
            r,
            color: [230, 30, 25],
        }
    }

    #[test]
    fn scenario_a_clean_disc_is_detected() {
        let frame = disc_frame(400, 300, [25, 25, 25], &[red_disc(200.0, 150.0, 40.0)]);
        let mut det = quiet_detector();
        let (ball, mask) = det.analyze(&frame);
        let ball = ball.expect("disc should be detected");
        assert!((ball.x - 200.0).abs() <= 3.0, "x = {}", ball.x);
        assert!((ball.y - 150.0).abs() <= 3.0, "y = {}", ball.y);
        let expected = 1.10 * 40.0;
        assert!(
            (ball.r - expected).abs() <= expected * 0.15,
            "r = {}",
            ball.r
        );
        assert!(mask.is_some());
        let dbg = det.last_debug();
        assert_eq!(dbg.counts.strict, 1);
        assert_eq!(dbg.counts.considered, 1);
        assert!(dbg.refine.attempted);
        assert!(!dbg.summary.is_empty());
    }

    #[test]
    fn scenario_a_is_deterministic() {
        let frame = disc_frame(400, 300, [25, 25, 25], &[red_disc(200.0, 150.0, 40.0)]);
        let mut det = quiet_detector();
        let (b1, m1) = det.analyze(&frame);
        let (b2, m2) = det.analyze(&frame);
        assert_eq!(b1, b2);
        assert_eq!(m1.unwrap().as_raw(), m2.unwrap().as_raw());
    }

    #[test]
    fn scenario_b_split_pair_prefers_upper_disc() {
        // Ball and its dimmer reflection merged into one peanut blob.
        let frame = disc_frame(
            400,
            300,
            [25, 25, 25],
            &[
                red_disc(200.0, 120.0, 30.0),
                Disc {
                    cx: 200.0,
                    cy: 175.0,
                    r: 30.0,
                    color: [140, 25, 20],
                },
            ],
        );
        let mut det = quiet_detector();
        let (ball, _) = det.analyze(&frame);
        let ball = ball.expect("upper disc should be detected");
        assert!(ball.y < 145.0, "upper disc should win, y = {}", ball.y);
        assert!((ball.x - 200.0).abs() <= 5.0);
        let dbg = det.last_debug();
        assert_eq!(dbg.counts.contours_total, 1, "blobs should be merged");
        assert_eq!(dbg.counts.considered, 2, "split should yield two candidates");
    }

    #[test]
    fn scenario_c_black_frame_is_empty() {
        let frame = disc_frame(320, 240, [0, 0, 0], &[]);
        let mut det = quiet_detector();
        let (ball, mask) = det.analyze(&frame);
        assert!(ball.is_none());
        let mask = mask.expect("mask is returned even when empty");
        assert!(mask.as_raw().iter().all(|&p| p == 0));
        let dbg = det.last_debug();
        assert_eq!(dbg.counts.contours_total, 0);
        assert!(!dbg.summary.is_empty());
    }

    #[test]
    fn scenario_d_small_disc_rejected_for_radius() {
        // Radius well below min_radius but big enough to survive the
        // morphological opening.
        let frame = disc_frame(320, 240, [25, 25, 25], &[red_disc(160.0, 120.0, 6.0)]);
        let mut det = quiet_detector();
        // Keep the area gate out of the way so the radius gate decides.
        det.config_mut().shape.min_area = 50.0;
        let (ball, _) = det.analyze(&frame);
        assert!(ball.is_none());
        let dbg = det.last_debug();
        assert!(
            dbg.rejects
                .iter()
                .any(|r| r.reason == RejectReason::Radius),
            "rejects: {:?}",
            dbg.rejects
        );
    }

    #[test]
    fn scenario_e_dark_disc_rejected_for_v_median() {
        // Passes the color gate on a bright-gray floor but stays dim.
        let frame = disc_frame(
            320,
            240,
            [170, 170, 170],
            &[Disc {
                cx: 160.0,
                cy: 120.0,
                r: 30.0,
                color: [99, 12, 10],
            }],
        );
        let mut det = quiet_detector();
        let (ball, _) = det.analyze(&frame);
        assert!(ball.is_none(), "dark disc must stay rejected");
        let dbg = det.last_debug();
        assert!(
            dbg.rejects.iter().any(|r| r.reason == RejectReason::VMed),
            "rejects: {:?}",
            dbg.rejects
        );
        // The fallback, when it ran, must not have accepted either.
        if let Some(fb) = &dbg.fallback {
            assert!(!fb.accepted);
        }
    }

    #[test]
    fn empty_frame_returns_none_none() {
        let mut det = quiet_detector();
        let (ball, mask) = det.analyze(&RgbImage::new(0, 0));
        assert!(ball.is_none());
        assert!(mask.is_none());
    }

    #[test]
    fn radial_toggle_affects_only_the_radial_gate() {
        let frame = disc_frame(400, 300, [25, 25, 25], &[red_disc(200.0, 150.0, 40.0)]);
        let mut det = quiet_detector();
        det.set_radial_gate_enabled(false);
        let (ball, _) = det.analyze(&frame);
        assert!(ball.is_some(), "detection must still work with the gate off");
        let snap = &det.last_debug().thresholds;
        assert!(!snap.radial_gate_enabled);
        assert_eq!(snap.min_radial_score, 0.0);
        assert_eq!(snap.min_radial_coverage, 0.0);
        // Re-enabling restores the configured thresholds.
        det.set_radial_gate_enabled(true);
        let (_, _) = det.analyze(&frame);
        let snap = &det.last_debug().thresholds;
        assert!((snap.min_radial_score - 0.55).abs() < 1e-6);
    }

    #[test]
    fn diagnostics_are_overwritten_each_call() {
        let with_ball = disc_frame(400, 300, [25, 25, 25], &[red_disc(200.0, 150.0, 40.0)]);
        let empty = disc_frame(400, 300, [0, 0, 0], &[]);
        let mut det = quiet_detector();
        det.analyze(&with_ball);
        assert_eq!(det.last_debug().counts.contours_total, 1);
        det.analyze(&empty);
        assert_eq!(det.last_debug().counts.contours_total, 0);
        assert!(det.last_debug().best.v_med == 0.0);
    }

    #[test]
    fn returned_circle_respects_bounds() {
        let frame = disc_frame(400, 300, [25, 25, 25], &[red_disc(200.0, 150.0, 40.0)]);
        let mut det = quiet_detector();
        let (ball, _) = det.analyze(&frame);
        let ball = ball.unwrap();
        let cfg = det.config();
        assert!(ball.r >= cfg.shape.min_radius);
        assert!(ball.r <= cfg.max_radius_px(400, 300) * cfg.radius_inflation);
        assert!(ball.x >= 0.0 && ball.x < 400.0);
        assert!(ball.y >= 0.0 && ball.y < 300.0);
    }

    #[test]
    fn ranked_masks_are_exported_for_histograms() {
        let frame = disc_frame(400, 300, [25, 25, 25], &[red_disc(200.0, 150.0, 40.0)]);
        let mut det = quiet_detector();
        det.analyze(&frame);
        let masks = &det.last_debug().masks;
        assert!(!masks.ranked.is_empty());
        assert_eq!(masks.ranked[0].rank, 1);
        assert!(masks.ranked[0].area > 0.0);
        assert!(masks.refined.is_some());
        assert!(det.last_debug().mosaic.is_some());
    }
}
