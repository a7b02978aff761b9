//! Candidate selection: strict-pool restriction, ball/reflection pair
//! disambiguation, brightness-first re-ranking.

use crate::detector::config::PairParams;
use crate::score::Candidate;

/// How the final pool was chosen and which heuristics fired.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SelectionNotes {
    /// `true` when the pool was restricted to strict-pass candidates.
    pub strict_only: bool,
    /// Pool size after restriction.
    pub pool_size: usize,
    /// The upper-of-pair heuristic picked the winner.
    pub upper_pair_applied: bool,
    /// Offsets of the winning pair, when one was found.
    pub pair_dx: Option<f32>,
    pub pair_dy: Option<f32>,
    /// The (V-median, score) re-rank replaced the winner.
    pub v_med_rerank_applied: bool,
    /// Candidate V-medians, descending, for the log line.
    pub cand_v_med: Vec<i32>,
}

/// Indices of the selection pool: strict candidates when any exist,
/// otherwise everything.
pub(crate) fn selection_pool(candidates: &[Candidate]) -> (Vec<usize>, bool) {
    let strict: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.strict)
        .map(|(i, _)| i)
        .collect();
    if strict.is_empty() {
        ((0..candidates.len()).collect(), false)
    } else {
        (strict, true)
    }
}

/// Pick the best candidate of the pool.
///
/// Order of precedence, mirroring the tuning history: composite score first,
/// the upper-of-a-reflection-pair heuristic second, and a final
/// brightness-first (V-median, score) re-rank that keeps the incumbent on
/// exact ties.
pub(crate) fn select_best(
    candidates: &[Candidate],
    pool: &[usize],
    pair_cfg: &PairParams,
) -> Option<(usize, SelectionNotes)> {
    if pool.is_empty() {
        return None;
    }
    let mut notes = SelectionNotes {
        pool_size: pool.len(),
        ..Default::default()
    };

    let mut best = pool[0];
    for &i in pool.iter().skip(1) {
        if candidates[i].score > candidates[best].score {
            best = i;
        }
    }

    if let Some((upper, dx, dy)) = upper_pair_choice(candidates, pool, pair_cfg) {
        best = upper;
        notes.upper_pair_applied = true;
        notes.pair_dx = Some(dx);
        notes.pair_dy = Some(dy);
    }

    if pool.len() > 1 {
        let mut v_meds: Vec<i32> = pool.iter().map(|&i| candidates[i].v_med as i32).collect();
        v_meds.sort_unstable_by(|a, b| b.cmp(a));
        notes.cand_v_med = v_meds;

        let incumbent = best;
        for &i in pool {
            let better = (candidates[i].v_med, candidates[i].score)
                > (candidates[best].v_med, candidates[best].score);
            if better {
                best = i;
            }
        }
        notes.v_med_rerank_applied = best != incumbent;
    }

    Some((best, notes))
}

/// Find the closest similarity-band pair and apply the upper preference.
///
/// Two candidates within the band (similar radius, horizontally aligned,
/// vertically separated) are treated as ball over reflection. The upper one
/// wins when its V-median is close to the lower's, or when its weighted
/// color metric is nearly as good — reflections sit below the ball.
fn upper_pair_choice(
    candidates: &[Candidate],
    pool: &[usize],
    cfg: &PairParams,
) -> Option<(usize, f32, f32)> {
    let mut best_pair: Option<(usize, usize, f32)> = None;
    for (ai, &i) in pool.iter().enumerate() {
        for &j in pool.iter().skip(ai + 1) {
            let a = &candidates[i];
            let b = &candidates[j];
            let r0 = a.r.min(b.r);
            if r0 <= 1.0 {
                continue;
            }
            let dx = (a.cx - b.cx).abs();
            let dy = (a.cy - b.cy).abs();
            let dr = (a.r - b.r).abs();
            if dx > cfg.max_dx_ratio * r0 {
                continue;
            }
            if dr > cfg.max_dr_ratio * r0 {
                continue;
            }
            if dy < cfg.min_dy_ratio * r0 {
                continue;
            }
            let cost = dx + dy + dr;
            if best_pair.map_or(true, |(_, _, c)| cost < c) {
                best_pair = Some((i, j, cost));
            }
        }
    }

    let (i, j, _) = best_pair?;
    let (upper, lower) = if candidates[i].cy <= candidates[j].cy {
        (i, j)
    } else {
        (j, i)
    };
    let u = &candidates[upper];
    let l = &candidates[lower];

    let [wv, ws, wh, wi] = cfg.metric_weights;
    let metric =
        |c: &Candidate| wv * (c.v_med / 255.0) + ws * c.sat_cov + wh * c.hue_cov + wi * c.inner_cov;

    let v_close = u.v_med + cfg.v_close_margin >= l.v_med;
    let metrics_ok = metric(u) >= metric(l) * cfg.metric_ratio;
    if v_close || metrics_ok {
        let dx = (u.cx - l.cx).abs();
        let dy = (u.cy - l.cy).abs();
        Some((upper, dx, dy))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(cx: f32, cy: f32, r: f32, score: f32, v_med: f32, strict: bool) -> Candidate {
        Candidate {
            cx,
            cy,
            r,
            area: 1000.0,
            circularity: 0.8,
            fill: 0.8,
            ring_density: 0.02,
            strict,
            score,
            v_med,
            sat_cov: 0.8,
            hue_cov: 0.9,
            inner_cov: 0.9,
            from_split: false,
            points: None,
        }
    }

    #[test]
    fn strict_pool_shadows_loose_candidates() {
        let cands = vec![
            cand(50.0, 50.0, 20.0, 9000.0, 200.0, false),
            cand(150.0, 50.0, 20.0, 1000.0, 150.0, true),
        ];
        let (pool, strict_only) = selection_pool(&cands);
        assert!(strict_only);
        assert_eq!(pool, vec![1]);
        let (best, _) = select_best(&cands, &pool, &PairParams::default()).unwrap();
        assert_eq!(best, 1);
    }

    #[test]
    fn stacked_pair_prefers_upper() {
        // Lower (reflection) scores higher on area but is darker.
        let cands = vec![
            cand(100.0, 140.0, 30.0, 9000.0, 120.0, true),
            cand(100.0, 80.0, 30.0, 8000.0, 128.0, true),
        ];
        let (pool, _) = selection_pool(&cands);
        let (best, notes) = select_best(&cands, &pool, &PairParams::default()).unwrap();
        assert_eq!(best, 1, "upper candidate should win");
        assert!(notes.upper_pair_applied);
    }

    #[test]
    fn v_med_rerank_overrides_score() {
        // No pair geometry (far apart horizontally); brighter candidate wins
        // despite the lower score.
        let cands = vec![
            cand(40.0, 60.0, 20.0, 9000.0, 110.0, true),
            cand(200.0, 60.0, 20.0, 5000.0, 190.0, true),
        ];
        let (pool, _) = selection_pool(&cands);
        let (best, notes) = select_best(&cands, &pool, &PairParams::default()).unwrap();
        assert_eq!(best, 1);
        assert!(notes.v_med_rerank_applied);
        assert_eq!(notes.cand_v_med, vec![190, 110]);
    }

    #[test]
    fn exact_ties_keep_the_pair_choice() {
        let cands = vec![
            cand(100.0, 140.0, 30.0, 8000.0, 150.0, true),
            cand(100.0, 80.0, 30.0, 8000.0, 150.0, true),
        ];
        let (pool, _) = selection_pool(&cands);
        let (best, _) = select_best(&cands, &pool, &PairParams::default()).unwrap();
        assert_eq!(best, 1, "tie must not displace the upper choice");
    }

    #[test]
    fn dark_upper_defers_to_lower() {
        // Upper far darker and colorless: heuristic declines, lower's score
        // and V-median both win.
        let mut upper = cand(100.0, 80.0, 30.0, 2000.0, 60.0, true);
        upper.sat_cov = 0.1;
        upper.hue_cov = 0.1;
        upper.inner_cov = 0.2;
        let cands = vec![cand(100.0, 140.0, 30.0, 9000.0, 180.0, true), upper];
        let (pool, _) = selection_pool(&cands);
        let (best, _) = select_best(&cands, &pool, &PairParams::default()).unwrap();
        assert_eq!(best, 0);
    }
}
