//! The matcher driver
//!
//! Runs the four levels in order; within a level, repeats class/method/field
//! matching plus hierarchy propagation to a fixed point before advancing.
//! Candidate ranking for one pass is read-only over the store (parallelized
//! with rayon); proposal resolution, which mutates the store, always runs
//! single-threaded afterward.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::classify::class::default_class_registry;
use crate::classify::field::default_field_registry;
use crate::classify::method::default_method_registry;
use crate::classify::Registry;
use crate::compare::{classes_potentially_equal, fields_potentially_equal, methods_potentially_equal};
use crate::config::MatcherConfig;
use crate::context::Graphs;
use crate::error::MatchEngineError;
use crate::level::Level;
use crate::model::{ClassId, FieldId, Image, MethodId};
use crate::store::MatchStore;

/// Observes level-by-level progress, so a CLI can wire in an indicatif bar
/// without the core depending on it.
pub trait ProgressReporter: Send + Sync {
    fn on_level_start(&self, _level: Level) {}
    fn on_level_end(&self, _level: Level, _classes: usize, _methods: usize, _fields: usize) {}
}

pub struct NoopProgressReporter;
impl ProgressReporter for NoopProgressReporter {}

/// Cooperative cancellation, checked between levels and between inner
/// iterations.
pub trait CancellationToken: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

pub struct NeverCancel;
impl CancellationToken for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

type Proposal<K> = (K, K, f64, Option<f64>);

/// Groups proposals by target, keeps the highest scorer per target, and
/// commits it only when it clears the level's threshold and beats every
/// runner-up — its own top-two-scores margin and any rival proposer's score
/// — by the level's relative margin. A margin failure at FINAL is recorded
/// as ambiguous; at earlier levels it is simply deferred, silently, so a
/// later looser level (or a match that removes a rival candidate) gets
/// another chance at it.
fn resolve_proposals<K, F, G>(
    proposals: Vec<Proposal<K>>,
    level: Level,
    threshold: f64,
    margin: f64,
    mut commit: F,
    mut mark_ambiguous: G,
) -> Result<bool, MatchEngineError>
where
    K: Copy + Eq + std::hash::Hash + Ord,
    F: FnMut(K, K, f64) -> Result<(), MatchEngineError>,
    G: FnMut(K, K),
{
    let mut by_b: HashMap<K, Vec<(K, f64, Option<f64>)>> = HashMap::new();
    for (a, b, score, runner_up) in proposals {
        by_b.entry(b).or_default().push((a, score, runner_up));
    }

    let mut changed = false;
    for (b, mut group) in by_b {
        group.sort_by(|x, y| y.1.partial_cmp(&x.1).unwrap_or(std::cmp::Ordering::Equal));
        let (a, score, runner_up) = group[0];
        if score < threshold {
            continue;
        }
        let contested = group.get(1).map(|g| g.1);
        let best_runner_up = [runner_up, contested].into_iter().flatten().fold(f64::MIN, f64::max);
        if best_runner_up > f64::MIN && (score - best_runner_up) < margin {
            if level == Level::Final {
                mark_ambiguous(a, b);
            }
            continue;
        }
        commit(a, b, score)?;
        changed = true;
    }
    Ok(changed)
}

/// Owns the two images, the in-progress store, and the classifier
/// registries for one matching run.
pub struct MatcherDriver<'a> {
    graphs: Graphs<'a>,
    config: MatcherConfig,
    classes: Registry<ClassId>,
    methods: Registry<MethodId>,
    fields: Registry<FieldId>,
    progress: Box<dyn ProgressReporter>,
    cancel: Box<dyn CancellationToken>,
    /// A scoped rayon pool sized to `config.parallelism`, used for ranking
    /// passes only; `None` when `parallelism <= 1` ranks on the calling
    /// thread instead of paying for a pool.
    pool: Option<rayon::ThreadPool>,
}

impl<'a> MatcherDriver<'a> {
    pub fn new(a: &'a Image, b: &'a Image, config: MatcherConfig) -> Self {
        let pool = if config.parallelism > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.parallelism)
                    .build()
                    .expect("failed to build ranking thread pool"),
            )
        } else {
            None
        };
        MatcherDriver {
            graphs: Graphs::new(a, b),
            config,
            classes: default_class_registry(),
            methods: default_method_registry(),
            fields: default_field_registry(),
            progress: Box::new(NoopProgressReporter),
            cancel: Box::new(NeverCancel),
            pool,
        }
    }

    /// Runs `f` inside the configured ranking pool, or on the calling thread
    /// when `parallelism <= 1`.
    fn rank_in_pool<T: Send>(&self, f: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    pub fn with_progress(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.progress = reporter;
        self
    }

    pub fn with_cancellation(mut self, token: Box<dyn CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Runs every configured level (`config.levels`, all four by default) to
    /// completion and returns the populated store.
    pub fn run(mut self) -> Result<MatchStore, MatchEngineError> {
        for level in self.config.levels.clone() {
            if self.cancel.is_cancelled() {
                log::warn!("matching cancelled before level {level}");
                return Err(MatchEngineError::Cancelled { level });
            }
            log::debug!("entering level {level}");
            self.progress.on_level_start(level);

            for _ in 0..self.config.max_inner_iterations {
                if self.cancel.is_cancelled() {
                    return Err(MatchEngineError::Cancelled { level });
                }
                let mut changed = self.match_classes(level)?;
                changed |= self.match_methods(level)?;
                changed |= self.match_fields(level)?;
                if self.config.propagate_hierarchy {
                    changed |= self.propagate_hierarchy(level)?;
                }
                if !changed {
                    break;
                }
            }

            log::debug!(
                "level {level} settled: {} classes, {} methods, {} fields matched",
                self.graphs.store.class_match_count(),
                self.graphs.store.method_match_count(),
                self.graphs.store.field_match_count(),
            );
            self.progress.on_level_end(
                level,
                self.graphs.store.class_match_count(),
                self.graphs.store.method_match_count(),
                self.graphs.store.field_match_count(),
            );
        }
        Ok(self.graphs.store)
    }

    fn match_classes(&mut self, level: Level) -> Result<bool, MatchEngineError> {
        // Spec §4.3 step 1: only real A classes are proposers; a non-real
        // placeholder only anchors edges and is never itself a match subject.
        let unmatched_a: Vec<ClassId> = self
            .graphs
            .a
            .classes
            .iter()
            .filter(|c| c.real)
            .map(|c| c.id)
            .filter(|&id| !self.graphs.store.is_class_matched(id))
            .collect();
        let unmatched_b: Vec<ClassId> = self
            .graphs
            .b
            .classes
            .iter()
            .map(|c| c.id)
            .filter(|&id| !self.graphs.store.is_class_b_matched(id))
            .collect();

        let graphs = &self.graphs;
        let classes = &self.classes;
        let proposals: Vec<Proposal<ClassId>> = self
            .rank_in_pool(|| {
                unmatched_a
                    .par_iter()
                    .map(|&a| -> Result<Option<Proposal<ClassId>>, MatchEngineError> {
                        let candidates: Vec<ClassId> = unmatched_b
                            .iter()
                            .copied()
                            .filter(|&b| classes_potentially_equal(graphs, a, b))
                            .collect();
                        if candidates.is_empty() {
                            return Ok(None);
                        }
                        let ranked = classes.rank(graphs, a, &candidates, level)?;
                        let (best, best_score) = ranked[0];
                        let runner_up = ranked.get(1).map(|&(_, s)| s);
                        Ok(Some((a, best, best_score, runner_up)))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })?
            .into_iter()
            .flatten()
            .collect();

        let threshold = self.config.threshold_for(level);
        let margin = self.config.margin_for(level);
        let store = &mut self.graphs.store;
        resolve_proposals(
            proposals,
            level,
            threshold,
            margin,
            |a, b, score| store.commit_class_match(a, b, score, level),
            |a, b| store.mark_class_ambiguous(a, b),
        )
    }

    fn match_methods(&mut self, level: Level) -> Result<bool, MatchEngineError> {
        let unmatched_a: Vec<MethodId> = self
            .graphs
            .a
            .methods
            .iter()
            .map(|m| m.id)
            .filter(|&id| !self.graphs.store.is_method_matched(id))
            .filter(|&id| self.graphs.store.is_class_matched(self.graphs.a.method(id).owner))
            .collect();

        let graphs = &self.graphs;
        let methods = &self.methods;
        let proposals: Vec<Proposal<MethodId>> = self
            .rank_in_pool(|| {
                unmatched_a
                    .par_iter()
                    .map(|&a| -> Result<Option<Proposal<MethodId>>, MatchEngineError> {
                        let owner_b = graphs.store.class_match(graphs.a.method(a).owner).expect("owner matched by filter above");
                        let candidates: Vec<MethodId> = graphs
                            .b
                            .class(owner_b)
                            .methods
                            .iter()
                            .copied()
                            .filter(|&b| !graphs.store.is_method_b_matched(b))
                            .filter(|&b| methods_potentially_equal(graphs, a, b))
                            .collect();
                        if candidates.is_empty() {
                            return Ok(None);
                        }
                        let ranked = methods.rank(graphs, a, &candidates, level)?;
                        let (best, best_score) = ranked[0];
                        let runner_up = ranked.get(1).map(|&(_, s)| s);
                        Ok(Some((a, best, best_score, runner_up)))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })?
            .into_iter()
            .flatten()
            .collect();

        let threshold = self.config.threshold_for(level);
        let margin = self.config.margin_for(level);
        let store = &mut self.graphs.store;
        resolve_proposals(
            proposals,
            level,
            threshold,
            margin,
            |a, b, score| store.commit_method_match(a, b, score, level),
            |a, b| store.mark_method_ambiguous(a, b),
        )
    }

    fn match_fields(&mut self, level: Level) -> Result<bool, MatchEngineError> {
        let unmatched_a: Vec<FieldId> = self
            .graphs
            .a
            .fields
            .iter()
            .map(|f| f.id)
            .filter(|&id| !self.graphs.store.is_field_matched(id))
            .filter(|&id| self.graphs.store.is_class_matched(self.graphs.a.field(id).owner))
            .collect();

        let graphs = &self.graphs;
        let fields = &self.fields;
        let proposals: Vec<Proposal<FieldId>> = self
            .rank_in_pool(|| {
                unmatched_a
                    .par_iter()
                    .map(|&a| -> Result<Option<Proposal<FieldId>>, MatchEngineError> {
                        let owner_b = graphs.store.class_match(graphs.a.field(a).owner).expect("owner matched by filter above");
                        let candidates: Vec<FieldId> = graphs
                            .b
                            .class(owner_b)
                            .fields
                            .iter()
                            .copied()
                            .filter(|&b| !graphs.store.is_field_b_matched(b))
                            .filter(|&b| fields_potentially_equal(graphs, a, b))
                            .collect();
                        if candidates.is_empty() {
                            return Ok(None);
                        }
                        let ranked = fields.rank(graphs, a, &candidates, level)?;
                        let (best, best_score) = ranked[0];
                        let runner_up = ranked.get(1).map(|&(_, s)| s);
                        Ok(Some((a, best, best_score, runner_up)))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })?
            .into_iter()
            .flatten()
            .collect();

        let threshold = self.config.threshold_for(level);
        let margin = self.config.margin_for(level);
        let store = &mut self.graphs.store;
        resolve_proposals(
            proposals,
            level,
            threshold,
            margin,
            |a, b, score| store.commit_field_match(a, b, score, level),
            |a, b| store.mark_field_ambiguous(a, b),
        )
    }

    /// Extends a matched class pair (a ↔ b) onto their parents — unconditional
    /// since a class has at most one direct parent, so there is nothing to
    /// disambiguate — and, separately, onto a single-implementation interface
    /// pair's sole implementers, which does need the singleness check since
    /// an interface can have many implementers. Runs to its own fixed point
    /// within the level alongside class/method/field matching.
    fn propagate_hierarchy(&mut self, level: Level) -> Result<bool, MatchEngineError> {
        let matched_classes: Vec<(ClassId, ClassId)> = self.graphs.store.class_matches().map(|r| (r.a, r.b)).collect();
        let mut changed = false;

        for (a, b) in matched_classes {
            let parents = {
                let pa = self.graphs.a.class(a).parent;
                let pb = self.graphs.b.class(b).parent;
                match (pa, pb) {
                    (Some(pa), Some(pb)) => Some((pa, pb)),
                    _ => None,
                }
            };
            if let Some((pa, pb)) = parents {
                if !self.graphs.store.is_class_matched(pa)
                    && !self.graphs.store.is_class_b_matched(pb)
                    && classes_potentially_equal(&self.graphs, pa, pb)
                {
                    self.graphs.store.commit_class_match(pa, pb, 1.0, level)?;
                    changed = true;
                }
            }

            let single_implementer = {
                let ia = &self.graphs.a.class(a).implementers;
                let ib = &self.graphs.b.class(b).implementers;
                if ia.len() == 1 && ib.len() == 1 {
                    Some((*ia.iter().next().unwrap(), *ib.iter().next().unwrap()))
                } else {
                    None
                }
            };
            if let Some((ia, ib)) = single_implementer {
                if !self.graphs.store.is_class_matched(ia)
                    && !self.graphs.store.is_class_b_matched(ib)
                    && classes_potentially_equal(&self.graphs, ia, ib)
                {
                    self.graphs.store.commit_class_match(ia, ib, 1.0, level)?;
                    changed = true;
                }
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;
    use crate::model::AccessFlags;

    fn mirrored_images() -> (Image, Image) {
        let mut ba = ImageBuilder::new();
        let void_a = ba.add_class("V", AccessFlags::empty(), false);
        let parent_a = ba.add_class("Base", AccessFlags::ABSTRACT, true);
        let child_a = ba.add_class("Impl", AccessFlags::empty(), true);
        ba.set_parent(child_a, parent_a);
        let m_parent_a = ba.add_method(parent_a, "run", vec![], void_a, AccessFlags::PUBLIC, 5, true);
        let m_child_a = ba.add_method(child_a, "helper", vec![], void_a, AccessFlags::PRIVATE, 3, true);
        ba.add_call(m_child_a, m_parent_a);
        let image_a = ba.build().unwrap();

        let mut bb = ImageBuilder::new();
        let void_b = bb.add_class("a", AccessFlags::empty(), false);
        let parent_b = bb.add_class("a1", AccessFlags::ABSTRACT, true);
        let child_b = bb.add_class("a2", AccessFlags::empty(), true);
        bb.set_parent(child_b, parent_b);
        let m_parent_b = bb.add_method(parent_b, "a3", vec![], void_b, AccessFlags::PUBLIC, 5, true);
        let m_child_b = bb.add_method(child_b, "a4", vec![], void_b, AccessFlags::PRIVATE, 3, true);
        bb.add_call(m_child_b, m_parent_b);
        let image_b = bb.build().unwrap();

        (image_a, image_b)
    }

    #[test]
    fn matching_obfuscated_renames_recovers_pairs() {
        let (a, b) = mirrored_images();
        let driver = MatcherDriver::new(&a, &b, MatcherConfig::default());
        let store = driver.run().unwrap();
        // void is real = false and never a proposer (spec §4.3 step 1), so
        // only Base and Impl are matched as classes.
        assert_eq!(store.class_match_count(), 2);
        assert_eq!(store.method_match_count(), 2);
    }

    #[test]
    fn matching_is_deterministic_across_runs() {
        let (a, b) = mirrored_images();
        let store1 = MatcherDriver::new(&a, &b, MatcherConfig::default()).run().unwrap();
        let store2 = MatcherDriver::new(&a, &b, MatcherConfig::default()).run().unwrap();
        assert_eq!(store1.class_match_count(), store2.class_match_count());
        assert_eq!(store1.method_match_count(), store2.method_match_count());
    }

    #[test]
    fn matching_an_image_against_itself_is_the_identity() {
        let (a, _) = mirrored_images();
        let store = MatcherDriver::new(&a, &a, MatcherConfig::default()).run().unwrap();
        // Spec §8 invariant 5 only promises this for real entities; void
        // (real = false) is never a proposer and stays unmatched.
        for class in a.classes.iter().filter(|c| c.real) {
            assert_eq!(store.class_match(class.id), Some(class.id));
        }
    }

    #[test]
    fn resolve_proposals_only_commits_above_threshold() {
        let proposals = vec![(ClassId(0), ClassId(1), 0.4, None)];
        let mut committed = Vec::new();
        let changed = resolve_proposals(
            proposals,
            Level::Initial,
            0.9,
            0.05,
            |a, b, s| {
                committed.push((a, b, s));
                Ok(())
            },
            |_, _| {},
        )
        .unwrap();
        assert!(!changed);
        assert!(committed.is_empty());
    }

    #[test]
    fn resolve_proposals_marks_close_contests_ambiguous_at_final_only() {
        let proposals = vec![(ClassId(0), ClassId(1), 0.91, Some(0.90))];
        let mut ambiguous = Vec::new();
        let mut committed = Vec::new();
        resolve_proposals(
            proposals,
            Level::Final,
            0.5,
            0.05,
            |a, b, s| {
                committed.push((a, b, s));
                Ok(())
            },
            |a, b| ambiguous.push((a, b)),
        )
        .unwrap();
        assert!(committed.is_empty());
        assert_eq!(ambiguous, vec![(ClassId(0), ClassId(1))]);
    }

    /// A close margin fails the commit at every non-FINAL level, and
    /// silently so — the pair just isn't recorded ambiguous yet, since
    /// ambiguity is a FINAL-level concept.
    #[test]
    fn resolve_proposals_defers_close_contests_silently_before_final() {
        let proposals = vec![(ClassId(0), ClassId(1), 0.91, Some(0.90))];
        let mut ambiguous = Vec::new();
        let mut committed = Vec::new();
        for level in [Level::Initial, Level::Secondary, Level::Extra] {
            let changed = resolve_proposals(
                proposals.clone(),
                level,
                0.5,
                0.05,
                |a, b, s| {
                    committed.push((a, b, s));
                    Ok(())
                },
                |a, b| ambiguous.push((a, b)),
            )
            .unwrap();
            assert!(!changed);
        }
        assert!(committed.is_empty());
        assert!(ambiguous.is_empty());
    }

    /// Two proposers tied on the same target never commit either one, at
    /// any level, regardless of the ambiguity margin.
    #[test]
    fn resolve_proposals_never_lopsidedly_commits_a_tie() {
        let proposals = vec![(ClassId(0), ClassId(2), 0.9, None), (ClassId(1), ClassId(2), 0.9, None)];
        let mut committed = Vec::new();
        let changed = resolve_proposals(
            proposals,
            Level::Initial,
            0.5,
            0.05,
            |a, b, s| {
                committed.push((a, b, s));
                Ok(())
            },
            |_, _| {},
        )
        .unwrap();
        assert!(!changed);
        assert!(committed.is_empty());
    }
}
