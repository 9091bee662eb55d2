//! Classification matching.
//!
//! A [`ClassificationMatcher`] runs a fixed pipeline: prepare the query
//! (normalize and fill in derived values), search the store for candidate
//! entries, score each candidate with the compiled network, and resolve a
//! winner under the accept/possible thresholds. Store failures abort the
//! match; per-candidate inference failures only skip that candidate.

pub mod boundary;
pub mod cache;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::classification::Classification;
use crate::compiler::{uniform_assignment, CompiledNetwork};
use crate::error::{InferenceError, TaxaError, TaxaResult};
use crate::inference::Inference;
use crate::issues::Issues;
use crate::observable::{Contributor, Modifier, Style};
use crate::value::Value;

pub use boundary::{Analyser, Candidate, Inferencer, Parameters, Searcher};
pub use cache::CachedSearcher;

/// A resolved match against one candidate.
pub struct Match<C> {
    candidate: Arc<C>,
    accepted: Classification,
    actual: Classification,
    inference: Inference,
    issues: Issues,
}

impl<C> Match<C> {
    fn new(candidate: Arc<C>, accepted: Classification, actual: Classification, inference: Inference) -> Self {
        Self {
            candidate,
            accepted,
            actual,
            inference,
            issues: Issues::default(),
        }
    }

    /// The matched candidate.
    #[must_use]
    pub fn candidate(&self) -> &Arc<C> {
        &self.candidate
    }

    /// The candidate's classification.
    #[must_use]
    pub fn accepted(&self) -> &Classification {
        &self.accepted
    }

    /// The prepared query classification that was actually scored.
    #[must_use]
    pub fn actual(&self) -> &Classification {
        &self.actual
    }

    /// The posterior computation behind this match.
    #[must_use]
    pub fn inference(&self) -> &Inference {
        &self.inference
    }

    /// Quality flags attached so far.
    #[must_use]
    pub fn issues(&self) -> &Issues {
        &self.issues
    }

    /// Attach a quality flag, returning a new match.
    #[must_use]
    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues = self.issues.with(issue);
        self
    }
}

impl<C> Clone for Match<C> {
    fn clone(&self) -> Self {
        Self {
            candidate: Arc::clone(&self.candidate),
            accepted: self.accepted.clone(),
            actual: self.actual.clone(),
            inference: self.inference,
            issues: self.issues.clone(),
        }
    }
}

impl<C> fmt::Debug for Match<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("accepted", &self.accepted.to_string())
            .field("inference", &self.inference)
            .field("issues", &self.issues)
            .finish_non_exhaustive()
    }
}

/// How a scored candidate ranks against the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Below the possible threshold, or vetoed; never returned.
    Impossible,

    /// Above the possible threshold; best one wins if nothing is acceptable.
    Possible,

    /// At or above the acceptable threshold; wins immediately.
    Acceptable,
}

/// Tie comparator over equally probable matches.
pub type TieBreaker<C> = Arc<dyn Fn(&Match<C>, &Match<C>) -> Ordering + Send + Sync>;

/// Matcher thresholds and tie-breaking.
///
/// Thresholds are configuration, not policy; callers tune them per corpus.
pub struct MatcherOptions<C> {
    /// Posterior floor below which a candidate is discarded.
    pub possible_threshold: f64,

    /// Posterior at which a candidate wins immediately.
    pub acceptable_threshold: f64,

    tie_breaker: Option<TieBreaker<C>>,
}

impl<C> Default for MatcherOptions<C> {
    fn default() -> Self {
        Self {
            possible_threshold: 0.1,
            acceptable_threshold: 0.99,
            tie_breaker: None,
        }
    }
}

impl<C> fmt::Debug for MatcherOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherOptions")
            .field("possible_threshold", &self.possible_threshold)
            .field("acceptable_threshold", &self.acceptable_threshold)
            .field("tie_breaker", &self.tie_breaker.is_some())
            .finish()
    }
}

impl<C> MatcherOptions<C> {
    /// Override the possible threshold.
    #[must_use]
    pub fn with_possible_threshold(mut self, threshold: f64) -> Self {
        self.possible_threshold = threshold;
        self
    }

    /// Override the acceptable threshold.
    #[must_use]
    pub fn with_acceptable_threshold(mut self, threshold: f64) -> Self {
        self.acceptable_threshold = threshold;
        self
    }

    /// Supply a tie comparator for equally probable matches.
    #[must_use]
    pub fn with_tie_breaker(mut self, tie_breaker: TieBreaker<C>) -> Self {
        self.tie_breaker = Some(tie_breaker);
        self
    }

    /// Rank a scored candidate.
    ///
    /// A synonym whose evidence undermines the hypothesis (boost below one)
    /// must clear ten times the possible threshold; synonyms otherwise
    /// shadow their accepted name on weak evidence.
    #[must_use]
    pub fn verdict(&self, synonym: bool, inference: &Inference) -> Verdict {
        let posterior = inference.posterior;
        if posterior < self.possible_threshold {
            return Verdict::Impossible;
        }
        if synonym && inference.boost() < 1.0 && posterior < self.possible_threshold * 10.0 {
            return Verdict::Impossible;
        }
        if posterior >= self.acceptable_threshold {
            Verdict::Acceptable
        } else {
            Verdict::Possible
        }
    }

    fn break_tie(&self, challenger: &Match<C>, incumbent: &Match<C>) -> Ordering {
        self.tie_breaker
            .as_ref()
            .map_or(Ordering::Equal, |cmp| cmp(challenger, incumbent))
    }
}

/// Query preparation against a compiled network.
///
/// Applies each observable's normalizer to its own slot, then fills in
/// derived observables in dependency order, then checks required slots.
pub struct NetworkAnalyser {
    compiled: Arc<CompiledNetwork>,
}

impl NetworkAnalyser {
    /// An analyser over a compiled network.
    #[must_use]
    pub fn new(compiled: Arc<CompiledNetwork>) -> Self {
        Self { compiled }
    }
}

impl Analyser for NetworkAnalyser {
    fn prepare(&self, query: &Classification) -> TaxaResult<Classification> {
        let network = self.compiled.network();
        let mut prepared = query.clone();

        for observable in network.vertices() {
            let Some(normalizer) = &observable.normalizer else {
                continue;
            };
            let key = observable.key();
            let Some(current) = prepared.get(key).and_then(Value::as_str).map(ToString::to_string)
            else {
                continue;
            };
            let normalized = normalizer.apply(&current)?;
            prepared.set(key, Value::String(normalized))?;
        }

        for key in self.compiled.derivation_order() {
            if prepared.has(key) {
                continue;
            }
            let Some(observable) = network.observable(key) else {
                continue;
            };
            let Some(derivation) = &observable.derivation else {
                continue;
            };
            if let Some(value) = derivation.derive(&prepared) {
                prepared.set(key, value)?;
            }
        }

        for observable in network.vertices() {
            if observable.required && !prepared.has(observable.key()) {
                return Err(TaxaError::invalid_query(format!(
                    "required observable {} has no value and no derivation produced one",
                    observable.key()
                )));
            }
        }

        Ok(prepared)
    }
}

/// Interpretive scorer over compiled formulas.
///
/// Walks the compiled parameters directly instead of running generated
/// code; the generated fast path is a downstream concern. The erasure
/// variant is chosen by which groups carry query evidence, evidence signs
/// come from style-aware value comparison, and the posterior combines the
/// all-true and all-false postulate families through Bayes' rule.
pub struct CompiledInferencer {
    compiled: Arc<CompiledNetwork>,
}

impl CompiledInferencer {
    /// A scorer over a compiled network.
    #[must_use]
    pub fn new(compiled: Arc<CompiledNetwork>) -> Self {
        Self { compiled }
    }

    /// Select the erasure variant matching the query's evidence coverage.
    fn variant_for(&self, query: &Classification) -> Result<&CompiledNetwork, InferenceError> {
        let network = self.compiled.network();
        let signature: String = network
            .erasure_groups()
            .iter()
            .map(|group| {
                let present = network.vertices().iter().any(|o| {
                    o.group.as_deref() == Some(group.as_str()) && query.has(o.key())
                });
                if present {
                    'T'
                } else {
                    'F'
                }
            })
            .collect();
        self.compiled
            .variant(&signature)
            .ok_or(InferenceError::MissingVariant { signature })
    }

    /// Style-aware comparison of a query value against a candidate value.
    fn values_match(style: Style, query: &Value, candidate: &Value) -> bool {
        match (style, query.as_str(), candidate.as_str()) {
            (Style::Identifier, _, _) => query == candidate,
            (Style::Canonical, Some(q), Some(c)) => {
                let collapse = |s: &str| {
                    s.split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" ")
                        .to_lowercase()
                };
                collapse(q) == collapse(c)
            }
            (Style::Phrase, Some(q), Some(c)) => {
                let words = |s: &str| {
                    s.split_whitespace()
                        .map(str::to_lowercase)
                        .collect::<BTreeSet<_>>()
                };
                words(q) == words(c)
            }
            _ => query == candidate,
        }
    }

    fn weight(
        parameters: &Parameters,
        parameter: &crate::compiler::InferenceParameter,
    ) -> Result<f64, InferenceError> {
        let weight = parameters.resolve(parameter)?;
        if !(0.0..=1.0).contains(&weight) {
            return Err(InferenceError::ProbabilityOutOfRange {
                id: parameter.id.clone(),
                value: weight,
            });
        }
        Ok(weight)
    }

    /// Product of the evidence probabilities under one hypothesis side.
    ///
    /// Under the hypothesis, every node is scored against the all-true
    /// postulate family with unknown signs defaulting to agreement; an
    /// input whose evidence disagrees has no surviving parameter (it was
    /// contradictory at compile time), so its factor is zero. Against the
    /// hypothesis, input evidence is scored on the base rates and the
    /// remaining nodes on the all-false family, the background behavior of
    /// an unrelated candidate.
    fn family_product(
        variant: &CompiledNetwork,
        signs: &[Contributor],
        hypothesis: bool,
        parameters: &Parameters,
    ) -> Result<f64, InferenceError> {
        let postulates = uniform_assignment(variant.inputs(), hypothesis);
        let extended: Vec<Contributor> = variant
            .network()
            .topological_order()
            .iter()
            .map(|observable| {
                let key = observable.key();
                let forced_input = !hypothesis && variant.inputs().iter().any(|i| i == key);
                if forced_input {
                    return Contributor::new(key, false);
                }
                signs
                    .iter()
                    .find(|c| c.observable == key)
                    .cloned()
                    .unwrap_or_else(|| Contributor::new(key, hypothesis))
            })
            .collect();

        let mut product = 1.0;
        for sign in signs {
            let Some(node) = variant.node(&sign.observable) else {
                return Err(InferenceError::MissingValue {
                    observable: sign.observable.clone(),
                });
            };
            let factor = if node.input && !hypothesis {
                let Some(base) = &node.prior else {
                    return Err(InferenceError::MissingValue {
                        observable: sign.observable.clone(),
                    });
                };
                let rate = Self::weight(parameters, base)?;
                if sign.value {
                    rate
                } else {
                    1.0 - rate
                }
            } else {
                let matching = node.parameters.iter().find(|p| {
                    p.outcome == *sign
                        && p.has_postulates(&postulates)
                        && p.matches_assignment(&extended)
                });
                match matching {
                    Some(parameter) => Self::weight(parameters, parameter)?,
                    None => 0.0,
                }
            };
            product *= factor;
            if product == 0.0 {
                break;
            }
        }
        Ok(product)
    }
}

impl Inferencer for CompiledInferencer {
    fn probability(
        &self,
        query: &Classification,
        candidate: &Classification,
        parameters: &Parameters,
    ) -> Result<Inference, InferenceError> {
        let variant = self.variant_for(query)?;

        let mut signs: Vec<Contributor> = Vec::new();
        for observable in variant.network().topological_order() {
            let key = observable.key();
            let Some(observed) = query.get(key) else {
                continue;
            };
            let matches = candidate
                .get(key)
                .is_some_and(|c| Self::values_match(observable.style, observed, c));
            signs.push(Contributor::new(key, matches));
        }
        if signs.is_empty() {
            return Err(InferenceError::MissingValue {
                observable: "query carries no evidence".to_string(),
            });
        }

        let mut prior = 1.0;
        for input in variant.inputs() {
            let Some(node) = variant.node(input) else {
                return Err(InferenceError::MissingValue {
                    observable: input.clone(),
                });
            };
            if let Some(base) = &node.prior {
                prior *= Self::weight(parameters, base)?;
            }
        }

        let cond_h = Self::family_product(variant, &signs, true, parameters)?;
        let cond_not_h = Self::family_product(variant, &signs, false, parameters)?;
        let joint = prior * cond_h;
        let evidence = joint + (1.0 - prior) * cond_not_h;
        Ok(Inference::for_peh(prior, evidence, joint))
    }
}

/// The matching pipeline over a store and a compiled network.
pub struct ClassificationMatcher<S, C> {
    searcher: S,
    analyser: Arc<dyn Analyser>,
    inferencer: Arc<dyn Inferencer>,
    options: MatcherOptions<C>,
    modifiers: Vec<Modifier>,
}

impl<S, C> ClassificationMatcher<S, C>
where
    S: Searcher<C>,
    C: Candidate,
{
    /// A matcher over a compiled network and a search backend, with the
    /// default analyser and scorer.
    #[must_use]
    pub fn new(compiled: Arc<CompiledNetwork>, searcher: S) -> Self {
        Self {
            searcher,
            analyser: Arc::new(NetworkAnalyser::new(Arc::clone(&compiled))),
            inferencer: Arc::new(CompiledInferencer::new(Arc::clone(&compiled))),
            options: MatcherOptions::default(),
            modifiers: compiled.network().modifiers().to_vec(),
        }
    }

    /// Override the matcher options.
    #[must_use]
    pub fn with_options(mut self, options: MatcherOptions<C>) -> Self {
        self.options = options;
        self
    }

    /// Substitute the query analyser.
    #[must_use]
    pub fn with_analyser(mut self, analyser: Arc<dyn Analyser>) -> Self {
        self.analyser = analyser;
        self
    }

    /// Substitute the candidate scorer.
    #[must_use]
    pub fn with_inferencer(mut self, inferencer: Arc<dyn Inferencer>) -> Self {
        self.inferencer = inferencer;
        self
    }

    /// The current options.
    #[must_use]
    pub fn options(&self) -> &MatcherOptions<C> {
        &self.options
    }

    /// Match a query classification against the store.
    ///
    /// Returns `Ok(None)` when nothing clears the possible threshold; an
    /// empty candidate list resolves without any posterior computation.
    ///
    /// # Errors
    ///
    /// A structurally invalid query and any [`crate::error::StoreError`]
    /// abort the match. Per-candidate inference failures do not.
    pub fn find_match(&self, query: &Classification) -> TaxaResult<Option<Match<C>>> {
        let actual = self.analyser.prepare(query)?;
        let candidates = self.search(&actual)?;
        if candidates.is_empty() {
            debug!(query = %actual, "no candidates found");
            return Ok(None);
        }

        let mut best: Option<Match<C>> = None;
        for candidate in candidates {
            let parameters = candidate.load_parameters()?;
            let inference = match self.inferencer.probability(
                &actual,
                candidate.classification(),
                &parameters,
            ) {
                Ok(inference) => inference,
                Err(error) => {
                    debug!(candidate = candidate.key(), %error, "candidate unscoreable, skipping");
                    continue;
                }
            };
            let verdict = self.options.verdict(candidate.is_synonym(), &inference);
            trace!(
                candidate = candidate.key(),
                posterior = inference.posterior,
                boost = inference.boost(),
                ?verdict,
                "scored candidate"
            );
            let scored = Match::new(
                Arc::clone(&candidate),
                candidate.classification().clone(),
                actual.clone(),
                inference,
            );
            match verdict {
                Verdict::Acceptable => {
                    debug!(candidate = candidate.key(), posterior = inference.posterior, "acceptable match");
                    return Ok(Some(scored));
                }
                Verdict::Possible => {
                    best = Some(match best.take() {
                        None => scored,
                        Some(incumbent) => self.better_of(scored, incumbent),
                    });
                }
                Verdict::Impossible => {}
            }
        }

        if let Some(found) = &best {
            debug!(posterior = found.inference.posterior, "possible match");
        }
        Ok(best)
    }

    /// Search, widening with the network's modifiers when the plain query
    /// finds nothing.
    fn search(&self, actual: &Classification) -> Result<Vec<Arc<C>>, TaxaError> {
        let candidates = self.searcher.search(actual)?;
        if !candidates.is_empty() {
            return Ok(candidates);
        }
        for modifier in &self.modifiers {
            if !modifier.applies(actual) {
                continue;
            }
            let widened = modifier.apply(actual);
            let candidates = self.searcher.search(&widened)?;
            if !candidates.is_empty() {
                debug!(modifier = %modifier.id, "search widened by modifier");
                return Ok(candidates);
            }
        }
        Ok(vec![])
    }

    fn better_of(&self, challenger: Match<C>, incumbent: Match<C>) -> Match<C> {
        match challenger
            .inference
            .posterior
            .partial_cmp(&incumbent.inference.posterior)
        {
            Some(Ordering::Greater) => challenger,
            Some(Ordering::Less) | None => incumbent,
            Some(Ordering::Equal) => {
                if self.options.break_tie(&challenger, &incumbent) == Ordering::Greater {
                    challenger
                } else {
                    incumbent
                }
            }
        }
    }
}
