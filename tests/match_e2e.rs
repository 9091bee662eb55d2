//! End-to-end matcher scenarios over scripted and compiled scorers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taxamatch::classification::Classification;
use taxamatch::compiler::NetworkCompiler;
use taxamatch::error::{InferenceError, StoreError, TaxaError};
use taxamatch::inference::Inference;
use taxamatch::matcher::{
    Analyser, Candidate, ClassificationMatcher, Inferencer, MatcherOptions, Parameters, Searcher,
};
use taxamatch::network::Network;
use taxamatch::observable::{Condition, Modifier, ModifierAction, Observable};
use taxamatch::value::Value;

fn network() -> Network {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Network::builder("linnaean")
        .vertex(Observable::new("kingdom").unwrap().with_group("higher"))
        .vertex(Observable::new("genus").unwrap())
        .edge("kingdom", "genus")
        .modifier(
            Modifier::new(
                "drop-kingdom",
                ModifierAction::Erase {
                    observables: vec!["kingdom".to_string()],
                },
            )
            .unwrap()
            .when(Condition::Present {
                observable: "kingdom".to_string(),
            }),
        )
        .build()
        .unwrap()
}

struct Entry {
    key: String,
    classification: Classification,
    parameters: Parameters,
    synonym: bool,
}

impl Candidate for Entry {
    fn key(&self) -> &str {
        &self.key
    }

    fn classification(&self) -> &Classification {
        &self.classification
    }

    fn load_parameters(&self) -> Result<Parameters, StoreError> {
        Ok(self.parameters.clone())
    }

    fn is_synonym(&self) -> bool {
        self.synonym
    }
}

struct FixedStore {
    entries: Vec<Arc<Entry>>,
    fail: bool,
    /// Keys that only turn up once the query has been widened.
    widened_only: bool,
}

impl Searcher<Entry> for FixedStore {
    fn search(&self, query: &Classification) -> Result<Vec<Arc<Entry>>, StoreError> {
        if self.fail {
            return Err(StoreError::Backend {
                message: "index offline".to_string(),
            });
        }
        if self.widened_only && query.has("kingdom") {
            return Ok(vec![]);
        }
        Ok(self.entries.clone())
    }

    fn get(&self, key: &str) -> Result<Option<Arc<Entry>>, StoreError> {
        Ok(self.entries.iter().find(|e| e.key() == key).cloned())
    }
}

/// Scripted scorer: posterior keyed by the candidate's genus value, with an
/// invocation counter.
struct ScriptedInferencer {
    scores: Vec<(String, Inference)>,
    calls: AtomicUsize,
}

impl ScriptedInferencer {
    fn new(scores: Vec<(&str, Inference)>) -> Self {
        Self {
            scores: scores
                .into_iter()
                .map(|(genus, inference)| (genus.to_string(), inference))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Inferencer for ScriptedInferencer {
    fn probability(
        &self,
        _query: &Classification,
        candidate: &Classification,
        _parameters: &Parameters,
    ) -> Result<Inference, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let genus = candidate
            .get("genus")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.scores
            .iter()
            .find(|(key, _)| *key == genus)
            .map(|(_, inference)| *inference)
            .ok_or(InferenceError::MissingValue { observable: genus })
    }
}

/// Pass-through preparation for scripted tests.
struct Identity;

impl Analyser for Identity {
    fn prepare(&self, query: &Classification) -> Result<Classification, TaxaError> {
        Ok(query.clone())
    }
}

fn entry(compiled: &taxamatch::CompiledNetwork, key: &str, kingdom: &str, genus: &str) -> Arc<Entry> {
    let classification = Classification::new(Arc::clone(compiled.layout()))
        .with("kingdom", kingdom)
        .unwrap()
        .with("genus", genus)
        .unwrap();
    Arc::new(Entry {
        key: key.to_string(),
        classification,
        parameters: Parameters::new(),
        synonym: false,
    })
}

fn query(compiled: &taxamatch::CompiledNetwork, genus: &str) -> Classification {
    Classification::new(Arc::clone(compiled.layout()))
        .with("kingdom", "Plantae")
        .unwrap()
        .with("genus", genus)
        .unwrap()
}

/// posterior p with a supporting boost.
fn supported(p: f64) -> Inference {
    // prior = p, evidence = 0.5, conditional = 0.6: posterior = 1.2 * p.
    Inference::for_pec(p / 1.2, 0.5, 0.6)
}

#[test]
fn acceptable_match_short_circuits_scoring() {
    let compiled = Arc::new(NetworkCompiler::new().analyse(&network()).unwrap());
    let store = FixedStore {
        entries: vec![
            entry(&compiled, "1", "Plantae", "Acacia"),
            entry(&compiled, "2", "Plantae", "Acaena"),
            entry(&compiled, "3", "Plantae", "Acalypha"),
        ],
        fail: false,
        widened_only: false,
    };
    let inferencer = Arc::new(ScriptedInferencer::new(vec![
        ("Acacia", supported(0.995)),
        ("Acaena", supported(0.6)),
        ("Acalypha", supported(0.4)),
    ]));
    let matcher = ClassificationMatcher::new(Arc::clone(&compiled), store)
        .with_analyser(Arc::new(Identity))
        .with_inferencer(Arc::clone(&inferencer) as Arc<dyn Inferencer>);

    let found = matcher.find_match(&query(&compiled, "Acacia")).unwrap().unwrap();
    assert_eq!(found.candidate().key(), "1");
    assert!(found.inference().posterior >= 0.99);
    assert!(found.inference().boost() > 1.0);
    // The winner was first, so the remaining candidates were never scored.
    assert_eq!(inferencer.calls(), 1);
}

#[test]
fn best_possible_wins_when_nothing_is_acceptable() {
    let compiled = Arc::new(NetworkCompiler::new().analyse(&network()).unwrap());
    let store = FixedStore {
        entries: vec![
            entry(&compiled, "low", "Plantae", "Acaena"),
            entry(&compiled, "high", "Plantae", "Acacia"),
        ],
        fail: false,
        widened_only: false,
    };
    let inferencer = Arc::new(ScriptedInferencer::new(vec![
        ("Acaena", supported(0.3)),
        ("Acacia", supported(0.5)),
    ]));
    let matcher = ClassificationMatcher::new(Arc::clone(&compiled), store)
        .with_analyser(Arc::new(Identity))
        .with_inferencer(Arc::clone(&inferencer) as Arc<dyn Inferencer>);

    let found = matcher.find_match(&query(&compiled, "Acacia")).unwrap().unwrap();
    assert_eq!(found.candidate().key(), "high");
    // Both cleared the possible threshold, so both were scored.
    assert_eq!(inferencer.calls(), 2);
}

#[test]
fn empty_candidate_list_resolves_without_scoring() {
    let compiled = Arc::new(NetworkCompiler::new().analyse(&network()).unwrap());
    let store = FixedStore {
        entries: vec![],
        fail: false,
        widened_only: false,
    };
    let inferencer = Arc::new(ScriptedInferencer::new(vec![]));
    let matcher = ClassificationMatcher::new(Arc::clone(&compiled), store)
        .with_analyser(Arc::new(Identity))
        .with_inferencer(Arc::clone(&inferencer) as Arc<dyn Inferencer>);

    let found = matcher.find_match(&query(&compiled, "Acacia")).unwrap();
    assert!(found.is_none());
    assert_eq!(inferencer.calls(), 0);
}

#[test]
fn raising_thresholds_never_creates_matches() {
    let compiled = Arc::new(NetworkCompiler::new().analyse(&network()).unwrap());
    let score = supported(0.5);

    let run = |possible: f64, acceptable: f64| {
        let store = FixedStore {
            entries: vec![entry(&compiled, "1", "Plantae", "Acacia")],
            fail: false,
            widened_only: false,
        };
        let inferencer = Arc::new(ScriptedInferencer::new(vec![("Acacia", score)]));
        let matcher = ClassificationMatcher::new(Arc::clone(&compiled), store)
            .with_analyser(Arc::new(Identity))
            .with_inferencer(inferencer as Arc<dyn Inferencer>)
            .with_options(
                MatcherOptions::default()
                    .with_possible_threshold(possible)
                    .with_acceptable_threshold(acceptable),
            );
        matcher.find_match(&query(&compiled, "Acacia")).unwrap()
    };

    assert!(run(0.1, 0.99).is_some());
    assert!(run(0.1, 0.4).is_some());
    // Raising the possible floor above the posterior removes the match.
    assert!(run(0.6, 0.99).is_none());
}

#[test]
fn unscoreable_candidates_are_skipped_not_fatal() {
    let compiled = Arc::new(NetworkCompiler::new().analyse(&network()).unwrap());
    let store = FixedStore {
        entries: vec![
            entry(&compiled, "broken", "Plantae", "Unscripted"),
            entry(&compiled, "good", "Plantae", "Acacia"),
        ],
        fail: false,
        widened_only: false,
    };
    // "Unscripted" has no scripted score, so scoring it errors.
    let inferencer = Arc::new(ScriptedInferencer::new(vec![("Acacia", supported(0.5))]));
    let matcher = ClassificationMatcher::new(Arc::clone(&compiled), store)
        .with_analyser(Arc::new(Identity))
        .with_inferencer(inferencer as Arc<dyn Inferencer>);

    let found = matcher.find_match(&query(&compiled, "Acacia")).unwrap().unwrap();
    assert_eq!(found.candidate().key(), "good");
}

#[test]
fn store_failures_abort_the_match() {
    let compiled = Arc::new(NetworkCompiler::new().analyse(&network()).unwrap());
    let store = FixedStore {
        entries: vec![],
        fail: true,
        widened_only: false,
    };
    let inferencer = Arc::new(ScriptedInferencer::new(vec![]));
    let matcher = ClassificationMatcher::new(Arc::clone(&compiled), store)
        .with_analyser(Arc::new(Identity))
        .with_inferencer(inferencer as Arc<dyn Inferencer>);

    let err = matcher.find_match(&query(&compiled, "Acacia")).unwrap_err();
    assert!(err.is_store());
    assert!(!err.is_recoverable());
}

#[test]
fn modifiers_widen_an_empty_search() {
    let compiled = Arc::new(NetworkCompiler::new().analyse(&network()).unwrap());
    // The store only answers queries without a kingdom; the network's
    // drop-kingdom modifier makes the second attempt succeed.
    let store = FixedStore {
        entries: vec![entry(&compiled, "1", "Plantae", "Acacia")],
        fail: false,
        widened_only: true,
    };
    let inferencer = Arc::new(ScriptedInferencer::new(vec![("Acacia", supported(0.995))]));
    let matcher = ClassificationMatcher::new(Arc::clone(&compiled), store)
        .with_analyser(Arc::new(Identity))
        .with_inferencer(inferencer as Arc<dyn Inferencer>);

    let found = matcher.find_match(&query(&compiled, "Acacia")).unwrap();
    assert!(found.is_some());
}

#[test]
fn synonym_veto_applies_end_to_end() {
    let compiled = Arc::new(NetworkCompiler::new().analyse(&network()).unwrap());
    // Undermining evidence: boost below one, posterior 0.5.
    let undermined = Inference::for_pec(0.625, 0.5, 0.4);
    assert!(undermined.boost() < 1.0);

    let run = |synonym: bool| {
        let classification = Classification::new(Arc::clone(compiled.layout()))
            .with("kingdom", "Plantae")
            .unwrap()
            .with("genus", "Racosperma")
            .unwrap();
        let store = FixedStore {
            entries: vec![Arc::new(Entry {
                key: "syn".to_string(),
                classification,
                parameters: Parameters::new(),
                synonym,
            })],
            fail: false,
            widened_only: false,
        };
        let inferencer = Arc::new(ScriptedInferencer::new(vec![("Racosperma", undermined)]));
        let matcher = ClassificationMatcher::new(Arc::clone(&compiled), store)
            .with_analyser(Arc::new(Identity))
            .with_inferencer(inferencer as Arc<dyn Inferencer>);
        matcher.find_match(&query(&compiled, "Racosperma")).unwrap()
    };

    assert!(run(false).is_some());
    assert!(run(true).is_none());
}

/// Full pipeline through the compiled interpretive scorer, no scripting.
#[test]
fn compiled_scorer_accepts_exact_and_rejects_mismatch() {
    let compiled = Arc::new(NetworkCompiler::new().analyse(&network()).unwrap());

    let weights = Parameters::new()
        .with("inf_kingdom_t$$", 0.5)
        .with("inf_kingdom_t$t$", 0.95)
        .with("inf_kingdom_t$f$", 0.01)
        .with("inf_genus_t$t$t", 0.99)
        .with("inf_genus_t$f$f", 0.05)
        .with("inf_genus_t$$", 0.02)
        .with("inf_genus_t$t$", 0.9);

    let make = |key: &str, kingdom: &str, genus: &str| {
        let classification = Classification::new(Arc::clone(compiled.layout()))
            .with("kingdom", kingdom)
            .unwrap()
            .with("genus", genus)
            .unwrap();
        Arc::new(Entry {
            key: key.to_string(),
            classification,
            parameters: weights.clone(),
            synonym: false,
        })
    };

    let store = FixedStore {
        entries: vec![
            make("fox", "Animalia", "Vulpes"),
            make("wattle", "Plantae", "Acacia"),
        ],
        fail: false,
        widened_only: false,
    };
    let matcher: ClassificationMatcher<_, Entry> =
        ClassificationMatcher::new(Arc::clone(&compiled), store);

    let found = matcher.find_match(&query(&compiled, "Acacia")).unwrap().unwrap();
    assert_eq!(found.candidate().key(), "wattle");
    assert!(found.inference().posterior > 0.9);

    // A query matching nothing in the store yields no match.
    let miss = matcher.find_match(&query(&compiled, "Eucalyptus")).unwrap();
    assert!(miss.is_none());
}

/// Partial evidence selects the erased variant and still matches.
#[test]
fn compiled_scorer_handles_partial_queries() {
    let compiled = Arc::new(NetworkCompiler::new().analyse(&network()).unwrap());

    let weights = Parameters::new()
        .with("inf_kingdom_t$$", 0.5)
        .with("inf_kingdom_t$t$", 0.95)
        .with("inf_kingdom_t$f$", 0.01)
        .with("inf_genus_t$t$t", 0.99)
        .with("inf_genus_t$f$f", 0.05)
        .with("inf_genus_t$$", 0.02)
        .with("inf_genus_t$t$", 0.9);

    let classification = Classification::new(Arc::clone(compiled.layout()))
        .with("kingdom", "Plantae")
        .unwrap()
        .with("genus", "Acacia")
        .unwrap();
    let store = FixedStore {
        entries: vec![Arc::new(Entry {
            key: "wattle".to_string(),
            classification,
            parameters: weights,
            synonym: false,
        })],
        fail: false,
        widened_only: false,
    };
    let matcher: ClassificationMatcher<_, Entry> =
        ClassificationMatcher::new(Arc::clone(&compiled), store);

    // No kingdom in the query: the "higher" group is erased, genus becomes
    // the variant's input.
    let partial = Classification::new(Arc::clone(compiled.layout()))
        .with("genus", "Acacia")
        .unwrap();
    let found = matcher.find_match(&partial).unwrap().unwrap();
    assert_eq!(found.candidate().key(), "wattle");
}
