//! Deterministic scenario replay.
//!
//! A [`Scenario`] is a config plus a list of collaborator calls, each with
//! optional expectations. [`replay`] drives a fresh [`SparseIdsList`] through
//! the steps, checks the index invariants after every step, records what the
//! index published and answered into a [`Transcript`], and stops at the first
//! step that misbehaves.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use sparseids_index::{
    MsgId, MsgRange, OwnedSliceUpdate, SliceUpdate, SparseIdsConfig, SparseIdsList,
    SparseIdsQuery, SparseIdsResult,
};
use tracing::{debug, warn};

use crate::error::{HarnessError, Result};
use crate::log::{Transcript, TranscriptEntry};

const SCENARIO_COMPONENT: &str = "sparseids.harness";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub config: SparseIdsConfig,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Range as written in scenario files. A missing `till` is the open newest
/// boundary, which TOML integers cannot spell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    #[serde(default)]
    pub from: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub till: Option<u64>,
}

impl From<RangeSpec> for MsgRange {
    fn from(written: RangeSpec) -> Self {
        Self::new(
            MsgId::new(written.from),
            written.till.map_or(MsgId::SERVER_MAX, MsgId::new),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    AddNew {
        id: MsgId,
        #[serde(default)]
        expect: MutationExpectation,
    },
    AddExisting {
        id: MsgId,
        range: RangeSpec,
        #[serde(default)]
        expect: MutationExpectation,
    },
    AddSlice {
        ids: Vec<MsgId>,
        range: RangeSpec,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        expect: MutationExpectation,
    },
    RemoveOne {
        id: MsgId,
        #[serde(default)]
        expect: MutationExpectation,
    },
    RemoveAll {
        #[serde(default)]
        expect: MutationExpectation,
    },
    Query {
        #[serde(default)]
        around: MsgId,
        limit_before: usize,
        limit_after: usize,
        #[serde(default)]
        expect: QueryExpectation,
    },
}

/// Checks applied after a mutating step. Absent fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MutationExpectation {
    /// Reason code the call must be rejected with. When absent the call must
    /// succeed.
    pub error: Option<String>,
    /// Number of updates the call must publish.
    pub updates: Option<usize>,
    /// Total count afterwards.
    pub count: Option<usize>,
    /// The total count must be unknown afterwards.
    pub count_unknown: bool,
    /// Number of slices afterwards.
    pub slices: Option<usize>,
}

/// Checks applied to a query answer. Absent fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryExpectation {
    pub ids: Option<Vec<MsgId>>,
    pub skipped_before: Option<usize>,
    pub skipped_after: Option<usize>,
    pub count: Option<usize>,
    /// The answer must carry no ids and no skipped counts.
    pub unknown: bool,
}

/// First step that failed its expectations or broke an invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub scenario: String,
    pub step: usize,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub transcript: Transcript,
    pub failure: Option<StepFailure>,
}

impl ReplayOutcome {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn into_result(self) -> Result<Transcript> {
        match self.failure {
            Some(failure) => Err(HarnessError::StepFailed(failure)),
            None => Ok(self.transcript),
        }
    }
}

/// Replay `scenario` against a fresh index.
#[must_use]
pub fn replay(scenario: &Scenario) -> ReplayOutcome {
    let mut list = SparseIdsList::with_config(scenario.config.clone());
    let published: Rc<RefCell<Vec<OwnedSliceUpdate>>> = Rc::default();
    let sink = Rc::clone(&published);
    let _subscription = list.subscribe(move |update: &SliceUpdate<'_>| {
        sink.borrow_mut().push(update.to_owned_update());
    });

    let mut transcript = Transcript::new(&scenario.name);
    for (index, step) in scenario.steps.iter().enumerate() {
        let checked = run_step(&mut list, step, index, &published, &mut transcript)
            .and_then(|()| {
                list.check_invariants()
                    .map_err(|err| format!("invariant violated: {err}"))
            });
        if let Err(detail) = checked {
            warn!(
                component = SCENARIO_COMPONENT,
                scenario = %scenario.name,
                step = index,
                detail = %detail,
                "scenario step failed"
            );
            return ReplayOutcome {
                transcript,
                failure: Some(StepFailure {
                    scenario: scenario.name.clone(),
                    step: index,
                    detail,
                }),
            };
        }
    }

    transcript.push(TranscriptEntry::Finish {
        steps: scenario.steps.len(),
        stats: *list.stats(),
    });
    debug!(
        component = SCENARIO_COMPONENT,
        scenario = %scenario.name,
        steps = scenario.steps.len(),
        "scenario replayed"
    );
    ReplayOutcome {
        transcript,
        failure: None,
    }
}

fn run_step(
    list: &mut SparseIdsList,
    step: &Step,
    index: usize,
    published: &RefCell<Vec<OwnedSliceUpdate>>,
    transcript: &mut Transcript,
) -> std::result::Result<(), String> {
    let (outcome, expect) = match step {
        Step::AddNew { id, expect } => (list.add_new(*id), expect),
        Step::AddExisting { id, range, expect } => {
            (list.add_existing(*id, MsgRange::from(*range)), expect)
        }
        Step::AddSlice {
            ids,
            range,
            count,
            expect,
        } => (
            list.add_slice(ids.iter().copied(), MsgRange::from(*range), *count),
            expect,
        ),
        Step::RemoveOne { id, expect } => {
            list.remove_one(*id);
            (Ok(()), expect)
        }
        Step::RemoveAll { expect } => {
            list.remove_all();
            (Ok(()), expect)
        }
        Step::Query {
            around,
            limit_before,
            limit_after,
            expect,
        } => {
            let query = SparseIdsQuery::new(*around, *limit_before, *limit_after);
            let result = list.query(query);
            let checked = check_query(expect, &result);
            transcript.push(TranscriptEntry::Query {
                step: index,
                query,
                result,
            });
            return checked;
        }
    };

    let updates = published.borrow_mut().drain(..).collect::<Vec<_>>();
    let emitted = updates.len();
    for update in updates {
        transcript.push(TranscriptEntry::Update { step: index, update });
    }

    match (outcome, &expect.error) {
        (Ok(()), Some(code)) => return Err(format!("expected rejection '{code}', call succeeded")),
        (Err(err), None) => {
            transcript.push(rejected(index, &err));
            return Err(format!("unexpected rejection: {err}"));
        }
        (Err(err), Some(code)) => {
            transcript.push(rejected(index, &err));
            if err.reason_code() != code {
                return Err(format!(
                    "expected rejection '{code}', got '{}'",
                    err.reason_code()
                ));
            }
        }
        (Ok(()), None) => {}
    }
    check_mutation(expect, list, emitted)
}

fn rejected(step: usize, err: &sparseids_index::SparseIdsError) -> TranscriptEntry {
    TranscriptEntry::Rejected {
        step,
        reason_code: err.reason_code().to_owned(),
        message: err.to_string(),
    }
}

fn check_mutation(
    expect: &MutationExpectation,
    list: &SparseIdsList,
    emitted: usize,
) -> std::result::Result<(), String> {
    if let Some(updates) = expect.updates {
        if updates != emitted {
            return Err(format!("expected {updates} updates, got {emitted}"));
        }
    }
    if let Some(count) = expect.count {
        if list.count() != Some(count) {
            return Err(format!("expected count {count}, got {:?}", list.count()));
        }
    }
    if expect.count_unknown && list.count().is_some() {
        return Err(format!("expected unknown count, got {:?}", list.count()));
    }
    if let Some(slices) = expect.slices {
        if list.slice_count() != slices {
            return Err(format!(
                "expected {slices} slices, got {}",
                list.slice_count()
            ));
        }
    }
    Ok(())
}

fn check_query(
    expect: &QueryExpectation,
    result: &SparseIdsResult,
) -> std::result::Result<(), String> {
    if let Some(ids) = &expect.ids {
        let ids = ids.iter().copied().collect::<BTreeSet<_>>();
        if ids != result.ids {
            return Err(format!("expected ids {ids:?}, got {:?}", result.ids));
        }
    }
    let sides = [
        ("skipped_before", expect.skipped_before, result.skipped_before),
        ("skipped_after", expect.skipped_after, result.skipped_after),
        ("count", expect.count, result.count),
    ];
    for (field, wanted, got) in sides {
        if wanted.is_some() && wanted != got {
            return Err(format!("expected {field} {wanted:?}, got {got:?}"));
        }
    }
    if expect.unknown && !result.is_unknown() {
        return Err(format!("expected unknown answer, got {result:?}"));
    }
    Ok(())
}
