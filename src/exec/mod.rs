//! Phase execution.
//!
//! Drives one phase's init/body/final hooks over a lazily pulled pair
//! stream. Nothing here materializes the full input or output: mapper
//! output is produced as its input is pulled, and combine/reduce bodies
//! receive each key's run as a borrowed iterator that reads values
//! straight off the source. Grouping is strictly over maximal contiguous
//! runs of equal keys, in input order; this module never sorts.
//!
//! Hook failures propagate unmodified and end the stream. Output already
//! handed downstream before a failure stays emitted.

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::job::hooks::{MapperPhase, Pair, PhaseBody, ReducerPhase};
use crate::step::PhaseKind;

/// Drive a mapper phase over `input`.
///
/// Emits init-hook output first; then either the raw hook's output,
/// invoked once with the two positional arguments, or the body's output
/// for each input pair in order; then final-hook output. Missing hooks
/// contribute nothing.
pub fn map_pairs<'a, I>(
    phase: &'a mut MapperPhase,
    input: I,
    positional: &'a [String],
) -> MapPairs<'a, I>
where
    I: Iterator<Item = Result<Pair>>,
{
    MapPairs {
        phase,
        input,
        positional,
        out: VecDeque::new(),
        state: DriveState::Init,
    }
}

/// Drive a combiner or reducer phase over `input`.
///
/// Fails up front when the phase has no in-process body hook. Emits
/// init-hook output first, then the body's output for each maximal
/// contiguous run of equal keys, then final-hook output. Each run's
/// values reach the body as a lazy single-pass iterator; values the body
/// leaves unconsumed are drained to reach the next run.
pub fn reduce_pairs<I>(
    phase: &mut ReducerPhase,
    kind: PhaseKind,
    input: I,
) -> Result<ReducePairs<'_, I>>
where
    I: Iterator<Item = Result<Pair>>,
{
    match phase.body {
        Some(PhaseBody::InProcess(_)) => {}
        _ => {
            return Err(Error::config(format!("no {kind} defined for this step")));
        }
    }
    Ok(ReducePairs {
        phase,
        input,
        pending: None,
        out: VecDeque::new(),
        state: DriveState::Init,
    })
}

enum DriveState {
    Init,
    Body,
    Finish,
    Done,
}

pub struct MapPairs<'a, I> {
    phase: &'a mut MapperPhase,
    input: I,
    positional: &'a [String],
    out: VecDeque<Pair>,
    state: DriveState,
}

impl<'a, I> MapPairs<'a, I> {
    fn fail(&mut self, err: Error) -> Option<Result<Pair>> {
        self.state = DriveState::Done;
        Some(Err(err))
    }
}

impl<'a, I> Iterator for MapPairs<'a, I>
where
    I: Iterator<Item = Result<Pair>>,
{
    type Item = Result<Pair>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.out.pop_front() {
                return Some(Ok(pair));
            }
            match self.state {
                DriveState::Init => {
                    self.state = DriveState::Body;
                    if let Some(init) = &mut self.phase.init {
                        match init() {
                            Ok(pairs) => self.out.extend(pairs),
                            Err(err) => return self.fail(err.into()),
                        }
                    }
                }
                DriveState::Body => {
                    if self.phase.raw.is_some() {
                        self.state = DriveState::Finish;
                        if self.positional.len() != 2 {
                            return self.fail(Error::ArgumentArity {
                                expected: 2,
                                actual: self.positional.len(),
                            });
                        }
                        if let Some(raw) = &mut self.phase.raw {
                            match raw(&self.positional[0], &self.positional[1]) {
                                Ok(pairs) => self.out.extend(pairs),
                                Err(err) => return self.fail(err.into()),
                            }
                        }
                    } else {
                        match self.input.next() {
                            None => self.state = DriveState::Finish,
                            Some(Err(err)) => return self.fail(err),
                            Some(Ok((key, value))) => {
                                if let Some(PhaseBody::InProcess(body)) = &mut self.phase.body {
                                    match body(key, value) {
                                        Ok(pairs) => self.out.extend(pairs),
                                        Err(err) => return self.fail(err.into()),
                                    }
                                }
                            }
                        }
                    }
                }
                DriveState::Finish => {
                    self.state = DriveState::Done;
                    if let Some(finish) = &mut self.phase.finish {
                        match finish() {
                            Ok(pairs) => self.out.extend(pairs),
                            Err(err) => return self.fail(err.into()),
                        }
                    }
                }
                DriveState::Done => return None,
            }
        }
    }
}

pub struct ReducePairs<'a, I> {
    phase: &'a mut ReducerPhase,
    input: I,
    /// First pair of the next run, read past the current run's boundary.
    pending: Option<Pair>,
    out: VecDeque<Pair>,
    state: DriveState,
}

impl<'a, I> ReducePairs<'a, I> {
    fn fail(&mut self, err: Error) -> Option<Result<Pair>> {
        self.state = DriveState::Done;
        Some(Err(err))
    }
}

impl<'a, I> Iterator for ReducePairs<'a, I>
where
    I: Iterator<Item = Result<Pair>>,
{
    type Item = Result<Pair>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.out.pop_front() {
                return Some(Ok(pair));
            }
            match self.state {
                DriveState::Init => {
                    self.state = DriveState::Body;
                    if let Some(init) = &mut self.phase.init {
                        match init() {
                            Ok(pairs) => self.out.extend(pairs),
                            Err(err) => return self.fail(err.into()),
                        }
                    }
                }
                DriveState::Body => {
                    let (key, first) = match self.pending.take() {
                        Some(pair) => pair,
                        None => match self.input.next() {
                            None => {
                                self.state = DriveState::Finish;
                                continue;
                            }
                            Some(Err(err)) => return self.fail(err),
                            Some(Ok(pair)) => pair,
                        },
                    };

                    let mut run = RunValues {
                        key: &key,
                        first: Some(first),
                        input: &mut self.input,
                        pending: &mut self.pending,
                        failed: None,
                    };
                    let body = match &mut self.phase.body {
                        Some(PhaseBody::InProcess(body)) => body,
                        // checked when this iterator was constructed
                        _ => {
                            return self.fail(Error::config("no body defined for this step"));
                        }
                    };
                    match body(key.clone(), &mut run) {
                        Err(err) => return self.fail(err.into()),
                        Ok(pairs) => {
                            // advance past values the body left unconsumed
                            for _ in &mut run {}
                            if let Some(err) = run.failed.take() {
                                return self.fail(err);
                            }
                            self.out.extend(pairs);
                        }
                    }
                }
                DriveState::Finish => {
                    self.state = DriveState::Done;
                    if let Some(finish) = &mut self.phase.finish {
                        match finish() {
                            Ok(pairs) => self.out.extend(pairs),
                            Err(err) => return self.fail(err.into()),
                        }
                    }
                }
                DriveState::Done => return None,
            }
        }
    }
}

/// Lazy single-pass view over one contiguous run of values sharing a key.
///
/// Stops at the first pair whose key differs, stashing it for the next
/// run, or at a source failure, stashing the error for the driver.
struct RunValues<'a, I> {
    key: &'a Value,
    first: Option<Value>,
    input: &'a mut I,
    pending: &'a mut Option<Pair>,
    failed: Option<Error>,
}

impl<'a, I> Iterator for RunValues<'a, I>
where
    I: Iterator<Item = Result<Pair>>,
{
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if let Some(value) = self.first.take() {
            return Some(value);
        }
        if self.failed.is_some() || self.pending.is_some() {
            return None;
        }
        match self.input.next() {
            None => None,
            Some(Err(err)) => {
                self.failed = Some(err);
                None
            }
            Some(Ok((key, value))) => {
                if key == *self.key {
                    Some(value)
                } else {
                    *self.pending = Some((key, value));
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ok_pairs(pairs: Vec<Pair>) -> impl Iterator<Item = Result<Pair>> {
        pairs.into_iter().map(Ok)
    }

    fn collect(results: impl Iterator<Item = Result<Pair>>) -> Result<Vec<Pair>> {
        results.collect()
    }

    #[test]
    fn mapper_with_only_init_and_final_emits_exactly_those() -> Result<()> {
        let mut phase = MapperPhase {
            init: Some(Box::new(|| Ok(vec![(json!("init"), json!(0))]))),
            finish: Some(Box::new(|| Ok(vec![(json!("final"), json!(1))]))),
            ..MapperPhase::default()
        };
        let input = ok_pairs(vec![(json!("a"), json!(1)), (json!("b"), json!(2))]);
        let out = collect(map_pairs(&mut phase, input, &[]))?;
        assert_eq!(
            out,
            vec![(json!("init"), json!(0)), (json!("final"), json!(1))]
        );
        Ok(())
    }

    #[test]
    fn mapper_body_runs_once_per_pair_in_order() -> Result<()> {
        let mut phase = MapperPhase {
            body: Some(PhaseBody::InProcess(Box::new(|key, value| {
                Ok(vec![(key, value), (json!("echo"), json!(null))])
            }))),
            ..MapperPhase::default()
        };
        let input = ok_pairs(vec![(json!("a"), json!(1)), (json!("b"), json!(2))]);
        let out = collect(map_pairs(&mut phase, input, &[]))?;
        assert_eq!(
            out,
            vec![
                (json!("a"), json!(1)),
                (json!("echo"), json!(null)),
                (json!("b"), json!(2)),
                (json!("echo"), json!(null)),
            ]
        );
        Ok(())
    }

    #[test]
    fn raw_mapper_replaces_pair_iteration() -> Result<()> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut phase = MapperPhase {
            raw: Some(Box::new(move |path, uri| {
                sink.borrow_mut().push((path.to_owned(), uri.to_owned()));
                Ok(vec![(json!("raw"), json!(1))])
            })),
            ..MapperPhase::default()
        };
        // input must not be pulled at all
        let input = std::iter::once_with(|| -> Result<Pair> {
            panic!("raw mapper should not read decoded pairs")
        });
        let positional = vec!["local/part-0".to_owned(), "scheme://bucket/part-0".to_owned()];
        let out = collect(map_pairs(&mut phase, input, &positional))?;
        assert_eq!(out, vec![(json!("raw"), json!(1))]);
        assert_eq!(
            seen.borrow().as_slice(),
            &[("local/part-0".to_owned(), "scheme://bucket/part-0".to_owned())]
        );
        Ok(())
    }

    #[test]
    fn raw_mapper_rejects_wrong_arity() {
        for count in [0usize, 1, 3] {
            let mut phase = MapperPhase {
                raw: Some(Box::new(|_, _| Ok(vec![]))),
                ..MapperPhase::default()
            };
            let positional: Vec<String> =
                (0..count).map(|n| format!("arg{n}")).collect();
            let out: Vec<_> =
                map_pairs(&mut phase, ok_pairs(vec![]), &positional).collect();
            assert_eq!(out.len(), 1, "arity {count}");
            assert!(matches!(
                out[0],
                Err(Error::ArgumentArity {
                    expected: 2,
                    actual
                }) if actual == count
            ));
        }
    }

    #[test]
    fn contiguous_runs_group_in_input_order() -> Result<()> {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        let mut phase = ReducerPhase {
            body: Some(PhaseBody::InProcess(Box::new(
                move |key, values: &mut dyn Iterator<Item = Value>| {
                    let run: Vec<Value> = values.collect();
                    sink.borrow_mut().push((key.clone(), run.clone()));
                    Ok(vec![(key, json!(run.len()))])
                },
            ))),
            ..ReducerPhase::default()
        };
        let input = ok_pairs(vec![
            (json!("a"), json!(1)),
            (json!("a"), json!(2)),
            (json!("b"), json!(3)),
            (json!("a"), json!(4)),
        ]);
        let out = collect(reduce_pairs(&mut phase, PhaseKind::Reducer, input)?)?;

        // non-contiguous repeats of a key form separate runs
        assert_eq!(
            calls.borrow().as_slice(),
            &[
                (json!("a"), vec![json!(1), json!(2)]),
                (json!("b"), vec![json!(3)]),
                (json!("a"), vec![json!(4)]),
            ]
        );
        assert_eq!(
            out,
            vec![
                (json!("a"), json!(2)),
                (json!("b"), json!(1)),
                (json!("a"), json!(1)),
            ]
        );
        Ok(())
    }

    #[test]
    fn unconsumed_run_values_are_drained() -> Result<()> {
        let mut phase = ReducerPhase {
            body: Some(PhaseBody::InProcess(Box::new(
                |key, values: &mut dyn Iterator<Item = Value>| {
                    // take only the first value and abandon the rest
                    let first = values.next().unwrap_or(Value::Null);
                    Ok(vec![(key, first)])
                },
            ))),
            ..ReducerPhase::default()
        };
        let input = ok_pairs(vec![
            (json!("a"), json!(1)),
            (json!("a"), json!(2)),
            (json!("a"), json!(3)),
            (json!("b"), json!(4)),
        ]);
        let out = collect(reduce_pairs(&mut phase, PhaseKind::Reducer, input)?)?;
        assert_eq!(out, vec![(json!("a"), json!(1)), (json!("b"), json!(4))]);
        Ok(())
    }

    #[test]
    fn reducer_without_body_is_a_configuration_error() {
        let mut phase = ReducerPhase {
            init: Some(Box::new(|| Ok(vec![]))),
            ..ReducerPhase::default()
        };
        let result = reduce_pairs(&mut phase, PhaseKind::Combiner, ok_pairs(vec![]));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn reducer_with_only_body_handles_empty_input() -> Result<()> {
        let mut phase = ReducerPhase {
            body: Some(PhaseBody::InProcess(Box::new(
                |_key, _values: &mut dyn Iterator<Item = Value>| {
                    Ok(vec![(json!("unexpected"), json!(0))])
                },
            ))),
            init: Some(Box::new(|| Ok(vec![(json!("init"), json!(0))]))),
            finish: Some(Box::new(|| Ok(vec![(json!("final"), json!(1))]))),
            ..ReducerPhase::default()
        };
        let out = collect(reduce_pairs(
            &mut phase,
            PhaseKind::Reducer,
            ok_pairs(vec![]),
        )?)?;
        assert_eq!(
            out,
            vec![(json!("init"), json!(0)), (json!("final"), json!(1))]
        );
        Ok(())
    }

    #[test]
    fn hook_failure_propagates_and_keeps_earlier_output() {
        let mut phase = ReducerPhase {
            body: Some(PhaseBody::InProcess(Box::new(
                |key, values: &mut dyn Iterator<Item = Value>| {
                    if key == json!("boom") {
                        anyhow::bail!("reducer exploded");
                    }
                    let count = values.count();
                    Ok(vec![(key, json!(count))])
                },
            ))),
            ..ReducerPhase::default()
        };
        let input = ok_pairs(vec![
            (json!("fine"), json!(1)),
            (json!("boom"), json!(2)),
            (json!("never"), json!(3)),
        ]);
        let mut stream = match reduce_pairs(&mut phase, PhaseKind::Reducer, input) {
            Ok(stream) => stream,
            Err(err) => panic!("unexpected: {err}"),
        };

        let first = stream.next();
        assert!(matches!(first, Some(Ok(ref pair)) if *pair == (json!("fine"), json!(1))));
        let second = stream.next();
        assert!(matches!(second, Some(Err(Error::Hook(_)))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn source_failure_mid_run_surfaces_after_the_run() {
        let mut phase = ReducerPhase {
            body: Some(PhaseBody::InProcess(Box::new(
                |key, values: &mut dyn Iterator<Item = Value>| {
                    let count = values.count();
                    Ok(vec![(key, json!(count))])
                },
            ))),
            ..ReducerPhase::default()
        };
        let input = vec![
            Ok((json!("a"), json!(1))),
            Err(Error::Protocol("bad record".into())),
        ];
        let mut stream =
            match reduce_pairs(&mut phase, PhaseKind::Reducer, input.into_iter()) {
                Ok(stream) => stream,
                Err(err) => panic!("unexpected: {err}"),
            };
        assert!(matches!(stream.next(), Some(Err(Error::Protocol(_)))));
        assert!(stream.next().is_none());
    }
}
