use std::cell::RefCell;
use std::rc::Rc;

use crate::exec::ExecutorRef;
use crate::promise::Promise;
use crate::result::Outcome;

/// Resolves once every input resolves, with the values in input order;
/// rejects with the first error to arrive. An empty input resolves
/// immediately with an empty vector.
///
/// The inputs are not kept alive: the caller must hold every input promise
/// until it settles, or the aggregate will simply never see it.
pub fn all<T, E>(inputs: &[Promise<T, E>], exec: Option<ExecutorRef>) -> Promise<Vec<T>, E>
where
    T: 'static,
    E: 'static,
{
    let out: Promise<Vec<T>, E> = Promise::new();
    if inputs.is_empty() {
        out.resolver().resolve(Vec::new());
        return out;
    }

    struct Ctx<T> {
        remaining: usize,
        results: Vec<Option<T>>,
    }

    let ctx = Rc::new(RefCell::new(Ctx {
        remaining: inputs.len(),
        results: (0..inputs.len()).map(|_| None).collect(),
    }));

    for (idx, input) in inputs.iter().enumerate() {
        let ctx = ctx.clone();
        let resolver = out.resolver();
        input.then_tap_on(exec.clone(), move |r: Outcome<T, E>| match r {
            Outcome::Error(e) => {
                resolver.reject(e);
            }
            Outcome::Value(v) => {
                let mut ctx = ctx.borrow_mut();
                ctx.results[idx] = Some(v);
                ctx.remaining -= 1;
                if ctx.remaining == 0 {
                    let results: Vec<T> = ctx.results.drain(..).flatten().collect();
                    drop(ctx);
                    resolver.resolve(results);
                }
            }
        });
    }
    out
}

/// Success-biased: resolves with the first input to resolve; rejects only
/// when every input rejected, with the errors in input order. An empty input
/// rejects immediately with an empty error list.
///
/// The inputs are not kept alive: the caller must hold every input promise
/// until it settles.
pub fn any<T, E>(inputs: &[Promise<T, E>], exec: Option<ExecutorRef>) -> Promise<T, Vec<E>>
where
    T: 'static,
    E: 'static,
{
    let out: Promise<T, Vec<E>> = Promise::new();
    if inputs.is_empty() {
        out.resolver().reject(Vec::new());
        return out;
    }

    struct Ctx<E> {
        remaining: usize,
        errors: Vec<Option<E>>,
    }

    let ctx = Rc::new(RefCell::new(Ctx {
        remaining: inputs.len(),
        errors: (0..inputs.len()).map(|_| None).collect(),
    }));

    for (idx, input) in inputs.iter().enumerate() {
        let ctx = ctx.clone();
        let resolver = out.resolver();
        input.then_tap_on(exec.clone(), move |r: Outcome<T, E>| match r {
            Outcome::Value(v) => {
                resolver.resolve(v);
            }
            Outcome::Error(e) => {
                let mut ctx = ctx.borrow_mut();
                ctx.errors[idx] = Some(e);
                ctx.remaining -= 1;
                if ctx.remaining == 0 {
                    let errors: Vec<E> = ctx.errors.drain(..).flatten().collect();
                    drop(ctx);
                    resolver.reject(errors);
                }
            }
        });
    }
    out
}

/// Settles like the first input to settle, value or error; everything after
/// that is ignored.
///
/// The inputs are not kept alive: the caller must hold every input promise
/// until it settles.
///
/// # Panics
///
/// Panics on an empty input set: there is nothing that could ever settle
/// the result.
pub fn race<T, E>(inputs: &[Promise<T, E>], exec: Option<ExecutorRef>) -> Promise<T, E>
where
    T: 'static,
    E: 'static,
{
    assert!(!inputs.is_empty(), "race over an empty input set");
    let out: Promise<T, E> = Promise::new();
    for input in inputs {
        let resolver = out.resolver();
        input.then_tap_on(exec.clone(), move |r: Outcome<T, E>| match r {
            Outcome::Value(v) => {
                resolver.resolve(v);
            }
            Outcome::Error(e) => {
                resolver.reject(e);
            }
        });
    }
    out
}
