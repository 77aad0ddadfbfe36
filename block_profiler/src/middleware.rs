// Copyright 2026 the Block Profiler Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interceptor chains around host functions.
//!
//! A [`MiddlewareChain`] holds an ordered, append-only list of interceptors. Installing the chain
//! around a host function yields an [`Installed`] wrapper with the same argument and result
//! types. Each call walks the interceptors in registration order; an interceptor either forwards
//! through [`Next::run`] (possibly with rewritten arguments) or returns its own result, which ends
//! the walk. When the walk runs past the last interceptor, the original function is invoked with
//! the host as receiver.
//!
//! The interceptor list is read at every step of a call, so interceptors pushed after
//! installation, or while a call is in flight, take part in every step that has not been
//! reached yet. Interceptors cannot be removed.
//!
//! Arguments are a single value; host functions taking several arguments use a tuple. For
//! asynchronous hosts, `R` is a future (see [`LoadFuture`](crate::loading::LoadFuture)).

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

type Interceptor<A, R> = Rc<dyn Fn(A, Next<'_, A, R>) -> R>;
type Interceptors<A, R> = Rc<RefCell<Vec<Interceptor<A, R>>>>;

/// Ordered, append-only list of interceptors.
///
/// Cloning yields another handle to the same list.
pub struct MiddlewareChain<A, R> {
    interceptors: Interceptors<A, R>,
}

impl<A: 'static, R: 'static> MiddlewareChain<A, R> {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interceptors: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Appends an interceptor.
    ///
    /// Safe to call at any time, including from inside an interceptor.
    pub fn push(&self, interceptor: impl Fn(A, Next<'_, A, R>) -> R + 'static) {
        self.interceptors.borrow_mut().push(Rc::new(interceptor));
    }

    /// Registers an interceptor that runs before the wrapped loader.
    ///
    /// Same as [`push`](Self::push); this is the name loader collaborators expose.
    pub fn on_before_load(&self, interceptor: impl Fn(A, Next<'_, A, R>) -> R + 'static) {
        self.push(interceptor);
    }

    /// Returns the number of registered interceptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.borrow().len()
    }

    /// Returns `true` if no interceptor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.borrow().is_empty()
    }

    /// Wraps `original`, called with `host` as receiver, behind this chain.
    #[must_use]
    pub fn install<H: 'static>(
        &self,
        host: H,
        original: impl Fn(&H, A) -> R + 'static,
    ) -> Installed<A, R> {
        Installed {
            interceptors: Rc::clone(&self.interceptors),
            original: Rc::new(move |args| original(&host, args)),
        }
    }
}

impl<A: 'static, R: 'static> Default for MiddlewareChain<A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> Clone for MiddlewareChain<A, R> {
    fn clone(&self) -> Self {
        Self {
            interceptors: Rc::clone(&self.interceptors),
        }
    }
}

impl<A, R> fmt::Debug for MiddlewareChain<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.interceptors.borrow().len())
            .finish()
    }
}

/// A host function wrapped by a [`MiddlewareChain`].
pub struct Installed<A, R> {
    interceptors: Interceptors<A, R>,
    original: Rc<dyn Fn(A) -> R>,
}

impl<A, R> Installed<A, R> {
    /// Calls the wrapped function through every registered interceptor.
    pub fn call(&self, args: A) -> R {
        Next {
            installed: self,
            index: 0,
        }
        .run(args)
    }
}

impl<A, R> Clone for Installed<A, R> {
    fn clone(&self) -> Self {
        Self {
            interceptors: Rc::clone(&self.interceptors),
            original: Rc::clone(&self.original),
        }
    }
}

impl<A, R> fmt::Debug for Installed<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installed")
            .field("interceptors", &self.interceptors.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Continuation handed to each interceptor.
///
/// Consumed by [`run`](Self::run), so an interceptor can continue the chain at most once.
pub struct Next<'a, A, R> {
    installed: &'a Installed<A, R>,
    index: usize,
}

impl<A, R> Next<'_, A, R> {
    /// Continues with the next interceptor, or the original function after the last one.
    pub fn run(self, args: A) -> R {
        // Release the borrow before dispatching so interceptors may push.
        let interceptor = self.installed.interceptors.borrow().get(self.index).cloned();
        match interceptor {
            Some(interceptor) => interceptor(
                args,
                Next {
                    installed: self.installed,
                    index: self.index + 1,
                },
            ),
            None => (self.installed.original)(args),
        }
    }
}

impl<A, R> fmt::Debug for Next<'_, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("index", &self.index).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Greeter {
        greeting: &'static str,
    }

    impl Greeter {
        fn greet(&self, (name, times): (String, usize)) -> String {
            format!("{} {}", self.greeting, name).repeat(times)
        }
    }

    fn greeter() -> Greeter {
        Greeter { greeting: "hi" }
    }

    #[test]
    fn empty_chain_calls_original_with_host() {
        let chain = MiddlewareChain::new();
        let wrapped = chain.install(greeter(), Greeter::greet);
        assert_eq!(
            wrapped.call(("ada".into(), 2)),
            greeter().greet(("ada".into(), 2))
        );
    }

    #[test]
    fn forwarding_interceptors_are_transparent() {
        let chain = MiddlewareChain::new();
        let wrapped = chain.install(greeter(), Greeter::greet);
        let seen = Rc::new(Cell::new(0));
        for _ in 0..3 {
            let seen = Rc::clone(&seen);
            chain.push(move |args, next| {
                seen.set(seen.get() + 1);
                next.run(args)
            });
        }
        assert_eq!(wrapped.call(("bob".into(), 1)), "hi bob");
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn interceptor_can_rewrite_arguments() {
        let chain: MiddlewareChain<(String, usize), String> = MiddlewareChain::new();
        chain.push(|(name, times), next| next.run((name.to_uppercase(), times)));
        let wrapped = chain.install(greeter(), Greeter::greet);
        assert_eq!(wrapped.call(("eve".into(), 1)), "hi EVE");
    }

    #[test]
    fn interceptors_run_in_registration_order() {
        let chain: MiddlewareChain<Vec<u8>, Vec<u8>> = MiddlewareChain::new();
        for tag in [1, 2, 3] {
            chain.push(move |mut args, next| {
                args.push(tag);
                next.run(args)
            });
        }
        let wrapped = chain.install((), |_, args| args);
        assert_eq!(wrapped.call(vec![0]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn short_circuit_skips_the_rest() {
        let calls = Rc::new(Cell::new(0));
        let chain: MiddlewareChain<u32, u32> = MiddlewareChain::new();
        chain.push(|key, next| {
            if key == 7 { 700 } else { next.run(key) }
        });
        let counted = Rc::clone(&calls);
        chain.push(move |key, next| {
            counted.set(counted.get() + 1);
            next.run(key)
        });
        let wrapped = chain.install((), |_, key| key * 10);

        assert_eq!(wrapped.call(7), 700);
        assert_eq!(calls.get(), 0);
        assert_eq!(wrapped.call(3), 30);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn push_after_install_affects_later_calls() {
        let chain: MiddlewareChain<i32, i32> = MiddlewareChain::new();
        let wrapped = chain.install((), |_, x| x);
        assert_eq!(wrapped.call(1), 1);

        chain.clone().push(|x, next| next.run(x + 100));
        assert_eq!(chain.len(), 1);
        assert_eq!(wrapped.call(1), 101);
    }

    #[test]
    fn push_from_inside_a_call_does_not_deadlock() {
        let chain: MiddlewareChain<i32, i32> = MiddlewareChain::new();
        let handle = chain.clone();
        chain.push(move |x, next| {
            if handle.len() == 1 {
                handle.push(|x, next| next.run(x * 2));
            }
            next.run(x)
        });
        let wrapped = chain.install((), |_, x| x);

        // The new interceptor sits past the current index, so this call already sees it.
        assert_eq!(wrapped.call(5), 10);
        assert_eq!(wrapped.call(5), 10);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn errors_propagate_to_the_caller() {
        let chain: MiddlewareChain<i32, Result<i32, String>> = MiddlewareChain::new();
        chain.push(|x, next| {
            if x < 0 {
                return Err(format!("negative: {x}"));
            }
            next.run(x)
        });
        let wrapped = chain.install((), |_, x| Ok(x));
        assert_eq!(wrapped.call(-1), Err("negative: -1".into()));
        assert_eq!(wrapped.call(2), Ok(2));
    }
}
