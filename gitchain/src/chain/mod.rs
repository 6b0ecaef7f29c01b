//! The command chain engine.
//!
//! A [`Chain`] carries the runner, the output of the most recent step and the
//! first failure seen. Each git operation maps one chain to the next; once a
//! chain is poisoned every later step is a no-op that hands back the same
//! state, so the failure and the output that produced it survive to the
//! terminal call.
//!
//! ```no_run
//! use gitchain::Chain;
//!
//! let repo = Chain::new("/tmp/work");
//! repo.add()
//!     .when_then(|c| c.has_staging_changes(), |c| c.commit("sync").push())
//!     .must_done();
//! ```
//!
//! Chains share their runner through `Rc`, so a chain is not `Send`. Build one
//! per thread; chains at different paths may run in parallel.

pub mod commands;
pub mod debug;
pub mod queries;

use std::cell::RefCell;
use std::fmt;
use std::panic::Location;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::GitError;
use crate::io::process::{CommandRunner, ProcessRunner};

pub use debug::{DebugRecord, DebugSink, TracingSink};

static DEBUG_MODE_DEFAULT: AtomicBool = AtomicBool::new(false);

/// Set the debug flag that new chains start with.
///
/// Read once by the constructors; existing chains are not affected.
pub fn set_debug_mode(enable: bool) {
    DEBUG_MODE_DEFAULT.store(enable, Ordering::Relaxed);
}

pub fn debug_mode_default() -> bool {
    DEBUG_MODE_DEFAULT.load(Ordering::Relaxed)
}

/// Value threaded through a fluent git expression.
pub struct Chain<R: ProcessRunner = CommandRunner> {
    runner: Rc<RefCell<R>>,
    sink: Rc<dyn DebugSink>,
    output: Rc<[u8]>,
    first_error: Option<GitError>,
    debug: bool,
}

impl<R: ProcessRunner> Clone for Chain<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Rc::clone(&self.runner),
            sink: Rc::clone(&self.sink),
            output: Rc::clone(&self.output),
            first_error: self.first_error.clone(),
            debug: self.debug,
        }
    }
}

impl<R: ProcessRunner> fmt::Debug for Chain<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("output", &String::from_utf8_lossy(&self.output))
            .field("first_error", &self.first_error)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl Chain<CommandRunner> {
    /// Chain rooted at `path` with a default [`CommandRunner`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_runner(path, &CommandRunner::new())
    }
}

impl<R: ProcessRunner> Chain<R> {
    /// Chain rooted at `path` using a copy of `template`.
    ///
    /// The copy drops the template's expected-exit allowlist, and later
    /// changes through [`Chain::update_runner`] never reach `template`.
    pub fn with_runner(path: impl AsRef<Path>, template: &R) -> Self {
        let debug = debug_mode_default();
        let mut runner = template.new_config();
        runner.set_path(path.as_ref());
        runner.set_debug_mode(debug);
        Self {
            runner: Rc::new(RefCell::new(runner)),
            sink: Rc::new(TracingSink),
            output: Rc::from(Vec::new()),
            first_error: None,
            debug,
        }
    }

    /// Route debug records to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: impl DebugSink + 'static) -> Self {
        self.sink = Rc::new(sink);
        self
    }

    pub fn with_debug(self) -> Self {
        self.with_debug_mode(true)
    }

    /// Toggle debug emission on this chain and on its runner.
    pub fn with_debug_mode(mut self, debug: bool) -> Self {
        self.debug = debug;
        self.runner.borrow_mut().set_debug_mode(debug);
        self
    }

    pub fn debug_mode(&self) -> bool {
        self.debug
    }

    /// Apply `update` to the shared runner; later steps see the change.
    pub fn update_runner(&self, update: impl FnOnce(&mut R)) -> Self {
        update(&mut *self.runner.borrow_mut());
        self.clone()
    }

    /// Snapshot of the runner as currently configured.
    pub fn runner(&self) -> R {
        self.runner.borrow().clone()
    }

    /// Substitute `branch(self)` when the chain is healthy and `predicate` holds.
    pub fn when(
        &self,
        predicate: impl FnOnce(&Self) -> bool,
        branch: impl FnOnce(&Self) -> Self,
    ) -> Self {
        if self.first_error.is_none() && predicate(self) {
            return branch(self);
        }
        self.clone()
    }

    /// Like [`Chain::when`], but a predicate error poisons the chain.
    ///
    /// The poisoned chain has empty output and `branch` is not called.
    #[track_caller]
    pub fn when_then(
        &self,
        predicate: impl FnOnce(&Self) -> Result<bool, GitError>,
        branch: impl FnOnce(&Self) -> Self,
    ) -> Self {
        if self.first_error.is_some() {
            return self.clone();
        }
        match predicate(self) {
            Err(err) => self.next(Vec::new(), Some(err), Location::caller()),
            Ok(true) => branch(self),
            Ok(false) => self.clone(),
        }
    }

    /// Output and failure of the chain so far.
    pub fn result(&self) -> Result<&[u8], &GitError> {
        match &self.first_error {
            Some(err) => Err(err),
            None => Ok(&self.output),
        }
    }

    pub fn into_result(self) -> Result<Vec<u8>, GitError> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self.output.to_vec()),
        }
    }

    /// Output of the most recent step (kept when that step failed).
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).to_string()
    }

    /// First failure, if the chain is poisoned.
    pub fn reason(&self) -> Option<&GitError> {
        self.first_error.as_ref()
    }

    pub fn is_poisoned(&self) -> bool {
        self.first_error.is_some()
    }

    /// Panic with the failure and its output if the chain is poisoned.
    #[track_caller]
    pub fn must_done(&self) -> Self {
        if let Some(err) = &self.first_error {
            panic!("{}", debug::abort_message(err, &self.output));
        }
        self.clone()
    }

    /// Output of a healthy chain that must have printed something.
    #[track_caller]
    pub fn nice(&self) -> Vec<u8> {
        self.must_done();
        if self.output.is_empty() {
            panic!("wrong: expected output, got none");
        }
        self.output.to_vec()
    }

    /// Assert a healthy chain whose last step printed nothing.
    #[track_caller]
    pub fn zero(&self) {
        self.must_done();
        if !self.output.is_empty() {
            panic!(
                "wrong: expected no output, got:\n{}",
                String::from_utf8_lossy(&self.output).trim_end()
            );
        }
    }

    /// Emit the current state through the sink, whatever the debug flag.
    #[track_caller]
    pub fn show_debug_message(&self) -> Self {
        self.emit(Location::caller());
        self.clone()
    }

    /// Fresh runner config with `expected` on its allowlist.
    ///
    /// Query helpers probe through this so an allowlist never leaks into the
    /// chain's own runner.
    fn probe(&self, expected: &[(i32, &str)]) -> R {
        let mut runner = self.runner.borrow().new_config();
        for (code, label) in expected {
            runner.expect_exit(*code, label);
        }
        runner
    }

    /// Run `program args…` unless the chain is already poisoned.
    #[track_caller]
    fn run(&self, program: &str, args: &[&str]) -> Self {
        self.step(|runner| runner.exec(program, args))
    }

    #[track_caller]
    fn step(&self, exec: impl FnOnce(&R) -> Result<Vec<u8>, GitError>) -> Self {
        if self.first_error.is_some() {
            return self.clone();
        }
        let result = exec(&*self.runner.borrow());
        let caller = Location::caller();
        match result {
            Ok(output) => self.next(output, None, caller),
            Err(err) => {
                let output = err.output().to_vec();
                self.next(output, Some(err), caller)
            }
        }
    }

    fn next(
        &self,
        output: Vec<u8>,
        first_error: Option<GitError>,
        caller: &'static Location<'static>,
    ) -> Self {
        let chain = Self {
            runner: Rc::clone(&self.runner),
            sink: Rc::clone(&self.sink),
            output: Rc::from(output),
            first_error,
            debug: self.debug,
        };
        if chain.debug {
            chain.emit(caller);
        }
        chain
    }

    fn emit(&self, caller: &'static Location<'static>) {
        let record = DebugRecord::new(&self.output, self.first_error.as_ref(), caller);
        self.sink.emit(&record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingSink, ScriptedRunner, ScriptedStep};

    fn chain_with(steps: Vec<ScriptedStep>) -> (Chain<ScriptedRunner>, ScriptedRunner) {
        let runner = ScriptedRunner::new(steps);
        let chain = Chain::with_runner("/repo", &runner);
        (chain, runner)
    }

    #[test]
    fn fresh_chain_is_healthy_and_empty() {
        let (chain, runner) = chain_with(vec![]);
        assert!(chain.output().is_empty());
        assert!(chain.reason().is_none());
        assert_eq!(chain.result().expect("healthy"), b"");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn successful_step_replaces_output() {
        let (chain, runner) = chain_with(vec![ScriptedStep::ok("first"), ScriptedStep::ok("second")]);
        let after = chain.status().add();
        assert_eq!(after.output(), b"second");
        assert!(after.reason().is_none());
        assert_eq!(runner.calls(), vec!["git status", "git add ."]);
    }

    #[test]
    fn poisoned_chain_skips_runner_and_keeps_state() {
        let (chain, runner) = chain_with(vec![
            ScriptedStep::ok(""),
            ScriptedStep::fail(1, "nothing to commit"),
        ]);
        let failed = chain.init().commit("empty");
        let after = failed.push().tag("v1").status();

        assert_eq!(runner.calls(), vec!["git init", "git commit -m empty"]);
        assert_eq!(after.output(), b"nothing to commit");
        assert_eq!(after.reason().and_then(GitError::exit_code), Some(1));
        assert_eq!(
            after.reason().map(ToString::to_string),
            failed.reason().map(ToString::to_string)
        );
    }

    #[test]
    fn first_error_wins() {
        let (chain, _runner) = chain_with(vec![
            ScriptedStep::fail(128, "first failure"),
            ScriptedStep::fail(1, "second failure"),
        ]);
        let after = chain.fetch("origin").pull().push();
        let err = after.reason().expect("poisoned");
        assert_eq!(err.exit_code(), Some(128));
        assert!(err.to_string().contains("first failure"));
    }

    #[test]
    fn when_runs_branch_only_if_predicate_holds() {
        let (chain, runner) = chain_with(vec![ScriptedStep::ok("pushed")]);
        let skipped = chain.when(|_| false, |c| c.pull());
        assert!(runner.calls().is_empty());
        assert!(skipped.output().is_empty());

        let taken = chain.when(|_| true, |c| c.push());
        assert_eq!(taken.output(), b"pushed");
        assert_eq!(runner.calls(), vec!["git push"]);
    }

    #[test]
    fn when_on_poisoned_chain_does_not_call_predicate() {
        let (chain, _runner) = chain_with(vec![ScriptedStep::fail(1, "bad")]);
        let poisoned = chain.status();
        let after = poisoned.when(|_| panic!("predicate called"), |c| c.push());
        assert_eq!(after.output(), b"bad");
        assert!(after.is_poisoned());
    }

    #[test]
    fn when_then_predicate_error_poisons_with_empty_output() {
        let (chain, runner) = chain_with(vec![ScriptedStep::ok("status output")]);
        let after = chain
            .status()
            .when_then(|_| Err(GitError::predicate("predicate broke")), |_| panic!("branch called"));
        assert!(after.output().is_empty());
        assert!(matches!(after.reason(), Some(GitError::Predicate(msg)) if msg == "predicate broke"));
        assert_eq!(runner.calls(), vec!["git status"]);
    }

    #[test]
    fn when_then_true_and_false() {
        let (chain, runner) = chain_with(vec![ScriptedStep::ok("committed")]);
        let unchanged = chain.when_then(|_| Ok(false), |c| c.commit("x"));
        assert!(unchanged.output().is_empty());
        let committed = chain.when_then(|_| Ok(true), |c| c.commit("x"));
        assert_eq!(committed.output(), b"committed");
        assert_eq!(runner.calls(), vec!["git commit -m x"]);
    }

    #[test]
    fn show_debug_message_emits_each_time_without_changing_state() {
        let (chain, _runner) = chain_with(vec![ScriptedStep::ok("clean")]);
        let sink = RecordingSink::default();
        let chain = chain.with_sink(sink.clone()).status();
        let before = chain.result().map(<[u8]>::to_vec).map_err(ToString::to_string);
        let after = chain
            .show_debug_message()
            .show_debug_message()
            .show_debug_message();
        assert_eq!(sink.records().len(), 3);
        assert_eq!(
            after.result().map(<[u8]>::to_vec).map_err(ToString::to_string),
            before
        );
    }

    #[test]
    fn debug_mode_emits_one_record_per_step_with_user_location() {
        let (chain, _runner) = chain_with(vec![
            ScriptedStep::ok("ok"),
            ScriptedStep::fail(1, "bad"),
        ]);
        let sink = RecordingSink::default();
        let chain = chain.with_sink(sink.clone()).with_debug();
        let _ = chain.status().merge("feature").push();

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "done");
        assert_eq!(records[1].message, "wrong");
        assert_eq!(records[1].output, "bad");
        assert!(records.iter().all(|r| r.file.ends_with("chain/mod.rs")));
    }

    #[test]
    fn non_debug_chain_emits_nothing() {
        let (chain, _runner) = chain_with(vec![ScriptedStep::ok("ok")]);
        let sink = RecordingSink::default();
        let _ = chain.with_sink(sink.clone()).status();
        assert!(sink.records().is_empty());
    }

    #[test]
    fn with_debug_mode_mirrors_runner() {
        let (chain, _runner) = chain_with(vec![]);
        let chain = chain.with_debug_mode(true);
        assert!(chain.debug_mode());
        assert!(chain.runner().debug_mode());
    }

    #[test]
    fn update_runner_affects_later_steps_only() {
        let (chain, runner) = chain_with(vec![ScriptedStep::ok("a"), ScriptedStep::ok("b")]);
        let first = chain.status();
        let updated = first.update_runner(|r| r.expect_exit(128, "MAY-FAIL"));
        assert_eq!(updated.output(), b"a");
        assert_eq!(chain.runner().expected(), vec![128]);
        let _ = updated.pull();
        assert_eq!(runner.calls(), vec!["git status", "git pull"]);
    }

    #[test]
    fn with_runner_copies_template() {
        let template = ScriptedRunner::new(vec![]);
        let mut with_allowlist = template.clone();
        with_allowlist.expect_exit(1, "NO");
        let chain = Chain::with_runner("/elsewhere", &with_allowlist);
        assert!(chain.runner().expected().is_empty());
        assert_eq!(chain.runner().path(), Path::new("/elsewhere"));
        let _ = chain.update_runner(|r| r.expect_exit(2, "X"));
        assert_eq!(with_allowlist.expected(), vec![1]);
    }

    #[test]
    fn into_result_returns_owned_parts() {
        let (chain, _runner) = chain_with(vec![ScriptedStep::ok("out"), ScriptedStep::fail(2, "err")]);
        assert_eq!(chain.status().into_result().expect("ok"), b"out");
        let err = chain.pull().into_result().expect_err("poisoned");
        assert_eq!(err.exit_code(), Some(2));
    }

    #[test]
    #[should_panic(expected = "wrong")]
    fn must_done_panics_on_poisoned_chain() {
        let (chain, _runner) = chain_with(vec![ScriptedStep::fail(1, "nothing to commit")]);
        chain.commit("x").must_done();
    }

    #[test]
    fn must_done_passes_healthy_chain_through() {
        let (chain, _runner) = chain_with(vec![ScriptedStep::ok("fine")]);
        assert_eq!(chain.status().must_done().output(), b"fine");
    }

    #[test]
    fn nice_returns_non_empty_output() {
        let (chain, _runner) = chain_with(vec![ScriptedStep::ok("v1.0.0\n")]);
        assert_eq!(chain.tag_list().nice(), b"v1.0.0\n");
    }

    #[test]
    #[should_panic(expected = "expected output")]
    fn nice_panics_on_empty_output() {
        let (chain, _runner) = chain_with(vec![ScriptedStep::ok("")]);
        chain.tag_list().nice();
    }

    #[test]
    #[should_panic(expected = "expected no output")]
    fn zero_panics_on_output() {
        let (chain, _runner) = chain_with(vec![ScriptedStep::ok("noise")]);
        chain.reset().zero();
    }

    #[test]
    fn zero_accepts_silent_step() {
        let (chain, _runner) = chain_with(vec![ScriptedStep::ok("")]);
        chain.tag("v1").zero();
    }
}
