//! Chain-returning git wrappers.
//!
//! Each wrapper sits exactly one frame above [`Chain::run`] and is
//! `#[track_caller]`, so debug records point at the caller's line.

use std::panic::Location;

use crate::chain::Chain;
use crate::error::GitError;
use crate::io::process::ProcessRunner;

const GIT: &str = "git";

impl<R: ProcessRunner> Chain<R> {
    /// `git status`
    #[track_caller]
    pub fn status(&self) -> Self {
        self.run(GIT, &["status"])
    }

    /// `git add .`
    #[track_caller]
    pub fn add(&self) -> Self {
        self.run(GIT, &["add", "."])
    }

    /// `git commit -m <message>`; fails when nothing is staged.
    #[track_caller]
    pub fn commit(&self, message: &str) -> Self {
        self.run(GIT, &["commit", "-m", message])
    }

    /// `git pull`
    #[track_caller]
    pub fn pull(&self) -> Self {
        self.run(GIT, &["pull"])
    }

    /// `git pull <remote> <branch>`
    #[track_caller]
    pub fn pull_from(&self, remote: &str, branch: &str) -> Self {
        self.run(GIT, &["pull", remote, branch])
    }

    /// `git push`
    #[track_caller]
    pub fn push(&self) -> Self {
        self.run(GIT, &["push"])
    }

    /// `git push <remote> <branch>`
    #[track_caller]
    pub fn push_to(&self, remote: &str, branch: &str) -> Self {
        self.run(GIT, &["push", remote, branch])
    }

    /// `git push --set-upstream origin <branch>`
    #[track_caller]
    pub fn push_set_upstream_origin_branch(&self, branch: &str) -> Self {
        self.run(GIT, &["push", "--set-upstream", "origin", branch])
    }

    /// `git reset`: unstage, keep the working tree.
    #[track_caller]
    pub fn reset(&self) -> Self {
        self.run(GIT, &["reset"])
    }

    /// `git reset --hard`: discards uncommitted work.
    #[track_caller]
    pub fn reset_hard(&self) -> Self {
        self.run(GIT, &["reset", "--hard"])
    }

    /// `git checkout <name>`
    #[track_caller]
    pub fn checkout(&self, name: &str) -> Self {
        self.run(GIT, &["checkout", name])
    }

    /// `git checkout -b <branch>`
    #[track_caller]
    pub fn checkout_new_branch(&self, branch: &str) -> Self {
        self.run(GIT, &["checkout", "-b", branch])
    }

    /// `git init`
    #[track_caller]
    pub fn init(&self) -> Self {
        self.run(GIT, &["init"])
    }

    /// `git merge <branch>`
    #[track_caller]
    pub fn merge(&self, branch: &str) -> Self {
        self.run(GIT, &["merge", branch])
    }

    /// `git merge --abort`
    #[track_caller]
    pub fn merge_abort(&self) -> Self {
        self.run(GIT, &["merge", "--abort"])
    }

    /// `git tag --list`
    #[track_caller]
    pub fn tag_list(&self) -> Self {
        self.run(GIT, &["tag", "--list"])
    }

    /// `git tag <name>`
    #[track_caller]
    pub fn tag(&self, name: &str) -> Self {
        self.run(GIT, &["tag", name])
    }

    /// `git push --tags`
    #[track_caller]
    pub fn push_tags(&self) -> Self {
        self.run(GIT, &["push", "--tags"])
    }

    /// `git push origin <tag>`
    #[track_caller]
    pub fn push_tag(&self, tag: &str) -> Self {
        self.run(GIT, &["push", "origin", tag])
    }

    /// `git remote -v`
    #[track_caller]
    pub fn remote(&self) -> Self {
        self.run(GIT, &["remote", "-v"])
    }

    /// `git remote add <name> <url>`
    #[track_caller]
    pub fn remote_add(&self, name: &str, url: &str) -> Self {
        self.run(GIT, &["remote", "add", name, url])
    }

    /// `git remote remove <name>`
    #[track_caller]
    pub fn remote_remove(&self, name: &str) -> Self {
        self.run(GIT, &["remote", "remove", name])
    }

    /// `git remote set-url <name> <url>`
    #[track_caller]
    pub fn remote_set(&self, name: &str, url: &str) -> Self {
        self.run(GIT, &["remote", "set-url", name, url])
    }

    /// `git fetch <remote>`
    #[track_caller]
    pub fn fetch(&self, remote: &str) -> Self {
        self.run(GIT, &["fetch", remote])
    }

    /// `git fetch --all`
    #[track_caller]
    pub fn fetch_all(&self) -> Self {
        self.run(GIT, &["fetch", "--all"])
    }

    /// `git config <key> <value>` in the repository's local config.
    #[track_caller]
    pub fn config_set(&self, key: &str, value: &str) -> Self {
        self.run(GIT, &["config", key, value])
    }

    /// Poison the chain with [`GitError::NoStagedChanges`] when the index is clean.
    ///
    /// Runs `git diff --cached --quiet` on a fresh runner config that treats
    /// exit 1 ("differences") as an answer rather than a failure.
    #[track_caller]
    pub fn check_staged_changes(&self) -> Self {
        if self.is_poisoned() {
            return self.clone();
        }
        let caller = Location::caller();
        let probe = self.probe(&[(1, "HAS-STAGED-CHANGES")]);
        match probe.exec_take(GIT, &["diff", "--cached", "--quiet"]) {
            Ok(captured) if captured.exit_code == 1 => self.next(captured.output(), None, caller),
            Ok(captured) => self.next(captured.output(), Some(GitError::NoStagedChanges), caller),
            Err(err) => {
                let output = err.output().to_vec();
                self.next(output, Some(err), caller)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::Chain;
    use crate::error::GitError;
    use crate::test_support::{ScriptedRunner, ScriptedStep};

    #[test]
    fn wrappers_map_to_argv() {
        let runner = ScriptedRunner::always_ok();
        let chain = Chain::with_runner("/repo", &runner);
        let _ = chain
            .status()
            .add()
            .commit("first commit")
            .pull()
            .pull_from("origin", "main")
            .push()
            .push_to("origin", "main")
            .push_set_upstream_origin_branch("feature")
            .reset()
            .reset_hard()
            .checkout("main")
            .checkout_new_branch("feature")
            .init()
            .merge("feature")
            .merge_abort()
            .tag_list()
            .tag("v1.0.0")
            .push_tags()
            .push_tag("v1.0.0")
            .remote()
            .remote_add("origin", "https://example.com/r.git")
            .remote_remove("origin")
            .remote_set("origin", "git@example.com:r.git")
            .fetch("origin")
            .fetch_all()
            .config_set("user.name", "Tester");

        assert_eq!(
            runner.calls(),
            vec![
                "git status",
                "git add .",
                "git commit -m first commit",
                "git pull",
                "git pull origin main",
                "git push",
                "git push origin main",
                "git push --set-upstream origin feature",
                "git reset",
                "git reset --hard",
                "git checkout main",
                "git checkout -b feature",
                "git init",
                "git merge feature",
                "git merge --abort",
                "git tag --list",
                "git tag v1.0.0",
                "git push --tags",
                "git push origin v1.0.0",
                "git remote -v",
                "git remote add origin https://example.com/r.git",
                "git remote remove origin",
                "git remote set-url origin git@example.com:r.git",
                "git fetch origin",
                "git fetch --all",
                "git config user.name Tester",
            ]
        );
    }

    #[test]
    fn check_staged_changes_passes_when_index_differs() {
        let runner = ScriptedRunner::new(vec![ScriptedStep::fail(1, "")]);
        let chain = Chain::with_runner("/repo", &runner).check_staged_changes();
        assert!(chain.reason().is_none());
        assert_eq!(runner.calls(), vec!["git diff --cached --quiet"]);
    }

    #[test]
    fn check_staged_changes_poisons_clean_index() {
        let runner = ScriptedRunner::new(vec![ScriptedStep::ok("")]);
        let chain = Chain::with_runner("/repo", &runner).check_staged_changes();
        assert!(matches!(chain.reason(), Some(GitError::NoStagedChanges)));
    }

    #[test]
    fn check_staged_changes_allowlist_does_not_leak() {
        let runner = ScriptedRunner::new(vec![ScriptedStep::fail(1, ""), ScriptedStep::fail(1, "x")]);
        let chain = Chain::with_runner("/repo", &runner);
        let after = chain.check_staged_changes().commit("m");
        assert_eq!(after.reason().and_then(GitError::exit_code), Some(1));
        assert!(chain.runner().expected().is_empty());
    }

    #[test]
    fn check_staged_changes_reports_broken_git() {
        let runner = ScriptedRunner::new(vec![ScriptedStep::fail(128, "fatal: bad revision")]);
        let chain = Chain::with_runner("/repo", &runner).check_staged_changes();
        assert_eq!(chain.reason().and_then(GitError::exit_code), Some(128));
        assert_eq!(chain.output(), b"fatal: bad revision");
    }
}
