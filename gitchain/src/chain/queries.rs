//! Query helpers: typed answers read from git, outside chain propagation.
//!
//! Helpers never look at the chain's output or error. Each one runs on a fresh
//! runner config, registering the exit codes that mean "no" rather than
//! "broken" for that single call.

use tracing::{debug, instrument};

use crate::chain::Chain;
use crate::core::lines::{first_line, non_empty_lines, single_value};
use crate::core::pattern::{tag_list_script, validate_pattern};
use crate::core::status::{StatusEntry, ignored_paths, parse_porcelain};
use crate::error::{GitError, Result};
use crate::io::process::{ProcessRunner, command_label};

const GIT: &str = "git";

/// git's exit code for "no such thing" in describe/rev-parse.
const EXIT_FATAL: i32 = 128;

impl<R: ProcessRunner> Chain<R> {
    /// True when the index differs from HEAD.
    #[instrument(skip_all)]
    pub fn has_staging_changes(&self) -> Result<bool> {
        self.differs(&["diff-index", "--cached", "--quiet", "HEAD"])
    }

    /// True when tracked files differ from the index.
    #[instrument(skip_all)]
    pub fn has_unstaged_changes(&self) -> Result<bool> {
        self.differs(&["diff", "--quiet"])
    }

    /// True when `git status --porcelain` reports anything, untracked files included.
    pub fn has_changes(&self) -> Result<bool> {
        Ok(!self.porcelain_status()?.trim().is_empty())
    }

    /// Raw `git status --porcelain` output.
    pub fn porcelain_status(&self) -> Result<String> {
        self.stdout(&["status", "--porcelain"])
    }

    /// Parsed porcelain entries, listing every untracked file.
    pub fn status_entries(&self) -> Result<Vec<StatusEntry>> {
        let out = self.stdout(&["status", "--porcelain=v1", "-uall"])?;
        parse_porcelain(&out)
    }

    /// Nearest tag reachable from HEAD; `None` when the repository has no tags.
    #[instrument(skip_all)]
    pub fn latest_tag(&self) -> Result<Option<String>> {
        let captured = self
            .probe(&[(EXIT_FATAL, "NO-TAGS")])
            .exec_take(GIT, &["describe", "--tags", "--abbrev=0"])?;
        if captured.exit_code == EXIT_FATAL {
            debug!("no tags");
            return Ok(None);
        }
        Ok(first_line(&captured.stdout_text()))
    }

    /// Highest version tag starting with `prefix`.
    pub fn latest_tag_has_prefix(&self, prefix: &str) -> Result<Option<String>> {
        validate_pattern(prefix)?;
        self.latest_tag_matching(&format!("{prefix}*"))
    }

    /// Highest version tag matching the glob `pattern`.
    ///
    /// Tags are ordered by version refname (`--sort=-v:refname`), so `v1.10.0`
    /// outranks `v1.9.0` regardless of creation time.
    #[instrument(skip_all, fields(pattern = %pattern))]
    pub fn latest_tag_matching(&self, pattern: &str) -> Result<Option<String>> {
        let script = tag_list_script(pattern)?;
        let captured = self.probe(&[]).exec_shell(&script)?;
        let tag = first_line(&captured.stdout_text());
        debug!(tag = ?tag, "latest matching tag");
        Ok(tag)
    }

    /// `refname creatordate` lines, oldest first.
    pub fn sorted_tags(&self) -> Result<Vec<String>> {
        let out = self.stdout(&[
            "for-each-ref",
            "--sort=creatordate",
            "--format=%(refname) %(creatordate)",
            "refs/tags",
        ])?;
        Ok(non_empty_lines(&out))
    }

    pub fn tag_exists(&self, tag: &str) -> Result<bool> {
        self.ref_exists(&format!("refs/tags/{tag}"))
    }

    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        self.ref_exists(&format!("refs/heads/{branch}"))
    }

    /// `name` is `<remote>/<branch>`, e.g. `origin/main`.
    pub fn remote_branch_exists(&self, name: &str) -> Result<bool> {
        self.ref_exists(&format!("refs/remotes/{name}"))
    }

    /// Full hash of the commit `reference` points at (tags are peeled).
    pub fn commit_hash(&self, reference: &str) -> Result<String> {
        let spec = format!("{reference}^{{commit}}");
        self.value(&["rev-parse", "--verify", &spec])
    }

    pub fn current_commit_hash(&self) -> Result<String> {
        self.value(&["rev-parse", "HEAD"])
    }

    /// Full message (subject and body) of `reference`.
    pub fn commit_message(&self, reference: &str) -> Result<String> {
        self.value(&["log", "-1", "--pretty=format:%B", reference])
    }

    /// Absolute path of the working tree root.
    pub fn top_path(&self) -> Result<String> {
        self.value(&["rev-parse", "--show-toplevel"])
    }

    pub fn git_dir_abs_path(&self) -> Result<String> {
        self.value(&["rev-parse", "--absolute-git-dir"])
    }

    /// `../` steps from the working path up to the root; empty at the root.
    pub fn sub_path_to_root(&self) -> Result<String> {
        self.value(&["rev-parse", "--show-cdup"])
    }

    /// Working path relative to the root; empty at the root.
    pub fn sub_path(&self) -> Result<String> {
        self.value(&["rev-parse", "--show-prefix"])
    }

    /// False outside any repository.
    pub fn is_inside_work_tree(&self) -> Result<bool> {
        let captured = self
            .probe(&[(EXIT_FATAL, "NOT-A-REPO")])
            .exec_take(GIT, &["rev-parse", "--is-inside-work-tree"])?;
        if captured.exit_code == EXIT_FATAL {
            return Ok(false);
        }
        Ok(single_value(&captured.stdout_text()) == "true")
    }

    /// Current branch name; empty on a detached HEAD.
    pub fn current_branch(&self) -> Result<String> {
        self.value(&["branch", "--show-current"])
    }

    pub fn remote_url(&self, remote: &str) -> Result<String> {
        self.value(&["remote", "get-url", remote])
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> Result<usize> {
        let args = ["rev-list", "--count", "HEAD"];
        let value = self.value(&args)?;
        value.parse::<usize>().map_err(|_| {
            GitError::unexpected(command_label(GIT, &args), format!("not a count: {value:?}"))
        })
    }

    pub fn list_branches(&self) -> Result<Vec<String>> {
        self.lines(&["branch", "--format=%(refname:short)"])
    }

    pub fn list_remote_branches(&self) -> Result<Vec<String>> {
        self.lines(&["branch", "-r", "--format=%(refname:short)"])
    }

    /// Last `count` commits as `<short-hash> <subject>`.
    pub fn log_one_line(&self, count: usize) -> Result<Vec<String>> {
        let limit = format!("-n{count}");
        self.lines(&["log", "--oneline", &limit])
    }

    /// Tracked files.
    pub fn file_list(&self) -> Result<Vec<String>> {
        self.lines(&["ls-files"])
    }

    /// Untracked files not covered by ignore rules.
    pub fn untracked_files(&self) -> Result<Vec<String>> {
        self.lines(&["ls-files", "--others", "--exclude-standard"])
    }

    /// Tracked files that differ from HEAD (staged or not).
    pub fn modified_files(&self) -> Result<Vec<String>> {
        self.lines(&["diff", "--name-only", "HEAD"])
    }

    /// Ignored paths under the working path, relative to it.
    ///
    /// Ignored directories are reported once with a trailing `/`.
    #[instrument(skip_all)]
    pub fn ignored_files(&self) -> Result<Vec<String>> {
        let out = self.stdout(&["status", "--ignored", "-s", "--", "."])?;
        let paths = ignored_paths(&out);
        debug!(count = paths.len(), "ignored paths");
        Ok(paths)
    }

    /// Upstream of `branch` (e.g. `origin/main`); `None` when it tracks nothing.
    pub fn upstream_branch(&self, branch: &str) -> Result<Option<String>> {
        let spec = format!("{branch}@{{upstream}}");
        let captured = self
            .probe(&[(EXIT_FATAL, "NO-UPSTREAM")])
            .exec_take(GIT, &["rev-parse", "--abbrev-ref", &spec])?;
        if captured.exit_code == EXIT_FATAL {
            return Ok(None);
        }
        Ok(first_line(&captured.stdout_text()))
    }

    fn stdout(&self, args: &[&str]) -> Result<String> {
        let captured = self.probe(&[]).exec_take(GIT, args)?;
        Ok(captured.stdout_text())
    }

    fn value(&self, args: &[&str]) -> Result<String> {
        Ok(single_value(&self.stdout(args)?))
    }

    fn lines(&self, args: &[&str]) -> Result<Vec<String>> {
        Ok(non_empty_lines(&self.stdout(args)?))
    }

    /// `--quiet` diff: exit 0 = same, exit 1 = differs.
    fn differs(&self, args: &[&str]) -> Result<bool> {
        let captured = self.probe(&[(1, "DIFFERENT")]).exec_take(GIT, args)?;
        Ok(captured.exit_code == 1)
    }

    /// `show-ref --verify --quiet`: exit 0 = exists, exit 1 = absent.
    fn ref_exists(&self, refname: &str) -> Result<bool> {
        let captured = self
            .probe(&[(1, "ABSENT")])
            .exec_take(GIT, &["show-ref", "--verify", "--quiet", refname])?;
        Ok(captured.exit_code == 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::Chain;
    use crate::error::GitError;
    use crate::test_support::{ScriptedRunner, ScriptedStep};

    fn chain(steps: Vec<ScriptedStep>) -> (Chain<ScriptedRunner>, ScriptedRunner) {
        let runner = ScriptedRunner::new(steps);
        (Chain::with_runner("/repo", &runner), runner)
    }

    #[test]
    fn staging_predicate_discriminates_exit_codes() {
        let (c, _) = chain(vec![ScriptedStep::ok("")]);
        assert!(!c.has_staging_changes().expect("exit 0"));

        let (c, _) = chain(vec![ScriptedStep::fail(1, "")]);
        assert!(c.has_staging_changes().expect("exit 1"));

        let (c, _) = chain(vec![ScriptedStep::fail(2, "usage")]);
        let err = c.has_staging_changes().expect_err("exit 2");
        assert_eq!(err.exit_code(), Some(2));
    }

    #[test]
    fn ref_exists_discriminates_exit_codes() {
        let (c, runner) = chain(vec![
            ScriptedStep::ok(""),
            ScriptedStep::fail(1, ""),
            ScriptedStep::fail(128, "fatal"),
        ]);
        assert!(c.tag_exists("v1.0.0").expect("exists"));
        assert!(!c.branch_exists("gone").expect("absent"));
        assert!(c.remote_branch_exists("origin/main").is_err());
        assert_eq!(
            runner.calls(),
            vec![
                "git show-ref --verify --quiet refs/tags/v1.0.0",
                "git show-ref --verify --quiet refs/heads/gone",
                "git show-ref --verify --quiet refs/remotes/origin/main",
            ]
        );
    }

    #[test]
    fn latest_tag_maps_128_to_none() {
        let (c, _) = chain(vec![ScriptedStep::fail(128, "fatal: No names found")]);
        assert_eq!(c.latest_tag().expect("no tags"), None);

        let (c, _) = chain(vec![ScriptedStep::ok("v1.2.0\n")]);
        assert_eq!(c.latest_tag().expect("tag"), Some("v1.2.0".to_string()));
    }

    #[test]
    fn unsafe_patterns_never_reach_runner() {
        let (c, runner) = chain(vec![]);
        assert!(matches!(
            c.latest_tag_has_prefix("v$X"),
            Err(GitError::UnsafePattern { .. })
        ));
        assert!(matches!(
            c.latest_tag_matching("v'"),
            Err(GitError::UnsafePattern { .. })
        ));
        assert!(matches!(
            c.latest_tag_matching("`id`"),
            Err(GitError::UnsafePattern { .. })
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn latest_tag_matching_takes_first_line() {
        let (c, runner) = chain(vec![ScriptedStep::ok("v1.10.0\nv1.9.0\n")]);
        assert_eq!(
            c.latest_tag_has_prefix("v").expect("tag"),
            Some("v1.10.0".to_string())
        );
        assert_eq!(
            runner.calls(),
            vec!["sh -c git tag --list 'v*' --sort=-v:refname"]
        );
    }

    #[test]
    fn commit_count_parses_number() {
        let (c, _) = chain(vec![ScriptedStep::ok("3\n")]);
        assert_eq!(c.commit_count().expect("count"), 3);

        let (c, _) = chain(vec![ScriptedStep::ok("three\n")]);
        assert!(matches!(
            c.commit_count(),
            Err(GitError::UnexpectedOutput { .. })
        ));
    }

    #[test]
    fn list_getters_filter_empty_lines() {
        let (c, _) = chain(vec![ScriptedStep::ok("main\n\nfeature\n")]);
        assert_eq!(c.list_branches().expect("branches"), vec!["main", "feature"]);
    }

    #[test]
    fn single_value_getter_returns_empty_string() {
        let (c, _) = chain(vec![ScriptedStep::ok("\n")]);
        assert_eq!(c.sub_path().expect("root"), "");
    }

    #[test]
    fn queries_ignore_chain_state() {
        let (c, _) = chain(vec![ScriptedStep::fail(1, "bad"), ScriptedStep::ok("main\n")]);
        let poisoned = c.status();
        assert!(poisoned.is_poisoned());
        assert_eq!(poisoned.current_branch().expect("branch"), "main");
    }

    #[test]
    fn query_allowlist_does_not_leak_into_chain() {
        let (c, runner) = chain(vec![ScriptedStep::fail(1, ""), ScriptedStep::fail(1, "x")]);
        assert!(c.has_unstaged_changes().expect("differs"));
        let after = c.status();
        assert!(after.is_poisoned());
        assert_eq!(runner.calls(), vec!["git diff --quiet", "git status"]);
    }

    #[test]
    fn upstream_missing_is_none() {
        let (c, _) = chain(vec![ScriptedStep::fail(128, "fatal: no upstream")]);
        assert_eq!(c.upstream_branch("main").expect("none"), None);
    }

    #[test]
    fn outside_repository_is_not_inside_work_tree() {
        let (c, _) = chain(vec![ScriptedStep::fail(128, "fatal: not a git repository")]);
        assert!(!c.is_inside_work_tree().expect("outside"));
    }
}
