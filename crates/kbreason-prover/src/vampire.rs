//! Vampire backend: one subprocess per query.
//!
//! Each call writes the problem to a unique file under `work_dir`, runs the
//! solver with question answering enabled, and collects stdout. The child is
//! spawned with `kill_on_drop`, so a caller that abandons the future at its
//! deadline also stops the process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use crate::{Prover, ProverError, ProverProblem, RawProverOutput};

#[derive(Debug, Clone)]
pub struct VampireConfig {
    pub program: PathBuf,
    /// Flags passed before `-t <secs> <problem>`.
    pub args: Vec<String>,
    pub work_dir: PathBuf,
}

impl VampireConfig {
    pub fn default_args() -> Vec<String> {
        [
            "--mode",
            "casc",
            "--proof",
            "tptp",
            "--output_axiom_names",
            "on",
            "-qa",
            "plain",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Self::default_args(),
            work_dir: work_dir.into(),
        }
    }
}

pub struct VampireProver {
    config: VampireConfig,
}

/// Removes the problem file however the call ends, including cancellation.
struct ProblemFile(PathBuf);

impl ProblemFile {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ProblemFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

impl VampireProver {
    pub fn new(config: VampireConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VampireConfig {
        &self.config
    }
}

#[async_trait]
impl Prover for VampireProver {
    fn name(&self) -> &str {
        "vampire"
    }

    async fn prove(&self, problem: &ProverProblem) -> Result<RawProverOutput, ProverError> {
        let file = ProblemFile(
            self.config
                .work_dir
                .join(format!("kbreason_query_{}.tptp", Uuid::new_v4())),
        );
        tokio::fs::write(file.path(), problem.render())
            .await
            .map_err(|source| ProverError::Io {
                path: file.path().display().to_string(),
                source,
            })?;

        // Vampire's own limit is whole seconds; the caller's deadline is exact.
        let secs = problem.budget.as_secs_f64().ceil().max(1.0) as u64;

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("-t")
            .arg(secs.to_string())
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            program = %self.config.program.display(),
            problem = %file.path().display(),
            budget_secs = secs,
            "starting prover"
        );

        let child = cmd.spawn().map_err(|source| ProverError::Spawn {
            program: self.config.program.display().to_string(),
            source,
        })?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ProverError::Io {
                path: self.config.program.display().to_string(),
                source,
            })?;

        Ok(RawProverOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            variables: problem.variables.clone(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::SolverLimits;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake_vampire.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn problem(budget: Duration) -> ProverProblem {
        ProverProblem {
            axioms: Arc::from("fof(kb_SUMO_1,axiom,s__subclass(s__Animal,s__Object))."),
            conjecture: "fof(query_SUMO,conjecture,(? [V__X] : s__subclass(V__X,s__Object)))."
                .to_string(),
            variables: vec!["X".to_string()],
            budget,
            limits: SolverLimits::default(),
        }
    }

    #[tokio::test]
    async fn passes_problem_file_and_time_limit() {
        let dir = tempfile::tempdir().unwrap();
        // Echo the arguments and the problem so the test can see both.
        let script = write_script(dir.path(), "echo \"args: $*\"\nfor last; do :; done\ncat \"$last\"");
        let prover = VampireProver::new(VampireConfig {
            program: script,
            args: vec!["--mode".to_string(), "casc".to_string()],
            work_dir: dir.path().to_path_buf(),
        });

        let out = prover.prove(&problem(Duration::from_millis(2500))).await.unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.variables, vec!["X".to_string()]);
        assert!(out.stdout.contains("args: --mode casc -t 3 "), "{}", out.stdout);
        assert!(out.stdout.contains("fof(query_SUMO,conjecture"), "{}", out.stdout);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |x| x == "tptp"))
            .collect();
        assert!(leftovers.is_empty(), "problem file should be removed");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let prover = VampireProver::new(VampireConfig::new(
            dir.path().join("no-such-vampire"),
            dir.path(),
        ));
        let err = prover.prove(&problem(Duration::from_secs(1))).await.unwrap_err();
        assert!(matches!(err, ProverError::Spawn { .. }), "{err}");
    }

    #[tokio::test]
    async fn dropping_the_call_stops_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = write_script(
            dir.path(),
            &format!("sleep 2\ntouch '{}'", marker.display()),
        );
        let prover = VampireProver::new(VampireConfig {
            program: script,
            args: vec![],
            work_dir: dir.path().to_path_buf(),
        });

        let started = Instant::now();
        let problem = problem(Duration::from_millis(200));
        let res = tokio::time::timeout(Duration::from_millis(200), prover.prove(&problem)).await;
        assert!(res.is_err(), "call should hit the deadline");
        assert!(started.elapsed() < Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists(), "killed prover must not finish its work");
    }
}
