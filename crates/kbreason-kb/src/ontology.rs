//! Reference knowledge base backed by SUO-KIF files.
//!
//! Statements are read once from the configured sources (files, or
//! directories searched for `.kif`), indexed by the symbols they mention,
//! and rendered into a single TPTP artifact on first query. `tell` appends
//! user assertions and drops the artifact; `reset` rereads the sources.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kbreason_kif::{parse_kif, tptp, Formula, KifError, Sexpr};
use kbreason_prover::{Prover, ProverProblem, RawProverOutput, SolverLimits};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::query::parse_sentence;
use crate::{KbError, KnowledgeBase, Query, TimeBudget};

#[derive(Debug, Clone)]
pub struct OntologyConfig {
    pub name: String,
    /// `.kif` files, or directories searched recursively for them.
    pub sources: Vec<PathBuf>,
}

impl OntologyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(path.into());
        self
    }
}

#[derive(Debug, Clone)]
struct Statement {
    sexpr: Sexpr,
    /// `None` when the statement has no first-order rendering.
    formula: Option<Formula>,
    from_user: bool,
}

/// TPTP axioms for every translatable statement, shared by all queries
/// until the next `tell` or `reset`.
#[derive(Debug, Clone)]
pub struct ProverArtifact {
    pub tptp: Arc<str>,
    /// Hex SHA-256 of `tptp`.
    pub digest: String,
    pub axioms: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KbStatus {
    pub name: String,
    pub statements: usize,
    pub user_statements: usize,
    /// Statements kept for term lookup but left out of the prover input.
    pub untranslatable: usize,
    pub terms: usize,
    pub artifact_digest: Option<String>,
}

#[derive(Default)]
struct State {
    /// Shared with in-flight artifact builds; copied on write while one runs.
    statements: Arc<Vec<Statement>>,
    seen: HashSet<String>,
    terms: BTreeSet<String>,
    /// parent → direct children, from `(subclass Child Parent)`.
    children: BTreeMap<String, BTreeSet<String>>,
    artifact: Option<ProverArtifact>,
}

impl State {
    fn from_statements(statements: Vec<Statement>) -> Self {
        let mut state = State::default();
        for statement in statements {
            if !state.insert(statement) {
                tracing::debug!("duplicate statement in sources ignored");
            }
        }
        state
    }

    /// Returns `false` when an identical statement is already present.
    fn insert(&mut self, statement: Statement) -> bool {
        if !self.seen.insert(statement.sexpr.to_string()) {
            return false;
        }
        statement.sexpr.collect_symbols(&mut self.terms);
        if let Some((child, parent)) = subclass_edge(&statement.sexpr) {
            self.children
                .entry(parent.to_string())
                .or_default()
                .insert(child.to_string());
        }
        Arc::make_mut(&mut self.statements).push(statement);
        self.artifact = None;
        true
    }
}

fn subclass_edge(sexpr: &Sexpr) -> Option<(&str, &str)> {
    let Sexpr::List(items) = sexpr else {
        return None;
    };
    match items.as_slice() {
        [Sexpr::Word(head), Sexpr::Word(child), Sexpr::Word(parent)] if head == "subclass" => {
            Some((child.as_str(), parent.as_str()))
        }
        _ => None,
    }
}

/// KB names end up inside TPTP formula names.
fn tptp_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

// ============================================================================
// Loading
// ============================================================================

fn init_error(path: &Path, err: impl std::fmt::Display) -> KbError {
    KbError::Initialization(format!("{}: {err}", path.display()))
}

fn kif_files(source: &Path) -> Result<Vec<PathBuf>, KbError> {
    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }
    if !source.is_dir() {
        return Err(init_error(source, "knowledge source not found"));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|err| init_error(source, err))?;
        if entry.file_type().is_file() && entry.path().extension().map_or(false, |e| e == "kif") {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn read_kif_file(path: &Path) -> Result<Vec<Statement>, KbError> {
    let text = std::fs::read_to_string(path).map_err(|err| init_error(path, err))?;
    let exprs = parse_kif(&text).map_err(|err| init_error(path, err))?;
    Ok(exprs
        .into_iter()
        .map(|located| {
            let formula = match Formula::from_sexpr(&located.sexpr) {
                Ok(formula) => Some(formula),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = located.line,
                        error = %err,
                        "statement left out of prover input"
                    );
                    None
                }
            };
            Statement {
                sexpr: located.sexpr,
                formula,
                from_user: false,
            }
        })
        .collect())
}

/// Files are parsed in parallel; statement order follows source order.
fn load_sources(sources: &[PathBuf]) -> Result<Vec<Statement>, KbError> {
    let mut files = Vec::new();
    for source in sources {
        files.extend(kif_files(source)?);
    }
    let per_file = files
        .par_iter()
        .map(|path| read_kif_file(path))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(per_file.into_iter().flatten().collect())
}

fn build_artifact(name: &str, statements: &[Statement]) -> ProverArtifact {
    let prefix = tptp_name(name);
    let mut text = String::new();
    let mut axioms = 0usize;
    for formula in statements.iter().filter_map(|s| s.formula.as_ref()) {
        axioms += 1;
        text.push_str(&tptp::render_axiom(&format!("kb_{prefix}_{axioms}"), formula));
        text.push('\n');
    }

    let mut digest = String::with_capacity(64);
    for b in Sha256::digest(text.as_bytes()).iter() {
        let _ = write!(&mut digest, "{:02x}", b);
    }

    ProverArtifact {
        tptp: Arc::from(text),
        digest,
        axioms,
    }
}

// ============================================================================
// Ontology
// ============================================================================

pub struct Ontology {
    config: OntologyConfig,
    prover: Arc<dyn Prover>,
    state: RwLock<State>,
}

impl Ontology {
    /// Read every configured source. Blocking; run it off the async runtime.
    pub fn load(config: OntologyConfig, prover: Arc<dyn Prover>) -> Result<Self, KbError> {
        let state = State::from_statements(load_sources(&config.sources)?);
        tracing::info!(
            kb = %config.name,
            statements = state.statements.len(),
            terms = state.terms.len(),
            "knowledge base loaded"
        );
        Ok(Self {
            config,
            prover,
            state: RwLock::new(state),
        })
    }

    pub fn config(&self) -> &OntologyConfig {
        &self.config
    }

    /// The current prover input, built on first use after a change.
    ///
    /// Blocking: rendering a large KB takes a while. The query path goes
    /// through [`Ontology::prover_input`] instead.
    pub fn artifact(&self) -> ProverArtifact {
        match self.cached_or_snapshot() {
            Ok(artifact) => artifact,
            Err(snapshot) => {
                let artifact = build_artifact(&self.config.name, &snapshot);
                self.install(&snapshot, artifact)
            }
        }
    }

    /// Like [`Ontology::artifact`], but renders on the blocking pool without
    /// holding the state lock, so a caller's deadline can still fire.
    pub async fn prover_input(&self) -> Result<ProverArtifact, KbError> {
        let snapshot = match self.cached_or_snapshot() {
            Ok(artifact) => return Ok(artifact),
            Err(snapshot) => snapshot,
        };
        let name = self.config.name.clone();
        let statements = Arc::clone(&snapshot);
        let artifact = tokio::task::spawn_blocking(move || build_artifact(&name, &statements))
            .await
            .map_err(|err| KbError::Initialization(format!("prover input build failed: {err}")))?;
        Ok(self.install(&snapshot, artifact))
    }

    fn cached_or_snapshot(&self) -> Result<ProverArtifact, Arc<Vec<Statement>>> {
        let state = self.state.read();
        match &state.artifact {
            Some(artifact) => Ok(artifact.clone()),
            None => Err(Arc::clone(&state.statements)),
        }
    }

    /// Cache `artifact` unless the statements changed while it was built.
    fn install(&self, snapshot: &Arc<Vec<Statement>>, artifact: ProverArtifact) -> ProverArtifact {
        let mut state = self.state.write();
        if !Arc::ptr_eq(&state.statements, snapshot) {
            return artifact;
        }
        if let Some(existing) = &state.artifact {
            return existing.clone();
        }
        tracing::info!(
            kb = %self.config.name,
            axioms = artifact.axioms,
            digest = %artifact.digest,
            "prover input built"
        );
        state.artifact = Some(artifact.clone());
        artifact
    }

    pub fn status(&self) -> KbStatus {
        let state = self.state.read();
        KbStatus {
            name: self.config.name.clone(),
            statements: state.statements.len(),
            user_statements: state.statements.iter().filter(|s| s.from_user).count(),
            untranslatable: state.statements.iter().filter(|s| s.formula.is_none()).count(),
            terms: state.terms.len(),
            artifact_digest: state.artifact.as_ref().map(|a| a.digest.clone()),
        }
    }
}

#[async_trait]
impl KnowledgeBase for Ontology {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn has_term(&self, name: &str) -> bool {
        self.state.read().terms.contains(name)
    }

    fn child_classes(&self, name: &str) -> Option<BTreeSet<String>> {
        let state = self.state.read();
        let mut out = BTreeSet::new();
        let mut queue: VecDeque<&String> = state.children.get(name)?.iter().collect();
        while let Some(child) = queue.pop_front() {
            if child != name && out.insert(child.clone()) {
                if let Some(grandchildren) = state.children.get(child) {
                    queue.extend(grandchildren.iter());
                }
            }
        }
        (!out.is_empty()).then_some(out)
    }

    async fn ensure_prover_loaded(&self) -> Result<(), KbError> {
        self.prover_input().await.map(|_| ())
    }

    async fn submit_query(
        &self,
        query: &Query,
        budget: TimeBudget,
        limits: SolverLimits,
    ) -> Result<RawProverOutput, KbError> {
        let artifact = self.prover_input().await?;
        let problem = ProverProblem {
            axioms: artifact.tptp,
            conjecture: tptp::render_conjecture(
                &format!("query_{}", tptp_name(&self.config.name)),
                query.formula(),
            ),
            variables: query.variables().to_vec(),
            budget: budget.as_duration(),
            limits,
        };
        tracing::debug!(
            kb = %self.config.name,
            prover = self.prover.name(),
            query = query.text(),
            "submitting query"
        );
        Ok(self.prover.prove(&problem).await?)
    }

    fn tell(&self, statement: &str) -> Result<String, KbError> {
        let sexpr = parse_sentence(statement)?;
        let formula = match Formula::from_sexpr(&sexpr) {
            Ok(formula) => Some(formula),
            Err(err @ KifError::Unsupported { .. }) => {
                tracing::warn!(error = %err, "told statement left out of prover input");
                None
            }
            Err(err) => return Err(err.into()),
        };

        let rendered = sexpr.to_string();
        let translatable = formula.is_some();
        let added = self.state.write().insert(Statement {
            sexpr,
            formula,
            from_user: true,
        });

        let name = &self.config.name;
        if !added {
            return Ok(format!("statement already in {name}: {rendered}"));
        }
        tracing::info!(kb = %name, statement = %rendered, "statement added");
        Ok(if translatable {
            format!("statement added to {name}: {rendered}")
        } else {
            format!("statement added to {name} for term lookup only: {rendered}")
        })
    }

    async fn reset(&self) -> Result<(), KbError> {
        let sources = self.config.sources.clone();
        let statements = tokio::task::spawn_blocking(move || load_sources(&sources))
            .await
            .map_err(|err| KbError::Initialization(format!("reload task failed: {err}")))??;
        *self.state.write() = State::from_statements(statements);
        tracing::info!(kb = %self.config.name, "knowledge base reset");
        Ok(())
    }
}
