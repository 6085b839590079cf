use analysis::{ParameterKind, StaticAnalyzer, Symbol, SymbolDetails, UnresolvedIdentifier};
use chrono::Utc;
use inference::{FunctionTarget, InferenceClient, Prompt, PromptTarget};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use strum::{AsRefStr, Display};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::AnalysisFailure;
use crate::fingerprint::Fingerprint;
use crate::interpreter::{Candidate, FunctionCandidate, Interpretation, ResponseInterpreter};
use crate::memory::{MemoryStore, Signature};
use crate::types::{
    AnalysisOption, AnalysisResult, FunctionSuggestion, HistoryRecord, MemoryPattern, Provenance,
    SourceUnit, TypeAssertion,
};

/// Steps an analysis request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Fingerprinted,
    CacheChecked,
    CacheHit,
    Analyzed,
    MemoryConsulted,
    ResolvedFromMemory,
    ExternalCalled,
    Interpreted,
    Merged,
    Cached,
    HistoryLogged,
}

impl Stage {
    pub(crate) fn emit(self, fingerprint: &Fingerprint) {
        debug!(stage = %self, fingerprint = %fingerprint, "Pipeline stage");
    }
}

/// Every use of one unresolved name, in source order.
type Uses<'a> = SmallVec<[&'a UnresolvedIdentifier; 4]>;

fn group_by_name(unresolved: &[UnresolvedIdentifier]) -> Vec<(&str, Uses<'_>)> {
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    let mut groups: Vec<(&str, Uses<'_>)> = Vec::new();
    for use_site in unresolved {
        let name = use_site.name.as_str();
        match index.get(name) {
            Some(&i) => groups[i].1.push(use_site),
            None => {
                index.insert(name, groups.len());
                groups.push((name, SmallVec::from_elem(use_site, 1)));
            }
        }
    }
    groups
}

/// Distinct signatures of the uses of `name`.
fn signatures(name: &str, uses: &[&UnresolvedIdentifier]) -> Vec<Signature> {
    let mut signatures: Vec<Signature> = Vec::with_capacity(uses.len());
    for use_site in uses {
        let signature = Signature::of(&use_site.context_snippet, name);
        if !signatures.contains(&signature) {
            signatures.push(signature);
        }
    }
    signatures
}

/// The annotatable slots of one function and what has been found for them.
struct FunctionSlots<'a> {
    symbol: &'a Symbol,
    header: &'a str,
    params: Vec<(&'a str, Option<TypeAssertion>)>,
    /// `None` when the body already determines the return type.
    returns: Option<Option<TypeAssertion>>,
}

impl<'a> FunctionSlots<'a> {
    /// Only functions without any annotation are rewritten, so only those
    /// get slots.
    fn of(symbol: &'a Symbol, lines: &[&'a str]) -> Option<Self> {
        let SymbolDetails::Function {
            parameters,
            returns: None,
            inferred_return,
            ..
        } = &symbol.details
        else {
            return None;
        };
        if parameters.iter().any(|p| p.annotation.is_some()) {
            return None;
        }
        let header = *lines.get(symbol.decl_line.checked_sub(1)?)?;
        let params: Vec<(&str, Option<TypeAssertion>)> = parameters
            .iter()
            .filter(|p| !matches!(p.kind, ParameterKind::VarArgs | ParameterKind::VarKeywords))
            .filter(|p| p.name != "self" && p.name != "cls")
            .map(|p| (p.name.as_str(), None))
            .collect();
        let returns = inferred_return.is_none().then_some(None);
        if params.is_empty() && returns.is_none() {
            return None;
        }
        Some(Self {
            symbol,
            header,
            params,
            returns,
        })
    }

    fn is_complete(&self) -> bool {
        self.params.iter().all(|(_, found)| found.is_some())
            && !matches!(self.returns, Some(None))
    }

    fn target(&self) -> FunctionTarget {
        FunctionTarget {
            name: self.symbol.name.clone(),
            line: self.symbol.decl_line,
            header: self.header.to_string(),
        }
    }

    fn recall(&mut self, pipeline: &Pipeline) {
        let header = self.header;
        for (name, found) in &mut self.params {
            let name: &str = name;
            *found = pipeline.recall(name, vec![Signature::of(header, name)]);
        }
        if let Some(returns) = &mut self.returns {
            *returns = pipeline.recall(&self.symbol.name, vec![Signature::of(header, &self.symbol.name)]);
        }
    }

    /// Fills the slots memory left open. A memory answer is never replaced.
    fn accept(&mut self, candidate: FunctionCandidate) {
        let assertion = |identifier: &str, inferred_type: String| TypeAssertion {
            identifier: identifier.to_string(),
            inferred_type,
            confidence: candidate.confidence,
            explanation: None,
            provenance: Provenance::ExternalInference,
        };
        for (name, inferred_type) in &candidate.params {
            let slot = self.params.iter_mut().find(|(param, _)| *param == name.as_str());
            if let Some((param, found)) = slot
                && found.is_none()
            {
                *found = Some(assertion(*param, inferred_type.clone()));
            }
        }
        if let (Some(returns), Some(inferred_type)) = (&mut self.returns, &candidate.returns)
            && returns.is_none()
        {
            *returns = Some(assertion(&self.symbol.name, inferred_type.clone()));
        }
    }

    fn learn(&self, memory: &MemoryStore) {
        let slots = self
            .params
            .iter()
            .map(|(name, found)| (*name, found.as_ref()))
            .chain(self.returns.iter().map(|r| (self.symbol.name.as_str(), r.as_ref())));
        for (name, found) in slots {
            let Some(assertion) = found.filter(|a| a.provenance != Provenance::Memory) else {
                continue;
            };
            let signature = Signature::of(self.header, name);
            if let Err(e) = memory.record(&signature, &assertion.inferred_type, assertion.confidence) {
                warn!(signature = %signature, "{e}");
            }
        }
    }

    fn into_suggestion(self) -> Option<FunctionSuggestion> {
        let params: Vec<TypeAssertion> = self.params.into_iter().filter_map(|(_, found)| found).collect();
        let returns = self.returns.flatten();
        if params.is_empty() && returns.is_none() {
            return None;
        }
        Some(FunctionSuggestion {
            function: self.symbol.name.clone(),
            line: self.symbol.decl_line,
            params,
            returns,
        })
    }
}

/// Computes an [`AnalysisResult`] from scratch: static analysis, then
/// pattern memory, then the external service for whatever is left.
pub struct Pipeline {
    config: EngineConfig,
    analyzer: StaticAnalyzer,
    interpreter: ResponseInterpreter,
    memory: Arc<MemoryStore>,
    client: Option<Arc<dyn InferenceClient>>,
}

impl Pipeline {
    pub fn new(
        config: EngineConfig,
        memory: Arc<MemoryStore>,
        client: Option<Arc<dyn InferenceClient>>,
    ) -> Self {
        Self {
            interpreter: ResponseInterpreter::from_config(&config),
            analyzer: StaticAnalyzer::new(),
            config,
            memory,
            client,
        }
    }

    pub fn client(&self) -> Option<&Arc<dyn InferenceClient>> {
        self.client.as_ref()
    }

    pub async fn run(&self, unit: &SourceUnit, fingerprint: Fingerprint) -> AnalysisResult {
        let analysis = self.analyzer.analyze_source(&unit.text);
        Stage::Analyzed.emit(&fingerprint);

        let mut result = AnalysisResult::from_static(fingerprint, analysis);
        if !result.success {
            Stage::Merged.emit(&fingerprint);
            return result;
        }

        let unresolved = result.unresolved.clone();
        let groups = group_by_name(&unresolved);
        let mut resolved: FxHashMap<&str, TypeAssertion> = FxHashMap::default();

        if unit.has(AnalysisOption::MemoryReuse) {
            for (name, uses) in &groups {
                if let Some(assertion) = self.from_memory(name, uses) {
                    resolved.insert(name, assertion);
                }
            }
            Stage::MemoryConsulted.emit(&fingerprint);
        }

        let pending: Vec<(&str, &Uses<'_>)> = groups
            .iter()
            .filter(|(name, _)| !resolved.contains_key(name))
            .map(|(name, uses)| (*name, uses))
            .collect();

        let mut failure = None;
        if pending.is_empty() {
            if !groups.is_empty() {
                Stage::ResolvedFromMemory.emit(&fingerprint);
            }
        } else if unit.has(AnalysisOption::ExternalInference) {
            match self.consult_external(&unit.text, &pending, &fingerprint).await {
                Ok(assertions) => {
                    for assertion in assertions {
                        let name = pending
                            .iter()
                            .map(|(name, _)| *name)
                            .find(|name| *name == assertion.identifier);
                        if let Some(name) = name {
                            resolved.entry(name).or_insert(assertion);
                        }
                    }
                }
                Err(e) => {
                    warn!(fingerprint = %fingerprint, "{e}");
                    failure = Some(e);
                }
            }
        }

        let mut assertions = Vec::with_capacity(resolved.len());
        for (name, _) in &groups {
            if let Some(assertion) = resolved.remove(name) {
                assertions.push(assertion);
            }
        }
        result.assertions = assertions;
        result.error = failure.map(|e| e.to_string());
        Stage::Merged.emit(&fingerprint);
        result
    }

    fn from_memory(&self, name: &str, uses: &[&UnresolvedIdentifier]) -> Option<TypeAssertion> {
        self.recall(name, signatures(name, uses))
    }

    /// The most confident stored pattern among `signatures`, when it clears
    /// the reuse threshold.
    fn recall(&self, name: &str, signatures: Vec<Signature>) -> Option<TypeAssertion> {
        let best: Option<(Signature, MemoryPattern)> = signatures
            .into_iter()
            .filter_map(|signature| {
                let pattern = self.memory.lookup(&signature)?;
                Some((signature, pattern))
            })
            .filter(|(_, pattern)| pattern.confidence >= self.config.reuse_threshold)
            .max_by(|(_, a), (_, b)| a.confidence.total_cmp(&b.confidence));
        let (signature, pattern) = best?;

        let pattern = match self.memory.reuse(&signature) {
            Ok(updated) => updated.unwrap_or(pattern),
            Err(e) => {
                warn!(signature = %signature, "{e}");
                pattern
            }
        };
        debug!(identifier = name, inferred_type = %pattern.inferred_type, "Memory hit");

        Some(TypeAssertion {
            identifier: name.to_string(),
            inferred_type: pattern.inferred_type,
            confidence: pattern.confidence.clamp(0.0, 1.0),
            explanation: Some(format!("Matched stored pattern `{}`", pattern.shape)),
            provenance: Provenance::Memory,
        })
    }

    /// One bounded call to the external service.
    async fn call_external(
        &self,
        prompt: &Prompt,
        fingerprint: &Fingerprint,
    ) -> Result<String, AnalysisFailure> {
        let Some(client) = &self.client else {
            return Err(AnalysisFailure::ExternalUnavailable(
                "no inference client configured".to_string(),
            ));
        };

        let timeout = self.config.inference_timeout();
        let reply = tokio::time::timeout(timeout, client.infer(prompt, timeout)).await;
        Stage::ExternalCalled.emit(fingerprint);
        match reply {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => Err(AnalysisFailure::ExternalUnavailable(e.to_string())),
            Err(_) => Err(AnalysisFailure::ExternalUnavailable(format!(
                "no reply within {} ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn consult_external(
        &self,
        code: &str,
        pending: &[(&str, &Uses<'_>)],
        fingerprint: &Fingerprint,
    ) -> Result<Vec<TypeAssertion>, AnalysisFailure> {
        let targets: Vec<PromptTarget> = pending
            .iter()
            .map(|(name, uses)| PromptTarget {
                name: name.to_string(),
                line: uses[0].use_line,
                context: uses[0].context_snippet.clone(),
            })
            .collect();
        let prompt = Prompt::type_inference(code, &targets);
        let raw = self.call_external(&prompt, fingerprint).await?;

        let interpretation = self.interpreter.interpret(&raw);
        Stage::Interpreted.emit(fingerprint);
        let (candidates, provenance) = match interpretation {
            Interpretation::Structured(c) => (c, Provenance::ExternalInference),
            Interpretation::Fallback(c) => (c, Provenance::FallbackHeuristic),
            Interpretation::Failed(reason) => {
                return Err(AnalysisFailure::ResponseUnparseable(reason));
            }
        };

        Ok(candidates
            .into_iter()
            .map(|Candidate { identifier, inferred_type, confidence, explanation }| TypeAssertion {
                identifier,
                inferred_type,
                confidence,
                explanation,
                provenance,
            })
            .collect())
    }

    /// Records externally obtained assertions into pattern memory, one
    /// observation per distinct use signature.
    pub fn learn(&self, result: &AnalysisResult) {
        if !self.config.record_memory {
            return;
        }
        let groups = group_by_name(&result.unresolved);
        for assertion in &result.assertions {
            if assertion.provenance == Provenance::Memory {
                continue;
            }
            let Some((name, uses)) = groups.iter().find(|(name, _)| *name == assertion.identifier)
            else {
                continue;
            };
            for signature in signatures(name, uses) {
                if let Err(e) =
                    self.memory
                        .record(&signature, &assertion.inferred_type, assertion.confidence)
                {
                    warn!(signature = %signature, "{e}");
                }
            }
        }
    }

    /// Parameter and return types for the unannotated functions of an
    /// analyzed unit. Pattern memory is consulted first, keyed by the shape
    /// of the `def` header around each slot; the rest is asked of the
    /// external service in one call. Suggestions are not cached, and a
    /// failed call still returns whatever memory supplied.
    pub async fn suggest_functions(
        &self,
        unit: &SourceUnit,
        result: &AnalysisResult,
    ) -> (Vec<FunctionSuggestion>, Option<AnalysisFailure>) {
        let lines: Vec<&str> = unit.text.lines().collect();
        let mut slots: Vec<FunctionSlots<'_>> = result
            .symbols
            .iter()
            .filter_map(|symbol| FunctionSlots::of(symbol, &lines))
            .collect();
        if slots.is_empty() {
            return (Vec::new(), None);
        }

        if unit.has(AnalysisOption::MemoryReuse) {
            for function in &mut slots {
                function.recall(self);
            }
            Stage::MemoryConsulted.emit(&result.fingerprint);
        }

        let mut failure = None;
        let pending: Vec<FunctionTarget> = slots
            .iter()
            .filter(|function| !function.is_complete())
            .map(FunctionSlots::target)
            .collect();
        if !pending.is_empty() && unit.has(AnalysisOption::ExternalInference) {
            match self.external_suggestions(&unit.text, &pending, &result.fingerprint).await {
                Ok(candidates) => {
                    for candidate in candidates {
                        let Some(function) = slots
                            .iter_mut()
                            .find(|f| f.symbol.name == candidate.function && !f.is_complete())
                        else {
                            continue;
                        };
                        function.accept(candidate);
                        if self.config.record_memory {
                            function.learn(&self.memory);
                        }
                    }
                }
                Err(e) => {
                    warn!(fingerprint = %result.fingerprint, "{e}");
                    failure = Some(e);
                }
            }
        }
        Stage::Merged.emit(&result.fingerprint);

        let suggestions = slots
            .into_iter()
            .filter_map(FunctionSlots::into_suggestion)
            .collect();
        (suggestions, failure)
    }

    async fn external_suggestions(
        &self,
        code: &str,
        targets: &[FunctionTarget],
        fingerprint: &Fingerprint,
    ) -> Result<Vec<FunctionCandidate>, AnalysisFailure> {
        let prompt = Prompt::function_annotations(code, targets);
        let raw = self.call_external(&prompt, fingerprint).await?;
        let candidates = self
            .interpreter
            .interpret_functions(&raw)
            .map_err(AnalysisFailure::ResponseUnparseable)?;
        Stage::Interpreted.emit(fingerprint);
        Ok(candidates)
    }

    /// One history record per assertion.
    pub fn history_records(result: &AnalysisResult) -> Vec<HistoryRecord> {
        let timestamp = Utc::now();
        result
            .assertions
            .iter()
            .map(|a| HistoryRecord {
                fingerprint: result.fingerprint,
                identifier: a.identifier.clone(),
                inferred_type: a.inferred_type.clone(),
                provenance: a.provenance,
                confidence: a.confidence,
                timestamp,
            })
            .collect()
    }
}
